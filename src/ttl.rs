//! Remaining-lifetime calculation for sink keys.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

/// An expiration instant that may or may not carry a timezone.
pub trait ExpirationInstant {
    /// The instant in UTC. Naive values are read as UTC wall-clock time.
    fn to_utc(&self) -> DateTime<Utc>;
}

impl ExpirationInstant for NaiveDateTime {
    fn to_utc(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(self)
    }
}

impl<Tz: TimeZone> ExpirationInstant for DateTime<Tz> {
    fn to_utc(&self) -> DateTime<Utc> {
        self.with_timezone(&Utc)
    }
}

/// How long a migrated session should live in the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// Expire the key after this many seconds.
    Ttl(u64),
    /// The session has no expiration; store the key without one.
    Unbounded,
    /// The expiration has already passed. The key is stored without one.
    Elapsed,
}

impl Lifetime {
    /// Decides the lifetime of a session expiring at `expires_at`, seen from `now`.
    ///
    /// Partial seconds are dropped, so anything under one second left is
    /// [`Lifetime::Elapsed`].
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::{Duration, Utc};
    /// use session_cache_migrator::ttl::Lifetime;
    ///
    /// let now = Utc::now();
    /// let in_a_minute = now + Duration::seconds(60);
    /// assert_eq!(Lifetime::at(Some(&in_a_minute), now), Lifetime::Ttl(60));
    /// assert_eq!(Lifetime::at::<chrono::DateTime<Utc>>(None, now), Lifetime::Unbounded);
    /// ```
    pub fn at<T: ExpirationInstant>(expires_at: Option<&T>, now: DateTime<Utc>) -> Self {
        let Some(expires_at) = expires_at else {
            return Self::Unbounded;
        };
        let remaining = expires_at.to_utc().signed_duration_since(now);
        match u64::try_from(remaining.num_seconds()) {
            Ok(secs) if secs > 0 => Self::Ttl(secs),
            _ => Self::Elapsed,
        }
    }

    /// The TTL to apply, if any.
    pub fn seconds(&self) -> Option<u64> {
        match self {
            Self::Ttl(secs) => Some(*secs),
            Self::Unbounded | Self::Elapsed => None,
        }
    }
}

/// Computes the TTL in whole seconds from `now` until `expires_at`.
///
/// Returns `None` when there is no expiration or when it is already reached.
/// Such sessions are still migrated, but stored without expiration.
pub fn calculate_ttl<T: ExpirationInstant>(
    expires_at: Option<&T>,
    now: DateTime<Utc>,
) -> Option<u64> {
    Lifetime::at(expires_at, now).seconds()
}

/// [`Lifetime::at`] against the current time.
pub fn remaining_lifetime<T: ExpirationInstant>(expires_at: Option<&T>) -> Lifetime {
    Lifetime::at(expires_at, Utc::now())
}

/// [`calculate_ttl`] against the current time.
pub fn remaining_ttl<T: ExpirationInstant>(expires_at: Option<&T>) -> Option<u64> {
    remaining_lifetime(expires_at).seconds()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, FixedOffset};

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_missing_expiration_has_no_ttl() {
        assert_eq!(calculate_ttl::<NaiveDateTime>(None, now()), None);
    }

    #[test]
    fn test_future_naive_expiration_is_read_as_utc() {
        let expires = (now() + Duration::hours(1)).naive_utc();
        assert_eq!(calculate_ttl(Some(&expires), now()), Some(3600));
    }

    #[test]
    fn test_aware_expiration_uses_its_offset() {
        // 14:00 at +02:00 is 12:00 UTC plus 90s.
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let expires = offset.with_ymd_and_hms(2024, 5, 1, 14, 1, 30).unwrap();
        assert_eq!(calculate_ttl(Some(&expires), now()), Some(90));
    }

    #[test]
    fn test_expired_and_exact_now_have_no_ttl() {
        let past = (now() - Duration::seconds(5)).naive_utc();
        let exact = now().naive_utc();
        assert_eq!(calculate_ttl(Some(&past), now()), None);
        assert_eq!(calculate_ttl(Some(&exact), now()), None);
    }

    #[test]
    fn test_partial_seconds_are_floored() {
        let expires = now() + Duration::milliseconds(2_999);
        assert_eq!(calculate_ttl(Some(&expires), now()), Some(2));

        let under_one = now() + Duration::milliseconds(999);
        assert_eq!(calculate_ttl(Some(&under_one), now()), None);
    }

    #[test]
    fn test_lifetime_tells_missing_from_elapsed() {
        let past = (now() - Duration::minutes(1)).naive_utc();
        let future = (now() + Duration::minutes(1)).naive_utc();
        assert_eq!(Lifetime::at::<NaiveDateTime>(None, now()), Lifetime::Unbounded);
        assert_eq!(Lifetime::at(Some(&past), now()), Lifetime::Elapsed);
        assert_eq!(Lifetime::at(Some(&future), now()), Lifetime::Ttl(60));
        assert_eq!(Lifetime::Elapsed.seconds(), None);
        assert_eq!(Lifetime::Unbounded.seconds(), None);
    }

    #[test]
    fn test_remaining_ttl_uses_current_time() {
        let expires = Utc::now() + Duration::hours(1);
        let ttl = remaining_ttl(Some(&expires)).unwrap();
        assert!((3595..=3600).contains(&ttl), "ttl was {ttl}");
    }
}
