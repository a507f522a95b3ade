//! Flattens an extracted session into a string-only hash record.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};

use crate::error::TransformError;
use crate::extract::{AttributeMap, SessionRecord};

/// Prefix of fields derived from session attributes.
pub const ATTRIBUTE_PREFIX: &str = "attr_";
/// Field holding the JSON copy of all session attributes.
pub const ATTRIBUTES_JSON_FIELD: &str = "session_attributes_json";
/// Field holding the time the record was transformed.
pub const MIGRATED_AT_FIELD: &str = "migrated_at";
/// Field holding [`MIGRATION_VERSION`].
pub const MIGRATION_VERSION_FIELD: &str = "migration_version";
/// Format version of the flat records written by this crate.
pub const MIGRATION_VERSION: &str = "1.0";

/// A flat, string-valued record ready to be stored as one hash.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlatRecord {
    fields: BTreeMap<String, String>,
}

impl FlatRecord {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `field` to `value`, replacing any previous value.
    ///
    /// # Examples
    ///
    /// ```
    /// use session_cache_migrator::FlatRecord;
    ///
    /// let mut record = FlatRecord::new();
    /// record.insert("theme", "dark");
    /// record.insert("theme", "light");
    /// assert_eq!(record.get("theme"), Some("light"));
    /// assert_eq!(record.len(), 1);
    /// ```
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Returns the value of `field`, if present.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// Whether `field` is present.
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The fields in name order, as written to the sink.
    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    /// Consumes the record, returning its fields.
    pub fn into_fields(self) -> BTreeMap<String, String> {
        self.fields
    }
}

impl From<BTreeMap<String, String>> for FlatRecord {
    fn from(fields: BTreeMap<String, String>) -> Self {
        Self { fields }
    }
}

/// Renders a timestamp as RFC 3339 UTC with microseconds, e.g. `2024-05-01T12:00:00.000000Z`.
///
/// Fixed width keeps the values lexically sortable.
pub fn format_timestamp<Tz: TimeZone>(ts: &DateTime<Tz>) -> String {
    ts.with_timezone(&Utc)
        .to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn format_naive(ts: &NaiveDateTime) -> String {
    format_timestamp(&Utc.from_utc_datetime(ts))
}

// Every attribute must map to a distinct, printable `attr_<key>` field.
fn check_attribute_key(key: &str) -> Result<(), TransformError> {
    let reason = if key.is_empty() {
        "key is empty"
    } else if key.chars().any(char::is_control) {
        "key contains control characters"
    } else {
        return Ok(());
    };
    Err(TransformError::InvalidAttributeKey {
        key: key.to_owned(),
        reason,
    })
}

/// Converts a session and its attributes into a [`FlatRecord`].
///
/// `migrated_at` is stamped into the record verbatim, which keeps this function
/// deterministic. Timestamps that are NULL in the source are left out entirely.
///
/// # Errors
///
/// Returns [`TransformError::InvalidAttributeKey`] when an attribute key is
/// empty or contains control characters. Only that session is affected.
pub fn transform(
    session: &SessionRecord,
    attributes: &AttributeMap,
    migrated_at: DateTime<Utc>,
) -> Result<FlatRecord, TransformError> {
    let mut record = FlatRecord::new();

    record.insert("user_id", session.user_id.to_string());
    record.insert("username", session.username.clone().unwrap_or_default());
    record.insert("email", session.email.clone().unwrap_or_default());
    record.insert("ip_address", session.ip_address.clone().unwrap_or_default());
    record.insert("user_agent", session.user_agent.clone().unwrap_or_default());

    let timestamps = [
        ("session_created_at", &session.session_created_at),
        ("expires_at", &session.expires_at),
        ("last_activity_at", &session.last_activity_at),
        ("user_created_at", &session.user_created_at),
        ("last_login_at", &session.last_login_at),
        ("preferences_updated_at", &session.preferences_updated_at),
    ];
    for (field, value) in timestamps {
        if let Some(ts) = value {
            record.insert(field, format_naive(ts));
        }
    }

    record.insert("theme", session.theme.as_str());
    record.insert("language", session.language.as_str());
    record.insert(
        "notifications_enabled",
        if session.notifications_enabled { "true" } else { "false" },
    );

    for (key, value) in attributes {
        check_attribute_key(key)?;
        record.insert(format!("{ATTRIBUTE_PREFIX}{key}"), value.clone().unwrap_or_default());
    }

    record.insert(ATTRIBUTES_JSON_FIELD, serde_json::to_string(attributes)?);
    record.insert(MIGRATED_AT_FIELD, format_timestamp(&migrated_at));
    record.insert(MIGRATION_VERSION_FIELD, MIGRATION_VERSION);

    Ok(record)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::extract::{DEFAULT_LANGUAGE, DEFAULT_THEME};

    fn ts(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn migrated_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 2, 8, 30, 0).unwrap()
    }

    fn bare_session() -> SessionRecord {
        SessionRecord {
            session_id: "A".into(),
            user_id: 7,
            ip_address: None,
            user_agent: None,
            session_created_at: None,
            expires_at: None,
            last_activity_at: None,
            username: None,
            email: None,
            user_created_at: None,
            last_login_at: None,
            theme: DEFAULT_THEME.into(),
            language: DEFAULT_LANGUAGE.into(),
            notifications_enabled: true,
            preferences_updated_at: None,
        }
    }

    #[test]
    fn test_defaults_and_empty_strings() {
        let record = transform(&bare_session(), &AttributeMap::new(), migrated_at()).unwrap();

        assert_eq!(record.get("user_id"), Some("7"));
        assert_eq!(record.get("username"), Some(""));
        assert_eq!(record.get("email"), Some(""));
        assert_eq!(record.get("ip_address"), Some(""));
        assert_eq!(record.get("user_agent"), Some(""));
        assert_eq!(record.get("theme"), Some("light"));
        assert_eq!(record.get("language"), Some("en"));
        assert_eq!(record.get("notifications_enabled"), Some("true"));
        assert_eq!(record.get(ATTRIBUTES_JSON_FIELD), Some("{}"));
        assert_eq!(record.get(MIGRATION_VERSION_FIELD), Some("1.0"));
        assert_eq!(
            record.get(MIGRATED_AT_FIELD),
            Some("2024-05-02T08:30:00.000000Z")
        );
    }

    #[test]
    fn test_null_timestamps_are_omitted() {
        let record = transform(&bare_session(), &AttributeMap::new(), migrated_at()).unwrap();
        for field in [
            "session_created_at",
            "expires_at",
            "last_activity_at",
            "user_created_at",
            "last_login_at",
            "preferences_updated_at",
        ] {
            assert!(!record.contains(field), "{field} should be absent");
        }
    }

    #[test]
    fn test_present_timestamps_are_iso_utc() {
        let mut session = bare_session();
        session.session_created_at = Some(ts(9, 0, 0));
        session.expires_at = Some(ts(21, 15, 30));
        session.last_login_at = Some(ts(8, 59, 59));

        let record = transform(&session, &AttributeMap::new(), migrated_at()).unwrap();
        assert_eq!(
            record.get("session_created_at"),
            Some("2024-05-01T09:00:00.000000Z")
        );
        assert_eq!(record.get("expires_at"), Some("2024-05-01T21:15:30.000000Z"));
        assert_eq!(record.get("last_login_at"), Some("2024-05-01T08:59:59.000000Z"));
        assert!(!record.contains("last_activity_at"));
        assert!(record.get("last_login_at") < record.get("session_created_at"));
    }

    #[test]
    fn test_notifications_disabled_is_lowercase_false() {
        let mut session = bare_session();
        session.notifications_enabled = false;
        let record = transform(&session, &AttributeMap::new(), migrated_at()).unwrap();
        assert_eq!(record.get("notifications_enabled"), Some("false"));
    }

    #[test]
    fn test_attributes_are_prefixed_and_serialized() {
        let mut attributes = AttributeMap::new();
        attributes.insert("cart".into(), Some("3 items".into()));
        attributes.insert("user_id".into(), Some("spoofed".into()));
        attributes.insert("referrer".into(), None);

        let record = transform(&bare_session(), &attributes, migrated_at()).unwrap();
        assert_eq!(record.get("attr_cart"), Some("3 items"));
        assert_eq!(record.get("attr_user_id"), Some("spoofed"));
        assert_eq!(record.get("attr_referrer"), Some(""));
        assert_eq!(record.get("user_id"), Some("7"));

        let parsed: AttributeMap =
            serde_json::from_str(record.get(ATTRIBUTES_JSON_FIELD).unwrap()).unwrap();
        assert_eq!(parsed, attributes);
    }

    #[test]
    fn test_empty_attribute_key_is_rejected() {
        let mut attributes = AttributeMap::new();
        attributes.insert("theme".into(), Some("dark".into()));
        attributes.insert(String::new(), Some("x".into()));

        let err = transform(&bare_session(), &attributes, migrated_at()).unwrap_err();
        assert!(matches!(
            err,
            TransformError::InvalidAttributeKey { ref key, .. } if key.is_empty()
        ));
    }

    #[test]
    fn test_control_characters_in_attribute_key_are_rejected() {
        let mut attributes = AttributeMap::new();
        attributes.insert("cart\nitems".into(), Some("3".into()));

        let err = transform(&bare_session(), &attributes, migrated_at()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid attribute key \"cart\\nitems\": key contains control characters"
        );
    }

    #[test]
    fn test_punctuation_in_attribute_key_is_kept() {
        let mut attributes = AttributeMap::new();
        attributes.insert("cart.items-v2".into(), Some("3".into()));

        let record = transform(&bare_session(), &attributes, migrated_at()).unwrap();
        assert_eq!(record.get("attr_cart.items-v2"), Some("3"));
    }

    #[test]
    fn test_json_escapes_attribute_content() {
        let mut attributes = AttributeMap::new();
        attributes.insert("quote".into(), Some("say \"hi\"\n".into()));
        let record = transform(&bare_session(), &attributes, migrated_at()).unwrap();
        let parsed: AttributeMap =
            serde_json::from_str(record.get(ATTRIBUTES_JSON_FIELD).unwrap()).unwrap();
        assert_eq!(parsed, attributes);
    }
}
