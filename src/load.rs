//! Writes flat records into the sink.

use tracing::{debug, warn};

use crate::error::LoadError;
use crate::sink::{session_key, SessionSink};
use crate::transform::FlatRecord;
use crate::ttl::Lifetime;

/// Stores `record` under `session:<session_id>` and applies its lifetime.
///
/// The hash is replaced wholesale, so loading the same record twice leaves the
/// same entry as loading it once. Only [`Lifetime::Ttl`] sets an expiration;
/// sessions without one, or already past it, are stored without expiration.
///
/// # Returns
///
/// * `Ok(key)` - The key that was written.
/// * `Err(LoadError)` - The hash write or the expiration failed.
pub async fn load_session<S>(
    sink: &S,
    session_id: &str,
    record: &FlatRecord,
    lifetime: Lifetime,
) -> Result<String, LoadError>
where
    S: SessionSink + ?Sized,
{
    let key = session_key(session_id);

    sink.replace_hash(&key, record.fields())
        .await
        .map_err(|source| LoadError::Write {
            key: key.clone(),
            source,
        })?;

    match lifetime {
        Lifetime::Ttl(secs) if secs > 0 => {
            sink.expire(&key, secs)
                .await
                .map_err(|source| LoadError::Expire {
                    key: key.clone(),
                    ttl: secs,
                    source,
                })?;
            debug!(%session_id, ttl = secs, "set ttl on session key");
        }
        Lifetime::Ttl(_) | Lifetime::Unbounded => {
            debug!(%session_id, "session has no expiration, storing without ttl")
        }
        Lifetime::Elapsed => warn!(%session_id, "session has already expired, storing anyway"),
    }

    Ok(key)
}
