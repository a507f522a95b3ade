//! Post-load checks on the sink.

use tracing::{info, warn};

use crate::error::{SinkError, VerificationFailure};
use crate::sink::{KeyTtl, SessionSink, SESSION_KEY_PATTERN};

/// Placeholder for sample fields missing from a hash.
pub const NOT_AVAILABLE: &str = "N/A";

/// Details of one sampled key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleReport {
    pub key: String,
    pub field_count: usize,
    pub ttl: KeyTtl,
    /// [`NOT_AVAILABLE`] when the hash has no such field.
    pub user_id: String,
    /// [`NOT_AVAILABLE`] when the hash has no such field.
    pub username: String,
}

/// A sampled key that could not be read back.
#[derive(Debug)]
pub struct SampleFailure {
    pub key: String,
    pub error: SinkError,
}

/// How the lifetimes of the inspected keys are distributed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TtlSummary {
    /// Keys with an expiration.
    pub active: usize,
    /// Keys without one.
    pub persistent: usize,
    /// Keys that vanished between listing and inspection.
    pub missing: usize,
    pub min: Option<u64>,
    pub max: Option<u64>,
    pub average: Option<u64>,
}

impl TtlSummary {
    /// Tallies TTL replies. `min`, `max` and `average` cover active keys only.
    pub fn from_ttls(ttls: impl IntoIterator<Item = KeyTtl>) -> Self {
        let mut summary = Self::default();
        let mut active = Vec::new();
        for ttl in ttls {
            match ttl {
                KeyTtl::Missing => summary.missing += 1,
                KeyTtl::Persistent => summary.persistent += 1,
                KeyTtl::Expires(secs) => active.push(secs),
            }
        }
        summary.active = active.len();
        summary.min = active.iter().copied().min();
        summary.max = active.iter().copied().max();
        if !active.is_empty() {
            summary.average = Some(active.iter().sum::<u64>() / active.len() as u64);
        }
        summary
    }
}

/// Result of a verification pass.
#[derive(Debug)]
pub struct VerificationReport {
    /// Number of records extracted from the source.
    pub expected: usize,
    /// Number of session keys present in the sink, when they could be listed.
    pub found: Option<usize>,
    /// Keys read back in full, in lexical key order.
    pub samples: Vec<SampleReport>,
    pub sample_failures: Vec<SampleFailure>,
    pub ttl_summary: TtlSummary,
    /// Why the pass failed, if it did.
    pub failure: Option<VerificationFailure>,
}

impl VerificationReport {
    /// Whether the key count matched and the keys could be listed.
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

/// Compares sink contents against what was extracted.
#[derive(Debug, Clone, Copy)]
pub struct Verifier<'a, S: ?Sized> {
    sink: &'a S,
    sample_size: usize,
    ttl_scan_limit: usize,
}

impl<'a, S: SessionSink + ?Sized> Verifier<'a, S> {
    /// Creates a verifier sampling three keys and scanning ten for TTLs.
    pub fn new(sink: &'a S) -> Self {
        Self {
            sink,
            sample_size: 3,
            ttl_scan_limit: 10,
        }
    }

    /// Sets how many keys are read back in full.
    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size;
        self
    }

    /// Sets how many keys the TTL analysis reads.
    pub fn with_ttl_scan_limit(mut self, ttl_scan_limit: usize) -> Self {
        self.ttl_scan_limit = ttl_scan_limit;
        self
    }

    /// Counts `session:*` keys and compares against `expected`.
    ///
    /// `expected` is the number of extracted records, not the number loaded, so
    /// losses from any cause show up as a mismatch. Sampling errors are reported
    /// but never change the verdict.
    pub async fn verify(&self, expected: usize) -> VerificationReport {
        let mut keys = match self.sink.keys(SESSION_KEY_PATTERN).await {
            Ok(keys) => keys,
            Err(err) => {
                warn!(error = %err, "could not list session keys");
                return VerificationReport {
                    expected,
                    found: None,
                    samples: Vec::new(),
                    sample_failures: Vec::new(),
                    ttl_summary: TtlSummary::default(),
                    failure: Some(VerificationFailure::KeyListing(err)),
                };
            }
        };
        keys.sort();
        let found = keys.len();

        info!(expected, found, "verification counts");
        let failure = if found == expected {
            None
        } else {
            warn!(expected, found, "count mismatch");
            Some(VerificationFailure::Mismatch { expected, found })
        };

        let mut samples = Vec::new();
        let mut sample_failures = Vec::new();
        for key in keys.iter().take(self.sample_size) {
            match self.sample(key).await {
                Ok(sample) => {
                    info!(
                        key = %sample.key,
                        fields = sample.field_count,
                        ttl = sample.ttl.as_reply(),
                        user_id = %sample.user_id,
                        username = %sample.username,
                        "sample verification"
                    );
                    samples.push(sample);
                }
                Err(error) => {
                    warn!(%key, %error, "failed to sample session key");
                    sample_failures.push(SampleFailure {
                        key: key.clone(),
                        error,
                    });
                }
            }
        }

        let mut ttls = Vec::new();
        for key in keys.iter().take(self.ttl_scan_limit) {
            match self.sink.ttl(key).await {
                Ok(ttl) => ttls.push(ttl),
                Err(err) => warn!(%key, error = %err, "failed to read ttl"),
            }
        }
        let ttl_summary = TtlSummary::from_ttls(ttls);
        info!(
            active = ttl_summary.active,
            persistent = ttl_summary.persistent,
            missing = ttl_summary.missing,
            "ttl analysis"
        );

        VerificationReport {
            expected,
            found: Some(found),
            samples,
            sample_failures,
            ttl_summary,
            failure,
        }
    }

    async fn sample(&self, key: &str) -> Result<SampleReport, SinkError> {
        let fields = self.sink.hash_fields(key).await?;
        let ttl = self.sink.ttl(key).await?;
        let field = |name: &str| {
            fields
                .get(name)
                .cloned()
                .unwrap_or_else(|| NOT_AVAILABLE.to_string())
        };
        Ok(SampleReport {
            key: key.to_string(),
            field_count: fields.len(),
            ttl,
            user_id: field("user_id"),
            username: field("username"),
        })
    }
}
