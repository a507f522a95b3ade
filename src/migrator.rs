//! Sequences extraction, transformation, loading and verification.

use std::fmt;

use chrono::Utc;
use futures::StreamExt;
use sea_orm::{Database, DatabaseConnection};
use tracing::{debug, error, info, trace, warn};

use crate::config::MigrationConfig;
use crate::error::{MigrationError, RecordError};
use crate::extract::{ExtractedSession, SessionExtractor};
use crate::load::load_session;
use crate::sink::{RedisSink, SessionSink};
use crate::transform::transform;
use crate::ttl::remaining_lifetime;
use crate::verify::{VerificationReport, Verifier};

/// Where a migration run is.
///
/// ```text
/// Init -> Connecting -> Extracting -> Migrating -> Verifying -> Done
///              |             |    \________________________/^
///              +-------------+--> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    Init,
    Connecting,
    Extracting,
    Migrating,
    Verifying,
    Done,
    Failed,
}

impl MigrationState {
    /// Whether the state machine may move from `self` to `next`.
    pub fn can_transition_to(self, next: MigrationState) -> bool {
        use MigrationState::*;
        matches!(
            (self, next),
            (Init, Connecting)
                | (Connecting, Extracting)
                | (Connecting, Failed)
                | (Extracting, Migrating)
                | (Extracting, Done)
                | (Extracting, Failed)
                | (Migrating, Verifying)
                | (Migrating, Done)
                | (Migrating, Failed)
                | (Verifying, Done)
        )
    }

    /// Whether the run has ended, successfully or not.
    pub fn is_terminal(self) -> bool {
        matches!(self, MigrationState::Done | MigrationState::Failed)
    }
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MigrationState::Init => "init",
            MigrationState::Connecting => "connecting",
            MigrationState::Extracting => "extracting",
            MigrationState::Migrating => "migrating",
            MigrationState::Verifying => "verifying",
            MigrationState::Done => "done",
            MigrationState::Failed => "failed",
        };
        f.write_str(name)
    }
}

fn advance(state: &mut MigrationState, next: MigrationState) {
    debug_assert!(
        state.can_transition_to(next),
        "invalid migration transition {state} -> {next}"
    );
    debug!(from = %state, to = %next, "migration state change");
    *state = next;
}

/// A session that made it into the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedRecord {
    pub session_id: String,
    /// Sink key the hash was written under.
    pub key: String,
    pub field_count: usize,
    /// TTL applied to the key, `None` when stored without expiration.
    pub ttl: Option<u64>,
}

/// A session that did not make it into the sink.
#[derive(Debug)]
pub struct RecordFailure {
    pub session_id: String,
    pub error: RecordError,
}

/// Per-record result of the migrate phase.
pub type RecordResult = Result<LoadedRecord, RecordFailure>;

/// Everything a finished run reports.
#[derive(Debug)]
pub struct MigrationOutcome {
    /// Terminal state of the run.
    pub state: MigrationState,
    /// Number of sessions read from the source.
    pub extracted: usize,
    /// One entry per extracted session, in extraction order.
    pub results: Vec<RecordResult>,
    /// Present when at least one session was loaded.
    pub verification: Option<VerificationReport>,
}

impl MigrationOutcome {
    /// Number of sessions written to the sink.
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_ok()).count()
    }

    /// Number of sessions that failed to transform or load.
    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| r.is_err()).count()
    }

    /// The failed sessions, in extraction order.
    pub fn failures(&self) -> impl Iterator<Item = &RecordFailure> {
        self.results.iter().filter_map(|r| r.as_ref().err())
    }

    /// Whether verification passed, or `None` when it did not run.
    pub fn verification_passed(&self) -> Option<bool> {
        self.verification.as_ref().map(VerificationReport::passed)
    }

    /// True when every record loaded and verification, if it ran, passed.
    ///
    /// An empty source counts as success.
    pub fn is_success(&self) -> bool {
        self.state == MigrationState::Done
            && self.failed() == 0
            && self.verification_passed().unwrap_or(true)
    }
}

/// Transforms and loads one extracted session.
pub async fn migrate_session<S>(sink: &S, session: ExtractedSession) -> RecordResult
where
    S: SessionSink + ?Sized,
{
    let ExtractedSession {
        record,
        attributes,
        raw_attributes,
    } = session;
    trace!(session_id = %record.session_id, ?raw_attributes, "raw session attributes");

    let result = async {
        let flat = transform(&record, &attributes, Utc::now())?;
        let lifetime = remaining_lifetime(record.expires_at.as_ref());
        let key = load_session(sink, &record.session_id, &flat, lifetime).await?;
        Ok::<_, RecordError>(LoadedRecord {
            session_id: record.session_id.clone(),
            key,
            field_count: flat.len(),
            ttl: lifetime.seconds(),
        })
    }
    .await;

    result.map_err(|error| RecordFailure {
        session_id: record.session_id,
        error,
    })
}

/// Connects to both stores and runs a full migration.
///
/// Returns `Err` when a store is unreachable or extraction fails. Otherwise
/// the outcome carries per-record results and the verification report.
pub async fn migrate(config: &MigrationConfig) -> Result<MigrationOutcome, MigrationError> {
    info!("starting session migration");
    let migrator = SessionMigrator::connect(config).await?;
    migrator.run().await
}

/// Owns the source and sink connections for the length of one run.
pub struct SessionMigrator<S> {
    conn: DatabaseConnection,
    sink: S,
    state: MigrationState,
    sample_size: usize,
    ttl_scan_limit: usize,
    progress_interval: usize,
    concurrency: usize,
}

impl<S: fmt::Debug> fmt::Debug for SessionMigrator<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionMigrator")
            .field("sink", &self.sink)
            .field("state", &self.state)
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl SessionMigrator<RedisSink> {
    /// Opens the source database and the Redis sink described by `config`.
    ///
    /// If the sink is unreachable the already opened source is closed again.
    pub async fn connect(config: &MigrationConfig) -> Result<Self, MigrationError> {
        let mut state = MigrationState::Init;
        advance(&mut state, MigrationState::Connecting);

        let conn = match Database::connect(config.source.connect_options()).await {
            Ok(conn) => conn,
            Err(err) => {
                error!(error = %err, "failed to connect to source database");
                advance(&mut state, MigrationState::Failed);
                return Err(MigrationError::SourceConnection(err));
            }
        };
        info!("connected to source database");

        let sink = match RedisSink::connect(&config.sink.url).await {
            Ok(sink) => sink,
            Err(err) => {
                error!(error = %err, "failed to connect to sink");
                advance(&mut state, MigrationState::Failed);
                if let Err(close_err) = conn.close().await {
                    warn!(error = %close_err, "failed to close source connection");
                }
                return Err(MigrationError::SinkConnection(err));
            }
        };
        info!("connected to sink");

        Ok(Self::new(conn, sink).with_config(config))
    }
}

impl<S: SessionSink> SessionMigrator<S> {
    /// Wraps connections that are already open.
    pub fn new(conn: DatabaseConnection, sink: S) -> Self {
        Self {
            conn,
            sink,
            state: MigrationState::Connecting,
            sample_size: 3,
            ttl_scan_limit: 10,
            progress_interval: 10,
            concurrency: 1,
        }
    }

    /// Copies the run settings (not the connection URLs) from `config`.
    pub fn with_config(mut self, config: &MigrationConfig) -> Self {
        self.sample_size = config.sample_size;
        self.ttl_scan_limit = config.ttl_scan_limit;
        self.progress_interval = config.progress_interval;
        self.concurrency = config.concurrency.max(1);
        self
    }

    /// Current state of the run.
    pub fn state(&self) -> MigrationState {
        self.state
    }

    /// Runs the migration, then releases both connections whatever happened.
    pub async fn run(mut self) -> Result<MigrationOutcome, MigrationError> {
        let result = self.execute().await;
        self.release().await;
        result
    }

    async fn execute(&mut self) -> Result<MigrationOutcome, MigrationError> {
        advance(&mut self.state, MigrationState::Extracting);
        info!("extracting session data");
        let sessions = match SessionExtractor::new(&self.conn).extract().await {
            Ok(sessions) => sessions,
            Err(err) => {
                error!(error = %err, "extraction failed");
                advance(&mut self.state, MigrationState::Failed);
                return Err(err.into());
            }
        };

        let extracted = sessions.len();
        if sessions.is_empty() {
            warn!("no session data found to migrate");
            advance(&mut self.state, MigrationState::Done);
            return Ok(MigrationOutcome {
                state: self.state,
                extracted,
                results: Vec::new(),
                verification: None,
            });
        }

        advance(&mut self.state, MigrationState::Migrating);
        info!(count = extracted, "starting migration of sessions");
        let results = self.migrate_all(sessions).await;

        let mut outcome = MigrationOutcome {
            state: self.state,
            extracted,
            results,
            verification: None,
        };
        info!(
            succeeded = outcome.succeeded(),
            failed = outcome.failed(),
            "migration completed"
        );

        if outcome.succeeded() > 0 {
            advance(&mut self.state, MigrationState::Verifying);
            let report = Verifier::new(&self.sink)
                .with_sample_size(self.sample_size)
                .with_ttl_scan_limit(self.ttl_scan_limit)
                .verify(extracted)
                .await;
            if report.passed() {
                info!("migration verification passed");
            } else {
                warn!("migration verification failed");
            }
            outcome.verification = Some(report);
        }

        advance(&mut self.state, MigrationState::Done);
        outcome.state = self.state;
        Ok(outcome)
    }

    async fn migrate_all(&self, sessions: Vec<ExtractedSession>) -> Vec<RecordResult> {
        let sink = &self.sink;
        let mut results = Vec::with_capacity(sessions.len());
        let mut succeeded = 0usize;

        // `buffered` yields in input order, so results line up with extraction order.
        let mut stream = futures::stream::iter(sessions)
            .map(|session| migrate_session(sink, session))
            .buffered(self.concurrency);

        while let Some(result) = stream.next().await {
            match &result {
                Ok(loaded) => {
                    succeeded += 1;
                    debug!(session_id = %loaded.session_id, key = %loaded.key, "session migrated");
                    if self.progress_interval > 0 && succeeded % self.progress_interval == 0 {
                        info!(succeeded, "migrated sessions");
                    }
                }
                Err(failure) => {
                    error!(
                        session_id = %failure.session_id,
                        error = %failure.error,
                        "failed to migrate session"
                    );
                }
            }
            results.push(result);
        }

        results
    }

    async fn release(self) {
        match self.conn.close().await {
            Ok(()) => info!("source connection closed"),
            Err(err) => warn!(error = %err, "failed to close source connection"),
        }
        match self.sink.close().await {
            Ok(()) => info!("sink connection closed"),
            Err(err) => warn!(error = %err, "failed to close sink connection"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::MigrationState::*;

    #[test]
    fn test_happy_path_transitions() {
        let path = [Init, Connecting, Extracting, Migrating, Verifying, Done];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_failure_transitions() {
        assert!(Connecting.can_transition_to(Failed));
        assert!(Extracting.can_transition_to(Failed));
        assert!(!Verifying.can_transition_to(Failed));
        assert!(!Init.can_transition_to(Failed));
    }

    #[test]
    fn test_terminal_states_are_final() {
        for next in [Init, Connecting, Extracting, Migrating, Verifying, Done, Failed] {
            assert!(!Done.can_transition_to(next));
            assert!(!Failed.can_transition_to(next));
        }
        assert!(Done.is_terminal());
        assert!(!Migrating.is_terminal());
    }

    #[test]
    fn test_skipping_phases_is_rejected() {
        assert!(!Connecting.can_transition_to(Migrating));
        assert!(!Extracting.can_transition_to(Verifying));
    }
}
