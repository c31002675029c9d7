//! Error taxonomy (spec §7).
//!
//! Errors are contained at the component boundary the classifier, the
//! coalescer and the orchestrator never propagate a per-event fault past
//! their own call site; only [`DaemonError::Config`] on the *initial* load
//! is fatal to the process (CLI exit code 128).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration malformed, unavailable, or symbolic ref missing.
    #[error("configuration error: {0}")]
    Config(String),

    /// `git ls-remote` returned no matching ref.
    #[error("unknown ref: {0}")]
    UnknownRef(String),

    /// A bus message's topic isn't one the classifier recognizes.
    #[error("unrecognized bus event: {0}")]
    BusEventUnrecognized(String),

    /// Component dropped by strict mode or the exclude list.
    #[error("component ineligible: {0}")]
    ComponentIneligible(String),

    /// A build-system RPC raised during classification enrichment.
    #[error("enrichment failed for {component}: {source}")]
    EnrichmentFailure {
        component: String,
        #[source]
        source: anyhow::Error,
    },

    /// `wait_repo` exceeded its per-handle timeout.
    #[error("wait for repo regeneration on tag {0} timed out")]
    WaitTimeout(String),

    /// Session init or authentication failed.
    #[error("session failure for {role}: {source}")]
    SessionFailure {
        role: String,
        #[source]
        source: anyhow::Error,
    },
}
