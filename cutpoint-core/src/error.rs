use std::time::Duration;
use thiserror::Error;

/// Failure taxonomy for the consistent-region protocol.
///
/// Infrastructure code returns `anyhow::Result`; callers that need to react
/// to a specific failure class can downcast to this enum. `PermitViolation`
/// and `ProtocolMisuse` are programming errors and are never retried.
#[derive(Debug, Error)]
pub enum RegionError {
    /// A state handler failed during drain, checkpoint, or reset. Leads to a
    /// region reset.
    #[error("state handler failed during {phase}: {message}")]
    Handler { phase: &'static str, message: String },

    /// An operation that requires a permit ran without one, or a permit from
    /// a different region was presented. Fatal.
    #[error("permit protocol violated: {0}")]
    PermitViolation(String),

    /// The region API was used outside its contract, e.g. mixing blocking and
    /// non-blocking cut entry points. Fatal.
    #[error("consistent region misuse: {0}")]
    ProtocolMisuse(String),

    /// The checkpoint store failed. Fatal on the restore path.
    #[error("checkpoint store failure: {0}")]
    Store(String),

    /// A drain or reset phase exceeded its configured bound. Leads to a
    /// region reset.
    #[error("timed out after {timeout:?} waiting for {waiting_for}")]
    Timeout {
        timeout: Duration,
        waiting_for: &'static str,
    },

    /// The reset loop exhausted its configured attempt budget.
    #[error("region reset did not converge after {0} attempts")]
    ResetFailed(u32),

    /// The region was shut down while an operation was in flight.
    #[error("region is shut down")]
    Shutdown,
}

impl RegionError {
    pub fn handler(phase: &'static str, err: &anyhow::Error) -> Self {
        Self::Handler {
            phase,
            message: format!("{err:#}"),
        }
    }
}
