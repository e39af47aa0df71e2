use crate::error::RegionError;
use crate::types::RegionIndex;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default drain bound, in seconds.
pub const DEFAULT_DRAIN_TIMEOUT_SECS: f64 = 180.0;
/// Default per-attempt reset bound, in seconds.
pub const DEFAULT_RESET_TIMEOUT_SECS: f64 = 300.0;

/// What establishes cuts for a region.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum TriggerKind {
    /// A background driver establishes a cut every `period_secs` seconds.
    /// Operator calls to `make_consistent` wait for the next scheduled cut.
    Periodic { period_secs: f64 },
    /// Only the trigger operator initiates cuts.
    OperatorDriven,
}

impl TriggerKind {
    pub fn periodic(period: Duration) -> Self {
        Self::Periodic {
            period_secs: period.as_secs_f64(),
        }
    }
}

/// Region-level configuration. Deserializable so a job description can carry
/// it; built programmatically via the `with_*` methods otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionConfig {
    pub index: RegionIndex,
    pub trigger: TriggerKind,
    /// Bound on the drain plus checkpoint phase of one cut, in seconds.
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_secs: f64,
    /// Bound on one reset attempt, in seconds.
    #[serde(default = "default_reset_timeout")]
    pub reset_timeout_secs: f64,
    /// Cap on consecutive reset attempts. `None` retries until shutdown.
    #[serde(default)]
    pub max_reset_attempts: Option<u32>,
}

fn default_drain_timeout() -> f64 {
    DEFAULT_DRAIN_TIMEOUT_SECS
}

fn default_reset_timeout() -> f64 {
    DEFAULT_RESET_TIMEOUT_SECS
}

impl RegionConfig {
    pub fn new(index: RegionIndex, trigger: TriggerKind) -> Self {
        Self {
            index,
            trigger,
            drain_timeout_secs: DEFAULT_DRAIN_TIMEOUT_SECS,
            reset_timeout_secs: DEFAULT_RESET_TIMEOUT_SECS,
            max_reset_attempts: None,
        }
    }

    pub fn operator_driven(index: RegionIndex) -> Self {
        Self::new(index, TriggerKind::OperatorDriven)
    }

    pub fn periodic(index: RegionIndex, period: Duration) -> Self {
        Self::new(index, TriggerKind::periodic(period))
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout_secs = timeout.as_secs_f64();
        self
    }

    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout_secs = timeout.as_secs_f64();
        self
    }

    pub fn with_max_reset_attempts(mut self, attempts: u32) -> Self {
        self.max_reset_attempts = Some(attempts);
        self
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.drain_timeout_secs)
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.reset_timeout_secs)
    }

    /// Reject configurations the protocol cannot run under.
    pub fn validate(&self) -> Result<()> {
        if !self.drain_timeout_secs.is_finite() || self.drain_timeout_secs < 0.0 {
            return Err(RegionError::ProtocolMisuse(format!(
                "drain timeout must be a non-negative finite number of seconds, got {}",
                self.drain_timeout_secs
            ))
            .into());
        }
        if !self.reset_timeout_secs.is_finite() || self.reset_timeout_secs <= 0.0 {
            return Err(RegionError::ProtocolMisuse(format!(
                "reset timeout must be a positive finite number of seconds, got {}",
                self.reset_timeout_secs
            ))
            .into());
        }
        if let TriggerKind::Periodic { period_secs } = self.trigger {
            if !period_secs.is_finite() || period_secs <= 0.0 {
                return Err(RegionError::ProtocolMisuse(format!(
                    "periodic trigger period must be positive, got {period_secs}"
                ))
                .into());
            }
        }
        Ok(())
    }
}
