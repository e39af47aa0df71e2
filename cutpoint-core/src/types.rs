use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Identifier of a consistent cut. `-1` is the sentinel reported between a
/// failure and the next completed drain; real cuts are numbered from 1.
pub type SequenceId = i64;

/// Index of a consistent region within a job.
pub type RegionIndex = u32;

/// Identifier of an operator registered in a region. Assigned densely in
/// registration order, which is also the fan-out order for all protocol calls.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperatorId(pub u32);

impl std::fmt::Display for OperatorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "op-{}", self.0)
    }
}

/// Placement of an operator relative to the region boundary.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OperatorRoles {
    /// Receives permits for submissions originating outside the region.
    pub start_of_region: bool,
    /// Last operator before tuples leave the region.
    pub end_of_region: bool,
    /// May initiate cuts when the region is operator-driven.
    pub trigger_operator: bool,
}

impl OperatorRoles {
    pub fn start() -> Self {
        Self {
            start_of_region: true,
            ..Self::default()
        }
    }

    pub fn trigger() -> Self {
        Self {
            start_of_region: true,
            trigger_operator: true,
            ..Self::default()
        }
    }

    pub fn end() -> Self {
        Self {
            end_of_region: true,
            ..Self::default()
        }
    }
}

/// Wall-clock milliseconds since epoch. Recorded into checkpoint metadata so
/// an operator can tell at restore time how stale its state is.
pub fn wall_clock_millis() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis() as i64,
        Err(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_id_display() {
        assert_eq!(OperatorId(3).to_string(), "op-3");
    }

    #[test]
    fn roles_constructors() {
        assert!(OperatorRoles::trigger().trigger_operator);
        assert!(OperatorRoles::trigger().start_of_region);
        assert!(!OperatorRoles::end().start_of_region);
        assert!(OperatorRoles::end().end_of_region);
    }

    #[test]
    fn wall_clock_is_positive() {
        assert!(wall_clock_millis() > 0);
    }
}
