use super::*;

/// Marker persisted once every operator of a cut has committed. A cut with no
/// sealed metadata is invisible to [`CheckpointStore::latest`] and is never
/// used for restore.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckpointMetadata {
    pub sequence_id: SequenceId,
    /// Wall-clock milliseconds when the cut was sealed.
    pub timestamp: i64,
    /// Operators that contributed a blob, in registration order.
    pub operators: Vec<OperatorId>,
}

impl CheckpointMetadata {
    pub fn new(sequence_id: SequenceId, operators: Vec<OperatorId>) -> Self {
        Self {
            sequence_id,
            timestamp: wall_clock_millis(),
            operators,
        }
    }
}
