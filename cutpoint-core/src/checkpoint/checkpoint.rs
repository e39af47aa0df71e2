use super::*;

/// Direction of a [`Checkpoint`]. An instance is a write-once sink or a
/// read-only source for its whole lifetime, never both.
enum CheckpointIo {
    Writing(Vec<u8>),
    Reading { bytes: Vec<u8>, cursor: usize },
}

/// One operator's slice of a consistent cut.
///
/// Handed to [`StateHandler::checkpoint`](crate::state::StateHandler::checkpoint)
/// as a sink and to [`StateHandler::reset`](crate::state::StateHandler::reset)
/// as a source. Values written with [`put`](Self::put) come back from
/// [`get`](Self::get) in the same order; the frame layout is positional, so
/// both sides must agree on the sequence of calls. The runtime commits the
/// sink after the handler returns; handlers never commit.
pub struct Checkpoint {
    sequence_id: SequenceId,
    operator: OperatorId,
    timestamp: i64,
    io: CheckpointIo,
}

impl Checkpoint {
    /// Open a fresh sink for the given cut.
    pub fn for_writing(sequence_id: SequenceId, operator: OperatorId) -> Self {
        Self {
            sequence_id,
            operator,
            timestamp: wall_clock_millis(),
            io: CheckpointIo::Writing(Vec::new()),
        }
    }

    /// Open a source over previously committed bytes.
    pub fn for_reading(
        sequence_id: SequenceId,
        operator: OperatorId,
        timestamp: i64,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            sequence_id,
            operator,
            timestamp,
            io: CheckpointIo::Reading { bytes, cursor: 0 },
        }
    }

    /// The cut this checkpoint belongs to.
    pub fn sequence_id(&self) -> SequenceId {
        self.sequence_id
    }

    pub fn operator(&self) -> OperatorId {
        self.operator
    }

    /// Wall-clock milliseconds at which the sink was opened. Meaningful at
    /// restore time: time-based policies are never paused, so state may be
    /// arbitrarily stale relative to this.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Append one serialized value as a length-prefixed frame.
    pub fn put<T: Serialize>(&mut self, value: &T) -> Result<()> {
        let frame = bincode::serialize(value).context("serialize checkpoint frame failed")?;
        self.put_bytes(&frame)
    }

    /// Append one raw frame.
    pub fn put_bytes(&mut self, frame: &[u8]) -> Result<()> {
        match &mut self.io {
            CheckpointIo::Writing(buf) => {
                buf.extend_from_slice(&(frame.len() as u64).to_le_bytes());
                buf.extend_from_slice(frame);
                Ok(())
            }
            CheckpointIo::Reading { .. } => Err(anyhow!(
                "checkpoint {} for {} is open for reading",
                self.sequence_id,
                self.operator
            )),
        }
    }

    /// Read the next frame and deserialize it.
    pub fn get<T: DeserializeOwned>(&mut self) -> Result<T> {
        let frame = self.get_bytes()?;
        bincode::deserialize(&frame).context("deserialize checkpoint frame failed")
    }

    /// Read the next raw frame.
    pub fn get_bytes(&mut self) -> Result<Vec<u8>> {
        match &mut self.io {
            CheckpointIo::Reading { bytes, cursor } => {
                let remaining = bytes.len() - *cursor;
                if remaining < 8 {
                    return Err(anyhow!(
                        "checkpoint {} for {} is exhausted",
                        self.sequence_id,
                        self.operator
                    ));
                }
                let mut len_bytes = [0u8; 8];
                len_bytes.copy_from_slice(&bytes[*cursor..*cursor + 8]);
                let len = u64::from_le_bytes(len_bytes) as usize;
                let start = *cursor + 8;
                if bytes.len() - start < len {
                    return Err(anyhow!(
                        "checkpoint {} for {} is truncated: frame wants {} bytes, {} remain",
                        self.sequence_id,
                        self.operator,
                        len,
                        bytes.len() - start
                    ));
                }
                *cursor = start + len;
                Ok(bytes[start..start + len].to_vec())
            }
            CheckpointIo::Writing(_) => Err(anyhow!(
                "checkpoint {} for {} is open for writing",
                self.sequence_id,
                self.operator
            )),
        }
    }

    /// Consume a sink, yielding the bytes to persist.
    pub(crate) fn into_written_bytes(self) -> Result<(CheckpointMetadataEntry, Vec<u8>)> {
        match self.io {
            CheckpointIo::Writing(buf) => Ok((
                CheckpointMetadataEntry {
                    sequence_id: self.sequence_id,
                    operator: self.operator,
                    timestamp: self.timestamp,
                },
                buf,
            )),
            CheckpointIo::Reading { .. } => Err(anyhow!(
                "cannot commit checkpoint {} for {}: opened for reading",
                self.sequence_id,
                self.operator
            )),
        }
    }
}

/// Key of one committed operator blob.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CheckpointMetadataEntry {
    pub sequence_id: SequenceId,
    pub operator: OperatorId,
    pub timestamp: i64,
}
