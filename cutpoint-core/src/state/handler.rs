use super::*;

/// Per-operator participant in the consistent-region protocol.
///
/// The four required methods are the cut lifecycle: `drain` flushes logical
/// state to outputs, `checkpoint` persists it, `reset` rebuilds it from a
/// committed cut, and `reset_to_initial_state` rebuilds it from nothing when
/// no cut has ever been sealed. Errors from these four mean the cut or reset
/// attempt failed and the region resets.
///
/// The remaining methods are notifications with no-op defaults, so existing
/// implementations keep compiling as the protocol grows. Errors from
/// notifications are logged and swallowed; they never fail a cut.
pub trait StateHandler: Send {
    /// Finish processing everything accepted so far and flush pending output.
    /// Runs only after every permit has been returned.
    fn drain(&mut self) -> Result<()>;

    /// Write the operator's state into the sink. The runtime commits after
    /// this returns; the handler never commits.
    fn checkpoint(&mut self, checkpoint: &mut Checkpoint) -> Result<()>;

    /// Replace current state with the contents of a committed cut. Frames
    /// come back in the order `checkpoint` wrote them.
    fn reset(&mut self, checkpoint: &mut Checkpoint) -> Result<()>;

    /// Replace current state with the operator's initial state.
    fn reset_to_initial_state(&mut self) -> Result<()>;

    /// The given cut is no longer needed; backing resources may be released.
    fn retire_checkpoint(&mut self, _sequence_id: SequenceId) -> Result<()> {
        Ok(())
    }

    /// The drain for `sequence_id` is complete and the checkpoint will run in
    /// the background while tuple flow resumes. Called only on handlers
    /// registered as non-blocking, before flow resumes.
    fn prepare_for_non_blocking_checkpoint(&mut self, _sequence_id: SequenceId) -> Result<()> {
        Ok(())
    }

    /// Every operator in the region has committed `sequence_id`. Delivered to
    /// start-of-region operators.
    fn region_checkpointed(&mut self, _sequence_id: SequenceId) -> Result<()> {
        Ok(())
    }

    /// The region is shutting down.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
