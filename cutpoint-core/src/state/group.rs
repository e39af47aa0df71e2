use super::*;

/// Ordered, append-only composition of [`StateHandler`]s.
///
/// Every protocol call fans out front-to-back in registration order, the
/// same order for checkpoint and for reset, so positional checkpoint data
/// reads back into the member that wrote it. The first
/// member error aborts the fan-out and propagates (fail-fast); members after
/// it are not invoked. Registration order must therefore be stable across
/// restarts.
#[derive(Default)]
pub struct StateHandlerGroup {
    handlers: Vec<Box<dyn StateHandler>>,
}

impl StateHandlerGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler. There is no removal; the group only grows.
    pub fn register(&mut self, handler: Box<dyn StateHandler>) {
        self.handlers.push(handler);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl StateHandler for StateHandlerGroup {
    fn drain(&mut self) -> Result<()> {
        for handler in &mut self.handlers {
            handler.drain()?;
        }
        Ok(())
    }

    fn checkpoint(&mut self, checkpoint: &mut Checkpoint) -> Result<()> {
        for handler in &mut self.handlers {
            handler.checkpoint(checkpoint)?;
        }
        Ok(())
    }

    fn reset(&mut self, checkpoint: &mut Checkpoint) -> Result<()> {
        for handler in &mut self.handlers {
            handler.reset(checkpoint)?;
        }
        Ok(())
    }

    fn reset_to_initial_state(&mut self) -> Result<()> {
        for handler in &mut self.handlers {
            handler.reset_to_initial_state()?;
        }
        Ok(())
    }

    fn retire_checkpoint(&mut self, sequence_id: SequenceId) -> Result<()> {
        for handler in &mut self.handlers {
            handler.retire_checkpoint(sequence_id)?;
        }
        Ok(())
    }

    fn prepare_for_non_blocking_checkpoint(&mut self, sequence_id: SequenceId) -> Result<()> {
        for handler in &mut self.handlers {
            handler.prepare_for_non_blocking_checkpoint(sequence_id)?;
        }
        Ok(())
    }

    fn region_checkpointed(&mut self, sequence_id: SequenceId) -> Result<()> {
        for handler in &mut self.handlers {
            handler.region_checkpointed(sequence_id)?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        for handler in &mut self.handlers {
            handler.close()?;
        }
        Ok(())
    }
}
