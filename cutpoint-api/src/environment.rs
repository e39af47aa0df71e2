use std::sync::Arc;

use anyhow::Result;
use cutpoint_core::checkpoint::CheckpointStore;
use cutpoint_core::config::RegionConfig;
use cutpoint_core::error::RegionError;
use cutpoint_core::region::{
    ConsistentRegion, DrainResult, RegionBuilder, RegionPermit, RegionState,
};
use cutpoint_core::state::StateHandler;
use cutpoint_core::types::{OperatorId, OperatorRoles, SequenceId};
use tracing::debug;

/// The entry point for assembling a consistent region.
///
/// Create an environment with a config and a checkpoint store, register
/// operators via [`add_operator`](Self::add_operator), attach their state
/// handlers, and call [`build`](Self::build) to start the region.
pub struct RegionEnvironment {
    builder: RegionBuilder,
    operators: usize,
}

impl RegionEnvironment {
    pub fn new(config: RegionConfig, store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            builder: RegionBuilder::new(config, store),
            operators: 0,
        }
    }

    /// Register an operator and return a setup handle for attaching state
    /// handlers and the non-blocking opt-in. Registration order is the
    /// checkpoint layout order and must be stable across restarts.
    pub fn add_operator(&mut self, name: &str, roles: OperatorRoles) -> OperatorSetup<'_> {
        let id = self.builder.add_operator(name, roles);
        self.operators += 1;
        OperatorSetup {
            builder: &mut self.builder,
            id,
        }
    }

    /// Validate the region, restore from the store if it holds a sealed cut,
    /// and start the background threads.
    pub fn build(self) -> Result<RegionRuntime> {
        debug!(operators = self.operators, "building region");
        let region = self.builder.build()?;
        Ok(RegionRuntime { region })
    }
}

/// Per-operator configuration during assembly. Everything here is fixed once
/// [`RegionEnvironment::build`] runs.
pub struct OperatorSetup<'a> {
    builder: &'a mut RegionBuilder,
    id: OperatorId,
}

impl OperatorSetup<'_> {
    pub fn id(&self) -> OperatorId {
        self.id
    }

    /// Append a state handler to this operator's group.
    pub fn with_handler(self, handler: Box<dyn StateHandler>) -> Result<Self> {
        self.builder.add_handler(self.id, handler)?;
        Ok(self)
    }

    /// Let this operator's handlers checkpoint in the background during
    /// non-blocking cuts.
    pub fn with_non_blocking_checkpoint(self) -> Result<Self> {
        self.builder.set_non_blocking(self.id, true)?;
        Ok(self)
    }
}

/// A running region. Cloneable handles to individual operators come from
/// [`operator`](Self::operator); region-wide controls live here.
pub struct RegionRuntime {
    region: Arc<ConsistentRegion>,
}

impl RegionRuntime {
    pub fn operator(&self, id: OperatorId) -> Result<OperatorHandle> {
        if self.region.operator_roles(id).is_none() {
            return Err(RegionError::ProtocolMisuse(format!("unknown operator {id}")).into());
        }
        Ok(OperatorHandle {
            region: Arc::clone(&self.region),
            id,
        })
    }

    pub fn sequence_id(&self) -> Result<SequenceId> {
        self.region.sequence_id()
    }

    pub fn state(&self) -> Result<RegionState> {
        self.region.state()
    }

    pub fn reset_attempt(&self) -> Result<i64> {
        self.region.reset_attempt()
    }

    /// Reset the whole region to its newest sealed cut. Must not be called
    /// while holding a permit.
    pub fn request_reset(&self) -> Result<()> {
        self.region.request_reset()
    }

    pub fn shutdown(&self) -> Result<()> {
        self.region.shutdown()
    }

    pub fn region(&self) -> &Arc<ConsistentRegion> {
        &self.region
    }
}

/// One operator's view of the running region.
#[derive(Clone)]
pub struct OperatorHandle {
    region: Arc<ConsistentRegion>,
    id: OperatorId,
}

impl std::fmt::Debug for OperatorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorHandle")
            .field("region", &self.region.index())
            .field("id", &self.id)
            .finish()
    }
}

impl OperatorHandle {
    pub fn id(&self) -> OperatorId {
        self.id
    }

    pub fn roles(&self) -> OperatorRoles {
        self.region.operator_roles(self.id).unwrap_or_default()
    }

    /// Acquire a permit for processing. Blocks while the region pauses for a
    /// cut or reset.
    pub fn acquire_permit(&self) -> Result<RegionPermit> {
        self.region.acquire_permit()
    }

    /// Establish a blocking consistent cut. See
    /// [`ConsistentRegion::make_consistent`].
    pub fn make_consistent(&self, permit: RegionPermit) -> Result<(bool, RegionPermit)> {
        self.region.make_consistent(self.id, permit)
    }

    /// Establish a cut with background checkpointing for opted-in handlers.
    /// See [`ConsistentRegion::make_consistent_non_blocking`].
    pub fn make_consistent_non_blocking(
        &self,
        permit: RegionPermit,
    ) -> Result<(DrainResult, RegionPermit)> {
        self.region.make_consistent_non_blocking(self.id, permit)
    }

    /// Report a transient failure and reset the region. Must not be called
    /// while holding a permit.
    pub fn request_reset(&self) -> Result<()> {
        self.region.request_reset()
    }
}
