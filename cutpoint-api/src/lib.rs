//! # cutpoint-api
//!
//! Operator-facing facade over [`cutpoint_core`]: declare a region, register
//! operators and their state handlers, then drive cuts through
//! [`OperatorHandle`]s.
//!
//! ```no_run
//! use cutpoint_api::{RegionConfig, RegionEnvironment};
//! use cutpoint_core::checkpoint::InMemoryCheckpointStore;
//! use cutpoint_core::types::OperatorRoles;
//! use std::sync::Arc;
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut env = RegionEnvironment::new(
//!     RegionConfig::operator_driven(0),
//!     Arc::new(InMemoryCheckpointStore::new()),
//! );
//! let source = env.add_operator("source", OperatorRoles::trigger()).id();
//! let runtime = env.build()?;
//!
//! let handle = runtime.operator(source)?;
//! let permit = handle.acquire_permit()?;
//! let (completed, permit) = handle.make_consistent(permit)?;
//! assert!(completed);
//! drop(permit);
//! runtime.shutdown()?;
//! # Ok(())
//! # }
//! ```

mod environment;

pub use environment::*;

pub use cutpoint_core::config::{RegionConfig, TriggerKind};
pub use cutpoint_core::error::RegionError;
pub use cutpoint_core::region::{DrainResult, RegionPermit, RegionState};
pub use cutpoint_core::state::{StateHandler, StateHandlerGroup};
pub use cutpoint_core::types::{OperatorId, OperatorRoles, SequenceId};
