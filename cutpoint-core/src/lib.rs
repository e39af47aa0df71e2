//! # cutpoint-core
//!
//! Consistent-region coordination for stream operators: drain everything in
//! flight, checkpoint every operator at one cut, and reset the whole region
//! from the newest sealed cut after a failure.
//!
//! - [`types`]: ids and roles, [`SequenceId`](types::SequenceId),
//!   [`OperatorId`](types::OperatorId), [`OperatorRoles`](types::OperatorRoles).
//! - [`config`]: [`RegionConfig`](config::RegionConfig) and the cut trigger.
//! - [`error`]: the [`RegionError`](error::RegionError) failure taxonomy.
//! - [`checkpoint`]: [`Checkpoint`](checkpoint::Checkpoint) sinks/sources and
//!   the [`CheckpointStore`](checkpoint::CheckpointStore) boundary.
//! - [`state`]: the [`StateHandler`](state::StateHandler) contract and
//!   ordered [`StateHandlerGroup`](state::StateHandlerGroup) composition.
//! - [`region`]: permits, [`ConsistentRegion`](region::ConsistentRegion),
//!   and the cut/reset protocol.
//! - [`window`]: partitioned window bookkeeping that plugs into the region
//!   as a state handler.

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod region;
pub mod state;
pub mod types;
pub mod window;
