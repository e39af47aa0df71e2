//! The consistent-region protocol: permits, cut coordination, and reset.

use crate::checkpoint::{CheckpointMetadata, CheckpointStore};
use crate::config::{RegionConfig, TriggerKind};
use crate::error::RegionError;
use crate::state::{StateHandler, StateHandlerGroup};
use crate::types::{OperatorId, OperatorRoles, RegionIndex, SequenceId};
use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

mod fanout;
mod permit;
#[allow(clippy::module_inception)]
mod region;

pub(crate) use fanout::*;
pub use permit::*;
pub use region::*;

#[cfg(test)]
#[path = "tests/region_tests.rs"]
mod tests;
