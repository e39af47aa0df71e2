//! Partitioned window bookkeeping: event kinds, the per-partition lifecycle
//! transition, and the checkpointable partition store.

use crate::checkpoint::Checkpoint;
use crate::state::StateHandler;
use anyhow::{anyhow, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use tracing::trace;

mod events;
mod lifecycle;
mod store;

pub use events::*;
pub use lifecycle::*;
pub use store::*;

#[cfg(test)]
#[path = "tests/window_tests.rs"]
mod tests;
