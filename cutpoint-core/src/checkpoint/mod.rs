//! Checkpoint objects and the durable store boundary.

use crate::types::{wall_clock_millis, OperatorId, SequenceId};
use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

mod checkpoint;
mod metadata;
mod store;

pub use checkpoint::*;
pub use metadata::*;
pub use store::*;

#[cfg(test)]
#[path = "tests/checkpoint_tests.rs"]
mod tests;
