//! Operator state lifecycle: the handler contract and ordered composition.

use crate::checkpoint::Checkpoint;
use crate::types::SequenceId;
use anyhow::Result;

mod group;
mod handler;

pub use group::*;
pub use handler::*;

#[cfg(test)]
#[path = "tests/state_tests.rs"]
mod tests;
