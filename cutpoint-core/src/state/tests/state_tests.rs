use super::*;
use crate::checkpoint::{CheckpointStore, InMemoryCheckpointStore};
use crate::types::OperatorId;
use anyhow::anyhow;
use std::sync::{Arc, Mutex};

/// Appends `"<name>:<call>"` to a shared log on every protocol call.
struct Recording {
    name: &'static str,
    log: Arc<Mutex<Vec<String>>>,
    fail_on_drain: bool,
}

impl Recording {
    fn new(name: &'static str, log: Arc<Mutex<Vec<String>>>) -> Box<Self> {
        Box::new(Self {
            name,
            log,
            fail_on_drain: false,
        })
    }

    fn failing(name: &'static str, log: Arc<Mutex<Vec<String>>>) -> Box<Self> {
        Box::new(Self {
            name,
            log,
            fail_on_drain: true,
        })
    }

    fn record(&self, call: &str) {
        self.log.lock().unwrap().push(format!("{}:{}", self.name, call));
    }
}

impl StateHandler for Recording {
    fn drain(&mut self) -> Result<()> {
        self.record("drain");
        if self.fail_on_drain {
            return Err(anyhow!("drain refused"));
        }
        Ok(())
    }

    fn checkpoint(&mut self, checkpoint: &mut Checkpoint) -> Result<()> {
        self.record("checkpoint");
        checkpoint.put(&self.name.to_string())
    }

    fn reset(&mut self, checkpoint: &mut Checkpoint) -> Result<()> {
        self.record("reset");
        let written: String = checkpoint.get()?;
        assert_eq!(written, self.name);
        Ok(())
    }

    fn reset_to_initial_state(&mut self) -> Result<()> {
        self.record("initial");
        Ok(())
    }

    fn retire_checkpoint(&mut self, sequence_id: SequenceId) -> Result<()> {
        self.record(&format!("retire({sequence_id})"));
        Ok(())
    }
}

fn group_of(names: &[&'static str], log: &Arc<Mutex<Vec<String>>>) -> StateHandlerGroup {
    let mut group = StateHandlerGroup::new();
    for name in names {
        group.register(Recording::new(name, Arc::clone(log)));
    }
    group
}

#[test]
fn fan_out_follows_registration_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut group = group_of(&["a", "b", "c"], &log);

    group.drain().unwrap();
    group.retire_checkpoint(9).unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "a:drain",
            "b:drain",
            "c:drain",
            "a:retire(9)",
            "b:retire(9)",
            "c:retire(9)"
        ]
    );
}

#[test]
fn checkpoint_and_reset_use_the_same_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let store = InMemoryCheckpointStore::new();

    let mut group = group_of(&["a", "b", "c"], &log);
    let mut sink = store.open_write(1, OperatorId(0)).unwrap();
    group.checkpoint(&mut sink).unwrap();
    store.commit(sink).unwrap();

    // Each member's reset asserts it reads back its own frame, which only
    // holds if the reset order matches the checkpoint order.
    let mut restored = group_of(&["a", "b", "c"], &log);
    let mut source = store.open_read(1, OperatorId(0)).unwrap();
    restored.reset(&mut source).unwrap();
}

#[test]
fn first_error_aborts_the_fan_out() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut group = StateHandlerGroup::new();
    group.register(Recording::new("a", Arc::clone(&log)));
    group.register(Recording::failing("b", Arc::clone(&log)));
    group.register(Recording::new("c", Arc::clone(&log)));

    assert!(group.drain().is_err());
    // "c" never ran.
    assert_eq!(*log.lock().unwrap(), vec!["a:drain", "b:drain"]);
}

#[test]
fn group_starts_empty_and_only_grows() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut group = StateHandlerGroup::new();
    assert!(group.is_empty());
    group.register(Recording::new("a", Arc::clone(&log)));
    group.register(Recording::new("b", Arc::clone(&log)));
    assert_eq!(group.len(), 2);
}

#[test]
fn notification_defaults_are_no_ops() {
    struct Minimal;
    impl StateHandler for Minimal {
        fn drain(&mut self) -> Result<()> {
            Ok(())
        }
        fn checkpoint(&mut self, _checkpoint: &mut Checkpoint) -> Result<()> {
            Ok(())
        }
        fn reset(&mut self, _checkpoint: &mut Checkpoint) -> Result<()> {
            Ok(())
        }
        fn reset_to_initial_state(&mut self) -> Result<()> {
            Ok(())
        }
    }

    let mut handler = Minimal;
    handler.retire_checkpoint(1).unwrap();
    handler.prepare_for_non_blocking_checkpoint(2).unwrap();
    handler.region_checkpointed(2).unwrap();
    handler.close().unwrap();
}
