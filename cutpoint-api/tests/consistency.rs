//! End-to-end consistency scenarios: cut, crash, reset, and timeout
//! behavior driven through the public facade.

use anyhow::Result;
use cutpoint_api::{
    OperatorRoles, RegionConfig, RegionEnvironment, RegionError, StateHandler,
};
use cutpoint_core::checkpoint::{Checkpoint, CheckpointStore, InMemoryCheckpointStore};
use cutpoint_core::window::{
    SharedWindowStore, WindowEvent, WindowKind, WindowListener, WindowPartitionStore,
};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
struct CountState {
    count: u64,
}

/// Tallies every flush of a tumbling window outside the checkpointed state,
/// the way a downstream sink would observe emitted results.
struct FlushSink {
    flushed: Arc<Mutex<Vec<u64>>>,
}

impl WindowListener<String, CountState> for FlushSink {
    fn on_insertion(&mut self, _key: &String, state: &mut CountState) -> Result<()> {
        state.count += 1;
        Ok(())
    }

    fn on_eviction(&mut self, _key: &String, state: &mut CountState) -> Result<()> {
        self.flushed.lock().unwrap().push(state.count);
        Ok(())
    }
}

/// Tumbling count window of three: insert, and fire the eviction once the
/// partition holds three tuples.
fn insert_with_count_policy(
    store: &SharedWindowStore<String, CountState>,
    key: &str,
) -> Result<()> {
    store.handle_event(&WindowEvent::insertion(key.to_string()))?;
    let full = store.with(|s| {
        s.partition_state(&key.to_string())
            .map(|state| state.count >= 3)
            .unwrap_or(false)
    })?;
    if full {
        store.handle_event(&WindowEvent::eviction(key.to_string()))?;
    }
    Ok(())
}

#[test]
fn tumbling_count_window_does_not_double_count_after_reset() {
    let flushed = Arc::new(Mutex::new(Vec::new()));
    let shared = SharedWindowStore::new(WindowPartitionStore::new(
        WindowKind::Tumbling,
        Box::new(|_key, _previous| CountState::default()),
        Box::new(FlushSink {
            flushed: Arc::clone(&flushed),
        }),
    ));

    let mut env = RegionEnvironment::new(
        RegionConfig::operator_driven(0),
        Arc::new(InMemoryCheckpointStore::new()),
    );
    let source = env
        .add_operator("window", OperatorRoles::trigger())
        .with_handler(Box::new(shared.clone()))
        .unwrap()
        .id();
    let runtime = env.build().unwrap();
    let handle = runtime.operator(source).unwrap();

    // Fill the window once: three inserts, one flush of 3.
    let permit = handle.acquire_permit().unwrap();
    for _ in 0..3 {
        insert_with_count_policy(&shared, "a").unwrap();
    }
    assert_eq!(*flushed.lock().unwrap(), vec![3]);

    // Establish a cut, then accumulate two uncheckpointed tuples.
    let (completed, permit) = handle.make_consistent(permit).unwrap();
    assert!(completed);
    for _ in 0..2 {
        insert_with_count_policy(&shared, "a").unwrap();
    }
    drop(permit);

    // Crash: the two tuples are lost and the region resets to the cut.
    runtime.request_reset().unwrap();
    assert_eq!(runtime.sequence_id().unwrap(), -1);
    assert_eq!(
        shared
            .with(|s| s.partition_state(&"a".to_string()).cloned())
            .unwrap(),
        Some(CountState { count: 0 })
    );

    // The upstream replays three tuples; the window fires exactly once more.
    let permit = handle.acquire_permit().unwrap();
    for _ in 0..3 {
        insert_with_count_policy(&shared, "a").unwrap();
    }
    drop(permit);
    assert_eq!(*flushed.lock().unwrap(), vec![3, 3]);

    runtime.shutdown().unwrap();
}

/// Sleeps through drain until told to behave.
struct SlowDrain {
    delay: Arc<Mutex<Duration>>,
}

impl StateHandler for SlowDrain {
    fn drain(&mut self) -> Result<()> {
        let delay = *self.delay.lock().unwrap();
        thread::sleep(delay);
        Ok(())
    }

    fn checkpoint(&mut self, checkpoint: &mut Checkpoint) -> Result<()> {
        checkpoint.put(&0u8)
    }

    fn reset(&mut self, checkpoint: &mut Checkpoint) -> Result<()> {
        let _: u8 = checkpoint.get()?;
        Ok(())
    }

    fn reset_to_initial_state(&mut self) -> Result<()> {
        Ok(())
    }
}

#[test]
fn drain_timeout_fails_the_cut_until_the_handler_recovers() {
    let delay = Arc::new(Mutex::new(Duration::from_secs(2)));
    let mut env = RegionEnvironment::new(
        RegionConfig::operator_driven(0)
            .with_drain_timeout(Duration::from_millis(500))
            .with_reset_timeout(Duration::from_secs(5)),
        Arc::new(InMemoryCheckpointStore::new()),
    );
    let source = env
        .add_operator("slow", OperatorRoles::trigger())
        .with_handler(Box::new(SlowDrain {
            delay: Arc::clone(&delay),
        }))
        .unwrap()
        .id();
    let runtime = env.build().unwrap();
    let handle = runtime.operator(source).unwrap();

    let permit = handle.acquire_permit().unwrap();
    let (completed, permit) = handle.make_consistent(permit).unwrap();
    assert!(!completed);
    assert_eq!(runtime.sequence_id().unwrap(), -1);
    assert_eq!(permit.sequence_id(), -1);

    // The handler recovers; the next cut succeeds and clears the sentinel.
    *delay.lock().unwrap() = Duration::ZERO;
    let (completed, permit) = handle.make_consistent(permit).unwrap();
    assert!(completed);
    assert!(runtime.sequence_id().unwrap() > 0);
    drop(permit);

    runtime.shutdown().unwrap();
}

#[test]
fn restart_from_a_shared_store_resumes_the_window() {
    let store: Arc<InMemoryCheckpointStore> = Arc::new(InMemoryCheckpointStore::new());

    let build = |flushed: Arc<Mutex<Vec<u64>>>| {
        let shared = SharedWindowStore::new(WindowPartitionStore::new(
            WindowKind::Tumbling,
            Box::new(|_key, _previous| CountState::default()),
            Box::new(FlushSink { flushed }),
        ));
        let mut env = RegionEnvironment::new(
            RegionConfig::operator_driven(0),
            store.clone() as Arc<dyn CheckpointStore>,
        );
        let source = env
            .add_operator("window", OperatorRoles::trigger())
            .with_handler(Box::new(shared.clone()))
            .unwrap()
            .id();
        (env.build().unwrap(), shared, source)
    };

    {
        let flushed = Arc::new(Mutex::new(Vec::new()));
        let (runtime, shared, source) = build(Arc::clone(&flushed));
        let handle = runtime.operator(source).unwrap();

        let permit = handle.acquire_permit().unwrap();
        insert_with_count_policy(&shared, "a").unwrap();
        insert_with_count_policy(&shared, "a").unwrap();
        let (completed, permit) = handle.make_consistent(permit).unwrap();
        assert!(completed);
        drop(permit);
        runtime.shutdown().unwrap();
    }

    // New process, same store: the partition resumes at two tuples, so a
    // single replayed insert completes the window.
    let flushed = Arc::new(Mutex::new(Vec::new()));
    let (runtime, shared, source) = build(Arc::clone(&flushed));
    assert_eq!(
        shared
            .with(|s| s.partition_state(&"a".to_string()).cloned())
            .unwrap(),
        Some(CountState { count: 2 })
    );

    let handle = runtime.operator(source).unwrap();
    let permit = handle.acquire_permit().unwrap();
    insert_with_count_policy(&shared, "a").unwrap();
    drop(permit);
    assert_eq!(*flushed.lock().unwrap(), vec![3]);
    runtime.shutdown().unwrap();
}

#[test]
fn unknown_operator_handles_are_rejected() {
    let mut env = RegionEnvironment::new(
        RegionConfig::operator_driven(0),
        Arc::new(InMemoryCheckpointStore::new()),
    );
    env.add_operator("only", OperatorRoles::trigger());
    let runtime = env.build().unwrap();

    let err = runtime
        .operator(cutpoint_api::OperatorId(7))
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RegionError>(),
        Some(RegionError::ProtocolMisuse(_))
    ));
    runtime.shutdown().unwrap();
}
