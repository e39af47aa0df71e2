use super::*;

#[test]
fn write_then_read_frames_in_order() {
    let store = InMemoryCheckpointStore::new();
    let mut ckpt = store.open_write(1, OperatorId(0)).unwrap();
    ckpt.put(&vec![1u32, 2, 3]).unwrap();
    ckpt.put(&"hello".to_string()).unwrap();
    store.commit(ckpt).unwrap();

    let mut back = store.open_read(1, OperatorId(0)).unwrap();
    let nums: Vec<u32> = back.get().unwrap();
    let text: String = back.get().unwrap();
    assert_eq!(nums, vec![1, 2, 3]);
    assert_eq!(text, "hello");
    // Third frame was never written.
    assert!(back.get::<u64>().is_err());
}

#[test]
fn reading_a_sink_is_an_error() {
    let mut ckpt = Checkpoint::for_writing(5, OperatorId(1));
    ckpt.put(&7u8).unwrap();
    let err = ckpt.get_bytes().unwrap_err();
    assert!(err.to_string().contains("open for writing"));
}

#[test]
fn writing_a_source_is_an_error() {
    let mut ckpt = Checkpoint::for_reading(5, OperatorId(1), 0, Vec::new());
    let err = ckpt.put(&7u8).unwrap_err();
    assert!(err.to_string().contains("open for reading"));
}

#[test]
fn committing_a_source_is_an_error() {
    let store = InMemoryCheckpointStore::new();
    let ckpt = Checkpoint::for_reading(5, OperatorId(1), 0, Vec::new());
    assert!(store.commit(ckpt).is_err());
}

#[test]
fn latest_reports_only_sealed_cuts() {
    let store = InMemoryCheckpointStore::new();
    assert_eq!(store.latest().unwrap(), None);

    let ckpt = store.open_write(1, OperatorId(0)).unwrap();
    store.commit(ckpt).unwrap();
    // Committed but not sealed: invisible.
    assert_eq!(store.latest().unwrap(), None);

    store
        .seal(CheckpointMetadata::new(1, vec![OperatorId(0)]))
        .unwrap();
    assert_eq!(store.latest().unwrap(), Some(1));

    let ckpt = store.open_write(2, OperatorId(0)).unwrap();
    store.commit(ckpt).unwrap();
    store
        .seal(CheckpointMetadata::new(2, vec![OperatorId(0)]))
        .unwrap();
    assert_eq!(store.latest().unwrap(), Some(2));
}

#[test]
fn retire_deletes_blobs_and_metadata() {
    let store = InMemoryCheckpointStore::new();
    let mut ckpt = store.open_write(1, OperatorId(0)).unwrap();
    ckpt.put(&42u64).unwrap();
    store.commit(ckpt).unwrap();
    store
        .seal(CheckpointMetadata::new(1, vec![OperatorId(0)]))
        .unwrap();

    store.retire(1).unwrap();
    assert_eq!(store.latest().unwrap(), None);
    assert!(store.open_read(1, OperatorId(0)).is_err());
}

#[test]
fn fs_store_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsCheckpointStore::new(dir.path()).unwrap();

    let mut ckpt = store.open_write(3, OperatorId(2)).unwrap();
    ckpt.put(&vec!["a".to_string(), "b".to_string()]).unwrap();
    store.commit(ckpt).unwrap();
    store
        .seal(CheckpointMetadata::new(3, vec![OperatorId(2)]))
        .unwrap();

    assert_eq!(store.latest().unwrap(), Some(3));
    let mut back = store.open_read(3, OperatorId(2)).unwrap();
    let items: Vec<String> = back.get().unwrap();
    assert_eq!(items, vec!["a".to_string(), "b".to_string()]);
    assert!(back.timestamp() > 0);
}

#[test]
fn fs_store_committed_cuts_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = FsCheckpointStore::new(dir.path()).unwrap();
        let mut ckpt = store.open_write(9, OperatorId(1)).unwrap();
        ckpt.put(&123u64).unwrap();
        store.commit(ckpt).unwrap();
        store
            .seal(CheckpointMetadata::new(9, vec![OperatorId(1)]))
            .unwrap();
    }

    // A fresh store over the same directory sees the durable cut.
    let store = FsCheckpointStore::new(dir.path()).unwrap();
    assert_eq!(store.latest().unwrap(), Some(9));
    let mut back = store.open_read(9, OperatorId(1)).unwrap();
    let value: u64 = back.get().unwrap();
    assert_eq!(value, 123);
}

#[test]
fn fs_store_ignores_unsealed_directories() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsCheckpointStore::new(dir.path()).unwrap();

    let ckpt = store.open_write(7, OperatorId(0)).unwrap();
    store.commit(ckpt).unwrap();
    // chk-7 exists on disk but carries no metadata.bin.
    assert_eq!(store.latest().unwrap(), None);

    store
        .seal(CheckpointMetadata::new(7, vec![OperatorId(0)]))
        .unwrap();
    assert_eq!(store.latest().unwrap(), Some(7));
}

#[test]
fn fs_store_retire_removes_directory() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsCheckpointStore::new(dir.path()).unwrap();

    let ckpt = store.open_write(4, OperatorId(0)).unwrap();
    store.commit(ckpt).unwrap();
    store
        .seal(CheckpointMetadata::new(4, vec![OperatorId(0)]))
        .unwrap();
    store.retire(4).unwrap();

    assert_eq!(store.latest().unwrap(), None);
    assert!(!dir.path().join("chk-4").exists());
    // Retiring an already absent cut is not an error.
    store.retire(4).unwrap();
}
