use super::*;

/// Durable boundary for checkpoint bytes.
///
/// Blobs are keyed by `(sequence_id, operator)`. A cut becomes restorable
/// only once [`seal`](Self::seal) has recorded its metadata; `latest` reports
/// sealed cuts exclusively, so a crash between commits leaves no partially
/// visible cut. [`retire`](Self::retire) physically deletes the bytes of a
/// sequence id. Committed writes must survive a process restart
/// (at-least-once durability); retirement may be lost and redone.
pub trait CheckpointStore: Send + Sync {
    /// Open a write-once sink for one operator's slice of a cut.
    fn open_write(&self, sequence_id: SequenceId, operator: OperatorId) -> Result<Checkpoint>;
    /// Persist a sink. Consumes the checkpoint; an unsealed commit is not yet
    /// restorable.
    fn commit(&self, checkpoint: Checkpoint) -> Result<()>;
    /// Record that every operator of the cut has committed.
    fn seal(&self, metadata: CheckpointMetadata) -> Result<()>;
    /// Open a read-only source over a committed blob.
    fn open_read(&self, sequence_id: SequenceId, operator: OperatorId) -> Result<Checkpoint>;
    /// Delete all bytes and metadata of a sequence id.
    fn retire(&self, sequence_id: SequenceId) -> Result<()>;
    /// Highest sealed sequence id, if any.
    fn latest(&self) -> Result<Option<SequenceId>>;
}

#[derive(Clone)]
struct StoredBlob {
    timestamp: i64,
    bytes: Vec<u8>,
}

/// In-memory store for tests and single-process execution.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    blobs: Mutex<HashMap<(SequenceId, OperatorId), StoredBlob>>,
    sealed: Mutex<HashMap<SequenceId, CheckpointMetadata>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for InMemoryCheckpointStore {
    fn open_write(&self, sequence_id: SequenceId, operator: OperatorId) -> Result<Checkpoint> {
        Ok(Checkpoint::for_writing(sequence_id, operator))
    }

    fn commit(&self, checkpoint: Checkpoint) -> Result<()> {
        let (entry, bytes) = checkpoint.into_written_bytes()?;
        self.blobs
            .lock()
            .map_err(|_| anyhow!("checkpoint blob lock poisoned"))?
            .insert(
                (entry.sequence_id, entry.operator),
                StoredBlob {
                    timestamp: entry.timestamp,
                    bytes,
                },
            );
        Ok(())
    }

    fn seal(&self, metadata: CheckpointMetadata) -> Result<()> {
        self.sealed
            .lock()
            .map_err(|_| anyhow!("checkpoint metadata lock poisoned"))?
            .insert(metadata.sequence_id, metadata);
        Ok(())
    }

    fn open_read(&self, sequence_id: SequenceId, operator: OperatorId) -> Result<Checkpoint> {
        let blob = self
            .blobs
            .lock()
            .map_err(|_| anyhow!("checkpoint blob lock poisoned"))?
            .get(&(sequence_id, operator))
            .cloned()
            .ok_or_else(|| anyhow!("no committed state for cut {sequence_id}, {operator}"))?;
        Ok(Checkpoint::for_reading(
            sequence_id,
            operator,
            blob.timestamp,
            blob.bytes,
        ))
    }

    fn retire(&self, sequence_id: SequenceId) -> Result<()> {
        self.blobs
            .lock()
            .map_err(|_| anyhow!("checkpoint blob lock poisoned"))?
            .retain(|(seq, _), _| *seq != sequence_id);
        self.sealed
            .lock()
            .map_err(|_| anyhow!("checkpoint metadata lock poisoned"))?
            .remove(&sequence_id);
        Ok(())
    }

    fn latest(&self) -> Result<Option<SequenceId>> {
        Ok(self
            .sealed
            .lock()
            .map_err(|_| anyhow!("checkpoint metadata lock poisoned"))?
            .keys()
            .copied()
            .max())
    }
}

/// File-system store. One directory per sealed cut:
/// `<base>/chk-<seq>/op-<id>.bin` plus `metadata.bin` as the seal marker.
pub struct FsCheckpointStore {
    base_path: PathBuf,
}

impl FsCheckpointStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).with_context(|| {
            format!(
                "failed to create checkpoint store directory {}",
                base_path.display()
            )
        })?;
        Ok(Self { base_path })
    }

    fn cut_dir(&self, sequence_id: SequenceId) -> PathBuf {
        self.base_path.join(format!("chk-{sequence_id}"))
    }

    fn blob_path(&self, sequence_id: SequenceId, operator: OperatorId) -> PathBuf {
        self.cut_dir(sequence_id).join(format!("{operator}.bin"))
    }

    fn metadata_path(&self, sequence_id: SequenceId) -> PathBuf {
        self.cut_dir(sequence_id).join("metadata.bin")
    }

    /// Write one file and fsync it, then fsync its directory so the entry
    /// itself survives a crash. Commit durability is what makes a sealed cut
    /// safe to restore from.
    fn persist(path: &Path, bytes: &[u8]) -> Result<()> {
        let mut file = fs::File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        file.write_all(bytes)
            .with_context(|| format!("failed to write {}", path.display()))?;
        file.sync_all()
            .with_context(|| format!("failed to sync {}", path.display()))?;
        if let Some(dir) = path.parent() {
            fs::File::open(dir)
                .with_context(|| format!("failed to open {}", dir.display()))?
                .sync_all()
                .with_context(|| format!("failed to sync {}", dir.display()))?;
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct FsBlob {
    timestamp: i64,
    bytes: Vec<u8>,
}

impl CheckpointStore for FsCheckpointStore {
    fn open_write(&self, sequence_id: SequenceId, operator: OperatorId) -> Result<Checkpoint> {
        Ok(Checkpoint::for_writing(sequence_id, operator))
    }

    fn commit(&self, checkpoint: Checkpoint) -> Result<()> {
        let (entry, bytes) = checkpoint.into_written_bytes()?;
        let dir = self.cut_dir(entry.sequence_id);
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create checkpoint dir {}", dir.display()))?;
        let blob = FsBlob {
            timestamp: entry.timestamp,
            bytes,
        };
        let encoded = bincode::serialize(&blob).context("serialize checkpoint blob failed")?;
        Self::persist(&self.blob_path(entry.sequence_id, entry.operator), &encoded)
    }

    fn seal(&self, metadata: CheckpointMetadata) -> Result<()> {
        let dir = self.cut_dir(metadata.sequence_id);
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create checkpoint dir {}", dir.display()))?;
        let bytes =
            bincode::serialize(&metadata).context("serialize checkpoint metadata failed")?;
        Self::persist(&self.metadata_path(metadata.sequence_id), &bytes)
    }

    fn open_read(&self, sequence_id: SequenceId, operator: OperatorId) -> Result<Checkpoint> {
        let encoded = fs::read(self.blob_path(sequence_id, operator))
            .with_context(|| format!("read checkpoint blob for cut {sequence_id}, {operator}"))?;
        let blob: FsBlob =
            bincode::deserialize(&encoded).context("deserialize checkpoint blob failed")?;
        Ok(Checkpoint::for_reading(
            sequence_id,
            operator,
            blob.timestamp,
            blob.bytes,
        ))
    }

    fn retire(&self, sequence_id: SequenceId) -> Result<()> {
        let dir = self.cut_dir(sequence_id);
        if dir.exists() {
            fs::remove_dir_all(&dir)
                .with_context(|| format!("failed to remove {}", dir.display()))?;
        }
        Ok(())
    }

    fn latest(&self) -> Result<Option<SequenceId>> {
        let mut newest = None;
        for entry in fs::read_dir(&self.base_path)
            .with_context(|| format!("read_dir failed for {}", self.base_path.display()))?
        {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let Some(id_part) = name.strip_prefix("chk-") else {
                continue;
            };
            let Ok(id) = id_part.parse::<SequenceId>() else {
                continue;
            };
            // Only sealed cuts count.
            if self.metadata_path(id).exists() {
                newest = newest.max(Some(id));
            }
        }
        Ok(newest)
    }
}
