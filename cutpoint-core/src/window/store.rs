use super::*;

/// Application callbacks for window events. Each callback runs with the
/// partition's state borrowed mutably; bookkeeping happens around it per the
/// ordering rules in [`flag_order`].
#[allow(unused_variables)]
pub trait WindowListener<K, S>: Send {
    fn on_insertion(&mut self, key: &K, state: &mut S) -> Result<()> {
        Ok(())
    }
    fn on_eviction(&mut self, key: &K, state: &mut S) -> Result<()> {
        Ok(())
    }
    fn on_trigger(&mut self, key: &K, state: &mut S) -> Result<()> {
        Ok(())
    }
    fn on_initial_full(&mut self, key: &K, state: &mut S) -> Result<()> {
        Ok(())
    }
    fn on_final(&mut self, key: &K) -> Result<()> {
        Ok(())
    }
    fn on_partition_eviction(&mut self, key: &K, state: &mut S) -> Result<()> {
        Ok(())
    }
}

/// Builds a partition's state. Called with `None` on first touch and with
/// the outgoing state on tumbling reinitialization, so implementations can
/// carry configuration (not content) across window flushes.
pub type InitFn<K, S> = Box<dyn FnMut(&K, Option<S>) -> S + Send>;

/// Checkpointable bookkeeping for one partitioned window.
///
/// Partition state is materialized lazily on the first event that touches a
/// key and destroyed on partition eviction. A key is present iff it has been
/// touched since creation or since its last partition eviction.
pub struct WindowPartitionStore<K, S> {
    window: WindowKind,
    init: InitFn<K, S>,
    listener: Box<dyn WindowListener<K, S>>,
    partitioned_state: HashMap<K, S>,
    flags: HashMap<K, PartitionFlags>,
    final_seen: bool,
}

impl<K, S> WindowPartitionStore<K, S>
where
    K: Eq + Hash + Clone,
{
    pub fn new(
        window: WindowKind,
        init: InitFn<K, S>,
        listener: Box<dyn WindowListener<K, S>>,
    ) -> Self {
        Self {
            window,
            init,
            listener,
            partitioned_state: HashMap::new(),
            flags: HashMap::new(),
            final_seen: false,
        }
    }

    pub fn window_kind(&self) -> WindowKind {
        self.window
    }

    /// Whether the final mark has been handled. Once set, all further events
    /// are dropped.
    pub fn final_mark_seen(&self) -> bool {
        self.final_seen
    }

    pub fn partition_count(&self) -> usize {
        self.partitioned_state.len()
    }

    pub fn partition_state(&self, key: &K) -> Option<&S> {
        self.partitioned_state.get(key)
    }

    /// State for `key`, materializing it through the init function if the
    /// key has never been touched. Reading is not an event: no flags are set
    /// and no listener callback runs.
    pub fn partition_state_mut(&mut self, key: &K) -> &mut S {
        match self.partitioned_state.entry(key.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert((self.init)(key, None)),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.partitioned_state.keys()
    }

    pub fn inserts_occurred(&self, key: &K) -> bool {
        self.flags.get(key).is_some_and(|f| f.inserts_occurred)
    }

    pub fn evictions_occurred(&self, key: &K) -> bool {
        self.flags.get(key).is_some_and(|f| f.evictions_occurred)
    }

    pub fn seen_initial_full(&self, key: &K) -> bool {
        self.flags.get(key).is_some_and(|f| f.seen_initial_full)
    }

    fn ensure_state(partitioned_state: &mut HashMap<K, S>, init: &mut InitFn<K, S>, key: &K) {
        if !partitioned_state.contains_key(key) {
            let state = init(key, None);
            partitioned_state.insert(key.clone(), state);
        }
    }

    /// Apply one event: listener callback plus bookkeeping, in the order the
    /// event kind requires. Events after the final mark are dropped.
    pub fn handle_event(&mut self, event: &WindowEvent<K>) -> Result<()> {
        if self.final_seen {
            trace!(kind = ?event.kind, "dropping window event after final mark");
            return Ok(());
        }
        let kind = event.kind;
        let key = &event.key;

        if kind == WindowEventKind::Final {
            self.listener.on_final(key)?;
            self.final_seen = true;
            return Ok(());
        }

        if kind == WindowEventKind::PartitionEviction {
            if let Some(state) = self.partitioned_state.get_mut(key) {
                self.listener.on_partition_eviction(key, state)?;
            }
            self.partitioned_state.remove(key);
            self.flags.remove(key);
            return Ok(());
        }

        Self::ensure_state(&mut self.partitioned_state, &mut self.init, key);
        let flags = self.flags.entry(key.clone()).or_default();

        // Initial-full is the one kind recorded before the callback runs.
        let action = if flag_order(kind) == FlagOrder::BeforeCallback {
            transition(flags, kind, self.window)
        } else {
            PostAction::None
        };
        debug_assert_eq!(action, PostAction::None);

        {
            let state = self
                .partitioned_state
                .get_mut(key)
                .ok_or_else(|| anyhow!("partition state vanished during event handling"))?;
            match kind {
                WindowEventKind::Insertion => self.listener.on_insertion(key, state)?,
                WindowEventKind::Eviction => self.listener.on_eviction(key, state)?,
                WindowEventKind::Trigger => self.listener.on_trigger(key, state)?,
                WindowEventKind::InitialFull => self.listener.on_initial_full(key, state)?,
                WindowEventKind::Final | WindowEventKind::PartitionEviction => unreachable!(),
            }
        }

        if flag_order(kind) == FlagOrder::AfterCallback {
            let flags = self.flags.entry(key.clone()).or_default();
            match transition(flags, kind, self.window) {
                PostAction::None => {}
                PostAction::ReinitializeState => {
                    let previous = self.partitioned_state.remove(key);
                    let fresh = (self.init)(key, previous);
                    self.partitioned_state.insert(key.clone(), fresh);
                }
                PostAction::EvictPartition => {
                    self.partitioned_state.remove(key);
                    self.flags.remove(key);
                }
            }
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.partitioned_state.clear();
        self.flags.clear();
    }
}

impl<K, S> WindowPartitionStore<K, S>
where
    K: Eq + Hash + Clone + Serialize + DeserializeOwned,
    S: Serialize + DeserializeOwned,
{
    /// Serialize the store as four positional frames: evictions, inserts,
    /// partitioned state, seen-initial-full. [`read_from`](Self::read_from)
    /// consumes them in the same order.
    pub fn write_to(&self, checkpoint: &mut Checkpoint) -> Result<()> {
        let evictions: HashSet<&K> = self
            .flags
            .iter()
            .filter(|(_, f)| f.evictions_occurred)
            .map(|(k, _)| k)
            .collect();
        let inserts: HashSet<&K> = self
            .flags
            .iter()
            .filter(|(_, f)| f.inserts_occurred)
            .map(|(k, _)| k)
            .collect();
        let seen_initial_full: HashSet<&K> = self
            .flags
            .iter()
            .filter(|(_, f)| f.seen_initial_full)
            .map(|(k, _)| k)
            .collect();

        checkpoint.put(&evictions)?;
        checkpoint.put(&inserts)?;
        checkpoint.put(&self.partitioned_state)?;
        checkpoint.put(&seen_initial_full)?;
        Ok(())
    }

    /// Replace the store's contents from a committed cut. Fires no listener
    /// callbacks.
    pub fn read_from(&mut self, checkpoint: &mut Checkpoint) -> Result<()> {
        let evictions: HashSet<K> = checkpoint.get()?;
        let inserts: HashSet<K> = checkpoint.get()?;
        let partitioned_state: HashMap<K, S> = checkpoint.get()?;
        let seen_initial_full: HashSet<K> = checkpoint.get()?;

        let mut flags: HashMap<K, PartitionFlags> = HashMap::new();
        for key in evictions {
            flags.entry(key).or_default().evictions_occurred = true;
        }
        for key in inserts {
            flags.entry(key).or_default().inserts_occurred = true;
        }
        for key in seen_initial_full {
            flags.entry(key).or_default().seen_initial_full = true;
        }

        self.partitioned_state = partitioned_state;
        self.flags = flags;
        Ok(())
    }
}

/// Clonable handle sharing one [`WindowPartitionStore`] between the event
/// path and the region's checkpoint fan-out threads. Event delivery happens
/// under a region permit; protocol calls happen with all permits returned,
/// so the mutex is contention-free in practice.
pub struct SharedWindowStore<K, S> {
    inner: Arc<Mutex<WindowPartitionStore<K, S>>>,
}

impl<K, S> Clone for SharedWindowStore<K, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, S> SharedWindowStore<K, S>
where
    K: Eq + Hash + Clone,
{
    pub fn new(store: WindowPartitionStore<K, S>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    pub fn handle_event(&self, event: &WindowEvent<K>) -> Result<()> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("window store lock poisoned"))?
            .handle_event(event)
    }

    /// Run a closure against the store, for inspection.
    pub fn with<R>(&self, f: impl FnOnce(&WindowPartitionStore<K, S>) -> R) -> Result<R> {
        let guard = self
            .inner
            .lock()
            .map_err(|_| anyhow!("window store lock poisoned"))?;
        Ok(f(&guard))
    }
}

impl<K, S> StateHandler for SharedWindowStore<K, S>
where
    K: Eq + Hash + Clone + Serialize + DeserializeOwned + Send + 'static,
    S: Serialize + DeserializeOwned + Send + 'static,
{
    fn drain(&mut self) -> Result<()> {
        // Event delivery is externally serialized under the permit; by the
        // time drain runs every pending event has been applied.
        Ok(())
    }

    fn checkpoint(&mut self, checkpoint: &mut Checkpoint) -> Result<()> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("window store lock poisoned"))?
            .write_to(checkpoint)
    }

    fn reset(&mut self, checkpoint: &mut Checkpoint) -> Result<()> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("window store lock poisoned"))?
            .read_from(checkpoint)
    }

    fn reset_to_initial_state(&mut self) -> Result<()> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("window store lock poisoned"))?
            .clear();
        Ok(())
    }
}
