use super::*;

/// Protocol phase of a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionState {
    Normal,
    Draining,
    Checkpointing,
    /// Drain is complete and tuple flow has resumed; the checkpoint is still
    /// being written in the background.
    CheckpointPending,
    Resetting,
}

/// Outcome of a non-blocking cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainResult {
    /// Every handler drained, checkpointed, and the previous cut was retired.
    Completed,
    /// Drain finished and flow resumed; background checkpointing continues.
    CheckpointPending,
    /// The cut failed and the region was reset.
    Failed,
}

/// Which entry point family the region is driven through. Locked by the
/// first cut and never mixed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CutMode {
    Blocking,
    NonBlocking,
}

#[derive(Debug, Clone, Copy)]
enum Initiator {
    Driver,
    Operator(OperatorId),
}

struct OperatorSlot {
    id: OperatorId,
    name: String,
    roles: OperatorRoles,
    non_blocking: bool,
    handlers: Arc<Mutex<StateHandlerGroup>>,
}

struct BackgroundJob {
    cut_id: SequenceId,
    reset_epoch: u64,
    slots: Vec<usize>,
}

struct RegionInner {
    state: RegionState,
    /// Id the next cut will establish. Initialized past the newest sealed
    /// cut, so ids of successful cuts are strictly increasing for the life
    /// of the store.
    next_cut_id: SequenceId,
    /// False from a failure or restart until the next successful drain;
    /// while false the visible sequence id is `-1`.
    healthy: bool,
    /// `-1` once a cut has completed since the last reset; otherwise the
    /// zero-based attempt counter of the reset in progress.
    reset_attempt: i64,
    permits: usize,
    /// New permit acquisitions block while true.
    gate_closed: bool,
    cut_mode: Option<CutMode>,
    /// A drain or checkpoint phase is executing right now. Concurrent cut
    /// requests batch onto it instead of starting another.
    cut_active: bool,
    /// Completed-cut counter; batching waiters key off it.
    cut_epoch: u64,
    last_cut_ok: bool,
    /// Bumped at every reset. Background results tagged with an older epoch
    /// are discarded.
    reset_epoch: u64,
    background_pending: bool,
    reset_requested: bool,
    shutdown: bool,
}

fn visible_sequence(inner: &RegionInner) -> SequenceId {
    if inner.healthy {
        inner.next_cut_id
    } else {
        -1
    }
}

/// Assembles a [`ConsistentRegion`]. Operator set, handler registration, and
/// the non-blocking opt-in are all fixed at build time; the built region
/// rejects none of them being changeable afterwards by construction.
pub struct RegionBuilder {
    config: RegionConfig,
    store: Arc<dyn CheckpointStore>,
    operators: Vec<OperatorSlot>,
}

impl RegionBuilder {
    pub fn new(config: RegionConfig, store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            config,
            store,
            operators: Vec::new(),
        }
    }

    /// Register an operator. Ids are assigned densely in call order, which
    /// is also the checkpoint layout order.
    pub fn add_operator(&mut self, name: &str, roles: OperatorRoles) -> OperatorId {
        let id = OperatorId(self.operators.len() as u32);
        self.operators.push(OperatorSlot {
            id,
            name: name.to_string(),
            roles,
            non_blocking: false,
            handlers: Arc::new(Mutex::new(StateHandlerGroup::new())),
        });
        id
    }

    /// Append a handler to an operator's group.
    pub fn add_handler(
        &mut self,
        operator: OperatorId,
        handler: Box<dyn StateHandler>,
    ) -> Result<()> {
        let slot = self.slot_mut(operator)?;
        slot.handlers
            .lock()
            .map_err(|_| anyhow!("handler group lock poisoned"))?
            .register(handler);
        Ok(())
    }

    /// Opt an operator's handlers into background checkpointing.
    pub fn set_non_blocking(&mut self, operator: OperatorId, non_blocking: bool) -> Result<()> {
        self.slot_mut(operator)?.non_blocking = non_blocking;
        Ok(())
    }

    fn slot_mut(&mut self, operator: OperatorId) -> Result<&mut OperatorSlot> {
        self.operators
            .get_mut(operator.0 as usize)
            .ok_or_else(|| RegionError::ProtocolMisuse(format!("unknown operator {operator}")).into())
    }

    /// Validate, restore the newest sealed cut if the store has one, and
    /// start the region's background threads.
    pub fn build(self) -> Result<Arc<ConsistentRegion>> {
        self.config.validate()?;
        if self.operators.is_empty() {
            return Err(
                RegionError::ProtocolMisuse("a region needs at least one operator".into()).into(),
            );
        }
        if self.config.trigger == TriggerKind::OperatorDriven
            && !self.operators.iter().any(|s| s.roles.trigger_operator)
        {
            return Err(RegionError::ProtocolMisuse(
                "an operator-driven region needs a trigger operator".into(),
            )
            .into());
        }

        let latest = self
            .store
            .latest()
            .map_err(|e| RegionError::Store(format!("{e:#}")))?;
        let next_cut_id = latest.map_or(1, |seq| seq + 1);

        let (tx, rx) = unbounded();
        let region = Arc::new(ConsistentRegion {
            config: self.config,
            store: self.store,
            operators: self.operators,
            inner: Mutex::new(RegionInner {
                state: RegionState::Normal,
                next_cut_id,
                healthy: latest.is_none(),
                reset_attempt: -1,
                permits: 0,
                gate_closed: false,
                cut_mode: None,
                cut_active: false,
                cut_epoch: 0,
                last_cut_ok: false,
                reset_epoch: 0,
                background_pending: false,
                reset_requested: false,
                shutdown: false,
            }),
            cond: Condvar::new(),
            background_tx: Mutex::new(Some(tx)),
            threads: Mutex::new(Vec::new()),
        });

        // A restart resumes from the newest sealed cut before anything flows.
        if latest.is_some() {
            region.reset_internal()?;
        }

        let worker = Arc::clone(&region);
        let handle = thread::Builder::new()
            .name(format!("region-{}-checkpointer", region.config.index))
            .spawn(move || background_worker(worker, rx))
            .map_err(|e| anyhow!("failed to spawn checkpoint worker: {e}"))?;
        region.push_thread(handle)?;

        if let TriggerKind::Periodic { period_secs } = region.config.trigger {
            let period = Duration::from_secs_f64(period_secs);
            let non_blocking = region.operators.iter().any(|s| s.non_blocking);
            let driver = Arc::clone(&region);
            let handle = thread::Builder::new()
                .name(format!("region-{}-driver", region.config.index))
                .spawn(move || periodic_driver(driver, period, non_blocking))
                .map_err(|e| anyhow!("failed to spawn periodic driver: {e}"))?;
            region.push_thread(handle)?;
        }

        Ok(region)
    }
}

/// One consistent region: the permit gate, the cut protocol, and reset.
pub struct ConsistentRegion {
    config: RegionConfig,
    store: Arc<dyn CheckpointStore>,
    operators: Vec<OperatorSlot>,
    inner: Mutex<RegionInner>,
    cond: Condvar,
    background_tx: Mutex<Option<Sender<BackgroundJob>>>,
    threads: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl ConsistentRegion {
    pub fn index(&self) -> RegionIndex {
        self.config.index
    }

    pub fn config(&self) -> &RegionConfig {
        &self.config
    }

    /// Current sequence id: the id the next successful cut will establish,
    /// or `-1` between a failure and the next completed drain. Stable while
    /// a permit is held.
    pub fn sequence_id(&self) -> Result<SequenceId> {
        let inner = self.lock_inner()?;
        Ok(visible_sequence(&inner))
    }

    /// `-1` once a cut has completed since the last reset; otherwise the
    /// zero-based attempt counter of the current reset.
    pub fn reset_attempt(&self) -> Result<i64> {
        Ok(self.lock_inner()?.reset_attempt)
    }

    pub fn state(&self) -> Result<RegionState> {
        Ok(self.lock_inner()?.state)
    }

    pub fn operator_count(&self) -> usize {
        self.operators.len()
    }

    pub fn operator_roles(&self, operator: OperatorId) -> Option<OperatorRoles> {
        self.operators.get(operator.0 as usize).map(|s| s.roles)
    }

    pub fn operator_name(&self, operator: OperatorId) -> Option<&str> {
        self.operators
            .get(operator.0 as usize)
            .map(|s| s.name.as_str())
    }

    fn operator_ids(&self) -> Vec<OperatorId> {
        self.operators.iter().map(|s| s.id).collect()
    }

    fn lock_inner(&self) -> Result<MutexGuard<'_, RegionInner>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("region lock poisoned"))
    }

    fn push_thread(&self, handle: thread::JoinHandle<()>) -> Result<()> {
        self.threads
            .lock()
            .map_err(|_| anyhow!("region thread list lock poisoned"))?
            .push(handle);
        Ok(())
    }

    /// Acquire one permit, blocking while the region pauses for a cut or a
    /// reset. The returned guard's sequence id stays valid until release.
    pub fn acquire_permit(self: &Arc<Self>) -> Result<RegionPermit> {
        let mut inner = self.lock_inner()?;
        loop {
            if inner.shutdown {
                return Err(RegionError::Shutdown.into());
            }
            if !inner.gate_closed {
                break;
            }
            inner = self
                .cond
                .wait(inner)
                .map_err(|_| anyhow!("region lock poisoned"))?;
        }
        inner.permits += 1;
        let sequence_id = visible_sequence(&inner);
        drop(inner);
        Ok(RegionPermit::new(Arc::clone(self), sequence_id))
    }

    pub(crate) fn permit_returned(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.permits = inner.permits.saturating_sub(1);
            self.cond.notify_all();
        }
    }

    /// Establish a consistent cut, blocking until every handler has drained
    /// and checkpointed. The caller must hold exactly one permit on this
    /// region; it is released for the duration of the cycle and a fresh one
    /// is returned. `true` means a cut was established (on a periodic region
    /// with non-blocking operators its checkpoint may still be finishing in
    /// the background); `false` means it failed and the region was reset.
    /// `Err` is reserved for fatal misuse.
    pub fn make_consistent(
        self: &Arc<Self>,
        operator: OperatorId,
        permit: RegionPermit,
    ) -> Result<(bool, RegionPermit)> {
        let (result, permit) =
            self.cut_cycle(Initiator::Operator(operator), permit, CutMode::Blocking)?;
        Ok((result != DrainResult::Failed, permit))
    }

    /// Like [`make_consistent`](Self::make_consistent), but handlers that
    /// opted in checkpoint in the background while tuple flow resumes.
    /// Initiators must not mix this with the blocking entry point on one
    /// region; on a periodic region either entry point adopts the driver's
    /// next cut.
    pub fn make_consistent_non_blocking(
        self: &Arc<Self>,
        operator: OperatorId,
        permit: RegionPermit,
    ) -> Result<(DrainResult, RegionPermit)> {
        self.cut_cycle(Initiator::Operator(operator), permit, CutMode::NonBlocking)
    }

    fn cut_cycle(
        self: &Arc<Self>,
        initiator: Initiator,
        permit: RegionPermit,
        mode: CutMode,
    ) -> Result<(DrainResult, RegionPermit)> {
        if !permit.belongs_to(self) {
            return Err(RegionError::PermitViolation(
                "permit presented to a region that did not issue it".into(),
            )
            .into());
        }

        let cut_id;
        {
            let mut inner = self.lock_inner()?;
            if inner.shutdown {
                return Err(RegionError::Shutdown.into());
            }
            if let Initiator::Operator(operator) = initiator {
                let roles = self.operator_roles(operator).ok_or_else(|| {
                    RegionError::ProtocolMisuse(format!("unknown operator {operator}"))
                })?;
                match self.config.trigger {
                    TriggerKind::OperatorDriven => {
                        if !roles.trigger_operator {
                            return Err(RegionError::ProtocolMisuse(format!(
                                "only the trigger operator may initiate cuts, not {operator}"
                            ))
                            .into());
                        }
                    }
                    TriggerKind::Periodic { .. } => {
                        // The driver owns cut initiation and the cut mode;
                        // operator calls wait for the next scheduled cut
                        // through either entry point.
                        return self.adopt_next_cut(inner, permit);
                    }
                }
            }

            // Only initiators lock the mode; adopters above take the driver's.
            match inner.cut_mode {
                None => inner.cut_mode = Some(mode),
                Some(locked) if locked != mode => {
                    return Err(RegionError::ProtocolMisuse(
                        "blocking and non-blocking cut entry points cannot be mixed on one region"
                            .into(),
                    )
                    .into());
                }
                Some(_) => {}
            }

            if inner.state == RegionState::Resetting {
                // A reset is draining permits; get out of its way and report
                // the cut as failed once it finishes.
                inner.permits = inner.permits.saturating_sub(1);
                permit.deactivate();
                self.cond.notify_all();
                while inner.state == RegionState::Resetting && !inner.shutdown {
                    inner = self
                        .cond
                        .wait(inner)
                        .map_err(|_| anyhow!("region lock poisoned"))?;
                }
                return self.reacquire_and_return(inner, DrainResult::Failed);
            }

            if inner.cut_active {
                return self.adopt_next_cut(inner, permit);
            }

            // At most one outstanding background checkpoint: wait for the
            // previous cut's worker before starting a new cycle.
            let deadline = Instant::now() + self.config.drain_timeout();
            while inner.background_pending {
                if inner.shutdown {
                    return Err(RegionError::Shutdown.into());
                }
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    inner.permits = inner.permits.saturating_sub(1);
                    permit.deactivate();
                    self.cond.notify_all();
                    drop(inner);
                    return self.fail_cut(
                        RegionError::Timeout {
                            timeout: self.config.drain_timeout(),
                            waiting_for: "previous background checkpoint",
                        }
                        .into(),
                    );
                }
                let (guard, _) = self
                    .cond
                    .wait_timeout(inner, remaining)
                    .map_err(|_| anyhow!("region lock poisoned"))?;
                inner = guard;
            }

            inner.cut_active = true;
            inner.state = RegionState::Draining;
            inner.gate_closed = true;
            cut_id = inner.next_cut_id;
            inner.permits = inner.permits.saturating_sub(1);
            permit.deactivate();
            self.cond.notify_all();

            // The drain must never race a permit-holding submission.
            let deadline = Instant::now() + self.config.drain_timeout();
            while inner.permits > 0 {
                if inner.shutdown {
                    return Err(RegionError::Shutdown.into());
                }
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    drop(inner);
                    return self.fail_cut(
                        RegionError::Timeout {
                            timeout: self.config.drain_timeout(),
                            waiting_for: "outstanding permits",
                        }
                        .into(),
                    );
                }
                let (guard, _) = self
                    .cond
                    .wait_timeout(inner, remaining)
                    .map_err(|_| anyhow!("region lock poisoned"))?;
                inner = guard;
            }
        }

        debug!(region = self.config.index, cut = cut_id, "drain phase starting");
        if let Err(err) = self.drain_all() {
            return self.fail_cut(err);
        }

        {
            let mut inner = self.lock_inner()?;
            if inner.shutdown {
                return Err(RegionError::Shutdown.into());
            }
            inner.state = RegionState::Checkpointing;
        }
        debug!(region = self.config.index, cut = cut_id, "checkpoint phase starting");

        match mode {
            CutMode::Blocking => {
                let all: Vec<usize> = (0..self.operators.len()).collect();
                if let Err(err) = self.checkpoint_slots(cut_id, &all) {
                    return self.fail_cut(err);
                }
                if let Err(err) = self
                    .store
                    .seal(CheckpointMetadata::new(cut_id, self.operator_ids()))
                {
                    return self.fail_cut(err);
                }
                self.finish_cut_notifications(cut_id);
                self.complete_cut(cut_id, RegionState::Normal, DrainResult::Completed)
            }
            CutMode::NonBlocking => {
                for slot in self.operators.iter().filter(|s| s.non_blocking) {
                    match slot.handlers.lock() {
                        Ok(mut group) => {
                            if let Err(err) = group.prepare_for_non_blocking_checkpoint(cut_id) {
                                warn!(
                                    operator = %slot.id,
                                    error = %format!("{err:#}"),
                                    "prepare_for_non_blocking_checkpoint failed"
                                );
                            }
                        }
                        Err(_) => warn!(operator = %slot.id, "handler group lock poisoned"),
                    }
                }

                let inline: Vec<usize> = self
                    .operators
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| !s.non_blocking)
                    .map(|(i, _)| i)
                    .collect();
                let background: Vec<usize> = self
                    .operators
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| s.non_blocking)
                    .map(|(i, _)| i)
                    .collect();

                if let Err(err) = self.checkpoint_slots(cut_id, &inline) {
                    return self.fail_cut(err);
                }

                if background.is_empty() {
                    if let Err(err) = self
                        .store
                        .seal(CheckpointMetadata::new(cut_id, self.operator_ids()))
                    {
                        return self.fail_cut(err);
                    }
                    self.finish_cut_notifications(cut_id);
                    return self.complete_cut(cut_id, RegionState::Normal, DrainResult::Completed);
                }

                let reset_epoch = {
                    let inner = self.lock_inner()?;
                    inner.reset_epoch
                };
                let result = self.complete_cut(
                    cut_id,
                    RegionState::CheckpointPending,
                    DrainResult::CheckpointPending,
                )?;
                let job = BackgroundJob {
                    cut_id,
                    reset_epoch,
                    slots: background,
                };
                let sent = self
                    .background_tx
                    .lock()
                    .map_err(|_| anyhow!("background channel lock poisoned"))?
                    .as_ref()
                    .map(|tx| tx.send(job).is_ok())
                    .unwrap_or(false);
                if !sent {
                    return Err(RegionError::Shutdown.into());
                }
                Ok(result)
            }
        }
    }

    /// Release the caller's permit, wait for the cut in flight (or the next
    /// scheduled one) to finish, and adopt its outcome.
    fn adopt_next_cut(
        self: &Arc<Self>,
        mut inner: MutexGuard<'_, RegionInner>,
        permit: RegionPermit,
    ) -> Result<(DrainResult, RegionPermit)> {
        let epoch = inner.cut_epoch;
        inner.permits = inner.permits.saturating_sub(1);
        permit.deactivate();
        self.cond.notify_all();
        while inner.cut_epoch == epoch {
            if inner.shutdown {
                return Err(RegionError::Shutdown.into());
            }
            inner = self
                .cond
                .wait(inner)
                .map_err(|_| anyhow!("region lock poisoned"))?;
        }
        let result = if !inner.last_cut_ok {
            DrainResult::Failed
        } else if inner.state == RegionState::CheckpointPending {
            DrainResult::CheckpointPending
        } else {
            DrainResult::Completed
        };
        self.reacquire_and_return(inner, result)
    }

    /// Reacquire one permit once the gate opens and hand it back together
    /// with the given result.
    fn reacquire_and_return(
        self: &Arc<Self>,
        mut inner: MutexGuard<'_, RegionInner>,
        result: DrainResult,
    ) -> Result<(DrainResult, RegionPermit)> {
        loop {
            if inner.shutdown {
                return Err(RegionError::Shutdown.into());
            }
            if !inner.gate_closed {
                break;
            }
            inner = self
                .cond
                .wait(inner)
                .map_err(|_| anyhow!("region lock poisoned"))?;
        }
        inner.permits += 1;
        let sequence_id = visible_sequence(&inner);
        drop(inner);
        Ok((result, RegionPermit::new(Arc::clone(self), sequence_id)))
    }

    /// Successful end of a cut cycle: advance the sequence, reopen the gate,
    /// wake batched waiters, and reacquire the initiator's permit.
    fn complete_cut(
        self: &Arc<Self>,
        cut_id: SequenceId,
        next_state: RegionState,
        result: DrainResult,
    ) -> Result<(DrainResult, RegionPermit)> {
        let mut inner = self.lock_inner()?;
        inner.next_cut_id = cut_id + 1;
        inner.healthy = true;
        inner.reset_attempt = -1;
        inner.state = next_state;
        inner.background_pending = next_state == RegionState::CheckpointPending;
        inner.gate_closed = false;
        inner.cut_active = false;
        inner.cut_epoch += 1;
        inner.last_cut_ok = true;
        inner.permits += 1;
        let sequence_id = visible_sequence(&inner);
        self.cond.notify_all();
        drop(inner);
        debug!(region = self.config.index, cut = cut_id, ?result, "cut established");
        Ok((result, RegionPermit::new(Arc::clone(self), sequence_id)))
    }

    /// Failed cut: reset the region, record the failed cycle, and hand the
    /// initiator a fresh permit with the failure outcome.
    fn fail_cut(self: &Arc<Self>, err: anyhow::Error) -> Result<(DrainResult, RegionPermit)> {
        warn!(
            region = self.config.index,
            error = %format!("{err:#}"),
            "consistent cut failed; resetting region"
        );
        if let Err(fatal) = self.reset_internal() {
            // The region cannot recover; unblock everyone with shutdown.
            if let Ok(mut inner) = self.inner.lock() {
                inner.shutdown = true;
                self.cond.notify_all();
            }
            return Err(fatal);
        }
        let mut inner = self.lock_inner()?;
        inner.cut_active = false;
        inner.cut_epoch += 1;
        inner.last_cut_ok = false;
        self.cond.notify_all();
        self.reacquire_and_return(inner, DrainResult::Failed)
    }

    /// Reset the region to its most recent consistent state. Must not be
    /// called while holding a permit; the reset waits for all permits to
    /// return. If a reset is already underway this requests one more attempt
    /// and waits for it instead of stacking a second reset.
    pub fn request_reset(&self) -> Result<()> {
        debug!(region = self.config.index, "reset requested");
        self.reset_internal()
    }

    fn reset_internal(&self) -> Result<()> {
        {
            let mut inner = self.lock_inner()?;
            if inner.shutdown {
                return Err(RegionError::Shutdown.into());
            }
            if inner.state == RegionState::Resetting {
                inner.reset_requested = true;
                self.cond.notify_all();
                while inner.state == RegionState::Resetting && !inner.shutdown {
                    inner = self
                        .cond
                        .wait(inner)
                        .map_err(|_| anyhow!("region lock poisoned"))?;
                }
                return if inner.shutdown {
                    Err(RegionError::Shutdown.into())
                } else {
                    Ok(())
                };
            }
            inner.state = RegionState::Resetting;
            inner.healthy = false;
            inner.gate_closed = true;
            inner.reset_epoch += 1;
            inner.background_pending = false;
            inner.reset_attempt = 0;
            self.cond.notify_all();

            let deadline = Instant::now() + self.config.reset_timeout();
            while inner.permits > 0 {
                if inner.shutdown {
                    return Err(RegionError::Shutdown.into());
                }
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(RegionError::Timeout {
                        timeout: self.config.reset_timeout(),
                        waiting_for: "permits before reset",
                    }
                    .into());
                }
                let (guard, _) = self
                    .cond
                    .wait_timeout(inner, remaining)
                    .map_err(|_| anyhow!("region lock poisoned"))?;
                inner = guard;
            }
        }

        let mut attempt: u32 = 0;
        loop {
            {
                let mut inner = self.lock_inner()?;
                if inner.shutdown {
                    return Err(RegionError::Shutdown.into());
                }
                inner.reset_attempt = i64::from(attempt);
            }
            debug!(region = self.config.index, attempt, "reset attempt starting");
            match self.reset_attempt_once() {
                Ok(()) => {
                    let mut inner = self.lock_inner()?;
                    if inner.reset_requested {
                        inner.reset_requested = false;
                        drop(inner);
                        attempt = self.next_reset_attempt(attempt)?;
                        continue;
                    }
                    inner.state = RegionState::Normal;
                    inner.gate_closed = false;
                    self.cond.notify_all();
                    debug!(region = self.config.index, attempt, "reset complete");
                    return Ok(());
                }
                Err(err) => {
                    let fatal = matches!(
                        err.downcast_ref::<RegionError>(),
                        Some(
                            RegionError::Store(_)
                                | RegionError::Shutdown
                                | RegionError::PermitViolation(_)
                                | RegionError::ProtocolMisuse(_)
                        )
                    );
                    if fatal {
                        error!(
                            region = self.config.index,
                            error = %format!("{err:#}"),
                            "reset failed fatally"
                        );
                        return Err(err);
                    }
                    warn!(
                        region = self.config.index,
                        attempt,
                        error = %format!("{err:#}"),
                        "reset attempt failed; retrying"
                    );
                    attempt = self.next_reset_attempt(attempt)?;
                }
            }
        }
    }

    fn next_reset_attempt(&self, attempt: u32) -> Result<u32> {
        let next = attempt + 1;
        if let Some(max) = self.config.max_reset_attempts {
            if next >= max {
                return Err(RegionError::ResetFailed(next).into());
            }
        }
        Ok(next)
    }

    /// One reset attempt: restore every operator from the newest sealed cut,
    /// or to initial state if the store has none. A store read failure here
    /// is fatal and never retried.
    fn reset_attempt_once(&self) -> Result<()> {
        let latest = self
            .store
            .latest()
            .map_err(|e| RegionError::Store(format!("{e:#}")))?;
        let timeout = self.config.reset_timeout();
        match latest {
            Some(seq) => {
                let jobs: Vec<FanoutJob> = self
                    .operators
                    .iter()
                    .map(|slot| {
                        let store = Arc::clone(&self.store);
                        let handlers = Arc::clone(&slot.handlers);
                        let id = slot.id;
                        Box::new(move |_abandoned: &AtomicBool| -> Result<()> {
                            let mut checkpoint = store.open_read(seq, id).map_err(|e| {
                                anyhow::Error::from(RegionError::Store(format!("{e:#}")))
                            })?;
                            handlers
                                .lock()
                                .map_err(|_| anyhow!("handler group lock poisoned"))?
                                .reset(&mut checkpoint)
                        }) as FanoutJob
                    })
                    .collect();
                run_with_deadline(jobs, timeout, "reset")?;
                let mut inner = self.lock_inner()?;
                if inner.next_cut_id <= seq {
                    inner.next_cut_id = seq + 1;
                }
            }
            None => {
                let jobs: Vec<FanoutJob> = self
                    .operators
                    .iter()
                    .map(|slot| {
                        let handlers = Arc::clone(&slot.handlers);
                        Box::new(move |_abandoned: &AtomicBool| -> Result<()> {
                            handlers
                                .lock()
                                .map_err(|_| anyhow!("handler group lock poisoned"))?
                                .reset_to_initial_state()
                        }) as FanoutJob
                    })
                    .collect();
                run_with_deadline(jobs, timeout, "reset")?;
            }
        }
        Ok(())
    }

    fn drain_all(&self) -> Result<()> {
        let jobs: Vec<FanoutJob> = self
            .operators
            .iter()
            .map(|slot| {
                let handlers = Arc::clone(&slot.handlers);
                Box::new(move |_abandoned: &AtomicBool| -> Result<()> {
                    handlers
                        .lock()
                        .map_err(|_| anyhow!("handler group lock poisoned"))?
                        .drain()
                }) as FanoutJob
            })
            .collect();
        run_with_deadline(jobs, self.config.drain_timeout(), "drain")
    }

    fn checkpoint_slots(&self, cut_id: SequenceId, indices: &[usize]) -> Result<()> {
        let jobs: Vec<FanoutJob> = indices
            .iter()
            .map(|&index| {
                let slot = &self.operators[index];
                let store = Arc::clone(&self.store);
                let handlers = Arc::clone(&slot.handlers);
                let id = slot.id;
                Box::new(move |abandoned: &AtomicBool| -> Result<()> {
                    let mut checkpoint = store.open_write(cut_id, id)?;
                    handlers
                        .lock()
                        .map_err(|_| anyhow!("handler group lock poisoned"))?
                        .checkpoint(&mut checkpoint)?;
                    if abandoned.load(Ordering::SeqCst) {
                        return Err(anyhow!("cut {cut_id} abandoned before commit"));
                    }
                    store.commit(checkpoint)
                }) as FanoutJob
            })
            .collect();
        run_with_deadline(jobs, self.config.drain_timeout(), "checkpoint")
    }

    /// Post-cut notifications, all best-effort: retire the previous cut in
    /// handlers and store, then announce the sealed cut to start operators.
    fn finish_cut_notifications(&self, cut_id: SequenceId) {
        let previous = cut_id - 1;
        if previous >= 1 {
            for slot in &self.operators {
                match slot.handlers.lock() {
                    Ok(mut group) => {
                        if let Err(err) = group.retire_checkpoint(previous) {
                            warn!(
                                operator = %slot.id,
                                error = %format!("{err:#}"),
                                "retire_checkpoint failed"
                            );
                        }
                    }
                    Err(_) => warn!(operator = %slot.id, "handler group lock poisoned"),
                }
            }
            if let Err(err) = self.store.retire(previous) {
                warn!(
                    cut = previous,
                    error = %format!("{err:#}"),
                    "retiring previous checkpoint failed"
                );
            }
        }
        for slot in self.operators.iter().filter(|s| s.roles.start_of_region) {
            match slot.handlers.lock() {
                Ok(mut group) => {
                    if let Err(err) = group.region_checkpointed(cut_id) {
                        warn!(
                            operator = %slot.id,
                            error = %format!("{err:#}"),
                            "region_checkpointed notification failed"
                        );
                    }
                }
                Err(_) => warn!(operator = %slot.id, "handler group lock poisoned"),
            }
        }
    }

    fn run_background_checkpoint(self: &Arc<Self>, job: &BackgroundJob) -> Result<()> {
        {
            let inner = self.lock_inner()?;
            if inner.shutdown || inner.reset_epoch != job.reset_epoch {
                debug!(cut = job.cut_id, "discarding stale background checkpoint");
                return Ok(());
            }
        }
        for &index in &job.slots {
            let slot = &self.operators[index];
            let mut checkpoint = self.store.open_write(job.cut_id, slot.id)?;
            slot.handlers
                .lock()
                .map_err(|_| anyhow!("handler group lock poisoned"))?
                .checkpoint(&mut checkpoint)?;
            {
                let inner = self.lock_inner()?;
                if inner.shutdown || inner.reset_epoch != job.reset_epoch {
                    debug!(cut = job.cut_id, "discarding stale background checkpoint");
                    return Ok(());
                }
            }
            self.store.commit(checkpoint)?;
        }
        self.store
            .seal(CheckpointMetadata::new(job.cut_id, self.operator_ids()))?;
        self.finish_cut_notifications(job.cut_id);

        let mut inner = self.lock_inner()?;
        if inner.reset_epoch == job.reset_epoch {
            inner.background_pending = false;
            if inner.state == RegionState::CheckpointPending {
                inner.state = RegionState::Normal;
            }
            self.cond.notify_all();
        }
        debug!(cut = job.cut_id, "background checkpoint sealed");
        Ok(())
    }

    /// Stop the region: wake all waiters, fail in-flight cycles, join the
    /// background threads, and close every handler group.
    pub fn shutdown(&self) -> Result<()> {
        {
            let mut inner = self.lock_inner()?;
            if inner.shutdown {
                return Ok(());
            }
            inner.shutdown = true;
            self.cond.notify_all();
        }
        if let Ok(mut tx) = self.background_tx.lock() {
            *tx = None;
        }
        let handles = {
            let mut threads = self
                .threads
                .lock()
                .map_err(|_| anyhow!("region thread list lock poisoned"))?;
            std::mem::take(&mut *threads)
        };
        for handle in handles {
            let _ = handle.join();
        }
        for slot in &self.operators {
            match slot.handlers.lock() {
                Ok(mut group) => {
                    if let Err(err) = group.close() {
                        warn!(operator = %slot.id, error = %format!("{err:#}"), "close failed");
                    }
                }
                Err(_) => warn!(operator = %slot.id, "handler group lock poisoned"),
            }
        }
        Ok(())
    }
}

fn background_worker(region: Arc<ConsistentRegion>, jobs: Receiver<BackgroundJob>) {
    while let Ok(job) = jobs.recv() {
        if let Err(err) = region.run_background_checkpoint(&job) {
            if matches!(
                err.downcast_ref::<RegionError>(),
                Some(RegionError::Shutdown)
            ) {
                return;
            }
            error!(
                cut = job.cut_id,
                error = %format!("{err:#}"),
                "background checkpoint failed; resetting region"
            );
            match region.reset_internal() {
                Ok(()) => {}
                Err(fatal) => {
                    if matches!(
                        fatal.downcast_ref::<RegionError>(),
                        Some(RegionError::Shutdown)
                    ) {
                        return;
                    }
                    error!(error = %format!("{fatal:#}"), "reset after background failure failed");
                    return;
                }
            }
        }
    }
}

fn periodic_driver(region: Arc<ConsistentRegion>, period: Duration, non_blocking: bool) {
    debug!(region = region.config.index, ?period, "periodic driver started");
    loop {
        {
            let Ok(mut inner) = region.inner.lock() else {
                return;
            };
            let deadline = Instant::now() + period;
            loop {
                if inner.shutdown {
                    return;
                }
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                let Ok((guard, _)) = region.cond.wait_timeout(inner, remaining) else {
                    return;
                };
                inner = guard;
            }
        }

        let permit = match region.acquire_permit() {
            Ok(permit) => permit,
            Err(_) => return,
        };
        let mode = if non_blocking {
            CutMode::NonBlocking
        } else {
            CutMode::Blocking
        };
        match region.cut_cycle(Initiator::Driver, permit, mode) {
            Ok((DrainResult::Failed, _permit)) => {
                warn!(region = region.config.index, "scheduled cut failed; region was reset");
            }
            Ok(_) => {}
            Err(err) => {
                if matches!(
                    err.downcast_ref::<RegionError>(),
                    Some(RegionError::Shutdown)
                ) {
                    return;
                }
                error!(
                    region = region.config.index,
                    error = %format!("{err:#}"),
                    "scheduled cut failed fatally"
                );
                return;
            }
        }
    }
}
