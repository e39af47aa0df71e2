use super::*;

/// One handler call dispatched to a worker thread. The flag flips to true
/// when the fan-out has been abandoned; jobs must check it before committing
/// any side effect so late results are discarded, never applied.
pub(crate) type FanoutJob = Box<dyn FnOnce(&AtomicBool) -> Result<()> + Send + 'static>;

/// Run jobs in parallel, one thread each, and wait for all of them up to
/// `timeout`. Fails fast: the first job error abandons the fan-out and
/// propagates unchanged. A deadline miss abandons the fan-out and reports
/// [`RegionError::Timeout`]. Worker threads are detached; stragglers finish
/// against the abandoned flag and their results are dropped with the channel.
pub(crate) fn run_with_deadline(
    jobs: Vec<FanoutJob>,
    timeout: Duration,
    phase: &'static str,
) -> Result<()> {
    if jobs.is_empty() {
        return Ok(());
    }
    let expected = jobs.len();
    let abandoned = Arc::new(AtomicBool::new(false));
    let (tx, rx) = bounded::<Result<()>>(expected);
    let deadline = Instant::now() + timeout;

    for (index, job) in jobs.into_iter().enumerate() {
        let tx = tx.clone();
        let abandoned = Arc::clone(&abandoned);
        thread::Builder::new()
            .name(format!("{phase}-{index}"))
            .spawn(move || {
                let result = job(&abandoned);
                // Receiver may be gone if the fan-out was abandoned.
                let _ = tx.send(result);
            })
            .map_err(|e| anyhow!("failed to spawn {phase} worker: {e}"))?;
    }
    drop(tx);

    for _ in 0..expected {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                abandoned.store(true, Ordering::SeqCst);
                return Err(err);
            }
            Err(_) => {
                abandoned.store(true, Ordering::SeqCst);
                return Err(RegionError::Timeout {
                    timeout,
                    waiting_for: phase,
                }
                .into());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completes_when_all_jobs_succeed() {
        let jobs: Vec<FanoutJob> = (0..4).map(|_| Box::new(|_: &AtomicBool| Ok(())) as FanoutJob).collect();
        run_with_deadline(jobs, Duration::from_secs(1), "drain").unwrap();
    }

    #[test]
    fn first_error_propagates_unchanged() {
        let jobs: Vec<FanoutJob> = vec![
            Box::new(|_: &AtomicBool| Ok(())),
            Box::new(|_: &AtomicBool| Err(RegionError::Store("gone".into()).into())),
        ];
        let err = run_with_deadline(jobs, Duration::from_secs(1), "reset").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RegionError>(),
            Some(RegionError::Store(_))
        ));
    }

    #[test]
    fn deadline_miss_reports_timeout_and_abandons() {
        let committed = Arc::new(AtomicBool::new(false));
        let committed_probe = Arc::clone(&committed);
        let jobs: Vec<FanoutJob> = vec![Box::new(move |abandoned: &AtomicBool| {
            thread::sleep(Duration::from_millis(300));
            if !abandoned.load(Ordering::SeqCst) {
                committed_probe.store(true, Ordering::SeqCst);
            }
            Ok(())
        })];
        let err = run_with_deadline(jobs, Duration::from_millis(50), "drain").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RegionError>(),
            Some(RegionError::Timeout { .. })
        ));
        // Give the straggler time to finish and observe the flag.
        thread::sleep(Duration::from_millis(400));
        assert!(!committed.load(Ordering::SeqCst));
    }

    #[test]
    fn empty_fan_out_is_trivially_done() {
        run_with_deadline(Vec::new(), Duration::from_millis(1), "drain").unwrap();
    }
}
