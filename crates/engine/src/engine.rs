//! Fixed-cadence polling engine.
//!
//! Every tick lists all jobs, then dispatches one task per enabled job. A
//! per-job in-flight set guarantees at most one cycle per job id; a job whose
//! previous cycle is still running is skipped for that tick. The loop never
//! waits on cycle tasks before the next tick.
//!
//! The listed snapshot is only trusted for jobs with no cycle finishing
//! between the start of `list()` and dispatch. A job whose cycle committed in
//! that window is skipped, so a cycle never starts from a stale watermark.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use delta_core::Clock;
use delta_registry::{JobRegistry, RegistryError};
use delta_source::SourceConnector;
use delta_storage::BatchSink;

use crate::cycle::{CycleError, CycleOutcome, CycleRunner};

/// Cycles running now and cycles finished so far, per job.
#[derive(Debug, Default)]
struct CycleLedger {
    running: HashSet<Uuid>,
    finished: HashMap<Uuid, u64>,
}

type SharedLedger = Arc<Mutex<CycleLedger>>;

fn lock(ledger: &SharedLedger) -> MutexGuard<'_, CycleLedger> {
    ledger.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Finished-cycle counts taken before listing jobs.
type FinishedSnapshot = HashMap<Uuid, u64>;

enum Claim {
    Acquired(InFlightGuard),
    Running,
    /// A cycle finished after the snapshot; the listed state may be stale.
    Stale,
}

/// Holds a job id in the in-flight set until dropped. Dropping happens on
/// completion, error or panic of the cycle task.
struct InFlightGuard {
    ledger: SharedLedger,
    job_id: Uuid,
}

impl InFlightGuard {
    fn acquire(ledger: &SharedLedger, job_id: Uuid, seen: &FinishedSnapshot) -> Claim {
        let mut state = lock(ledger);
        if state.running.contains(&job_id) {
            return Claim::Running;
        }
        let finished = state.finished.get(&job_id).copied().unwrap_or(0);
        if finished != seen.get(&job_id).copied().unwrap_or(0) {
            return Claim::Stale;
        }
        state.running.insert(job_id);
        Claim::Acquired(Self {
            ledger: ledger.clone(),
            job_id,
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut state = lock(&self.ledger);
        state.running.remove(&self.job_id);
        *state.finished.entry(self.job_id).or_default() += 1;
    }
}

/// Result of one job's cycle within a tick.
#[derive(Debug)]
pub struct CycleReport {
    pub job_id: Uuid,
    pub result: Result<CycleOutcome, CycleError>,
}

/// Summary of one tick.
#[derive(Debug, Default)]
pub struct TickReport {
    pub dispatched: usize,
    pub skipped_in_flight: usize,
    /// Jobs whose previous cycle finished while the job list was loading.
    pub skipped_stale: usize,
    pub delivered: usize,
    pub idle: usize,
    pub failed: usize,
    pub cycles: Vec<CycleReport>,
}

impl TickReport {
    fn record(&mut self, report: CycleReport) {
        match &report.result {
            Ok(CycleOutcome::Delivered { .. }) => self.delivered += 1,
            Ok(CycleOutcome::Idle) => self.idle += 1,
            Err(_) => self.failed += 1,
        }
        self.cycles.push(report);
    }

    pub fn log(&self) {
        info!(
            dispatched = self.dispatched,
            skipped_in_flight = self.skipped_in_flight,
            skipped_stale = self.skipped_stale,
            delivered = self.delivered,
            idle = self.idle,
            failed = self.failed,
            "poll tick complete"
        );
    }
}

/// Cycles dispatched by one tick, not yet awaited.
struct Dispatch {
    skipped_in_flight: usize,
    skipped_stale: usize,
    handles: Vec<(Uuid, JoinHandle<Result<CycleOutcome, CycleError>>)>,
}

impl Dispatch {
    async fn join(self) -> TickReport {
        let mut report = TickReport {
            dispatched: self.handles.len(),
            skipped_in_flight: self.skipped_in_flight,
            skipped_stale: self.skipped_stale,
            ..TickReport::default()
        };
        for (job_id, handle) in self.handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    warn!(job_id = %job_id, error = %e, "cycle task aborted");
                    Err(CycleError::Aborted(e.to_string()))
                }
            };
            report.record(CycleReport { job_id, result });
        }
        report
    }
}

pub struct PollingEngine {
    runner: CycleRunner,
    interval: Duration,
    ledger: SharedLedger,
}

impl PollingEngine {
    pub fn new(
        registry: Arc<dyn JobRegistry>,
        connector: Arc<dyn SourceConnector>,
        sink: Arc<dyn BatchSink>,
        clock: Arc<dyn Clock>,
        page_size: u32,
        interval: Duration,
    ) -> Self {
        Self {
            runner: CycleRunner {
                registry,
                connector,
                sink,
                clock,
                page_size,
            },
            interval,
            ledger: SharedLedger::default(),
        }
    }

    /// Number of cycles currently running.
    pub fn in_flight(&self) -> usize {
        lock(&self.ledger).running.len()
    }

    /// Run one tick and wait for every dispatched cycle to finish.
    pub async fn poll_once(&self) -> Result<TickReport, RegistryError> {
        let report = self.dispatch().await?.join().await;
        report.log();
        Ok(report)
    }

    /// Tick on the cadence until `shutdown` is notified. Cycles still running
    /// at shutdown are left to finish on their own.
    pub async fn run(&self, shutdown: Arc<Notify>) {
        info!("polling engine started (interval: {}s)", self.interval.as_secs());

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let stop = shutdown.notified();
        tokio::pin!(stop);

        loop {
            tokio::select! {
                _ = &mut stop => {
                    info!(in_flight = self.in_flight(), "polling engine shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    match self.dispatch().await {
                        Ok(dispatch) => {
                            tokio::spawn(async move { dispatch.join().await.log() });
                        }
                        Err(e) => {
                            warn!(error = %e, "failed to list jobs");
                        }
                    }
                }
            }
        }
    }

    async fn dispatch(&self) -> Result<Dispatch, RegistryError> {
        let seen: FinishedSnapshot = lock(&self.ledger).finished.clone();
        let jobs = self.runner.registry.list().await?;
        let mut dispatch = Dispatch {
            skipped_in_flight: 0,
            skipped_stale: 0,
            handles: Vec::new(),
        };

        for job in jobs.into_iter().filter(|j| j.enabled) {
            let guard = match InFlightGuard::acquire(&self.ledger, job.id, &seen) {
                Claim::Acquired(guard) => guard,
                Claim::Running => {
                    debug!(job_id = %job.id, "previous cycle still running, skipping");
                    dispatch.skipped_in_flight += 1;
                    continue;
                }
                Claim::Stale => {
                    debug!(job_id = %job.id, "cycle finished during listing, skipping");
                    dispatch.skipped_stale += 1;
                    continue;
                }
            };

            let runner = self.runner.clone();
            let job_id = job.id;
            let handle = tokio::spawn(async move {
                let _guard = guard;
                let result = runner.run(&job).await;
                match &result {
                    Ok(CycleOutcome::Delivered { rows, watermark, .. }) => {
                        debug!(job_id = %job.id, rows, watermark = %watermark, "cycle committed");
                    }
                    Ok(CycleOutcome::Idle) => {}
                    Err(e @ CycleError::Commit { .. }) => {
                        warn!(
                            job_id = %job.id,
                            phase = %e.phase(),
                            error = %e,
                            "batch delivered but not committed, it will be re-delivered"
                        );
                    }
                    Err(e) => {
                        warn!(
                            job_id = %job.id,
                            phase = %e.phase(),
                            error = %e,
                            "poll cycle failed"
                        );
                    }
                }
                result
            });
            dispatch.handles.push((job_id, handle));
        }

        Ok(dispatch)
    }
}
