//! End-to-end poll cycles against in-process collaborators: an in-memory
//! registry, a scripted source and the object-store sink over `InMemory`.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures::TryStreamExt;
use object_store::ObjectStore;
use proptest::prelude::*;
use tokio::sync::Notify;
use uuid::Uuid;

use delta_core::config::StorageConfig;
use delta_core::{
    CaptureState, Config, FieldValue, Job, JobDefinition, ManualClock, Row, SourceConfig,
    Watermark,
};
use delta_engine::{CycleError, CycleOutcome, PollingEngine};
use delta_registry::{InMemoryRegistry, JobRegistry, RegistryError};
use delta_source::{SourceConnector, SourceError, SourceQuery};
use delta_storage::{BatchSink, DeliveryError, ObjectKey, ObjectStoreSink};

// ── Fakes ────────────────────────────────────────────────────────────

/// Source keyed by `source.database`. In `simulate_sql` mode the `id > $1`
/// predicate, ordering and page size are applied like a database would;
/// otherwise rows are returned exactly as scripted.
#[derive(Default)]
struct FakeSource {
    tables: Mutex<HashMap<String, Vec<Row>>>,
    simulate_sql: AtomicBool,
    failing: Mutex<HashSet<String>>,
    queries: Mutex<Vec<SourceQuery>>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeSource {
    fn set_rows(&self, database: &str, ids: &[i64]) {
        let rows = ids.iter().map(|&id| row(id)).collect();
        self.tables.lock().unwrap().insert(database.to_string(), rows);
    }

    fn queries(&self) -> Vec<SourceQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceConnector for FakeSource {
    async fn fetch(
        &self,
        source: &SourceConfig,
        query: &SourceQuery,
    ) -> Result<Vec<Row>, SourceError> {
        self.queries.lock().unwrap().push(query.clone());

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self.failing.lock().unwrap().contains(&source.database) {
            return Err(SourceError::Connection("connection refused".into()));
        }

        let mut rows = self
            .tables
            .lock()
            .unwrap()
            .get(&source.database)
            .cloned()
            .unwrap_or_default();

        if self.simulate_sql.load(Ordering::SeqCst) {
            let id = |r: &Row| Watermark::from_field(r.get("id").unwrap()).unwrap();
            if let Some(last) = query.params.first() {
                rows.retain(|r| id(r) > *last);
            }
            rows.sort_by(|a, b| id(a).partial_cmp(&id(b)).unwrap());
            rows.truncate(100);
        }
        Ok(rows)
    }
}

struct FlakySink {
    inner: ObjectStoreSink,
    fail: AtomicBool,
}

#[async_trait]
impl BatchSink for FlakySink {
    async fn deliver(&self, job: &Job, rows: &[Row]) -> Result<Option<ObjectKey>, DeliveryError> {
        if self.fail.load(Ordering::SeqCst) && !rows.is_empty() {
            return Err(DeliveryError::Io(std::io::Error::other("bucket unavailable")));
        }
        self.inner.deliver(job, rows).await
    }
}

/// Pauses the next `list()` after its snapshot is taken.
struct ListPause {
    taken: Arc<Notify>,
    resume: Arc<Notify>,
}

struct FlakyRegistry {
    inner: InMemoryRegistry,
    fail_commits: AtomicBool,
    list_pause: Mutex<Option<ListPause>>,
}

#[async_trait]
impl JobRegistry for FlakyRegistry {
    async fn create(&self, definition: JobDefinition) -> Result<Job, RegistryError> {
        self.inner.create(definition).await
    }

    async fn get(&self, id: Uuid) -> Result<Job, RegistryError> {
        self.inner.get(id).await
    }

    async fn list(&self) -> Result<Vec<Job>, RegistryError> {
        let jobs = self.inner.list().await?;
        let pause = self.list_pause.lock().unwrap().take();
        if let Some(pause) = pause {
            pause.taken.notify_one();
            pause.resume.notified().await;
        }
        Ok(jobs)
    }

    async fn start(&self, id: Uuid) -> Result<Job, RegistryError> {
        self.inner.start(id).await
    }

    async fn stop(&self, id: Uuid) -> Result<Job, RegistryError> {
        self.inner.stop(id).await
    }

    async fn update_state(&self, id: Uuid, state: CaptureState) -> Result<(), RegistryError> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(RegistryError::Transport("backend unreachable".into()));
        }
        self.inner.update_state(id, state).await
    }
}

// ── Harness ──────────────────────────────────────────────────────────

struct Harness {
    registry: Arc<FlakyRegistry>,
    source: Arc<FakeSource>,
    sink: Arc<FlakySink>,
    clock: Arc<ManualClock>,
    engine: Arc<PollingEngine>,
}

fn storage_settings() -> StorageConfig {
    Config::for_profile("ZZ_ENGINE_TEST").storage
}

fn row(id: i64) -> Row {
    let mut r = Row::new();
    r.insert("id".into(), FieldValue::Int(id));
    r.insert("note".into(), FieldValue::Text(format!("row {id}")));
    r
}

fn definition(database: &str, watermark_column: Option<&str>) -> JobDefinition {
    serde_json::from_value(serde_json::json!({
        "name": format!("{database}-capture"),
        "source": {
            "vendor": "postgres",
            "host": "db.internal",
            "port": 5432,
            "database": database,
            "user": "reader"
        },
        "destination": { "provider": "memory", "bucket": database, "base_path": "raw" },
        "capture": { "table": "orders", "watermark_column": watermark_column }
    }))
    .unwrap()
}

impl Harness {
    fn new() -> Self {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
        ));
        let registry = Arc::new(FlakyRegistry {
            inner: InMemoryRegistry::with_clock(clock.clone()),
            fail_commits: AtomicBool::new(false),
            list_pause: Mutex::new(None),
        });
        let source = Arc::new(FakeSource::default());
        let sink = Arc::new(FlakySink {
            inner: ObjectStoreSink::with_clock(storage_settings(), clock.clone()),
            fail: AtomicBool::new(false),
        });
        let engine = Arc::new(PollingEngine::new(
            registry.clone(),
            source.clone(),
            sink.clone(),
            clock.clone(),
            100,
            Duration::from_millis(50),
        ));
        Self {
            registry,
            source,
            sink,
            clock,
            engine,
        }
    }

    async fn running_job(&self, database: &str, column: Option<&str>) -> Job {
        let job = self.registry.create(definition(database, column)).await.unwrap();
        self.registry.start(job.id).await.unwrap()
    }

    async fn watermark(&self, id: Uuid) -> Option<Watermark> {
        self.registry.get(id).await.unwrap().state.last_watermark
    }

    async fn objects(&self, job: &Job) -> Vec<Vec<u8>> {
        let store = self.sink.inner.store_for(&job.destination).unwrap();
        let metas: Vec<_> = store.list(None).try_collect().await.unwrap();
        let mut bodies = Vec::new();
        for meta in metas {
            let bytes = store.get(&meta.location).await.unwrap().bytes().await.unwrap();
            bodies.push(bytes.to_vec());
        }
        bodies
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[tokio::test]
async fn unordered_batch_advances_to_max() {
    let h = Harness::new();
    let job = h.running_job("shop", Some("id")).await;
    h.source.set_rows("shop", &[5, 3, 9, 1]);

    let report = h.engine.poll_once().await.unwrap();
    assert_eq!(report.dispatched, 1);
    assert_eq!(report.delivered, 1);
    assert_eq!(h.watermark(job.id).await, Some(Watermark::Int(9)));
    assert_eq!(h.objects(&job).await.len(), 1);
}

#[tokio::test]
async fn committed_watermark_is_the_query_predicate() {
    let h = Harness::new();
    h.source.simulate_sql.store(true, Ordering::SeqCst);
    let job = h.running_job("shop", Some("id")).await;
    h.registry
        .update_state(job.id, CaptureState::at(Watermark::Int(9)))
        .await
        .unwrap();
    h.source.set_rows("shop", &[3, 7]);

    let report = h.engine.poll_once().await.unwrap();

    let queries = h.source.queries();
    assert_eq!(queries.len(), 1);
    assert!(queries[0].sql.contains("WHERE \"id\" > $1"));
    assert_eq!(queries[0].params, vec![Watermark::Int(9)]);
    assert_eq!(report.idle, 1);
    assert!(h.objects(&job).await.is_empty());
}

#[tokio::test]
async fn zero_rows_write_nothing_and_keep_state() {
    let h = Harness::new();
    let job = h.running_job("shop", Some("id")).await;
    h.registry
        .update_state(job.id, CaptureState::at(Watermark::Int(4)))
        .await
        .unwrap();
    let before = h.registry.get(job.id).await.unwrap();

    let report = h.engine.poll_once().await.unwrap();
    assert!(matches!(report.cycles[0].result, Ok(CycleOutcome::Idle)));

    let after = h.registry.get(job.id).await.unwrap();
    assert_eq!(after.state, before.state);
    assert_eq!(after.updated_at, before.updated_at);
    assert!(h.objects(&job).await.is_empty());
}

#[tokio::test]
async fn delivery_failure_keeps_state_and_retry_repeats_query() {
    let h = Harness::new();
    h.source.simulate_sql.store(true, Ordering::SeqCst);
    let job = h.running_job("shop", Some("id")).await;
    h.source.set_rows("shop", &[1, 2]);

    h.sink.fail.store(true, Ordering::SeqCst);
    let report = h.engine.poll_once().await.unwrap();
    assert_eq!(report.failed, 1);
    assert!(matches!(report.cycles[0].result, Err(CycleError::Delivery(_))));
    assert_eq!(h.watermark(job.id).await, None);
    assert!(h.objects(&job).await.is_empty());

    h.sink.fail.store(false, Ordering::SeqCst);
    h.clock.advance_secs(5);
    let report = h.engine.poll_once().await.unwrap();
    assert_eq!(report.delivered, 1);

    let queries = h.source.queries();
    assert_eq!(queries.len(), 2);
    assert_eq!(queries[0], queries[1]);
    assert_eq!(h.watermark(job.id).await, Some(Watermark::Int(2)));
}

#[tokio::test]
async fn commit_failure_redelivers_same_batch() {
    let h = Harness::new();
    h.source.simulate_sql.store(true, Ordering::SeqCst);
    let job = h.running_job("shop", Some("id")).await;
    h.source.set_rows("shop", &[10, 11, 12]);

    h.registry.fail_commits.store(true, Ordering::SeqCst);
    let report = h.engine.poll_once().await.unwrap();
    assert!(matches!(report.cycles[0].result, Err(CycleError::Commit { .. })));
    assert_eq!(h.watermark(job.id).await, None);
    assert_eq!(h.objects(&job).await.len(), 1);

    h.registry.fail_commits.store(false, Ordering::SeqCst);
    h.clock.advance_secs(5);
    h.engine.poll_once().await.unwrap();

    // At-least-once: the same logical batch now exists twice, under two keys.
    let objects = h.objects(&job).await;
    assert_eq!(objects.len(), 2);
    assert_eq!(objects[0], objects[1]);
    assert_eq!(h.watermark(job.id).await, Some(Watermark::Int(12)));
}

#[tokio::test]
async fn only_enabled_jobs_are_polled() {
    let h = Harness::new();
    let created = h.registry.create(definition("created", Some("id"))).await.unwrap();
    let stopped = h.running_job("stopped", Some("id")).await;
    h.registry.stop(stopped.id).await.unwrap();
    let running = h.running_job("running", Some("id")).await;
    for db in ["created", "stopped", "running"] {
        h.source.set_rows(db, &[1]);
    }

    let report = h.engine.poll_once().await.unwrap();
    assert_eq!(report.dispatched, 1);
    assert_eq!(report.cycles[0].job_id, running.id);
    assert_eq!(h.watermark(created.id).await, None);
    assert_eq!(h.watermark(stopped.id).await, None);
}

#[tokio::test]
async fn failing_job_does_not_block_others() {
    let h = Harness::new();
    let broken = h.running_job("broken", Some("id")).await;
    let healthy = h.running_job("healthy", Some("id")).await;
    h.source.failing.lock().unwrap().insert("broken".into());
    h.source.set_rows("healthy", &[1, 2, 3]);

    let report = h.engine.poll_once().await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.delivered, 1);
    assert_eq!(h.watermark(broken.id).await, None);
    assert_eq!(h.watermark(healthy.id).await, Some(Watermark::Int(3)));
}

#[tokio::test]
async fn in_flight_job_is_skipped() {
    let h = Harness::new();
    let job = h.running_job("shop", Some("id")).await;
    h.source.set_rows("shop", &[1]);
    let gate = Arc::new(Notify::new());
    *h.source.gate.lock().unwrap() = Some(gate.clone());

    let engine = h.engine.clone();
    let first = tokio::spawn(async move { engine.poll_once().await });
    while h.engine.in_flight() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let second = h.engine.poll_once().await.unwrap();
    assert_eq!(second.dispatched, 0);
    assert_eq!(second.skipped_in_flight, 1);

    gate.notify_one();
    let first = first.await.unwrap().unwrap();
    assert_eq!(first.delivered, 1);
    assert_eq!(h.engine.in_flight(), 0);
    assert_eq!(h.watermark(job.id).await, Some(Watermark::Int(1)));
}

#[tokio::test]
async fn cycle_committed_during_listing_is_not_rerun_from_stale_state() {
    let h = Harness::new();
    h.source.simulate_sql.store(true, Ordering::SeqCst);
    let job = h.running_job("shop", Some("id")).await;
    h.source.set_rows("shop", &[10, 20]);

    // First tick: its cycle is held inside the source fetch.
    let gate = Arc::new(Notify::new());
    *h.source.gate.lock().unwrap() = Some(gate.clone());
    let engine = h.engine.clone();
    let first = tokio::spawn(async move { engine.poll_once().await });
    while h.engine.in_flight() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // Second tick: its job list is read while the watermark is still empty.
    let taken = Arc::new(Notify::new());
    let resume = Arc::new(Notify::new());
    *h.registry.list_pause.lock().unwrap() = Some(ListPause {
        taken: taken.clone(),
        resume: resume.clone(),
    });
    let engine = h.engine.clone();
    let second = tokio::spawn(async move { engine.poll_once().await });
    taken.notified().await;

    // The first cycle commits 20 before the second tick dispatches.
    *h.source.gate.lock().unwrap() = None;
    gate.notify_one();
    let first = first.await.unwrap().unwrap();
    assert_eq!(first.delivered, 1);
    assert_eq!(h.watermark(job.id).await, Some(Watermark::Int(20)));

    // A late row below the committed watermark must not drag it back.
    h.source.set_rows("shop", &[5, 10, 20]);
    resume.notify_one();
    let second = second.await.unwrap().unwrap();
    assert_eq!(second.dispatched, 0);
    assert_eq!(second.skipped_stale, 1);
    assert_eq!(h.watermark(job.id).await, Some(Watermark::Int(20)));
    assert_eq!(h.objects(&job).await.len(), 1);

    // The next tick reads the committed state.
    h.clock.advance_secs(5);
    let third = h.engine.poll_once().await.unwrap();
    assert_eq!(third.idle, 1);
    let queries = h.source.queries();
    assert_eq!(queries.len(), 2);
    assert_eq!(queries[1].params, vec![Watermark::Int(20)]);
    assert_eq!(h.watermark(job.id).await, Some(Watermark::Int(20)));
}

#[tokio::test]
async fn without_column_the_leading_page_is_reread() {
    let h = Harness::new();
    h.source.simulate_sql.store(true, Ordering::SeqCst);
    let job = h.running_job("shop", None).await;
    h.source.set_rows("shop", &[1, 2]);

    h.engine.poll_once().await.unwrap();
    h.clock.advance_secs(5);
    h.engine.poll_once().await.unwrap();

    let queries = h.source.queries();
    assert!(queries.iter().all(|q| q.params.is_empty()));
    assert_eq!(h.objects(&job).await.len(), 2);
    assert!(matches!(h.watermark(job.id).await, Some(Watermark::Timestamp(_))));
}

#[tokio::test]
async fn run_ticks_until_shutdown() {
    let h = Harness::new();
    let job = h.running_job("shop", Some("id")).await;
    h.source.simulate_sql.store(true, Ordering::SeqCst);
    h.source.set_rows("shop", &[1, 2, 3]);

    let shutdown = Arc::new(Notify::new());
    let engine = h.engine.clone();
    let stop = shutdown.clone();
    let running = tokio::spawn(async move { engine.run(stop).await });

    for _ in 0..200 {
        if h.watermark(job.id).await.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    shutdown.notify_one();
    running.await.unwrap();

    assert_eq!(h.watermark(job.id).await, Some(Watermark::Int(3)));
}

// ── Properties ───────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        ..ProptestConfig::default()
    })]

    /// Whatever the source returns, including rows below the committed
    /// watermark, the committed watermark never moves backwards.
    #[test]
    fn watermark_never_decreases(
        batches in prop::collection::vec(prop::collection::vec(-1_000i64..1_000, 0..8), 1..8)
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let h = Harness::new();
            let job = h.running_job("shop", Some("id")).await;
            let mut previous: Option<Watermark> = None;

            for batch in &batches {
                h.source.set_rows("shop", batch);
                h.clock.advance_secs(1);
                h.engine.poll_once().await.unwrap();

                let current = h.watermark(job.id).await;
                if let (Some(prev), Some(cur)) = (&previous, &current) {
                    prop_assert!(cur >= prev, "watermark regressed from {} to {}", prev, cur);
                }
                if previous.is_some() {
                    prop_assert!(current.is_some());
                }
                previous = current;
            }
            Ok(())
        })?;
    }
}
