use bytes::Bytes;
use chrono::Utc;
use replog::{
    DirectorStartError, DirectorState, ExportedRecord, Exporter, ExporterController, ExporterDescriptor,
    ExporterDirector, ExporterDirectorContext, ExporterDirectorOptions, ExporterError, ExportersState,
    InMemoryLogStream, LogStream, LoggedEvent, Member, RaftRole, RecordMetadata, Replica, ReplicaConfig,
    SkipPositionsFilter, StateSnapshotController, ValueType, VolatileLocalState,
};
use std::collections::HashMap;
use std::error::Error;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration, Instant};

#[tokio::test]
async fn exports_existing_log_to_new_exporter() -> Result<(), Box<dyn Error>> {
    // -- setup --
    let dir = tempfile::tempdir()?;
    let log = InMemoryLogStream::shared(1);
    append_jobs(&log, 3);
    commit_all(&log);
    let recorder = Recorder::default();

    // -- execute --
    let director = ExporterDirector::start(
        context(&log, dir.path()).with_exporter(recorder.descriptor("elastic", HashMap::new())),
    )?;
    wait_until(|| recorder.exported_positions().len() == 3, "all records exported").await;

    // -- verify --
    assert_eq!(recorder.exported_positions(), vec![1, 2, 3]);
    assert_eq!(director.last_exported_position().await?, 3);
    assert_eq!(director.state().await?, DirectorState::Running);
    assert_eq!(director.metrics().exported_events(), 3);

    director.close().await?;
    assert!(recorder.is_closed());
    Ok(())
}

#[tokio::test]
async fn failed_export_is_retried_before_moving_on() -> Result<(), Box<dyn Error>> {
    // -- setup --
    let dir = tempfile::tempdir()?;
    let log = InMemoryLogStream::shared(1);
    append_jobs(&log, 7);
    commit_all(&log);
    let recorder = Recorder::default();
    let mut failures = HashMap::new();
    failures.insert(5, 2);

    // -- execute --
    let director = ExporterDirector::start(
        context(&log, dir.path()).with_exporter(recorder.descriptor("flaky", failures)),
    )?;
    wait_until(|| recorder.exported_positions().len() == 7, "all records exported").await;

    // -- verify --
    assert_eq!(recorder.attempted_positions(), vec![1, 2, 3, 4, 5, 5, 5, 6, 7]);
    assert_eq!(recorder.exported_positions(), vec![1, 2, 3, 4, 5, 6, 7]);
    assert_eq!(director.metrics().failed_exports(), 2);
    assert_eq!(director.last_exported_position().await?, 7);

    director.close().await?;
    Ok(())
}

#[tokio::test]
async fn restart_re_exports_in_flight_record_and_prunes_removed_exporter() -> Result<(), Box<dyn Error>> {
    // -- setup --
    let dir = tempfile::tempdir()?;
    let log = InMemoryLogStream::shared(1);
    append_jobs(&log, 3);
    commit_all(&log);

    // -- execute & verify --

    // 1. "a" keeps failing on position 2. Close while its retry is pending.
    let first_a = Recorder::default();
    let b = Recorder::default();
    let mut failures = HashMap::new();
    failures.insert(2, usize::MAX);
    let director = ExporterDirector::start(
        context(&log, dir.path())
            .with_exporter(first_a.descriptor("a", failures))
            .with_exporter(b.descriptor("b", HashMap::new())),
    )?;
    wait_until(
        || first_a.attempted_positions().iter().filter(|p| **p == 2).count() >= 2,
        "export of position 2 retried",
    )
    .await;
    assert_eq!(director.last_exported_position().await?, 1);
    assert_eq!(director.state().await?, DirectorState::Exporting);
    director.close().await?;

    assert_eq!(first_a.exported_positions(), vec![1]);
    assert_eq!(b.exported_positions(), vec![1]);
    assert!(first_a.is_closed());

    // 2. Restart without "b". "a" gets position 2 again.
    let second_a = Recorder::default();
    let director = ExporterDirector::start(
        context(&log, dir.path()).with_exporter(second_a.descriptor("a", HashMap::new())),
    )?;
    wait_until(|| second_a.exported_positions().len() == 2, "remaining records exported").await;
    assert_eq!(second_a.exported_positions(), vec![2, 3]);
    director.close().await?;

    // 3. Only "a" is left in the persisted positions.
    let snapshots = StateSnapshotController::new(
        replog::discard_logger(),
        dir.path().join("runtime"),
        dir.path().join("snapshots"),
        3,
    );
    snapshots.recover()?;
    let positions = ExportersState::new(snapshots.open_store()?);
    assert_eq!(positions.exporter_ids()?, vec!["a".to_string()]);
    assert_eq!(positions.get("a")?, 3);

    Ok(())
}

#[tokio::test]
async fn resumes_after_lowest_exporter_position() -> Result<(), Box<dyn Error>> {
    // -- setup --
    let dir = tempfile::tempdir()?;
    write_positions(dir.path(), &[("a", 10), ("b", 25), ("c", 5)])?;
    let log = InMemoryLogStream::shared(1);
    append_jobs(&log, 30);
    commit_all(&log);
    let (a, b, c) = (Recorder::default(), Recorder::default(), Recorder::default());

    // -- execute --
    let director = ExporterDirector::start(
        context(&log, dir.path())
            .with_exporter(a.descriptor("a", HashMap::new()))
            .with_exporter(b.descriptor("b", HashMap::new()))
            .with_exporter(c.descriptor("c", HashMap::new())),
    )?;
    wait_until(|| director.metrics().last_exported_position() == 30, "log exported").await;

    // -- verify --
    assert_eq!(c.exported_positions(), (6..=30).collect::<Vec<_>>());
    assert_eq!(a.exported_positions(), (11..=30).collect::<Vec<_>>());
    assert_eq!(b.exported_positions(), (26..=30).collect::<Vec<_>>());
    // Records 6 to 30 each went through the exporters, even if some had nothing to do.
    assert_eq!(director.metrics().exported_events(), 25);

    director.close().await?;
    Ok(())
}

#[tokio::test]
async fn start_fails_when_log_lacks_resume_position() -> Result<(), Box<dyn Error>> {
    // -- setup --
    let dir = tempfile::tempdir()?;
    write_positions(dir.path(), &[("a", 10)])?;
    let log = InMemoryLogStream::shared(1);
    append_jobs(&log, 5);
    commit_all(&log);
    let a = Recorder::default();

    // -- execute --
    let result = ExporterDirector::start(context(&log, dir.path()).with_exporter(a.descriptor("a", HashMap::new())));

    // -- verify --
    match result {
        Err(DirectorStartError::LogPositionNotFound { position }) => assert_eq!(position, 10),
        Err(e) => panic!("Unexpected error: {}", e),
        Ok(_) => panic!("Director started on a log missing position 10"),
    }
    assert!(a.exported_positions().is_empty());
    Ok(())
}

#[tokio::test]
async fn skipped_records_advance_positions() -> Result<(), Box<dyn Error>> {
    // -- setup --
    let dir = tempfile::tempdir()?;
    let log = InMemoryLogStream::shared(1);
    append_event(&log, ValueType::Job);
    // No mapping for NOOP entries.
    append_event(&log, ValueType::Noop);
    append_event(&log, ValueType::Job);
    append_event(&log, ValueType::Job);
    commit_all(&log);
    let recorder = Recorder::default();

    // -- execute --
    let director = ExporterDirector::start(
        context(&log, dir.path())
            .with_exporter(recorder.descriptor("elastic", HashMap::new()))
            .with_event_filter(SkipPositionsFilter::new(vec![3])),
    )?;
    wait_until(|| director.metrics().last_exported_position() == 4, "log exported").await;

    // -- verify --
    assert_eq!(recorder.exported_positions(), vec![1, 4]);
    assert_eq!(director.metrics().skipped_events(), 2);
    assert_eq!(director.metrics().exported_events(), 2);
    director.close().await?;

    let snapshots = StateSnapshotController::new(
        replog::discard_logger(),
        dir.path().join("runtime"),
        dir.path().join("snapshots"),
        3,
    );
    assert_eq!(snapshots.recover()?, Some(4));
    let positions = ExportersState::new(snapshots.open_store()?);
    assert_eq!(positions.get("elastic")?, 4);
    Ok(())
}

#[tokio::test]
async fn pause_holds_back_new_commits() -> Result<(), Box<dyn Error>> {
    // -- setup --
    let dir = tempfile::tempdir()?;
    let log = InMemoryLogStream::shared(1);
    let recorder = Recorder::default();
    let director = ExporterDirector::start(
        context(&log, dir.path()).with_exporter(recorder.descriptor("elastic", HashMap::new())),
    )?;

    // -- execute & verify --

    // 1. Commits wake the director up.
    append_jobs(&log, 2);
    commit_all(&log);
    wait_until(|| recorder.exported_positions().len() == 2, "first commit exported").await;

    // 2. Nothing goes out while paused.
    director.pause_exporting()?;
    assert_eq!(director.state().await?, DirectorState::Paused);
    append_jobs(&log, 2);
    commit_all(&log);
    sleep(Duration::from_millis(100)).await;
    assert_eq!(recorder.exported_positions(), vec![1, 2]);

    // 3. Resuming catches up.
    director.resume_exporting()?;
    wait_until(|| recorder.exported_positions().len() == 4, "paused records exported").await;
    assert_eq!(director.state().await?, DirectorState::Running);

    director.close().await?;
    Ok(())
}

#[tokio::test]
async fn exporter_acknowledges_and_schedules_through_controller() -> Result<(), Box<dyn Error>> {
    // -- setup --
    let dir = tempfile::tempdir()?;
    let log = InMemoryLogStream::shared(1);
    append_jobs(&log, 3);
    // Nothing committed, so nothing gets exported.
    let (tx, mut rx) = mpsc::unbounded_channel();
    let descriptor = ExporterDescriptor::new("scheduling", serde_json::Value::Null, move || {
        Box::new(SchedulingExporter { tasks: tx.clone() })
    });

    // -- execute --
    let director = ExporterDirector::start(context(&log, dir.path()).with_exporter(descriptor))?;

    // -- verify --
    let fired = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await?;
    assert_eq!(fired, Some("acknowledge"));
    // The cancelled task never fires.
    assert!(tokio::time::timeout(Duration::from_millis(200), rx.recv()).await.is_err());
    assert_eq!(director.last_exported_position().await?, -1);

    director.close().await?;

    let snapshots = StateSnapshotController::new(
        replog::discard_logger(),
        dir.path().join("runtime"),
        dir.path().join("snapshots"),
        3,
    );
    snapshots.recover()?;
    let positions = ExportersState::new(snapshots.open_store()?);
    assert_eq!(positions.get("scheduling")?, 2);
    Ok(())
}

#[tokio::test]
async fn replicated_entries_are_exported_once_committed() -> Result<(), Box<dyn Error>> {
    // -- setup --
    let dir = tempfile::tempdir()?;
    let log = InMemoryLogStream::shared(1);
    let me = Member::new("localhost", 26501, 1);
    let mut replica = Replica::new(ReplicaConfig {
        logger: replog::discard_logger(),
        topic_name: "orders".to_string(),
        local_member: me.clone(),
        members: vec![me.clone()],
        log_stream: log.clone(),
        local_state: VolatileLocalState::new(me),
    });
    let recorder = Recorder::default();
    let director = ExporterDirector::start(
        context(&log, dir.path()).with_exporter(recorder.descriptor("elastic", HashMap::new())),
    )?;

    // -- execute --
    replica.start_election()?;
    assert_eq!(replica.role(), RaftRole::Leader);
    for _ in 0..2 {
        replica.append_entry(job_event())?;
    }
    wait_until(|| recorder.exported_positions().len() == 3, "committed entries exported").await;

    // -- verify --
    let value_types: Vec<_> = recorder.records().iter().map(|r| r.value_type).collect();
    assert_eq!(value_types, vec![ValueType::Raft, ValueType::Job, ValueType::Job]);
    assert!(recorder.records().iter().all(|r| r.raft_term == 1 && r.partition_id == 1));

    director.close().await?;
    Ok(())
}

#[tokio::test]
async fn unmappable_record_blocks_until_closed() -> Result<(), Box<dyn Error>> {
    // -- setup --
    let dir = tempfile::tempdir()?;
    let log = InMemoryLogStream::shared(1);
    append_jobs(&log, 1);
    append_raw(&log, ValueType::Job, b"not json");
    append_jobs(&log, 1);
    commit_all(&log);
    let recorder = Recorder::default();

    // -- execute --
    let director = ExporterDirector::start(
        context(&log, dir.path()).with_exporter(recorder.descriptor("elastic", HashMap::new())),
    )?;
    wait_until(|| recorder.exported_positions().len() == 1, "first record exported").await;
    // Plenty of wrap retries at 5ms each.
    sleep(Duration::from_millis(100)).await;

    // -- verify --
    assert_eq!(recorder.exported_positions(), vec![1]);
    assert_eq!(director.last_exported_position().await?, 1);
    assert_eq!(director.state().await?, DirectorState::Exporting);
    assert_eq!(director.metrics().skipped_events(), 0);

    tokio::time::timeout(Duration::from_secs(5), director.close()).await??;
    sleep(Duration::from_millis(50)).await;
    assert_eq!(recorder.exported_positions(), vec![1]);

    // The bad record was not skipped: it is still the one to resume at.
    let snapshots = StateSnapshotController::new(
        replog::discard_logger(),
        dir.path().join("runtime"),
        dir.path().join("snapshots"),
        3,
    );
    assert_eq!(snapshots.recover()?, Some(1));
    let positions = ExportersState::new(snapshots.open_store()?);
    assert_eq!(positions.get("elastic")?, 1);
    Ok(())
}

#[tokio::test]
async fn failing_close_does_not_stop_others_or_final_snapshot() -> Result<(), Box<dyn Error>> {
    // -- setup --
    let dir = tempfile::tempdir()?;
    let log = InMemoryLogStream::shared(1);
    append_jobs(&log, 2);
    commit_all(&log);
    let (a, b) = (Recorder::default(), Recorder::default());
    let director = ExporterDirector::start(
        context(&log, dir.path())
            .with_exporter(a.faulty_descriptor(
                "a",
                Faults {
                    close: true,
                    ..Faults::default()
                },
            ))
            .with_exporter(b.descriptor("b", HashMap::new())),
    )?;
    wait_until(|| b.exported_positions().len() == 2, "records exported").await;

    // -- execute --
    director.close().await?;

    // -- verify --
    assert!(a.is_closed());
    assert!(b.is_closed());

    let snapshots = StateSnapshotController::new(
        replog::discard_logger(),
        dir.path().join("runtime"),
        dir.path().join("snapshots"),
        3,
    );
    assert_eq!(snapshots.recover()?, Some(2));
    let positions = ExportersState::new(snapshots.open_store()?);
    assert_eq!(positions.get("a")?, 2);
    assert_eq!(positions.get("b")?, 2);
    Ok(())
}

#[tokio::test]
async fn nothing_is_exported_before_every_exporter_opened() -> Result<(), Box<dyn Error>> {
    // -- setup --
    let dir = tempfile::tempdir()?;
    let log = InMemoryLogStream::shared(1);
    append_jobs(&log, 2);
    commit_all(&log);
    let (a, b) = (Recorder::default(), Recorder::default());

    // -- execute --
    let director = ExporterDirector::start(
        context(&log, dir.path())
            .with_exporter(a.descriptor("a", HashMap::new()))
            .with_exporter(b.faulty_descriptor(
                "b",
                Faults {
                    open: 3,
                    ..Faults::default()
                },
            )),
    )?;
    wait_until(|| b.exported_positions().len() == 2, "records exported").await;

    // -- verify --
    assert_eq!(
        b.journal(),
        vec!["open failed", "open failed", "open failed", "opened", "exported 1", "exported 2"]
    );
    // "a" opened once and waited for "b" before seeing any record.
    assert_eq!(a.journal(), vec!["opened", "exported 1", "exported 2"]);
    assert_eq!(director.state().await?, DirectorState::Running);

    director.close().await?;
    Ok(())
}

#[tokio::test]
async fn retry_skips_exporters_that_already_exported_the_record() -> Result<(), Box<dyn Error>> {
    // -- setup --
    let dir = tempfile::tempdir()?;
    let log = InMemoryLogStream::shared(1);
    append_jobs(&log, 3);
    commit_all(&log);
    let (a, b) = (Recorder::default(), Recorder::default());
    let mut failures = HashMap::new();
    failures.insert(2, 1);

    // -- execute --
    let director = ExporterDirector::start(
        context(&log, dir.path())
            .with_exporter(a.descriptor("a", HashMap::new()))
            .with_exporter(b.descriptor("b", failures)),
    )?;
    wait_until(|| b.exported_positions().len() == 3, "records exported").await;

    // -- verify --
    assert_eq!(a.attempted_positions(), vec![1, 2, 3]);
    assert_eq!(b.attempted_positions(), vec![1, 2, 2, 3]);
    assert_eq!(a.exported_positions(), vec![1, 2, 3]);
    assert_eq!(director.metrics().failed_exports(), 1);

    director.close().await?;
    Ok(())
}

// -- test exporters --

#[derive(Clone, Default)]
struct Recorder {
    records: Arc<Mutex<Vec<ExportedRecord>>>,
    attempts: Arc<Mutex<Vec<i64>>>,
    journal: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

/// How a recording exporter misbehaves.
#[derive(Default)]
struct Faults {
    /// Times `export` fails on a position before it succeeds.
    export: HashMap<i64, usize>,
    /// Times `open` fails before it succeeds.
    open: usize,
    close: bool,
}

impl Recorder {
    fn descriptor(&self, id: &str, export_failures: HashMap<i64, usize>) -> ExporterDescriptor {
        self.faulty_descriptor(
            id,
            Faults {
                export: export_failures,
                ..Faults::default()
            },
        )
    }

    fn faulty_descriptor(&self, id: &str, faults: Faults) -> ExporterDescriptor {
        let recorder = self.clone();
        let faults = Arc::new(Mutex::new(faults));
        ExporterDescriptor::new(id, serde_json::Value::Null, move || {
            Box::new(RecordingExporter {
                recorder: recorder.clone(),
                faults: faults.clone(),
            })
        })
    }

    fn records(&self) -> Vec<ExportedRecord> {
        self.records.lock().unwrap().clone()
    }

    fn exported_positions(&self) -> Vec<i64> {
        self.records.lock().unwrap().iter().map(|r| r.position).collect()
    }

    fn attempted_positions(&self) -> Vec<i64> {
        self.attempts.lock().unwrap().clone()
    }

    /// Open, export and close calls in the order the exporter saw them.
    fn journal(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn note(&self, entry: String) {
        self.journal.lock().unwrap().push(entry);
    }
}

struct RecordingExporter {
    recorder: Recorder,
    faults: Arc<Mutex<Faults>>,
}

impl Exporter for RecordingExporter {
    fn open(&mut self, _controller: ExporterController) -> Result<(), ExporterError> {
        let mut faults = self.faults.lock().unwrap();
        if faults.open > 0 {
            faults.open -= 1;
            self.recorder.note("open failed".to_string());
            return Err(ExporterError::failed("not ready yet"));
        }

        self.recorder.note("opened".to_string());
        Ok(())
    }

    fn export(&mut self, record: &ExportedRecord) -> Result<(), ExporterError> {
        self.recorder.attempts.lock().unwrap().push(record.position);
        if let Some(remaining) = self.faults.lock().unwrap().export.get_mut(&record.position) {
            if *remaining > 0 {
                *remaining -= 1;
                self.recorder.note(format!("export {} failed", record.position));
                return Err(ExporterError::failed(format!("refusing position {}", record.position)));
            }
        }

        self.recorder.note(format!("exported {}", record.position));
        self.recorder.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    fn close(&mut self) -> Result<(), ExporterError> {
        self.recorder.closed.store(true, Ordering::Release);
        if self.faults.lock().unwrap().close {
            return Err(ExporterError::failed("connection already gone"));
        }
        Ok(())
    }
}

struct SchedulingExporter {
    tasks: mpsc::UnboundedSender<&'static str>,
}

impl Exporter for SchedulingExporter {
    fn open(&mut self, controller: ExporterController) -> Result<(), ExporterError> {
        let cancelled = self.tasks.clone();
        controller
            .schedule_delayed_task(Duration::from_millis(50), move || {
                let _ = cancelled.send("cancelled");
            })
            .cancel();

        let acknowledging = controller.clone();
        let tasks = self.tasks.clone();
        let _acknowledge = controller.schedule_delayed_task(Duration::from_millis(10), move || {
            acknowledging.update_last_exported_position(2);
            let _ = tasks.send("acknowledge");
        });
        Ok(())
    }

    fn export(&mut self, _record: &ExportedRecord) -> Result<(), ExporterError> {
        Ok(())
    }
}

// -- helpers --

fn context(log: &Arc<dyn LogStream>, data_dir: &Path) -> ExporterDirectorContext {
    ExporterDirectorContext::new(replog::discard_logger(), log.clone(), data_dir).with_options(ExporterDirectorOptions {
        export_retry_initial_delay: Some(Duration::from_millis(5)),
        export_retry_max_delay: Some(Duration::from_millis(20)),
        wrap_retry_delay: Some(Duration::from_millis(5)),
        open_retry_initial_delay: Some(Duration::from_millis(5)),
        open_retry_max_delay: Some(Duration::from_millis(20)),
        ..ExporterDirectorOptions::default()
    })
}

fn job_event() -> LoggedEvent {
    LoggedEvent::new(
        RecordMetadata::event(ValueType::Job, 0),
        Bytes::from_static(br#"{"type":"payment","retries":3}"#),
    )
    .with_timestamp(Utc::now().timestamp_millis())
}

fn append_event(log: &Arc<dyn LogStream>, value_type: ValueType) {
    append_raw(log, value_type, b"{}");
}

fn append_raw(log: &Arc<dyn LogStream>, value_type: ValueType, value: &'static [u8]) {
    let mut event = LoggedEvent::new(RecordMetadata::event(value_type, 0), value)
        .with_timestamp(Utc::now().timestamp_millis());
    event.position = log.next_position();
    event.raft_term = 1;
    log.append(event).unwrap();
}

fn append_jobs(log: &Arc<dyn LogStream>, count: usize) {
    for _ in 0..count {
        let mut event = job_event();
        event.position = log.next_position();
        event.raft_term = 1;
        log.append(event).unwrap();
    }
}

fn commit_all(log: &Arc<dyn LogStream>) {
    log.set_commit_position(log.next_position() - 1);
}

fn write_positions(data_dir: &Path, positions: &[(&str, i64)]) -> Result<(), Box<dyn Error>> {
    let snapshots = StateSnapshotController::new(
        replog::discard_logger(),
        data_dir.join("runtime"),
        data_dir.join("snapshots"),
        3,
    );
    snapshots.recover()?;
    let state = ExportersState::new(snapshots.open_store()?);
    for (id, position) in positions {
        state.set(id, *position)?;
    }
    snapshots.take_snapshot(positions.iter().map(|(_, p)| *p).max().unwrap_or(-1))?;
    snapshots.close();
    Ok(())
}

async fn wait_until<F: Fn() -> bool>(condition: F, what: &str) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        if Instant::now() > deadline {
            panic!("Timed out waiting for {}", what);
        }
        sleep(Duration::from_millis(10)).await;
    }
}
