//! # Sync Orchestrator
//!
//! ## Lifecycle
//! - `Idle -> Running` via `start` (fresh run) or `resume` (saved checkpoint)
//! - `Running -> Paused` when the loop observes a pause signal; progress is saved
//!   (or when a checkpoint error aborts the loop; progress is then kept in memory)
//! - `Paused -> Running` via `resume`, optionally against a different target table
//! - `* -> Stopped` via `stop` or a stop signal; saved progress is discarded
//! - `start` from `Paused` discards the paused progress and begins a new run
//!
//! ## Row cycle
//! read identifier -> normalize -> fetch -> pace -> reconcile -> pace -> advance.
//! Row failures are counted and logged, never retried within the run.

use std::{sync::Arc, time::Duration};

use log::{error, info, warn};
use tokio::{sync::watch, time::sleep};

use crate::{
    common::errors::{Result, SyncError, ValidationError},
    domain::synchronization::{
        checkpoint::CheckpointStore,
        history_fetcher::HistoryFetcher,
        identifier::{is_well_formed, normalize},
        sync_progress::SyncProgress,
        table_store::{find_field, FieldId, TableStore},
        value_objects::{
            sample::{HistoryQuery, Sample, TimeWindow},
            sync_config::SyncConfig,
        },
    },
};

use super::{
    control::{ControlSignal, SyncControl},
    reconciler::Reconciler,
    SyncState,
};

/// Everything a run needs, owned by the orchestrator.
pub struct SyncContext {
    pub source: Arc<dyn TableStore>,
    pub target: Arc<dyn TableStore>,
    pub fetcher: Arc<dyn HistoryFetcher>,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub config: SyncConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every row was visited. The state stays `Running` until `stop`.
    Completed { success: usize, fail: usize },
    Paused,
    Stopped,
    /// `start` or `resume` was called while a run is active; nothing happened.
    AlreadyRunning,
}

pub struct SyncOrchestrator {
    context: SyncContext,
    reconciler: Reconciler,
    control: SyncControl,
    state: SyncState,
    progress: SyncProgress,
    progress_tx: watch::Sender<SyncProgress>,
}

/// Per-run values resolved once before entering the loop.
struct RunSetup {
    window: TimeWindow,
    source_field: FieldId,
}

impl SyncOrchestrator {
    pub fn new(context: SyncContext) -> Self {
        Self::with_control(context, SyncControl::new())
    }

    pub fn with_control(context: SyncContext, control: SyncControl) -> Self {
        let (progress_tx, _) = watch::channel(SyncProgress::default());
        Self {
            reconciler: Reconciler::new(&context.config),
            context,
            control,
            state: SyncState::Idle,
            progress: SyncProgress::default(),
            progress_tx,
        }
    }

    pub fn control(&self) -> SyncControl {
        self.control.clone()
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn progress(&self) -> &SyncProgress {
        &self.progress
    }

    /// Read-only progress snapshots, published after every change.
    pub fn subscribe(&self) -> watch::Receiver<SyncProgress> {
        self.progress_tx.subscribe()
    }

    /// Begins a brand-new run over a fresh snapshot of the source rows.
    pub async fn start(&mut self) -> Result<RunOutcome> {
        if self.state == SyncState::Running {
            info!("A sync run is already active, ignoring start");
            return Ok(RunOutcome::AlreadyRunning);
        }
        if self.state == SyncState::Paused {
            warn!(
                "Discarding paused progress at {}/{}, starting over",
                self.progress.current_index, self.progress.total
            );
        }
        let setup = self.prepare().await?;
        let row_ids = self.context.source.list_row_ids().await?;

        self.context.checkpoints.clear().await?;
        self.progress = SyncProgress::with_snapshot(row_ids);
        self.control.reset();
        self.state = SyncState::Running;
        self.publish();
        self.log_run_start(&setup).await;

        self.drive(&setup).await
    }

    /// Continues a paused or interrupted run. A `new_target` different from the
    /// current one is connected and provisioned before the loop resumes.
    pub async fn resume(&mut self, new_target: Option<Arc<dyn TableStore>>) -> Result<RunOutcome> {
        match self.state {
            SyncState::Running => {
                info!("A sync run is already active, ignoring resume");
                return Ok(RunOutcome::AlreadyRunning);
            }
            SyncState::Stopped => return Err(SyncError::NothingToResume),
            SyncState::Idle | SyncState::Paused => {}
        }
        let setup = self.prepare().await?;

        let restored = match self.context.checkpoints.load().await? {
            Some(saved) => saved,
            None if self.state == SyncState::Paused => self.progress.clone().sanitized(),
            None => return Err(SyncError::NothingToResume),
        };

        if let Some(target) = new_target {
            if target.store_id() != self.context.target.store_id() {
                info!("Target table changed, connecting {}", target.store_id());
                if let Err(e) = self.reconciler.provision(target.as_ref()).await {
                    error!("Could not prepare the new target table: {}", e);
                    self.progress = restored;
                    self.state = SyncState::Paused;
                    self.publish();
                    return Err(SyncError::Reconnect(e));
                }
                self.context.target = target;
            }
        }

        self.progress = restored;
        self.control.reset();
        self.state = SyncState::Running;
        self.publish();
        info!(
            "Resuming from record {}, {} remaining",
            self.progress.current_index + 1,
            self.progress.remaining()
        );

        self.drive(&setup).await
    }

    /// Hard reset: saved progress is discarded and a later `start` begins from scratch.
    /// To stop a loop that is currently running, use `control().stop()`.
    pub async fn stop(&mut self) -> Result<RunOutcome> {
        self.control.stop();
        self.halt().await
    }

    async fn prepare(&self) -> Result<RunSetup> {
        let window = self.context.config.window()?;
        let field_name = self.context.config.source_field();
        let fields = self.context.source.list_fields().await?;
        let source_field = find_field(&fields, field_name)
            .map(|f| f.id.clone())
            .ok_or_else(|| ValidationError::MissingSourceField(field_name.clone()))?;
        Ok(RunSetup {
            window,
            source_field,
        })
    }

    async fn log_run_start(&self, setup: &RunSetup) {
        let config = &self.context.config;
        let source = self
            .context
            .source
            .name()
            .await
            .unwrap_or_else(|_| self.context.source.store_id());
        let target = self
            .context
            .target
            .name()
            .await
            .unwrap_or_else(|_| self.context.target.store_id());
        info!(
            "Starting sync of {} record(s) from '{}' into '{}', window {}..{}, interval {}s, aggregation {}",
            self.progress.total,
            source,
            target,
            setup.window.start(),
            setup.window.end(),
            config.interval_seconds(),
            config.aggregation()
        );
    }

    /// Runs the loop. An error that aborts it leaves the run `Paused` with the
    /// in-memory progress, so `resume` can pick it up again.
    async fn drive(&mut self, setup: &RunSetup) -> Result<RunOutcome> {
        let outcome = self.run_loop(setup).await;
        if let Err(e) = &outcome {
            if self.state == SyncState::Running {
                error!(
                    "Sync interrupted at {}/{}: {}",
                    self.progress.current_index, self.progress.total, e
                );
                self.progress.clear_in_flight();
                self.state = SyncState::Paused;
                self.publish();
            }
        }
        outcome
    }

    async fn run_loop(&mut self, setup: &RunSetup) -> Result<RunOutcome> {
        let fetch_pacing = *self.context.config.fetch_pacing();
        let write_pacing = *self.context.config.write_pacing();

        while self.progress.current_index < self.progress.total {
            match self.control.signal() {
                ControlSignal::Pause => return self.enter_paused().await,
                ControlSignal::Stop => return self.halt().await,
                ControlSignal::Run => {}
            }

            let i = self.progress.current_index;
            let total = self.progress.total;
            let row_id = self.progress.record_id_list[i].clone();

            let cell = match self.context.source.read_cell(&setup.source_field, &row_id).await {
                Ok(cell) => cell,
                Err(e) => {
                    error!("record {}/{}: reading source row {} failed: {}", i + 1, total, row_id, e);
                    self.progress.fail_count += 1;
                    pace(write_pacing).await;
                    self.advance(i).await?;
                    continue;
                }
            };

            let Some(point_id) = normalize(&cell) else {
                info!("record {}/{}: empty point, skipped", i + 1, total);
                self.progress.current_index = i + 1;
                self.progress.clear_in_flight();
                self.publish();
                continue;
            };
            if !is_well_formed(&point_id) {
                warn!("record {}/{}: '{}' does not look like a point id", i + 1, total, point_id);
            }

            self.progress.current_point_id = Some(point_id.clone());
            self.progress.is_writing = false;
            self.publish();
            info!("record {}/{}: querying {}", i + 1, total, point_id);

            let fetched = self.fetch(&point_id, &setup.window).await;
            pace(fetch_pacing).await;
            let samples = match fetched {
                Ok(samples) => samples,
                Err(e) => {
                    error!("record {}/{}: {} failed: {}", i + 1, total, point_id, e);
                    self.progress.fail_count += 1;
                    self.progress.clear_in_flight();
                    pace(write_pacing).await;
                    self.advance(i).await?;
                    continue;
                }
            };

            let paused_before_write = self.control.is_paused();
            self.progress.is_writing = true;
            self.publish();
            let result = self
                .reconciler
                .reconcile(self.context.target.as_ref(), &point_id, &samples)
                .await;

            if !paused_before_write && self.control.is_paused() {
                warn!(
                    "record {}/{}: paused while writing {}, it will be replayed on resume",
                    i + 1,
                    total,
                    point_id
                );
                self.progress.current_index = i;
                return self.enter_paused().await;
            }

            self.progress.clear_in_flight();
            match result {
                Ok(_) => {
                    pace(write_pacing).await;
                    self.progress.success_count += 1;
                    info!("record {}/{}: {} done", i + 1, total, point_id);
                }
                Err(e) => {
                    self.progress.fail_count += 1;
                    error!("record {}/{}: {} failed: {}", i + 1, total, point_id, e);
                    pace(write_pacing).await;
                }
            }
            self.advance(i).await?;
        }

        info!(
            "Sync complete. Success: {}, failed: {}",
            self.progress.success_count, self.progress.fail_count
        );
        self.progress.clear_in_flight();
        self.context.checkpoints.clear().await?;
        self.publish();
        Ok(RunOutcome::Completed {
            success: self.progress.success_count,
            fail: self.progress.fail_count,
        })
    }

    async fn fetch(&self, point_id: &str, window: &TimeWindow) -> Result<Vec<Sample>> {
        let config = &self.context.config;
        let query = HistoryQuery::new(
            vec![point_id.to_string()],
            *window,
            config.interval_seconds().clone(),
            *config.aggregation(),
        )?;
        let mut batch = self.context.fetcher.fetch(&query).await?;
        Ok(batch.remove(point_id).unwrap_or_default())
    }

    async fn advance(&mut self, i: usize) -> Result<()> {
        self.progress.current_index = i + 1;
        self.publish();
        if self.progress.current_index % *self.context.config.checkpoint_every() == 0 {
            self.save_checkpoint().await?;
        }
        Ok(())
    }

    async fn save_checkpoint(&mut self) -> Result<()> {
        self.progress.touch();
        self.context.checkpoints.save(&self.progress).await?;
        info!(
            "Progress saved at {}/{}",
            self.progress.current_index, self.progress.total
        );
        Ok(())
    }

    async fn enter_paused(&mut self) -> Result<RunOutcome> {
        self.progress.clear_in_flight();
        self.state = SyncState::Paused;
        self.save_checkpoint().await?;
        self.publish();
        warn!(
            "Sync paused at {}/{}",
            self.progress.current_index, self.progress.total
        );
        Ok(RunOutcome::Paused)
    }

    async fn halt(&mut self) -> Result<RunOutcome> {
        self.context.checkpoints.clear().await?;
        self.progress = SyncProgress::default();
        self.state = SyncState::Stopped;
        self.publish();
        warn!("Sync stopped, saved progress cleared");
        Ok(RunOutcome::Stopped)
    }

    fn publish(&self) {
        self.progress_tx.send_replace(self.progress.clone());
    }
}

async fn pace(delay: Duration) {
    if !delay.is_zero() {
        sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use async_trait::async_trait;
    use crate::{
        common::errors::{CheckpointError, TransportError},
        domain::synchronization::{
            history_fetcher::MockHistoryFetcher,
            value_objects::cell_value::CellValue,
        },
        infrastructure::{checkpoint::MemoryCheckpointStore, table::MemoryTableStore},
    };

    const START: i64 = 1_700_000_000_000;
    const END: i64 = 1_700_007_200_000;

    async fn source_with(points: &[CellValue]) -> Arc<MemoryTableStore> {
        let source = MemoryTableStore::new("points");
        for point in points {
            source.insert_named(vec![("point", point.clone())]).await;
        }
        Arc::new(source)
    }

    fn context(
        source: Arc<MemoryTableStore>,
        target: Arc<MemoryTableStore>,
        fetcher: MockHistoryFetcher,
        checkpoints: Arc<MemoryCheckpointStore>,
    ) -> SyncContext {
        SyncContext {
            source,
            target,
            fetcher: Arc::new(fetcher),
            checkpoints,
            config: SyncConfig::new()
                .with_window(START, END)
                .with_utc_offset_minutes(Some(0))
                .without_pacing(),
        }
    }

    fn echo_fetcher() -> MockHistoryFetcher {
        let mut fetcher = MockHistoryFetcher::new();
        fetcher.expect_fetch().returning(|query| {
            Ok(query
                .identifiers()
                .iter()
                .map(|id| (id.clone(), vec![Sample::new(START, "1.5")]))
                .collect())
        });
        fetcher
    }

    #[tokio::test]
    async fn it_should_skip_empty_identifiers_without_counting() {
        let source = source_with(&[CellValue::Empty, "  ".into(), "1.1".into()]).await;
        let target = Arc::new(MemoryTableStore::new("history"));
        let mut orchestrator = SyncOrchestrator::new(context(
            source,
            target.clone(),
            echo_fetcher(),
            Arc::new(MemoryCheckpointStore::new()),
        ));

        let outcome = orchestrator.start().await.unwrap();
        assert_eq!(outcome, RunOutcome::Completed { success: 1, fail: 0 });
        assert_eq!(orchestrator.progress().current_index, 3);
        assert_eq!(target.rows_by_name().await.len(), 1);
    }

    #[tokio::test]
    async fn it_should_count_transport_failures_and_continue() {
        let source = source_with(&["1.1".into(), "2.2".into()]).await;
        let mut fetcher = MockHistoryFetcher::new();
        fetcher
            .expect_fetch()
            .withf(|q| q.identifiers()[0] == "1.1")
            .returning(|_| Err(TransportError::Timeout));
        fetcher
            .expect_fetch()
            .withf(|q| q.identifiers()[0] == "2.2")
            .returning(|_| Ok(HashMap::from([("2.2".to_string(), vec![Sample::new(START, 3i64)])])));
        let mut orchestrator = SyncOrchestrator::new(context(
            source,
            Arc::new(MemoryTableStore::new("history")),
            fetcher,
            Arc::new(MemoryCheckpointStore::new()),
        ));

        let outcome = orchestrator.start().await.unwrap();
        assert_eq!(outcome, RunOutcome::Completed { success: 1, fail: 1 });
    }

    #[tokio::test]
    async fn it_should_abort_before_any_fetch_without_a_window() {
        let source = source_with(&["1.1".into()]).await;
        let mut fetcher = MockHistoryFetcher::new();
        fetcher.expect_fetch().never();
        let mut ctx = context(
            source,
            Arc::new(MemoryTableStore::new("history")),
            fetcher,
            Arc::new(MemoryCheckpointStore::new()),
        );
        ctx.config = SyncConfig::new().without_pacing();
        let mut orchestrator = SyncOrchestrator::new(ctx);

        let err = orchestrator.start().await.unwrap_err();
        assert!(matches!(err, SyncError::Validation(ValidationError::MissingTimeWindow)));
        assert_eq!(orchestrator.state(), SyncState::Idle);
    }

    #[tokio::test]
    async fn it_should_abort_when_the_source_field_is_missing() {
        let source = Arc::new(MemoryTableStore::new("points"));
        source.insert_named(vec![("device", "1.1".into())]).await;
        let mut fetcher = MockHistoryFetcher::new();
        fetcher.expect_fetch().never();
        let mut orchestrator = SyncOrchestrator::new(context(
            source,
            Arc::new(MemoryTableStore::new("history")),
            fetcher,
            Arc::new(MemoryCheckpointStore::new()),
        ));

        let err = orchestrator.start().await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::Validation(ValidationError::MissingSourceField(ref name)) if name == "point"
        ));
    }

    #[tokio::test]
    async fn it_should_ignore_start_while_running() {
        let source = source_with(&["1.1".into()]).await;
        let mut orchestrator = SyncOrchestrator::new(context(
            source,
            Arc::new(MemoryTableStore::new("history")),
            echo_fetcher(),
            Arc::new(MemoryCheckpointStore::new()),
        ));

        orchestrator.start().await.unwrap();
        assert_eq!(orchestrator.state(), SyncState::Running);
        assert_eq!(orchestrator.start().await.unwrap(), RunOutcome::AlreadyRunning);
        assert_eq!(orchestrator.resume(None).await.unwrap(), RunOutcome::AlreadyRunning);
    }

    #[tokio::test]
    async fn it_should_pause_before_the_next_row_and_save_progress() {
        let source = source_with(&["1.1".into(), "2.2".into()]).await;
        let checkpoints = Arc::new(MemoryCheckpointStore::new());
        let control = SyncControl::new();
        let pause_handle = control.clone();
        let mut fetcher = MockHistoryFetcher::new();
        fetcher.expect_fetch().times(1).returning(move |query| {
            pause_handle.pause();
            Ok(HashMap::from([(query.identifiers()[0].clone(), vec![])]))
        });
        let mut orchestrator = SyncOrchestrator::with_control(
            context(source, Arc::new(MemoryTableStore::new("history")), fetcher, checkpoints.clone()),
            control,
        );

        assert_eq!(orchestrator.start().await.unwrap(), RunOutcome::Paused);
        assert_eq!(orchestrator.state(), SyncState::Paused);
        let saved = checkpoints.load().await.unwrap().unwrap();
        assert_eq!(saved.current_index, 1);
        assert_eq!(saved.success_count, 1);
        assert!(!saved.is_writing);
    }

    #[tokio::test]
    async fn stop_should_clear_everything() {
        let source = source_with(&["1.1".into(), "2.2".into()]).await;
        let checkpoints = Arc::new(MemoryCheckpointStore::new());
        let control = SyncControl::new();
        let pause_handle = control.clone();
        let mut fetcher = MockHistoryFetcher::new();
        fetcher.expect_fetch().returning(move |_| {
            pause_handle.pause();
            Ok(HashMap::new())
        });
        let mut orchestrator = SyncOrchestrator::with_control(
            context(source, Arc::new(MemoryTableStore::new("history")), fetcher, checkpoints.clone()),
            control,
        );
        let mut snapshots = orchestrator.subscribe();

        orchestrator.start().await.unwrap();
        assert_eq!(orchestrator.stop().await.unwrap(), RunOutcome::Stopped);

        assert_eq!(orchestrator.state(), SyncState::Stopped);
        assert_eq!(*orchestrator.progress(), SyncProgress::default());
        assert_eq!(*snapshots.borrow_and_update(), SyncProgress::default());
        assert_eq!(checkpoints.load().await.unwrap(), None);
        assert!(matches!(orchestrator.resume(None).await, Err(SyncError::NothingToResume)));
    }

    /// Saves fail until `recover` is called.
    #[derive(Default)]
    struct FlakyCheckpoints {
        inner: MemoryCheckpointStore,
        healthy: std::sync::atomic::AtomicBool,
    }

    impl FlakyCheckpoints {
        fn recover(&self) {
            self.healthy.store(true, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl CheckpointStore for FlakyCheckpoints {
        async fn save(&self, progress: &SyncProgress) -> std::result::Result<(), CheckpointError> {
            if !self.healthy.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(CheckpointError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "disk full",
                )));
            }
            self.inner.save(progress).await
        }

        async fn load(&self) -> std::result::Result<Option<SyncProgress>, CheckpointError> {
            self.inner.load().await
        }

        async fn clear(&self) -> std::result::Result<(), CheckpointError> {
            self.inner.clear().await
        }
    }

    #[tokio::test]
    async fn it_should_pause_when_a_checkpoint_cannot_be_saved() {
        let points: Vec<CellValue> = (1..=12).map(|n| CellValue::text(format!("1.{}", n))).collect();
        let source = source_with(&points).await;
        let target = Arc::new(MemoryTableStore::new("history"));
        let checkpoints = Arc::new(FlakyCheckpoints::default());
        let mut orchestrator = SyncOrchestrator::new(SyncContext {
            source,
            target: target.clone(),
            fetcher: Arc::new(echo_fetcher()),
            checkpoints: checkpoints.clone(),
            config: SyncConfig::new()
                .with_window(START, END)
                .with_utc_offset_minutes(Some(0))
                .without_pacing(),
        });

        let err = orchestrator.start().await.unwrap_err();
        assert!(matches!(err, SyncError::Checkpoint(_)));
        assert_eq!(orchestrator.state(), SyncState::Paused);
        assert_eq!(orchestrator.progress().current_index, 10);
        assert!(!orchestrator.progress().is_writing);

        checkpoints.recover();
        let outcome = orchestrator.resume(None).await.unwrap();
        assert_eq!(outcome, RunOutcome::Completed { success: 12, fail: 0 });
        assert_eq!(target.rows_by_name().await.len(), 12);
    }

    #[tokio::test]
    async fn start_while_paused_should_begin_a_new_run() {
        let source = source_with(&["1.1".into(), "2.2".into()]).await;
        let checkpoints = Arc::new(MemoryCheckpointStore::new());
        let control = SyncControl::new();
        let pause_handle = control.clone();
        let mut first_call = true;
        let mut fetcher = MockHistoryFetcher::new();
        fetcher.expect_fetch().returning(move |query| {
            if std::mem::take(&mut first_call) {
                pause_handle.pause();
            }
            Ok(HashMap::from([(query.identifiers()[0].clone(), vec![Sample::new(START, 1i64)])]))
        });
        let mut orchestrator = SyncOrchestrator::with_control(
            context(source, Arc::new(MemoryTableStore::new("history")), fetcher, checkpoints.clone()),
            control,
        );

        assert_eq!(orchestrator.start().await.unwrap(), RunOutcome::Paused);
        assert_eq!(checkpoints.load().await.unwrap().unwrap().current_index, 1);

        let outcome = orchestrator.start().await.unwrap();
        assert_eq!(outcome, RunOutcome::Completed { success: 2, fail: 0 });
        assert_eq!(checkpoints.load().await.unwrap(), None);
    }
}
