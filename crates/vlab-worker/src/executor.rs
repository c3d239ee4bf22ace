//! Bounded run executor.
//!
//! Runs are spawned onto the tokio runtime and gated by a semaphore, so
//! at most `max_concurrent_runs` decode/encode pipelines are live at once.
//! Each run publishes [`JobStatusSnapshot`]s through a watch channel and
//! onto the shared [`StatusBoard`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{info, warn, Instrument};

use vlab_media::{
    detect_image, load_detector, process_image, FfmpegBackend, FfmpegBackendConfig,
    FfmpegReencoder, MediaBackend, ProgressSink, ReencodeConfig, Reencoder, StreamConfig,
    StreamProcessor,
};
use vlab_models::{
    DetectionResult, JobId, JobStatusSnapshot, MediaKind, Pipeline, PreprocessResult, ProgressReport,
};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::job::{JobKind, JobOutput, JobRequest, ModelSpec};
use crate::logging::RunLogger;

/// Latest status snapshot per job, readable by pollers.
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    inner: Arc<RwLock<HashMap<JobId, JobStatusSnapshot>>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, job_id: &JobId) -> Option<JobStatusSnapshot> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(job_id)
            .cloned()
    }

    /// All snapshots, ordered by job id.
    pub fn snapshots(&self) -> Vec<JobStatusSnapshot> {
        let mut all: Vec<_> = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        all.sort_by(|a, b| a.job_id.cmp(&b.job_id));
        all
    }

    fn publish(&self, snapshot: &JobStatusSnapshot) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(snapshot.job_id.clone(), snapshot.clone());
    }
}

/// Pushes status changes of one job to its watchers and the board.
struct StatusPublisher {
    tx: watch::Sender<JobStatusSnapshot>,
    board: StatusBoard,
}

impl StatusPublisher {
    fn update(&self, f: impl FnOnce(&mut JobStatusSnapshot)) {
        self.tx.send_modify(f);
        self.board.publish(&self.tx.borrow());
    }
}

impl ProgressSink for StatusPublisher {
    fn report(&self, report: ProgressReport) {
        self.update(|s| s.apply_progress(&report));
    }
}

/// Handle to a submitted run.
#[derive(Debug)]
pub struct JobHandle {
    job_id: JobId,
    status: watch::Receiver<JobStatusSnapshot>,
    task: JoinHandle<WorkerResult<JobOutput>>,
}

impl JobHandle {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Latest status snapshot.
    pub fn status(&self) -> JobStatusSnapshot {
        self.status.borrow().clone()
    }

    /// Receiver notified on every status change.
    pub fn subscribe(&self) -> watch::Receiver<JobStatusSnapshot> {
        self.status.clone()
    }

    /// Wait for the run to finish.
    pub async fn wait(self) -> WorkerResult<JobOutput> {
        self.task
            .await
            .map_err(|e| WorkerError::TaskFailed(e.to_string()))?
    }
}

/// Shared state handed to every run.
struct RunContext {
    config: WorkerConfig,
    backend: Arc<dyn MediaBackend>,
    reencoder: Arc<dyn Reencoder>,
    cancel: watch::Receiver<bool>,
}

/// Executes job requests with bounded concurrency.
pub struct RunExecutor {
    ctx: Arc<RunContext>,
    semaphore: Arc<Semaphore>,
    board: StatusBoard,
    in_flight: Arc<AtomicUsize>,
    accepting: AtomicBool,
    cancel: watch::Sender<bool>,
}

impl RunExecutor {
    /// Executor over FFmpeg with the configured executables.
    pub fn new(config: WorkerConfig) -> WorkerResult<Self> {
        let backend = FfmpegBackend::new(FfmpegBackendConfig {
            ffmpeg_path: config.ffmpeg_path.clone(),
            ffprobe_path: config.ffprobe_path.clone(),
            ..Default::default()
        })?;
        let (cancel, cancel_rx) = watch::channel(false);
        let reencoder = FfmpegReencoder::new(ReencodeConfig {
            ffmpeg_path: Some(backend.ffmpeg().to_path_buf()),
            timeout_secs: config.reencode_timeout.as_secs(),
            ..Default::default()
        })
        .with_cancel(cancel_rx);
        Ok(Self::assemble(config, Arc::new(backend), Arc::new(reencoder), cancel))
    }

    /// Executor over an explicit backend and re-encoder.
    pub fn with_backend(
        config: WorkerConfig,
        backend: Arc<dyn MediaBackend>,
        reencoder: Arc<dyn Reencoder>,
    ) -> Self {
        let (cancel, _) = watch::channel(false);
        Self::assemble(config, backend, reencoder, cancel)
    }

    fn assemble(
        config: WorkerConfig,
        backend: Arc<dyn MediaBackend>,
        reencoder: Arc<dyn Reencoder>,
        cancel: watch::Sender<bool>,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_runs.max(1)));
        Self {
            ctx: Arc::new(RunContext {
                config,
                backend,
                reencoder,
                cancel: cancel.subscribe(),
            }),
            semaphore,
            board: StatusBoard::new(),
            in_flight: Arc::new(AtomicUsize::new(0)),
            accepting: AtomicBool::new(true),
            cancel,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.ctx.config
    }

    pub fn board(&self) -> &StatusBoard {
        &self.board
    }

    /// Runs submitted and not yet finished, queued ones included.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Queue a run. It starts once a concurrency slot is free.
    pub fn submit(&self, request: JobRequest) -> WorkerResult<JobHandle> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(WorkerError::ShuttingDown);
        }
        request.validate()?;

        let job_id = request.job_id.clone();
        let snapshot = JobStatusSnapshot::new(job_id.clone());
        self.board.publish(&snapshot);
        let (tx, status) = watch::channel(snapshot);
        let publisher = StatusPublisher {
            tx,
            board: self.board.clone(),
        };

        let ctx = Arc::clone(&self.ctx);
        let semaphore = Arc::clone(&self.semaphore);
        let in_flight = Arc::clone(&self.in_flight);
        in_flight.fetch_add(1, Ordering::SeqCst);

        let logger = RunLogger::new(&job_id, request.kind_name());
        let span = logger.create_span();
        let task = tokio::spawn(
            async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        let cancelled = *ctx.cancel.borrow();
                        if cancelled {
                            Err(WorkerError::ShuttingDown)
                        } else {
                            execute(&ctx, &request, &publisher, &logger).await
                        }
                    }
                    Err(_) => Err(WorkerError::ShuttingDown),
                };
                match &result {
                    Ok(output) => publisher.update(|s| s.complete(output.frames_processed(), output.degraded())),
                    Err(e) => {
                        logger.log_error(&e.to_string());
                        publisher.update(|s| s.fail(e.to_string()));
                    }
                }
                in_flight.fetch_sub(1, Ordering::SeqCst);
                result
            }
            .instrument(span),
        );

        Ok(JobHandle {
            job_id,
            status,
            task,
        })
    }

    /// Stop accepting runs and wait for in-flight ones.
    ///
    /// Runs still going when the shutdown timeout expires are cancelled at
    /// their next frame boundary. Returns `true` when everything finished in
    /// time.
    pub async fn shutdown(&self) -> bool {
        self.accepting.store(false, Ordering::SeqCst);
        let timeout = self.ctx.config.shutdown_timeout;
        info!(in_flight = self.in_flight(), "Waiting for in-flight runs to complete...");

        let drained = tokio::time::timeout(timeout, self.wait_for_runs()).await.is_ok();
        if !drained {
            warn!(
                in_flight = self.in_flight(),
                "Shutdown timed out after {}s, cancelling remaining runs",
                timeout.as_secs()
            );
            let _ = self.cancel.send(true);
        }
        drained
    }

    async fn wait_for_runs(&self) {
        while self.in_flight() > 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

async fn execute(
    ctx: &RunContext,
    request: &JobRequest,
    publisher: &StatusPublisher,
    logger: &RunLogger,
) -> WorkerResult<JobOutput> {
    let source = request.source_path.as_path();
    if !source.exists() {
        return Err(WorkerError::SourceNotFound(source.to_path_buf()));
    }

    let output = request.output_path(&ctx.config.work_dir);
    if let Some(dir) = output.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }

    publisher.update(|s| s.start("Starting"));
    logger.log_start(&format!("{} -> {}", source.display(), output.display()));

    let result = match &request.kind {
        JobKind::Preprocess { pipeline } => {
            run_preprocess(ctx, source, pipeline, &output, publisher).await.map(JobOutput::Preprocess)
        }
        JobKind::Detect { model } => {
            run_detect(ctx, source, model, &output, publisher, logger).await.map(JobOutput::Detect)
        }
    }?;

    if result.degraded() {
        logger.log_warning("re-encode failed; kept the intermediate encoding");
    }
    logger.log_completion(&format!(
        "{} frames -> {}",
        result.frames_processed(),
        result.output_path().display()
    ));
    Ok(result)
}

fn processor(ctx: &RunContext) -> StreamProcessor<dyn MediaBackend, dyn Reencoder> {
    StreamProcessor::new(Arc::clone(&ctx.backend), Arc::clone(&ctx.reencoder))
        .with_config(StreamConfig {
            flush_delay: ctx.config.flush_delay,
            ..Default::default()
        })
        .with_cancel(ctx.cancel.clone())
}

async fn run_preprocess(
    ctx: &RunContext,
    source: &Path,
    pipeline: &Pipeline,
    output: &Path,
    publisher: &StatusPublisher,
) -> WorkerResult<PreprocessResult> {
    // An empty pipeline is a plain copy of the source
    if pipeline.is_empty() {
        tokio::fs::copy(source, output).await?;
        publisher.report(ProgressReport::new(1, 1, 100));
        return Ok(PreprocessResult {
            frames_processed: 1,
            total_frames: 1,
            output_path: output.to_path_buf(),
            degraded: false,
        });
    }

    let result = match MediaKind::from_path(source) {
        MediaKind::Image => process_image(source, pipeline.steps(), output, publisher).await?,
        MediaKind::Video => {
            processor(ctx)
                .preprocess(source, pipeline.steps(), output, publisher)
                .await?
        }
    };
    Ok(result)
}

async fn run_detect(
    ctx: &RunContext,
    source: &Path,
    model: &ModelSpec,
    output: &Path,
    publisher: &StatusPublisher,
    logger: &RunLogger,
) -> WorkerResult<DetectionResult> {
    let model_path = model.resolve_path(&ctx.config.models_dir);
    let kind = model.kind;
    let threshold = model.conf_threshold;
    // Session creation reads and optimizes the whole model file
    let detector = tokio::task::spawn_blocking(move || load_detector(kind, model_path, threshold))
        .await
        .map_err(|e| WorkerError::TaskFailed(e.to_string()))??;
    logger.log_progress(&format!("loaded model {} ({})", model.display_name(), detector.name()));

    let result = match MediaKind::from_path(source) {
        MediaKind::Image => detect_image(source, detector.as_ref(), output, publisher).await?,
        MediaKind::Video => {
            processor(ctx)
                .detect(source, detector.as_ref(), output, publisher)
                .await?
        }
    };
    logger.log_progress(&format!(
        "{} detections in {} frames",
        result.total_detections,
        result.frames_with_detections()
    ));
    Ok(result)
}
