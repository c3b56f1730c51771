//! The per-request prediction pipeline.
//!
//! Stages run strictly in order: frame extraction, optical flow, batch
//! building, inference, aggregation. CPU-heavy stages run on a shared rayon
//! pool through `spawn_blocking`; inference goes through the shared
//! [`InferenceQueue`]. A semaphore bounds how many requests are inside the
//! pipeline at once.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, Instrument};
use uuid::Uuid;

use aline_media::{
    compute_flows, extract_frames, Farneback, FarnebackParams, FfmpegRunner, FlowEstimator,
    FlowFieldSet, FrameSequence, LoadedFlows,
};
use aline_ml_client::{Batch, Classifier, InferenceOutput, InferenceQueue};
use aline_models::{LabelMapping, PipelineParams, PredictionResult, RankingStream};

use crate::aggregate::{aggregate, top_k};
use crate::batch::{build_batch, AppearanceTransform, ChannelMean};
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::{Operation, RequestLogger};
use crate::metrics::{record_cleanup_failures, record_request, stages, StageTimer};
use crate::selection::select;
use crate::workspace::RequestWorkspace;

/// Shared pipeline state; one instance serves every request.
pub struct PredictionPipeline {
    config: WorkerConfig,
    labels: Arc<LabelMapping>,
    transform: Arc<AppearanceTransform>,
    estimator: Arc<dyn FlowEstimator>,
    pool: Arc<rayon::ThreadPool>,
    classifier: Arc<dyn Classifier>,
    queue: InferenceQueue,
    runner: FfmpegRunner,
    permits: Arc<Semaphore>,
}

impl PredictionPipeline {
    /// Load the label mapping and channel mean named by `config`.
    ///
    /// Must be called inside a tokio runtime (the inference queue is spawned).
    pub fn new(config: WorkerConfig, classifier: Arc<dyn Classifier>) -> WorkerResult<Self> {
        let labels = LabelMapping::from_file(&config.label_mapping_path).map_err(|e| {
            WorkerError::config_error(format!(
                "label mapping {}: {e}",
                config.label_mapping_path.display()
            ))
        })?;
        Self::with_labels(config, labels, classifier)
    }

    pub fn with_labels(
        config: WorkerConfig,
        labels: LabelMapping,
        classifier: Arc<dyn Classifier>,
    ) -> WorkerResult<Self> {
        let mean = match &config.channel_mean_path {
            Some(path) => ChannelMean::from_file(path)?,
            None => ChannelMean::default(),
        };
        let transform = AppearanceTransform::new(config.input_shape, mean);
        let estimator = flow_estimator(&config.flow_backend)?;

        let threads = config.pool_threads();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("aline-cpu-{i}"))
            .build()
            .map_err(|e| WorkerError::config_error(format!("thread pool: {e}")))?;

        let queue = InferenceQueue::spawn(
            Arc::clone(&classifier),
            config.inference_queue_capacity,
            labels.len(),
        );
        let permits = Arc::new(Semaphore::new(config.max_concurrent_requests));

        tracing::info!(
            labels = labels.len(),
            threads,
            max_requests = config.max_concurrent_requests,
            flow_backend = estimator.name(),
            ranking = %config.ranking,
            "Prediction pipeline ready"
        );

        Ok(Self {
            config,
            labels: Arc::new(labels),
            transform: Arc::new(transform),
            estimator,
            pool: Arc::new(pool),
            classifier,
            queue,
            runner: FfmpegRunner::new(),
            permits,
        })
    }

    /// Use a different FFmpeg executable.
    pub fn with_runner(mut self, runner: FfmpegRunner) -> Self {
        self.runner = runner;
        self
    }

    /// Use a different flow estimator.
    pub fn with_estimator(mut self, estimator: Arc<dyn FlowEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn labels(&self) -> &LabelMapping {
        &self.labels
    }

    /// Whether the classifier is reachable.
    pub async fn is_ready(&self) -> bool {
        self.classifier.is_ready().await
    }

    /// Predict actions for a video file.
    ///
    /// `media_url` is the client-visible location of the video; the result
    /// carries it with a cachebuster.
    pub async fn predict_video(
        &self,
        video: &Path,
        media_url: &str,
        params: &PipelineParams,
    ) -> WorkerResult<PredictionResult> {
        let request_id = Uuid::new_v4();
        let logger = RequestLogger::new(&request_id, Operation::PredictVideo);
        let span = logger.create_span();

        let result = self
            .run_video(&request_id, &logger, video, media_url, params)
            .instrument(span)
            .await;
        finish(&logger, result)
    }

    /// Predict actions for a still image.
    ///
    /// The image stands in for every frame and all motion is the neutral
    /// placeholder.
    pub async fn predict_image(
        &self,
        image: &Path,
        media_url: &str,
        params: &PipelineParams,
    ) -> WorkerResult<PredictionResult> {
        let request_id = Uuid::new_v4();
        let logger = RequestLogger::new(&request_id, Operation::PredictImage);
        let span = logger.create_span();

        let result = self
            .run_image(&logger, image, media_url, params)
            .instrument(span)
            .await;
        finish(&logger, result)
    }

    async fn run_video(
        &self,
        request_id: &Uuid,
        logger: &RequestLogger,
        video: &Path,
        media_url: &str,
        params: &PipelineParams,
    ) -> WorkerResult<PredictionResult> {
        params.check().map_err(WorkerError::from_model)?;
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| WorkerError::internal("pipeline is closed"))?;
        logger.log_start(&format!("video {}", video.display()));

        let workspace = RequestWorkspace::create(&self.config.work_dir, request_id).await?;
        let outcome = self
            .video_stages(logger, &workspace, video, media_url, params)
            .await;

        let report = workspace.cleanup().await;
        report.log(logger.request_id());
        record_cleanup_failures(report.failures.len());
        if !report.is_clean() {
            logger.log_warning(&format!(
                "{} workspace paths could not be removed",
                report.failures.len()
            ));
        }

        outcome
    }

    async fn video_stages(
        &self,
        logger: &RequestLogger,
        workspace: &RequestWorkspace,
        video: &Path,
        media_url: &str,
        params: &PipelineParams,
    ) -> WorkerResult<PredictionResult> {
        let timer = StageTimer::start(stages::EXTRACT);
        let frames = extract_frames(
            &self.runner,
            video,
            params.fps,
            params.crop_size,
            workspace.frames_dir(),
        )
        .await?;
        logger.log_stage(
            stages::EXTRACT,
            timer.finish(),
            &format!("{} frames", frames.len()),
        );

        if frames.len() < params.batch_size {
            return Err(WorkerError::invalid_input(format!(
                "video is too short: {} frames at {} fps, {} needed",
                frames.len(),
                params.fps,
                params.batch_size
            )));
        }
        let selection = select(frames.len(), params.batch_size)?;
        debug!(?selection, "Selected frames");

        let timer = StageTimer::start(stages::FLOW);
        let flows = {
            let frames = frames.clone();
            let out_dir = workspace.flows_dir().to_path_buf();
            let estimator = Arc::clone(&self.estimator);
            let pool = Arc::clone(&self.pool);
            tokio::task::spawn_blocking(move || {
                compute_flows(&frames, &out_dir, estimator.as_ref(), &pool)
            })
            .await
            .map_err(join_error)??
        };
        logger.log_stage(
            stages::FLOW,
            timer.finish(),
            &format!("{} transitions", flows.len()),
        );

        let timer = StageTimer::start(stages::BATCH);
        let batch = self
            .build_batch_blocking(selection, frames, Some(flows), params.window)
            .await?;
        logger.log_stage(stages::BATCH, timer.finish(), &format!("{} rows", batch.len()));

        self.infer_and_aggregate(logger, batch, media_url, params).await
    }

    async fn run_image(
        &self,
        logger: &RequestLogger,
        image: &Path,
        media_url: &str,
        params: &PipelineParams,
    ) -> WorkerResult<PredictionResult> {
        params.check().map_err(WorkerError::from_model)?;
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| WorkerError::internal("pipeline is closed"))?;
        logger.log_start(&format!("image {}", image.display()));

        let frames = FrameSequence::from_still(image, params.batch_size);
        let selection = select(frames.len(), params.batch_size)?;

        let timer = StageTimer::start(stages::BATCH);
        let batch = self
            .build_batch_blocking(selection, frames, None, params.window)
            .await?;
        logger.log_stage(stages::BATCH, timer.finish(), &format!("{} rows", batch.len()));

        self.infer_and_aggregate(logger, batch, media_url, params).await
    }

    async fn build_batch_blocking(
        &self,
        selection: Vec<usize>,
        frames: FrameSequence,
        flows: Option<FlowFieldSet>,
        window: usize,
    ) -> WorkerResult<Batch> {
        let transform = Arc::clone(&self.transform);
        let pool = Arc::clone(&self.pool);

        tokio::task::spawn_blocking(move || {
            pool.install(|| -> WorkerResult<Batch> {
                let shape = transform.shape();
                let size = (shape.height, shape.width);
                let loaded = match flows {
                    Some(set) => LoadedFlows::load_windows(&set, size, &selection, window)?,
                    None => LoadedFlows::empty(size),
                };
                build_batch(&selection, &frames, &loaded, &transform, window)
            })
        })
        .await
        .map_err(join_error)?
    }

    async fn infer_and_aggregate(
        &self,
        logger: &RequestLogger,
        batch: Batch,
        media_url: &str,
        params: &PipelineParams,
    ) -> WorkerResult<PredictionResult> {
        let timer = StageTimer::start(stages::INFERENCE);
        let output = self.queue.submit(batch).await?;
        logger.log_stage(stages::INFERENCE, timer.finish(), "classifier output validated");

        let timer = StageTimer::start(stages::AGGREGATE);
        log_stream_agreement(&output);
        let ranked = match params.ranking {
            RankingStream::Appearance => &output.appearance,
            RankingStream::Motion => &output.motion,
            RankingStream::Combined => &output.combined,
        };
        let result = aggregate(media_url, ranked, &self.labels, params.top_k)?;
        logger.log_stage(
            stages::AGGREGATE,
            timer.finish(),
            &format!("{} entries ranked by {}", result.len(), params.ranking),
        );

        Ok(result)
    }
}

fn flow_estimator(backend: &str) -> WorkerResult<Arc<dyn FlowEstimator>> {
    match backend {
        "farneback" => {
            let estimator = Farneback::new(FarnebackParams::default())
                .map_err(|e| WorkerError::config_error(e.to_string()))?;
            Ok(Arc::new(estimator))
        }
        #[cfg(feature = "opencv")]
        "opencv" => Ok(Arc::new(aline_media::OpenCvFarneback::new(
            FarnebackParams::default(),
        ))),
        other => Err(WorkerError::config_error(format!(
            "unknown flow backend '{other}'"
        ))),
    }
}

fn join_error(e: tokio::task::JoinError) -> WorkerError {
    WorkerError::internal(format!("blocking task failed: {e}"))
}

/// Debug view of the streams the response does not rank by.
fn log_stream_agreement(output: &InferenceOutput) {
    if !tracing::enabled!(tracing::Level::DEBUG) {
        return;
    }
    for (row, ((a, m), c)) in output
        .appearance
        .outer_iter()
        .zip(output.motion.outer_iter())
        .zip(output.combined.outer_iter())
        .enumerate()
    {
        debug!(
            row,
            appearance = ?top_k(a, 1).first().copied(),
            motion = ?top_k(m, 1).first().copied(),
            combined = ?top_k(c, 1).first().copied(),
            "Per-stream argmax"
        );
    }
}

fn finish(
    logger: &RequestLogger,
    result: WorkerResult<PredictionResult>,
) -> WorkerResult<PredictionResult> {
    match &result {
        Ok(prediction) => {
            record_request("ok");
            logger.log_completion(&format!("{} frame entries", prediction.len()));
        }
        Err(e) => {
            record_request(e.kind());
            logger.log_error(e.kind(), &e.to_string());
        }
    }
    result
}
