use crate::core_modules::raw_image::RawImage;
use crate::error::PipelineError;
use crate::pipeline::{BatchReport, DiagnosisPipeline, EncodedImage, ImageAnalysis, ImageOutcome};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// What a worker is asked to analyze.
pub enum TaskInput {
    Decoded(RawImage),
    Encoded(EncodedImage),
}

pub struct AnalysisTask {
    pub index: usize,
    pub input: TaskInput,
    pub result_sender: oneshot::Sender<Result<ImageAnalysis, PipelineError>>,
}

/// A fixed set of worker tasks fed round-robin by a single dispatcher.
/// Each worker runs the CPU-bound stages on the blocking thread pool.
pub struct WorkerPool {
    task_sender: mpsc::UnboundedSender<AnalysisTask>,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns the dispatcher and `worker_count` workers. Must be called from
    /// inside a tokio runtime.
    pub fn new(pipeline: Arc<DiagnosisPipeline>, worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let (task_sender, mut task_receiver) = mpsc::unbounded_channel::<AnalysisTask>();

        let (worker_senders, worker_receivers): (Vec<_>, Vec<_>) = (0..worker_count)
            .map(|_| mpsc::unbounded_channel::<AnalysisTask>())
            .unzip();

        tokio::spawn(async move {
            let mut worker_idx = 0;
            while let Some(task) = task_receiver.recv().await {
                if worker_senders[worker_idx].send(task).is_err() {
                    tracing::error!(worker = worker_idx, "worker stopped, dropping task");
                }
                worker_idx = (worker_idx + 1) % worker_count;
            }
        });

        let workers = worker_receivers
            .into_iter()
            .map(|mut worker_receiver| {
                let pipeline = Arc::clone(&pipeline);
                tokio::spawn(async move {
                    while let Some(task) = worker_receiver.recv().await {
                        let AnalysisTask {
                            index,
                            input,
                            result_sender,
                        } = task;
                        let result = Self::run_task(Arc::clone(&pipeline), input).await;
                        if result_sender.send(result).is_err() {
                            tracing::debug!(index, "result receiver dropped");
                        }
                    }
                })
            })
            .collect();

        tracing::debug!(workers = worker_count, "worker pool started");
        Self { task_sender, workers }
    }

    async fn run_task(pipeline: Arc<DiagnosisPipeline>, input: TaskInput) -> Result<ImageAnalysis, PipelineError> {
        tokio::task::spawn_blocking(move || match input {
            TaskInput::Decoded(image) => pipeline.analyze_image(&image),
            TaskInput::Encoded(upload) => pipeline.analyze_encoded(&upload.bytes, upload.format),
        })
        .await
        .unwrap_or_else(|e| Err(PipelineError::Worker(format!("analysis task failed: {e}"))))
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub async fn analyze(&self, index: usize, input: TaskInput) -> Result<ImageAnalysis, PipelineError> {
        let (result_sender, result_receiver) = oneshot::channel();

        self.task_sender
            .send(AnalysisTask {
                index,
                input,
                result_sender,
            })
            .map_err(|_| PipelineError::Worker("failed to send task to worker pool".into()))?;

        result_receiver
            .await
            .map_err(|_| PipelineError::Worker("failed to receive result from worker".into()))?
    }
}

/// Analyzes the images of a batch concurrently. Results are identical to
/// `DiagnosisPipeline::analyze_batch`, in upload order.
pub struct ParallelDiagnosisPipeline {
    pipeline: Arc<DiagnosisPipeline>,
    worker_pool: WorkerPool,
}

impl ParallelDiagnosisPipeline {
    /// Must be called from inside a tokio runtime.
    pub fn new(pipeline: Arc<DiagnosisPipeline>) -> Self {
        let worker_count = pipeline.config().effective_worker_count();
        let worker_pool = WorkerPool::new(Arc::clone(&pipeline), worker_count);
        Self { pipeline, worker_pool }
    }

    pub fn pipeline(&self) -> &Arc<DiagnosisPipeline> {
        &self.pipeline
    }

    pub fn worker_count(&self) -> usize {
        self.worker_pool.worker_count()
    }

    pub async fn analyze_batch(&self, images: Vec<RawImage>) -> Result<BatchReport, PipelineError> {
        self.pipeline.check_batch_size(images.len())?;
        self.run(images.into_iter().map(TaskInput::Decoded).collect()).await
    }

    pub async fn analyze_encoded_batch(&self, uploads: Vec<EncodedImage>) -> Result<BatchReport, PipelineError> {
        self.pipeline.check_batch_size(uploads.len())?;
        self.run(uploads.into_iter().map(TaskInput::Encoded).collect()).await
    }

    async fn run(&self, inputs: Vec<TaskInput>) -> Result<BatchReport, PipelineError> {
        let pending = inputs.into_iter().enumerate().map(|(index, input)| async move {
            ImageOutcome {
                index,
                result: self.worker_pool.analyze(index, input).await,
            }
        });
        let outcomes = join_all(pending).await;
        Ok(self.pipeline.build_report(outcomes))
    }
}
