//! Main orchestrator loop.
//!
//! Polls the pending directory, takes one job at a time through
//! Load → Classify → Generate → Emit → Archive, and keeps going no matter
//! how an individual job ends.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use crate::adapters::{
    ConsoleSink, EmotionClassifier, FileSink, GeminiModel, HttpEmotionClassifier,
    HttpKnowledgeBase, OutputSink, RagGenerator, ResponseGenerator,
};
use crate::config::{OrchestratorSettings, ResolvedConfig, SinkKind};
use crate::domain::{Job, JobId, JobOutcome, JobStatus, PipelineResult, PollOutcome};
use crate::ingest::queue::payload_digest;
use crate::ingest::{JobQueue, QueueWaker};

use super::pipeline::{PollError, Stage, StageError};

/// Consecutive failures of one job, keyed to its content
#[derive(Debug, Clone, Default)]
struct FailureRecord {
    digest: Option<String>,
    attempts: u32,
}

/// Counters reported when the loop stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub polls: u64,
    pub archived: u64,
    pub skipped_empty: u64,
    pub failed: u64,
    pub dead_lettered: u64,
}

/// What to do between polls
enum Pause {
    /// A job just finished; poll again right away
    None,
    /// Queue was empty
    Idle,
    /// A job failed
    Cooldown,
}

/// Single-consumer pipeline orchestrator
pub struct Orchestrator {
    queue: JobQueue,
    classifier: Arc<dyn EmotionClassifier>,
    generator: Arc<dyn ResponseGenerator>,
    sink: Arc<dyn OutputSink>,
    settings: OrchestratorSettings,

    /// Optional change notifications to cut the idle wait short
    waker: Option<QueueWaker>,

    /// Failure counts for jobs still pending
    failures: HashMap<JobId, FailureRecord>,

    stats: LoopStats,
}

impl Orchestrator {
    /// Create an orchestrator from explicit collaborators
    pub fn new(
        queue: JobQueue,
        classifier: Arc<dyn EmotionClassifier>,
        generator: Arc<dyn ResponseGenerator>,
        sink: Arc<dyn OutputSink>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            queue,
            classifier,
            generator,
            sink,
            settings,
            waker: None,
            failures: HashMap::new(),
            stats: LoopStats::default(),
        }
    }

    /// Build the production collaborators from configuration
    ///
    /// This is the one place model clients and service handles are created.
    /// They live as long as the orchestrator and are dropped with it.
    pub async fn from_config(config: &ResolvedConfig) -> Result<Self> {
        let queue = JobQueue::from_config(config).await?;

        info!("Initializing emotion classifier ({})", config.classifier_url);
        let classifier = Arc::new(HttpEmotionClassifier::new(&config.classifier_url)?);

        info!("Initializing RAG + LLM system ({})", config.generator.model);
        let api_key = config.generator.api_key.clone().ok_or_else(|| {
            anyhow::anyhow!("GOOGLE_API_KEY not found. Make sure it is set in the environment")
        })?;
        let knowledge = Arc::new(HttpKnowledgeBase::new(
            &config.generator.retrieval_url,
            &config.generator.collection,
        )?);
        let model = Arc::new(GeminiModel::new(&config.generator.model, api_key)?);
        let generator = Arc::new(RagGenerator::new(
            knowledge,
            model,
            config.generator.n_results,
        ));

        let sink: Arc<dyn OutputSink> = match config.sink {
            SinkKind::Console => Arc::new(ConsoleSink),
            SinkKind::File => Arc::new(FileSink::new(&config.responses_log)),
        };

        let mut orchestrator = Self::new(
            queue,
            classifier,
            generator,
            sink,
            config.orchestrator.clone(),
        );

        if config.orchestrator.watch {
            orchestrator = orchestrator.with_waker(QueueWaker::watch(&config.pending_dir)?);
        }

        Ok(orchestrator)
    }

    /// Wake the idle wait on filesystem changes
    pub fn with_waker(mut self, waker: QueueWaker) -> Self {
        self.waker = Some(waker);
        self
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// Run forever
    pub async fn run(&mut self) {
        self.run_until(std::future::pending::<()>()).await;
    }

    /// Run until `shutdown` resolves
    ///
    /// Shutdown is only observed between polls, so a job that has started is
    /// always taken to archival or failure first.
    pub async fn run_until<F>(&mut self, shutdown: F) -> LoopStats
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        info!(
            pending = %self.queue.pending_dir().display(),
            poll_interval_ms = self.settings.poll_interval.as_millis() as u64,
            "Watching for new files"
        );

        loop {
            let pause = match self.poll_once().await {
                Ok(PollOutcome::Idle) => Pause::Idle,
                Ok(PollOutcome::Finished { job, outcome }) => {
                    match outcome {
                        JobOutcome::Archived(_) => info!(job = %job, "Processed and archived"),
                        JobOutcome::SkippedEmpty => info!(job = %job, "Archived empty file"),
                        JobOutcome::DeadLettered { attempts } => {
                            warn!(job = %job, attempts, "Job moved to dead-letter directory")
                        }
                    }
                    Pause::None
                }
                Err(e) => {
                    error!(
                        job = e.job.as_ref().map(|j| j.as_str()).unwrap_or("-"),
                        stage = %e.error.stage(),
                        attempts = e.attempts,
                        error = %e.error,
                        "An error occurred; job stays pending"
                    );
                    Pause::Cooldown
                }
            };

            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!(stats = ?self.stats, "Orchestrator stopping");
                    break;
                }
                _ = self.pause(pause) => {}
            }
        }

        self.stats
    }

    /// Wait between polls
    async fn pause(&mut self, pause: Pause) {
        match pause {
            Pause::None => {}
            Pause::Cooldown => tokio::time::sleep(self.settings.error_cooldown).await,
            Pause::Idle => {
                let interval = self.settings.poll_interval;
                match self.waker.as_mut() {
                    // Our own archive moves also ping the waker; that costs
                    // at most one extra empty poll
                    Some(waker) => {
                        tokio::select! {
                            _ = tokio::time::sleep(interval) => {}
                            _ = waker.changed() => debug!("Pending directory changed"),
                        }
                    }
                    None => tokio::time::sleep(interval).await,
                }
            }
        }
    }

    /// One polling iteration: select at most one job and process it
    pub async fn poll_once(&mut self) -> Result<PollOutcome, PollError> {
        self.stats.polls += 1;

        let next = self.queue.next_job().await.map_err(|e| PollError {
            job: None,
            attempts: 0,
            error: StageError::filesystem(Stage::Poll, e),
        })?;

        let Some(mut job) = next else {
            debug!("No pending files");
            // Nothing pending means nothing left to retry
            self.failures.clear();
            return Ok(PollOutcome::Idle);
        };

        info!(job = %job.id, "New file detected");

        match self.process_job(&mut job).await {
            Ok(outcome) => {
                self.failures.remove(&job.id);
                match outcome {
                    JobOutcome::SkippedEmpty => self.stats.skipped_empty += 1,
                    _ => self.stats.archived += 1,
                }
                Ok(PollOutcome::Finished {
                    job: job.id,
                    outcome,
                })
            }
            Err(error) => {
                // Content is only known once the load succeeded
                let digest =
                    (job.status != JobStatus::Pending).then(|| payload_digest(&job.payload));
                job.mark_failed();
                self.stats.failed += 1;
                let attempts = self.record_failure(&job.id, digest);

                if let Some(outcome) = self.maybe_dead_letter(&mut job, attempts, &error).await {
                    return Ok(PollOutcome::Finished {
                        job: job.id,
                        outcome,
                    });
                }

                Err(PollError {
                    job: Some(job.id),
                    attempts,
                    error,
                })
            }
        }
    }

    /// Take one job through the pipeline
    #[instrument(skip(self, job), fields(job = %job.id))]
    async fn process_job(&self, job: &mut Job) -> Result<JobOutcome, StageError> {
        // Load
        self.queue
            .load(job)
            .await
            .map_err(|e| StageError::filesystem(Stage::Load, e))?;

        if job.is_empty_payload() {
            warn!("File is empty. Archiving and skipping");
            self.archive(job).await?;
            return Ok(JobOutcome::SkippedEmpty);
        }

        // Classify
        info!("Classifying emotion");
        let emotion = self
            .with_deadline(Stage::Classify, self.classifier.predict(&job.payload))
            .await?;
        job.mark_classified(emotion.clone());

        // Generate
        info!(emotion = emotion.label(), "Generating response");
        let text = self
            .with_deadline(
                Stage::Generate,
                self.generator.generate(&job.payload, &emotion),
            )
            .await?;
        let result = PipelineResult::new(text);
        job.mark_responded(result.clone());

        // Emit
        self.with_deadline(Stage::Emit, self.sink.emit(&job.id, &result))
            .await?;

        // Archive only after the response is out
        self.archive(job).await?;

        info!(
            elapsed_ms = (Utc::now() - job.detected_at).num_milliseconds(),
            "Job complete"
        );

        Ok(JobOutcome::Archived(result))
    }

    async fn archive(&self, job: &mut Job) -> Result<(), StageError> {
        self.queue
            .archive(job)
            .await
            .map(|_| ())
            .map_err(|e| StageError::filesystem(Stage::Archive, e))
    }

    /// Await a collaborator call under the stage deadline
    async fn with_deadline<T, F>(&self, stage: Stage, call: F) -> Result<T, StageError>
    where
        F: Future<Output = Result<T>>,
    {
        let after = self.settings.stage_timeout;
        match tokio::time::timeout(after, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(StageError::Collaborator { stage, error }),
            Err(_) => Err(StageError::Timeout { stage, after }),
        }
    }

    /// Count a failure; an edited file starts over at 1
    ///
    /// `digest` is `None` when the file couldn't be read; the stored digest
    /// is kept and the count keeps going.
    fn record_failure(&mut self, id: &JobId, digest: Option<String>) -> u32 {
        let record = self.failures.entry(id.clone()).or_default();

        if let Some(digest) = digest {
            if record.digest.as_ref().is_some_and(|prev| *prev != digest) {
                record.attempts = 0;
            }
            record.digest = Some(digest);
        }

        record.attempts += 1;
        record.attempts
    }

    /// Move a job out of the way once it has used up its attempts
    ///
    /// Returns `None` when no limit is configured, the limit isn't reached
    /// yet, or the move itself failed (the job then stays pending).
    async fn maybe_dead_letter(
        &mut self,
        job: &mut Job,
        attempts: u32,
        error: &StageError,
    ) -> Option<JobOutcome> {
        let max = self.settings.max_attempts?;
        if attempts < max {
            return None;
        }

        error!(job = %job.id, attempts, error = %error, "Job failed too many times");

        match self.queue.dead_letter(job).await {
            Ok(path) => {
                debug!(job = %job.id, target = %path.display(), "Dead-lettered");
                self.failures.remove(&job.id);
                self.stats.dead_lettered += 1;
                Some(JobOutcome::DeadLettered { attempts })
            }
            Err(e) => {
                warn!(job = %job.id, error = %e, "Failed to move job to dead-letter directory");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EmotionData;
    use async_trait::async_trait;
    use std::time::Duration;
    use tempfile::TempDir;

    fn quick_settings(poll_interval: Duration) -> OrchestratorSettings {
        OrchestratorSettings {
            poll_interval,
            error_cooldown: poll_interval,
            ..OrchestratorSettings::default()
        }
    }

    struct Fixed;

    #[async_trait]
    impl EmotionClassifier for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn predict(&self, _text: &str) -> Result<EmotionData> {
            Ok(EmotionData::from_label("calm"))
        }
    }

    #[async_trait]
    impl ResponseGenerator for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn generate(&self, _text: &str, emotion: &EmotionData) -> Result<String> {
            Ok(format!("You seem {}.", emotion.label()))
        }
    }

    struct Slow;

    #[async_trait]
    impl ResponseGenerator for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        async fn generate(&self, _text: &str, _emotion: &EmotionData) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(String::new())
        }
    }

    struct Quiet;

    #[async_trait]
    impl OutputSink for Quiet {
        fn name(&self) -> &str {
            "quiet"
        }

        async fn emit(&self, _job: &JobId, _result: &PipelineResult) -> Result<()> {
            Ok(())
        }
    }

    async fn orchestrator(
        generator: Arc<dyn ResponseGenerator>,
        settings: OrchestratorSettings,
    ) -> (Orchestrator, TempDir) {
        let temp = TempDir::new().unwrap();
        let pending = temp.path().join("pending");
        let queue = JobQueue::open(&pending, pending.join("archive"), "*.txt")
            .await
            .unwrap();
        let orch = Orchestrator::new(queue, Arc::new(Fixed), generator, Arc::new(Quiet), settings);
        (orch, temp)
    }

    #[tokio::test]
    async fn test_poll_once_processes_job() {
        let (mut orch, _temp) =
            orchestrator(Arc::new(Fixed), quick_settings(Duration::from_millis(10))).await;
        orch.queue().enqueue_named("a.txt", "hello").await.unwrap();

        let outcome = orch.poll_once().await.unwrap();
        assert_eq!(
            outcome,
            PollOutcome::Finished {
                job: JobId::new("a.txt"),
                outcome: JobOutcome::Archived(PipelineResult::new("You seem calm.")),
            }
        );
        assert_eq!(orch.stats().archived, 1);
    }

    #[tokio::test]
    async fn test_generator_timeout_keeps_job_pending() {
        let settings = OrchestratorSettings {
            stage_timeout: Duration::from_millis(50),
            ..quick_settings(Duration::from_millis(10))
        };
        let (mut orch, _temp) = orchestrator(Arc::new(Slow), settings).await;
        let path = orch.queue().enqueue_named("a.txt", "hello").await.unwrap();

        let err = orch.poll_once().await.unwrap_err();
        assert!(matches!(
            err.error,
            StageError::Timeout {
                stage: Stage::Generate,
                ..
            }
        ));
        assert_eq!(err.job, Some(JobId::new("a.txt")));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_failure_counter_resets_on_edit() {
        let settings = OrchestratorSettings {
            stage_timeout: Duration::from_millis(20),
            ..quick_settings(Duration::from_millis(10))
        };
        let (mut orch, _temp) = orchestrator(Arc::new(Slow), settings).await;
        let path = orch.queue().enqueue_named("a.txt", "v1").await.unwrap();

        assert_eq!(orch.poll_once().await.unwrap_err().attempts, 1);
        assert_eq!(orch.poll_once().await.unwrap_err().attempts, 2);

        tokio::fs::write(&path, "v2").await.unwrap();
        assert_eq!(orch.poll_once().await.unwrap_err().attempts, 1);
    }

    #[tokio::test]
    async fn test_unreadable_file_keeps_failure_count() {
        let settings = OrchestratorSettings {
            stage_timeout: Duration::from_millis(20),
            ..quick_settings(Duration::from_millis(10))
        };
        let (mut orch, _temp) = orchestrator(Arc::new(Slow), settings).await;
        let path = orch.queue().pending_dir().join("a.txt");

        tokio::fs::write(&path, [0xff, 0xfe, 0x00]).await.unwrap();
        let err = orch.poll_once().await.unwrap_err();
        assert_eq!(err.error.stage(), Stage::Load);
        assert_eq!(err.attempts, 1);

        // Readable now, but still failing further down the pipeline
        tokio::fs::write(&path, "hello").await.unwrap();
        let err = orch.poll_once().await.unwrap_err();
        assert_eq!(err.error.stage(), Stage::Generate);
        assert_eq!(err.attempts, 2);

        let err = orch.poll_once().await.unwrap_err();
        assert_eq!(err.attempts, 3);
    }

    #[tokio::test]
    async fn test_run_until_stops_on_shutdown() {
        let (mut orch, _temp) =
            orchestrator(Arc::new(Fixed), quick_settings(Duration::from_millis(5))).await;

        let stats = orch
            .run_until(tokio::time::sleep(Duration::from_millis(60)))
            .await;

        assert!(stats.polls >= 2);
        assert_eq!(stats.archived, 0);
    }
}
