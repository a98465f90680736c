//! Orchestrator Integration Tests
//!
//! Drives the polling loop against a temporary queue directory with
//! recording fakes in place of the model-backed collaborators.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use async_trait::async_trait;
use tempfile::TempDir;
use tokio::fs;

use empath::adapters::{EmotionClassifier, FileSink, OutputSink, ResponseGenerator};
use empath::config::OrchestratorSettings;
use empath::domain::{EmotionData, JobId, JobOutcome, PipelineResult, PollOutcome};
use empath::{JobQueue, Orchestrator, Stage};

/// Shared call log, in call order
type CallLog = Arc<Mutex<Vec<String>>>;

struct RecordingClassifier {
    calls: CallLog,
    label: &'static str,
    /// Number of calls that fail before it starts answering
    failures_left: Mutex<u32>,
}

#[async_trait]
impl EmotionClassifier for RecordingClassifier {
    fn name(&self) -> &str {
        "recording"
    }

    async fn predict(&self, text: &str) -> Result<EmotionData> {
        self.calls.lock().unwrap().push(format!("classify:{}", text));

        let mut left = self.failures_left.lock().unwrap();
        if *left > 0 {
            *left -= 1;
            bail!("classifier unavailable");
        }
        Ok(EmotionData::from_label(self.label))
    }
}

struct RecordingGenerator {
    calls: CallLog,
    response: &'static str,
}

#[async_trait]
impl ResponseGenerator for RecordingGenerator {
    fn name(&self) -> &str {
        "recording"
    }

    async fn generate(&self, original_text: &str, emotion: &EmotionData) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("generate:{}:{}", original_text, emotion.label()));
        Ok(self.response.to_string())
    }
}

struct RecordingSink {
    calls: CallLog,
    fail: bool,
}

#[async_trait]
impl OutputSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn emit(&self, job: &JobId, result: &PipelineResult) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("emit:{}:{}", job, result));
        if self.fail {
            bail!("output device unavailable");
        }
        Ok(())
    }
}

struct Harness {
    _temp: TempDir,
    orchestrator: Orchestrator,
    calls: CallLog,
}

impl Harness {
    fn pending(&self) -> &Path {
        self.orchestrator.queue().pending_dir()
    }

    fn archive(&self) -> &Path {
        self.orchestrator.queue().archive_dir()
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

fn settings() -> OrchestratorSettings {
    OrchestratorSettings {
        poll_interval: Duration::from_millis(20),
        error_cooldown: Duration::from_millis(20),
        stage_timeout: Duration::from_secs(5),
        max_attempts: None,
        watch: false,
    }
}

async fn harness(classifier_failures: u32, settings: OrchestratorSettings) -> Harness {
    harness_with_sink(classifier_failures, settings, false).await
}

async fn harness_with_sink(
    classifier_failures: u32,
    settings: OrchestratorSettings,
    sink_fails: bool,
) -> Harness {
    let temp = TempDir::new().unwrap();
    let pending = temp.path().join("stage1_transcriptions");
    let queue = JobQueue::open(&pending, pending.join("archive"), "*.txt")
        .await
        .unwrap();

    let calls: CallLog = Arc::new(Mutex::new(Vec::new()));

    let orchestrator = Orchestrator::new(
        queue,
        Arc::new(RecordingClassifier {
            calls: calls.clone(),
            label: "anxious",
            failures_left: Mutex::new(classifier_failures),
        }),
        Arc::new(RecordingGenerator {
            calls: calls.clone(),
            response: "Here is some support...",
        }),
        Arc::new(RecordingSink {
            calls: calls.clone(),
            fail: sink_fails,
        }),
        settings,
    );

    Harness {
        _temp: temp,
        orchestrator,
        calls,
    }
}

#[tokio::test]
async fn test_job_runs_through_all_stages() {
    let mut h = harness(0, settings()).await;
    fs::write(h.pending().join("a.txt"), "I feel overwhelmed today.")
        .await
        .unwrap();

    let outcome = h.orchestrator.poll_once().await.unwrap();

    match outcome {
        PollOutcome::Finished { job, outcome } => {
            assert_eq!(job.as_str(), "a.txt");
            match outcome {
                JobOutcome::Archived(result) => {
                    assert_eq!(result.as_str(), "Here is some support...")
                }
                other => panic!("unexpected outcome: {:?}", other),
            }
        }
        other => panic!("unexpected poll outcome: {:?}", other),
    }

    assert_eq!(
        h.calls(),
        vec![
            "classify:I feel overwhelmed today.",
            "generate:I feel overwhelmed today.:anxious",
            "emit:a.txt:Here is some support...",
        ]
    );
    assert!(!h.pending().join("a.txt").exists());
    assert!(h.archive().join("a.txt").exists());
}

#[tokio::test]
async fn test_archived_file_is_byte_identical() {
    let mut h = harness(0, settings()).await;
    let content = "Line one.\r\n  trailing spaces  \n\tünïcödé\n";
    fs::write(h.pending().join("raw.txt"), content).await.unwrap();

    h.orchestrator.poll_once().await.unwrap();

    let archived = fs::read(h.archive().join("raw.txt")).await.unwrap();
    assert_eq!(archived, content.as_bytes());
}

#[tokio::test]
async fn test_whitespace_only_file_is_archived_without_calls() {
    let mut h = harness(0, settings()).await;
    fs::write(h.pending().join("b.txt"), "   \n  ").await.unwrap();

    let outcome = h.orchestrator.poll_once().await.unwrap();

    assert!(matches!(
        outcome,
        PollOutcome::Finished {
            outcome: JobOutcome::SkippedEmpty,
            ..
        }
    ));
    assert!(h.calls().is_empty());
    assert!(!h.pending().join("b.txt").exists());
    assert_eq!(
        fs::read_to_string(h.archive().join("b.txt")).await.unwrap(),
        "   \n  "
    );
    assert_eq!(h.orchestrator.stats().skipped_empty, 1);
}

#[tokio::test]
async fn test_classifier_failure_leaves_job_pending_then_retries() {
    let mut h = harness(1, settings()).await;
    fs::write(h.pending().join("a.txt"), "I feel overwhelmed today.")
        .await
        .unwrap();

    let err = h.orchestrator.poll_once().await.unwrap_err();
    assert_eq!(err.job.as_ref().map(|j| j.as_str()), Some("a.txt"));
    assert_eq!(err.error.stage(), Stage::Classify);
    assert_eq!(err.attempts, 1);

    // Nothing generated, nothing emitted, file untouched
    assert_eq!(h.calls(), vec!["classify:I feel overwhelmed today."]);
    assert!(h.pending().join("a.txt").exists());
    assert!(!h.archive().join("a.txt").exists());

    // Next poll picks the same file up again
    h.orchestrator.poll_once().await.unwrap();

    assert_eq!(
        h.calls(),
        vec![
            "classify:I feel overwhelmed today.",
            "classify:I feel overwhelmed today.",
            "generate:I feel overwhelmed today.:anxious",
            "emit:a.txt:Here is some support...",
        ]
    );
    assert!(h.archive().join("a.txt").exists());
}

#[tokio::test]
async fn test_jobs_never_interleave() {
    let mut h = harness(0, settings()).await;
    fs::write(h.pending().join("one.txt"), "first").await.unwrap();
    fs::write(h.pending().join("two.txt"), "second").await.unwrap();

    h.orchestrator.poll_once().await.unwrap();
    h.orchestrator.poll_once().await.unwrap();

    assert_eq!(
        h.calls(),
        vec![
            "classify:first",
            "generate:first:anxious",
            "emit:one.txt:Here is some support...",
            "classify:second",
            "generate:second:anxious",
            "emit:two.txt:Here is some support...",
        ]
    );
}

#[tokio::test]
async fn test_empty_queue_is_idle() {
    let mut h = harness(0, settings()).await;

    for _ in 0..3 {
        let outcome = h.orchestrator.poll_once().await.unwrap();
        assert!(matches!(outcome, PollOutcome::Idle));
    }

    assert!(h.calls().is_empty());
    let mut archived = fs::read_dir(h.archive()).await.unwrap();
    assert!(archived.next_entry().await.unwrap().is_none());
    assert_eq!(h.orchestrator.stats().polls, 3);
}

#[tokio::test]
async fn test_non_matching_files_are_ignored() {
    let mut h = harness(0, settings()).await;
    fs::write(h.pending().join("notes.md"), "not a job").await.unwrap();
    fs::write(h.pending().join(".c.txt.part"), "half written")
        .await
        .unwrap();

    let outcome = h.orchestrator.poll_once().await.unwrap();

    assert!(matches!(outcome, PollOutcome::Idle));
    assert!(h.calls().is_empty());
    assert!(h.pending().join("notes.md").exists());
    assert!(h.pending().join(".c.txt.part").exists());
}

#[tokio::test]
async fn test_dead_letter_after_max_attempts() {
    let mut h = harness(
        u32::MAX,
        OrchestratorSettings {
            max_attempts: Some(2),
            ..settings()
        },
    )
    .await;
    fs::write(h.pending().join("bad.txt"), "still failing")
        .await
        .unwrap();

    assert!(h.orchestrator.poll_once().await.is_err());
    assert!(h.pending().join("bad.txt").exists());

    let outcome = h.orchestrator.poll_once().await.unwrap();
    assert!(matches!(
        outcome,
        PollOutcome::Finished {
            outcome: JobOutcome::DeadLettered { attempts: 2 },
            ..
        }
    ));

    let dead_letter = h.orchestrator.queue().dead_letter_dir().to_path_buf();
    assert!(!h.pending().join("bad.txt").exists());
    assert!(!h.archive().join("bad.txt").exists());
    assert_eq!(
        fs::read_to_string(dead_letter.join("bad.txt")).await.unwrap(),
        "still failing"
    );

    // The queue is clear again
    assert!(matches!(
        h.orchestrator.poll_once().await.unwrap(),
        PollOutcome::Idle
    ));
    assert_eq!(h.orchestrator.stats().dead_lettered, 1);
}

#[tokio::test]
async fn test_run_until_drains_queue_then_stops() {
    let mut h = harness(0, settings()).await;
    for name in ["a.txt", "b.txt", "c.txt"] {
        fs::write(h.pending().join(name), format!("text {}", name))
            .await
            .unwrap();
    }

    let stats = h
        .orchestrator
        .run_until(tokio::time::sleep(Duration::from_millis(300)))
        .await;

    assert_eq!(stats.archived, 3);
    assert_eq!(stats.failed, 0);
    for name in ["a.txt", "b.txt", "c.txt"] {
        assert!(h.archive().join(name).exists());
    }
}

#[tokio::test]
async fn test_file_sink_receives_response() {
    let temp = TempDir::new().unwrap();
    let pending = temp.path().join("pending");
    let log = temp.path().join("responses.log");
    let queue = JobQueue::open(&pending, pending.join("archive"), "*.txt")
        .await
        .unwrap();
    let calls: CallLog = Arc::new(Mutex::new(Vec::new()));

    let mut orchestrator = Orchestrator::new(
        queue,
        Arc::new(RecordingClassifier {
            calls: calls.clone(),
            label: "sad",
            failures_left: Mutex::new(0),
        }),
        Arc::new(RecordingGenerator {
            calls: calls.clone(),
            response: "You are not alone.",
        }),
        Arc::new(FileSink::new(&log)),
        settings(),
    );

    fs::write(pending.join("x.txt"), "I miss home.").await.unwrap();
    orchestrator.poll_once().await.unwrap();

    let written = fs::read_to_string(&log).await.unwrap();
    assert!(written.contains("x.txt"));
    assert!(written.contains("You are not alone."));
}

#[tokio::test]
async fn test_run_until_survives_failures_with_cooldown() {
    let cooldown = Duration::from_millis(200);
    let mut h = harness(
        u32::MAX,
        OrchestratorSettings {
            error_cooldown: cooldown,
            ..settings()
        },
    )
    .await;
    fs::write(h.pending().join("a.txt"), "I feel overwhelmed today.")
        .await
        .unwrap();

    let started = Instant::now();
    let stats = h
        .orchestrator
        .run_until(tokio::time::sleep(Duration::from_millis(700)))
        .await;
    let elapsed = started.elapsed();

    // One attempt right away, then one per cooldown
    let expected = (elapsed.as_millis() / cooldown.as_millis()) as u64 + 1;
    assert!(
        stats.failed.abs_diff(expected) <= 1,
        "failed {} times in {:?}, expected about {}",
        stats.failed,
        elapsed,
        expected
    );
    assert_eq!(stats.archived, 0);
    assert!(h.pending().join("a.txt").exists());
    assert!(!h.archive().join("a.txt").exists());
    assert!(h.calls().iter().all(|c| c.starts_with("classify:")));
}

#[tokio::test]
async fn test_idle_loop_polls_at_interval() {
    let interval = Duration::from_millis(100);
    let mut h = harness(
        0,
        OrchestratorSettings {
            poll_interval: interval,
            ..settings()
        },
    )
    .await;

    let started = Instant::now();
    let stats = h
        .orchestrator
        .run_until(tokio::time::sleep(Duration::from_millis(450)))
        .await;
    let elapsed = started.elapsed();

    let expected = (elapsed.as_millis() / interval.as_millis()) as u64 + 1;
    assert!(
        stats.polls.abs_diff(expected) <= 1,
        "{} polls in {:?}, expected about {}",
        stats.polls,
        elapsed,
        expected
    );
    assert!(h.calls().is_empty());
}

#[tokio::test]
async fn test_failed_emit_does_not_archive() {
    let mut h = harness_with_sink(0, settings(), true).await;
    fs::write(h.pending().join("a.txt"), "I feel overwhelmed today.")
        .await
        .unwrap();

    let err = h.orchestrator.poll_once().await.unwrap_err();

    assert_eq!(err.error.stage(), Stage::Emit);
    assert_eq!(
        h.calls(),
        vec![
            "classify:I feel overwhelmed today.",
            "generate:I feel overwhelmed today.:anxious",
            "emit:a.txt:Here is some support...",
        ]
    );
    assert!(h.pending().join("a.txt").exists());
    assert!(!h.archive().join("a.txt").exists());
}
