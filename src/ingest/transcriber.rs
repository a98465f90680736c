//! Whisper transcription producer.
//!
//! Shells out to a local whisper binary and drops the transcript into the
//! pending directory as a new job. The model name and binary path come from
//! configuration; nothing is loaded into process-wide state.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::process::Command;

use super::queue::JobQueue;
use crate::config::TranscriberSettings;

/// Result of transcription
#[derive(Debug, Clone)]
pub struct TranscriptResult {
    pub text: String,
    pub language: String,
    pub duration_seconds: f64,
}

/// Whisper output JSON structure
#[derive(Debug, Deserialize)]
struct WhisperOutput {
    text: String,
    #[serde(default)]
    language: String,
    #[serde(default)]
    segments: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    #[serde(default)]
    end: f64,
}

/// Transcribe audio using the configured whisper binary
pub async fn transcribe(audio_path: &Path, settings: &TranscriberSettings) -> Result<TranscriptResult> {
    if !audio_path.is_file() {
        anyhow::bail!("Audio file not found: {}", audio_path.display());
    }

    // Create temp dir for output
    let temp_dir = tempfile::tempdir().context("Failed to create temp dir")?;

    let output = Command::new(&settings.whisper_path)
        .arg(audio_path)
        .arg("--model")
        .arg(&settings.model)
        .arg("--output_dir")
        .arg(temp_dir.path())
        .arg("--output_format")
        .arg("json")
        .arg("--fp16")
        .arg("False")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .with_context(|| format!("Failed to run whisper ({})", settings.whisper_path))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("Whisper failed: {}", stderr.trim());
    }

    // Find and parse JSON output
    let stem = audio_path.file_stem().unwrap_or_default().to_string_lossy();
    let json_path = temp_dir.path().join(format!("{}.json", stem));

    let json_content = tokio::fs::read_to_string(&json_path)
        .await
        .context("Failed to read whisper output")?;

    parse_whisper_output(&json_content)
}

fn parse_whisper_output(json_content: &str) -> Result<TranscriptResult> {
    let whisper: WhisperOutput =
        serde_json::from_str(json_content).context("Failed to parse whisper JSON")?;

    let duration = whisper.segments.last().map(|s| s.end).unwrap_or(0.0);

    Ok(TranscriptResult {
        text: whisper.text.trim().to_string(),
        language: if whisper.language.is_empty() {
            "en".to_string()
        } else {
            whisper.language
        },
        duration_seconds: duration,
    })
}

/// Transcribe audio and enqueue the transcript as a new job
///
/// Returns the path of the job file written into the pending directory.
pub async fn transcribe_to_queue(
    audio_path: &Path,
    settings: &TranscriberSettings,
    queue: &JobQueue,
) -> Result<(TranscriptResult, PathBuf)> {
    let transcript = transcribe(audio_path, settings).await?;

    let job_path = queue
        .enqueue_text(&transcript.text)
        .await
        .context("Failed to write transcript into the pending directory")?;

    tracing::info!(
        audio = %audio_path.display(),
        job = %job_path.display(),
        duration_s = transcript.duration_seconds,
        "Transcript queued"
    );

    Ok((transcript, job_path))
}
