//! Output sinks for final responses.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::OutputSink;
use crate::domain::{JobId, PipelineResult};

const RULE: &str = "========================================";

/// Prints each response to stdout between banners
#[derive(Debug, Default)]
pub struct ConsoleSink;

#[async_trait]
impl OutputSink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    async fn emit(&self, job: &JobId, result: &PipelineResult) -> Result<()> {
        println!();
        println!("{}", RULE);
        println!("FINAL RESPONSE ({})", job);
        println!("{}", result);
        println!("{}", RULE);
        println!();
        Ok(())
    }
}

/// Appends each response to a log file
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// One human-readable record per response
fn format_record(job: &JobId, result: &PipelineResult) -> String {
    format!(
        "{}\n[{}] {}\n\n{}\n\n",
        RULE,
        Utc::now().to_rfc3339(),
        job,
        result.as_str().trim_end()
    )
}

#[async_trait]
impl OutputSink for FileSink {
    fn name(&self) -> &str {
        "file"
    }

    async fn emit(&self, job: &JobId, result: &PipelineResult) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create responses directory: {}", parent.display())
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open responses log: {}", self.path.display()))?;

        file.write_all(format_record(job, result).as_bytes())
            .await
            .context("Failed to write response")?;
        file.sync_data().await.context("Failed to flush response")?;

        Ok(())
    }
}
