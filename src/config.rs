//! Configuration for the empath orchestrator.
//!
//! Configuration sources (highest priority first):
//! 1. CLI flags (applied by the caller on top of the resolved config)
//! 2. Environment variables (EMPATH_PENDING_DIR, EMPATH_CLASSIFIER_URL, ...)
//! 3. Config file (.empath/config.yaml)
//! 4. Defaults (./pipeline_io/stage1_transcriptions, 2s poll, 5s cooldown)
//!
//! Config file discovery:
//! - Searches current directory and parents for .empath/config.yaml
//! - Paths in config file are relative to the project root (parent of .empath/)
//!
//! The resolved config is built once at startup and handed to constructors
//! explicitly; nothing reads it from a global afterwards.

pub mod paths;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

const DEFAULT_PENDING_DIR: &str = "pipeline_io/stage1_transcriptions";
const DEFAULT_JOB_PATTERN: &str = "*.txt";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;
const DEFAULT_ERROR_COOLDOWN_SECS: u64 = 5;
const DEFAULT_STAGE_TIMEOUT_SECS: u64 = 120;
const DEFAULT_CLASSIFIER_URL: &str = "http://127.0.0.1:8001/predict";
const DEFAULT_RETRIEVAL_URL: &str = "http://127.0.0.1:8002/query";
const DEFAULT_COLLECTION: &str = "therapeutic_knowledge_base";
const DEFAULT_N_RESULTS: usize = 10;
const DEFAULT_LLM_MODEL: &str = "gemini-2.5-pro";
const DEFAULT_WHISPER_MODEL: &str = "base";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub classifier: Option<ClassifierConfig>,
    #[serde(default)]
    pub generator: Option<GeneratorConfig>,
    #[serde(default)]
    pub transcriber: Option<TranscriberConfig>,
    #[serde(default)]
    pub output: Option<OutputConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueueConfig {
    /// Pending directory (relative to project root)
    pub pending_dir: Option<String>,
    /// Archive directory (defaults to <pending_dir>/archive)
    pub archive_dir: Option<String>,
    /// File name pattern for jobs
    pub pattern: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrchestratorConfig {
    pub poll_interval_secs: Option<u64>,
    pub error_cooldown_secs: Option<u64>,
    pub stage_timeout_secs: Option<u64>,
    /// Move a job to the dead-letter dir after this many failures
    pub max_attempts: Option<u32>,
    /// Wake the idle wait on filesystem notifications
    pub watch: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorConfig {
    pub retrieval_url: Option<String>,
    pub collection: Option<String>,
    pub n_results: Option<usize>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranscriberConfig {
    pub whisper_path: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    pub sink: Option<SinkKind>,
    /// Responses log for the file sink (relative to project root)
    pub path: Option<String>,
}

/// Where final responses go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Console,
    File,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Directory producers write job files into
    pub pending_dir: PathBuf,
    /// Where successfully processed files end up
    pub archive_dir: PathBuf,
    /// Glob pattern job file names must match
    pub job_pattern: String,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Loop timing and failure policy
    pub orchestrator: OrchestratorSettings,
    /// Emotion classifier endpoint
    pub classifier_url: String,
    /// Retrieval and generation settings
    pub generator: GeneratorSettings,
    /// Upstream transcription settings
    pub transcriber: TranscriberSettings,
    /// Output sink selection
    pub sink: SinkKind,
    /// Responses log used by the file sink
    pub responses_log: PathBuf,
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub poll_interval: Duration,
    pub error_cooldown: Duration,
    pub stage_timeout: Duration,
    pub max_attempts: Option<u32>,
    pub watch: bool,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            error_cooldown: Duration::from_secs(DEFAULT_ERROR_COOLDOWN_SECS),
            stage_timeout: Duration::from_secs(DEFAULT_STAGE_TIMEOUT_SECS),
            max_attempts: None,
            watch: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub retrieval_url: String,
    pub collection: String,
    pub n_results: usize,
    pub model: String,
    /// API key for the hosted model (GOOGLE_API_KEY); checked when the
    /// generator is built, not at load time
    pub api_key: Option<String>,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            retrieval_url: DEFAULT_RETRIEVAL_URL.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
            n_results: DEFAULT_N_RESULTS,
            model: DEFAULT_LLM_MODEL.to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TranscriberSettings {
    pub whisper_path: String,
    pub model: String,
}

impl Default for TranscriberSettings {
    fn default() -> Self {
        Self {
            whisper_path: "whisper".to_string(),
            model: DEFAULT_WHISPER_MODEL.to_string(),
        }
    }
}

impl ResolvedConfig {
    /// Defaults rooted at `base`, used when no config file exists
    pub fn defaults_at(base: &Path) -> Self {
        let pending_dir = base.join(DEFAULT_PENDING_DIR);
        Self {
            archive_dir: paths::archive_dir(&pending_dir),
            responses_log: paths::default_responses_log(&pending_dir),
            pending_dir,
            job_pattern: DEFAULT_JOB_PATTERN.to_string(),
            config_file: None,
            orchestrator: OrchestratorSettings::default(),
            classifier_url: DEFAULT_CLASSIFIER_URL.to_string(),
            generator: GeneratorSettings::default(),
            transcriber: TranscriberSettings::default(),
            sink: SinkKind::Console,
        }
    }

    /// Point the queue at a different pending dir, keeping the archive
    /// next to it unless one was configured elsewhere
    pub fn set_pending_dir(&mut self, pending_dir: PathBuf) {
        if self.archive_dir == paths::archive_dir(&self.pending_dir) {
            self.archive_dir = paths::archive_dir(&pending_dir);
        }
        if self.responses_log == paths::default_responses_log(&self.pending_dir) {
            self.responses_log = paths::default_responses_log(&pending_dir);
        }
        self.pending_dir = pending_dir;
    }
}

/// Find config file by searching a directory and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(".empath").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

fn parse_config(content: &str) -> Result<ConfigFile> {
    Ok(serde_yaml::from_str(content)?)
}

/// Resolve a path that may be relative to the project root or start with ~/
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    if let Some(rest) = path_str.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }

    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// Read an env var, treating empty values as unset
fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Load configuration from all sources, starting discovery at the current dir
pub fn load_config() -> Result<ResolvedConfig> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    load_config_from(&cwd)
}

/// Load configuration, starting config file discovery at `start`
pub fn load_config_from(start: &Path) -> Result<ResolvedConfig> {
    let config_file = find_config_file(start);

    let (file, base_dir) = match config_file {
        Some(ref config_path) => {
            let file = load_config_file(config_path)?;
            // Base directory is the parent of .empath/ (the project root)
            let base_dir = config_path
                .parent()
                .and_then(|p| p.parent())
                .unwrap_or(start)
                .to_path_buf();
            (file, base_dir)
        }
        None => (ConfigFile::default(), start.to_path_buf()),
    };

    let mut resolved = resolve(file, &base_dir);
    resolved.config_file = config_file;
    apply_env(&mut resolved, start, env_var);

    Ok(resolved)
}

/// Merge a parsed config file over the defaults
fn resolve(file: ConfigFile, base_dir: &Path) -> ResolvedConfig {
    let mut resolved = ResolvedConfig::defaults_at(base_dir);

    if let Some(ref pending) = file.queue.pending_dir {
        resolved.set_pending_dir(resolve_path(base_dir, pending));
    }
    if let Some(ref archive) = file.queue.archive_dir {
        resolved.archive_dir = resolve_path(base_dir, archive);
    }
    if let Some(pattern) = file.queue.pattern {
        resolved.job_pattern = pattern;
    }

    let orch = file.orchestrator;
    let defaults = OrchestratorSettings::default();
    resolved.orchestrator = OrchestratorSettings {
        poll_interval: orch
            .poll_interval_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.poll_interval),
        error_cooldown: orch
            .error_cooldown_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.error_cooldown),
        stage_timeout: orch
            .stage_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.stage_timeout),
        max_attempts: orch.max_attempts.filter(|n| *n > 0),
        watch: orch.watch.unwrap_or(false),
    };

    if let Some(url) = file.classifier.and_then(|c| c.url) {
        resolved.classifier_url = url;
    }

    if let Some(generator) = file.generator {
        let defaults = GeneratorSettings::default();
        resolved.generator = GeneratorSettings {
            retrieval_url: generator.retrieval_url.unwrap_or(defaults.retrieval_url),
            collection: generator.collection.unwrap_or(defaults.collection),
            n_results: generator.n_results.unwrap_or(defaults.n_results),
            model: generator.model.unwrap_or(defaults.model),
            api_key: None,
        };
    }

    if let Some(transcriber) = file.transcriber {
        let defaults = TranscriberSettings::default();
        resolved.transcriber = TranscriberSettings {
            whisper_path: transcriber.whisper_path.unwrap_or(defaults.whisper_path),
            model: transcriber.model.unwrap_or(defaults.model),
        };
    }

    if let Some(output) = file.output {
        if let Some(sink) = output.sink {
            resolved.sink = sink;
        }
        if let Some(ref path) = output.path {
            resolved.responses_log = resolve_path(base_dir, path);
        }
    }

    resolved
}

/// Apply environment overrides
///
/// Relative paths resolve against `cwd`; `~/` is expanded as in the file.
fn apply_env<F>(resolved: &mut ResolvedConfig, cwd: &Path, var: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(pending) = var("EMPATH_PENDING_DIR") {
        resolved.set_pending_dir(resolve_path(cwd, &pending));
    }
    if let Some(archive) = var("EMPATH_ARCHIVE_DIR") {
        resolved.archive_dir = resolve_path(cwd, &archive);
    }
    if let Some(url) = var("EMPATH_CLASSIFIER_URL") {
        resolved.classifier_url = url;
    }
    if let Some(url) = var("EMPATH_RETRIEVAL_URL") {
        resolved.generator.retrieval_url = url;
    }
    if let Some(path) = var("WHISPER_PATH") {
        resolved.transcriber.whisper_path = path;
    }
    resolved.generator.api_key = var("GOOGLE_API_KEY");
}
