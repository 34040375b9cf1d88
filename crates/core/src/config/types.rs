use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub reaper: ReaperConfig,
    #[serde(default)]
    pub callback: CallbackConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_port() -> u16 {
    8080
}

/// How idle workers wait for new work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitStrategy {
    /// Spin with cooperative yields. Lowest latency, burns CPU.
    Aggressive,
    /// Short sleeps with exponential backoff.
    #[default]
    Moderate,
    /// Park until woken by a submission.
    Blocking,
}

/// Worker pool configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Number of stages that may run concurrently.
    #[serde(default = "default_max_tasks")]
    pub max_tasks: usize,
    #[serde(default)]
    pub wait_strategy: WaitStrategy,
    /// How long shutdown waits for in-flight stages.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_tasks: default_max_tasks(),
            wait_strategy: WaitStrategy::default(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl EngineConfig {
    pub fn with_max_tasks(mut self, max_tasks: usize) -> Self {
        self.max_tasks = max_tasks;
        self
    }

    pub fn with_wait_strategy(mut self, strategy: WaitStrategy) -> Self {
        self.wait_strategy = strategy;
        self
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

fn default_max_tasks() -> usize {
    4
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

/// Where finished outputs are served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishMode {
    /// Outputs stay in the job working directory and are served by this process.
    #[default]
    Local,
    /// Outputs are moved under `file_root` and served from `serve_url`.
    Move,
}

/// Filesystem layout configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Root for per-job working directories.
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,
    /// Root of the public tree used in move mode.
    #[serde(default = "default_file_root")]
    pub file_root: PathBuf,
    #[serde(default = "default_thumb_destination")]
    pub thumb_destination: String,
    #[serde(default = "default_video_destination")]
    pub video_destination: String,
    /// Base URL of `file_root` when published.
    #[serde(default)]
    pub serve_url: String,
    #[serde(default)]
    pub mode: PublishMode,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            working_dir: default_working_dir(),
            file_root: default_file_root(),
            thumb_destination: default_thumb_destination(),
            video_destination: default_video_destination(),
            serve_url: String::new(),
            mode: PublishMode::default(),
        }
    }
}

impl StorageConfig {
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn with_file_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.file_root = dir.into();
        self
    }

    pub fn with_mode(mut self, mode: PublishMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_serve_url(mut self, url: impl Into<String>) -> Self {
        self.serve_url = url.into();
        self
    }
}

fn default_working_dir() -> PathBuf {
    PathBuf::from("./work")
}

fn default_file_root() -> PathBuf {
    PathBuf::from("./public")
}

fn default_thumb_destination() -> String {
    "thumbs".to_string()
}

fn default_video_destination() -> String {
    "videos".to_string()
}

/// External media tool configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MediaConfig {
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: PathBuf,
    /// Upper bound for a single tool invocation.
    #[serde(default = "default_media_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            timeout_secs: default_media_timeout_secs(),
        }
    }
}

impl MediaConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe_path() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_media_timeout_secs() -> u64 {
    6 * 60 * 60
}

/// Periodic job expiration sweep
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReaperConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_reaper_interval_secs")]
    pub interval_secs: u64,
    /// Delay before the first sweep.
    #[serde(default = "default_reaper_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Age after which any job may expire.
    #[serde(default = "default_expire_after_hours")]
    pub expire_after_hours: u64,
    /// Age after which a cleaned job is dropped from the registry.
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,
    /// Age after which a waiting job is forced complete.
    #[serde(default = "default_waiting_timeout_hours")]
    pub waiting_timeout_hours: u64,
    #[serde(default = "default_shutdown_poll_attempts")]
    pub shutdown_poll_attempts: u32,
    #[serde(default = "default_shutdown_poll_interval_ms")]
    pub shutdown_poll_interval_ms: u64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_reaper_interval_secs(),
            initial_delay_ms: default_reaper_initial_delay_ms(),
            expire_after_hours: default_expire_after_hours(),
            retention_days: default_retention_days(),
            waiting_timeout_hours: default_waiting_timeout_hours(),
            shutdown_poll_attempts: default_shutdown_poll_attempts(),
            shutdown_poll_interval_ms: default_shutdown_poll_interval_ms(),
        }
    }
}

impl ReaperConfig {
    pub fn with_interval_secs(mut self, secs: u64) -> Self {
        self.interval_secs = secs;
        self
    }

    pub fn with_initial_delay_ms(mut self, ms: u64) -> Self {
        self.initial_delay_ms = ms;
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn expire_after(&self) -> chrono::Duration {
        chrono::Duration::hours(self.expire_after_hours as i64)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.retention_days as i64)
    }

    pub fn waiting_timeout(&self) -> chrono::Duration {
        chrono::Duration::hours(self.waiting_timeout_hours as i64)
    }
}

fn default_true() -> bool {
    true
}

fn default_reaper_interval_secs() -> u64 {
    300
}

fn default_reaper_initial_delay_ms() -> u64 {
    100
}

fn default_expire_after_hours() -> u64 {
    24
}

fn default_retention_days() -> u64 {
    30
}

fn default_waiting_timeout_hours() -> u64 {
    10
}

fn default_shutdown_poll_attempts() -> u32 {
    20
}

fn default_shutdown_poll_interval_ms() -> u64 {
    15
}

/// Outbound callback delivery
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CallbackConfig {
    #[serde(default = "default_callback_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_callback_timeout_secs(),
        }
    }
}

impl CallbackConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_callback_timeout_secs() -> u64 {
    30
}

/// Sanitized config for API responses (filesystem roots hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub engine: EngineConfig,
    pub storage: SanitizedStorageConfig,
    pub reaper: ReaperConfig,
    pub media_timeout_secs: u64,
    pub callback: CallbackConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedStorageConfig {
    pub mode: PublishMode,
    pub thumb_destination: String,
    pub video_destination: String,
    pub serve_url_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            engine: config.engine.clone(),
            storage: SanitizedStorageConfig {
                mode: config.storage.mode,
                thumb_destination: config.storage.thumb_destination.clone(),
                video_destination: config.storage.video_destination.clone(),
                serve_url_configured: !config.storage.serve_url.is_empty(),
            },
            reaper: config.reaper.clone(),
            media_timeout_secs: config.media.timeout_secs,
            callback: config.callback.clone(),
        }
    }
}
