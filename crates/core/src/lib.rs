//! Video transcoding job engine.
//!
//! A job owns one source video and any number of transcode tasks. Its stages
//! (download/probe, thumbnails, optional first pass, transcode, optional
//! segmenting) run on a shared [`pool::WorkerPool`]; a per-job
//! [`pool::TaskSet`] reports back to the job when everything enqueued so far
//! has finished. The [`reaper::Reaper`] expires what callers leave behind.

pub mod callback;
pub mod config;
pub mod context;
pub mod engine;
pub mod job;
pub mod media;
pub mod metrics;
pub mod pool;
pub mod reaper;
pub mod stages;
pub mod stats;
pub mod testing;

pub use callback::{CallbackError, CallbackNotifier, HttpCallbackNotifier};
pub use config::{
    load_config, load_config_from_str, validate_config, CallbackConfig, Config, ConfigError,
    EngineConfig, MediaConfig, PublishMode, ReaperConfig, SanitizedConfig, ServerConfig,
    StorageConfig, WaitStrategy,
};
pub use context::EngineContext;
pub use engine::{EngineError, Submission, TranscodeEngine};
pub use job::{
    Job, JobError, JobRegistry, JobRequest, JobStatus, JobSummary, RawJobRequest, RequestError,
    StorageLayout, TaskStatus, TaskSummary, TranscodeResult, VideoSource,
};
pub use media::{FfmpegTool, MediaError, MediaListing, MediaTool, ProbeInfo, ToolOutput};
pub use pool::{PoolError, PoolStatus, WorkerPool};
pub use reaper::{Reaper, SweepReport};
pub use stats::{EngineStats, StatsSnapshot};
