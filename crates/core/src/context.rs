//! Shared collaborators handed to every job.

use std::sync::Arc;

use crate::callback::CallbackNotifier;
use crate::config::ReaperConfig;
use crate::job::StorageLayout;
use crate::media::MediaTool;
use crate::pool::WorkerPool;
use crate::stats::EngineStats;

/// Everything a job and its stages need from the engine.
///
/// Built once at startup and passed down; there is no process-wide state.
pub struct EngineContext {
    pub layout: StorageLayout,
    pub media: Arc<dyn MediaTool>,
    pub notifier: Arc<dyn CallbackNotifier>,
    pub pool: Arc<WorkerPool>,
    pub stats: Arc<EngineStats>,
    /// Client used to fetch remote sources.
    pub http: reqwest::Client,
    /// Expiry thresholds a job consults for `can_expire`.
    pub expiry: ReaperConfig,
}
