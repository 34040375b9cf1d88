//! Jobs, their tasks, and how their artifacts are named and published.

pub mod layout;
pub mod manifest;
mod model;
mod registry;
mod request;
mod result;
mod types;

pub use layout::StorageLayout;
pub use model::{Job, JobError};
pub use registry::JobRegistry;
pub use request::{
    JobRequest, MultipassRequest, RawJobRequest, RequestError, SegmentMode, TaskRequest,
    VideoSource,
};
pub use result::TranscodeResult;
pub use types::{JobStatus, JobSummary, TaskStatus, TaskSummary};
