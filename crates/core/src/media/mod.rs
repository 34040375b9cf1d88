//! External media tool adapter.
//!
//! The encoder and prober are opaque subprocesses: they get an argument
//! vector and hand back an exit code plus combined output text. This module
//! owns the process plumbing and the small text formats around it (probe
//! JSON, encoding-argument templates, progress lines).

pub mod args;
mod error;
mod ffmpeg;
mod listing;
pub mod probe;
pub mod progress;
mod traits;

pub use error::MediaError;
pub use ffmpeg::FfmpegTool;
pub use listing::MediaListing;
pub use probe::{FormatInfo, ProbeInfo, StreamInfo};
pub use traits::{MediaTool, ToolOutput};
