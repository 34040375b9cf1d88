//! File naming and public URL rules for job artifacts.

use std::path::{Path, PathBuf};

use crate::config::{PublishMode, StorageConfig};

/// Name of the per-job adaptive manifest.
pub const ADAPTIVE_MANIFEST: &str = "adaptive.m3u8";
/// Route prefix the server uses for outputs in local mode.
pub const LOCAL_VIDEO_ROUTE: &str = "/videos";
/// Route prefix the server uses for thumbnails in local mode.
pub const LOCAL_THUMB_ROUTE: &str = "/thumbs";
/// Upper bound on extracted thumbnails.
pub const MAX_THUMBNAILS: usize = 5;

/// Encode output, e.g. `job_task.mp4`.
pub fn output_name(job_id: &str, task_id: &str, extension: &str) -> String {
    format!("{}_{}.{}", job_id, task_id, extension)
}

/// Segment manifest written next to an encode output.
pub fn segment_manifest_name(output_name: &str) -> String {
    format!("{}.m3u8", output_name)
}

/// Chunk filename pattern handed to the segmenter.
pub fn segment_pattern(job_id: &str, task_id: &str) -> String {
    format!("{}_{}_%03d.ts", job_id, task_id)
}

/// Thumbnail filename pattern handed to the encoder.
pub fn thumbnail_pattern(job_id: &str) -> String {
    format!("thumbnail-{}_%04d.jpg", job_id)
}

/// The `index`-th (1-based) thumbnail file.
pub fn thumbnail_name(job_id: &str, index: usize) -> String {
    format!("thumbnail-{}_{:04}.jpg", job_id, index)
}

/// Destination of a remotely fetched source.
pub fn remote_download_name(job_id: &str) -> String {
    format!("{}.vod", job_id)
}

/// Output of the analysis pass for `source`.
pub fn first_pass_output_name(source: &str, extension: &str) -> String {
    format!("fastpass_{}.{}", source, extension)
}

/// Directory roots and URL bases for job artifacts.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    config: StorageConfig,
}

impl StorageLayout {
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    pub fn mode(&self) -> PublishMode {
        self.config.mode
    }

    pub fn working_root(&self) -> &Path {
        &self.config.working_dir
    }

    /// Private working directory of a job.
    pub fn job_dir(&self, job_id: &str) -> PathBuf {
        self.config.working_dir.join(job_id)
    }

    /// Public output directory of a job (move mode).
    pub fn public_video_dir(&self, job_id: &str) -> PathBuf {
        self.config
            .file_root
            .join(&self.config.video_destination)
            .join(job_id)
    }

    /// Public thumbnail directory of a job (move mode).
    pub fn public_thumb_dir(&self, job_id: &str) -> PathBuf {
        self.config
            .file_root
            .join(&self.config.thumb_destination)
            .join(job_id)
    }

    /// Directory finished outputs are served from.
    pub fn video_publish_dir(&self, job_id: &str) -> PathBuf {
        match self.config.mode {
            PublishMode::Local => self.job_dir(job_id),
            PublishMode::Move => self.public_video_dir(job_id),
        }
    }

    /// Directory thumbnails are served from.
    pub fn thumb_publish_dir(&self, job_id: &str) -> PathBuf {
        match self.config.mode {
            PublishMode::Local => self.job_dir(job_id),
            PublishMode::Move => self.public_thumb_dir(job_id),
        }
    }

    pub fn video_url(&self, job_id: &str, file: &str) -> String {
        match self.config.mode {
            PublishMode::Local => format!("{}/{}/{}", LOCAL_VIDEO_ROUTE, job_id, file),
            PublishMode::Move => self.public_url(&self.config.video_destination, job_id, file),
        }
    }

    pub fn thumb_url(&self, job_id: &str, file: &str) -> String {
        match self.config.mode {
            PublishMode::Local => format!("{}/{}/{}", LOCAL_THUMB_ROUTE, job_id, file),
            PublishMode::Move => self.public_url(&self.config.thumb_destination, job_id, file),
        }
    }

    pub fn adaptive_url(&self, job_id: &str) -> String {
        self.video_url(job_id, ADAPTIVE_MANIFEST)
    }

    fn public_url(&self, destination: &str, job_id: &str, file: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.config.serve_url.trim_end_matches('/'),
            destination.trim_matches('/'),
            job_id,
            file
        )
    }
}
