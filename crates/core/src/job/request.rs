//! Validated job submission.

use regex_lite::Regex;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;

/// Reasons a submission is rejected before touching any job.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("Missing parameter {0}")]
    Missing(&'static str),

    #[error("{field} contains invalid characters [allowed characters {allowed}]")]
    InvalidCharacters {
        field: &'static str,
        allowed: &'static str,
    },

    #[error("MultiPass enabled but {0} not provided")]
    MultipassIncomplete(&'static str),

    #[error("Invalid segment type {0}, valid types are [hls]")]
    InvalidSegment(String),

    #[error("A video was uploaded but a video url parameter was also provided")]
    ConflictingSource,
}

/// Output packaging after the encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentMode {
    Hls,
}

impl SegmentMode {
    pub fn parse(value: &str) -> Result<Self, RequestError> {
        match value.to_ascii_lowercase().as_str() {
            "hls" => Ok(SegmentMode::Hls),
            _ => Err(RequestError::InvalidSegment(value.to_string())),
        }
    }
}

/// Where the source video comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoSource {
    /// A file already on local disk (e.g. a multipart upload). Moved into the
    /// job working directory under its own file name.
    Staged { path: PathBuf },
    /// A URL fetched into the working directory as `<job>.vod`.
    Remote { url: String },
}

/// Analysis pass requested alongside a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipassRequest {
    pub extension: String,
    pub options: String,
}

/// Raw submission fields before validation.
#[derive(Debug, Clone, Default)]
pub struct RawJobRequest {
    pub job_id: Option<String>,
    pub task_id: Option<String>,
    pub complete: bool,
    pub tag: Option<String>,
    pub video_url: Option<String>,
    pub upload: Option<PathBuf>,
    pub encoding_options: Option<String>,
    pub callback: Option<String>,
    pub extension: Option<String>,
    pub multipass: bool,
    pub multipass_extension: Option<String>,
    pub multipass_options: Option<String>,
    pub segment: Option<String>,
}

/// What a validated submission asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobRequest {
    /// Only flag an existing job complete.
    Complete { job_id: String },
    /// Add a transcode task, creating the job if needed.
    Task(TaskRequest),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRequest {
    pub job_id: String,
    /// Generated when the caller did not provide one.
    pub task_id: String,
    pub tag: Option<String>,
    pub source: VideoSource,
    pub options: String,
    pub callback: Option<String>,
    pub extension: String,
    pub multipass: Option<MultipassRequest>,
    pub segment: Option<SegmentMode>,
}

fn id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("id regex is valid"))
}

fn extension_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9]+$").expect("extension regex is valid"))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn check_id(field: &'static str, value: &str) -> Result<(), RequestError> {
    if id_regex().is_match(value) {
        Ok(())
    } else {
        Err(RequestError::InvalidCharacters {
            field,
            allowed: "a-Z, 0-9, _ -",
        })
    }
}

fn check_extension(field: &'static str, value: &str) -> Result<(), RequestError> {
    if extension_regex().is_match(value) {
        Ok(())
    } else {
        Err(RequestError::InvalidCharacters {
            field,
            allowed: "a-Z, 0-9",
        })
    }
}

impl RawJobRequest {
    /// Applies the submission rules in the order callers see them reported.
    pub fn validate(self) -> Result<JobRequest, RequestError> {
        let job_id = non_empty(self.job_id).ok_or(RequestError::Missing("jobid"))?;
        check_id("jobid", &job_id)?;

        if self.complete {
            return Ok(JobRequest::Complete { job_id });
        }

        let task_id = match non_empty(self.task_id) {
            Some(task_id) => {
                check_id("taskid", &task_id)?;
                task_id
            }
            None => uuid::Uuid::new_v4().simple().to_string(),
        };

        let extension = non_empty(self.extension).ok_or(RequestError::Missing("extension"))?;
        check_extension("extension", &extension)?;

        let multipass = if self.multipass {
            let options = non_empty(self.multipass_options)
                .ok_or(RequestError::MultipassIncomplete("multipass-options"))?;
            let extension = non_empty(self.multipass_extension)
                .ok_or(RequestError::MultipassIncomplete("multipass-extension"))?;
            check_extension("multipass-extension", &extension)?;
            Some(MultipassRequest { extension, options })
        } else {
            None
        };

        let segment = non_empty(self.segment)
            .map(|s| SegmentMode::parse(&s))
            .transpose()?;

        let options =
            non_empty(self.encoding_options).ok_or(RequestError::Missing("encoding-options"))?;

        let source = match (self.upload, non_empty(self.video_url)) {
            (Some(_), Some(_)) => return Err(RequestError::ConflictingSource),
            (Some(path), None) => VideoSource::Staged { path },
            (None, Some(url)) => VideoSource::Remote { url },
            (None, None) => return Err(RequestError::Missing("video")),
        };

        Ok(JobRequest::Task(TaskRequest {
            job_id,
            task_id,
            tag: non_empty(self.tag),
            source,
            options,
            callback: non_empty(self.callback),
            extension,
            multipass,
            segment,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> RawJobRequest {
        RawJobRequest {
            job_id: Some("job-1".to_string()),
            extension: Some("mp4".to_string()),
            encoding_options: Some("-c:v libx264".to_string()),
            video_url: Some("http://example.com/in.mp4".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_request_generates_task_id() {
        let JobRequest::Task(task) = base().validate().unwrap() else {
            panic!("expected task request");
        };
        assert_eq!(task.job_id, "job-1");
        assert_eq!(task.task_id.len(), 32);
        assert_eq!(
            task.source,
            VideoSource::Remote {
                url: "http://example.com/in.mp4".to_string()
            }
        );
        assert!(task.multipass.is_none());
    }

    #[test]
    fn test_complete_only_needs_job_id() {
        let request = RawJobRequest {
            job_id: Some("abc".to_string()),
            complete: true,
            ..Default::default()
        };
        assert_eq!(
            request.validate().unwrap(),
            JobRequest::Complete {
                job_id: "abc".to_string()
            }
        );
    }

    #[test]
    fn test_rejects_bad_ids() {
        let mut request = base();
        request.job_id = Some("../etc".to_string());
        assert!(matches!(
            request.validate(),
            Err(RequestError::InvalidCharacters { field: "jobid", .. })
        ));

        let mut request = base();
        request.task_id = Some("a b".to_string());
        assert!(matches!(
            request.validate(),
            Err(RequestError::InvalidCharacters { field: "taskid", .. })
        ));

        let mut request = base();
        request.extension = Some("mp.4".to_string());
        assert!(matches!(
            request.validate(),
            Err(RequestError::InvalidCharacters { field: "extension", .. })
        ));
    }

    #[test]
    fn test_multipass_requires_fields() {
        let mut request = base();
        request.multipass = true;
        request.multipass_options = Some("-pass 1".to_string());
        assert_eq!(
            request.validate(),
            Err(RequestError::MultipassIncomplete("multipass-extension"))
        );
    }

    #[test]
    fn test_segment_mode() {
        let mut request = base();
        request.segment = Some("HLS".to_string());
        let JobRequest::Task(task) = request.validate().unwrap() else {
            panic!("expected task request");
        };
        assert_eq!(task.segment, Some(SegmentMode::Hls));

        let mut request = base();
        request.segment = Some("dash".to_string());
        assert_eq!(
            request.validate(),
            Err(RequestError::InvalidSegment("dash".to_string()))
        );
    }

    #[test]
    fn test_source_rules() {
        let mut request = base();
        request.upload = Some(PathBuf::from("/tmp/upload.mp4"));
        assert_eq!(request.validate(), Err(RequestError::ConflictingSource));

        let mut request = base();
        request.video_url = None;
        assert_eq!(request.validate(), Err(RequestError::Missing("video")));
    }
}
