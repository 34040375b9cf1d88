use std::path::{Path, PathBuf};
use std::sync::Arc;
use transcoder_core::{Config, SanitizedConfig, TranscodeEngine};

/// Directory under the working root where multipart uploads are staged.
const UPLOADS_DIR: &str = ".uploads";

/// Shared application state
pub struct AppState {
    config: Config,
    engine: Arc<TranscodeEngine>,
}

impl AppState {
    pub fn new(config: Config, engine: Arc<TranscodeEngine>) -> Self {
        Self { config, engine }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn engine(&self) -> &TranscodeEngine {
        &self.engine
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    /// Working root, served under `/videos` and `/thumbs` in local mode.
    pub fn working_dir(&self) -> &Path {
        &self.config.storage.working_dir
    }

    /// A fresh staging path for an uploaded file named `file_name`.
    pub fn upload_path(&self, file_name: &str) -> PathBuf {
        self.working_dir().join(UPLOADS_DIR).join(format!(
            "{}-{}",
            uuid::Uuid::new_v4().simple(),
            sanitize_file_name(file_name)
        ))
    }
}

/// Keeps the final path component and replaces anything outside
/// `[A-Za-z0-9._-]`.
fn sanitize_file_name(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("clip.mov"), "clip.mov");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("my clip (1).mp4"), "my_clip__1_.mp4");
        assert_eq!(sanitize_file_name(".."), "upload");
        assert_eq!(sanitize_file_name(""), "upload");
    }
}
