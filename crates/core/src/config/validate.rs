use super::{types::Config, ConfigError, PublishMode};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Worker pool and reaper have non-zero sizes/intervals
/// - Media tool paths are set
/// - Move mode has a serve URL and distinct public destinations
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }

    if config.engine.max_tasks == 0 {
        return Err(invalid("engine.max_tasks must be at least 1"));
    }

    if config.reaper.interval_secs == 0 {
        return Err(invalid("reaper.interval_secs cannot be 0"));
    }

    if config.media.ffmpeg_path.as_os_str().is_empty() {
        return Err(invalid("media.ffmpeg_path cannot be empty"));
    }
    if config.media.ffprobe_path.as_os_str().is_empty() {
        return Err(invalid("media.ffprobe_path cannot be empty"));
    }

    let storage = &config.storage;
    if storage.mode == PublishMode::Move {
        if storage.serve_url.trim().is_empty() {
            return Err(invalid("storage.serve_url is required when mode = \"move\""));
        }
        if storage.thumb_destination == storage.video_destination {
            return Err(invalid(
                "storage.thumb_destination and storage.video_destination must differ",
            ));
        }
    }

    Ok(())
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::ValidationError(message.to_string())
}
