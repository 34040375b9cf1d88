//! Prober JSON model.

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::error::MediaError;

/// Arguments that make the prober print stream and container metadata as JSON.
pub fn probe_args(path: &Path) -> Vec<String> {
    vec![
        "-i".to_string(),
        path.to_string_lossy().into_owned(),
        "-v".to_string(),
        "quiet".to_string(),
        "-print_format".to_string(),
        "json".to_string(),
        "-show_format".to_string(),
        "-show_streams".to_string(),
    ]
}

/// Parsed prober output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeInfo {
    #[serde(default)]
    pub streams: Vec<StreamInfo>,
    #[serde(default)]
    pub format: Option<FormatInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    #[serde(default)]
    pub index: Option<u32>,
    #[serde(default)]
    pub codec_name: Option<String>,
    #[serde(default)]
    pub codec_type: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub sample_aspect_ratio: Option<String>,
    #[serde(default)]
    pub display_aspect_ratio: Option<String>,
    #[serde(default)]
    pub bit_rate: Option<String>,
    #[serde(default)]
    pub avg_frame_rate: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormatInfo {
    #[serde(default)]
    pub format_name: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub bit_rate: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
}

impl ProbeInfo {
    /// Parses prober stdout. Blank output is a probe failure.
    pub fn parse(output: &str) -> Result<Self, MediaError> {
        if output.trim().is_empty() {
            return Err(MediaError::probe_failed("prober produced no output"));
        }
        serde_json::from_str(output)
            .map_err(|e| MediaError::probe_failed(format!("invalid prober output: {}", e)))
    }

    /// First video stream, if any.
    pub fn video_stream(&self) -> Option<&StreamInfo> {
        self.streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"))
    }

    /// Container duration in seconds.
    pub fn duration_secs(&self) -> Option<f64> {
        self.format
            .as_ref()
            .and_then(|f| f.duration.as_deref())
            .and_then(|d| d.trim().parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d >= 0.0)
    }

    /// Video frame rate rounded to a whole number, 0 when unknown.
    pub fn frame_rate(&self) -> u32 {
        self.video_stream()
            .and_then(|s| s.avg_frame_rate.as_deref())
            .and_then(parse_rate)
            .map(|r| r.round() as u32)
            .unwrap_or(0)
    }

    /// Width of the widest video stream, 0 when unknown.
    pub fn video_width(&self) -> u32 {
        self.streams
            .iter()
            .filter(|s| s.codec_type.as_deref() == Some("video"))
            .filter_map(|s| s.width)
            .max()
            .unwrap_or(0)
    }

    /// Video dimensions as `(width, height)`.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        let stream = self.video_stream()?;
        Some((stream.width?, stream.height?))
    }

    /// Bitrate in bits per second. The container value wins over the stream value.
    pub fn bit_rate(&self) -> Option<u64> {
        let from_format = self
            .format
            .as_ref()
            .and_then(|f| f.bit_rate.as_deref())
            .and_then(|b| b.trim().parse::<u64>().ok());
        let from_stream = self
            .video_stream()
            .and_then(|s| s.bit_rate.as_deref())
            .and_then(|b| b.trim().parse::<u64>().ok());
        from_format.or(from_stream)
    }
}

/// Parses `num/den` or a plain number.
fn parse_rate(rate: &str) -> Option<f64> {
    match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den > 0.0 {
                Some(num / den)
            } else {
                None
            }
        }
        None => rate.trim().parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "streams": [
            {"index": 0, "codec_name": "aac", "codec_type": "audio", "bit_rate": "128000"},
            {"index": 1, "codec_name": "h264", "codec_type": "video", "width": 1920, "height": 1080,
             "avg_frame_rate": "30000/1001", "bit_rate": "4500000"}
        ],
        "format": {"format_name": "mov,mp4,m4a", "duration": "125.400000", "bit_rate": "4650000"}
    }"#;

    #[test]
    fn test_parse_probe_output() {
        let info = ProbeInfo::parse(SAMPLE).unwrap();
        assert_eq!(info.streams.len(), 2);
        assert_eq!(info.video_width(), 1920);
        assert_eq!(info.dimensions(), Some((1920, 1080)));
        assert_eq!(info.frame_rate(), 30);
        assert_eq!(info.duration_secs(), Some(125.4));
        assert_eq!(info.bit_rate(), Some(4_650_000));
    }

    #[test]
    fn test_bit_rate_falls_back_to_stream() {
        let info = ProbeInfo::parse(
            r#"{"streams":[{"codec_type":"video","bit_rate":"800000"}],"format":{}}"#,
        )
        .unwrap();
        assert_eq!(info.bit_rate(), Some(800_000));
        assert_eq!(info.duration_secs(), None);
        assert_eq!(info.frame_rate(), 0);
    }

    #[test]
    fn test_video_width_uses_widest_stream() {
        let info = ProbeInfo::parse(
            r#"{"streams":[
                {"codec_type":"video","codec_name":"mjpeg","width":600,"height":600},
                {"codec_type":"audio","codec_name":"aac"},
                {"codec_type":"video","codec_name":"h264","width":1920,"height":1080}
            ],"format":{}}"#,
        )
        .unwrap();
        assert_eq!(info.video_width(), 1920);
    }

    #[test]
    fn test_parse_empty_output_fails() {
        assert!(matches!(
            ProbeInfo::parse("  \n"),
            Err(MediaError::ProbeFailed { .. })
        ));
        assert!(ProbeInfo::parse("not json").is_err());
    }

    #[test]
    fn test_probe_args() {
        let args = probe_args(Path::new("/work/job/source.mp4"));
        assert_eq!(args[0], "-i");
        assert_eq!(args[1], "/work/job/source.mp4");
        assert_eq!(&args[2..], ["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"]);
    }
}
