//! Encoder progress parsing.

use regex_lite::Regex;
use std::sync::OnceLock;

/// Points held back while a segmenting pass is still to come.
pub const SEGMENTING_OFFSET: u8 = 10;

fn time_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"time=\s*(\d+):(\d{2}):(\d{2}(?:\.\d+)?)").expect("progress regex is valid")
    })
}

/// Extracts the elapsed media time (seconds) from an encoder status line.
///
/// Only lines starting with `frame=` are considered.
pub fn parse_progress_time(line: &str) -> Option<f64> {
    let line = line.trim();
    if !line.starts_with("frame=") {
        return None;
    }
    let caps = time_regex().captures(line)?;
    let hours: f64 = caps.get(1)?.as_str().parse().ok()?;
    let minutes: f64 = caps.get(2)?.as_str().parse().ok()?;
    let seconds: f64 = caps.get(3)?.as_str().parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Percent complete for `elapsed` out of `duration`, clamped to 100 and
/// reduced by [`SEGMENTING_OFFSET`] when a segmenting pass follows.
pub fn percent_for(elapsed: f64, duration: f64, segmenting: bool) -> u8 {
    if duration <= 0.0 || !elapsed.is_finite() {
        return 0;
    }
    let percent = (elapsed / duration * 100.0).clamp(0.0, 100.0) as u8;
    if segmenting {
        percent.saturating_sub(SEGMENTING_OFFSET)
    } else {
        percent
    }
}

/// Splits a byte stream into lines on `\n` and `\r`, dropping empty lines.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    /// Feeds a chunk and returns every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in chunk {
            if byte == b'\n' || byte == b'\r' {
                if let Some(line) = self.take() {
                    lines.push(line);
                }
            } else {
                self.pending.push(byte);
            }
        }
        lines
    }

    /// Returns the trailing partial line, if any.
    pub fn finish(&mut self) -> Option<String> {
        self.take()
    }

    fn take(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.pending).trim().to_string();
        self.pending.clear();
        if line.is_empty() {
            None
        } else {
            Some(line)
        }
    }
}
