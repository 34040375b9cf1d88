//! Encoding-argument templates.
//!
//! Callers send the encoder arguments as one raw string that may contain
//! `{{bitrate}}`, `{{fps}}`, `{{fps2x}}` and `{{resolution}}` placeholders,
//! optionally wrapped in single quotes.

use regex_lite::Regex;
use std::sync::OnceLock;

/// Values substituted into an argument template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Placeholders {
    pub bitrate: String,
    pub fps: u32,
    pub resolution: String,
}

impl Placeholders {
    /// Only the frame-rate placeholders, as used by the analysis pass.
    pub fn frame_rate(fps: u32) -> Self {
        Self {
            fps,
            ..Default::default()
        }
    }
}

/// Replaces every placeholder, quoted form first.
pub fn substitute(template: &str, values: &Placeholders) -> String {
    let fps = values.fps.to_string();
    let fps2x = values.fps.saturating_mul(2).to_string();
    let pairs: [(&str, &str); 4] = [
        ("bitrate", &values.bitrate),
        ("fps2x", &fps2x),
        ("fps", &fps),
        ("resolution", &values.resolution),
    ];

    let mut out = template.to_string();
    for (name, value) in pairs {
        out = out.replace(&format!("'{{{{{}}}}}'", name), value);
        out = out.replace(&format!("{{{{{}}}}}", name), value);
    }
    out
}

/// Splits a raw argument string on whitespace, honoring single and double quotes.
pub fn split(raw: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for c in raw.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '\'' || c == '"' => {
                quote = Some(c);
                in_token = true;
            }
            None if c.is_whitespace() => {
                if in_token {
                    args.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            None => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if in_token {
        args.push(current);
    }
    args
}

fn size_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"-s ["']?([0-9]+x[0-9]+)["']?"#).expect("size regex is valid"))
}

/// Output resolution requested by the options, as `WxH`.
pub fn requested_resolution(options: &str) -> Option<String> {
    let lower = options.to_lowercase();
    if lower.contains("hd720") {
        return Some("1280x720".to_string());
    }
    if lower.contains("hd1080") {
        return Some("1920x1080".to_string());
    }
    if lower.contains("hd480") || lower.contains("sd480") {
        return Some("720x480".to_string());
    }
    size_regex()
        .captures(options)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Target bitrate named by `-minrate`, `-maxrate` or `-b:v`, in that order.
pub fn requested_bitrate(options: &str) -> Option<String> {
    let tokens = split(options);
    ["-minrate", "-maxrate", "-b:v"].iter().find_map(|flag| {
        tokens
            .iter()
            .position(|t| t == flag)
            .and_then(|i| tokens.get(i + 1))
            .cloned()
    })
}

/// Whether the options ask for output at exactly `WxH` (by keyword or `-s`).
fn names_size(options: &str, keyword: &str, size: &str) -> bool {
    options.contains(keyword)
        || options.contains(&format!("-s {}", size))
        || options.contains(&format!("-s '{}'", size))
        || options.contains(&format!("-s \"{}\"", size))
}

/// Whether a source of `source_width` pixels can satisfy the requested size.
pub fn source_supports(options: &str, source_width: u32) -> bool {
    let can_1080 = source_width >= 1920;
    let can_720 = source_width >= 1280;

    if names_size(options, "hd1080", "1920x1080") && !can_1080 {
        return false;
    }
    if names_size(options, "hd720", "1280x720") && !can_720 {
        return false;
    }
    true
}
