//! Capability listings the encoder can print about itself.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaListing {
    Formats,
    Codecs,
    Encoders,
    Decoders,
    Filters,
    PixelFormats,
}

impl MediaListing {
    pub const ALL: [MediaListing; 6] = [
        MediaListing::Formats,
        MediaListing::Codecs,
        MediaListing::Encoders,
        MediaListing::Decoders,
        MediaListing::Filters,
        MediaListing::PixelFormats,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaListing::Formats => "formats",
            MediaListing::Codecs => "codecs",
            MediaListing::Encoders => "encoders",
            MediaListing::Decoders => "decoders",
            MediaListing::Filters => "filters",
            MediaListing::PixelFormats => "pix_fmts",
        }
    }

    pub fn args(&self) -> Vec<String> {
        vec!["-hide_banner".to_string(), format!("-{}", self.as_str())]
    }
}

impl fmt::Display for MediaListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaListing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|listing| listing.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown media listing: {}", s))
    }
}
