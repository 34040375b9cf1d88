//! HLS manifests.

/// One variant stream of the adaptive manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub bit_rate: u64,
    pub playlist: String,
}

/// Renders the master manifest with variants in ascending bitrate order.
pub fn adaptive_playlist(variants: &[Variant]) -> String {
    let mut sorted: Vec<&Variant> = variants.iter().collect();
    sorted.sort_by_key(|v| v.bit_rate);

    let mut out = String::from("#EXTM3U\n");
    for variant in sorted {
        out.push_str(&format!(
            "#EXT-X-STREAM-INF:PROGRAM-ID=1, BANDWIDTH={}\n",
            variant.bit_rate
        ));
        out.push_str(&variant.playlist);
        out.push('\n');
    }
    out
}

/// Chunk file names listed in a segmenter-produced manifest.
pub fn segment_files(manifest: &str) -> Vec<String> {
    manifest
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#') && line.ends_with(".ts"))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adaptive_playlist_sorted_by_bitrate() {
        let variants = vec![
            Variant {
                bit_rate: 500_000,
                playlist: "/videos/j/j_low.ts.m3u8".to_string(),
            },
            Variant {
                bit_rate: 1_500_000,
                playlist: "/videos/j/j_high.ts.m3u8".to_string(),
            },
            Variant {
                bit_rate: 800_000,
                playlist: "/videos/j/j_mid.ts.m3u8".to_string(),
            },
        ];

        let manifest = adaptive_playlist(&variants);
        let lines: Vec<&str> = manifest.lines().collect();
        assert_eq!(
            lines,
            vec![
                "#EXTM3U",
                "#EXT-X-STREAM-INF:PROGRAM-ID=1, BANDWIDTH=500000",
                "/videos/j/j_low.ts.m3u8",
                "#EXT-X-STREAM-INF:PROGRAM-ID=1, BANDWIDTH=800000",
                "/videos/j/j_mid.ts.m3u8",
                "#EXT-X-STREAM-INF:PROGRAM-ID=1, BANDWIDTH=1500000",
                "/videos/j/j_high.ts.m3u8",
            ]
        );
    }

    #[test]
    fn test_empty_playlist_is_header_only() {
        assert_eq!(adaptive_playlist(&[]), "#EXTM3U\n");
    }

    #[test]
    fn test_segment_files() {
        let manifest = "#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXTINF:10.0,\nj_t_000.ts\n#EXTINF:4.2,\nj_t_001.ts\r\n#EXT-X-ENDLIST\n";
        assert_eq!(segment_files(manifest), vec!["j_t_000.ts", "j_t_001.ts"]);
    }
}
