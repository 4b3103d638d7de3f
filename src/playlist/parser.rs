use std::sync::LazyLock;

use regex::Regex;

use crate::common::FormatHint;
use crate::playlist::url::resolve;
use crate::playlist::{PlaylistError, PlaylistResult};

use super::types::{Playlist, SegmentRef, Variant};

static BANDWIDTH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)BANDWIDTH=(\d+)").expect("valid regex"));
static RESOLUTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)RESOLUTION=(\d+)x(\d+)").expect("valid regex"));
static MAP_URI_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)URI\s*=\s*"?([^",]+)"?"#).expect("valid regex"));
static MAP_URL_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(https?://\S+|\./\S+|/\S+)").expect("valid regex"));

/// Parses a UTF-8 M3U8 document into a `Playlist` (§4.A).
pub fn parse_m3u8(text: &str, base_url: &str) -> PlaylistResult<Playlist> {
    if text.trim().is_empty() {
        return Err(PlaylistError::Empty);
    }

    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let is_master = lines
        .iter()
        .any(|l| l.to_ascii_uppercase().starts_with("#EXT-X-STREAM-INF"));

    if is_master {
        parse_master(&lines)
    } else {
        parse_media(&lines, base_url)
    }
}

fn parse_master(lines: &[&str]) -> PlaylistResult<Playlist> {
    let mut variants = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        if line.to_ascii_uppercase().starts_with("#EXT-X-STREAM-INF") {
            let bandwidth = BANDWIDTH_RE
                .captures(line)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<u64>().ok())
                .unwrap_or(0);
            let resolution = RESOLUTION_RE.captures(line).and_then(|c| {
                let w = c.get(1)?.as_str().parse::<u32>().ok()?;
                let h = c.get(2)?.as_str().parse::<u32>().ok()?;
                Some((w, h))
            });

            let mut j = i + 1;
            while j < lines.len() && lines[j].starts_with('#') {
                j += 1;
            }
            if j < lines.len() {
                variants.push(Variant {
                    url: lines[j].to_string(),
                    bandwidth,
                    resolution,
                });
                i = j + 1;
                continue;
            }
        }
        i += 1;
    }

    if variants.is_empty() {
        return Err(PlaylistError::NoVariants);
    }

    variants.sort_by(|a, b| b.bandwidth.cmp(&a.bandwidth));

    Ok(Playlist::Master { variants })
}

fn parse_media(lines: &[&str], base_url: &str) -> PlaylistResult<Playlist> {
    let mut segments = Vec::new();
    let mut init = None;

    for line in lines {
        if line.to_ascii_uppercase().starts_with("#EXT-X-MAP") {
            init = extract_map_uri(line).map(|uri| {
                let resolved = resolve(base_url, &uri);
                SegmentRef::new(resolved, 0)
            });
        } else if !line.starts_with('#') {
            let resolved = resolve(base_url, line);
            let index = segments.len();
            segments.push(SegmentRef::new(resolved, index));
        }
    }

    if segments.is_empty() {
        return Err(PlaylistError::NoSegments);
    }

    let format_hint = infer_format_hint(&segments);

    Ok(Playlist::Media {
        segments,
        init,
        format_hint,
    })
}

/// Extracts the `#EXT-X-MAP` URI by three fallbacks, in order (§4.A):
/// a `URI="..."` attribute, the first URL-like token after the colon, or
/// any URL-like token anywhere on the line. Percent-decodes once.
fn extract_map_uri(line: &str) -> Option<String> {
    let raw = MAP_URI_ATTR_RE
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .or_else(|| {
            line.split_once(':')
                .and_then(|(_, rest)| MAP_URL_TOKEN_RE.find(rest))
                .map(|m| m.as_str().to_string())
        })
        .or_else(|| MAP_URL_TOKEN_RE.find(line).map(|m| m.as_str().to_string()))?;

    let decoded = urlencoding::decode(&raw)
        .map(|s| s.into_owned())
        .unwrap_or(raw);

    if decoded.is_empty() {
        tracing::warn!("EXT-X-MAP line yielded an empty URI after decoding: {line}");
        None
    } else {
        Some(decoded)
    }
}

fn infer_format_hint(segments: &[SegmentRef]) -> FormatHint {
    if segments.iter().any(|s| path_of(&s.url).ends_with(".ts")) {
        FormatHint::Ts
    } else if segments.iter().any(|s| {
        let p = path_of(&s.url);
        p.contains(".m4s") || p.contains("frag") || p.contains("segment")
    }) {
        FormatHint::Fmp4
    } else {
        FormatHint::Unknown
    }
}

fn path_of(url: &str) -> &str {
    url.split(['?', '#']).next().unwrap_or(url)
}
