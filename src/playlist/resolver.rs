use reqwest::Client;

use crate::common::HttpClient;
use crate::playlist::parser::parse_m3u8;
use crate::playlist::types::{Playlist, SegmentRef, Variant};
use crate::playlist::url::{canonicalize, is_byte_range_url};
use crate::playlist::{PlaylistError, PlaylistResult};

/// Maximum number of additional variants probed, in descending bandwidth
/// order, when the top variant's media playlist has no init segment (§4.C).
const INIT_PROBE_LIMIT: usize = 4;

/// The resolved output of component C: the media segment list, its optional
/// init segment, and the format hint computed by the parser.
pub struct ResolvedMedia {
    pub segments: Vec<SegmentRef>,
    pub init: Option<SegmentRef>,
    pub format_hint: crate::common::FormatHint,
}

/// Given a user-supplied playlist URL, fetches and resolves it down to a
/// single playable media playlist (§4.C).
pub async fn resolve_playlist(client: &Client, url: &str) -> PlaylistResult<ResolvedMedia> {
    let text = fetch_text(client, url).await?;
    let playlist = parse_m3u8(&text, url)?;

    match playlist {
        Playlist::Media {
            segments,
            init,
            format_hint,
        } => Ok(finalize(segments, init, format_hint)),

        Playlist::Master { variants } => resolve_master(client, url, variants).await,
    }
}

async fn resolve_master(
    client: &Client,
    master_url: &str,
    variants: Vec<Variant>,
) -> PlaylistResult<ResolvedMedia> {
    let best = variants
        .first()
        .ok_or_else(|| PlaylistError::NoPlayableMedia(master_url.to_string()))?;

    let (mut segments, mut init, format_hint) = fetch_media(client, &best.url).await?;

    if init.is_none() && format_hint != crate::common::FormatHint::Ts {
        for variant in variants.iter().skip(1).take(INIT_PROBE_LIMIT) {
            tracing::debug!(url = %variant.url, "probing variant for missing init segment");
            match fetch_media(client, &variant.url).await {
                Ok((probed_segments, Some(probed_init), probed_hint)) => {
                    init = Some(probed_init);
                    if segments.is_empty() {
                        segments = probed_segments;
                    }
                    let _ = probed_hint;
                    break;
                }
                Ok(_) => continue,
                Err(err) => {
                    tracing::warn!(url = %variant.url, error = %err, "init probe failed");
                    continue;
                }
            }
        }
    }

    if segments.is_empty() {
        return Err(PlaylistError::NoPlayableMedia(master_url.to_string()));
    }

    Ok(finalize(segments, init, format_hint))
}

async fn fetch_media(
    client: &Client,
    url: &str,
) -> PlaylistResult<(Vec<SegmentRef>, Option<SegmentRef>, crate::common::FormatHint)> {
    let text = fetch_text(client, url).await?;
    match parse_m3u8(&text, url)? {
        Playlist::Media {
            segments,
            init,
            format_hint,
        } => Ok((segments, init, format_hint)),
        Playlist::Master { .. } => Err(PlaylistError::NoPlayableMedia(url.to_string())),
    }
}

fn finalize(
    segments: Vec<SegmentRef>,
    init: Option<SegmentRef>,
    format_hint: crate::common::FormatHint,
) -> ResolvedMedia {
    let segments: Vec<SegmentRef> = segments
        .into_iter()
        .filter(|s| {
            let canon = canonicalize(&s.url);
            if is_byte_range_url(&canon) {
                tracing::warn!(url = %s.url, index = s.index, "rejecting byte-range segment URL");
                false
            } else {
                true
            }
        })
        .map(|mut s| {
            s.url = canonicalize(&s.url);
            s
        })
        .collect();

    let init = init.map(|mut i| {
        i.url = canonicalize(&i.url);
        i
    });

    ResolvedMedia {
        segments,
        init,
        format_hint,
    }
}

async fn fetch_text(client: &Client, url: &str) -> PlaylistResult<String> {
    let response = client
        .get(url)
        .header("Accept", "application/x-mpegURL, */*")
        .send()
        .await
        .map_err(|source| PlaylistError::Fetch {
            url: url.to_string(),
            source,
        })?;

    if !response.status().is_success() {
        return Err(PlaylistError::BadStatus {
            url: url.to_string(),
            status: response.status(),
        });
    }

    response.text().await.map_err(|source| PlaylistError::Fetch {
        url: url.to_string(),
        source,
    })
}

/// Builds the `reqwest::Client` playlist/segment fetches share, carrying the
/// standard headers (§6).
pub fn build_client() -> reqwest::Result<Client> {
    HttpClient::new()
}
