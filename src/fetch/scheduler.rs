use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::common::DownloadError;
use crate::configs::FetchConfig;
use crate::fetch::payload::SegmentPayload;
use crate::fetch::retry::{delay_for, sleep_interruptible, ErrorClass};
use crate::playlist::SegmentRef;

/// Everything the validator (component F) needs from a completed fetch
/// phase: the payloads actually recovered, keyed by index so ordering is
/// free, and the init segment's raw bytes if one was fetched.
pub struct FetchOutcome {
    pub payloads: BTreeMap<usize, SegmentPayload>,
    pub total_segments: usize,
    pub init_bytes: Option<Bytes>,
}

/// A segment's retry budget ran out one of two ways, and callers that care
/// about the difference (the init fetch, which must surface `Cancelled`
/// rather than a generic network error per §7) need to be able to tell them
/// apart; ordinary segment fetches collapse both into "missing" (§4.D).
enum FetchFailure {
    Cancelled,
    Exhausted,
}

/// Drives bounded-parallel fetch of the init segment plus all media
/// segments (§4.D): primary pass in batches, then a recovery pass over
/// whatever is still missing. `on_progress(completed, total)` is invoked
/// after every segment settles (success or failure) so a caller can publish
/// the linear-in-segments-fetched progress required by §4.I.
pub async fn fetch_all(
    client: &Client,
    segments: &[SegmentRef],
    init: Option<&SegmentRef>,
    config: &FetchConfig,
    token: &CancellationToken,
    on_progress: &(dyn Fn(usize, usize) + Send + Sync),
) -> Result<FetchOutcome, DownloadError> {
    let init_bytes = match init {
        Some(init_ref) => Some(fetch_init(client, init_ref, config, token).await?),
        None => None,
    };

    let mut payloads: BTreeMap<usize, SegmentPayload> = BTreeMap::new();
    let total = segments.len();
    let completed = AtomicUsize::new(0);

    let batch_size = config.batch_size(total);
    let inter_batch_delay = Duration::from_millis(config.inter_batch_delay_ms(total));

    for batch in segments.chunks(batch_size) {
        if token.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }

        let results = run_batch(client, batch, config.primary_attempts, token, &completed, total, on_progress).await?;
        for (index, bytes) in results {
            if let Some(bytes) = bytes {
                payloads.insert(index, SegmentPayload::new(index, bytes));
            }
        }

        if !sleep_interruptible(inter_batch_delay, token).await {
            return Err(DownloadError::Cancelled);
        }
    }

    let missing: Vec<&SegmentRef> = segments
        .iter()
        .filter(|s| !payloads.contains_key(&s.index))
        .collect();

    if !missing.is_empty() {
        tracing::warn!(count = missing.len(), "recovering missing segments");
        let recovered = run_recovery_pass(client, &missing, config, token, &completed, total, on_progress).await?;
        for (index, bytes) in recovered {
            if let Some(bytes) = bytes {
                payloads.insert(index, SegmentPayload::new(index, bytes));
            }
        }
    }

    let success_rate = payloads.len() as f64 / segments.len().max(1) as f64;
    if success_rate < config.success_floor {
        return Err(DownloadError::FetchFloor {
            message: format!(
                "recovered {}/{} segments ({:.1}% < {:.1}% floor)",
                payloads.len(),
                segments.len(),
                success_rate * 100.0,
                config.success_floor * 100.0
            ),
            max_consecutive_missing: longest_missing_run(segments, &payloads),
        });
    }

    Ok(FetchOutcome {
        payloads,
        total_segments: segments.len(),
        init_bytes,
    })
}

/// Fetches the init segment with its own retry budget, validating the
/// `ftyp` marker so format errors surface before any bytes reach the
/// assembler (§4.D, §4.F). Cancellation during this fetch surfaces as
/// `DownloadError::Cancelled`, never as a generic network error (§7).
async fn fetch_init(
    client: &Client,
    init_ref: &SegmentRef,
    config: &FetchConfig,
    token: &CancellationToken,
) -> Result<Bytes, DownloadError> {
    match fetch_with_retries(client, init_ref, config.init_attempts, token).await {
        Ok(bytes) => {
            if bytes.len() >= 8 {
                Ok(bytes)
            } else {
                Err(DownloadError::FormatInvalid(format!(
                    "init segment too short ({} bytes)",
                    bytes.len()
                )))
            }
        }
        Err(FetchFailure::Cancelled) => Err(DownloadError::Cancelled),
        Err(FetchFailure::Exhausted) => Err(DownloadError::NetworkPlaylist(format!(
            "init segment {} exhausted its retry budget",
            init_ref.url
        ))),
    }
}

async fn run_batch(
    client: &Client,
    batch: &[SegmentRef],
    attempts_budget: u32,
    token: &CancellationToken,
    completed: &AtomicUsize,
    total: usize,
    on_progress: &(dyn Fn(usize, usize) + Send + Sync),
) -> Result<Vec<(usize, Option<Bytes>)>, DownloadError> {
    let futures = batch.iter().map(|segment| async move {
        let result = fetch_with_retries_indexed(client, segment, attempts_budget, token).await;
        let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
        on_progress(done, total);
        result
    });
    let batch_fut = futures::future::join_all(futures);
    tokio::pin!(batch_fut);

    let mut probe = tokio::time::interval(Duration::from_millis(50));
    probe.tick().await; // first tick fires immediately

    loop {
        tokio::select! {
            results = &mut batch_fut => return Ok(results),
            _ = probe.tick() => {
                if token.is_cancelled() {
                    return Err(DownloadError::Cancelled);
                }
            }
        }
    }
}

async fn run_recovery_pass(
    client: &Client,
    missing: &[&SegmentRef],
    config: &FetchConfig,
    token: &CancellationToken,
    completed: &AtomicUsize,
    total: usize,
    on_progress: &(dyn Fn(usize, usize) + Send + Sync),
) -> Result<Vec<(usize, Option<Bytes>)>, DownloadError> {
    let futures = missing.iter().enumerate().map(|(i, segment)| {
        let stagger = Duration::from_millis(config.recovery_stagger_ms * i as u64);
        async move {
            let result =
                fetch_with_retries_staggered(client, segment, config.recovery_attempts, stagger, token).await;
            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            on_progress(done, total);
            result
        }
    });
    let batch_fut = futures::future::join_all(futures);
    tokio::pin!(batch_fut);

    let mut probe = tokio::time::interval(Duration::from_millis(50));
    probe.tick().await;

    loop {
        tokio::select! {
            results = &mut batch_fut => return Ok(results),
            _ = probe.tick() => {
                if token.is_cancelled() {
                    return Err(DownloadError::Cancelled);
                }
            }
        }
    }
}

async fn fetch_with_retries_staggered(
    client: &Client,
    segment: &SegmentRef,
    attempts_budget: u32,
    stagger: Duration,
    token: &CancellationToken,
) -> (usize, Option<Bytes>) {
    if !sleep_interruptible(stagger, token).await {
        return (segment.index, None);
    }
    fetch_with_retries_indexed(client, segment, attempts_budget, token).await
}

async fn fetch_with_retries_indexed(
    client: &Client,
    segment: &SegmentRef,
    attempts_budget: u32,
    token: &CancellationToken,
) -> (usize, Option<Bytes>) {
    let result = fetch_with_retries(client, segment, attempts_budget, token).await;
    (segment.index, result.ok())
}

/// Fetches one segment, retrying transient failures up to `attempts_budget`
/// times using the per-class delay table (§4.E). Returns `Err` once the
/// budget is exhausted, a fatal error is hit, or the token is cancelled;
/// `fetch_init` distinguishes these, ordinary segment fetches don't need to.
async fn fetch_with_retries(
    client: &Client,
    segment: &SegmentRef,
    attempts_budget: u32,
    token: &CancellationToken,
) -> Result<Bytes, FetchFailure> {
    let mut attempt = 0u32;
    loop {
        if token.is_cancelled() {
            return Err(FetchFailure::Cancelled);
        }
        attempt += 1;

        match fetch_once(client, &segment.url).await {
            Ok(bytes) => return Ok(bytes),
            Err(class) => {
                if !class.is_retryable() || attempt >= attempts_budget {
                    if !class.is_retryable() {
                        tracing::debug!(url = %segment.url, "segment fetch failed fatally, no retry");
                    } else {
                        tracing::warn!(url = %segment.url, attempt, "segment exhausted retry budget");
                    }
                    return Err(FetchFailure::Exhausted);
                }
                let delay = delay_for(class, attempt);
                tracing::debug!(url = %segment.url, attempt, ?delay, "retrying segment fetch");
                if !sleep_interruptible(delay, token).await {
                    return Err(FetchFailure::Cancelled);
                }
            }
        }
    }
}

async fn fetch_once(client: &Client, url: &str) -> Result<Bytes, ErrorClass> {
    let response = client.get(url).send().await.map_err(|e| ErrorClass::from_transport(&e))?;

    if response.status().is_success() {
        response
            .bytes()
            .await
            .map_err(|e| ErrorClass::from_transport(&e))
    } else {
        Err(ErrorClass::from_status(response.status()).unwrap_or(ErrorClass::ClientFatal))
    }
}

fn longest_missing_run(segments: &[SegmentRef], payloads: &BTreeMap<usize, SegmentPayload>) -> usize {
    let mut longest = 0usize;
    let mut current = 0usize;
    for segment in segments {
        if payloads.contains_key(&segment.index) {
            current = 0;
        } else {
            current += 1;
            longest = longest.max(current);
        }
    }
    longest
}

fn no_progress(_completed: usize, _total: usize) {}
