use crate::common::{DownloadError, FormatHint};
use crate::configs::FetchConfig;
use crate::fetch::FetchOutcome;

/// Summary the controller logs and forwards to progress reporting after a
/// successful validation pass (§4.F).
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub missing_indices: Vec<usize>,
    pub success_rate: f64,
    pub max_consecutive_missing: usize,
}

const LEADING_PREFIX_LEN: usize = 10;

/// Runs after the scheduler returns (§4.F). Fatal on: success rate below the
/// floor, any missing index inside the leading prefix, too long a gap run,
/// the first payload not being index 0, or any non-leading payload of
/// length 0. Tolerates (and warns on) a small number of scattered gaps.
pub fn validate_fetch(
    outcome: &FetchOutcome,
    config: &FetchConfig,
) -> Result<ValidationReport, DownloadError> {
    let total = outcome.total_segments;
    let missing_indices: Vec<usize> = (0..total)
        .filter(|i| !outcome.payloads.contains_key(i))
        .collect();

    let success_rate = (total - missing_indices.len()) as f64 / total.max(1) as f64;
    let max_consecutive_missing = longest_run(&missing_indices);

    if success_rate < config.success_floor {
        return Err(DownloadError::FetchFloor {
            message: format!(
                "success rate {:.4} below floor {:.4}",
                success_rate, config.success_floor
            ),
            max_consecutive_missing,
        });
    }

    let leading_bound = LEADING_PREFIX_LEN.min(total);
    if missing_indices.iter().any(|&i| i < leading_bound) {
        return Err(DownloadError::FetchFloor {
            message: format!("missing a segment within the leading {leading_bound} indices"),
            max_consecutive_missing,
        });
    }

    if max_consecutive_missing > config.max_consecutive_missing {
        return Err(DownloadError::FetchFloor {
            message: format!("longest missing run {max_consecutive_missing} exceeds bound"),
            max_consecutive_missing,
        });
    }

    if let Some((&first_index, first_payload)) = outcome.payloads.iter().next() {
        if first_index != 0 {
            return Err(DownloadError::FetchFloor {
                message: format!("first delivered payload has index {first_index}, expected 0"),
                max_consecutive_missing,
            });
        }
        let _ = first_payload;
    }

    for (index, payload) in outcome.payloads.iter() {
        if *index >= leading_bound && payload.bytes.is_empty() {
            return Err(DownloadError::FetchFloor {
                message: format!("payload at index {index} is zero-length"),
                max_consecutive_missing,
            });
        }
    }

    if !missing_indices.is_empty() {
        tracing::warn!(
            count = missing_indices.len(),
            "tolerating {} missing segment(s) within the allowed gap bound",
            missing_indices.len()
        );
    }

    Ok(ValidationReport {
        missing_indices,
        success_rate,
        max_consecutive_missing,
    })
}

/// Format check on assembled output bytes (§4.F, §6). TS requires the
/// MPEG-TS sync byte at offset 0 but only warns if absent; FMP4 requires
/// the `ftyp` marker at offset 4 and is fatal if absent.
pub fn check_format(bytes: &[u8], format_hint: FormatHint) -> Result<(), DownloadError> {
    match format_hint {
        FormatHint::Ts => {
            if bytes.first() != Some(&0x47) {
                tracing::warn!("assembled TS output does not start with the 0x47 sync byte");
            }
            Ok(())
        }
        FormatHint::Fmp4 => {
            if bytes.len() < 8 || &bytes[4..8] != b"ftyp" {
                return Err(DownloadError::FormatInvalid(
                    "assembled FMP4 output is missing the ftyp marker at offset 4".to_string(),
                ));
            }
            Ok(())
        }
        FormatHint::Unknown => Ok(()),
    }
}

fn longest_run(missing: &[usize]) -> usize {
    if missing.is_empty() {
        return 0;
    }
    let mut longest = 1usize;
    let mut current = 1usize;
    for window in missing.windows(2) {
        if window[1] == window[0] + 1 {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 1;
        }
    }
    longest
}
