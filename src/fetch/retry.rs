use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

/// Error class a failed fetch is bucketed into (§3 `RetryState`, §4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    RateLimited,
    ServerTransient,
    Transport,
    ClientFatal,
    Cancelled,
}

impl ErrorClass {
    /// Classifies an HTTP response status into a retry class, or `None` if
    /// the status was itself a success (caller should not be retrying).
    pub fn from_status(status: reqwest::StatusCode) -> Option<Self> {
        match status.as_u16() {
            429 | 503 => Some(Self::RateLimited),
            500 | 502 | 504 => Some(Self::ServerTransient),
            408 => Some(Self::Transport),
            400..=499 => Some(Self::ClientFatal),
            _ => None,
        }
    }

    pub fn from_transport(_err: &reqwest::Error) -> Self {
        Self::Transport
    }

    pub fn is_retryable(self) -> bool {
        !matches!(self, Self::ClientFatal | Self::Cancelled)
    }
}

/// Per-segment retry/backoff policy, grounded on the same attempt-counter
/// shape used elsewhere in this codebase's reconnect backoff, generalized
/// to the per-class delay table in §4.E.
pub struct Backoff {
    class: ErrorClass,
    attempt: u32,
}

impl Backoff {
    pub fn new(class: ErrorClass) -> Self {
        Self { attempt: 0, class }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Returns the next backoff delay and increments the attempt counter.
    /// Jitter is drawn fresh on every call.
    pub fn next(&mut self) -> Duration {
        self.attempt += 1;
        delay_for(self.class, self.attempt)
    }
}

/// Computes the delay for a given error class and 1-based attempt number,
/// per the table in §4.E. All delays are clamped at zero (they never go
/// negative, but the clamp documents the invariant tests check).
pub fn delay_for(class: ErrorClass, attempt: u32) -> Duration {
    let mut rng = rand::thread_rng();
    let base = match class {
        ErrorClass::RateLimited => {
            let growth = 2u64.saturating_pow(attempt.saturating_sub(1));
            2000u64.saturating_mul(growth) + rng.gen_range(0..1000)
        }
        ErrorClass::ServerTransient => {
            let growth = 2u64.saturating_pow(attempt.saturating_sub(1));
            1500u64.saturating_mul(growth) + rng.gen_range(0..500)
        }
        ErrorClass::Transport => {
            1000u64.saturating_add(1000u64.saturating_mul(attempt as u64 - 1)) + rng.gen_range(0..500)
        }
        ErrorClass::ClientFatal | ErrorClass::Cancelled => 0,
    };
    Duration::from_millis(base)
}

/// Sleeps for `duration`, waking every 100 ms to check `token`. Returns
/// `false` if cancellation was observed before the sleep completed, so no
/// attempt waits more than 100 ms past a cancel request (§4.E, §8 property 5).
pub async fn sleep_interruptible(duration: Duration, token: &CancellationToken) -> bool {
    const WAKE_INTERVAL: Duration = Duration::from_millis(100);

    let mut remaining = duration;
    loop {
        if token.is_cancelled() {
            return false;
        }
        let step = remaining.min(WAKE_INTERVAL);
        tokio::select! {
            _ = token.cancelled() => return false,
            _ = tokio::time::sleep(step) => {}
        }
        remaining = remaining.saturating_sub(step);
        if remaining.is_zero() {
            return !token.is_cancelled();
        }
    }
}
