use serde::{Deserialize, Serialize};

/// Tunables for the segment scheduler and retry policy (§4.D/§4.E). Every
/// field defaults to the value the spec hard-codes; the config file only
/// needs to name the fields an operator wants to override.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct FetchConfig {
    /// Batch size used when the playlist has more than `large_playlist_threshold` segments.
    pub batch_size_large: usize,
    /// Batch size used otherwise.
    pub batch_size_small: usize,
    /// Segment count above which the "large playlist" batch size/delay apply.
    pub large_playlist_threshold: usize,
    /// Inter-batch delay (ms) used for large playlists.
    pub inter_batch_delay_large_ms: u64,
    /// Inter-batch delay (ms) used otherwise.
    pub inter_batch_delay_small_ms: u64,
    /// Playlist size above which a large playlist is rejected while another
    /// job is already running (§5 "large file in progress" rule).
    pub large_job_segment_threshold: usize,
    /// Maximum concurrent jobs system-wide (§5).
    pub max_concurrent_jobs: usize,
    /// Primary-pass attempt budget per segment.
    pub primary_attempts: u32,
    /// Recovery-pass attempt budget per segment.
    pub recovery_attempts: u32,
    /// Per-segment stagger delay (ms) in the recovery pass.
    pub recovery_stagger_ms: u64,
    /// Attempt budget for the init segment.
    pub init_attempts: u32,
    /// Required success ratio after the recovery pass (§3 invariant 2).
    pub success_floor: f64,
    /// Maximum tolerated run of consecutive missing indices (§3 invariant 4).
    pub max_consecutive_missing: usize,
    /// Soft ceiling (seconds) for the whole fetch phase (§5).
    pub stall_timeout_secs: u64,
    /// Threshold (bytes) above which the assembler switches to the large
    /// (spilling) regime (§4.G).
    pub large_regime_threshold_bytes: u64,
    /// Spill chunk size (bytes) in the large regime.
    pub spill_chunk_bytes: u64,
    /// Output part size (bytes) in part mode.
    pub part_size_bytes: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            batch_size_large: 5,
            batch_size_small: 10,
            large_playlist_threshold: 800,
            inter_batch_delay_large_ms: 200,
            inter_batch_delay_small_ms: 100,
            large_job_segment_threshold: 1000,
            max_concurrent_jobs: 2,
            primary_attempts: 5,
            recovery_attempts: 7,
            recovery_stagger_ms: 200,
            init_attempts: 4,
            success_floor: 0.98,
            max_consecutive_missing: 3,
            stall_timeout_secs: 600,
            large_regime_threshold_bytes: 1024 * 1024 * 1024,
            spill_chunk_bytes: 32 * 1024 * 1024,
            part_size_bytes: 500 * 1024 * 1024,
        }
    }
}

impl FetchConfig {
    pub fn batch_size(&self, segment_count: usize) -> usize {
        if segment_count > self.large_playlist_threshold {
            self.batch_size_large
        } else {
            self.batch_size_small
        }
    }

    pub fn inter_batch_delay_ms(&self, segment_count: usize) -> u64 {
        if segment_count > 500 {
            self.inter_batch_delay_large_ms
        } else {
            self.inter_batch_delay_small_ms
        }
    }
}
