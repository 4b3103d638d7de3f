use dashmap::DashMap;

use crate::common::JobId;

/// Metadata published once a job has resolved enough of the playlist to
/// know it (§6 `set_info`).
#[derive(Debug, Clone, Default)]
pub struct JobInfo {
    pub filename: Option<String>,
    pub quality_label: Option<String>,
    pub video_id: Option<String>,
    pub start_time: Option<String>,
}

/// A snapshot of one job's progress, as seen by a reader of `progress_state`.
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    pub percent: u8,
    pub phase_text: String,
    pub info: JobInfo,
    pub cancelled: bool,
}

impl Default for ProgressSnapshot {
    fn default() -> Self {
        Self {
            percent: 0,
            phase_text: "queued".to_string(),
            info: JobInfo::default(),
            cancelled: false,
        }
    }
}

/// Write-only collaborator the core publishes progress through (§6). The
/// default in-process implementation is a process-wide map plus `tracing`
/// events; a caller embedding this crate may supply its own sink (e.g. to
/// forward to a UI) without the core depending on any particular transport.
pub trait ProgressSink: Send + Sync {
    fn set_progress(&self, job_id: &JobId, percent: u8);
    fn set_status(&self, job_id: &JobId, text: &str);
    fn set_info(&self, job_id: &JobId, info: JobInfo);
    fn set_cancelled(&self, job_id: &JobId);
}

/// Process-wide `progress_state` map (§5): single-writer-per-job, readers
/// see a snapshot per key.
#[derive(Default)]
pub struct InProcessProgress {
    state: DashMap<JobId, ProgressSnapshot>,
}

impl InProcessProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self, job_id: &JobId) -> Option<ProgressSnapshot> {
        self.state.get(job_id).map(|entry| entry.clone())
    }

    pub fn remove(&self, job_id: &JobId) {
        self.state.remove(job_id);
    }
}

impl ProgressSink for InProcessProgress {
    fn set_progress(&self, job_id: &JobId, percent: u8) {
        tracing::debug!(%job_id, percent, "progress");
        self.state
            .entry(job_id.clone())
            .or_default()
            .percent = percent.min(100);
    }

    fn set_status(&self, job_id: &JobId, text: &str) {
        tracing::info!(%job_id, status = text, "status");
        self.state
            .entry(job_id.clone())
            .or_default()
            .phase_text = text.to_string();
    }

    fn set_info(&self, job_id: &JobId, info: JobInfo) {
        self.state.entry(job_id.clone()).or_default().info = info;
    }

    fn set_cancelled(&self, job_id: &JobId) {
        tracing::warn!(%job_id, "job cancelled");
        self.state.entry(job_id.clone()).or_default().cancelled = true;
    }
}
