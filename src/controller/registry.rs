use dashmap::DashMap;

use crate::common::{DownloadError, JobId};
use crate::configs::FetchConfig;

struct ActiveJob {
    segment_count: Option<usize>,
}

/// Enforces the global concurrency rules (§5): at most `max_concurrent_jobs`
/// jobs system-wide, and a new job is rejected outright whenever any active
/// job has more than `large_job_segment_threshold` segments ("large file in
/// progress" mode).
#[derive(Default)]
pub struct JobRegistry {
    active: DashMap<JobId, ActiveJob>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn admit(&self, job_id: &JobId, config: &FetchConfig) -> Result<(), DownloadError> {
        if self.active.len() >= config.max_concurrent_jobs {
            return Err(DownloadError::Concurrency(format!(
                "max concurrent jobs ({}) reached",
                config.max_concurrent_jobs
            )));
        }

        if self
            .active
            .iter()
            .any(|e| e.segment_count.is_some_and(|c| c > config.large_job_segment_threshold))
        {
            return Err(DownloadError::Concurrency(
                "a large file is already in progress".to_string(),
            ));
        }

        self.active.insert(job_id.clone(), ActiveJob { segment_count: None });
        Ok(())
    }

    pub fn set_segment_count(&self, job_id: &JobId, segment_count: usize) {
        if let Some(mut entry) = self.active.get_mut(job_id) {
            entry.segment_count = Some(segment_count);
        }
    }

    pub fn release(&self, job_id: &JobId) {
        self.active.remove(job_id);
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_beyond_concurrency_cap() {
        let registry = JobRegistry::new();
        let mut config = FetchConfig::default();
        config.max_concurrent_jobs = 2;

        let a = JobId::generate();
        let b = JobId::generate();
        let c = JobId::generate();
        registry.admit(&a, &config).unwrap();
        registry.admit(&b, &config).unwrap();
        assert!(registry.admit(&c, &config).is_err());
    }

    #[test]
    fn rejects_new_job_while_large_file_in_progress() {
        let registry = JobRegistry::new();
        let mut config = FetchConfig::default();
        config.max_concurrent_jobs = 5;
        config.large_job_segment_threshold = 1000;

        let a = JobId::generate();
        registry.admit(&a, &config).unwrap();
        registry.set_segment_count(&a, 1500);

        let b = JobId::generate();
        assert!(registry.admit(&b, &config).is_err());
    }

    #[test]
    fn release_frees_a_concurrency_slot() {
        let registry = JobRegistry::new();
        let mut config = FetchConfig::default();
        config.max_concurrent_jobs = 1;

        let a = JobId::generate();
        registry.admit(&a, &config).unwrap();
        registry.release(&a);

        let b = JobId::generate();
        assert!(registry.admit(&b, &config).is_ok());
    }
}
