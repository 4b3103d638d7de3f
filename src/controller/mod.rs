pub mod job;
pub mod registry;

pub use job::DownloadJob;
pub use registry::JobRegistry;

use std::path::PathBuf;
use std::sync::Arc;

use reqwest::Client;

use crate::assemble::{
    assemble, delete_spill_chunks, part_count, read_part, synthesize_init_from_first_segment,
    AssembledOutput, BlobStore, FileBlobStore, SpillChunk,
};
use crate::common::{AnyResult, DownloadError, FormatHint, HttpClient, JobId};
use crate::fetch::{fetch_all, FetchOutcome, SegmentPayload};
use crate::playlist::resolve_playlist;
use crate::progress::{JobInfo, ProgressSink};
use crate::sink::{FileSink, OutputSink};
use crate::validate::{check_format, validate_fetch};

/// Top-level states the controller moves through, linearly, with any
/// failure or cancellation jumping straight to a terminal state (§4.I).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Resolving,
    Fetching,
    Validating,
    Assembling,
    Writing,
    Done,
    Failed,
    Cancelled,
}

impl ControllerState {
    fn status_text(self) -> &'static str {
        match self {
            Self::Resolving => "resolving",
            Self::Fetching => "fetching",
            Self::Validating => "validating",
            Self::Assembling => "assembling",
            Self::Writing => "writing",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

pub enum JobOutcome {
    Done { output_path: PathBuf },
    DonePartitioned { part_paths: Vec<PathBuf> },
    Cancelled,
    Failed(DownloadError),
}

/// Internal shape of a finished write phase, before it's translated into
/// the public `JobOutcome`.
enum PipelineOutput {
    Single(PathBuf),
    Parts(Vec<PathBuf>),
}

/// Sequences C -> D -> F -> G -> H; owns the cancellation scope and
/// publishes progress/status events (§4.I).
pub struct PipelineController {
    client: Client,
    registry: Arc<JobRegistry>,
    progress: Arc<dyn ProgressSink>,
}

impl PipelineController {
    pub fn new(registry: Arc<JobRegistry>, progress: Arc<dyn ProgressSink>) -> AnyResult<Self> {
        Ok(Self {
            client: HttpClient::new()?,
            registry,
            progress,
        })
    }

    pub async fn run(&self, job: DownloadJob) -> JobOutcome {
        if let Err(err) = self.registry.admit(&job.id, &job.settings) {
            self.progress.set_status(&job.id, &err.to_string());
            return JobOutcome::Failed(err);
        }

        let result = self.run_inner(&job).await;
        self.registry.release(&job.id);

        match result {
            Ok(PipelineOutput::Single(output_path)) => {
                self.progress.set_status(&job.id, ControllerState::Done.status_text());
                self.progress.set_progress(&job.id, 100);
                JobOutcome::Done { output_path }
            }
            Ok(PipelineOutput::Parts(part_paths)) => {
                self.progress.set_status(&job.id, ControllerState::Done.status_text());
                self.progress.set_progress(&job.id, 100);
                JobOutcome::DonePartitioned { part_paths }
            }
            Err(DownloadError::Cancelled) => {
                self.progress.set_cancelled(&job.id);
                JobOutcome::Cancelled
            }
            Err(err) => {
                self.progress.set_status(&job.id, &err.to_string());
                JobOutcome::Failed(err)
            }
        }
    }

    async fn run_inner(&self, job: &DownloadJob) -> Result<PipelineOutput, DownloadError> {
        // Resolving
        self.progress.set_status(&job.id, ControllerState::Resolving.status_text());
        let resolved = tokio::select! {
            _ = job.cancel_token.cancelled() => return Err(DownloadError::Cancelled),
            result = resolve_playlist(&self.client, &job.source_url) => {
                result.map_err(|e| DownloadError::NetworkPlaylist(e.to_string()))?
            }
        };

        if resolved.segments.is_empty() {
            return Err(DownloadError::NoSegments);
        }

        self.registry.set_segment_count(&job.id, resolved.segments.len());
        self.progress.set_info(
            &job.id,
            JobInfo {
                filename: Some(job.output_name.clone()),
                ..Default::default()
            },
        );

        // Fetching (contributes 85% of total progress, climbing linearly
        // with segments completed, per §4.I)
        self.progress.set_status(&job.id, ControllerState::Fetching.status_text());
        let fetch_timeout = std::time::Duration::from_secs(job.settings.stall_timeout_secs);
        let progress = self.progress.clone();
        let job_id = job.id.clone();
        let on_progress = move |completed: usize, total: usize| {
            if total == 0 {
                return;
            }
            let percent = ((completed as f64 / total as f64) * 85.0).floor() as u8;
            progress.set_progress(&job_id, percent);
        };
        let fetch_outcome = tokio::select! {
            _ = job.cancel_token.cancelled() => return Err(DownloadError::Cancelled),
            _ = tokio::time::sleep(fetch_timeout) => {
                return Err(DownloadError::StallTimeout(fetch_timeout));
            }
            result = fetch_all(
                &self.client,
                &resolved.segments,
                resolved.init.as_ref(),
                &job.settings,
                &job.cancel_token,
                &on_progress,
            ) => result?,
        };
        self.progress.set_progress(&job.id, 85);

        let (init_bytes, payloads) = apply_init_workaround(fetch_outcome, resolved.format_hint);

        // Validating
        self.progress.set_status(&job.id, ControllerState::Validating.status_text());
        if job.cancel_token.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }
        let validation_view = FetchOutcome {
            total_segments: resolved.segments.len(),
            payloads: payloads.clone(),
            init_bytes: init_bytes.clone(),
        };
        let report = validate_fetch(&validation_view, &job.settings)?;
        tracing::info!(
            success_rate = report.success_rate,
            missing = report.missing_indices.len(),
            "validation passed"
        );
        self.progress.set_progress(&job.id, 90);

        // Assembling
        self.progress.set_status(&job.id, ControllerState::Assembling.status_text());
        let blob_store = FileBlobStore::open_db(&job.id.to_string())
            .await
            .map_err(|e| DownloadError::SinkFailure(e.to_string()))?;

        let assembled = assemble(&job.id, init_bytes.as_ref(), &payloads, &blob_store, &job.settings)
            .await
            .map_err(|e| DownloadError::SinkFailure(e.to_string()))?;

        check_assembled_format(&job.id, &assembled, &blob_store, resolved.format_hint).await?;
        self.progress.set_progress(&job.id, 95);

        // Writing
        self.progress.set_status(&job.id, ControllerState::Writing.status_text());
        let ext = resolved.format_hint.as_ext();
        let sink = FileSink::new(&job.output_dir);

        if job.part_mode {
            if let AssembledOutput::Spilled { chunk_count, total_size } = &assembled {
                let (chunk_count, total_size) = (*chunk_count, *total_size);
                let part_paths = self
                    .write_parts(
                        &job.id,
                        &sink,
                        &job.output_name,
                        ext,
                        chunk_count,
                        total_size,
                        &blob_store,
                        &job.cancel_token,
                        job.settings.part_size_bytes,
                    )
                    .await?;
                return Ok(PipelineOutput::Parts(part_paths));
            }
            tracing::debug!("part-mode requested but output fit the small regime, writing a single file");
        }

        let output_name = format!("{}.{}", job.output_name, ext);
        let output_path = self
            .write_assembled(&job.id, &sink, &output_name, assembled, &blob_store, &job.cancel_token)
            .await?;

        Ok(PipelineOutput::Single(output_path))
    }

    async fn write_parts(
        &self,
        job_id: &JobId,
        sink: &FileSink,
        base_name: &str,
        ext: &str,
        chunk_count: usize,
        total_size: u64,
        blob_store: &dyn BlobStore,
        cancel_token: &tokio_util::sync::CancellationToken,
        part_size_bytes: u64,
    ) -> Result<Vec<PathBuf>, DownloadError> {
        let parts = part_count(total_size, part_size_bytes);
        let mut paths = Vec::with_capacity(parts);

        for part_index in 0..parts {
            if cancel_token.is_cancelled() {
                let _ = delete_spill_chunks(job_id, blob_store, chunk_count).await;
                return Err(DownloadError::Cancelled);
            }

            let bytes = read_part(job_id, blob_store, chunk_count, total_size, part_index, part_size_bytes)
                .await
                .map_err(|e| DownloadError::SinkFailure(e.to_string()))?;

            let part_name = format!("{base_name}_part{part_index}.{ext}");
            let mut handle = sink.begin(&part_name, Some(bytes.len() as u64)).await?;

            match sink.write(&mut handle, &bytes).await {
                Ok(()) => {
                    sink.commit(handle).await?;
                    paths.push(sink.dir.clone().join(&part_name));
                }
                Err(err) => {
                    sink.abort(handle).await;
                    let _ = delete_spill_chunks(job_id, blob_store, chunk_count).await;
                    return Err(err);
                }
            }
        }

        if let Err(e) = delete_spill_chunks(job_id, blob_store, chunk_count).await {
            tracing::warn!(error = %e, "failed to clean up spill chunks after part-mode commit");
        }

        Ok(paths)
    }

    async fn write_assembled(
        &self,
        job_id: &JobId,
        sink: &FileSink,
        output_name: &str,
        assembled: AssembledOutput,
        blob_store: &dyn BlobStore,
        cancel_token: &tokio_util::sync::CancellationToken,
    ) -> Result<PathBuf, DownloadError> {
        let expected_size = match &assembled {
            AssembledOutput::Whole(bytes) => Some(bytes.len() as u64),
            AssembledOutput::Spilled { total_size, .. } => Some(*total_size),
        };

        let mut handle = sink.begin(output_name, expected_size).await?;

        let chunk_count_if_spilled = match &assembled {
            AssembledOutput::Spilled { chunk_count, .. } => Some(*chunk_count),
            AssembledOutput::Whole(_) => None,
        };

        let write_result = match &assembled {
            AssembledOutput::Whole(bytes) => sink.write(&mut handle, bytes).await,
            AssembledOutput::Spilled { chunk_count, .. } => {
                self.stream_spilled_into_sink(sink, &mut handle, job_id, blob_store, *chunk_count, cancel_token)
                    .await
            }
        };

        match write_result {
            Ok(()) => {
                sink.commit(handle).await?;
                if let Some(chunk_count) = chunk_count_if_spilled {
                    if let Err(e) = delete_spill_chunks(job_id, blob_store, chunk_count).await {
                        tracing::warn!(error = %e, "failed to clean up spill chunks after commit");
                    }
                }
                Ok(sink.dir.clone().join(output_name))
            }
            Err(err) => {
                sink.abort(handle).await;
                if let Some(chunk_count) = chunk_count_if_spilled {
                    let _ = delete_spill_chunks(job_id, blob_store, chunk_count).await;
                }
                Err(err)
            }
        }
    }

    async fn stream_spilled_into_sink(
        &self,
        sink: &FileSink,
        handle: &mut crate::sink::file::FileSinkHandle,
        job_id: &JobId,
        blob_store: &dyn BlobStore,
        chunk_count: usize,
        cancel_token: &tokio_util::sync::CancellationToken,
    ) -> Result<(), DownloadError> {
        for ordinal in 0..chunk_count {
            if cancel_token.is_cancelled() {
                return Err(DownloadError::Cancelled);
            }
            let key = SpillChunk::key(job_id, ordinal);
            let bytes = blob_store
                .get(&key)
                .await
                .map_err(|e| DownloadError::SinkFailure(e.to_string()))?;
            sink.write(handle, &bytes).await?;
        }
        Ok(())
    }
}

/// Invokes the first-segment-as-init workaround (§4.G) when the playlist
/// format is FMP4 and the scheduler returned no init segment.
fn apply_init_workaround(
    outcome: FetchOutcome,
    format_hint: FormatHint,
) -> (Option<bytes::Bytes>, std::collections::BTreeMap<usize, SegmentPayload>) {
    let FetchOutcome {
        mut payloads,
        init_bytes,
        ..
    } = outcome;

    if init_bytes.is_none() && format_hint == FormatHint::Fmp4 {
        if let Some(first) = payloads.get(&0).cloned() {
            let (synthetic_init, remainder) = synthesize_init_from_first_segment(&first.bytes);
            payloads.insert(0, SegmentPayload::new(0, remainder));
            return (Some(synthetic_init), payloads);
        }
    }

    (init_bytes, payloads)
}

/// Format check on the assembled output (§4.F, §6). For the small regime
/// the whole buffer is already in hand; for the large regime only the
/// first spill chunk is read back, since the format marker always falls
/// within the first few bytes of the logical output.
async fn check_assembled_format(
    job_id: &JobId,
    assembled: &AssembledOutput,
    blob_store: &dyn BlobStore,
    format_hint: FormatHint,
) -> Result<(), DownloadError> {
    match assembled {
        AssembledOutput::Whole(bytes) => check_format(bytes, format_hint),
        AssembledOutput::Spilled { .. } => {
            let first_chunk = blob_store
                .get(&SpillChunk::key(job_id, 0))
                .await
                .map_err(|e| DownloadError::SinkFailure(e.to_string()))?;
            check_format(&first_chunk, format_hint)
        }
    }
}
