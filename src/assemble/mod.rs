pub mod blobstore;

use std::collections::BTreeMap;

use bytes::{Bytes, BytesMut};

pub use blobstore::{BlobStore, FileBlobStore};

use crate::common::{AnyResult, JobId};
use crate::configs::FetchConfig;
use crate::fetch::SegmentPayload;

/// TS packets are 188 bytes; large-regime part splits round down to this
/// boundary so each part begins on a packet boundary (§4.G, §8 property 8).
pub const TS_PACKET_SIZE: u64 = 188;

/// `{ job_id, ordinal, bytes }` (§3), persisted in the blob store under
/// `<job_id>_chunk_<ordinal>`.
#[derive(Debug, Clone)]
pub struct SpillChunk {
    pub job_id: JobId,
    pub ordinal: usize,
    pub bytes: Bytes,
}

impl SpillChunk {
    pub fn key(job_id: &JobId, ordinal: usize) -> String {
        format!("{job_id}_chunk_{ordinal}")
    }
}

/// Output of the assembler: either a single in-memory buffer (small regime)
/// or a description of the chunks already written to the blob store (large
/// regime), which the sink then streams out in order.
pub enum AssembledOutput {
    Whole(Bytes),
    Spilled { chunk_count: usize, total_size: u64 },
}

/// Concatenates init (if present) and segment payloads in index order,
/// choosing the small or large regime by total size (§4.G).
pub async fn assemble(
    job_id: &JobId,
    init_bytes: Option<&Bytes>,
    payloads: &BTreeMap<usize, SegmentPayload>,
    blob_store: &dyn BlobStore,
    config: &FetchConfig,
) -> AnyResult<AssembledOutput> {
    let total_size: u64 = init_bytes.map(|b| b.len() as u64).unwrap_or(0)
        + payloads.values().map(|p| p.bytes.len() as u64).sum::<u64>();

    if total_size <= config.large_regime_threshold_bytes {
        assemble_small(init_bytes, payloads)
    } else {
        assemble_large(job_id, init_bytes, payloads, blob_store, config).await
    }
}

fn assemble_small(
    init_bytes: Option<&Bytes>,
    payloads: &BTreeMap<usize, SegmentPayload>,
) -> AnyResult<AssembledOutput> {
    let total: usize = init_bytes.map(|b| b.len()).unwrap_or(0)
        + payloads.values().map(|p| p.bytes.len()).sum::<usize>();
    let mut buffer = BytesMut::with_capacity(total);
    if let Some(init) = init_bytes {
        buffer.extend_from_slice(init);
    }
    for payload in payloads.values() {
        buffer.extend_from_slice(&payload.bytes);
    }
    Ok(AssembledOutput::Whole(buffer.freeze()))
}

async fn assemble_large(
    job_id: &JobId,
    init_bytes: Option<&Bytes>,
    payloads: &BTreeMap<usize, SegmentPayload>,
    blob_store: &dyn BlobStore,
    config: &FetchConfig,
) -> AnyResult<AssembledOutput> {
    let mut ordinal = 0usize;
    let mut total_size = 0u64;
    let mut pending = BytesMut::new();

    if let Some(init) = init_bytes {
        pending.extend_from_slice(init);
        total_size += init.len() as u64;
    }

    for payload in payloads.values() {
        pending.extend_from_slice(&payload.bytes);
        total_size += payload.bytes.len() as u64;
        while pending.len() as u64 >= config.spill_chunk_bytes {
            let chunk_bytes = pending.split_to(config.spill_chunk_bytes as usize).freeze();
            let key = SpillChunk::key(job_id, ordinal);
            ordinal += 1;
            blob_store.put(&key, chunk_bytes).await?;
        }
    }

    if !pending.is_empty() {
        let key = SpillChunk::key(job_id, ordinal);
        ordinal += 1;
        blob_store.put(&key, pending.freeze()).await?;
    }

    Ok(AssembledOutput::Spilled {
        chunk_count: ordinal,
        total_size,
    })
}

/// Reads the spilled chunks for a job back out in order, yielding
/// byte-range-bounded parts for "part mode" (§4.G §3). `part_size` bytes
/// per part, rounded down to a multiple of `TS_PACKET_SIZE` so TS parts
/// begin on packet boundaries.
pub async fn read_part(
    job_id: &JobId,
    blob_store: &dyn BlobStore,
    chunk_count: usize,
    total_size: u64,
    part_index: usize,
    part_size: u64,
) -> AnyResult<Bytes> {
    let aligned_part_size = (part_size / TS_PACKET_SIZE) * TS_PACKET_SIZE;
    let part_start = part_index as u64 * aligned_part_size;
    let part_end = (part_start + aligned_part_size).min(total_size);
    if part_start >= part_end {
        return Ok(Bytes::new());
    }

    let mut out = BytesMut::with_capacity((part_end - part_start) as usize);
    let mut offset = 0u64;
    for ordinal in 0..chunk_count {
        let chunk = blob_store.get(&SpillChunk::key(job_id, ordinal)).await?;
        let chunk_start = offset;
        let chunk_end = offset + chunk.len() as u64;
        offset = chunk_end;

        let overlap_start = chunk_start.max(part_start);
        let overlap_end = chunk_end.min(part_end);
        if overlap_start < overlap_end {
            let local_start = (overlap_start - chunk_start) as usize;
            let local_end = (overlap_end - chunk_start) as usize;
            out.extend_from_slice(&chunk[local_start..local_end]);
        }
        if chunk_start >= part_end {
            break;
        }
    }
    Ok(out.freeze())
}

pub fn part_count(total_size: u64, part_size: u64) -> usize {
    let aligned = (part_size / TS_PACKET_SIZE) * TS_PACKET_SIZE;
    if aligned == 0 || total_size == 0 {
        return 0;
    }
    total_size.div_ceil(aligned) as usize
}

/// Deletes every spilled chunk for a job once the sink has acknowledged a
/// successful commit (§4.G step 4, §5 cancellation cleanup).
pub async fn delete_spill_chunks(
    job_id: &JobId,
    blob_store: &dyn BlobStore,
    chunk_count: usize,
) -> AnyResult<()> {
    for ordinal in 0..chunk_count {
        blob_store.delete(&SpillChunk::key(job_id, ordinal)).await?;
    }
    Ok(())
}

/// First-segment-as-init workaround (§4.G), invoked when the playlist is
/// FMP4 but carried no `#EXT-X-MAP`. Scans the first segment's leading
/// 500 KiB for a `moov` atom (four-byte size then ASCII `moov`); if found,
/// everything up to the atom's end becomes the synthetic init and segment 0
/// is replaced by the remainder. If not found, falls back to the first
/// 200 KiB as a synthetic init with segment 0 left as the remainder.
pub fn synthesize_init_from_first_segment(first_segment: &Bytes) -> (Bytes, Bytes) {
    const SCAN_WINDOW: usize = 500 * 1024;
    const FALLBACK_INIT_SIZE: usize = 200 * 1024;

    let scan_end = first_segment.len().min(SCAN_WINDOW);
    if let Some(moov_end) = find_moov_end(&first_segment[..scan_end]) {
        return (
            first_segment.slice(0..moov_end),
            first_segment.slice(moov_end..),
        );
    }

    let fallback = first_segment.len().min(FALLBACK_INIT_SIZE);
    (
        first_segment.slice(0..fallback),
        first_segment.slice(fallback..),
    )
}

fn find_moov_end(buf: &[u8]) -> Option<usize> {
    let mut i = 0usize;
    while i + 8 <= buf.len() {
        if &buf[i + 4..i + 8] == b"moov" {
            let size = u32::from_be_bytes(buf[i..i + 4].try_into().ok()?) as usize;
            if size >= 8 {
                return Some((i + size).min(buf.len()));
            }
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::SegmentPayload;

    #[test]
    fn small_regime_concatenates_in_order() {
        let init = Bytes::from_static(b"INIT");
        let mut payloads = BTreeMap::new();
        payloads.insert(0, SegmentPayload::new(0, Bytes::from_static(b"AA")));
        payloads.insert(1, SegmentPayload::new(1, Bytes::from_static(b"BB")));

        match assemble_small(Some(&init), &payloads).unwrap() {
            AssembledOutput::Whole(bytes) => assert_eq!(&bytes[..], b"INITAABB"),
            _ => panic!("expected whole"),
        }
    }

    #[tokio::test]
    async fn large_regime_spills_and_conserves_total_size() {
        let store = FileBlobStore::open_db(&format!("test-{}", uuid::Uuid::new_v4()))
            .await
            .unwrap();
        let job_id = JobId::generate();
        let mut payloads = BTreeMap::new();
        for i in 0..10 {
            payloads.insert(i, SegmentPayload::new(i, Bytes::from(vec![b'x'; 10])));
        }
        let mut config = FetchConfig::default();
        config.spill_chunk_bytes = 25;
        config.large_regime_threshold_bytes = 0;

        let output = assemble(&job_id, None, &payloads, &store, &config)
            .await
            .unwrap();
        match output {
            AssembledOutput::Spilled { chunk_count, total_size } => {
                assert_eq!(total_size, 100);
                let mut seen = 0u64;
                for ordinal in 0..chunk_count {
                    let bytes = store.get(&SpillChunk::key(&job_id, ordinal)).await.unwrap();
                    seen += bytes.len() as u64;
                }
                assert_eq!(seen, total_size);
            }
            _ => panic!("expected spilled"),
        }
    }

    #[test]
    fn synthesizes_init_from_moov_atom() {
        let mut buf = vec![0u8; 16];
        buf[4..8].copy_from_slice(b"moov");
        buf[0..4].copy_from_slice(&16u32.to_be_bytes());
        buf.extend_from_slice(b"remainder");
        let bytes = Bytes::from(buf);

        let (init, rest) = synthesize_init_from_first_segment(&bytes);
        assert_eq!(init.len(), 16);
        assert_eq!(&rest[..], b"remainder");
    }

    #[test]
    fn falls_back_to_200kib_when_no_moov_found() {
        let bytes = Bytes::from(vec![0u8; 300 * 1024]);
        let (init, rest) = synthesize_init_from_first_segment(&bytes);
        assert_eq!(init.len(), 200 * 1024);
        assert_eq!(rest.len(), 100 * 1024);
    }

    #[test]
    fn part_count_and_alignment() {
        assert_eq!(part_count(1_000_000_000, 500 * 1024 * 1024), 2);
        let aligned = (500u64 * 1024 * 1024 / TS_PACKET_SIZE) * TS_PACKET_SIZE;
        assert_eq!(aligned % TS_PACKET_SIZE, 0);
    }
}
