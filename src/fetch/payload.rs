use bytes::Bytes;

/// `{ index, bytes }` (§3). Produced by the scheduler/retry policy, consumed
/// by the assembler. Owned exclusively by the pipeline from fetch to
/// assembly — never shared across the cancellation boundary.
#[derive(Debug, Clone)]
pub struct SegmentPayload {
    pub index: usize,
    pub bytes: Bytes,
}

impl SegmentPayload {
    pub fn new(index: usize, bytes: Bytes) -> Self {
        Self { index, bytes }
    }
}
