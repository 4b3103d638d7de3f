pub mod payload;
pub mod retry;
pub mod scheduler;

pub use payload::SegmentPayload;
pub use retry::{Backoff, ErrorClass};
pub use scheduler::{fetch_all, FetchOutcome};
