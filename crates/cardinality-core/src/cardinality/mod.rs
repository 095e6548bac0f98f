//! Per-key cardinality tracking: HyperLogLog sketches (§4.B) and bounded
//! value-sample buckets.

mod hll;
mod samples;

pub use hll::HyperLogLog;
pub use samples::SampleBucket;
