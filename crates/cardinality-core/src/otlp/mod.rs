//! OTLP key extraction (§4.A): decoded protobuf requests in, per-signal
//! schema records out. Wire-format detection and decoding lives in the
//! server crate; this module only ever sees an already-decoded request.

pub mod common;
pub mod logs;
pub mod metrics;
pub mod traces;

pub use logs::{walk as walk_logs, LogRecord, LogsWalkStats};
pub use metrics::{walk as walk_metrics, MetricRecord, MetricsWalkStats};
pub use traces::{templatize_span_name, walk as walk_traces, SpanRecord, TracesWalkStats};
