//! Wire-format decoding for OTLP/HTTP (§6 "ADDED — transport detail").
//!
//! `cardinality-core` never sees wire bytes, only decoded
//! `opentelemetry_proto` request types — this module is the boundary that
//! turns a request body + Content-Type header into one of those. The
//! `opentelemetry-proto` crate's `with-serde` feature already speaks
//! proto3 JSON (camelCase field names, base64 bytes, enum names), so
//! unlike a hand-rolled wire decoder we don't need a separate
//! JSON-normalization pass before handing the value to `serde_json`.
//!
//! `Content-Encoding: gzip` is handled upstream of this module by a
//! `tower_http::decompression::RequestDecompressionLayer` on the router —
//! by the time a body reaches [`parse_request`] it is already plain bytes.

use anyhow::{anyhow, Context, Result};
use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use prost::Message;
use serde::de::DeserializeOwned;

/// Supported input formats for an OTLP request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// Binary protobuf (default, most efficient).
    Protobuf,
    /// JSON (OTLP spec required).
    Json,
    /// Newline-delimited JSON, one request object per line.
    Jsonl,
}

impl InputFormat {
    /// Detect format from a Content-Type header. Jsonl before Json before
    /// the Protobuf default, matching the reference server's precedence.
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        match content_type {
            Some(ct) => {
                let lower = ct.to_ascii_lowercase();
                if lower.contains("application/x-ndjson") || lower.contains("application/jsonl") {
                    Self::Jsonl
                } else if lower.contains("application/json") {
                    Self::Json
                } else {
                    Self::Protobuf
                }
            }
            None => Self::Protobuf,
        }
    }
}

/// Request types that can be decoded from protobuf or JSON and merged
/// across JSONL lines.
pub trait OtlpSignalRequest: Message + Default + DeserializeOwned {
    const JSONL_EMPTY_ERROR: &'static str;
    fn merge(&mut self, other: Self);
    fn is_empty(&self) -> bool;
}

impl OtlpSignalRequest for ExportLogsServiceRequest {
    const JSONL_EMPTY_ERROR: &'static str = "JSONL input contained no valid log records";
    fn merge(&mut self, mut other: Self) {
        self.resource_logs.append(&mut other.resource_logs);
    }
    fn is_empty(&self) -> bool {
        self.resource_logs.is_empty()
    }
}

impl OtlpSignalRequest for ExportMetricsServiceRequest {
    const JSONL_EMPTY_ERROR: &'static str = "JSONL input contained no valid metric records";
    fn merge(&mut self, mut other: Self) {
        self.resource_metrics.append(&mut other.resource_metrics);
    }
    fn is_empty(&self) -> bool {
        self.resource_metrics.is_empty()
    }
}

impl OtlpSignalRequest for ExportTraceServiceRequest {
    const JSONL_EMPTY_ERROR: &'static str = "JSONL input contained no valid spans";
    fn merge(&mut self, mut other: Self) {
        self.resource_spans.append(&mut other.resource_spans);
    }
    fn is_empty(&self) -> bool {
        self.resource_spans.is_empty()
    }
}

/// Decode a request body of the given format into `R`.
pub fn parse_request<R: OtlpSignalRequest>(bytes: &[u8], format: InputFormat) -> Result<R> {
    match format {
        InputFormat::Protobuf => R::decode(bytes).context("failed to decode OTLP protobuf message"),
        InputFormat::Json => {
            serde_json::from_slice(bytes).context("failed to parse OTLP JSON request body")
        }
        InputFormat::Jsonl => parse_jsonl(bytes),
    }
}

fn parse_jsonl<R: OtlpSignalRequest>(bytes: &[u8]) -> Result<R> {
    let text = std::str::from_utf8(bytes).context("JSONL input is not valid UTF-8")?;

    let mut merged = R::default();
    let mut saw_line = false;

    for (line_num, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let request: R = serde_json::from_str(trimmed)
            .with_context(|| format!("failed to parse JSONL line {}", line_num + 1))?;
        merged.merge(request);
        saw_line = true;
    }

    if !saw_line || merged.is_empty() {
        return Err(anyhow!(R::JSONL_EMPTY_ERROR));
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_ndjson_before_json() {
        assert_eq!(
            InputFormat::from_content_type(Some("application/x-ndjson; charset=utf-8")),
            InputFormat::Jsonl
        );
    }

    #[test]
    fn unrecognized_content_type_falls_back_to_protobuf() {
        assert_eq!(InputFormat::from_content_type(Some("text/plain")), InputFormat::Protobuf);
        assert_eq!(InputFormat::from_content_type(None), InputFormat::Protobuf);
    }

    #[test]
    fn empty_jsonl_body_is_rejected() {
        let result: Result<ExportLogsServiceRequest> = parse_request(b"\n\n  \n", InputFormat::Jsonl);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("no valid log records"));
    }

    #[test]
    fn jsonl_lines_merge_into_one_request() {
        let line = r#"{"resourceLogs":[{"scopeLogs":[{"logRecords":[{"body":{"stringValue":"hi"}}]}]}]}"#;
        let body = format!("{line}\n{line}\n");
        let request: ExportLogsServiceRequest =
            parse_request(body.as_bytes(), InputFormat::Jsonl).unwrap();
        assert_eq!(request.resource_logs.len(), 2);
    }
}
