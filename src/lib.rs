//! Thin root crate: wires CLI-resolved configuration into
//! `cardinality-server`. The actual ingest/query logic lives in
//! `cardinality-core`; `cardinality-config` layers configuration sources;
//! this crate only composes the two for `main.rs`.

pub use cardinality_config::RuntimeConfig;
pub use cardinality_server::{run, run_with_config};
