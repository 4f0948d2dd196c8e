//! Event exporter workspace: end-to-end tests for the exporter pipeline.
//!
//! This is a virtual package that provides workspace-level integration tests.
//! The actual functionality is provided by the workspace member crate:
//!
//! - `nrevent-exporter`: OTLP metrics to New Relic Event API exporter
