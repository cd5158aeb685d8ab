//! Pipeline Integration Tests
//!
//! End-to-end tests through the `Datamill` facade, organized by area:
//! - Ingest: schema matching, transformers, dataset ordinals, events
//! - Labels: include/exclude, multi-select filters, sorting, fingerprints
//! - Recalculation: new identities, progress, cancellation
//! - Registry: test listing and deletion
//! - Runs: trash, queries, counts
//! - Config: file-based configuration

#[path = "../common/mod.rs"]
mod common;

mod ingest;
mod labels;
mod recalc;
mod registry;
