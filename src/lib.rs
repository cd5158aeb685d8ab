//! Datamill - performance-test runs into datasets
//!
//! Datamill takes raw JSON run results uploaded against a test, matches the
//! documents inside them to registered schemas, and turns them into
//! ordinal-indexed datasets through schema-bound transformers. Label values
//! computed from each dataset can then be filtered, projected and grouped by
//! fingerprint.
//!
//! # Quick Start
//!
//! ```ignore
//! use datamill::{Datamill, Extractor, TestDef, TransformerDef, UploadOptions};
//!
//! let mill = Datamill::open_default()?;
//! mill.create_schema("urn:acme:1.0", "acme")?;
//! let build = mill.add_transformer(
//!     TransformerDef::new("build", "urn:acme:1.0")
//!         .extractor(Extractor::new("value", "$.\"build-id\"", false)),
//! )?;
//! let test = mill.create_test(TestDef::new("acme"))?;
//! mill.bind_transformers(test.id, &[build])?;
//!
//! let run = mill.upload_run(test.id, r#"{"$schema": "urn:acme:1.0", "build-id": 1047}"#, UploadOptions::default())?;
//! mill.wait_idle();
//! let datasets = mill.datasets_of_run(run)?;
//! ```
//!
//! # Architecture
//!
//! `datamill-core` holds the I/O-free types and algorithms: path
//! expressions, fingerprints and label value filtering. `datamill-engine`
//! runs the pipeline on a worker pool behind the [`Datamill`] facade.

pub use datamill_core::*;
pub use datamill_engine::*;
