//! Test utilities and mock engines for cosim development.
//!
//! The fixtures in [`fixtures`] implement [`ModelEngine`](cosim_core::ModelEngine)
//! with fully predictable behavior so engine and bridge tests can assert
//! exact values, inject failures, and inspect the calls the bridge made.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

pub use fixtures::{Call, CallLog, FailingEngine, MirrorEngine, RecordingEngine};
