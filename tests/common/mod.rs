//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{bundle, TestPipeline};
//!
//! #[test]
//! fn test_delivery() {
//!     let t = TestPipeline::new();
//!     let result = t.pipeline.process_bundle(bundle("n1", "Hello"));
//!     assert!(result.outcome.unwrap().shown);
//! }
//! ```

#[allow(dead_code)]
mod constants;
#[allow(dead_code)]
mod fakes;
#[allow(dead_code)]
mod harness;

// Public API - this is what tests import
#[allow(unused_imports)]
pub use constants::*;
#[allow(unused_imports)]
pub use fakes::{
    FakeHost, FakeRenderer, FixedExtender, ForegroundBehavior, PanickingExtender, QueueScheduler,
    RecordingHandlers, RecordingPreview, ScriptedForegroundHandler,
};
#[allow(unused_imports)]
pub use harness::{bundle, bundle_with, collapsing, fast_settings, grouped, TestPipeline};
