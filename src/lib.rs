//! Pushcore Library
//!
//! Push notification processing core: admission, dedup, collapse, grouping,
//! restore and the local notification store.

pub mod config;
pub mod error;
pub mod logging;
pub mod payload;
pub mod pipeline;
pub mod sqlite_persistence;
pub mod store;

// Re-export commonly used types for convenience
pub use config::PipelineSettings;
pub use error::PipelineError;
pub use payload::{Bundle, NotificationPayload};
pub use pipeline::{NotificationPipeline, PipelineContext, ProcessOptions, ProcessedBundleResult};
pub use store::{NotificationStore, SqliteNotificationStore};
