//! Failure taxonomy of the notification pipeline.
//!
//! None of these ever reach the host through the public pipeline operations;
//! they are logged at the point where the pipeline degrades to its default.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A nested JSON field could not be parsed. The field is treated as absent.
    #[error("Malformed payload field '{field}': {source}")]
    MalformedPayload {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// A store read or write failed. The delivery may be lost.
    #[error("Store transaction failed: {0:#}")]
    StoreTransaction(anyhow::Error),

    /// The platform could not report the notifications currently in the shade.
    #[error("Platform query failed: {0:#}")]
    PlatformQuery(anyhow::Error),

    /// One row of the restore pass could not be re-driven.
    #[error("Failed to restore row {row_id}: {reason}")]
    RestoreRow { row_id: i64, reason: String },

    /// A host-registered hook returned an error or panicked.
    #[error("Hook '{hook}' failed: {reason}")]
    DeveloperHook { hook: &'static str, reason: String },
}

impl PipelineError {
    pub fn store(err: anyhow::Error) -> Self {
        PipelineError::StoreTransaction(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_payload_message() {
        let source = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err = PipelineError::MalformedPayload {
            field: "custom",
            source,
        };
        let message = err.to_string();
        assert!(message.starts_with("Malformed payload field 'custom':"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_store_error_includes_context_chain() {
        let err = PipelineError::store(
            anyhow::anyhow!("database is locked").context("Failed to save notification n1"),
        );
        assert_eq!(
            err.to_string(),
            "Store transaction failed: Failed to save notification n1: database is locked"
        );
    }

    #[test]
    fn test_hook_and_restore_messages() {
        let hook = PipelineError::DeveloperHook {
            hook: "extender",
            reason: "boom".to_string(),
        };
        assert_eq!(hook.to_string(), "Hook 'extender' failed: boom");

        let row = PipelineError::RestoreRow {
            row_id: 4,
            reason: "missing title".to_string(),
        };
        assert_eq!(row.to_string(), "Failed to restore row 4: missing title");
    }
}
