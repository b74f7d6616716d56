//! Structured error types for the Quire engine.
//!
//! Persisted-data shape problems never surface here: they are normalized away
//! by [`crate::api`]. What remains are genuine caller errors (bad JSON handed
//! to an entry point, a mutation aimed at something that does not exist, a
//! failed store call, or form validation).

use thiserror::Error;

use crate::api::{FieldErrors, StoreError};
use crate::mutate::MutationError;
use crate::richtext::RichTextError;
use crate::share::ShareError;

/// The unified error type returned by the public Quire entry points.
#[derive(Debug, Error)]
pub enum QuireError {
    /// JSON input failed to parse as a proposal document.
    #[error("Failed to parse document: {source}{}", format_hint(.hint))]
    Parse {
        #[source]
        source: serde_json::Error,
        hint: String,
    },

    #[error("Mutation error: {0}")]
    Mutation(#[from] MutationError),

    #[error("Rich text edit error: {0}")]
    RichText(#[from] RichTextError),

    #[error("Share error: {0}")]
    Share(#[from] ShareError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Validation failed on {} field(s)", .0.len())]
    Validation(FieldErrors),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_hint(hint: &str) -> String {
    if hint.is_empty() {
        String::new()
    } else {
        format!("\n  Hint: {}", hint)
    }
}

impl From<serde_json::Error> for QuireError {
    fn from(e: serde_json::Error) -> Self {
        let hint = match e.classify() {
            serde_json::error::Category::Syntax => {
                "Check for trailing commas, missing quotes, or unescaped characters.".to_string()
            }
            serde_json::error::Category::Data => {
                "The JSON is valid but doesn't match the proposal schema. Check field names and types.".to_string()
            }
            serde_json::error::Category::Eof => {
                "Unexpected end of input, is the JSON truncated?".to_string()
            }
            serde_json::error::Category::Io => String::new(),
        };
        QuireError::Parse { source: e, hint }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_carries_hint() {
        let err: QuireError = serde_json::from_str::<serde_json::Value>("{\"a\": 1,")
            .unwrap_err()
            .into();
        let msg = err.to_string();
        assert!(msg.starts_with("Failed to parse document"));
        assert!(msg.contains("Hint: Unexpected end of input"));
    }
}
