//! Error types for the graphfetch core.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering fetching, checkpoints, tables, query templates and configuration.

use std::path::PathBuf;

/// Top-level error type for the graphfetch core library.
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Table error: {0}")]
    Table(#[from] TableError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from a single query execution against the remote endpoint.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Request failed: {message}")]
    Transport { message: String },

    #[error("Endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed response: {message}")]
    Protocol { message: String },

    #[error("Binding {index} violates schema '{schema}': missing required field '{field}'")]
    Schema {
        schema: String,
        index: usize,
        field: String,
    },
}

impl FetchError {
    /// Whether another attempt could plausibly succeed.
    ///
    /// Transport, status and protocol failures are retried; a schema
    /// violation fails the same way every time.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::Transport { .. } | FetchError::Status { .. } | FetchError::Protocol { .. }
        )
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("timed out: {err}")
        } else {
            err.to_string()
        };
        FetchError::Transport { message }
    }
}

/// Errors from the checkpoint store.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("Checkpoint I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt checkpoint at {path}: {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("Checkpoint table unreadable: {0}")]
    Table(#[from] TableError),
}

/// Errors from reading, writing or reshaping tables.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Column not found: {column}")]
    MissingColumn { column: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from loading or rendering query templates.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Template parse error: {message}")]
    Parse { message: String },

    #[error("Unknown placeholder '{{{name}}}' in template '{template}'")]
    UnknownPlaceholder { template: String, name: String },

    #[error("Unbalanced brace at byte {position} in template '{template}'")]
    UnbalancedBrace { template: String, position: usize },

    #[error("Template '{template}' does not declare field '{field}'")]
    MissingField { template: String, field: String },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// A type alias for results using the top-level `HarvestError`.
pub type Result<T> = std::result::Result<T, HarvestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_fetch() {
        let err = HarvestError::Fetch(FetchError::Status {
            status: 503,
            body: "busy".into(),
        });
        assert_eq!(
            err.to_string(),
            "Fetch error: Endpoint returned HTTP 503: busy"
        );
    }

    #[test]
    fn test_error_display_placeholder() {
        let err = TemplateError::UnknownPlaceholder {
            template: "paintings".into(),
            name: "offst".into(),
        };
        assert_eq!(
            err.to_string(),
            "Unknown placeholder '{offst}' in template 'paintings'"
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(
            FetchError::Transport {
                message: "reset".into()
            }
            .is_retryable()
        );
        assert!(
            FetchError::Status {
                status: 429,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(
            FetchError::Protocol {
                message: "not json".into()
            }
            .is_retryable()
        );
        assert!(
            !FetchError::Schema {
                schema: "s".into(),
                index: 0,
                field: "item".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_checkpoint_error_from_table() {
        let err: CheckpointError = TableError::MissingColumn {
            column: "item".into(),
        }
        .into();
        assert!(err.to_string().contains("Column not found: item"));
    }
}
