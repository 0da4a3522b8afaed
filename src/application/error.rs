use std::error::Error as StdError;

use thiserror::Error;

use crate::{application::checkpoint::CheckpointError, infra::error::InfraError};

/// Flattened error chain for operator-facing output.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            let message = inner.to_string();
            // `#[error(transparent)]` repeats the inner message verbatim.
            if messages.last() != Some(&message) {
                messages.push(message);
            }
            current = inner.source();
        }
        Self { source, messages }
    }

    pub fn render(&self) -> String {
        self.messages.join(": ")
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Process exit code for the binary.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Infra(InfraError::Configuration { .. }) => 78,
            AppError::Checkpoint(CheckpointError::Busy) => 75,
            AppError::Infra(InfraError::Database { .. } | InfraError::Migration { .. })
            | AppError::Checkpoint(_) => 69,
            _ => 1,
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport::from_error("application::error::AppError", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::buffer::BufferError;
    use crate::application::repos::RepoError;

    #[test]
    fn report_collects_source_chain() {
        let err = AppError::from(CheckpointError::Pending(BufferError::Storage(
            RepoError::Timeout,
        )));
        let report = err.report();
        assert_eq!(
            report.messages,
            vec![
                "failed to read pending buffer entries: buffer storage failed: database timeout"
                    .to_string(),
                "buffer storage failed: database timeout".to_string(),
                "database timeout".to_string(),
            ]
        );
        assert_eq!(err.exit_code(), 69);
    }

    #[test]
    fn busy_checkpoint_is_a_temporary_failure() {
        let err = AppError::from(CheckpointError::Busy);
        assert_eq!(err.exit_code(), 75);
        assert_eq!(err.report().render(), "another checkpoint run holds the buffer");
    }

    #[test]
    fn configuration_errors_use_config_exit_code() {
        let err = AppError::from(InfraError::configuration("missing url"));
        assert_eq!(err.exit_code(), 78);
    }
}
