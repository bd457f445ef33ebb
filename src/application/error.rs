use std::error::Error as StdError;
use std::process::ExitCode;

use thiserror::Error;

use crate::{
    application::commands::CommandError, application::ports::RequestError, config::LoadError,
    domain::error::DomainError, infra::error::InfraError,
};

/// Flattened error chain for logging.
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
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self { source, messages }
    }

    pub fn from_message(source: &'static str, message: impl Into<String>) -> Self {
        Self {
            source,
            messages: vec![message.into()],
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl From<RequestError> for AppError {
    fn from(error: RequestError) -> Self {
        AppError::Command(CommandError::Request(error))
    }
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Process exit status for the binary.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            AppError::Config(_) | AppError::Infra(InfraError::Configuration { .. }) => {
                ExitCode::from(78)
            }
            AppError::Domain(DomainError::Validation { .. })
            | AppError::Validation(_)
            | AppError::Infra(InfraError::Script { .. }) => ExitCode::from(65),
            AppError::Command(CommandError::Request(RequestError::Disconnected)) => {
                ExitCode::from(69)
            }
            AppError::Infra(InfraError::Io(_)) => ExitCode::from(74),
            _ => ExitCode::FAILURE,
        }
    }

    pub fn presentation_message(&self) -> &'static str {
        match self {
            AppError::Domain(DomainError::NotFound { .. }) => "Operation or plug not found",
            AppError::Domain(DomainError::Validation { .. }) | AppError::Validation(_) => {
                "Input could not be processed"
            }
            AppError::Command(CommandError::Request(RequestError::Rejected { .. })) => {
                "Server rejected the request"
            }
            AppError::Command(CommandError::Request(RequestError::Disconnected)) => {
                "Server unavailable"
            }
            AppError::Command(CommandError::NothingToUndo | CommandError::NothingToRedo) => {
                "Nothing to undo or redo"
            }
            AppError::Command(CommandError::Domain(_)) => "Command target not found",
            AppError::Config(_) | AppError::Infra(InfraError::Configuration { .. }) => {
                "Configuration invalid"
            }
            AppError::Infra(InfraError::Telemetry(_)) => "Logging subsystem could not start",
            AppError::Infra(InfraError::Io(_)) => "I/O failure",
            AppError::Infra(InfraError::Script { .. }) => "Replay script invalid",
            AppError::Domain(DomainError::Invariant { .. }) | AppError::Unexpected(_) => {
                "Unexpected error occurred"
            }
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport::from_error("application::error::AppError", self)
    }
}
