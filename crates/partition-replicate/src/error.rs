//! Error types for the replication library.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::ConnectionRole;

/// Main error type for replication operations.
#[derive(Error, Debug)]
pub enum ReplicateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A connection could not be acquired or opened.
    #[error("{role} connection error: {message}")]
    Connection {
        role: ConnectionRole,
        message: String,
    },

    /// A session setting could not be applied to a connection.
    #[error("Session configuration failed: {0}")]
    SessionConfig(String),

    /// A statement could not be constructed or prepared.
    #[error("Statement preparation failed: {0}")]
    StatementPreparation(String),

    /// A read or write statement failed while executing.
    #[error("Execution failed: {0}")]
    Execution(String),

    /// The sink transaction could not be committed.
    #[error("Commit failed: {0}")]
    Commit(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Replication was cancelled (SIGINT, sibling failure with fail_fast, etc.)
    #[error("Replication cancelled")]
    Cancelled,
}

/// Failure category reported per partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    ConnectionError,
    ConfigurationError,
    StatementPreparationError,
    ExecutionError,
    CommitError,
    Cancelled,
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::ConnectionError => "ConnectionError",
            ErrorKind::ConfigurationError => "ConfigurationError",
            ErrorKind::StatementPreparationError => "StatementPreparationError",
            ErrorKind::ExecutionError => "ExecutionError",
            ErrorKind::CommitError => "CommitError",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::Other => "Other",
        };
        f.write_str(name)
    }
}

impl ReplicateError {
    /// Create a Connection error for the given role.
    pub fn connection(role: ConnectionRole, message: impl fmt::Display) -> Self {
        ReplicateError::Connection {
            role,
            message: message.to_string(),
        }
    }

    /// Create a StatementPreparation error.
    pub fn preparation(message: impl fmt::Display) -> Self {
        ReplicateError::StatementPreparation(message.to_string())
    }

    /// Create an Execution error.
    pub fn execution(message: impl fmt::Display) -> Self {
        ReplicateError::Execution(message.to_string())
    }

    /// Create a Commit error.
    pub fn commit(message: impl fmt::Display) -> Self {
        ReplicateError::Commit(message.to_string())
    }

    /// Classify this error for per-partition reporting.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReplicateError::Connection { .. } => ErrorKind::ConnectionError,
            ReplicateError::SessionConfig(_) => ErrorKind::ConfigurationError,
            ReplicateError::StatementPreparation(_) => ErrorKind::StatementPreparationError,
            ReplicateError::Execution(_) => ErrorKind::ExecutionError,
            ReplicateError::Commit(_) => ErrorKind::CommitError,
            ReplicateError::Cancelled => ErrorKind::Cancelled,
            ReplicateError::Config(_)
            | ReplicateError::Io(_)
            | ReplicateError::Yaml(_)
            | ReplicateError::Json(_) => ErrorKind::Other,
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            ReplicateError::Config(_) | ReplicateError::Yaml(_) => 2,
            ReplicateError::Connection { .. } => 3,
            ReplicateError::Cancelled => 130,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for replication operations.
pub type Result<T> = std::result::Result<T, ReplicateError>;
