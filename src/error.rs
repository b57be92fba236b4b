//! Error types with fix suggestions
//!
//! Error code ranges:
//! - SG-000-009: Transport errors (buffer / conduit / file I/O)
//! - SG-010-019: Usage errors (caller broke the contract)
//! - SG-020-029: Operation outcome errors (engine cause, terminated)
//! - SG-030-039: Internal invariant violations
//! - SG-040-049: Configuration errors

use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// Coarse classification of a [`GatewayError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Usage,
    Engine,
    Terminated,
    Internal,
    Config,
}

/// All error variants are part of the public API.
#[derive(Error, Debug)]
pub enum GatewayError {
    // ═══════════════════════════════════════════
    // TRANSPORT ERRORS (000-009)
    // ═══════════════════════════════════════════
    #[error("SG-001: I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SG-002: Failed to create buffer for operation '{operation_id}': {source}")]
    BufferCreation {
        operation_id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("SG-003: No result stored for operation '{operation_id}'")]
    ResultNotFound { operation_id: String },

    #[error("SG-004: Resource is closed")]
    Closed,

    // ═══════════════════════════════════════════
    // USAGE ERRORS (010-019)
    // ═══════════════════════════════════════════
    #[error("SG-010: Operation '{operation}' is not supported by the streamed result store")]
    Unsupported { operation: &'static str },

    #[error("SG-011: Operation '{operation_id}' is already registered")]
    DuplicateOperation { operation_id: String },

    #[error("SG-012: The {side} side of buffer '{operation_id}' was already taken")]
    SideTaken {
        operation_id: String,
        side: &'static str,
    },

    // ═══════════════════════════════════════════
    // OPERATION OUTCOME (020-029)
    // ═══════════════════════════════════════════
    #[error("SG-020: Operation failed: {0}")]
    Engine(#[source] Arc<dyn StdError + Send + Sync>),

    #[error("SG-021: Operation was terminated")]
    Terminated,

    // ═══════════════════════════════════════════
    // INTERNAL (030-039)
    // ═══════════════════════════════════════════
    #[error("SG-030: Internal error: {reason}")]
    Internal { reason: String },

    // ═══════════════════════════════════════════
    // CONFIG (040-049)
    // ═══════════════════════════════════════════
    #[error("SG-040: Configuration error: {reason}")]
    Config { reason: String },
}

impl GatewayError {
    /// Wrap a raw engine failure cause
    pub fn engine<E>(cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        GatewayError::Engine(Arc::new(cause))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Io(_)
            | GatewayError::BufferCreation { .. }
            | GatewayError::ResultNotFound { .. }
            | GatewayError::Closed => ErrorKind::Transport,
            GatewayError::Unsupported { .. }
            | GatewayError::DuplicateOperation { .. }
            | GatewayError::SideTaken { .. } => ErrorKind::Usage,
            GatewayError::Engine(_) => ErrorKind::Engine,
            GatewayError::Terminated => ErrorKind::Terminated,
            GatewayError::Internal { .. } => ErrorKind::Internal,
            GatewayError::Config { .. } => ErrorKind::Config,
        }
    }

    pub fn is_transport(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }

    pub fn is_usage(&self) -> bool {
        self.kind() == ErrorKind::Usage
    }
}

impl FixSuggestion for GatewayError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            GatewayError::Io(_) => Some("Check disk space and permissions of the buffer directory"),
            GatewayError::BufferCreation { .. } => {
                Some("Check that the storage root exists and is writable")
            }
            GatewayError::ResultNotFound { .. } => {
                Some("Verify the operation was submitted and not yet disposed")
            }
            GatewayError::Closed => {
                Some("The reading side closed the stream before the result was delivered")
            }
            GatewayError::Unsupported { .. } => {
                Some("Read results through obtain_readable_result instead")
            }
            GatewayError::DuplicateOperation { .. } => Some("Use a unique operation id per request"),
            GatewayError::SideTaken { .. } => {
                Some("Each buffer has exactly one writer and one reader")
            }
            GatewayError::Engine(_) => None,
            GatewayError::Terminated => None,
            GatewayError::Internal { .. } => Some("Report this as a bug in the event source"),
            GatewayError::Config { .. } => Some("Check ~/.config/streamgate/config.toml syntax"),
        }
    }
}
