//! Typed error hierarchy for the Veil client.
//!
//! Three enums mirror the three ways a protocol step can fail:
//! - `ValidationError`: bad local input, never reaches the network
//! - `TransportError`: the relay refused, vanished, or answered garbage
//! - `SessionError`: everything the coordinator can return to a caller

use thiserror::Error;

use crate::coordinator::{Event, Phase};

/// Local input problems. Raised before any transport call is issued.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },

    #[error("Amount must be a positive number")]
    AmountNotPositive,

    #[error("Amount must be at least {minimum}")]
    AmountBelowMinimum { minimum: f64 },

    #[error("Both the bank statement and the commitment letter must be staged before committing")]
    MissingArtifacts,

    #[error("File is {size} bytes; the limit is {max} bytes")]
    FileTooLarge { size: u64, max: u64 },

    #[error("Unsupported file type '{mime}'. Only PDF, PNG and JPEG are accepted")]
    UnsupportedFileType { mime: String },
}

/// Failures talking to the relay.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransportError {
    /// The relay no longer knows the session (HTTP 404).
    #[error("Session not found: {message}")]
    NotFound { message: String },

    /// The relay answered with `success: false` or a 4xx/5xx detail.
    #[error("{message}")]
    Rejected { message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed relay response: {0}")]
    Decode(String),
}

impl TransportError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, TransportError::NotFound { .. })
    }
}

/// Errors returned by coordinator operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Cannot apply {event} while in phase {from}")]
    InvalidTransition { from: Phase, event: Event },

    #[error("No active session")]
    NoActiveSession,

    #[error("This participant has already committed")]
    AlreadyCommitted,

    #[error("A commit is already in progress")]
    CommitInFlight,

    #[error("Both participants must commit before the result can be revealed")]
    RevealNotReady,

    #[error("A reveal is already in progress")]
    RevealInFlight,

    #[error("Session has been invalidated by the relay")]
    Invalidated,

    #[error("Session store error: {0}")]
    Store(#[source] anyhow::Error),
}

impl SessionError {
    /// True when the relay reported the session gone.
    pub fn is_invalidation(&self) -> bool {
        match self {
            SessionError::Invalidated => true,
            SessionError::Transport(e) => e.is_not_found(),
            _ => false,
        }
    }
}
