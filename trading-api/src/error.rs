//! Errors raised by brokerage implementations.

use std::time::Duration;
use thiserror::Error;

/// Failure of a single brokerage call.
///
/// The variants separate transport trouble (worth retrying) from business
/// rejections returned by the broker (never worth retrying).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BrokerageError {
    /// The request never reached the broker.
    #[error("connection failed: {0}")]
    Connect(String),

    /// No response within the per-call deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The connection broke while the request was in flight.
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status without a recognisable broker envelope.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The broker understood the request and refused it.
    #[error("{kind}: {message}")]
    Rejected { kind: String, message: String },

    /// Session missing, expired or refused.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The response could not be decoded.
    #[error("malformed response: {0}")]
    Decode(String),

    /// The requested symbol or instrument is unknown to the broker.
    #[error("not found: {0}")]
    NotFound(String),

    /// A close-out that went through only partly. Every leg was attempted;
    /// `failures` names the ones still open.
    #[error(
        "close-out incomplete after {cancelled_orders} cancels and {closed_positions} flattens: {}",
        .failures.join("; ")
    )]
    CloseOutIncomplete {
        cancelled_orders: usize,
        closed_positions: usize,
        failures: Vec<String>,
    },
}

impl BrokerageError {
    /// Whether repeating the call may succeed.
    ///
    /// Connection failures are always safe to repeat because nothing reached
    /// the broker. Timeouts, broken transports, throttling and server errors
    /// are only repeated for idempotent calls: resending an order whose first
    /// copy may already be live would double the position.
    pub fn is_transient(&self, idempotent: bool) -> bool {
        match self {
            BrokerageError::Connect(_) => true,
            BrokerageError::Timeout(_) | BrokerageError::Transport(_) => idempotent,
            BrokerageError::Http { status, .. } => {
                idempotent && (*status == 429 || *status >= 500)
            }
            BrokerageError::Rejected { .. }
            | BrokerageError::Auth(_)
            | BrokerageError::Decode(_)
            | BrokerageError::NotFound(_)
            | BrokerageError::CloseOutIncomplete { .. } => false,
        }
    }

    pub fn rejected(kind: impl Into<String>, message: impl Into<String>) -> Self {
        BrokerageError::Rejected {
            kind: kind.into(),
            message: message.into(),
        }
    }
}
