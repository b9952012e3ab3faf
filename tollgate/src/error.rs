//! The error taxonomy surfaced to paying clients.
//!
//! Every component reports its own error type internally; the payment gate
//! rewrites them into this taxonomy before responding. The HTTP status
//! mapping lives here so the translation happens at exactly one edge.

use serde::{Deserialize, Serialize};

/// Machine-readable error classes carried in the response body's `error`
/// field.
///
/// Each class maps to one HTTP status via [`ErrorClass::http_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorClass {
    /// No `X-PAYMENT` header was supplied.
    PaymentRequired,
    /// The payment header could not be decoded.
    InvalidFormat,
    /// Header fields were present but semantically wrong.
    InvalidAuthorization,
    /// The authorization's `validBefore` has passed.
    Expired,
    /// The payment nonce was already consumed.
    Replay,
    /// The facilitator reported an explicit rejection.
    Rejected,
    /// Transient facilitator failure.
    FacilitatorUnavailable,
    /// Transient chain RPC failure.
    ChainUnavailable,
    /// The on-chain transfer value is below the configured minimum.
    AmountMismatch,
    /// The transaction hash was not found on chain.
    UnknownTransaction,
    /// An unhandled internal error.
    Internal,
}

impl ErrorClass {
    /// The HTTP status code this class maps to.
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::PaymentRequired | Self::Rejected => 402,
            Self::InvalidFormat
            | Self::InvalidAuthorization
            | Self::Expired
            | Self::Replay
            | Self::AmountMismatch
            | Self::UnknownTransaction => 400,
            Self::FacilitatorUnavailable | Self::ChainUnavailable => 502,
            Self::Internal => 500,
        }
    }

    /// The kebab-case wire name of this class.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PaymentRequired => "payment-required",
            Self::InvalidFormat => "invalid-format",
            Self::InvalidAuthorization => "invalid-authorization",
            Self::Expired => "expired",
            Self::Replay => "replay",
            Self::Rejected => "rejected",
            Self::FacilitatorUnavailable => "facilitator-unavailable",
            Self::ChainUnavailable => "chain-unavailable",
            Self::AmountMismatch => "amount-mismatch",
            Self::UnknownTransaction => "unknown-transaction",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified payment failure with a short human-readable message.
///
/// The message is written for the paying client; internal error details
/// (stack traces, upstream error strings) must not be folded into it.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{class}: {message}")]
pub struct GateError {
    /// The taxonomy class.
    pub class: ErrorClass,
    /// Short human-readable description.
    pub message: String,
}

impl GateError {
    /// Creates a classified error.
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }

    /// Creates an `internal` error with a generic message.
    ///
    /// The underlying cause should be logged by the caller, not surfaced.
    #[must_use]
    pub fn internal() -> Self {
        Self::new(ErrorClass::Internal, "internal error")
    }
}

/// JSON body carried by every failed response: `{ "error": ..., "message": ... }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// The taxonomy class.
    pub error: ErrorClass,
    /// Short human-readable description.
    pub message: String,
}

impl From<GateError> for ErrorBody {
    fn from(err: GateError) -> Self {
        Self {
            error: err.class,
            message: err.message,
        }
    }
}
