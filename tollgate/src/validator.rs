//! The pluggable payment validation pipeline.
//!
//! A [`ValidatorPipeline`] holds an ordered list of backends implementing
//! [`ValidatorBackend`]. Backends are tried in declared order; only
//! unavailability (and a backend declining the proof shape) advances the
//! iteration — any terminal failure rejects the payment immediately. Format
//! validation is a separately declared backend, never a fallback triggered by
//! another backend's error.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorClass, GateError};
use crate::proto::{PaymentMethod, PaymentReceipt, SettlementStatus, SignedAuthorization};

/// The payment evidence presented to validator backends.
#[derive(Debug, Clone)]
pub enum PaymentProof {
    /// A signed ERC-3009 transfer authorization (current mode).
    Authorization(SignedAuthorization),
    /// A bare transaction hash (legacy mode).
    TransactionHash(String),
}

/// Identifies a validator backend implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Off-chain facilitator RPC verification and settlement.
    Facilitator,
    /// On-chain transaction log inspection.
    Chain,
    /// Format-only validation (development only).
    Format,
}

impl BackendKind {
    /// The lowercase name used in configuration.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Facilitator => "facilitator",
            Self::Chain => "chain",
            Self::Format => "format",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by a validator backend.
///
/// [`BackendError::is_retryable`] splits the variants into continue-signals
/// (the pipeline moves on to the next backend) and terminal rejections.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The backend explicitly rejected the payment. Terminal.
    #[error("payment rejected: {reason}")]
    Rejected {
        /// Reason surfaced to the client.
        reason: String,
    },
    /// The on-chain transfer value is below the configured minimum, or no
    /// matching transfer was found. Terminal.
    #[error("no transfer to the configured recipient meets the minimum amount")]
    AmountMismatch,
    /// The transaction hash was not found on chain. Terminal for this
    /// request; the client may retry once the transaction is mined.
    #[error("transaction not found on chain")]
    UnknownTransaction,
    /// The backend could not be reached or timed out. The pipeline continues
    /// with the next backend, and the gate rolls back the replay entry.
    #[error("{backend} backend unavailable: {message}")]
    Unavailable {
        /// Which backend failed.
        backend: BackendKind,
        /// Internal detail, logged but not surfaced to clients.
        message: String,
    },
    /// The backend cannot process this proof shape (e.g. the chain backend
    /// given an unsettled authorization). The pipeline continues.
    #[error("{backend} backend cannot process this payment proof")]
    Unsupported {
        /// Which backend declined.
        backend: BackendKind,
    },
    /// The backend replied successfully but without the data required to
    /// build a receipt. Terminal: the payment may already be settled, so it
    /// must not fall through to another backend.
    #[error("backend returned a malformed response: {0}")]
    Malformed(String),
}

impl BackendError {
    /// Returns true if the pipeline should continue with the next backend.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Unsupported { .. })
    }

    /// The taxonomy class this failure surfaces as.
    #[must_use]
    pub const fn error_class(&self) -> ErrorClass {
        match self {
            Self::Rejected { .. } => ErrorClass::Rejected,
            Self::AmountMismatch => ErrorClass::AmountMismatch,
            Self::UnknownTransaction => ErrorClass::UnknownTransaction,
            Self::Unavailable {
                backend: BackendKind::Chain,
                ..
            } => ErrorClass::ChainUnavailable,
            Self::Unavailable { .. } => ErrorClass::FacilitatorUnavailable,
            Self::Unsupported { .. } | Self::Malformed(_) => ErrorClass::Internal,
        }
    }
}

impl From<BackendError> for GateError {
    fn from(err: BackendError) -> Self {
        let class = err.error_class();
        let message = match &err {
            // The facilitator's reason is part of the protocol surface.
            BackendError::Rejected { reason } => reason.clone(),
            BackendError::AmountMismatch | BackendError::UnknownTransaction => err.to_string(),
            BackendError::Unavailable { backend, .. } => {
                format!("{backend} backend is temporarily unavailable")
            }
            BackendError::Unsupported { .. } => {
                "no validator backend could process this payment".to_string()
            }
            BackendError::Malformed(_) => "settlement outcome could not be determined".to_string(),
        };
        Self::new(class, message)
    }
}

/// A single payment validation backend.
#[async_trait]
pub trait ValidatorBackend: Send + Sync {
    /// Which backend this is, for ordering, logging, and error mapping.
    fn kind(&self) -> BackendKind;

    /// Validates (and, where applicable, settles) the payment, returning a
    /// receipt on success.
    async fn validate(
        &self,
        method: &PaymentMethod,
        proof: &PaymentProof,
    ) -> Result<PaymentReceipt, BackendError>;
}

/// Ordered validation pipeline.
///
/// The default production order is facilitator → chain. The format backend is
/// unsafe and must only be declared in development configurations.
pub struct ValidatorPipeline {
    backends: Vec<Arc<dyn ValidatorBackend>>,
}

impl std::fmt::Debug for ValidatorPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kinds: Vec<_> = self.backends.iter().map(|b| b.kind()).collect();
        f.debug_struct("ValidatorPipeline")
            .field("backends", &kinds)
            .finish()
    }
}

impl ValidatorPipeline {
    /// Creates a pipeline over the given backends, tried in order.
    #[must_use]
    pub fn new(backends: Vec<Arc<dyn ValidatorBackend>>) -> Self {
        Self { backends }
    }

    /// Validates a payment against the configured backends.
    ///
    /// # Errors
    ///
    /// Returns the first terminal [`BackendError`]. When every backend was
    /// unavailable or declined, returns the last unavailability error.
    pub async fn validate(
        &self,
        method: &PaymentMethod,
        proof: &PaymentProof,
    ) -> Result<PaymentReceipt, BackendError> {
        let mut last_unavailable = None;
        let mut last_skip = None;
        for backend in &self.backends {
            match backend.validate(method, proof).await {
                Ok(receipt) => {
                    tracing::debug!(
                        backend = %backend.kind(),
                        transaction = %receipt.transaction_hash,
                        "payment validated"
                    );
                    return Ok(receipt);
                }
                Err(err @ BackendError::Unavailable { .. }) => {
                    tracing::warn!(
                        backend = %backend.kind(),
                        error = %err,
                        "validator backend unavailable, trying next"
                    );
                    last_unavailable = Some(err);
                }
                Err(err @ BackendError::Unsupported { .. }) => {
                    tracing::debug!(
                        backend = %backend.kind(),
                        "backend declined payment proof, trying next"
                    );
                    last_skip = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_unavailable
            .or(last_skip)
            .unwrap_or_else(|| BackendError::Malformed("no validator backend configured".into())))
    }
}

/// Development-only backend that accepts any hex-shaped payload.
///
/// UNSAFE: performs no cryptographic or on-chain verification whatsoever.
/// Must never be declared outside development configurations.
#[derive(Debug, Default)]
pub struct FormatBackend;

impl FormatBackend {
    fn hex_shaped(candidate: &str) -> bool {
        candidate.len() >= 10
            && candidate.starts_with("0x")
            && candidate[2..].bytes().all(|b| b.is_ascii_hexdigit())
    }
}

#[async_trait]
impl ValidatorBackend for FormatBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Format
    }

    async fn validate(
        &self,
        method: &PaymentMethod,
        proof: &PaymentProof,
    ) -> Result<PaymentReceipt, BackendError> {
        let (candidate, payer) = match proof {
            PaymentProof::TransactionHash(hash) => (hash.clone(), None),
            PaymentProof::Authorization(signed) => (
                signed.payload.signature.to_string(),
                Some(signed.payload.authorization.from.to_string()),
            ),
        };
        if !Self::hex_shaped(&candidate) {
            return Err(BackendError::Rejected {
                reason: "payload is not hex-shaped".into(),
            });
        }
        tracing::warn!(
            network = %method.network,
            "format backend accepted a payment WITHOUT verification; \
             disable this backend outside development"
        );
        Ok(PaymentReceipt {
            transaction_hash: candidate,
            network: method.network.clone(),
            payer,
            block_number: None,
            timestamp: None,
            status: SettlementStatus::FormatOnly,
        })
    }
}
