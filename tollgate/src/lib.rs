//! Core types and traits for the x402 payment gating protocol.
//!
//! This crate defines everything chain- and transport-agnostic about gating an
//! HTTP resource behind a stablecoin micropayment:
//!
//! - [`proto`] — wire format types: challenges, payment methods, signed
//!   ERC-3009 authorizations, and settlement receipts
//! - [`error`] — the error taxonomy surfaced to paying clients
//! - [`replay`] — single-use enforcement for payment nonces
//! - [`validator`] — the pluggable validation pipeline and its backend trait
//! - [`networks`] — the recognized network-name to chain-id table
//! - [`config`] — configuration recognized by the payment gate
//! - [`signer`] — the client-side authorization signing seam
//!
//! Chain-specific signing and on-chain verification live in `tollgate-evm`;
//! the axum payment-gate middleware, the facilitator client, and the reqwest
//! payment driver live in `tollgate-http`.

pub mod amount;
pub mod config;
pub mod encoding;
pub mod error;
pub mod networks;
pub mod proto;
pub mod replay;
pub mod signer;
pub mod timestamp;
pub mod validator;

pub use amount::TokenAmount;
pub use encoding::Base64Bytes;
pub use error::{ErrorBody, ErrorClass, GateError};
pub use proto::{
    Authorization, Challenge, DomainHints, PaymentMethod, PaymentReceipt, SettlementStatus,
    SignedAuthorization, SignedPayload, Version, X402Version1,
};
pub use replay::{InsertOutcome, MemoryReplayStore, ReplayKey, ReplayStore};
pub use signer::{AuthorizationSigner, SignerError};
pub use timestamp::UnixTimestamp;
pub use validator::{
    BackendError, BackendKind, FormatBackend, PaymentProof, ValidatorBackend, ValidatorPipeline,
};
