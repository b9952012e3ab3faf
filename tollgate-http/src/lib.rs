//! HTTP transport for the tollgate payment protocol.
//!
//! Server side, [`server::PaymentGate`] builds axum/tower layers that gate
//! protected routes behind a payment: unpaid requests receive a structured
//! 402 challenge, paid requests are validated, checked for replay, settled
//! through the configured validator pipeline, and finally forwarded to the
//! protected handler with the settlement receipt merged into the response.
//!
//! Client side, [`client::PaymentDriver`] is a reqwest middleware that
//! satisfies 402 challenges transparently: it selects a payment method,
//! signs a transfer authorization, and retries the request once with an
//! `X-PAYMENT` header.
//!
//! [`facilitator::FacilitatorBackend`] is the validator backend that
//! delegates verification and settlement to a remote facilitator service.

pub mod client;
pub mod constants;
pub mod facilitator;
pub mod server;

pub use client::{PaymentDriver, Settlement, SettlementTracker};
pub use facilitator::FacilitatorBackend;
pub use server::{PaymentGate, PaymentGateLayer, PaymentMode};
