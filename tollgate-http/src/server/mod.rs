//! Axum middleware that gates protected routes behind an x402 payment.
//!
//! A [`PaymentGate`] holds the shared pieces (validator pipeline, replay
//! store); [`PaymentGate::for_method`] binds them to a route's payment terms
//! and produces a tower [`PaymentGateLayer`].
//!
//! ```ignore
//! let facilitator = FacilitatorBackend::try_new("https://facilitator.example")?;
//! let gate = PaymentGate::new(ValidatorPipeline::new(vec![Arc::new(facilitator)]));
//!
//! let app = Router::new()
//!     .route("/analyze", post(analyze))
//!     .layer(gate.for_method(method));
//! ```
//!
//! Per request, the gate walks one state machine: decode → structural check →
//! semantic check → replay lock → validator → resource → response. Every
//! failure maps to one taxonomy class, and the replay lock is rolled back on
//! any failure after it was taken, so a transient validator outage never
//! burns a nonce.

mod gate;
mod layer;

pub use gate::PaymentMode;
pub use layer::{PaymentGate, PaymentGateLayer, PaymentGateService};
