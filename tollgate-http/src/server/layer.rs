//! Tower layer plumbing for the payment gate.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::Request;
use axum::response::Response;
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service};

use tollgate::proto::InvalidMethod;
use tollgate::replay::{MemoryReplayStore, ReplayStore};
use tollgate::validator::ValidatorPipeline;
use tollgate::PaymentMethod;

use super::gate::{GateContext, PaymentMode};

/// Shared payment enforcement for an application.
///
/// Create one instance per application; the validator pipeline and replay
/// store are shared across every protected route so single-use semantics
/// hold application-wide.
#[derive(Clone)]
pub struct PaymentGate {
    validator: Arc<ValidatorPipeline>,
    replay: Arc<dyn ReplayStore>,
}

impl std::fmt::Debug for PaymentGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentGate")
            .field("validator", &self.validator)
            .finish_non_exhaustive()
    }
}

impl PaymentGate {
    /// Creates a gate over a validator pipeline with an in-process replay
    /// store.
    #[must_use]
    pub fn new(validator: ValidatorPipeline) -> Self {
        Self {
            validator: Arc::new(validator),
            replay: Arc::new(MemoryReplayStore::new()),
        }
    }

    /// Replaces the replay store, e.g. with a shared multi-node
    /// implementation.
    #[must_use]
    pub fn with_replay_store(mut self, store: Arc<dyn ReplayStore>) -> Self {
        self.replay = store;
        self
    }

    /// Binds the gate to a route's payment terms.
    ///
    /// # Panics
    ///
    /// Panics if the method violates the protocol invariants; use
    /// [`PaymentGate::try_for_method`] to handle that as an error.
    #[must_use]
    pub fn for_method(&self, method: PaymentMethod) -> PaymentGateLayer {
        self.try_for_method(method)
            .expect("invalid payment method configuration")
    }

    /// Binds the gate to a route's payment terms, validating them first.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidMethod`] if the method violates the protocol
    /// invariants.
    pub fn try_for_method(&self, method: PaymentMethod) -> Result<PaymentGateLayer, InvalidMethod> {
        method.validate()?;
        Ok(PaymentGateLayer {
            method,
            mode: PaymentMode::default(),
            replay: Arc::clone(&self.replay),
            validator: Arc::clone(&self.validator),
        })
    }
}

/// Layer configuring payment enforcement for one route.
#[derive(Clone)]
pub struct PaymentGateLayer {
    method: PaymentMethod,
    mode: PaymentMode,
    replay: Arc<dyn ReplayStore>,
    validator: Arc<ValidatorPipeline>,
}

impl std::fmt::Debug for PaymentGateLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentGateLayer")
            .field("method", &self.method)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl PaymentGateLayer {
    /// Selects the `X-PAYMENT` shape this route accepts.
    ///
    /// The default is [`PaymentMode::Authorization`];
    /// [`PaymentMode::TransactionHash`] enables the legacy bare-hash mode and
    /// requires the chain backend in the pipeline.
    #[must_use]
    pub fn with_mode(mut self, mode: PaymentMode) -> Self {
        self.mode = mode;
        self
    }
}

impl<S> Layer<S> for PaymentGateLayer
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
{
    type Service = PaymentGateService;

    fn layer(&self, inner: S) -> Self::Service {
        PaymentGateService {
            gate: Arc::new(GateContext {
                method: self.method.clone(),
                mode: self.mode,
                replay: Arc::clone(&self.replay),
                validator: Arc::clone(&self.validator),
            }),
            inner: BoxCloneSyncService::new(inner),
        }
    }
}

/// The service produced by [`PaymentGateLayer`].
#[derive(Clone)]
pub struct PaymentGateService {
    gate: Arc<GateContext>,
    inner: BoxCloneSyncService<Request, Response, Infallible>,
}

impl std::fmt::Debug for PaymentGateService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentGateService").finish_non_exhaustive()
    }
}

impl Service<Request> for PaymentGateService {
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let gate = Arc::clone(&self.gate);
        let inner = self.inner.clone();
        Box::pin(async move { Ok(gate.handle(inner, req).await) })
    }
}
