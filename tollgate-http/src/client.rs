//! Client-side payment driver for reqwest.
//!
//! [`PaymentDriver`] is a [`reqwest_middleware::Middleware`] that satisfies
//! 402 challenges transparently: parse the challenge, pick the first method a
//! registered signer supports, sign a transfer authorization, and retry the
//! request once with an `X-PAYMENT` header. A second 402 is terminal.
//!
//! ```ignore
//! let driver = PaymentDriver::new().with_signer(Erc3009Signer::new(wallet));
//! let settlements = driver.tracker();
//! let client = ClientBuilder::new(reqwest::Client::new()).with(driver).build();
//! ```

use std::sync::{Arc, Mutex};

use http::{Extensions, HeaderValue, StatusCode};
use reqwest::{Request, Response};
use reqwest_middleware as rqm;
use serde_json::Value;

use tollgate::proto::encode_payment;
use tollgate::signer::{AuthorizationSigner, SignerError};
use tollgate::{Base64Bytes, Challenge, PaymentMethod, PaymentReceipt, networks};

use crate::constants::{X_PAYMENT_HEADER, X_PAYMENT_RESPONSE_HEADER};

/// A recorded settlement from a paid request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    /// The on-chain transaction hash.
    pub transaction_hash: String,
    /// The network the payment settled on.
    pub network: String,
}

impl Settlement {
    /// Block explorer URL for the settlement transaction, when the network
    /// has a well-known explorer.
    #[must_use]
    pub fn explorer_url(&self) -> Option<String> {
        networks::explorer_url(&self.network, &self.transaction_hash)
    }
}

/// Read handle onto the driver's last recorded settlement.
///
/// The slot is advisory and clobbered by the most recent call on a shared
/// client; callers that need a reliable receipt must read the response they
/// got back, not this shared state.
#[derive(Debug, Clone, Default)]
pub struct SettlementTracker(Arc<Mutex<Option<Settlement>>>);

impl SettlementTracker {
    /// The most recent settlement, if any call has paid yet.
    #[must_use]
    pub fn last(&self) -> Option<Settlement> {
        self.0.lock().expect("settlement tracker poisoned").clone()
    }

    fn record(&self, settlement: Settlement) {
        *self.0.lock().expect("settlement tracker poisoned") = Some(settlement);
    }
}

/// Errors produced while driving a payment.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// The 402 response body was not a decodable challenge.
    #[error("402 response did not contain a decodable challenge")]
    BadChallenge,
    /// No challenge method is supported by the registered signers.
    #[error("no payment method in the challenge is supported by the configured signers")]
    NoAcceptableMethod,
    /// The server replied 402 again to a paid request.
    #[error("payment was not accepted by the server")]
    PaymentNotAccepted,
    /// The original request body cannot be cloned for the paid retry.
    #[error("request must be cloneable to retry it with a payment")]
    RequestNotCloneable,
    /// The signed payment could not be encoded as a header value.
    #[error("failed to encode the payment header: {0}")]
    Encode(String),
    /// Authorization signing failed.
    #[error(transparent)]
    Signer(#[from] SignerError),
}

fn middleware_err(err: DriverError) -> rqm::Error {
    rqm::Error::Middleware(err.into())
}

/// Reqwest middleware that drives the 402-retry dance.
///
/// Re-entrant: each call owns its own nonce; only the advisory settlement
/// slot is shared.
#[derive(Default)]
pub struct PaymentDriver {
    signers: Vec<Arc<dyn AuthorizationSigner>>,
    tracker: SettlementTracker,
}

impl std::fmt::Debug for PaymentDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentDriver")
            .field("signers", &self.signers.len())
            .finish_non_exhaustive()
    }
}

impl PaymentDriver {
    /// Creates a driver with no signers registered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an authorization signer.
    ///
    /// Signers are consulted in registration order for each challenge method.
    #[must_use]
    pub fn with_signer(mut self, signer: impl AuthorizationSigner + 'static) -> Self {
        self.signers.push(Arc::new(signer));
        self
    }

    /// Returns a handle for reading the last recorded settlement.
    #[must_use]
    pub fn tracker(&self) -> SettlementTracker {
        self.tracker.clone()
    }

    /// Picks the first challenge method some registered signer supports.
    fn select<'c>(
        &self,
        challenge: &'c Challenge,
    ) -> Option<(&Arc<dyn AuthorizationSigner>, &'c PaymentMethod)> {
        challenge.methods.iter().find_map(|method| {
            self.signers
                .iter()
                .find(|signer| signer.supports(method))
                .map(|signer| (signer, method))
        })
    }

    /// Extracts and records the settlement from a paid response.
    ///
    /// The receipt header is preferred because it leaves the response body
    /// untouched; when only the body carries the hash, the body is buffered
    /// and the response rebuilt.
    async fn record_settlement(
        &self,
        response: Response,
        network: &str,
    ) -> rqm::Result<Response> {
        if let Some(settlement) = settlement_from_headers(&response) {
            tracing::debug!(tx = %settlement.transaction_hash, "settlement recorded from header");
            self.tracker.record(settlement);
            return Ok(response);
        }

        let status = response.status();
        let version = response.version();
        let headers = response.headers().clone();
        let bytes = response.bytes().await.map_err(rqm::Error::Reqwest)?;
        if let Some(settlement) = settlement_from_body(&bytes, network) {
            tracing::debug!(tx = %settlement.transaction_hash, "settlement recorded from body");
            self.tracker.record(settlement);
        }

        let mut rebuilt = http::Response::new(bytes);
        *rebuilt.status_mut() = status;
        *rebuilt.version_mut() = version;
        *rebuilt.headers_mut() = headers;
        Ok(Response::from(rebuilt))
    }
}

#[async_trait::async_trait]
impl rqm::Middleware for PaymentDriver {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: rqm::Next<'_>,
    ) -> rqm::Result<Response> {
        let retry_req = req.try_clone();
        let response = next.clone().run(req, extensions).await?;
        if response.status() != StatusCode::PAYMENT_REQUIRED {
            return Ok(response);
        }

        tracing::info!(url = %response.url(), "received 402, creating payment");
        let challenge: Challenge = response
            .json()
            .await
            .map_err(|_| middleware_err(DriverError::BadChallenge))?;
        let (signer, method) = self
            .select(&challenge)
            .ok_or_else(|| middleware_err(DriverError::NoAcceptableMethod))?;

        let signed = signer
            .sign(method)
            .await
            .map_err(|e| middleware_err(DriverError::Signer(e)))?;
        let network = signed.network.clone();
        let encoded = encode_payment(&signed)
            .map_err(|e| middleware_err(DriverError::Encode(e.to_string())))?;
        let header_value = HeaderValue::from_str(&encoded)
            .map_err(|e| middleware_err(DriverError::Encode(e.to_string())))?;

        let mut retry = retry_req.ok_or_else(|| middleware_err(DriverError::RequestNotCloneable))?;
        retry.headers_mut().insert(X_PAYMENT_HEADER, header_value);

        let paid = next.run(retry, extensions).await?;
        if paid.status() == StatusCode::PAYMENT_REQUIRED {
            // never retry past a single paid attempt
            return Err(middleware_err(DriverError::PaymentNotAccepted));
        }
        if !paid.status().is_success() {
            return Ok(paid);
        }
        self.record_settlement(paid, &network).await
    }
}

fn settlement_from_headers(response: &Response) -> Option<Settlement> {
    let header = response.headers().get(X_PAYMENT_RESPONSE_HEADER)?;
    let decoded = Base64Bytes::from(header.as_bytes()).decode().ok()?;
    let receipt: PaymentReceipt = serde_json::from_slice(&decoded).ok()?;
    Some(Settlement {
        transaction_hash: receipt.transaction_hash,
        network: receipt.network,
    })
}

fn settlement_from_body(bytes: &[u8], fallback_network: &str) -> Option<Settlement> {
    let value: Value = serde_json::from_slice(bytes).ok()?;
    let hash_in = |v: &Value| -> Option<String> {
        for key in ["transactionHash", "txHash", "tx"] {
            if let Some(hash) = v.get(key).and_then(Value::as_str) {
                if !hash.is_empty() {
                    return Some(hash.to_string());
                }
            }
        }
        None
    };
    for container in ["payment", "_transaction"] {
        if let Some(inner) = value.get(container) {
            if let Some(hash) = hash_in(inner) {
                let network = inner
                    .get("network")
                    .and_then(Value::as_str)
                    .unwrap_or(fallback_network);
                return Some(Settlement {
                    transaction_hash: hash,
                    network: network.to_string(),
                });
            }
        }
    }
    hash_in(&value).map(|hash| Settlement {
        transaction_hash: hash,
        network: fallback_network.to_string(),
    })
}
