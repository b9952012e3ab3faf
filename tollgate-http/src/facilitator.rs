//! Validator backend that delegates to a remote facilitator over HTTP.
//!
//! The facilitator receives the signed authorization as a JSON body, checks
//! the signature and amount, submits the on-chain transfer, and replies with
//! the transaction hash. Two endpoint layouts are supported:
//!
//! - **combined** (default): one `POST` to the configured URL performs
//!   verification and settlement in a single call
//! - **split**: `POST ./verify` then `POST ./settle`; both must succeed
//!
//! Every call is bounded: 3 seconds to connect, 10 seconds total.

use std::time::Duration;

use async_trait::async_trait;
use http::HeaderMap;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use tollgate::validator::{BackendError, BackendKind, PaymentProof, ValidatorBackend};
use tollgate::{PaymentMethod, PaymentReceipt, SettlementStatus, SignedAuthorization};

/// How the facilitator exposes its operations.
#[derive(Debug, Clone)]
enum Endpoints {
    /// One endpoint performing verify and settle in a single call.
    Combined(Url),
    /// Separate `./verify` and `./settle` endpoints.
    Split { verify: Url, settle: Url },
}

/// Errors constructing a [`FacilitatorBackend`].
#[derive(Debug, thiserror::Error)]
pub enum FacilitatorBackendError {
    /// URL parse error.
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        /// Human-readable context.
        context: &'static str,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },
    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[from] reqwest::Error),
}

/// Reply from a facilitator's `./verify` endpoint.
#[derive(Debug, Deserialize)]
struct VerifyReply {
    valid: bool,
    #[serde(default)]
    reason: Option<String>,
}

/// Reply from a settling facilitator call.
///
/// Accepts the `txHash` and `tx` aliases some facilitators use.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettleReply {
    #[serde(default, alias = "txHash", alias = "tx")]
    transaction_hash: Option<String>,
}

impl SettleReply {
    fn into_hash(self) -> Option<String> {
        self.transaction_hash.filter(|hash| !hash.is_empty())
    }
}

/// Validator backend for a remote x402 facilitator.
#[derive(Debug, Clone)]
pub struct FacilitatorBackend {
    client: Client,
    endpoints: Endpoints,
    headers: HeaderMap,
}

impl FacilitatorBackend {
    /// Total deadline for each facilitator call.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
    /// Connect deadline for each facilitator call.
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

    /// Creates a backend with a combined verify-and-settle endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorBackendError`] if the URL does not parse or the
    /// HTTP client cannot be built.
    pub fn try_new(url: &str) -> Result<Self, FacilitatorBackendError> {
        // Normalize: exactly one trailing slash so ./suffix joins cleanly.
        let mut normalized = url.trim_end_matches('/').to_string();
        normalized.push('/');
        let base_url =
            Url::parse(&normalized).map_err(|e| FacilitatorBackendError::UrlParse {
                context: "failed to parse facilitator base url",
                source: e,
            })?;
        let client = Client::builder()
            .connect_timeout(Self::DEFAULT_CONNECT_TIMEOUT)
            .timeout(Self::DEFAULT_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            endpoints: Endpoints::Combined(base_url),
            headers: HeaderMap::new(),
        })
    }

    /// Switches to the split `./verify` + `./settle` endpoint layout.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorBackendError`] if the suffix URLs cannot be
    /// constructed.
    pub fn with_split_endpoints(mut self) -> Result<Self, FacilitatorBackendError> {
        let base = match &self.endpoints {
            Endpoints::Combined(url) => url.clone(),
            Endpoints::Split { verify, .. } => {
                // Already split; re-derive from the verify URL's parent.
                verify.clone()
            }
        };
        let verify = base
            .join("./verify")
            .map_err(|e| FacilitatorBackendError::UrlParse {
                context: "failed to construct ./verify URL",
                source: e,
            })?;
        let settle = base
            .join("./settle")
            .map_err(|e| FacilitatorBackendError::UrlParse {
                context: "failed to construct ./settle URL",
                source: e,
            })?;
        self.endpoints = Endpoints::Split { verify, settle };
        Ok(self)
    }

    /// Attaches custom headers (e.g. auth) to every facilitator call.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    async fn post_payment<R: DeserializeOwned>(
        &self,
        url: &Url,
        signed: &SignedAuthorization,
    ) -> Result<R, BackendError> {
        let mut request = self.client.post(url.clone()).json(signed);
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }
        let response = request.send().await.map_err(|e| BackendError::Unavailable {
            backend: BackendKind::Facilitator,
            message: e.to_string(),
        })?;

        let status = response.status();
        if status.is_success() {
            response.json::<R>().await.map_err(|e| BackendError::Unavailable {
                backend: BackendKind::Facilitator,
                message: format!("undecodable facilitator response: {e}"),
            })
        } else if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            Err(BackendError::Rejected {
                reason: rejection_reason(status, &body),
            })
        } else {
            Err(BackendError::Unavailable {
                backend: BackendKind::Facilitator,
                message: format!("facilitator replied HTTP {status}"),
            })
        }
    }

    fn receipt(
        &self,
        method: &PaymentMethod,
        signed: &SignedAuthorization,
        transaction_hash: String,
    ) -> PaymentReceipt {
        PaymentReceipt {
            transaction_hash,
            network: method.network.clone(),
            payer: Some(format!("{:#x}", signed.payload.authorization.from)),
            block_number: None,
            timestamp: None,
            status: SettlementStatus::Confirmed,
        }
    }
}

/// Extracts a rejection reason from a facilitator 4xx body.
fn rejection_reason(status: StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["error", "reason", "message"] {
            if let Some(reason) = value.get(key).and_then(|v| v.as_str()) {
                return reason.to_string();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("facilitator rejected the payment (HTTP {status})")
    } else {
        let mut reason = trimmed.to_string();
        reason.truncate(200);
        reason
    }
}

#[async_trait]
impl ValidatorBackend for FacilitatorBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Facilitator
    }

    async fn validate(
        &self,
        method: &PaymentMethod,
        proof: &PaymentProof,
    ) -> Result<PaymentReceipt, BackendError> {
        let PaymentProof::Authorization(signed) = proof else {
            return Err(BackendError::Unsupported {
                backend: BackendKind::Facilitator,
            });
        };

        let reply = match &self.endpoints {
            Endpoints::Combined(url) => self.post_payment::<SettleReply>(url, signed).await?,
            Endpoints::Split { verify, settle } => {
                let verdict: VerifyReply = self.post_payment(verify, signed).await?;
                if !verdict.valid {
                    return Err(BackendError::Rejected {
                        reason: verdict
                            .reason
                            .unwrap_or_else(|| "facilitator declined the payment".into()),
                    });
                }
                self.post_payment::<SettleReply>(settle, signed).await?
            }
        };

        let transaction_hash = reply.into_hash().ok_or_else(|| {
            BackendError::Malformed("facilitator reply carried no transaction hash".into())
        })?;
        tracing::debug!(tx = %transaction_hash, "facilitator settled payment");
        Ok(self.receipt(method, signed, transaction_hash))
    }
}
