//! Request handling for the payment gate.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::{HeaderValue, StatusCode, header};
use serde_json::{Value, json};
use tower::Service;
use tower::util::BoxCloneSyncService;

use tollgate::error::{ErrorBody, ErrorClass, GateError};
use tollgate::proto::{MAX_PAYMENT_HEADER_BYTES, decode_payment};
use tollgate::replay::{InsertOutcome, ReplayKey, ReplayStore};
use tollgate::validator::{PaymentProof, ValidatorPipeline};
use tollgate::{
    Base64Bytes, Challenge, PaymentMethod, PaymentReceipt, SignedAuthorization, UnixTimestamp,
};

use crate::constants::{X_PAYMENT_HEADER, X_PAYMENT_RESPONSE_HEADER};

/// What shape of `X-PAYMENT` a route accepts.
///
/// Selecting a mode is a per-route deployment decision; the gate never
/// sniffs the header to guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaymentMode {
    /// A signed ERC-3009 transfer authorization (current mode).
    #[default]
    Authorization,
    /// A bare settlement transaction hash (legacy mode). Requires the chain
    /// backend in the validator pipeline.
    TransactionHash,
}

/// Per-route gate state shared by the service clones.
pub(crate) struct GateContext {
    pub(crate) method: PaymentMethod,
    pub(crate) mode: PaymentMode,
    pub(crate) replay: Arc<dyn ReplayStore>,
    pub(crate) validator: Arc<ValidatorPipeline>,
}

impl GateContext {
    /// Runs the full payment state machine for one request.
    pub(crate) async fn handle(
        &self,
        inner: BoxCloneSyncService<Request, Response, Infallible>,
        req: Request,
    ) -> Response {
        match self.handle_fallible(inner, req).await {
            Ok(response) => response,
            Err(err) => self.error_response(&err),
        }
    }

    async fn handle_fallible(
        &self,
        mut inner: BoxCloneSyncService<Request, Response, Infallible>,
        req: Request,
    ) -> Result<Response, GateError> {
        let Some(header) = req.headers().get(X_PAYMENT_HEADER) else {
            tracing::debug!(uri = %req.uri(), "no payment header, issuing challenge");
            return Err(GateError::new(ErrorClass::PaymentRequired, "payment required"));
        };

        let proof = self.decode_proof(header.as_bytes())?;
        if let PaymentProof::Authorization(signed) = &proof {
            self.check_semantics(signed)?;
        }

        // The single serialization point: locked before any external call.
        let key = self.replay_key(&proof);
        if self.replay.try_insert(&key).await == InsertOutcome::AlreadyPresent {
            tracing::info!(nonce = %key.nonce, "replayed payment rejected");
            return Err(GateError::new(
                ErrorClass::Replay,
                "payment nonce already consumed",
            ));
        }

        let receipt = match self.validator.validate(&self.method, &proof).await {
            Ok(receipt) => receipt,
            Err(err) => {
                // Roll the lock back so a transient outage does not burn the
                // nonce; a later retry with the same signature may succeed.
                self.replay.remove(&key).await;
                tracing::info!(error = %err, "payment validation failed, replay lock released");
                return Err(err.into());
            }
        };

        let response = match inner.call(req).await {
            Ok(response) => response,
            Err(never) => match never {},
        };
        augment_response(response, &receipt).await
    }

    fn decode_proof(&self, bytes: &[u8]) -> Result<PaymentProof, GateError> {
        if bytes.len() > MAX_PAYMENT_HEADER_BYTES {
            return Err(GateError::new(
                ErrorClass::InvalidFormat,
                "payment header exceeds the 8 KiB limit",
            ));
        }
        match self.mode {
            PaymentMode::Authorization => {
                let signed = decode_payment(bytes).map_err(|_| {
                    GateError::new(
                        ErrorClass::InvalidFormat,
                        "payment header could not be decoded",
                    )
                })?;
                if !signed.is_well_formed() {
                    return Err(GateError::new(
                        ErrorClass::InvalidFormat,
                        "payment payload is structurally invalid",
                    ));
                }
                Ok(PaymentProof::Authorization(signed))
            }
            PaymentMode::TransactionHash => {
                let text = std::str::from_utf8(bytes)
                    .map_err(|_| {
                        GateError::new(ErrorClass::InvalidFormat, "payment header is not UTF-8")
                    })?
                    .trim();
                if !hex_shaped(text) {
                    return Err(GateError::new(
                        ErrorClass::InvalidFormat,
                        "payment header is not a transaction hash",
                    ));
                }
                Ok(PaymentProof::TransactionHash(text.to_string()))
            }
        }
    }

    fn check_semantics(&self, signed: &SignedAuthorization) -> Result<(), GateError> {
        let method = &self.method;
        if signed.network != method.network {
            return Err(GateError::new(
                ErrorClass::InvalidAuthorization,
                "payment network does not match the requested method",
            ));
        }
        if !method.accepts_scheme(&signed.scheme) {
            return Err(GateError::new(
                ErrorClass::InvalidAuthorization,
                "payment scheme is not accepted",
            ));
        }
        let authorization = &signed.payload.authorization;
        if authorization.to != method.recipient {
            return Err(GateError::new(
                ErrorClass::InvalidAuthorization,
                "authorization recipient does not match",
            ));
        }
        if authorization.value < method.minimum_amount
            || authorization.value > method.maximum_amount
        {
            return Err(GateError::new(
                ErrorClass::InvalidAuthorization,
                "authorization value is outside the accepted bounds",
            ));
        }
        let now = UnixTimestamp::now();
        if now >= authorization.valid_before {
            return Err(GateError::new(
                ErrorClass::Expired,
                "authorization has expired",
            ));
        }
        if authorization.valid_after > now {
            return Err(GateError::new(
                ErrorClass::InvalidAuthorization,
                "authorization is not yet valid",
            ));
        }
        Ok(())
    }

    fn replay_key(&self, proof: &PaymentProof) -> ReplayKey {
        match proof {
            PaymentProof::Authorization(signed) => ReplayKey::for_nonce(
                &self.method.network,
                self.method.asset,
                signed.payload.authorization.nonce,
            ),
            PaymentProof::TransactionHash(hash) => {
                ReplayKey::for_transaction(&self.method.network, self.method.asset, hash)
            }
        }
    }

    /// Translates a classified failure into the HTTP response.
    ///
    /// 402 responses carry the challenge alongside the error fields so a
    /// paying client can construct a fresh payment from the same body.
    fn error_response(&self, err: &GateError) -> Response {
        let status = StatusCode::from_u16(err.class.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status == StatusCode::PAYMENT_REQUIRED {
            let challenge = Challenge::for_method(self.method.clone());
            let mut body = serde_json::to_value(&challenge).unwrap_or_else(|_| json!({}));
            if let Value::Object(map) = &mut body {
                map.insert("error".into(), json!(err.class));
                map.insert("message".into(), json!(err.message));
            }
            (status, Json(body)).into_response()
        } else {
            (
                status,
                Json(ErrorBody {
                    error: err.class,
                    message: err.message.clone(),
                }),
            )
                .into_response()
        }
    }
}

fn hex_shaped(candidate: &str) -> bool {
    candidate.len() >= 10
        && candidate.starts_with("0x")
        && candidate[2..].bytes().all(|b| b.is_ascii_hexdigit())
}

/// Merges the settlement receipt into a successful response.
///
/// JSON object bodies gain a `payment` key and a top-level `transactionHash`
/// convenience; non-JSON bodies pass through untouched. The receipt is also
/// exposed in the `X-Payment-Response` header as base64 JSON.
async fn augment_response(
    response: Response,
    receipt: &PaymentReceipt,
) -> Result<Response, GateError> {
    if !response.status().is_success() {
        // The resource refused the request; settlement already happened, so
        // the nonce stays consumed, but there is nothing to augment.
        return Ok(response);
    }
    let (mut parts, body) = response.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|_| GateError::internal())?;

    if let Ok(value) = receipt_header_value(receipt) {
        parts.headers.insert(X_PAYMENT_RESPONSE_HEADER, value);
    }

    let bytes = match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(mut map)) => {
            map.insert(
                "payment".into(),
                json!({
                    "transactionHash": receipt.transaction_hash,
                    "network": receipt.network,
                    "status": receipt.status,
                }),
            );
            map.entry("transactionHash")
                .or_insert_with(|| json!(receipt.transaction_hash));
            parts.headers.remove(header::CONTENT_LENGTH);
            serde_json::to_vec(&Value::Object(map))
                .map_err(|_| GateError::internal())?
                .into()
        }
        _ => bytes,
    };
    Ok(Response::from_parts(parts, Body::from(bytes)))
}

fn receipt_header_value(receipt: &PaymentReceipt) -> Result<HeaderValue, GateError> {
    let json = serde_json::to_vec(receipt).map_err(|_| GateError::internal())?;
    HeaderValue::from_bytes(Base64Bytes::encode(json).as_ref()).map_err(|_| GateError::internal())
}
