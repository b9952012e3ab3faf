//! Wire format types for the x402 payment gating protocol.
//!
//! All types serialize to JSON with camelCase field names. Ingress
//! deserialization accepts the field aliases used by older servers
//! (`accepts`/`methods`, `payTo`/`recipient`, `maxAmountRequired`/
//! `maximumAmount`, `maxTimeoutSeconds`/`timeout`); everything past the
//! deserializer uses the canonical names only.
//!
//! # Key types
//!
//! - [`Challenge`] — HTTP 402 response body listing acceptable payments
//! - [`PaymentMethod`] — a single offered payment inside a challenge
//! - [`Authorization`] — the signed ERC-3009 `TransferWithAuthorization` body
//! - [`SignedAuthorization`] — the `X-PAYMENT` header payload
//! - [`PaymentReceipt`] — post-settlement record tying a payment to a
//!   transaction hash

use alloy_primitives::{Address, B256, Bytes};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::amount::TokenAmount;
use crate::encoding::Base64Bytes;
use crate::timestamp::UnixTimestamp;

/// A protocol version marker parameterized by its numeric value.
///
/// Serializes as a bare integer and rejects any other value on
/// deserialization, so a mismatched `x402Version` fails at the parse stage.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct Version<const N: u8>;

impl<const N: u8> Version<N> {
    /// The numeric value of this protocol version.
    pub const VALUE: u8 = N;
}

impl<const N: u8> PartialEq<u8> for Version<N> {
    fn eq(&self, other: &u8) -> bool {
        *other == N
    }
}

impl<const N: u8> std::fmt::Display for Version<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{N}")
    }
}

impl<const N: u8> Serialize for Version<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(N)
    }
}

impl<'de, const N: u8> Deserialize<'de> for Version<N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = u8::deserialize(deserializer)?;
        if v == N {
            Ok(Self)
        } else {
            Err(serde::de::Error::custom(format!(
                "expected x402 version {N}, got {v}"
            )))
        }
    }
}

/// Version marker for protocol version 1.
pub type X402Version1 = Version<1>;

/// Convenience constant for constructing protocol messages.
pub const V1: X402Version1 = Version;

/// Scheme names understood as the ERC-3009 `transferWithAuthorization` family.
pub const ERC3009_SCHEMES: &[&str] = &["exact", "eip3009"];

/// Maximum accepted size of an `X-PAYMENT` header value, in bytes.
pub const MAX_PAYMENT_HEADER_BYTES: usize = 8 * 1024;

/// Default authorization validity window when a method carries no timeout.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 300;

/// EIP-712 domain hints attached to a payment method.
///
/// The domain name and version are token-contract-specific; servers that know
/// them advertise them here so clients do not have to guess.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainHints {
    /// EIP-712 domain name of the token contract (e.g. `"USD Coin"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// EIP-712 domain version of the token contract (e.g. `"2"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// A single payment option offered inside a [`Challenge`].
///
/// Defines the terms under which a payment is accepted: scheme, network,
/// asset, recipient, amount bounds, and the authorization validity window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethod {
    /// Payment scheme identifier (e.g. `"exact"`).
    pub scheme: String,
    /// Network name from the recognized table (e.g. `"base-sepolia"`).
    pub network: String,
    /// Token contract address.
    pub asset: Address,
    /// Recipient address for the payment.
    pub recipient: Address,
    /// Maximum amount accepted, in the token's smallest unit.
    pub maximum_amount: TokenAmount,
    /// Minimum amount accepted, in the token's smallest unit.
    pub minimum_amount: TokenAmount,
    /// Authorization validity window in milliseconds.
    pub timeout: u64,
    /// Human-readable description of the protected resource.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Optional EIP-712 domain hints for the asset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<DomainHints>,
}

/// A payment method that violates the protocol invariants.
#[derive(Debug, thiserror::Error)]
pub enum InvalidMethod {
    /// The minimum amount is zero.
    #[error("minimum amount must be greater than zero")]
    ZeroMinimum,
    /// The maximum amount is below the minimum.
    #[error("maximum amount must not be below the minimum amount")]
    MaximumBelowMinimum,
    /// The timeout is outside the accepted 1 second to 1 hour range.
    #[error("timeout must be between 1 second and 1 hour, got {0}ms")]
    TimeoutOutOfRange(u64),
    /// The scheme string is empty.
    #[error("scheme must not be empty")]
    EmptyScheme,
    /// The network string is empty.
    #[error("network must not be empty")]
    EmptyNetwork,
}

impl PaymentMethod {
    /// Checks the protocol invariants: `maximum ≥ minimum > 0`, timeout in
    /// `[1s, 1h]`, non-empty scheme and network.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), InvalidMethod> {
        if self.scheme.is_empty() {
            return Err(InvalidMethod::EmptyScheme);
        }
        if self.network.is_empty() {
            return Err(InvalidMethod::EmptyNetwork);
        }
        if self.minimum_amount.is_zero() {
            return Err(InvalidMethod::ZeroMinimum);
        }
        if self.maximum_amount < self.minimum_amount {
            return Err(InvalidMethod::MaximumBelowMinimum);
        }
        if !(1_000..=3_600_000).contains(&self.timeout) {
            return Err(InvalidMethod::TimeoutOutOfRange(self.timeout));
        }
        Ok(())
    }

    /// Returns the authorization validity window in whole seconds.
    #[must_use]
    pub const fn timeout_seconds(&self) -> u64 {
        self.timeout / 1000
    }

    /// Returns true if `scheme` belongs to the ERC-3009 scheme family this
    /// method accepts.
    #[must_use]
    pub fn accepts_scheme(&self, scheme: &str) -> bool {
        scheme == self.scheme
            || (ERC3009_SCHEMES.contains(&scheme) && ERC3009_SCHEMES.contains(&self.scheme.as_str()))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentMethodWire {
    scheme: String,
    network: String,
    asset: Address,
    #[serde(default)]
    recipient: Option<Address>,
    #[serde(default)]
    pay_to: Option<Address>,
    #[serde(default)]
    maximum_amount: Option<TokenAmount>,
    #[serde(default)]
    max_amount_required: Option<TokenAmount>,
    #[serde(default)]
    minimum_amount: Option<TokenAmount>,
    #[serde(default)]
    timeout: Option<u64>,
    #[serde(default)]
    max_timeout_seconds: Option<u64>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    extra: Option<DomainHints>,
}

impl<'de> Deserialize<'de> for PaymentMethod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = PaymentMethodWire::deserialize(deserializer)?;
        let recipient = wire
            .recipient
            .or(wire.pay_to)
            .ok_or_else(|| serde::de::Error::missing_field("recipient"))?;
        let maximum_amount = wire
            .maximum_amount
            .or(wire.max_amount_required)
            .ok_or_else(|| serde::de::Error::missing_field("maximumAmount"))?;
        let timeout = wire
            .timeout
            .or(wire.max_timeout_seconds.map(|s| s.saturating_mul(1000)))
            .unwrap_or(DEFAULT_TIMEOUT_SECONDS * 1000);
        Ok(Self {
            scheme: wire.scheme,
            network: wire.network,
            asset: wire.asset,
            recipient,
            maximum_amount,
            minimum_amount: wire.minimum_amount.unwrap_or(maximum_amount),
            timeout,
            description: wire.description,
            extra: wire.extra,
        })
    }
}

/// HTTP 402 response body listing acceptable payment methods.
///
/// Created per unpaid request and never persisted. Serializes the method list
/// under `methods`; deserialization also accepts the `accepts` alias.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    /// Protocol version (always 1).
    pub x402_version: X402Version1,
    /// Acceptable payment methods, non-empty.
    pub methods: Vec<PaymentMethod>,
}

impl Challenge {
    /// Builds a single-method challenge.
    #[must_use]
    pub fn for_method(method: PaymentMethod) -> Self {
        Self {
            x402_version: V1,
            methods: vec![method],
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChallengeWire {
    x402_version: X402Version1,
    #[serde(default)]
    methods: Vec<PaymentMethod>,
    #[serde(default)]
    accepts: Vec<PaymentMethod>,
}

impl<'de> Deserialize<'de> for Challenge {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = ChallengeWire::deserialize(deserializer)?;
        let methods = if wire.methods.is_empty() {
            wire.accepts
        } else {
            wire.methods
        };
        if methods.is_empty() {
            return Err(serde::de::Error::custom(
                "challenge must offer at least one payment method",
            ));
        }
        Ok(Self {
            x402_version: wire.x402_version,
            methods,
        })
    }
}

/// ERC-3009 `TransferWithAuthorization` parameters.
///
/// Defines who may transfer tokens, to whom, how much, and during what time
/// window. This struct is what gets signed as EIP-712 typed data.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authorization {
    /// The address authorizing the transfer (token owner).
    pub from: Address,
    /// The recipient address for the transfer.
    pub to: Address,
    /// The amount to transfer, in the token's smallest unit.
    pub value: TokenAmount,
    /// The authorization is not valid before this timestamp (inclusive).
    pub valid_after: UnixTimestamp,
    /// The authorization expires at this timestamp (exclusive).
    pub valid_before: UnixTimestamp,
    /// A unique 32-byte nonce preventing replay.
    pub nonce: B256,
}

/// The signature plus the authorization it covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedPayload {
    /// 65-byte ECDSA signature (`r ‖ s ‖ v`, `v ∈ {27, 28}`) as hex.
    pub signature: Bytes,
    /// The structured authorization data that was signed.
    pub authorization: Authorization,
}

/// The `X-PAYMENT` header payload: a signed payment authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedAuthorization {
    /// Protocol version (always 1).
    pub x402_version: X402Version1,
    /// The payment scheme (e.g. `"exact"`).
    pub scheme: String,
    /// The network name (e.g. `"base-sepolia"`).
    pub network: String,
    /// Signature and authorization.
    pub payload: SignedPayload,
}

/// Expected length of an EOA ECDSA signature in bytes.
pub const SIGNATURE_LENGTH: usize = 65;

impl SignedAuthorization {
    /// Checks the structural requirements the gate enforces before any
    /// semantic validation: non-empty scheme and network, 65-byte signature.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        !self.scheme.is_empty()
            && !self.network.is_empty()
            && self.payload.signature.len() == SIGNATURE_LENGTH
    }
}

/// How a settlement was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SettlementStatus {
    /// The payment was settled and confirmed.
    Confirmed,
    /// The payment only passed format validation (development backend).
    FormatOnly,
}

/// Post-settlement record tying a payment to an on-chain transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
    /// The on-chain transaction hash.
    pub transaction_hash: String,
    /// The network where settlement occurred.
    pub network: String,
    /// The paying address, if identified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
    /// The block the settlement transaction landed in, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    /// Settlement time as a unix timestamp, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    /// How the settlement was established.
    pub status: SettlementStatus,
}

/// Failure to decode an `X-PAYMENT` header into a [`SignedAuthorization`].
#[derive(Debug, thiserror::Error)]
#[error("payment header is neither base64-wrapped nor raw JSON: {0}")]
pub struct PaymentDecodeError(#[from] serde_json::Error);

/// Encodes a [`SignedAuthorization`] for the `X-PAYMENT` header.
///
/// The wire encoding is base64 over the JSON serialization.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn encode_payment(signed: &SignedAuthorization) -> Result<String, serde_json::Error> {
    let json = serde_json::to_vec(signed)?;
    Ok(Base64Bytes::encode(json).to_string())
}

/// Decodes an `X-PAYMENT` header value into a [`SignedAuthorization`].
///
/// Tries base64-wrapped JSON first, then raw JSON.
///
/// # Errors
///
/// Returns [`PaymentDecodeError`] if neither decoding succeeds.
pub fn decode_payment(bytes: &[u8]) -> Result<SignedAuthorization, PaymentDecodeError> {
    if let Ok(decoded) = Base64Bytes::from(bytes).decode()
        && let Ok(signed) = serde_json::from_slice(&decoded)
    {
        return Ok(signed);
    }
    Ok(serde_json::from_slice(bytes)?)
}
