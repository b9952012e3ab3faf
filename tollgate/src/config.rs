//! Configuration recognized by the payment gate.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::amount::TokenAmount;
use crate::proto::{DomainHints, PaymentMethod};
use crate::validator::BackendKind;

/// Configuration for one payment-gated deployment.
///
/// ```json
/// {
///   "facilitatorUrl": "https://facilitator.example/",
///   "network": "base-sepolia",
///   "asset": "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
///   "recipient": "0x501ab28fc3c7d29c2d12b243723eb5c5418b9de6",
///   "paymentAmount": "100000"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateConfig {
    /// Facilitator endpoint; required when the facilitator backend is
    /// declared in [`GateConfig::validator_order`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facilitator_url: Option<Url>,
    /// Chain RPC endpoint; required when the chain backend is declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<Url>,
    /// Network name from the recognized table.
    pub network: String,
    /// Token contract address payments are denominated in.
    pub asset: Address,
    /// Recipient address for payments.
    pub recipient: Address,
    /// Price per request, in the token's smallest unit.
    pub payment_amount: TokenAmount,
    /// Validator backends in fallback order. `format` is unsafe outside
    /// development.
    #[serde(default = "default_validator_order")]
    pub validator_order: Vec<BackendKind>,
    /// Replay entry retention in seconds.
    #[serde(default = "default_replay_retention")]
    pub replay_retention_seconds: u64,
}

fn default_validator_order() -> Vec<BackendKind> {
    vec![BackendKind::Facilitator, BackendKind::Chain]
}

fn default_replay_retention() -> u64 {
    86_400
}

/// A configuration that cannot produce a working gate.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The facilitator backend is declared without a facilitator URL.
    #[error("validatorOrder declares the facilitator backend but facilitatorUrl is not set")]
    MissingFacilitatorUrl,
    /// The chain backend is declared without an RPC URL.
    #[error("validatorOrder declares the chain backend but rpcUrl is not set")]
    MissingRpcUrl,
    /// No validator backends are declared.
    #[error("validatorOrder must declare at least one backend")]
    EmptyValidatorOrder,
    /// The network name is not in the recognized table.
    #[error("unrecognized network {0:?}")]
    UnknownNetwork(String),
}

impl GateConfig {
    /// Checks that declared backends have the endpoints they need and that
    /// the network is recognized.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.validator_order.is_empty() {
            return Err(ConfigError::EmptyValidatorOrder);
        }
        if self.validator_order.contains(&BackendKind::Facilitator)
            && self.facilitator_url.is_none()
        {
            return Err(ConfigError::MissingFacilitatorUrl);
        }
        if self.validator_order.contains(&BackendKind::Chain) && self.rpc_url.is_none() {
            return Err(ConfigError::MissingRpcUrl);
        }
        if crate::networks::chain_id_by_name(&self.network).is_none() {
            return Err(ConfigError::UnknownNetwork(self.network.clone()));
        }
        Ok(())
    }

    /// Builds the payment method advertised for a protected route.
    ///
    /// `payment_amount` is used for both amount bounds; per-route description
    /// and EIP-712 hints come from the caller.
    #[must_use]
    pub fn payment_method(
        &self,
        timeout_ms: u64,
        description: Option<String>,
        extra: Option<DomainHints>,
    ) -> PaymentMethod {
        PaymentMethod {
            scheme: "exact".into(),
            network: self.network.clone(),
            asset: self.asset,
            recipient: self.recipient,
            maximum_amount: self.payment_amount,
            minimum_amount: self.payment_amount,
            timeout: timeout_ms,
            description,
            extra,
        }
    }
}
