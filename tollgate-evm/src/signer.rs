//! Client-side ERC-3009 payment signing.
//!
//! Builds and signs `TransferWithAuthorization` EIP-712 typed data for a
//! payment method offered in a challenge. The randomized parts (nonce,
//! validity window) are separated from [`sign_prepared_authorization`], which
//! is deterministic for fixed inputs.

use alloy_primitives::{Address, B256, FixedBytes, Signature, U256};
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{Eip712Domain, SolStruct, eip712_domain, sol};
use async_trait::async_trait;
use rand::Rng;
use std::future::Future;
use std::sync::Arc;

use tollgate::proto::DEFAULT_TIMEOUT_SECONDS;
use tollgate::signer::{AuthorizationSigner, SignerError};
use tollgate::{Authorization, PaymentMethod, SignedAuthorization, SignedPayload, UnixTimestamp};

use crate::networks::usdc_deployment;

sol!(
    /// EIP-712 struct for ERC-3009 `transferWithAuthorization`.
    ///
    /// Field names and order MUST match the token contract's definition; the
    /// verifier reconstructs this struct from the wire authorization to check
    /// the signature.
    struct TransferWithAuthorization {
        address from;
        address to;
        uint256 value;
        uint256 validAfter;
        uint256 validBefore;
        bytes32 nonce;
    }
);

/// Abstracts hash signing so both owned signers and `Arc`-shared signers work.
///
/// Alloy's `Signer` trait is not implemented for `Arc<T>`, but callers often
/// share one `PrivateKeySigner` across a client and its retries.
pub trait SignerLike: Send + Sync {
    /// The signer's address.
    fn address(&self) -> Address;

    /// Signs the given 32-byte hash.
    fn sign_hash(
        &self,
        hash: &FixedBytes<32>,
    ) -> impl Future<Output = Result<Signature, alloy_signer::Error>> + Send;
}

impl SignerLike for PrivateKeySigner {
    fn address(&self) -> Address {
        Self::address(self)
    }

    async fn sign_hash(&self, hash: &FixedBytes<32>) -> Result<Signature, alloy_signer::Error> {
        alloy_signer::Signer::sign_hash(self, hash).await
    }
}

impl<T: SignerLike> SignerLike for Arc<T> {
    fn address(&self) -> Address {
        (**self).address()
    }

    async fn sign_hash(&self, hash: &FixedBytes<32>) -> Result<Signature, alloy_signer::Error> {
        (**self).sign_hash(hash).await
    }
}

/// Resolves the EIP-712 domain for a payment method.
///
/// Precedence: the method's own domain hints, then the USDC deployment table,
/// then the `"USD Coin"` / `"2"` defaults used by Circle's mainnet contracts.
///
/// # Errors
///
/// Returns [`SignerError::UnsupportedMethod`] if the method's network is not
/// in the recognized table.
pub fn resolve_domain(method: &PaymentMethod) -> Result<Eip712Domain, SignerError> {
    let chain_id = tollgate::networks::chain_id_by_name(&method.network)
        .ok_or(SignerError::UnsupportedMethod)?;
    let deployment = usdc_deployment(chain_id, method.asset);
    let hints = method.extra.as_ref();
    let name = hints
        .and_then(|extra| extra.name.clone())
        .or_else(|| deployment.map(|d| d.name.to_string()))
        .unwrap_or_else(|| "USD Coin".to_string());
    let version = hints
        .and_then(|extra| extra.version.clone())
        .or_else(|| deployment.map(|d| d.version.to_string()))
        .unwrap_or_else(|| "2".to_string());
    Ok(eip712_domain! {
        name: name,
        version: version,
        chain_id: chain_id,
        verifying_contract: method.asset,
    })
}

/// Signs a fully prepared authorization under the given domain.
///
/// Deterministic: fixed `(key, domain, authorization)` inputs produce
/// byte-identical signatures. The 65-byte output is `r ‖ s ‖ v` with
/// `v ∈ {27, 28}`.
///
/// # Errors
///
/// Returns [`SignerError::Signing`] if the key operation fails.
pub async fn sign_prepared_authorization<S: SignerLike>(
    signer: &S,
    domain: &Eip712Domain,
    authorization: Authorization,
) -> Result<SignedPayload, SignerError> {
    let message = TransferWithAuthorization {
        from: authorization.from,
        to: authorization.to,
        value: authorization.value.into(),
        validAfter: U256::from(authorization.valid_after.as_secs()),
        validBefore: U256::from(authorization.valid_before.as_secs()),
        nonce: authorization.nonce,
    };
    let digest = message.eip712_signing_hash(domain);
    let signature = signer
        .sign_hash(&digest)
        .await
        .map_err(|e| SignerError::Signing(e.to_string()))?;
    Ok(SignedPayload {
        signature: signature.as_bytes().into(),
        authorization,
    })
}

/// Signs ERC-3009 transfer authorizations with a local secp256k1 key.
///
/// Implements [`AuthorizationSigner`] so the payment driver can select and
/// pay challenge methods without knowing about EVM specifics.
#[derive(Debug)]
pub struct Erc3009Signer<S = PrivateKeySigner> {
    signer: S,
    accepted_assets: Option<Vec<Address>>,
}

impl<S: SignerLike> Erc3009Signer<S> {
    /// Creates a signer that accepts any asset on recognized networks.
    pub const fn new(signer: S) -> Self {
        Self {
            signer,
            accepted_assets: None,
        }
    }

    /// Restricts the signer to the given asset contracts.
    #[must_use]
    pub fn with_accepted_assets(mut self, assets: Vec<Address>) -> Self {
        self.accepted_assets = Some(assets);
        self
    }

    /// The wallet address payments will be drawn from.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    fn fresh_authorization(&self, method: &PaymentMethod) -> Authorization {
        let nonce: [u8; 32] = rand::rng().random();
        let valid_after = UnixTimestamp::now();
        let window = if method.timeout > 0 {
            method.timeout / 1000
        } else {
            DEFAULT_TIMEOUT_SECONDS
        };
        Authorization {
            from: self.signer.address(),
            to: method.recipient,
            value: method.maximum_amount,
            valid_after,
            valid_before: valid_after + window,
            nonce: B256::from(nonce),
        }
    }
}

#[async_trait]
impl<S: SignerLike> AuthorizationSigner for Erc3009Signer<S> {
    fn supports(&self, method: &PaymentMethod) -> bool {
        if tollgate::networks::chain_id_by_name(&method.network).is_none() {
            return false;
        }
        if !method.accepts_scheme("exact") {
            return false;
        }
        match &self.accepted_assets {
            Some(assets) => assets.contains(&method.asset),
            None => true,
        }
    }

    async fn sign(&self, method: &PaymentMethod) -> Result<SignedAuthorization, SignerError> {
        if !self.supports(method) {
            return Err(SignerError::UnsupportedMethod);
        }
        let domain = resolve_domain(method)?;
        let authorization = self.fresh_authorization(method);
        let payload = sign_prepared_authorization(&self.signer, &domain, authorization).await?;
        Ok(SignedAuthorization {
            x402_version: tollgate::proto::V1,
            scheme: method.scheme.clone(),
            network: method.network.clone(),
            payload,
        })
    }
}
