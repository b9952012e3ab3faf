//! Client-side authorization signing seam.
//!
//! The payment driver in `tollgate-http` is wallet-agnostic: it selects the
//! first challenge method some registered [`AuthorizationSigner`] supports and
//! delegates signing to it. The ERC-3009 implementation over a local
//! secp256k1 key lives in `tollgate-evm`.

use async_trait::async_trait;

use crate::proto::{PaymentMethod, SignedAuthorization};

/// Errors produced while creating a signed payment authorization.
#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    /// The underlying key operation failed.
    #[error("signing failed: {0}")]
    Signing(String),
    /// The signer does not support the offered payment method.
    #[error("payment method is not supported by this signer")]
    UnsupportedMethod,
}

/// Produces signed payment authorizations for supported methods.
#[async_trait]
pub trait AuthorizationSigner: Send + Sync {
    /// Returns true if this signer can pay via the given method, meaning its
    /// network resolves to a known chain and its asset is accepted.
    fn supports(&self, method: &PaymentMethod) -> bool;

    /// Signs a transfer authorization for the method's advertised maximum.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError`] if the method is unsupported or the key
    /// operation fails.
    async fn sign(&self, method: &PaymentMethod) -> Result<SignedAuthorization, SignerError>;
}
