//! EVM support for the tollgate payment protocol.
//!
//! Two concerns live here:
//!
//! - [`signer`] — client-side ERC-3009 `transferWithAuthorization` signing
//!   over EIP-712 typed data, backed by a local secp256k1 key
//! - [`chain`] — the on-chain validator backend that verifies a settlement
//!   transaction by inspecting its `Transfer` logs
//!
//! Token deployment metadata used for EIP-712 domain defaults is in
//! [`networks`].

pub mod chain;
pub mod networks;
pub mod signer;

pub use chain::ChainBackend;
pub use networks::{UsdcDeployment, usdc_deployment};
pub use signer::{Erc3009Signer, SignerLike, sign_prepared_authorization};
