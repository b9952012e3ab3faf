//! USDC deployment metadata on the recognized networks.
//!
//! The EIP-712 domain name is token-contract-specific: Circle's contracts use
//! `"USD Coin"` on some chains and `"USDC"` on others. When a payment method
//! does not carry domain hints, the signer falls back to this table.
//!
//! Source: <https://developers.circle.com/stablecoins/usdc-contract-addresses>

use alloy_primitives::{Address, address};

/// A USDC deployment with its EIP-712 domain parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsdcDeployment {
    /// EIP-155 chain id.
    pub chain_id: u64,
    /// Token contract address.
    pub address: Address,
    /// Decimal precision.
    pub decimals: u8,
    /// EIP-712 domain name.
    pub name: &'static str,
    /// EIP-712 domain version.
    pub version: &'static str,
}

/// Known USDC deployments, one per recognized network.
pub static USDC_DEPLOYMENTS: &[UsdcDeployment] = &[
    UsdcDeployment {
        chain_id: 1,
        address: address!("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
        decimals: 6,
        name: "USD Coin",
        version: "2",
    },
    UsdcDeployment {
        chain_id: 11_155_111,
        address: address!("0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238"),
        decimals: 6,
        name: "USDC",
        version: "2",
    },
    UsdcDeployment {
        chain_id: 8453,
        address: address!("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"),
        decimals: 6,
        name: "USD Coin",
        version: "2",
    },
    UsdcDeployment {
        chain_id: 84_532,
        address: address!("0x036CbD53842c5426634e7929541eC2318f3dCF7e"),
        decimals: 6,
        name: "USDC",
        version: "2",
    },
    UsdcDeployment {
        chain_id: 137,
        address: address!("0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359"),
        decimals: 6,
        name: "USDC",
        version: "2",
    },
    UsdcDeployment {
        chain_id: 42_161,
        address: address!("0xaf88d065e77c8cC2239327C5EDb3A432268e5831"),
        decimals: 6,
        name: "USD Coin",
        version: "2",
    },
    UsdcDeployment {
        chain_id: 10,
        address: address!("0x0b2C639c533813f4Aa9D7837CAf62653d097Ff85"),
        decimals: 6,
        name: "USD Coin",
        version: "2",
    },
];

/// Looks up the USDC deployment for a chain and asset address.
#[must_use]
pub fn usdc_deployment(chain_id: u64, asset: Address) -> Option<&'static UsdcDeployment> {
    USDC_DEPLOYMENTS
        .iter()
        .find(|d| d.chain_id == chain_id && d.address == asset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_sepolia_deployment_resolves() {
        let deployment = usdc_deployment(
            84_532,
            address!("0x036CbD53842c5426634e7929541eC2318f3dCF7e"),
        )
        .unwrap();
        assert_eq!(deployment.name, "USDC");
        assert_eq!(deployment.version, "2");
    }

    #[test]
    fn mismatched_asset_does_not_resolve() {
        assert!(
            usdc_deployment(
                84_532,
                address!("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"),
            )
            .is_none()
        );
    }
}
