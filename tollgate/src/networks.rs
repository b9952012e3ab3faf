//! The recognized network-name to chain-id table.
//!
//! The protocol core recognizes a closed set of EVM networks. Deployments may
//! extend this at the edges, but challenge selection and EIP-712 chain-id
//! resolution in this workspace go through this table.

/// A known network with its human-readable name and EIP-155 chain id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkInfo {
    /// Network name as it appears on the wire (e.g. `"base-sepolia"`).
    pub name: &'static str,
    /// EIP-155 chain id.
    pub chain_id: u64,
    /// Block explorer transaction URL prefix, if one is well known.
    pub explorer_tx_prefix: Option<&'static str>,
}

/// The networks the core recognizes.
pub static NETWORKS: &[NetworkInfo] = &[
    NetworkInfo {
        name: "ethereum",
        chain_id: 1,
        explorer_tx_prefix: Some("https://etherscan.io/tx/"),
    },
    NetworkInfo {
        name: "sepolia",
        chain_id: 11_155_111,
        explorer_tx_prefix: Some("https://sepolia.etherscan.io/tx/"),
    },
    NetworkInfo {
        name: "base",
        chain_id: 8453,
        explorer_tx_prefix: Some("https://basescan.org/tx/"),
    },
    NetworkInfo {
        name: "base-sepolia",
        chain_id: 84_532,
        explorer_tx_prefix: Some("https://sepolia.basescan.org/tx/"),
    },
    NetworkInfo {
        name: "polygon",
        chain_id: 137,
        explorer_tx_prefix: Some("https://polygonscan.com/tx/"),
    },
    NetworkInfo {
        name: "arbitrum",
        chain_id: 42_161,
        explorer_tx_prefix: Some("https://arbiscan.io/tx/"),
    },
    NetworkInfo {
        name: "optimism",
        chain_id: 10,
        explorer_tx_prefix: Some("https://optimistic.etherscan.io/tx/"),
    },
];

/// Resolves a network name to its EIP-155 chain id.
#[must_use]
pub fn chain_id_by_name(name: &str) -> Option<u64> {
    NETWORKS.iter().find(|n| n.name == name).map(|n| n.chain_id)
}

/// Resolves an EIP-155 chain id back to its network name.
#[must_use]
pub fn name_by_chain_id(chain_id: u64) -> Option<&'static str> {
    NETWORKS
        .iter()
        .find(|n| n.chain_id == chain_id)
        .map(|n| n.name)
}

/// Builds a block explorer URL for a settlement transaction.
#[must_use]
pub fn explorer_url(network: &str, transaction_hash: &str) -> Option<String> {
    NETWORKS
        .iter()
        .find(|n| n.name == network)
        .and_then(|n| n.explorer_tx_prefix)
        .map(|prefix| format!("{prefix}{transaction_hash}"))
}
