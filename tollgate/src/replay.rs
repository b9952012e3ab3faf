//! Single-use enforcement for payment nonces.
//!
//! The replay store converts at-least-once delivery into at-most-once
//! resource access: the gate test-and-sets the replay key before any external
//! call, and rolls the entry back when validation fails for transient
//! reasons so the same signature can be retried.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use alloy_primitives::{Address, B256};
use async_trait::async_trait;

/// The canonical identifier used to detect payment reuse.
///
/// Keyed by `(network, asset, nonce)` so retention windows only need to cover
/// a single asset's authorization lifetime. In transaction-hash mode the
/// nonce slot holds the lowercased hash instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReplayKey {
    /// Network name the payment targets.
    pub network: String,
    /// Token contract address.
    pub asset: Address,
    /// Lowercased hex of the authorization nonce or transaction hash.
    pub nonce: String,
}

impl ReplayKey {
    /// Builds the key for a signed authorization's nonce.
    #[must_use]
    pub fn for_nonce(network: &str, asset: Address, nonce: B256) -> Self {
        Self {
            network: network.to_string(),
            asset,
            nonce: format!("{nonce:#x}"),
        }
    }

    /// Builds the key for a bare transaction hash (legacy mode).
    #[must_use]
    pub fn for_transaction(network: &str, asset: Address, hash: &str) -> Self {
        Self {
            network: network.to_string(),
            asset,
            nonce: hash.to_ascii_lowercase(),
        }
    }
}

/// Outcome of an atomic test-and-set insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The key was absent and is now present.
    Inserted,
    /// The key was already present; the payment is a replay.
    AlreadyPresent,
}

/// Concurrency-safe set with atomic insertion.
///
/// `try_insert` is the single serialization point of the payment gate: two
/// concurrent requests carrying the same key observe exactly one `Inserted`
/// and one `AlreadyPresent` outcome.
///
/// The in-process [`MemoryReplayStore`] suffices for a single node.
/// Multi-node deployments must implement this trait over a shared store with
/// an atomic set-if-absent primitive.
#[async_trait]
pub trait ReplayStore: Send + Sync {
    /// Atomically inserts the key, reporting whether it was already present.
    async fn try_insert(&self, key: &ReplayKey) -> InsertOutcome;

    /// Removes the key, rolling back a previous insertion.
    async fn remove(&self, key: &ReplayKey);

    /// Returns true if the key is present.
    async fn has(&self, key: &ReplayKey) -> bool;
}

/// Mutex-guarded in-memory replay store.
///
/// Entries are pruned lazily once they outlive the retention window. The
/// window defaults to 24 hours and must exceed the largest configured
/// `validBefore − validAfter` plus clock skew.
#[derive(Debug)]
pub struct MemoryReplayStore {
    entries: Mutex<HashMap<ReplayKey, Instant>>,
    retention: Duration,
}

impl MemoryReplayStore {
    /// Default retention window for replay entries.
    pub const DEFAULT_RETENTION: Duration = Duration::from_secs(86_400);

    /// Creates a store with the default 24-hour retention.
    #[must_use]
    pub fn new() -> Self {
        Self::with_retention(Self::DEFAULT_RETENTION)
    }

    /// Creates a store with a custom retention window.
    #[must_use]
    pub fn with_retention(retention: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            retention,
        }
    }

    /// Number of live entries, for diagnostics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().expect("replay store poisoned").len()
    }

    /// Returns true when no entries are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryReplayStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReplayStore for MemoryReplayStore {
    async fn try_insert(&self, key: &ReplayKey) -> InsertOutcome {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("replay store poisoned");
        entries.retain(|_, inserted_at| now.duration_since(*inserted_at) < self.retention);
        if entries.contains_key(key) {
            InsertOutcome::AlreadyPresent
        } else {
            entries.insert(key.clone(), now);
            InsertOutcome::Inserted
        }
    }

    async fn remove(&self, key: &ReplayKey) {
        self.entries
            .lock()
            .expect("replay store poisoned")
            .remove(key);
    }

    async fn has(&self, key: &ReplayKey) -> bool {
        self.entries
            .lock()
            .expect("replay store poisoned")
            .contains_key(key)
    }
}
