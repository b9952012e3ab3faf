//! On-chain validator backend.
//!
//! Verifies a settlement independently of any facilitator by fetching the
//! transaction receipt and inspecting the ERC-20 `Transfer` logs emitted by
//! the configured asset. This is also the sole backend when a route accepts
//! `X-PAYMENT` as a bare transaction hash.

use std::time::Duration;

use alloy_primitives::{Address, B256, U256};
use alloy_provider::{Provider, RootProvider};
use alloy_sol_types::{SolEvent, sol};
use async_trait::async_trait;
use url::Url;

use tollgate::validator::{BackendError, BackendKind, PaymentProof, ValidatorBackend};
use tollgate::{PaymentMethod, PaymentReceipt, SettlementStatus};

sol!(
    /// ERC-20 `Transfer` event, the settlement evidence this backend accepts.
    event Transfer(address indexed from, address indexed to, uint256 value);
);

/// Validator backend that verifies settlements by on-chain log inspection.
///
/// Only consumes transaction-hash proofs; an unsettled signed authorization
/// carries nothing this backend could check, so it declines those and lets
/// the pipeline continue.
#[derive(Debug)]
pub struct ChainBackend<P = RootProvider> {
    provider: P,
    confirmations: u64,
    call_timeout: Duration,
}

impl ChainBackend<RootProvider> {
    /// Creates a backend over an HTTP JSON-RPC endpoint.
    #[must_use]
    pub fn new(rpc_url: Url) -> Self {
        Self::with_provider(RootProvider::new_http(rpc_url))
    }
}

impl<P: Provider> ChainBackend<P> {
    /// Default bound on each RPC call.
    pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a backend over an existing provider.
    #[must_use]
    pub fn with_provider(provider: P) -> Self {
        Self {
            provider,
            confirmations: 1,
            call_timeout: Self::DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Sets the number of confirmations required before a settlement counts.
    ///
    /// Defaults to 1 (the transaction is mined). Deeper confirmation is a
    /// deployment choice for reorg tolerance.
    #[must_use]
    pub const fn with_confirmations(mut self, confirmations: u64) -> Self {
        self.confirmations = confirmations;
        self
    }

    /// Bounds each RPC call with a deadline.
    #[must_use]
    pub const fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    async fn bounded<T, E, F>(&self, fut: F) -> Result<T, BackendError>
    where
        E: std::fmt::Display,
        F: Future<Output = Result<T, E>>,
    {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(BackendError::Unavailable {
                backend: BackendKind::Chain,
                message: err.to_string(),
            }),
            Err(_) => Err(BackendError::Unavailable {
                backend: BackendKind::Chain,
                message: format!("rpc call exceeded {:?}", self.call_timeout),
            }),
        }
    }

    async fn verify_transaction(
        &self,
        method: &PaymentMethod,
        hash: B256,
    ) -> Result<PaymentReceipt, BackendError> {
        let receipt = self
            .bounded(self.provider.get_transaction_receipt(hash))
            .await?
            .ok_or(BackendError::UnknownTransaction)?;

        if !receipt.status() {
            return Err(BackendError::Rejected {
                reason: "settlement transaction reverted".into(),
            });
        }

        let block_number = receipt.block_number.ok_or(BackendError::UnknownTransaction)?;
        if self.confirmations > 1 {
            let head = self.bounded(self.provider.get_block_number()).await?;
            let confirmed = head.saturating_sub(block_number).saturating_add(1);
            if confirmed < self.confirmations {
                tracing::debug!(
                    tx = %hash,
                    confirmed,
                    required = self.confirmations,
                    "settlement not yet confirmed deeply enough"
                );
                return Err(BackendError::UnknownTransaction);
            }
        }

        let inner = receipt
            .inner
            .as_receipt()
            .ok_or_else(|| BackendError::Malformed("receipt without log data".into()))?;

        let minimum: U256 = method.minimum_amount.into();
        for log in &inner.logs {
            if log.address() != method.asset {
                continue;
            }
            let topics = log.topics();
            if topics.len() < 3 || topics[0] != Transfer::SIGNATURE_HASH {
                continue;
            }
            let from = Address::from_word(topics[1]);
            let to = Address::from_word(topics[2]);
            let data = &log.data().data;
            let value = if data.len() >= 32 {
                U256::from_be_slice(&data[..32])
            } else {
                U256::ZERO
            };
            if to == method.recipient && value >= minimum {
                tracing::debug!(tx = %hash, %from, %value, "settlement transfer verified");
                return Ok(PaymentReceipt {
                    transaction_hash: format!("{hash:#x}"),
                    network: method.network.clone(),
                    payer: Some(format!("{from:#x}")),
                    block_number: Some(block_number),
                    timestamp: None,
                    status: SettlementStatus::Confirmed,
                });
            }
        }

        Err(BackendError::AmountMismatch)
    }
}

#[async_trait]
impl<P: Provider> ValidatorBackend for ChainBackend<P> {
    fn kind(&self) -> BackendKind {
        BackendKind::Chain
    }

    async fn validate(
        &self,
        method: &PaymentMethod,
        proof: &PaymentProof,
    ) -> Result<PaymentReceipt, BackendError> {
        let hash = match proof {
            PaymentProof::TransactionHash(hash) => {
                hash.parse::<B256>().map_err(|_| BackendError::Rejected {
                    reason: "malformed transaction hash".into(),
                })?
            }
            PaymentProof::Authorization(_) => {
                return Err(BackendError::Unsupported {
                    backend: BackendKind::Chain,
                });
            }
        };
        self.verify_transaction(method, hash).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use serde_json::{Value, json};
    use tollgate::amount::TokenAmount;
    use wiremock::matchers::method as http_method;
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    const TX: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const TRANSFER_TOPIC: &str =
        "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";
    const ASSET: &str = "0x036cbd53842c5426634e7929541ec2318f3dcf7e";
    const RECIPIENT: &str = "0x501ab28fc3c7d29c2d12b243723eb5c5418b9de6";
    const PAYER: &str = "0x1111111111111111111111111111111111111111";

    fn payment_method() -> PaymentMethod {
        PaymentMethod {
            scheme: "exact".into(),
            network: "base-sepolia".into(),
            asset: address!("0x036CbD53842c5426634e7929541eC2318f3dCF7e"),
            recipient: address!("0x501ab28fc3c7d29c2d12b243723eb5c5418b9de6"),
            maximum_amount: TokenAmount::from(100_000u64),
            minimum_amount: TokenAmount::from(100_000u64),
            timeout: 300_000,
            description: None,
            extra: None,
        }
    }

    fn topic_for(addr: &str) -> String {
        format!("0x000000000000000000000000{}", &addr[2..])
    }

    fn transfer_log(to: &str, value: u64) -> Value {
        json!({
            "address": ASSET,
            "topics": [TRANSFER_TOPIC, topic_for(PAYER), topic_for(to)],
            "data": format!("0x{value:064x}"),
            "blockNumber": "0x10",
            "blockHash": format!("0x{:064x}", 2),
            "transactionHash": TX,
            "transactionIndex": "0x0",
            "logIndex": "0x0",
            "removed": false
        })
    }

    fn receipt_json(status: &str, logs: Vec<Value>) -> Value {
        json!({
            "transactionHash": TX,
            "transactionIndex": "0x0",
            "blockHash": format!("0x{:064x}", 2),
            "blockNumber": "0x10",
            "from": PAYER,
            "to": ASSET,
            "contractAddress": null,
            "gasUsed": "0x5208",
            "cumulativeGasUsed": "0x5208",
            "effectiveGasPrice": "0x3b9aca00",
            "logsBloom": format!("0x{}", "0".repeat(512)),
            "type": "0x2",
            "status": status,
            "logs": logs
        })
    }

    /// Answers JSON-RPC calls, echoing the request id.
    struct RpcStub {
        receipt: Value,
        head_block: u64,
    }

    impl Respond for RpcStub {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let body: Value = serde_json::from_slice(&request.body).unwrap();
            let result = match body["method"].as_str() {
                Some("eth_getTransactionReceipt") => self.receipt.clone(),
                Some("eth_blockNumber") => json!(format!("0x{:x}", self.head_block)),
                other => panic!("unexpected rpc method: {other:?}"),
            };
            ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": body["id"],
                "result": result
            }))
        }
    }

    async fn backend_with(receipt: Value, head_block: u64) -> (MockServer, ChainBackend) {
        let server = MockServer::start().await;
        Mock::given(http_method("POST"))
            .respond_with(RpcStub {
                receipt,
                head_block,
            })
            .mount(&server)
            .await;
        let backend = ChainBackend::new(server.uri().parse().unwrap());
        (server, backend)
    }

    fn hash_proof() -> PaymentProof {
        PaymentProof::TransactionHash(TX.into())
    }

    #[tokio::test]
    async fn verifies_a_matching_transfer() {
        let (_server, backend) =
            backend_with(receipt_json("0x1", vec![transfer_log(RECIPIENT, 100_000)]), 0x10).await;

        let receipt = backend
            .validate(&payment_method(), &hash_proof())
            .await
            .unwrap();
        assert_eq!(receipt.transaction_hash, TX);
        assert_eq!(receipt.payer.as_deref(), Some(PAYER));
        assert_eq!(receipt.block_number, Some(0x10));
        assert_eq!(receipt.status, SettlementStatus::Confirmed);
    }

    #[tokio::test]
    async fn transfer_to_another_address_is_an_amount_mismatch() {
        let other = "0x2222222222222222222222222222222222222222";
        let (_server, backend) =
            backend_with(receipt_json("0x1", vec![transfer_log(other, 100_000)]), 0x10).await;

        let err = backend
            .validate(&payment_method(), &hash_proof())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::AmountMismatch));
    }

    #[tokio::test]
    async fn transfer_below_minimum_is_an_amount_mismatch() {
        let (_server, backend) =
            backend_with(receipt_json("0x1", vec![transfer_log(RECIPIENT, 50_000)]), 0x10).await;

        let err = backend
            .validate(&payment_method(), &hash_proof())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::AmountMismatch));
    }

    #[tokio::test]
    async fn missing_receipt_is_unknown_transaction() {
        let (_server, backend) = backend_with(Value::Null, 0x10).await;

        let err = backend
            .validate(&payment_method(), &hash_proof())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::UnknownTransaction));
    }

    #[tokio::test]
    async fn reverted_transaction_is_rejected() {
        let (_server, backend) = backend_with(receipt_json("0x0", vec![]), 0x10).await;

        let err = backend
            .validate(&payment_method(), &hash_proof())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Rejected { .. }));
    }

    #[tokio::test]
    async fn insufficient_confirmations_report_unknown_transaction() {
        // mined at 0x10 with head at 0x10 → one confirmation, three required
        let (_server, backend) =
            backend_with(receipt_json("0x1", vec![transfer_log(RECIPIENT, 100_000)]), 0x10).await;
        let backend = backend.with_confirmations(3);

        let err = backend
            .validate(&payment_method(), &hash_proof())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::UnknownTransaction));
    }

    #[tokio::test]
    async fn authorization_proofs_are_declined() {
        let (_server, backend) = backend_with(Value::Null, 0).await;
        let signed: tollgate::SignedAuthorization = serde_json::from_value(json!({
            "x402Version": 1,
            "scheme": "exact",
            "network": "base-sepolia",
            "payload": {
                "signature": format!("0x{}", "42".repeat(65)),
                "authorization": {
                    "from": PAYER,
                    "to": RECIPIENT,
                    "value": "100000",
                    "validAfter": "1700000000",
                    "validBefore": "1700000300",
                    "nonce": format!("0x{:064x}", 1)
                }
            }
        }))
        .unwrap();

        let err = backend
            .validate(&payment_method(), &PaymentProof::Authorization(signed))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Unsupported { .. }));
    }

    #[tokio::test]
    async fn rpc_outage_reports_chain_unavailable() {
        let server = MockServer::start().await;
        Mock::given(http_method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let backend = ChainBackend::new(server.uri().parse().unwrap());

        let err = backend
            .validate(&payment_method(), &hash_proof())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BackendError::Unavailable {
                backend: BackendKind::Chain,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn malformed_hash_is_rejected_without_rpc_calls() {
        let server = MockServer::start().await;
        // no mocks mounted: any request would 404 and fail the test as Unavailable
        let backend = ChainBackend::new(server.uri().parse().unwrap());
        let err = backend
            .validate(
                &payment_method(),
                &PaymentProof::TransactionHash("0x1234".into()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Rejected { .. }));
    }
}
