//! Chain access used by the facilitator.
//!
//! Everything the verification pipeline and settlement engine need from the
//! chain goes through [`TempoRpc`]. [`ProviderRpc`] implements it over any
//! alloy [`Provider`].

use std::future::Future;

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::providers::Provider;
use alloy::rpc::types::TransactionRequest;

use crate::{tip20, X402Error};

/// TIP-20 token metadata as read from the contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Current fee market suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeEstimate {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

/// Outcome recorded in a mined transaction's receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptStatus {
    Success,
    Reverted,
}

/// Read, estimate and submit operations against a Tempo node.
pub trait TempoRpc: Send + Sync {
    /// Latest block number.
    fn block_number(&self) -> impl Future<Output = Result<u64, X402Error>> + Send;

    /// Live TIP-20 balance of `owner`.
    fn balance_of(
        &self,
        token: Address,
        owner: Address,
    ) -> impl Future<Output = Result<U256, X402Error>> + Send;

    fn token_metadata(
        &self,
        token: Address,
    ) -> impl Future<Output = Result<TokenMetadata, X402Error>> + Send;

    /// Gas estimate for a zero-value call from `from` to `to`.
    fn estimate_gas(
        &self,
        from: Address,
        to: Address,
        input: Bytes,
    ) -> impl Future<Output = Result<u64, X402Error>> + Send;

    fn estimate_fees(&self) -> impl Future<Output = Result<FeeEstimate, X402Error>> + Send;

    /// `eth_sendRawTransaction`. The error text is the node's message.
    fn send_raw_transaction(
        &self,
        encoded: Bytes,
    ) -> impl Future<Output = Result<TxHash, X402Error>> + Send;

    /// Receipt status, or `None` while the transaction is pending.
    fn receipt_status(
        &self,
        hash: TxHash,
    ) -> impl Future<Output = Result<Option<ReceiptStatus>, X402Error>> + Send;
}

/// [`TempoRpc`] over an alloy provider.
#[derive(Debug, Clone)]
pub struct ProviderRpc<P> {
    provider: P,
}

impl<P> ProviderRpc<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

impl<P> TempoRpc for ProviderRpc<P>
where
    P: Provider + Send + Sync,
{
    async fn block_number(&self) -> Result<u64, X402Error> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| X402Error::ChainError(format!("eth_blockNumber failed: {e}")))
    }

    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256, X402Error> {
        tip20::balance_of(&self.provider, token, owner).await
    }

    async fn token_metadata(&self, token: Address) -> Result<TokenMetadata, X402Error> {
        tip20::token_metadata(&self.provider, token).await
    }

    async fn estimate_gas(&self, from: Address, to: Address, input: Bytes) -> Result<u64, X402Error> {
        let request = TransactionRequest::default()
            .with_from(from)
            .with_to(to)
            .with_input(input)
            .with_value(U256::ZERO);
        self.provider
            .estimate_gas(request)
            .await
            .map_err(|e| X402Error::ChainError(format!("eth_estimateGas failed: {e}")))
    }

    async fn estimate_fees(&self) -> Result<FeeEstimate, X402Error> {
        let fees = self
            .provider
            .estimate_eip1559_fees()
            .await
            .map_err(|e| X402Error::ChainError(format!("fee estimation failed: {e}")))?;
        Ok(FeeEstimate {
            max_fee_per_gas: fees.max_fee_per_gas,
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
        })
    }

    async fn send_raw_transaction(&self, encoded: Bytes) -> Result<TxHash, X402Error> {
        let pending = self
            .provider
            .send_raw_transaction(&encoded)
            .await
            .map_err(|e| X402Error::ChainError(e.to_string()))?;
        Ok(*pending.tx_hash())
    }

    async fn receipt_status(&self, hash: TxHash) -> Result<Option<ReceiptStatus>, X402Error> {
        // Raw JSON: the receipt of a type 0x76 transaction does not fit the
        // Ethereum receipt envelope.
        let receipt: Option<serde_json::Value> = self
            .provider
            .raw_request("eth_getTransactionReceipt".into(), (hash,))
            .await
            .map_err(|e| X402Error::ChainError(format!("eth_getTransactionReceipt failed: {e}")))?;

        Ok(receipt.map(|r| match r.get("status").and_then(|s| s.as_str()) {
            Some("0x0") => ReceiptStatus::Reverted,
            _ => ReceiptStatus::Success,
        }))
    }
}
