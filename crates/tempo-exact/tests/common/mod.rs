#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use alloy::primitives::{address, Address, Bytes, TxHash, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;

use x402::rpc::{FeeEstimate, ReceiptStatus, TokenMetadata};
use x402::transaction::{Call, FeePayerSlot};
use x402::{
    ExactTempoPayload, PaymentPayload, PaymentRequirements, TempoRpc, TempoTransaction,
    TransferSummary, X402Error, DEFAULT_PATHUSD, TEMPO_TESTNET_CHAIN_ID, TEMPO_TESTNET_NETWORK,
};

pub const MERCHANT: Address = address!("1111111111111111111111111111111111111111");
pub const OTHER_TOKEN: Address = address!("20c0000000000000000000000000000000000001");

/// In-memory chain double. Every knob is behind a lock so tests can tweak it
/// after the facilitator has taken ownership.
pub struct MockRpc {
    balances: Mutex<HashMap<(Address, Address), U256>>,
    balance_error: Mutex<Option<String>>,
    metadata: Mutex<HashMap<Address, TokenMetadata>>,
    submit_error: Mutex<Option<String>>,
    receipt: Mutex<Option<ReceiptStatus>>,
    tx_hash: TxHash,
    pub metadata_calls: AtomicUsize,
    pub submitted: Mutex<Vec<Bytes>>,
}

impl Default for MockRpc {
    fn default() -> Self {
        Self {
            balances: Mutex::new(HashMap::new()),
            balance_error: Mutex::new(None),
            metadata: Mutex::new(HashMap::new()),
            submit_error: Mutex::new(None),
            receipt: Mutex::new(Some(ReceiptStatus::Success)),
            tx_hash: B256::repeat_byte(0xab),
            metadata_calls: AtomicUsize::new(0),
            submitted: Mutex::new(Vec::new()),
        }
    }
}

impl MockRpc {
    pub fn with_balance(self, token: Address, owner: Address, balance: u64) -> Self {
        self.balances
            .lock()
            .unwrap()
            .insert((token, owner), U256::from(balance));
        self
    }

    pub fn with_balance_error(self, message: &str) -> Self {
        *self.balance_error.lock().unwrap() = Some(message.to_string());
        self
    }

    pub fn with_metadata(self, token: Address, symbol: &str, decimals: u8) -> Self {
        self.metadata.lock().unwrap().insert(
            token,
            TokenMetadata {
                name: format!("{symbol} Token"),
                symbol: symbol.to_string(),
                decimals,
            },
        );
        self
    }

    pub fn with_submit_error(self, message: &str) -> Self {
        *self.submit_error.lock().unwrap() = Some(message.to_string());
        self
    }

    /// `None` keeps the transaction pending forever.
    pub fn with_receipt(self, status: Option<ReceiptStatus>) -> Self {
        *self.receipt.lock().unwrap() = status;
        self
    }

    pub fn tx_hash(&self) -> TxHash {
        self.tx_hash
    }

    pub fn submissions(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }
}

impl TempoRpc for MockRpc {
    async fn block_number(&self) -> Result<u64, X402Error> {
        Ok(1)
    }

    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256, X402Error> {
        if let Some(message) = self.balance_error.lock().unwrap().clone() {
            return Err(X402Error::ChainError(message));
        }
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(&(token, owner))
            .copied()
            .unwrap_or(U256::ZERO))
    }

    async fn token_metadata(&self, token: Address) -> Result<TokenMetadata, X402Error> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        self.metadata
            .lock()
            .unwrap()
            .get(&token)
            .cloned()
            .ok_or_else(|| X402Error::ChainError("execution reverted".to_string()))
    }

    async fn estimate_gas(&self, _from: Address, _to: Address, _input: Bytes) -> Result<u64, X402Error> {
        Ok(50_000)
    }

    async fn estimate_fees(&self) -> Result<FeeEstimate, X402Error> {
        Ok(FeeEstimate {
            max_fee_per_gas: 1_000_000_000,
            max_priority_fee_per_gas: 100_000_000,
        })
    }

    async fn send_raw_transaction(&self, encoded: Bytes) -> Result<TxHash, X402Error> {
        if let Some(message) = self.submit_error.lock().unwrap().clone() {
            return Err(X402Error::ChainError(message));
        }
        self.submitted.lock().unwrap().push(encoded);
        Ok(self.tx_hash)
    }

    async fn receipt_status(&self, _hash: TxHash) -> Result<Option<ReceiptStatus>, X402Error> {
        Ok(*self.receipt.lock().unwrap())
    }
}

pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

pub fn requirements(amount: &str) -> PaymentRequirements {
    PaymentRequirements {
        scheme: "exact".to_string(),
        network: TEMPO_TESTNET_NETWORK.to_string(),
        asset: DEFAULT_PATHUSD,
        amount: amount.to_string(),
        pay_to: MERCHANT,
        max_timeout_seconds: 300,
        extra: serde_json::Map::new(),
    }
}

/// A sponsored pathUSD transfer of `value` to the merchant, valid for 5 minutes.
pub fn transfer_tx(value: u64) -> TempoTransaction {
    TempoTransaction {
        chain_id: TEMPO_TESTNET_CHAIN_ID,
        max_priority_fee_per_gas: Some(1_000_000_000),
        max_fee_per_gas: Some(2_000_000_000),
        gas_limit: Some(100_000),
        calls: vec![Call::transfer(DEFAULT_PATHUSD, MERCHANT, U256::from(value))],
        nonce_key: U256::from(7u64),
        valid_before: Some(now() + 300),
        fee_payer: FeePayerSlot::Requested,
        ..TempoTransaction::default()
    }
}

pub fn sign(tx: TempoTransaction, signer: &PrivateKeySigner) -> String {
    let signature = signer.sign_hash_sync(&tx.sender_signing_hash()).unwrap();
    tx.into_signed(signature).encoded_hex()
}

pub fn payload(serialized: String, requirements: &PaymentRequirements) -> PaymentPayload {
    PaymentPayload {
        x402_version: 2,
        resource: None,
        accepted: requirements.clone(),
        payload: ExactTempoPayload {
            serialized_transaction: Some(serialized),
            transaction: None,
            transfer: None,
        },
    }
}

pub fn summary(from: Address, value: &str) -> TransferSummary {
    TransferSummary {
        token: DEFAULT_PATHUSD.to_string(),
        from: from.to_string(),
        to: MERCHANT.to_string(),
        value: value.to_string(),
    }
}
