//! Payer side: build and sign the transfer transaction for a payment.

use std::future::Future;

use alloy::primitives::{Address, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;

use crate::constants::chain_id_from_network;
use crate::extra::TempoPaymentExtra;
use crate::transaction::{Call, FeePayerSlot, TempoTransaction};
use crate::{
    ExactTempoPayload, PaymentPayload, PaymentRequirements, SchemeClient, TransferSummary,
    X402Error,
};

/// Unsigned transaction a [`TempoSigner`] is asked to sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempoTransactionRequest {
    pub chain_id: u64,
    pub calls: Vec<Call>,
    pub valid_before: Option<u64>,
    pub valid_after: Option<u64>,
    pub gas_limit: Option<u64>,
    pub max_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
    pub nonce_key: U256,
    pub nonce: u64,
    /// Ask a fee payer to cover gas.
    pub sponsored: bool,
}

impl TempoTransactionRequest {
    pub fn to_transaction(&self) -> TempoTransaction {
        TempoTransaction {
            chain_id: self.chain_id,
            max_priority_fee_per_gas: self.max_priority_fee_per_gas,
            max_fee_per_gas: self.max_fee_per_gas,
            gas_limit: self.gas_limit,
            calls: self.calls.clone(),
            nonce_key: self.nonce_key,
            nonce: self.nonce,
            valid_before: self.valid_before,
            valid_after: self.valid_after,
            fee_payer: if self.sponsored {
                FeePayerSlot::Requested
            } else {
                FeePayerSlot::None
            },
            ..TempoTransaction::default()
        }
    }
}

/// Signing capability of a payer.
pub trait TempoSigner: Send + Sync {
    fn address(&self) -> Address;

    /// Return the `0x`-prefixed serialized signed transaction.
    fn sign_tempo_transaction(
        &self,
        request: &TempoTransactionRequest,
    ) -> impl Future<Output = Result<String, X402Error>> + Send;
}

/// [`TempoSigner`] backed by a local secp256k1 key.
#[derive(Debug, Clone)]
pub struct LocalTempoSigner {
    signer: PrivateKeySigner,
}

impl LocalTempoSigner {
    pub fn new(signer: PrivateKeySigner) -> Self {
        Self { signer }
    }
}

impl TempoSigner for LocalTempoSigner {
    fn address(&self) -> Address {
        self.signer.address()
    }

    async fn sign_tempo_transaction(
        &self,
        request: &TempoTransactionRequest,
    ) -> Result<String, X402Error> {
        let tx = request.to_transaction();
        let signature = self
            .signer
            .sign_hash_sync(&tx.sender_signing_hash())
            .map_err(|e| X402Error::SignatureError(format!("failed to sign transaction: {e}")))?;
        Ok(tx.into_signed(signature).encoded_hex())
    }
}

/// Builds "exact" payment payloads for Tempo requirements.
pub struct ExactTempoClient<S> {
    signer: S,
}

impl<S: TempoSigner> ExactTempoClient<S> {
    pub fn new(signer: S) -> Self {
        Self { signer }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }
}

impl ExactTempoClient<LocalTempoSigner> {
    pub fn with_private_key(signer: PrivateKeySigner) -> Self {
        Self::new(LocalTempoSigner::new(signer))
    }
}

/// A fresh 2-D nonce key so concurrent payments never share a nonce sequence.
fn random_nonce_key() -> U256 {
    U256::from_be_bytes(rand::random::<[u8; 32]>())
}

impl<S: TempoSigner> SchemeClient for ExactTempoClient<S> {
    async fn create_payment_payload(
        &self,
        x402_version: u32,
        requirements: &PaymentRequirements,
    ) -> Result<PaymentPayload, X402Error> {
        let chain_id = chain_id_from_network(&requirements.network).ok_or_else(|| {
            X402Error::InvalidPayment(format!("unrecognized network '{}'", requirements.network))
        })?;
        let amount = requirements.required_amount().map_err(|e| {
            X402Error::InvalidPayment(format!("invalid amount '{}': {e}", requirements.amount))
        })?;
        let caps = TempoPaymentExtra::from_map(&requirements.extra)
            .map_err(|e| X402Error::InvalidPayment(e.to_string()))?
            .fee_caps();

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_err(|e| X402Error::ConfigError(format!("system time error: {e}")))?
            .as_secs();
        let valid_before = match requirements.max_timeout_seconds {
            0 => None,
            timeout => Some(now.saturating_add(timeout)),
        };

        let request = TempoTransactionRequest {
            chain_id,
            calls: vec![Call::transfer(requirements.asset, requirements.pay_to, amount)],
            valid_before,
            valid_after: None,
            gas_limit: Some(caps.gas_limit),
            max_fee_per_gas: Some(caps.max_fee_per_gas),
            max_priority_fee_per_gas: Some(caps.max_priority_fee_per_gas),
            nonce_key: random_nonce_key(),
            nonce: 0,
            sponsored: true,
        };
        let serialized = self.signer.sign_tempo_transaction(&request).await?;

        tracing::debug!(
            payer = %self.signer.address(),
            pay_to = %requirements.pay_to,
            amount = %amount,
            "signed tempo payment"
        );

        Ok(PaymentPayload {
            x402_version,
            resource: None,
            accepted: requirements.clone(),
            payload: ExactTempoPayload {
                serialized_transaction: Some(serialized),
                transaction: None,
                transfer: Some(TransferSummary {
                    token: requirements.asset.to_string(),
                    from: self.signer.address().to_string(),
                    to: requirements.pay_to.to_string(),
                    value: requirements.amount.clone(),
                }),
            },
        })
    }
}
