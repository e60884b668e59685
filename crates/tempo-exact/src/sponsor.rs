//! Fee sponsorship: gas parameter derivation, submission and confirmation.

use std::time::Duration;

use alloy::primitives::{Address, TxHash};
use thiserror::Error;

use crate::constants::{FALLBACK_FEE_PER_GAS, FALLBACK_GAS_LIMIT};
use crate::extra::FeeCaps;
use crate::response::SettleErrorKind;
use crate::rpc::{ReceiptStatus, TempoRpc};
use crate::transaction::{SponsoredTempoTransaction, TempoTransaction};
use crate::X402Error;

/// Gas parameters the sponsor is exposed to for one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SponsorParams {
    pub gas_limit: u64,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

impl SponsorParams {
    /// Upper bound on the fee charged to the sponsor.
    pub fn max_cost(&self) -> u128 {
        u128::from(self.gas_limit).saturating_mul(self.max_fee_per_gas)
    }
}

/// Fill in gas parameters the envelope leaves open.
///
/// Gas is estimated with a 20% margin, fees from the current market; each
/// falls back to a constant when estimation fails. Every value is clamped to
/// `caps`.
pub async fn derive_sponsor_params<R: TempoRpc>(
    rpc: &R,
    tx: &TempoTransaction,
    sender: Address,
    caps: &FeeCaps,
) -> SponsorParams {
    let gas_limit = match tx.gas_limit {
        Some(gas) => gas,
        None => estimate_gas_with_margin(rpc, tx, sender).await,
    };

    let (max_fee_per_gas, max_priority_fee_per_gas) =
        match (tx.max_fee_per_gas, tx.max_priority_fee_per_gas) {
            (Some(max_fee), Some(priority)) => (max_fee, priority),
            (max_fee, priority) => match rpc.estimate_fees().await {
                Ok(fees) => (
                    max_fee.unwrap_or(fees.max_fee_per_gas),
                    priority.unwrap_or(fees.max_priority_fee_per_gas),
                ),
                Err(e) => {
                    tracing::warn!(error = %e, "fee estimation failed, using fallback");
                    (
                        max_fee.unwrap_or(FALLBACK_FEE_PER_GAS),
                        priority.unwrap_or(FALLBACK_FEE_PER_GAS),
                    )
                }
            },
        };

    let max_fee_per_gas = max_fee_per_gas.min(caps.max_fee_per_gas);
    SponsorParams {
        gas_limit: gas_limit.min(caps.gas_limit),
        max_fee_per_gas,
        max_priority_fee_per_gas: max_priority_fee_per_gas
            .min(caps.max_priority_fee_per_gas)
            .min(max_fee_per_gas),
    }
}

async fn estimate_gas_with_margin<R: TempoRpc>(rpc: &R, tx: &TempoTransaction, sender: Address) -> u64 {
    let Some((to, input)) = tx
        .calls
        .first()
        .and_then(|call| call.to.map(|to| (to, call.input.clone())))
    else {
        return FALLBACK_GAS_LIMIT;
    };

    match rpc.estimate_gas(sender, to, input).await {
        Ok(estimated) => estimated.saturating_mul(120) / 100,
        Err(e) => {
            tracing::warn!(error = %e, "gas estimation failed, using fallback");
            FALLBACK_GAS_LIMIT
        }
    }
}

/// A rejected `eth_sendRawTransaction`, classified by the node's message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),

    #[error("Nonce error: {0}")]
    Nonce(String),

    #[error("Signature error: {0}")]
    Signature(String),

    #[error("Failed to submit transaction: {0}")]
    Other(String),
}

impl SubmissionError {
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_ascii_lowercase();
        if lower.contains("insufficient funds") || lower.contains("balance") {
            Self::InsufficientBalance(message)
        } else if lower.contains("nonce") {
            Self::Nonce(message)
        } else if lower.contains("signature") || lower.contains("invalid") {
            Self::Signature(message)
        } else {
            Self::Other(message)
        }
    }

    pub fn kind(&self) -> SettleErrorKind {
        match self {
            Self::InsufficientBalance(_) => SettleErrorKind::InsufficientBalance,
            Self::Nonce(_) => SettleErrorKind::NonceError,
            Self::Signature(_) => SettleErrorKind::SignatureError,
            Self::Other(_) => SettleErrorKind::SubmissionError,
        }
    }
}

/// Submit the co-signed envelope.
pub async fn submit<R: TempoRpc>(
    rpc: &R,
    sponsored: &SponsoredTempoTransaction,
) -> Result<TxHash, SubmissionError> {
    rpc.send_raw_transaction(sponsored.encoded())
        .await
        .map_err(|e| match e {
            X402Error::ChainError(message) => SubmissionError::classify(message),
            other => SubmissionError::classify(other.to_string()),
        })
}

/// What was learned while waiting for a receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    Reverted,
    /// Timed out or the receipt lookup failed; the transaction may still land.
    Unknown(String),
}

/// Poll for the receipt of `hash` until it appears or `timeout` elapses.
pub async fn wait_for_confirmation<R: TempoRpc>(
    rpc: &R,
    hash: TxHash,
    timeout: Duration,
    poll_interval: Duration,
) -> Confirmation {
    let poll = async {
        loop {
            match rpc.receipt_status(hash).await? {
                Some(status) => return Ok::<_, X402Error>(status),
                None => tokio::time::sleep(poll_interval).await,
            }
        }
    };

    match tokio::time::timeout(timeout, poll).await {
        Ok(Ok(ReceiptStatus::Success)) => Confirmation::Confirmed,
        Ok(Ok(ReceiptStatus::Reverted)) => Confirmation::Reverted,
        Ok(Err(e)) => Confirmation::Unknown(e.to_string()),
        Err(_) => Confirmation::Unknown(format!(
            "no receipt after {}ms",
            timeout.as_millis()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_submission_errors() {
        let err = SubmissionError::classify("insufficient funds for gas * price + value");
        assert_eq!(err.kind(), SettleErrorKind::InsufficientBalance);
        assert!(err.to_string().starts_with("Insufficient balance: "));

        let err = SubmissionError::classify("fee token balance too low");
        assert_eq!(err.kind(), SettleErrorKind::InsufficientBalance);

        let err = SubmissionError::classify("nonce too low");
        assert_eq!(err.kind(), SettleErrorKind::NonceError);
        assert_eq!(err.to_string(), "Nonce error: nonce too low");

        let err = SubmissionError::classify("invalid fee payer signature");
        assert_eq!(err.kind(), SettleErrorKind::SignatureError);

        let err = SubmissionError::classify("connection reset by peer");
        assert_eq!(err.kind(), SettleErrorKind::SubmissionError);
        assert_eq!(
            err.to_string(),
            "Failed to submit transaction: connection reset by peer"
        );
    }

    #[test]
    fn test_max_cost_saturates() {
        let params = SponsorParams {
            gas_limit: u64::MAX,
            max_fee_per_gas: u128::MAX,
            max_priority_fee_per_gas: 0,
        };
        assert_eq!(params.max_cost(), u128::MAX);
    }
}
