use std::collections::BTreeMap;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::payment::SupportedKind;

/// Stable machine-readable cause of a failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyErrorKind {
    MissingTransaction,
    NetworkMismatch,
    InvalidTransaction,
    ChainIdMismatch,
    UnsupportedToken,
    AssetMismatch,
    RecipientMismatch,
    InsufficientAmount,
    InvalidRequirements,
    FeePayerConflict,
    Expired,
    NotYetValid,
    ValidityWindowTooLong,
    FeeCapExceeded,
    MissingSignature,
    InvalidSignature,
    UnknownSender,
    InsufficientBalance,
}

/// Stable machine-readable cause of a failed settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettleErrorKind {
    /// Re-verification rejected the payment; nothing was submitted.
    Verification,
    InsufficientBalance,
    NonceError,
    SignatureError,
    SubmissionError,
    /// The transaction landed on-chain and reverted.
    Reverted,
}

/// Response from the facilitator's `/verify` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_kind: Option<VerifyErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payer: Option<Address>,
}

impl VerifyResponse {
    pub fn valid(payer: Address) -> Self {
        Self {
            is_valid: true,
            invalid_reason: None,
            invalid_kind: None,
            payer: Some(payer),
        }
    }

    pub fn invalid(kind: VerifyErrorKind, reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            invalid_reason: Some(reason.into()),
            invalid_kind: Some(kind),
            payer: None,
        }
    }
}

/// Response from the facilitator's `/settle` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<SettleErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payer: Option<Address>,
    /// Transaction hash; empty when nothing was submitted.
    #[serde(default)]
    pub transaction: String,
    pub network: String,
}

impl SettleResponse {
    pub fn settled(transaction: impl Into<String>, network: impl Into<String>, payer: Address) -> Self {
        Self {
            success: true,
            error_reason: None,
            error_kind: None,
            payer: Some(payer),
            transaction: transaction.into(),
            network: network.into(),
        }
    }

    pub fn failed(
        kind: SettleErrorKind,
        reason: impl Into<String>,
        transaction: impl Into<String>,
        network: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            error_reason: Some(reason.into()),
            error_kind: Some(kind),
            payer: None,
            transaction: transaction.into(),
            network: network.into(),
        }
    }

    pub fn with_payer(mut self, payer: Option<Address>) -> Self {
        self.payer = payer;
        self
    }
}

/// Response from the facilitator's `/supported` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedResponse {
    pub kinds: Vec<SupportedKind>,
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Network pattern to the addresses that co-sign as fee payer.
    #[serde(default)]
    pub signers: BTreeMap<String, Vec<Address>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_response_wire_shape() {
        let resp = VerifyResponse::invalid(VerifyErrorKind::Expired, "Transaction has expired");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["isValid"], false);
        assert_eq!(json["invalidReason"], "Transaction has expired");
        assert_eq!(json["invalidKind"], "expired");
        assert!(json.get("payer").is_none());
    }

    #[test]
    fn test_failed_settlement_keeps_empty_transaction() {
        let resp = SettleResponse::failed(
            SettleErrorKind::Verification,
            "Transaction has expired",
            "",
            "tempo:42429",
        );
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["transaction"], "");
        assert_eq!(json["errorKind"], "verification");
        assert_eq!(json["network"], "tempo:42429");
    }
}
