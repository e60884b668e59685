use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// Merchant-issued payment requirements (one entry of a 402 `accepts` array).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    pub scheme: String,
    pub network: String,
    pub asset: Address,
    /// Smallest-unit integer as a decimal string.
    pub amount: String,
    pub pay_to: Address,
    pub max_timeout_seconds: u64,
    /// Scheme-specific hints; see [`TempoPaymentExtra`](crate::TempoPaymentExtra).
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PaymentRequirements {
    /// Parse `amount` as an unsigned 256-bit integer.
    pub fn required_amount(&self) -> Result<U256, alloy::primitives::ruint::ParseError> {
        U256::from_str_radix(self.amount.trim(), 10)
    }
}

/// Descriptor of the paid resource. Opaque to the scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInfo {
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub mime_type: String,
}

/// Redundant human-readable summary of the transfer. Never trusted on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferSummary {
    pub token: String,
    pub from: String,
    pub to: String,
    pub value: String,
}

/// Scheme-specific part of the payment payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactTempoPayload {
    /// Hex-encoded, sender-signed Tempo transaction envelope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serialized_transaction: Option<String>,
    /// Legacy key for the same envelope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer: Option<TransferSummary>,
}

impl ExactTempoPayload {
    /// The serialized envelope under either recognized key.
    pub fn serialized(&self) -> Option<&str> {
        self.serialized_transaction
            .as_deref()
            .or(self.transaction.as_deref())
            .filter(|s| !s.is_empty())
    }

    /// Sender claimed by the transfer summary, if it parses as an address.
    pub fn claimed_sender(&self) -> Option<Address> {
        self.transfer.as_ref()?.from.parse().ok()
    }
}

/// Wire-format payment payload sent by the payer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub x402_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceInfo>,
    pub accepted: PaymentRequirements,
    pub payload: ExactTempoPayload,
}

/// A scheme/network pair a facilitator can serve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedKind {
    pub x402_version: u32,
    pub scheme: String,
    pub network: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Map<String, serde_json::Value>>,
}

/// A concrete on-chain amount of a specific asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetAmount {
    pub amount: String,
    pub asset: Address,
}

/// A price as configured by a merchant.
///
/// Either an explicit [`AssetAmount`], a money string such as `"$0.01"`, or a
/// bare JSON number. Numbers are kept in their textual form and never pass
/// through a floating-point type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Price {
    AssetAmount(AssetAmount),
    Money(String),
    Number(serde_json::Number),
}

impl From<&str> for Price {
    fn from(value: &str) -> Self {
        Price::Money(value.to_string())
    }
}
