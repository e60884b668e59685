//! Core trait definitions for the three-party payment model.
//!
//! - [`SchemeClient`]: payer side: builds signed payment payloads
//! - [`SchemeFacilitator`]: facilitator side: verifies and settles payments
//! - [`SchemeServer`]: merchant side: prices resources and advertises requirements
//!
//! See [`crate::scheme_facilitator::ExactTempoFacilitator`],
//! [`crate::scheme_client::ExactTempoClient`] and
//! [`crate::scheme_server::ExactTempoServer`] for the Tempo implementations.

use alloy::primitives::Address;
use serde_json::{Map, Value};

use crate::error::X402Error;
use crate::payment::{AssetAmount, PaymentPayload, PaymentRequirements, Price, SupportedKind};
use crate::response::{SettleResponse, SupportedResponse, VerifyResponse};

/// Payer-side scheme: creates signed payment payloads.
pub trait SchemeClient: Send + Sync {
    /// Create a signed payment payload for the given requirements.
    fn create_payment_payload(
        &self,
        x402_version: u32,
        requirements: &PaymentRequirements,
    ) -> impl std::future::Future<Output = Result<PaymentPayload, X402Error>> + Send;
}

/// Facilitator-side scheme: verifies and settles payments.
///
/// Policy rejections come back as `Ok` responses with `is_valid` /
/// `success` false; `Err` is reserved for infrastructure faults.
pub trait SchemeFacilitator: Send + Sync {
    fn scheme(&self) -> &str;

    /// Network family pattern, e.g. `tempo:*`.
    fn caip_family(&self) -> &str;

    /// Verify a payment payload against the requirements.
    fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> impl std::future::Future<Output = Result<VerifyResponse, X402Error>> + Send;

    /// Settle a payment on-chain (re-verifies first, then co-signs and submits).
    fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> impl std::future::Future<Output = Result<SettleResponse, X402Error>> + Send;

    /// `extra` fields merchants embed in requirements for `network`, or
    /// `None` if this facilitator does not serve it.
    fn get_extra(&self, network: &str) -> Option<Map<String, Value>>;

    /// Addresses that co-sign as fee payer on `network`.
    fn get_signers(&self, network: &str) -> Vec<Address>;

    /// Capability advertisement for `/supported`.
    fn supported(&self) -> SupportedResponse;
}

/// Merchant-side scheme: turns prices into on-chain amounts.
pub trait SchemeServer: Send + Sync {
    /// Resolve a configured price into an amount of a concrete asset.
    fn parse_price(&self, price: &Price, network: &str) -> Result<AssetAmount, X402Error>;

    /// Copy of `requirements` with scheme defaults and `supported_kind.extra`
    /// merged into `extra`.
    fn enhance_payment_requirements(
        &self,
        requirements: PaymentRequirements,
        supported_kind: &SupportedKind,
        extensions: &[String],
    ) -> PaymentRequirements;
}
