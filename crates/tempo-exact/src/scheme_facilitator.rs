use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, U256};
use alloy::signers::local::PrivateKeySigner;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::constants::{CAIP_FAMILY, DEFAULT_PATHUSD, VALIDITY_GRACE_SECONDS, X402_VERSION};
use crate::extra::{FeeCaps, TempoPaymentExtra};
use crate::rpc::TempoRpc;
use crate::sponsor::{self, Confirmation};
use crate::tokens::TokenRegistry;
use crate::transaction::{ParsedTransaction, SignedTempoTransaction, TransactionParseError};
use crate::{
    ChainConfig, PaymentPayload, PaymentRequirements, SchemeFacilitator, SettleErrorKind,
    SettleResponse, SupportedKind, SupportedResponse, VerifyErrorKind, VerifyResponse, X402Error,
};

/// Default bound on waiting for a settlement receipt.
pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(30);

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Why a payment failed verification. `Display` is the reason reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("Missing serializedTransaction in payload")]
    MissingTransaction,

    #[error("Expected network {expected}, got {actual}")]
    NetworkMismatch { expected: String, actual: String },

    #[error(transparent)]
    InvalidTransaction(#[from] TransactionParseError),

    #[error("Chain ID {actual} doesn't match {expected}")]
    ChainIdMismatch { expected: u64, actual: u64 },

    #[error("Token {0:#x} is not supported")]
    UnsupportedToken(Address),

    #[error("Transaction token does not match required asset")]
    AssetMismatch,

    #[error("Transaction recipient does not match payTo")]
    RecipientMismatch,

    #[error("Amount {value} < required {required}")]
    InsufficientAmount { value: U256, required: U256 },

    #[error("Invalid requirements: {0}")]
    InvalidRequirements(String),

    /// `party` is "sender", "transfer recipient" or "token contract".
    #[error("Fee payer cannot be the {party}")]
    FeePayerConflict { party: &'static str },

    #[error("Transaction has expired")]
    Expired,

    #[error("Transaction is not yet valid")]
    NotYetValid,

    #[error("validBefore too far in the future")]
    ValidityWindowTooLong,

    #[error("{field} {value} exceeds cap {cap}")]
    FeeCapExceeded {
        field: &'static str,
        value: u128,
        cap: u128,
    },

    #[error("Transaction is missing sender signature")]
    MissingSignature,

    #[error("Sender signature does not recover an address")]
    InvalidSignature,

    #[error("Cannot determine sender address")]
    UnknownSender,

    #[error("Insufficient balance: {balance} < required {required}")]
    InsufficientBalance { balance: U256, required: U256 },
}

impl VerifyError {
    pub fn kind(&self) -> VerifyErrorKind {
        match self {
            Self::MissingTransaction => VerifyErrorKind::MissingTransaction,
            Self::NetworkMismatch { .. } => VerifyErrorKind::NetworkMismatch,
            Self::InvalidTransaction(_) => VerifyErrorKind::InvalidTransaction,
            Self::ChainIdMismatch { .. } => VerifyErrorKind::ChainIdMismatch,
            Self::UnsupportedToken(_) => VerifyErrorKind::UnsupportedToken,
            Self::AssetMismatch => VerifyErrorKind::AssetMismatch,
            Self::RecipientMismatch => VerifyErrorKind::RecipientMismatch,
            Self::InsufficientAmount { .. } => VerifyErrorKind::InsufficientAmount,
            Self::InvalidRequirements(_) => VerifyErrorKind::InvalidRequirements,
            Self::FeePayerConflict { .. } => VerifyErrorKind::FeePayerConflict,
            Self::Expired => VerifyErrorKind::Expired,
            Self::NotYetValid => VerifyErrorKind::NotYetValid,
            Self::ValidityWindowTooLong => VerifyErrorKind::ValidityWindowTooLong,
            Self::FeeCapExceeded { .. } => VerifyErrorKind::FeeCapExceeded,
            Self::MissingSignature => VerifyErrorKind::MissingSignature,
            Self::InvalidSignature => VerifyErrorKind::InvalidSignature,
            Self::UnknownSender => VerifyErrorKind::UnknownSender,
            Self::InsufficientBalance { .. } => VerifyErrorKind::InsufficientBalance,
        }
    }
}

impl From<&VerifyError> for VerifyResponse {
    fn from(err: &VerifyError) -> Self {
        VerifyResponse::invalid(err.kind(), err.to_string())
    }
}

/// Everything a passing verification established, reused by settlement.
struct Verified {
    signed: SignedTempoTransaction,
    parsed: ParsedTransaction,
    payer: Address,
    caps: FeeCaps,
}

type CheckResult = Result<Result<Verified, VerifyError>, X402Error>;

fn fail(err: VerifyError) -> CheckResult {
    Ok(Err(err))
}

/// Facilitator for the Tempo "exact" scheme: verifies payer-signed transfer
/// transactions and settles them as fee sponsor.
pub struct ExactTempoFacilitator<R> {
    rpc: Arc<R>,
    tokens: TokenRegistry<R>,
    sponsor: PrivateKeySigner,
    config: ChainConfig,
    fee_token: Address,
    receipt_timeout: Duration,
    poll_interval: Duration,
}

impl<R: TempoRpc> ExactTempoFacilitator<R> {
    /// Tempo testnet defaults; pathUSD is the only supported token and the
    /// fee token.
    pub fn new(rpc: R, sponsor: PrivateKeySigner) -> Self {
        let rpc = Arc::new(rpc);
        Self {
            tokens: TokenRegistry::new(Arc::clone(&rpc), [DEFAULT_PATHUSD]),
            rpc,
            sponsor,
            config: ChainConfig::default(),
            fee_token: DEFAULT_PATHUSD,
            receipt_timeout: DEFAULT_RECEIPT_TIMEOUT,
            poll_interval: RECEIPT_POLL_INTERVAL,
        }
    }

    pub fn with_chain_config(mut self, config: ChainConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the supported token set.
    pub fn with_supported_tokens(mut self, tokens: impl IntoIterator<Item = Address>) -> Self {
        self.tokens = TokenRegistry::new(Arc::clone(&self.rpc), tokens);
        self
    }

    /// Token the sponsor pays gas in.
    pub fn with_fee_token(mut self, token: Address) -> Self {
        self.fee_token = token;
        self
    }

    pub fn with_receipt_timeout(mut self, timeout: Duration) -> Self {
        self.receipt_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn sponsor_address(&self) -> Address {
        self.sponsor.address()
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn tokens(&self) -> &TokenRegistry<R> {
        &self.tokens
    }

    pub fn rpc(&self) -> &R {
        &self.rpc
    }

    /// Check RPC connectivity by fetching the latest block number.
    pub async fn health_check(&self) -> Result<u64, X402Error> {
        self.rpc.block_number().await
    }

    /// The ordered verification checks. The outer `Err` is an infrastructure
    /// fault; the inner one a policy rejection.
    async fn check(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> CheckResult {
        // 1. Envelope present
        let Some(serialized) = payload.payload.serialized() else {
            return fail(VerifyError::MissingTransaction);
        };

        // 2. Network, by exact string
        if requirements.network != self.config.network {
            return fail(VerifyError::NetworkMismatch {
                expected: self.config.network.clone(),
                actual: requirements.network.clone(),
            });
        }

        // 3. Decode
        let decoded = SignedTempoTransaction::decode_hex(serialized)
            .and_then(|signed| ParsedTransaction::from_signed(&signed).map(|p| (signed, p)));
        let (signed, parsed) = match decoded {
            Ok(decoded) => decoded,
            Err(e) => {
                if e.is_decode_error() {
                    tracing::debug!(
                        prefix = %serialized.get(..66).unwrap_or(serialized),
                        error = %e,
                        "undecodable tempo transaction"
                    );
                }
                return fail(e.into());
            }
        };

        // 4. Chain id
        if let Some(chain_id) = parsed.chain_id {
            if chain_id != self.config.chain_id {
                return fail(VerifyError::ChainIdMismatch {
                    expected: self.config.chain_id,
                    actual: chain_id,
                });
            }
        }

        // 5-7. Token and recipient
        if !self.tokens.is_supported(parsed.token) {
            return fail(VerifyError::UnsupportedToken(parsed.token));
        }
        if parsed.token != requirements.asset {
            return fail(VerifyError::AssetMismatch);
        }
        if parsed.to != requirements.pay_to {
            return fail(VerifyError::RecipientMismatch);
        }

        // 8. Amount; overpayment is accepted
        let required = match requirements.required_amount() {
            Ok(required) => required,
            Err(e) => {
                return fail(VerifyError::InvalidRequirements(format!(
                    "amount '{}': {e}",
                    requirements.amount
                )))
            }
        };
        if parsed.value < required {
            return fail(VerifyError::InsufficientAmount {
                value: parsed.value,
                required,
            });
        }

        // 9. The sponsor must not be a party to the transfer
        // The transfer summary is only consulted for non-secp256k1 signatures
        let secp256k1_signature = signed.has_secp256k1_signature();
        let sender = parsed.from.or_else(|| {
            if secp256k1_signature {
                return None;
            }
            let claimed = payload.payload.claimed_sender();
            if claimed.is_some() {
                tracing::warn!(
                    claimed = ?claimed,
                    "sender not recoverable from signature, using transfer summary"
                );
            }
            claimed
        });
        let sponsor = self.sponsor.address();
        if sender == Some(sponsor) {
            return fail(VerifyError::FeePayerConflict { party: "sender" });
        }
        if parsed.to == sponsor {
            return fail(VerifyError::FeePayerConflict {
                party: "transfer recipient",
            });
        }
        if parsed.token == sponsor {
            return fail(VerifyError::FeePayerConflict {
                party: "token contract",
            });
        }

        // 10. Validity window
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_err(|e| X402Error::ConfigError(format!("system time error: {e}")))?
            .as_secs();
        if let Some(valid_before) = parsed.valid_before {
            if now >= valid_before {
                return fail(VerifyError::Expired);
            }
        }
        if let Some(valid_after) = parsed.valid_after {
            if now < valid_after {
                return fail(VerifyError::NotYetValid);
            }
        }
        if let Some(valid_before) = parsed.valid_before {
            let latest = now
                .saturating_add(requirements.max_timeout_seconds)
                .saturating_add(VALIDITY_GRACE_SECONDS);
            if valid_before > latest {
                return fail(VerifyError::ValidityWindowTooLong);
            }
        }

        // 11. Fee caps
        let caps = match FeeCaps::from_extra(&requirements.extra) {
            Ok(caps) => caps,
            Err(e) => return fail(VerifyError::InvalidRequirements(e.to_string())),
        };
        let limits = [
            ("gas_limit", parsed.gas_limit.map(u128::from), u128::from(caps.gas_limit)),
            ("max_fee_per_gas", parsed.max_fee_per_gas, caps.max_fee_per_gas),
            (
                "max_priority_fee_per_gas",
                parsed.max_priority_fee_per_gas,
                caps.max_priority_fee_per_gas,
            ),
        ];
        for (field, value, cap) in limits {
            if let Some(value) = value.filter(|v| *v > cap) {
                return fail(VerifyError::FeeCapExceeded { field, value, cap });
            }
        }

        // 12. Sender signature present
        if !parsed.has_sender_signature {
            return fail(VerifyError::MissingSignature);
        }

        if secp256k1_signature && parsed.from.is_none() {
            return fail(VerifyError::InvalidSignature);
        }

        // 13. Sender resolvable
        let Some(payer) = sender else {
            return fail(VerifyError::UnknownSender);
        };

        // 14. Live balance; a failed read is a fault, never a pass
        let balance = self.tokens.get_balance(parsed.token, payer).await?;
        if balance < parsed.value {
            return fail(VerifyError::InsufficientBalance {
                balance,
                required: parsed.value,
            });
        }

        Ok(Ok(Verified {
            signed,
            parsed,
            payer,
            caps,
        }))
    }

    fn settle_failure(
        &self,
        kind: SettleErrorKind,
        reason: String,
        transaction: String,
        payer: Option<Address>,
    ) -> SettleResponse {
        tracing::error!(
            reason = %reason,
            kind = ?kind,
            network = %self.config.network,
            tx = %transaction,
            "settlement failed"
        );
        SettleResponse::failed(kind, reason, transaction, self.config.network.clone()).with_payer(payer)
    }
}

impl<R: TempoRpc> SchemeFacilitator for ExactTempoFacilitator<R> {
    fn scheme(&self) -> &str {
        &self.config.scheme_name
    }

    fn caip_family(&self) -> &str {
        CAIP_FAMILY
    }

    async fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<VerifyResponse, X402Error> {
        match self.check(payload, requirements).await? {
            Ok(verified) => {
                tracing::info!(
                    payer = %verified.payer,
                    amount = %verified.parsed.value,
                    token = %verified.parsed.token,
                    "payment verification succeeded"
                );
                Ok(VerifyResponse::valid(verified.payer))
            }
            Err(e) => {
                tracing::warn!(reason = %e, kind = ?e.kind(), "verification failed");
                Ok(VerifyResponse::from(&e))
            }
        }
    }

    async fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<SettleResponse, X402Error> {
        tracing::info!(
            network = %self.config.network,
            amount = %requirements.amount,
            "starting settlement"
        );

        // Re-verify; a verify call made earlier is never trusted
        let verified = match self.check(payload, requirements).await? {
            Ok(verified) => verified,
            Err(e) => {
                return Ok(self.settle_failure(
                    SettleErrorKind::Verification,
                    e.to_string(),
                    String::new(),
                    None,
                ))
            }
        };
        let payer = verified.payer;

        let params = sponsor::derive_sponsor_params(
            self.rpc.as_ref(),
            verified.signed.transaction(),
            payer,
            &verified.caps,
        )
        .await;
        tracing::info!(
            payer = %payer,
            to = %verified.parsed.to,
            token = %verified.parsed.token,
            value = %verified.parsed.value,
            gas_limit = params.gas_limit,
            max_fee_per_gas = %params.max_fee_per_gas,
            max_priority_fee_per_gas = %params.max_priority_fee_per_gas,
            max_cost = %params.max_cost(),
            fee_token = %self.fee_token,
            "preparing sponsored transaction"
        );

        let sponsored = verified.signed.sponsor(self.fee_token, payer, &self.sponsor)?;

        let hash = match sponsor::submit(self.rpc.as_ref(), &sponsored).await {
            Ok(hash) => hash,
            Err(e) => {
                return Ok(self.settle_failure(e.kind(), e.to_string(), String::new(), Some(payer)))
            }
        };
        let transaction = format!("{hash:#x}");
        tracing::info!(tx = %transaction, network = %self.config.network, "transaction submitted, waiting for confirmation");

        match sponsor::wait_for_confirmation(
            self.rpc.as_ref(),
            hash,
            self.receipt_timeout,
            self.poll_interval,
        )
        .await
        {
            Confirmation::Reverted => {
                return Ok(self.settle_failure(
                    SettleErrorKind::Reverted,
                    format!("Transaction {transaction} reverted"),
                    transaction,
                    Some(payer),
                ));
            }
            Confirmation::Unknown(reason) => {
                tracing::warn!(
                    tx = %transaction,
                    reason = %reason,
                    "confirmation not observed, transaction may still succeed"
                );
            }
            Confirmation::Confirmed => {}
        }

        tracing::info!(
            tx = %transaction,
            payer = %payer,
            network = %self.config.network,
            explorer = %self.config.explorer_tx_url(&transaction),
            "settlement completed"
        );
        Ok(SettleResponse::settled(transaction, self.config.network.clone(), payer))
    }

    fn get_extra(&self, network: &str) -> Option<Map<String, Value>> {
        if network != self.config.network {
            return None;
        }
        let mut extra = Map::new();
        TempoPaymentExtra::sponsor_defaults(self.sponsor.address(), self.fee_token)
            .merge_into(&mut extra);
        Some(extra)
    }

    fn get_signers(&self, network: &str) -> Vec<Address> {
        if network == self.config.network || network == CAIP_FAMILY {
            vec![self.sponsor.address()]
        } else {
            Vec::new()
        }
    }

    fn supported(&self) -> SupportedResponse {
        let kind = SupportedKind {
            x402_version: X402_VERSION,
            scheme: self.config.scheme_name.clone(),
            network: self.config.network.clone(),
            extra: self.get_extra(&self.config.network),
        };
        let mut signers = BTreeMap::new();
        signers.insert(CAIP_FAMILY.to_string(), vec![self.sponsor.address()]);
        SupportedResponse {
            kinds: vec![kind],
            extensions: Vec::new(),
            signers,
        }
    }
}
