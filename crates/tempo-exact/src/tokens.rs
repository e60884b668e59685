//! Supported-token set, metadata cache and balance lookups.

use std::collections::HashSet;
use std::sync::Arc;

use alloy::primitives::utils::{format_units, parse_units, ParseUnits};
use alloy::primitives::{Address, U256};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_PATHUSD;
use crate::rpc::TempoRpc;
use crate::X402Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedTokenInfo {
    pub address: Address,
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
}

/// Well-known tokens resolved without an RPC round trip:
/// `(address, symbol, name, decimals)`.
pub const KNOWN_TOKENS: &[(Address, &str, &str, u8)] =
    &[(DEFAULT_PATHUSD, "pathUSD", "pathUSD", 6)];

fn known_token(token: Address) -> Option<SupportedTokenInfo> {
    KNOWN_TOKENS
        .iter()
        .find(|(address, ..)| *address == token)
        .map(|(address, symbol, name, decimals)| SupportedTokenInfo {
            address: *address,
            symbol: symbol.to_string(),
            name: name.to_string(),
            decimals: *decimals,
        })
}

/// Answers "is this token acceptable" and "what does this account hold".
///
/// The supported set is fixed at construction. Metadata is cached per address
/// on first successful resolution and never replaced.
pub struct TokenRegistry<R> {
    rpc: Arc<R>,
    supported: HashSet<Address>,
    cache: DashMap<Address, SupportedTokenInfo>,
}

impl<R: TempoRpc> TokenRegistry<R> {
    pub fn new(rpc: Arc<R>, supported: impl IntoIterator<Item = Address>) -> Self {
        Self {
            rpc,
            supported: supported.into_iter().collect(),
            cache: DashMap::new(),
        }
    }

    pub fn is_supported(&self, token: Address) -> bool {
        self.supported.contains(&token)
    }

    /// Supported addresses in ascending order.
    pub fn supported_tokens(&self) -> Vec<Address> {
        let mut tokens: Vec<Address> = self.supported.iter().copied().collect();
        tokens.sort();
        tokens
    }

    /// Metadata for a supported token: cache, then the built-in table, then
    /// three concurrent contract reads. An RPC failure yields `None`.
    pub async fn get_token_info(&self, token: Address) -> Option<SupportedTokenInfo> {
        if !self.is_supported(token) {
            return None;
        }
        if let Some(info) = self.cache.get(&token) {
            return Some(info.clone());
        }

        let info = match known_token(token) {
            Some(info) => info,
            None => match self.rpc.token_metadata(token).await {
                Ok(meta) => SupportedTokenInfo {
                    address: token,
                    symbol: meta.symbol,
                    name: meta.name,
                    decimals: meta.decimals,
                },
                Err(e) => {
                    tracing::warn!(token = %token, error = %e, "token metadata unavailable");
                    return None;
                }
            },
        };

        Some(self.cache.entry(token).or_insert(info).clone())
    }

    /// Metadata for every supported token that resolves.
    pub async fn get_all_supported_tokens(&self) -> Vec<SupportedTokenInfo> {
        let mut tokens = Vec::new();
        for token in self.supported_tokens() {
            if let Some(info) = self.get_token_info(token).await {
                tokens.push(info);
            }
        }
        tokens
    }

    /// Live balance read. Never cached; errors propagate.
    pub async fn get_balance(&self, token: Address, account: Address) -> Result<U256, X402Error> {
        self.rpc.balance_of(token, account).await
    }
}

/// Parse a decimal token amount ("1.5") into smallest units.
pub fn parse_token_amount(amount: &str, decimals: u8) -> Result<U256, X402Error> {
    match parse_units(amount.trim(), decimals) {
        Ok(ParseUnits::U256(value)) => Ok(value),
        Ok(ParseUnits::I256(_)) => Err(X402Error::InvalidPayment(format!(
            "negative token amount '{amount}'"
        ))),
        Err(e) => Err(X402Error::InvalidPayment(format!(
            "invalid token amount '{amount}': {e}"
        ))),
    }
}

/// Render smallest units as a decimal string without trailing zeros.
pub fn format_token_amount(amount: U256, decimals: u8) -> Result<String, X402Error> {
    let formatted = format_units(amount, decimals)
        .map_err(|e| X402Error::InvalidPayment(format!("cannot format amount: {e}")))?;
    if !formatted.contains('.') {
        return Ok(formatted);
    }
    Ok(formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string())
}
