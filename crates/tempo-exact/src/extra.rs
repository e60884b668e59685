//! Typed view over the open-ended `extra` map of payment requirements.
//!
//! Only a closed set of keys is interpreted; each has one accepted value
//! shape (address string, or unsigned integer given as a decimal string or a
//! JSON number). Every other key is carried through untouched.

use alloy::primitives::Address;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::constants::{
    DEFAULT_GAS_LIMIT_CAP, DEFAULT_MAX_FEE_PER_GAS_CAP, DEFAULT_MAX_PRIORITY_FEE_PER_GAS_CAP,
};

pub const FEE_PAYER_KEY: &str = "feePayer";
pub const FEE_TOKEN_HINT_KEY: &str = "feeTokenHint";
pub const GAS_LIMIT_MAX_KEY: &str = "gasLimitMax";
pub const MAX_FEE_PER_GAS_MAX_KEY: &str = "maxFeePerGasMax";
pub const MAX_PRIORITY_FEE_PER_GAS_MAX_KEY: &str = "maxPriorityFeePerGasMax";

/// A recognized `extra` key held a value of the wrong shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid value for extra.{key}: {reason}")]
pub struct ExtraError {
    pub key: &'static str,
    pub reason: String,
}

/// Recognized Tempo-specific `extra` fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TempoPaymentExtra {
    pub fee_payer: Option<Address>,
    pub fee_token_hint: Option<Address>,
    pub gas_limit_max: Option<u64>,
    pub max_fee_per_gas_max: Option<u128>,
    pub max_priority_fee_per_gas_max: Option<u128>,
}

impl TempoPaymentExtra {
    /// What a sponsor advertises: itself, its fee token and the default caps.
    pub fn sponsor_defaults(fee_payer: Address, fee_token: Address) -> Self {
        let caps = FeeCaps::default();
        Self {
            fee_payer: Some(fee_payer),
            fee_token_hint: Some(fee_token),
            gas_limit_max: Some(caps.gas_limit),
            max_fee_per_gas_max: Some(caps.max_fee_per_gas),
            max_priority_fee_per_gas_max: Some(caps.max_priority_fee_per_gas),
        }
    }

    /// Read the recognized keys out of an `extra` map.
    pub fn from_map(extra: &Map<String, Value>) -> Result<Self, ExtraError> {
        Ok(Self {
            fee_payer: address_field(extra, FEE_PAYER_KEY)?,
            fee_token_hint: address_field(extra, FEE_TOKEN_HINT_KEY)?,
            gas_limit_max: integer_field(extra, GAS_LIMIT_MAX_KEY)?,
            max_fee_per_gas_max: integer_field(extra, MAX_FEE_PER_GAS_MAX_KEY)?,
            max_priority_fee_per_gas_max: integer_field(extra, MAX_PRIORITY_FEE_PER_GAS_MAX_KEY)?,
        })
    }

    /// Write the populated fields into `extra`, overwriting those keys only.
    /// Integers are written as decimal strings.
    pub fn merge_into(&self, extra: &mut Map<String, Value>) {
        if let Some(addr) = self.fee_payer {
            extra.insert(FEE_PAYER_KEY.into(), Value::String(addr.to_string()));
        }
        if let Some(addr) = self.fee_token_hint {
            extra.insert(FEE_TOKEN_HINT_KEY.into(), Value::String(addr.to_string()));
        }
        if let Some(v) = self.gas_limit_max {
            extra.insert(GAS_LIMIT_MAX_KEY.into(), Value::String(v.to_string()));
        }
        if let Some(v) = self.max_fee_per_gas_max {
            extra.insert(MAX_FEE_PER_GAS_MAX_KEY.into(), Value::String(v.to_string()));
        }
        if let Some(v) = self.max_priority_fee_per_gas_max {
            extra.insert(
                MAX_PRIORITY_FEE_PER_GAS_MAX_KEY.into(),
                Value::String(v.to_string()),
            );
        }
    }

    /// Effective fee caps: merchant-supplied values, else scheme defaults.
    pub fn fee_caps(&self) -> FeeCaps {
        let defaults = FeeCaps::default();
        FeeCaps {
            gas_limit: self.gas_limit_max.unwrap_or(defaults.gas_limit),
            max_fee_per_gas: self.max_fee_per_gas_max.unwrap_or(defaults.max_fee_per_gas),
            max_priority_fee_per_gas: self
                .max_priority_fee_per_gas_max
                .unwrap_or(defaults.max_priority_fee_per_gas),
        }
    }
}

/// Upper bounds on the gas a sponsor can be made to pay for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeCaps {
    pub gas_limit: u64,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

impl Default for FeeCaps {
    fn default() -> Self {
        Self {
            gas_limit: DEFAULT_GAS_LIMIT_CAP,
            max_fee_per_gas: DEFAULT_MAX_FEE_PER_GAS_CAP,
            max_priority_fee_per_gas: DEFAULT_MAX_PRIORITY_FEE_PER_GAS_CAP,
        }
    }
}

impl FeeCaps {
    /// Resolve caps from a requirements `extra` map.
    pub fn from_extra(extra: &Map<String, Value>) -> Result<Self, ExtraError> {
        Ok(TempoPaymentExtra::from_map(extra)?.fee_caps())
    }
}

fn address_field(extra: &Map<String, Value>, key: &'static str) -> Result<Option<Address>, ExtraError> {
    match extra.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => s.parse().map(Some).map_err(|e| ExtraError {
            key,
            reason: format!("{e}"),
        }),
        Some(other) => Err(ExtraError {
            key,
            reason: format!("expected address string, got {other}"),
        }),
    }
}

fn integer_field<T>(extra: &Map<String, Value>, key: &'static str) -> Result<Option<T>, ExtraError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let text = match extra.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => {
            return Err(ExtraError {
                key,
                reason: format!("expected unsigned integer, got {other}"),
            })
        }
    };
    text.parse::<T>().map(Some).map_err(|e| ExtraError {
        key,
        reason: format!("'{text}': {e}"),
    })
}
