use alloy::primitives::{Address, U256};

use crate::extra::TempoPaymentExtra;
use crate::{
    AssetAmount, ChainConfig, PaymentRequirements, Price, SchemeServer, SupportedKind, X402Error,
};

/// Render a JSON number as plain decimal text. `serde_json` prints very
/// small and very large floats in exponent form (`1e-7`), which the
/// digit filter in price parsing would otherwise misread.
fn plain_decimal(number: &serde_json::Number) -> Result<String, X402Error> {
    let text = number.to_string();
    let Some((mantissa, exponent)) = text.split_once(['e', 'E']) else {
        return Ok(text);
    };
    let invalid = || X402Error::InvalidPayment(format!("invalid price '{text}'"));
    let exponent: i64 = exponent.parse().map_err(|_| invalid())?;
    if exponent.abs() > 400 {
        return Err(invalid());
    }

    let (sign, mantissa) = match mantissa.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", mantissa),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let digits = format!("{int_part}{frac_part}");
    let point = int_part.len() as i64 + exponent;

    let plain = if point <= 0 {
        format!("0.{}{digits}", "0".repeat(point.unsigned_abs() as usize))
    } else if point as usize >= digits.len() {
        format!("{digits}{}", "0".repeat(point as usize - digits.len()))
    } else {
        let (whole, fraction) = digits.split_at(point as usize);
        format!("{whole}.{fraction}")
    };
    Ok(format!("{sign}{plain}"))
}

/// Merchant-side scheme: prices resources and advertises sponsorship hints.
pub struct ExactTempoServer {
    config: ChainConfig,
    fee_payer: Address,
}

impl ExactTempoServer {
    /// `fee_payer` is the facilitator's sponsor address.
    pub fn new(fee_payer: Address) -> Self {
        Self {
            config: ChainConfig::default(),
            fee_payer,
        }
    }

    pub fn with_chain_config(mut self, config: ChainConfig) -> Self {
        self.config = config;
        self
    }

    /// Scale a decimal string to smallest units, rounding half up.
    fn money_to_units(&self, price: &str) -> Result<U256, X402Error> {
        // Keep only digits and '.' so "$0.001", "1,000.50 USD" and "0.01" all parse
        let cleaned: String = price
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        if cleaned.is_empty() {
            return Err(X402Error::InvalidPayment(format!(
                "invalid price '{price}': no numeric content"
            )));
        }

        let (integer_part, fractional_part) = cleaned.split_once('.').unwrap_or((cleaned.as_str(), ""));
        if fractional_part.contains('.') {
            return Err(X402Error::InvalidPayment(format!(
                "invalid price '{price}': multiple decimal points"
            )));
        }

        let decimals = self.config.token_decimals as usize;
        let overflow = || X402Error::InvalidPayment(format!("invalid price '{price}': overflow"));
        let digits = |s: &str| -> Result<U256, X402Error> {
            if s.is_empty() {
                return Ok(U256::ZERO);
            }
            U256::from_str_radix(s, 10)
                .map_err(|e| X402Error::InvalidPayment(format!("invalid price '{price}': {e}")))
        };

        let (kept, dropped) = if fractional_part.len() > decimals {
            fractional_part.split_at(decimals)
        } else {
            (fractional_part, "")
        };
        let scale = U256::from(10u64).pow(U256::from(decimals - kept.len()));

        let whole = digits(integer_part)?
            .checked_mul(U256::from(10u64).pow(U256::from(decimals)))
            .ok_or_else(overflow)?;
        let fraction = digits(kept)?.checked_mul(scale).ok_or_else(overflow)?;
        let round_up = dropped.as_bytes().first().is_some_and(|d| *d >= b'5');

        whole
            .checked_add(fraction)
            .and_then(|v| v.checked_add(U256::from(u8::from(round_up))))
            .ok_or_else(overflow)
    }
}

impl SchemeServer for ExactTempoServer {
    fn parse_price(&self, price: &Price, _network: &str) -> Result<AssetAmount, X402Error> {
        let units = match price {
            Price::AssetAmount(pair) => return Ok(pair.clone()),
            Price::Money(text) => self.money_to_units(text)?,
            Price::Number(number) => self.money_to_units(&plain_decimal(number)?)?,
        };
        Ok(AssetAmount {
            amount: units.to_string(),
            asset: self.config.default_token,
        })
    }

    fn enhance_payment_requirements(
        &self,
        requirements: PaymentRequirements,
        supported_kind: &SupportedKind,
        _extensions: &[String],
    ) -> PaymentRequirements {
        let mut enhanced = requirements;
        TempoPaymentExtra::sponsor_defaults(self.fee_payer, self.config.default_token)
            .merge_into(&mut enhanced.extra);
        if let Some(overrides) = &supported_kind.extra {
            for (key, value) in overrides {
                enhanced.extra.insert(key.clone(), value.clone());
            }
        }
        enhanced
    }
}
