//! Environment configuration for the facilitator service.
//!
//! Every variable has a default except `FACILITATOR_PRIVATE_KEY`. Empty values
//! count as unset.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use thiserror::Error;
use url::Url;
use x402::{ChainConfig, DEFAULT_PATHUSD, RPC_URL, TEMPO_MODERATO_CHAIN_ID};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("invalid {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

fn invalid(var: &'static str, reason: impl fmt::Display) -> ConfigError {
    ConfigError::Invalid {
        var,
        reason: reason.to_string(),
    }
}

/// Deployment environment. Controls log formatting and how much of an
/// internal error reaches HTTP clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn is_development(self) -> bool {
        self == Self::Development
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "development" => Ok(Self::Development),
            "staging" => Ok(Self::Staging),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "'{other}' is not one of development, staging, production"
            )),
        }
    }
}

const LOG_LEVELS: [&str; 4] = ["debug", "info", "warn", "error"];

pub struct Config {
    pub host: String,
    pub port: u16,
    pub environment: Environment,
    pub rpc_url: Url,
    pub chain_id: u64,
    pub network: String,
    pub signer: PrivateKeySigner,
    pub supported_tokens: Vec<Address>,
    pub fee_token: Address,
    /// `["*"]` allows any origin.
    pub cors_allowed_origins: Vec<String>,
    pub log_level: String,
    pub receipt_timeout: Duration,
    pub rate_limit_rpm: u64,
}

// The signing key stays out of debug output.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("environment", &self.environment)
            .field("rpc_url", &self.rpc_url.as_str())
            .field("chain_id", &self.chain_id)
            .field("network", &self.network)
            .field("sponsor", &self.signer.address())
            .field("supported_tokens", &self.supported_tokens)
            .field("fee_token", &self.fee_token)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .field("log_level", &self.log_level)
            .field("receipt_timeout", &self.receipt_timeout)
            .field("rate_limit_rpm", &self.rate_limit_rpm)
            .finish()
    }
}

impl Config {
    /// Read the process environment. Call `dotenvy::dotenv()` first to pick
    /// up a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match get("PORT") {
            Some(v) => v.parse().map_err(|e| invalid("PORT", e))?,
            None => 3402,
        };
        let host = get("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let environment = match get("ENVIRONMENT") {
            Some(v) => v.parse().map_err(|e: String| invalid("ENVIRONMENT", e))?,
            None => Environment::Development,
        };

        let rpc_url = get("TEMPO_RPC_URL").unwrap_or_else(|| RPC_URL.to_string());
        let rpc_url = Url::parse(&rpc_url).map_err(|e| invalid("TEMPO_RPC_URL", e))?;

        let chain_id = match get("TEMPO_CHAIN_ID") {
            Some(v) => v.parse().map_err(|e| invalid("TEMPO_CHAIN_ID", e))?,
            None => TEMPO_MODERATO_CHAIN_ID,
        };
        let network = get("TEMPO_NETWORK_ID").unwrap_or_else(|| format!("tempo:{chain_id}"));

        let signer = parse_private_key(
            &get("FACILITATOR_PRIVATE_KEY").ok_or(ConfigError::Missing("FACILITATOR_PRIVATE_KEY"))?,
        )?;

        let supported_tokens = match get("SUPPORTED_TOKENS") {
            Some(v) => parse_addresses("SUPPORTED_TOKENS", &v)?,
            None => vec![DEFAULT_PATHUSD],
        };
        let fee_token = match get("FEE_TOKEN") {
            Some(v) => v.parse().map_err(|e| invalid("FEE_TOKEN", e))?,
            None => DEFAULT_PATHUSD,
        };

        let cors_allowed_origins = get("CORS_ALLOWED_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| vec!["*".to_string()]);

        let log_level = get("LOG_LEVEL")
            .map(|v| v.to_ascii_lowercase())
            .unwrap_or_else(|| "info".to_string());
        if !LOG_LEVELS.contains(&log_level.as_str()) {
            return Err(invalid(
                "LOG_LEVEL",
                format!("'{log_level}' is not one of {}", LOG_LEVELS.join(", ")),
            ));
        }

        let receipt_timeout = match get("RECEIPT_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(v.parse().map_err(|e| invalid("RECEIPT_TIMEOUT_SECS", e))?),
            None => x402::scheme_facilitator::DEFAULT_RECEIPT_TIMEOUT,
        };
        let rate_limit_rpm = match get("RATE_LIMIT_RPM") {
            Some(v) => v.parse().map_err(|e| invalid("RATE_LIMIT_RPM", e))?,
            None => 120,
        };
        if rate_limit_rpm == 0 {
            return Err(invalid("RATE_LIMIT_RPM", "must be greater than zero"));
        }

        Ok(Self {
            host,
            port,
            environment,
            rpc_url,
            chain_id,
            network,
            signer,
            supported_tokens,
            fee_token,
            cors_allowed_origins,
            log_level,
            receipt_timeout,
            rate_limit_rpm,
        })
    }

    pub fn chain_config(&self) -> ChainConfig {
        ChainConfig {
            network: self.network.clone(),
            ..ChainConfig::for_chain(self.chain_id, self.rpc_url.as_str())
        }
    }
}

/// `0x` followed by exactly 64 hex characters.
fn parse_private_key(raw: &str) -> Result<PrivateKeySigner, ConfigError> {
    const VAR: &str = "FACILITATOR_PRIVATE_KEY";
    let hex = raw
        .strip_prefix("0x")
        .ok_or_else(|| invalid(VAR, "must start with 0x"))?;
    if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid(VAR, "must be 64 hex characters after 0x"));
    }
    // The parse error text never includes key material
    raw.parse().map_err(|_| invalid(VAR, "not a valid secp256k1 key"))
}

fn parse_addresses(var: &'static str, raw: &str) -> Result<Vec<Address>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().map_err(|e| invalid(var, format!("'{s}': {e}"))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("FACILITATOR_PRIVATE_KEY", KEY)]).unwrap();
        assert_eq!(config.port, 3402);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.rpc_url.as_str(), "https://rpc.moderato.tempo.xyz/");
        assert_eq!(config.chain_id, 42431);
        assert_eq!(config.network, "tempo:42431");
        assert_eq!(config.supported_tokens, vec![DEFAULT_PATHUSD]);
        assert_eq!(config.fee_token, DEFAULT_PATHUSD);
        assert_eq!(config.cors_allowed_origins, vec!["*"]);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.receipt_timeout, Duration::from_secs(30));
        assert_eq!(config.rate_limit_rpm, 120);
    }

    #[test]
    fn test_private_key_required() {
        assert_eq!(
            load(&[]).unwrap_err(),
            ConfigError::Missing("FACILITATOR_PRIVATE_KEY")
        );
        assert_eq!(
            load(&[("FACILITATOR_PRIVATE_KEY", "")]).unwrap_err(),
            ConfigError::Missing("FACILITATOR_PRIVATE_KEY")
        );
    }

    #[test]
    fn test_private_key_shape() {
        for bad in [&KEY[2..], "0x1234", "0xzz6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d"] {
            let err = load(&[("FACILITATOR_PRIVATE_KEY", bad)]).unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid { var: "FACILITATOR_PRIVATE_KEY", .. }),
                "accepted {bad}"
            );
            assert!(!err.to_string().contains(bad));
        }
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("FACILITATOR_PRIVATE_KEY", KEY),
            ("PORT", "8080"),
            ("ENVIRONMENT", "production"),
            ("TEMPO_CHAIN_ID", "42429"),
            ("SUPPORTED_TOKENS", "0x20c0000000000000000000000000000000000000, 0x20c0000000000000000000000000000000000001"),
            ("CORS_ALLOWED_ORIGINS", "https://a.example, https://b.example"),
            ("LOG_LEVEL", "DEBUG"),
            ("RECEIPT_TIMEOUT_SECS", "5"),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert!(!config.environment.is_development());
        assert_eq!(config.network, "tempo:42429");
        assert_eq!(config.supported_tokens.len(), 2);
        assert_eq!(
            config.cors_allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.receipt_timeout, Duration::from_secs(5));

        let chain = config.chain_config();
        assert_eq!(chain.chain_id, 42429);
        assert_eq!(chain.network, "tempo:42429");
    }

    #[test]
    fn test_invalid_values_name_the_variable() {
        let cases = [
            ("PORT", "http"),
            ("ENVIRONMENT", "prod"),
            ("TEMPO_RPC_URL", "not a url"),
            ("TEMPO_CHAIN_ID", "-1"),
            ("SUPPORTED_TOKENS", "0x20c0,pathUSD"),
            ("FEE_TOKEN", "pathUSD"),
            ("LOG_LEVEL", "trace"),
            ("RATE_LIMIT_RPM", "0"),
        ];
        for (var, value) in cases {
            let err = load(&[("FACILITATOR_PRIVATE_KEY", KEY), (var, value)]).unwrap_err();
            match err {
                ConfigError::Invalid { var: got, .. } => assert_eq!(got, var),
                other => panic!("unexpected error for {var}: {other}"),
            }
        }
    }

    #[test]
    fn test_debug_omits_key() {
        let config = load(&[("FACILITATOR_PRIVATE_KEY", KEY)]).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains(&KEY[2..]));
        assert!(debug.contains("sponsor"));
    }
}
