use alloy::primitives::{address, Address};

/// Tempo testnet chain ID.
pub const TEMPO_TESTNET_CHAIN_ID: u64 = 42429;

/// Network identifier for the Tempo testnet.
pub const TEMPO_TESTNET_NETWORK: &str = "tempo:42429";

/// Tempo Moderato chain ID.
pub const TEMPO_MODERATO_CHAIN_ID: u64 = 42431;

/// Network identifier for Tempo Moderato.
pub const TEMPO_MODERATO_NETWORK: &str = "tempo:42431";

/// x402 scheme name: the payer pre-signs a transfer of an exact amount.
pub const SCHEME_NAME: &str = "exact";

/// Network family pattern advertised for signer discovery.
pub const CAIP_FAMILY: &str = "tempo:*";

/// x402 protocol version produced and accepted by this crate.
pub const X402_VERSION: u32 = 2;

/// EIP-2718 type byte of a Tempo transaction envelope.
pub const TEMPO_TX_TYPE_BYTE: u8 = 0x76;

/// Domain byte prefixed to the fee payer's signing payload.
pub const FEE_PAYER_DOMAIN_BYTE: u8 = 0x78;

/// `transfer(address,uint256)` selector.
pub const TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];

/// Selector plus two 32-byte ABI words.
pub const TRANSFER_CALLDATA_LEN: usize = 68;

/// pathUSD token address on Tempo.
pub const DEFAULT_PATHUSD: Address = address!("20c0000000000000000000000000000000000000");

/// pathUSD has 6 decimal places.
pub const TOKEN_DECIMALS: u32 = 6;

/// Default gas limit cap for a sponsored transfer.
pub const DEFAULT_GAS_LIMIT_CAP: u64 = 120_000;

/// Default cap on `max_fee_per_gas` (2 gwei).
pub const DEFAULT_MAX_FEE_PER_GAS_CAP: u128 = 2_000_000_000;

/// Default cap on `max_priority_fee_per_gas` (2 gwei).
pub const DEFAULT_MAX_PRIORITY_FEE_PER_GAS_CAP: u128 = 2_000_000_000;

/// Gas limit used when estimation fails.
pub const FALLBACK_GAS_LIMIT: u64 = 100_000;

/// Fee per gas used when fee estimation fails (1 gwei).
pub const FALLBACK_FEE_PER_GAS: u128 = 1_000_000_000;

/// Clock-skew allowance on top of `maxTimeoutSeconds` when bounding `validBefore`.
pub const VALIDITY_GRACE_SECONDS: u64 = 60;

/// Default RPC endpoint (Tempo Moderato).
pub const RPC_URL: &str = "https://rpc.moderato.tempo.xyz";

/// Block explorer base URL.
pub const EXPLORER_BASE: &str = "https://explore.moderato.tempo.xyz";

/// Runtime chain configuration. Decouples scheme implementations from
/// compile-time constants, enabling multi-chain support.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub network: String,
    pub scheme_name: String,
    pub default_token: Address,
    pub token_decimals: u32,
    pub rpc_url: String,
    pub explorer_base: String,
}

impl Default for ChainConfig {
    /// Defaults to the Tempo testnet configuration.
    fn default() -> Self {
        Self {
            chain_id: TEMPO_TESTNET_CHAIN_ID,
            network: TEMPO_TESTNET_NETWORK.to_string(),
            scheme_name: SCHEME_NAME.to_string(),
            default_token: DEFAULT_PATHUSD,
            token_decimals: TOKEN_DECIMALS,
            rpc_url: RPC_URL.to_string(),
            explorer_base: EXPLORER_BASE.to_string(),
        }
    }
}

impl ChainConfig {
    /// Tempo Moderato configuration.
    pub fn moderato() -> Self {
        Self {
            chain_id: TEMPO_MODERATO_CHAIN_ID,
            network: TEMPO_MODERATO_NETWORK.to_string(),
            ..Self::default()
        }
    }

    /// Configuration for an arbitrary Tempo chain id (`tempo:<id>`).
    pub fn for_chain(chain_id: u64, rpc_url: impl Into<String>) -> Self {
        Self {
            chain_id,
            network: format!("tempo:{chain_id}"),
            rpc_url: rpc_url.into(),
            ..Self::default()
        }
    }

    /// Explorer link for a transaction hash.
    pub fn explorer_tx_url(&self, hash: &str) -> String {
        format!("{}/tx/{hash}", self.explorer_base.trim_end_matches('/'))
    }
}

/// Extract the numeric chain id from a `family:chainId` network identifier.
pub fn chain_id_from_network(network: &str) -> Option<u64> {
    network.split_once(':')?.1.parse().ok()
}
