use alloy::providers::RootProvider;
use x402::{ExactTempoFacilitator, ProviderRpc};

use crate::config::{Config, Environment};

/// Chain access used by the running service.
pub type FacilitatorRpc = ProviderRpc<RootProvider>;

/// Shared application state for the facilitator server.
pub struct AppState {
    pub facilitator: ExactTempoFacilitator<FacilitatorRpc>,
    pub environment: Environment,
}

impl AppState {
    /// Wire the facilitator to the configured chain. No network I/O happens
    /// until the first request.
    pub fn from_config(config: &Config) -> Self {
        let provider = RootProvider::new_http(config.rpc_url.clone());
        let facilitator = ExactTempoFacilitator::new(ProviderRpc::new(provider), config.signer.clone())
            .with_chain_config(config.chain_config())
            .with_supported_tokens(config.supported_tokens.iter().copied())
            .with_fee_token(config.fee_token)
            .with_receipt_timeout(config.receipt_timeout);

        Self {
            facilitator,
            environment: config.environment,
        }
    }
}
