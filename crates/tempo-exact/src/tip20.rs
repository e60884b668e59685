use alloy::primitives::{Address, U256};
use alloy::providers::Provider;

use crate::rpc::TokenMetadata;
use crate::{X402Error, TIP20};

/// Query the TIP-20 balance of `owner`.
pub async fn balance_of<P: Provider>(
    provider: &P,
    token: Address,
    owner: Address,
) -> Result<U256, X402Error> {
    let contract = TIP20::new(token, provider);
    let balance = contract
        .balanceOf(owner)
        .call()
        .await
        .map_err(|e| X402Error::ChainError(format!("balanceOf failed: {e}")))?;
    Ok(balance)
}

/// Read `name`, `symbol` and `decimals` concurrently.
pub async fn token_metadata<P: Provider>(
    provider: &P,
    token: Address,
) -> Result<TokenMetadata, X402Error> {
    let contract = TIP20::new(token, provider);
    let (name, symbol, decimals) = tokio::try_join!(
        async { contract.name().call().await },
        async { contract.symbol().call().await },
        async { contract.decimals().call().await },
    )
    .map_err(|e| X402Error::ChainError(format!("token metadata read failed: {e}")))?;

    Ok(TokenMetadata {
        name,
        symbol,
        decimals,
    })
}
