mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use alloy::primitives::{Address, U256};

use common::*;
use x402::{TokenRegistry, X402Error, DEFAULT_PATHUSD};

#[tokio::test]
async fn test_metadata_fetched_once_then_cached() {
    let rpc = Arc::new(MockRpc::default().with_metadata(OTHER_TOKEN, "AlphaUSD", 6));
    let registry = TokenRegistry::new(Arc::clone(&rpc), [OTHER_TOKEN]);

    let first = registry.get_token_info(OTHER_TOKEN).await.unwrap();
    let second = registry.get_token_info(OTHER_TOKEN).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.symbol, "AlphaUSD");
    assert_eq!(first.name, "AlphaUSD Token");
    assert_eq!(first.decimals, 6);
    assert_eq!(rpc.metadata_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_known_token_skips_rpc() {
    let rpc = Arc::new(MockRpc::default());
    let registry = TokenRegistry::new(Arc::clone(&rpc), [DEFAULT_PATHUSD]);

    let info = registry.get_token_info(DEFAULT_PATHUSD).await.unwrap();
    assert_eq!(info.symbol, "pathUSD");
    assert_eq!(info.decimals, 6);
    assert_eq!(rpc.metadata_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_metadata_failure_yields_none_and_is_not_cached() {
    let rpc = Arc::new(MockRpc::default());
    let registry = TokenRegistry::new(Arc::clone(&rpc), [OTHER_TOKEN]);

    assert!(registry.get_token_info(OTHER_TOKEN).await.is_none());
    assert!(registry.get_token_info(OTHER_TOKEN).await.is_none());
    assert_eq!(rpc.metadata_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unsupported_token_has_no_info() {
    let rpc = Arc::new(MockRpc::default().with_metadata(OTHER_TOKEN, "AlphaUSD", 6));
    let registry = TokenRegistry::new(Arc::clone(&rpc), [DEFAULT_PATHUSD]);

    assert!(!registry.is_supported(OTHER_TOKEN));
    assert!(registry.get_token_info(OTHER_TOKEN).await.is_none());
    assert_eq!(rpc.metadata_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_all_supported_tokens_sorted_and_skips_failures() {
    let broken = Address::repeat_byte(0x01);
    let rpc = Arc::new(MockRpc::default().with_metadata(OTHER_TOKEN, "AlphaUSD", 6));
    let registry = TokenRegistry::new(rpc, [OTHER_TOKEN, broken, DEFAULT_PATHUSD]);

    assert_eq!(
        registry.supported_tokens(),
        vec![broken, DEFAULT_PATHUSD, OTHER_TOKEN]
    );
    let infos = registry.get_all_supported_tokens().await;
    let symbols: Vec<_> = infos.iter().map(|i| i.symbol.as_str()).collect();
    assert_eq!(symbols, ["pathUSD", "AlphaUSD"]);
}

#[tokio::test]
async fn test_balance_is_live_and_errors_propagate() {
    let owner = Address::repeat_byte(0x44);
    let rpc = Arc::new(MockRpc::default().with_balance(DEFAULT_PATHUSD, owner, 1234));
    let registry = TokenRegistry::new(rpc, [DEFAULT_PATHUSD]);
    assert_eq!(
        registry.get_balance(DEFAULT_PATHUSD, owner).await.unwrap(),
        U256::from(1234u64)
    );

    let failing = TokenRegistry::new(
        Arc::new(MockRpc::default().with_balance_error("rate limited")),
        [DEFAULT_PATHUSD],
    );
    assert!(matches!(
        failing.get_balance(DEFAULT_PATHUSD, owner).await,
        Err(X402Error::ChainError(_))
    ));
}
