mod common;

use std::time::Duration;

use alloy::signers::local::PrivateKeySigner;

use common::*;
use x402::rpc::ReceiptStatus;
use x402::transaction::FeePayerSlot;
use x402::{
    ExactTempoFacilitator, SchemeFacilitator, SettleErrorKind, SignedTempoTransaction, X402Error,
    DEFAULT_PATHUSD, TEMPO_TESTNET_NETWORK,
};

fn funded(payer: &PrivateKeySigner) -> MockRpc {
    MockRpc::default().with_balance(DEFAULT_PATHUSD, payer.address(), 10_000)
}

fn facilitator(rpc: MockRpc) -> ExactTempoFacilitator<MockRpc> {
    ExactTempoFacilitator::new(rpc, PrivateKeySigner::random())
        .with_receipt_timeout(Duration::from_millis(100))
        .with_poll_interval(Duration::from_millis(10))
}

#[tokio::test]
async fn test_settle_submits_sponsored_transaction() {
    let payer = PrivateKeySigner::random();
    let facilitator = facilitator(funded(&payer));
    let req = requirements("1000");
    let serialized = sign(transfer_tx(1000), &payer);

    let response = facilitator
        .settle(&payload(serialized.clone(), &req), &req)
        .await
        .unwrap();
    assert!(response.success, "settlement failed: {response:?}");
    assert_eq!(response.transaction, format!("{:#x}", facilitator.rpc().tx_hash()));
    assert_eq!(response.network, TEMPO_TESTNET_NETWORK);
    assert_eq!(response.payer, Some(payer.address()));
    assert_eq!(response.error_reason, None);

    let submitted = facilitator.rpc().submitted.lock().unwrap().clone();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0][0], 0x76);

    // Fee token attached, sponsor signature added, sender's signed fields intact
    let sponsored = SignedTempoTransaction::decode(&submitted[0]).unwrap();
    let original = SignedTempoTransaction::decode_hex(&serialized).unwrap();
    assert_eq!(sponsored.transaction().fee_token, Some(DEFAULT_PATHUSD));
    assert!(matches!(sponsored.transaction().fee_payer, FeePayerSlot::Signed(_)));
    assert_eq!(sponsored.signature(), original.signature());
    assert_eq!(sponsored.sender_signing_hash(), original.sender_signing_hash());
    assert_eq!(sponsored.recover_sender(), Some(payer.address()));
}

#[tokio::test]
async fn test_settle_reverifies_before_submitting() {
    let payer = PrivateKeySigner::random();
    let facilitator = facilitator(funded(&payer));
    let req = requirements("1000");

    let response = facilitator
        .settle(&payload(sign(transfer_tx(500), &payer), &req), &req)
        .await
        .unwrap();
    assert!(!response.success);
    assert_eq!(response.error_kind, Some(SettleErrorKind::Verification));
    assert_eq!(response.error_reason.as_deref(), Some("Amount 500 < required 1000"));
    assert_eq!(response.transaction, "");
    assert_eq!(response.network, TEMPO_TESTNET_NETWORK);
    assert_eq!(facilitator.rpc().submissions(), 0);
}

#[tokio::test]
async fn test_settle_balance_drop_after_verify() {
    let payer = PrivateKeySigner::random();
    let facilitator = facilitator(MockRpc::default().with_balance(DEFAULT_PATHUSD, payer.address(), 10));
    let req = requirements("1000");

    let response = facilitator
        .settle(&payload(sign(transfer_tx(1000), &payer), &req), &req)
        .await
        .unwrap();
    assert!(!response.success);
    assert_eq!(response.error_kind, Some(SettleErrorKind::Verification));
    assert_eq!(facilitator.rpc().submissions(), 0);
}

#[tokio::test]
async fn test_settle_reverted_keeps_hash() {
    let payer = PrivateKeySigner::random();
    let facilitator = facilitator(funded(&payer).with_receipt(Some(ReceiptStatus::Reverted)));
    let req = requirements("1000");

    let response = facilitator
        .settle(&payload(sign(transfer_tx(1000), &payer), &req), &req)
        .await
        .unwrap();
    let hash = format!("{:#x}", facilitator.rpc().tx_hash());
    assert!(!response.success);
    assert_eq!(response.error_kind, Some(SettleErrorKind::Reverted));
    assert_eq!(response.transaction, hash);
    assert_eq!(
        response.error_reason,
        Some(format!("Transaction {hash} reverted"))
    );
    assert_eq!(response.payer, Some(payer.address()));
}

#[tokio::test]
async fn test_settle_confirmation_timeout_reports_success() {
    let payer = PrivateKeySigner::random();
    let facilitator = facilitator(funded(&payer).with_receipt(None));
    let req = requirements("1000");

    let response = facilitator
        .settle(&payload(sign(transfer_tx(1000), &payer), &req), &req)
        .await
        .unwrap();
    assert!(response.success);
    assert_eq!(response.transaction, format!("{:#x}", facilitator.rpc().tx_hash()));
    assert_eq!(facilitator.rpc().submissions(), 1);
}

#[tokio::test]
async fn test_settle_classifies_submission_errors() {
    let cases = [
        ("nonce too low", SettleErrorKind::NonceError, "Nonce error: nonce too low"),
        (
            "insufficient funds for gas",
            SettleErrorKind::InsufficientBalance,
            "Insufficient balance: insufficient funds for gas",
        ),
        (
            "Invalid Signature",
            SettleErrorKind::SignatureError,
            "Signature error: Invalid Signature",
        ),
        (
            "connection reset",
            SettleErrorKind::SubmissionError,
            "Failed to submit transaction: connection reset",
        ),
    ];

    for (message, kind, reason) in cases {
        let payer = PrivateKeySigner::random();
        let facilitator = facilitator(funded(&payer).with_submit_error(message));
        let req = requirements("1000");

        let response = facilitator
            .settle(&payload(sign(transfer_tx(1000), &payer), &req), &req)
            .await
            .unwrap();
        assert!(!response.success);
        assert_eq!(response.error_kind, Some(kind), "for {message}");
        assert_eq!(response.error_reason.as_deref(), Some(reason));
        assert_eq!(response.transaction, "");
        assert_eq!(response.payer, Some(payer.address()));
    }
}

#[tokio::test]
async fn test_settle_balance_read_failure_is_an_error() {
    let payer = PrivateKeySigner::random();
    let facilitator = facilitator(MockRpc::default().with_balance_error("timeout"));
    let req = requirements("1000");

    let result = facilitator
        .settle(&payload(sign(transfer_tx(1000), &payer), &req), &req)
        .await;
    assert!(matches!(result, Err(X402Error::ChainError(_))));
    assert_eq!(facilitator.rpc().submissions(), 0);
}
