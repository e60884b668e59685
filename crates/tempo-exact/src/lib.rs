//! x402 "exact" payment scheme for the Tempo blockchain.
//!
//! A payer signs a Tempo transaction (type `0x76`) carrying a single TIP-20
//! `transfer` and asks for fee sponsorship. The facilitator decodes it without
//! trusting any claimed field, checks it against the merchant's requirements,
//! then co-signs as fee payer and submits it.
//!
//! # Three-party model
//!
//! - **Client** ([`ExactTempoClient`]): builds and signs the transfer transaction
//! - **Server** ([`ExactTempoServer`]): prices resources, advertises sponsorship hints
//! - **Facilitator** ([`ExactTempoFacilitator`]): verifies and settles as fee sponsor
//!
//! # Quick example (client)
//!
//! ```no_run
//! use alloy::signers::local::PrivateKeySigner;
//! use x402::{ExactTempoClient, PaymentRequirements, SchemeClient, X402_VERSION};
//!
//! # async fn run(requirements: PaymentRequirements) -> Result<(), x402::X402Error> {
//! let client = ExactTempoClient::with_private_key(PrivateKeySigner::random());
//! let payload = client.create_payment_payload(X402_VERSION, &requirements).await?;
//! println!("{}", serde_json::to_string(&payload)?);
//! # Ok(())
//! # }
//! ```

// Core types and traits
pub mod constants;
pub mod error;
pub mod extra;
pub mod payment;
pub mod response;
pub mod scheme;

// Tempo implementation
pub mod rpc;
pub mod scheme_client;
pub mod scheme_facilitator;
pub mod scheme_server;
pub mod sponsor;
pub mod tip20;
pub mod tokens;
pub mod transaction;

// Remote facilitator
pub mod facilitator_client;

use alloy::sol;

// TIP-20 (ERC-20 compatible) contract interface.
sol! {
    #[sol(rpc)]
    interface TIP20 {
        function balanceOf(address account) external view returns (uint256);
        function name() external view returns (string);
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
        function transfer(address to, uint256 amount) external returns (bool);
    }
}

// Re-exports
pub use constants::ChainConfig;
pub use constants::*;
pub use error::X402Error;
pub use extra::{FeeCaps, TempoPaymentExtra};
pub use payment::*;
pub use response::*;
pub use scheme::*;

pub use facilitator_client::FacilitatorClient;
pub use rpc::{ProviderRpc, TempoRpc};
pub use scheme_client::{ExactTempoClient, LocalTempoSigner, TempoSigner, TempoTransactionRequest};
pub use scheme_facilitator::{ExactTempoFacilitator, VerifyError};
pub use scheme_server::ExactTempoServer;
pub use tokens::{SupportedTokenInfo, TokenRegistry};
pub use transaction::{
    encode_transfer_call, parse_tempo_transaction, ParsedTransaction, SignedTempoTransaction,
    SponsoredTempoTransaction, TempoTransaction, TransactionParseError,
};
