use thiserror::Error;

/// Infrastructure faults raised by x402 operations.
///
/// Policy rejections (a payment that does not satisfy the requirements) are
/// never reported through this type; they are ordinary
/// [`VerifyResponse`](crate::VerifyResponse) / [`SettleResponse`](crate::SettleResponse)
/// values.
#[derive(Debug, Error)]
pub enum X402Error {
    #[error("signature error: {0}")]
    SignatureError(String),

    #[error("chain error: {0}")]
    ChainError(String),

    #[error("invalid payment: {0}")]
    InvalidPayment(String),

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("http error: {0}")]
    HttpError(String),

    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}
