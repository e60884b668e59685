//! HTTP client for calling a remote facilitator's `/verify`, `/settle` and
//! `/supported` endpoints.
//!
//! Used by a resource server when the facilitator runs as a separate process.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::payment::{PaymentPayload, PaymentRequirements};
use crate::response::{SettleResponse, SupportedResponse, VerifyResponse};
use crate::X402Error;

/// Request body shared by `/verify` and `/settle`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct FacilitatorRequest<'a> {
    payment_payload: &'a PaymentPayload,
    payment_requirements: &'a PaymentRequirements,
}

#[derive(Debug, Clone)]
pub struct FacilitatorClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl FacilitatorClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Per-request timeout; settlement waits on confirmation, so keep this
    /// above the facilitator's receipt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<VerifyResponse, X402Error> {
        self.post("verify", payload, requirements).await
    }

    pub async fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<SettleResponse, X402Error> {
        self.post("settle", payload, requirements).await
    }

    pub async fn supported(&self) -> Result<SupportedResponse, X402Error> {
        let url = format!("{}/supported", self.base_url);
        let resp = self
            .http
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| X402Error::HttpError(format!("facilitator request failed: {e}")))?;
        Self::decode(resp).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<T, X402Error> {
        let url = format!("{}/{path}", self.base_url);
        let body = FacilitatorRequest {
            payment_payload: payload,
            payment_requirements: requirements,
        };
        let resp = self
            .http
            .post(&url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| X402Error::HttpError(format!("facilitator request failed: {e}")))?;
        Self::decode(resp).await
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, X402Error> {
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(X402Error::HttpError(format!(
                "facilitator returned {status}: {text}"
            )));
        }
        resp.json::<T>()
            .await
            .map_err(|e| X402Error::HttpError(format!("facilitator response parse failed: {e}")))
    }
}
