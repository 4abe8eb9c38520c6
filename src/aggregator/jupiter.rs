//! Jupiter v6 HTTP client

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

use super::{
    Aggregator, AggregatorError, QuoteRequest, QuoteResponse, SwapInstructionsRequest,
    SwapInstructionsResponse,
};

/// Longest slice of an error body kept for logs
const MAX_ERROR_BODY_CHARS: usize = 256;

/// Client for the Jupiter swap API (`/quote`, `/swap-instructions`)
#[derive(Debug, Clone)]
pub struct JupiterClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl JupiterClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            timeout,
        }
    }

    fn with_auth(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("x-api-key", key),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        builder: RequestBuilder,
    ) -> Result<T, AggregatorError> {
        let response = self
            .with_auth(builder)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.transport_error(endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            let body: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(MAX_ERROR_BODY_CHARS)
                .collect();
            warn!(endpoint, status = status.as_u16(), body = %body, "Aggregator call failed");
            return Err(AggregatorError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(endpoint, e))?;
        serde_json::from_slice(&bytes).map_err(|e| AggregatorError::Decode(e.to_string()))
    }

    fn transport_error(&self, endpoint: &str, err: reqwest::Error) -> AggregatorError {
        if err.is_timeout() {
            AggregatorError::Timeout {
                endpoint: endpoint.to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            AggregatorError::Transport {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl Aggregator for JupiterClient {
    async fn quote(&self, request: &QuoteRequest) -> Result<QuoteResponse, AggregatorError> {
        let url = format!("{}/quote", self.base_url);
        debug!(
            input_mint = %request.input_mint,
            output_mint = %request.output_mint,
            amount = %request.amount,
            platform_fee_bps = request.platform_fee_bps,
            "Requesting quote"
        );

        let builder = self.http.get(&url).query(&[
            ("inputMint", request.input_mint.clone()),
            ("outputMint", request.output_mint.clone()),
            ("amount", request.amount.to_string()),
            ("slippageBps", request.slippage_bps.to_string()),
            ("platformFeeBps", request.platform_fee_bps.to_string()),
            ("swapMode", request.swap_mode.clone()),
            ("dynamicSlippage", request.dynamic_slippage.to_string()),
        ]);
        self.send("quote", builder).await
    }

    async fn swap_instructions(
        &self,
        request: &SwapInstructionsRequest,
    ) -> Result<SwapInstructionsResponse, AggregatorError> {
        let url = format!("{}/swap-instructions", self.base_url);
        debug!(user = %request.user_public_key, "Requesting swap instructions");
        let builder = self.http.post(&url).json(request);
        self.send("swap-instructions", builder).await
    }
}
