//! Ingestion API HTTP client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tank_core::{MeasurementRecord, TransferRecord, UploadClient, UploadOutcome, UploadPackage};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::ApiConfig;
use crate::error::{ClientError, Result};
use crate::types::*;

/// Default request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default connection timeout
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const INDICATORS_PATH: &str = "api/Tank/SendTankIndicators";
const TRANSFERS_PATH: &str = "api/Tank/SendTankTransfers";

/// Ingestion API client
///
/// Endpoints resolve relative to the base URL, so a path prefix such as
/// `https://host/ingest/` is kept. A missing trailing slash is added.
#[derive(Debug, Clone)]
pub struct IngestClient {
    client: Client,
    base_url: Url,
}

impl IngestClient {
    /// Create a client without authentication
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the ingestion API (e.g., "http://localhost:8080")
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_config(base_url, None, DEFAULT_TIMEOUT, DEFAULT_CONNECT_TIMEOUT)
    }

    /// Create a client that sends a bearer token with every request
    pub fn with_bearer_token(base_url: &str, token: &str) -> Result<Self> {
        Self::with_config(
            base_url,
            Some(token),
            DEFAULT_TIMEOUT,
            DEFAULT_CONNECT_TIMEOUT,
        )
    }

    /// Create a client from the `[api]` section of the agent configuration
    pub fn from_config(config: &ApiConfig) -> Result<Self> {
        Self::with_config(
            &config.base_url,
            config.token.as_deref(),
            config.timeout(),
            config.connect_timeout(),
        )
    }

    /// Create a client with custom timeouts and an optional bearer token
    pub fn with_config(
        base_url: &str,
        token: Option<&str>,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            let header_value =
                reqwest::header::HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| ClientError::InvalidToken(e.to_string()))?;
            headers.insert(reqwest::header::AUTHORIZATION, header_value);
        }

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .default_headers(headers)
            .build()?;

        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self { client, base_url })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Upload a package of inventory readings
    #[instrument(skip(self, package), fields(package_id = %package.package_id, records = package.len()))]
    pub async fn send_tank_indicators(
        &self,
        package: &UploadPackage<MeasurementRecord>,
    ) -> Result<ApiResult> {
        let body = SendTankIndicatorsRequest::from_package(package, local_now());
        self.post(INDICATORS_PATH, &body).await
    }

    /// Upload a package of delivery events
    #[instrument(skip(self, package), fields(package_id = %package.package_id, records = package.len()))]
    pub async fn send_tank_transfers(
        &self,
        package: &UploadPackage<TransferRecord>,
    ) -> Result<ApiResult> {
        let body = SendTankTransfersRequest::from_package(package, local_now());
        self.post(TRANSFERS_PATH, &body).await
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<ApiResult> {
        let url = self.endpoint(path)?;
        debug!("Posting package to {}", url);

        let response = self.client.post(url).json(body).send().await?;
        self.handle_response(response).await
    }

    /// Handle response and parse JSON
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();

        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| ClientError::ParseError(e.to_string()))
        } else {
            Err(self.extract_error_from_status(response, status).await)
        }
    }

    async fn extract_error_from_status(
        &self,
        response: reqwest::Response,
        status: StatusCode,
    ) -> ClientError {
        let message = match response.json::<ErrorResponse>().await {
            Ok(err) => err.error,
            Err(_) => format!("HTTP {}", status),
        };

        match status {
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ClientError::Timeout,
            _ => ClientError::server_error(status.as_u16(), message),
        }
    }
}

fn into_outcome(result: Result<ApiResult>) -> UploadOutcome {
    match result {
        Ok(result) => result.into(),
        Err(e) => {
            warn!(error = %e, "Upload request failed");
            UploadOutcome::rejected(e.to_string())
        }
    }
}

#[async_trait]
impl UploadClient for IngestClient {
    async fn submit_measurements(
        &self,
        package: &UploadPackage<MeasurementRecord>,
    ) -> UploadOutcome {
        into_outcome(self.send_tank_indicators(package).await)
    }

    async fn submit_transfers(&self, package: &UploadPackage<TransferRecord>) -> UploadOutcome {
        into_outcome(self.send_tank_transfers(package).await)
    }
}
