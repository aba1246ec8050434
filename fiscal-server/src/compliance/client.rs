//! 税务局客户端
//!
//! `POST {base_url}/registers/{kassen_id}/records`，
//! Basic auth (user_id:pin) + `X-Participant-Id` 头。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use shared::fiscal::TaxAuthorityCredentials;
use thiserror::Error;

/// 传输层失败（均归类为 Network）
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("Tax authority request timed out")]
    Timeout,

    #[error("Tax authority request failed: {0}")]
    Transport(String),
}

/// 一次申报请求；`body` 原文留档，凭据不在其中
#[derive(Debug, Clone)]
pub struct AuthorityRequest {
    pub kassen_id: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityResponse {
    pub status: u16,
    pub body: String,
}

#[async_trait]
pub trait TaxAuthorityClient: Send + Sync {
    async fn submit(
        &self,
        request: &AuthorityRequest,
        credentials: &TaxAuthorityCredentials,
    ) -> Result<AuthorityResponse, ClientError>;
}

/// reqwest 实现
pub struct HttpTaxAuthorityClient {
    client: Client,
    base_url: String,
}

impl HttpTaxAuthorityClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Transport(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn records_url(&self, kassen_id: &str) -> String {
        format!("{}/registers/{}/records", self.base_url, kassen_id)
    }
}

#[async_trait]
impl TaxAuthorityClient for HttpTaxAuthorityClient {
    async fn submit(
        &self,
        request: &AuthorityRequest,
        credentials: &TaxAuthorityCredentials,
    ) -> Result<AuthorityResponse, ClientError> {
        let url = self.records_url(&request.kassen_id);

        let response = self
            .client
            .post(&url)
            .basic_auth(&credentials.user_id, Some(&credentials.pin))
            .header("X-Participant-Id", &credentials.participant_id)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(request.body.clone())
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        // 响应原文留档；读不到正文按网络失败处理
        let body = response.text().await.map_err(transport_error)?;
        Ok(AuthorityResponse { status, body })
    }
}

fn transport_error(e: reqwest::Error) -> ClientError {
    if e.is_timeout() {
        ClientError::Timeout
    } else {
        ClientError::Transport(e.to_string())
    }
}
