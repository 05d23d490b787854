use reqwest::{Client, ClientBuilder, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::conf::ServerTarget;
use crate::error::CollectError;
use crate::session::Session;

/// Raw reply from the remote server; decoding is left to the caller.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: Vec<u8>) -> Self {
        Self { status, body }
    }
    pub fn get_status(&self) -> StatusCode {
        self.status
    }
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, CollectError> {
        serde_json::from_slice(&self.body).map_err(|e| {
            CollectError::Protocol(format!(
                "Failed to decode response body ({}): {e}",
                self.status
            ))
        })
    }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    target: ServerTarget,
    http_client: Client,
}

fn build_reqwest_client(target: &ServerTarget) -> Result<Client, CollectError> {
    let mut builder = ClientBuilder::new();
    if target.is_allow_self_signed() {
        warn!(
            "TLS certificate verification disabled for {} (allow_self_signed=true)",
            target.get_hostname()
        );
        builder = builder.danger_accept_invalid_certs(true);
    }
    builder
        .build()
        .map_err(|e| CollectError::Configuration(format!("Failed to build HTTP client: {e}")))
}

impl ApiClient {
    pub fn new(target: ServerTarget) -> Result<Self, CollectError> {
        let http_client = build_reqwest_client(&target)?;
        Ok(Self {
            target,
            http_client,
        })
    }

    pub fn get_target(&self) -> &ServerTarget {
        &self.target
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.target.base_url(), path)
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        session: Option<&Session>,
        body: Option<&Value>,
    ) -> Result<ApiResponse, CollectError> {
        let url = self.url(path);
        debug!("{} {}", method, url);

        let mut request = self.http_client.request(method.clone(), &url);
        if let Some(session) = session {
            request = request.bearer_auth(session.get_token());
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CollectError::Transport(format!("{method} {url}: {e}")))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| CollectError::Transport(format!("{method} {url}: {e}")))?;

        debug!("{} {} -> {} ({} bytes)", method, url, status, body.len());
        Ok(ApiResponse::new(status, body.to_vec()))
    }

    pub async fn get(&self, path: &str, session: &Session) -> Result<ApiResponse, CollectError> {
        self.request(Method::GET, path, Some(session), None).await
    }

    pub async fn post_json(
        &self,
        path: &str,
        session: Option<&Session>,
        body: &Value,
    ) -> Result<ApiResponse, CollectError> {
        self.request(Method::POST, path, session, Some(body)).await
    }
}
