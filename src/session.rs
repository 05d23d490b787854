use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::api_client::ApiClient;
use crate::error::CollectError;

pub const LOGIN_PATH: &str = "/api/v1/auth/login";

/// Bearer credential for one collection run. Never persisted.
#[derive(Clone)]
pub struct Session {
    token: String,
}

impl Session {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
    pub fn get_token(&self) -> &str {
        &self.token
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("token", &"***").finish()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LoginResponse {
    #[serde(default)]
    access_token: Option<String>,
}

pub async fn authenticate(client: &ApiClient, password: &str) -> Result<Session, CollectError> {
    let body = json!({ "Password": password, "RememberMe": true });
    let response = client.post_json(LOGIN_PATH, None, &body).await?;
    if !response.is_success() {
        return Err(CollectError::Auth(format!(
            "login rejected by {} with status {}",
            client.get_target().get_hostname(),
            response.get_status()
        )));
    }

    let login = response
        .json::<LoginResponse>()
        .map_err(|e| CollectError::Auth(format!("unreadable login response: {e}")))?;
    match login.access_token {
        Some(token) if !token.is_empty() => {
            info!("Authenticated against {}", client.get_target().get_hostname());
            Ok(Session::new(token))
        }
        _ => Err(CollectError::Auth(
            "login response did not contain an access token".to_string(),
        )),
    }
}
