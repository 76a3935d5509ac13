//! WMS session login

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use crate::config::LoginCredentials;
use crate::error::{snippet, AuthError};

/// Short-lived bearer token for one batch. Never cached, never logged.
#[derive(Clone)]
pub struct Credential {
    token: String,
    acquired_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            acquired_at: Utc::now(),
        }
    }

    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    /// Value for the `Authorization` header
    pub fn authorization(&self) -> String {
        format!("bearer {}", self.token)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("acquired_at", &self.acquired_at)
            .finish()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    user_name: &'a str,
    password: &'a str,
    system_id: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    #[serde(rename = "Token", default)]
    token: Option<String>,
}

pub struct SessionClient {
    client: Client,
    base_url: String,
}

impl SessionClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// `POST /Login` once. No retries: redelivery of the batch is the retry.
    #[instrument(skip_all, fields(username = %login.username, system_id = %login.system_id))]
    pub async fn authenticate(&self, login: &LoginCredentials) -> Result<Credential, AuthError> {
        let url = format!("{}/Login", self.base_url);
        let request = LoginRequest {
            user_name: &login.username,
            password: &login.password,
            system_id: &login.system_id,
        };

        let response = self.client.post(&url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), "Login failed: {}", snippet(&body));
            return Err(AuthError::Status {
                status: status.as_u16(),
                body: snippet(&body),
            });
        }

        let login_response: LoginResponse = response.json().await?;
        match login_response.token.filter(|t| !t.trim().is_empty()) {
            Some(token) => {
                debug!("Authenticated with WMS");
                Ok(Credential::new(token))
            }
            None => {
                error!("Login response carried no token");
                Err(AuthError::MissingToken)
            }
        }
    }
}
