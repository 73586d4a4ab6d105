use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client as HttpClient, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tfstate_core::{SessionFactory, SharedStore, Store, StoreError};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::codec;
use crate::config::VaultConfig;
use crate::credential::Credential;
use crate::token::{Grant, TokenState};

const TOKEN_HEADER: &str = "X-Vault-Token";

#[derive(Serialize)]
struct LoginRequest<'a> {
    role_id: &'a str,
    secret_id: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    auth: Option<LoginAuth>,
}

#[derive(Deserialize)]
struct LoginAuth {
    client_token: String,
    #[serde(default)]
    lease_duration: u64,
    #[serde(default)]
    renewable: bool,
}

#[derive(Serialize)]
struct WriteRequest<'a> {
    data: SecretValue<'a>,
}

#[derive(Serialize)]
struct SecretValue<'a> {
    value: &'a str,
}

#[derive(Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    errors: Vec<String>,
}

/// Turn a non-success Vault response into a pass-through backend error.
async fn backend_error(response: Response) -> StoreError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();

    let message = match serde_json::from_str::<ErrorResponse>(&text) {
        Ok(body) if !body.errors.is_empty() => body.errors.join(", "),
        _ if !text.trim().is_empty() => text.trim().to_string(),
        _ => status.canonical_reason().unwrap_or("Vault error").to_string(),
    };

    StoreError::Backend {
        status: status.as_u16(),
        message,
    }
}

fn transport_error(action: &str, err: reqwest::Error) -> StoreError {
    StoreError::Internal(format!("Vault {} request failed: {}", action, err))
}

/// A tenant's authenticated connection to Vault's KV v2 engine.
///
/// Values are written through [`codec::encode`] as the `value` field of a
/// secret. The token is checked before every call and, for AppRole
/// credentials, replaced by a fresh login once it has expired.
pub struct VaultSession {
    http_client: HttpClient,
    config: Arc<VaultConfig>,
    credential: Credential,
    /// Held across a login so concurrent callers wait for one refresh.
    auth: Mutex<TokenState>,
}

impl VaultSession {
    /// Create a session and authenticate it.
    pub async fn connect(
        http_client: HttpClient,
        config: Arc<VaultConfig>,
        credential: Credential,
    ) -> Result<Self, StoreError> {
        let state = match &credential {
            Credential::Token(token) => TokenState::static_token(token.clone()),
            Credential::AppRole { .. } => TokenState::Unauthenticated,
        };

        let session = Self {
            http_client,
            config,
            credential,
            auth: Mutex::new(state),
        };
        session.token().await?;

        Ok(session)
    }

    /// Get a usable token, logging in again if the current one has expired.
    async fn token(&self) -> Result<String, StoreError> {
        let mut state = self.auth.lock().await;
        state.observe(Utc::now());
        if let Some(token) = state.token() {
            return Ok(token.to_string());
        }

        let Credential::AppRole { role_id, secret_id } = &self.credential else {
            return Err(StoreError::Internal(
                "static token session has no token".to_string(),
            ));
        };

        debug!(role_id = %role_id, "Refreshing Vault token");
        let grant = self.login(role_id, secret_id).await?;
        let token = grant.token.clone();
        *state = TokenState::from_grant(grant, Utc::now());

        Ok(token)
    }

    /// Exchange an AppRole role/secret pair for a token.
    #[instrument(skip(self, secret_id), level = "debug")]
    async fn login(&self, role_id: &str, secret_id: &str) -> Result<Grant, StoreError> {
        let response = self
            .http_client
            .post(self.config.login_url())
            .json(&LoginRequest { role_id, secret_id })
            .send()
            .await
            .map_err(|e| transport_error("login", e))?;

        if !response.status().is_success() {
            return Err(backend_error(response).await);
        }

        let auth = response
            .json::<LoginResponse>()
            .await
            .map_err(|e| StoreError::Internal(format!("Invalid Vault login response: {}", e)))?
            .auth
            .ok_or_else(|| StoreError::Internal("Vault login returned no token".to_string()))?;

        info!(
            lease_duration = auth.lease_duration,
            renewable = auth.renewable,
            "Authenticated with AppRole"
        );
        Ok(Grant {
            token: auth.client_token,
            lease_duration: auth.lease_duration,
            renewable: auth.renewable,
        })
    }

    /// Send `request` with the session token.
    async fn send(&self, request: RequestBuilder, action: &str) -> Result<Response, StoreError> {
        let token = self.token().await?;

        request
            .header(TOKEN_HEADER, token)
            .send()
            .await
            .map_err(|e| transport_error(action, e))
    }

    /// Write a string secret.
    async fn set(&self, name: &str, value: &str) -> Result<(), StoreError> {
        let request = self
            .http_client
            .post(self.config.data_url(name))
            .json(&WriteRequest {
                data: SecretValue { value },
            });

        let response = self.send(request, "write").await?;
        if !response.status().is_success() {
            return Err(backend_error(response).await);
        }

        debug!("Vault WRITE {} ({} bytes)", name, value.len());
        Ok(())
    }

    /// Read a string secret.
    async fn get(&self, name: &str) -> Result<String, StoreError> {
        let request = self.http_client.get(self.config.data_url(name));

        let response = self.send(request, "read").await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!("Vault secret not found: {}", name);
            return Err(StoreError::NotFound(name.to_string()));
        }
        if !status.is_success() {
            return Err(backend_error(response).await);
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| StoreError::Codec(format!("Invalid Vault read response: {}", e)))?;

        // Latest version deleted without destroying its metadata
        if body.pointer("/data/data").is_none_or(Value::is_null) {
            return Err(StoreError::NotFound(name.to_string()));
        }

        let value = body
            .pointer("/data/data/value")
            .and_then(Value::as_str)
            .ok_or_else(|| StoreError::Codec("unable to convert secret data".to_string()))?;

        debug!("Vault READ {} ({} bytes)", name, value.len());
        Ok(value.to_string())
    }
}

#[async_trait]
impl Store for VaultSession {
    fn backend_name(&self) -> &'static str {
        "vault"
    }

    #[instrument(skip(self, data), level = "debug", fields(data_len = data.len()))]
    async fn set_bin(&self, name: &str, data: &[u8]) -> Result<(), StoreError> {
        let value = codec::encode(data)?;
        self.set(name, &value).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_bin(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        let value = self.get(name).await?;
        Ok(codec::decode(&value)?)
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        let request = self.http_client.delete(self.config.metadata_url(name));

        let response = self.send(request, "delete").await?;
        if !response.status().is_success() {
            return Err(backend_error(response).await);
        }

        debug!("Vault DELETE {}", name);
        Ok(())
    }
}

/// Builds [`VaultSession`]s from tenant credentials.
pub struct VaultSessionFactory {
    http_client: HttpClient,
    config: Arc<VaultConfig>,
}

impl VaultSessionFactory {
    pub fn new(config: VaultConfig) -> Self {
        Self {
            http_client: HttpClient::new(),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }
}

#[async_trait]
impl SessionFactory for VaultSessionFactory {
    async fn create(&self, credential: &str) -> Result<SharedStore, StoreError> {
        let credential = Credential::decode(credential)?;
        debug!(method = credential.method(), "Creating a new Vault client");

        let session =
            VaultSession::connect(self.http_client.clone(), self.config.clone(), credential)
                .await?;
        Ok(Arc::new(session))
    }
}
