use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine};
use tfstate_core::StoreError;

/// User name marking a static Vault token credential.
const TOKEN_USER: &str = "TOKEN";

/// How a tenant authenticates against Vault.
///
/// Decoded from the HTTP basic-auth payload `base64(user:secret)`:
/// `TOKEN:<vault token>` selects a static token, anything else is an AppRole
/// `role_id:secret_id` pair.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Token(String),
    AppRole { role_id: String, secret_id: String },
}

impl Credential {
    pub fn decode(encoded: &str) -> Result<Self, StoreError> {
        let decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|e| StoreError::InvalidCredential(format!("not base64: {}", e)))?;
        let decoded = String::from_utf8(decoded)
            .map_err(|_| StoreError::InvalidCredential("not UTF-8".to_string()))?;

        let (user, secret) = decoded
            .split_once(':')
            .ok_or_else(|| StoreError::InvalidCredential("expected user:secret".to_string()))?;
        if user.is_empty() || secret.is_empty() {
            return Err(StoreError::InvalidCredential(
                "empty user or secret".to_string(),
            ));
        }

        if user == TOKEN_USER {
            Ok(Credential::Token(secret.to_string()))
        } else {
            Ok(Credential::AppRole {
                role_id: user.to_string(),
                secret_id: secret.to_string(),
            })
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            Credential::Token(_) => "token",
            Credential::AppRole { .. } => "approle",
        }
    }
}

// Secrets stay out of logs and panics.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Token(_) => f.write_str("Token(***)"),
            Credential::AppRole { role_id, .. } => f
                .debug_struct("AppRole")
                .field("role_id", role_id)
                .field("secret_id", &"***")
                .finish(),
        }
    }
}
