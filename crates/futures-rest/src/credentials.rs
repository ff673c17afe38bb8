//! API key handling. The secret never appears in `Debug` output.

use crate::error::FuturesRestError;
use secrecy::{ExposeSecret, SecretString};

const API_KEY_VAR: &str = "BINANCE_API_KEY";
const SECRET_KEY_VAR: &str = "BINANCE_SECRET_KEY";

/// API credentials for signed requests.
#[derive(Clone)]
pub struct ApiCredentials {
    api_key: String,
    secret_key: SecretString,
}

impl ApiCredentials {
    /// Load `BINANCE_API_KEY` and `BINANCE_SECRET_KEY`, reading a `.env`
    /// file first if one exists.
    ///
    /// # Errors
    /// Returns `FuturesRestError::MissingCredentials` if either is unset or
    /// blank.
    pub fn from_env() -> Result<Self, FuturesRestError> {
        dotenvy::dotenv().ok();

        let read = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| FuturesRestError::MissingCredentials(name.to_string()))
        };

        Ok(Self::new(read(API_KEY_VAR)?, read(SECRET_KEY_VAR)?))
    }

    pub fn new(api_key: String, secret_key: String) -> Self {
        Self {
            api_key,
            secret_key: SecretString::from(secret_key),
        }
    }

    /// The public half, safe to send as a header.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Only for HMAC signing. Never log the return value.
    pub(crate) fn expose_secret(&self) -> &str {
        self.secret_key.expose_secret()
    }
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &self.api_key)
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_new() {
        let creds = ApiCredentials::new("my_api_key".into(), "my_secret".into());
        assert_eq!(creds.api_key(), "my_api_key");
        assert_eq!(creds.expose_secret(), "my_secret");
    }

    #[test]
    fn test_debug_redacts_secret() {
        let creds = ApiCredentials::new("my_api_key".into(), "super_secret_key".into());
        let debug_str = format!("{:?}", creds);

        assert!(debug_str.contains("my_api_key"));
        assert!(!debug_str.contains("super_secret_key"));
        assert!(debug_str.contains("[REDACTED]"));
    }
}
