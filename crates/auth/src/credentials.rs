//! API credential management.

use crate::error::AuthError;
use secrecy::{ExposeSecret, SecretString};

/// API credentials for signed futures requests.
#[derive(Clone)]
pub struct ApiCredentials {
    api_key: String,
    secret_key: SecretString,
}

impl ApiCredentials {
    /// Load credentials from the environment (and `.env` when present).
    ///
    /// `BINANCE_API_KEY` / `BINANCE_SECRET_KEY` are preferred; the shorter
    /// `API_KEY` / `API_SECRET` pair is accepted for older deployments.
    pub fn from_env() -> Result<Self, AuthError> {
        dotenvy::dotenv().ok();

        let api_key = first_var(&["BINANCE_API_KEY", "API_KEY"])?;
        let secret_key = first_var(&["BINANCE_SECRET_KEY", "API_SECRET"])?;

        Self::try_new(api_key, secret_key)
    }

    /// Create credentials, rejecting empty or whitespace-bearing keys.
    pub fn try_new(api_key: String, secret_key: String) -> Result<Self, AuthError> {
        if api_key.is_empty() || api_key.chars().any(char::is_whitespace) {
            return Err(AuthError::InvalidKeyFormat("API key"));
        }
        if secret_key.is_empty() || secret_key.chars().any(char::is_whitespace) {
            return Err(AuthError::InvalidKeyFormat("secret key"));
        }
        Ok(Self::new(api_key, secret_key))
    }

    /// Create credentials from explicit values without validation.
    pub fn new(api_key: String, secret_key: String) -> Self {
        Self {
            api_key,
            secret_key: SecretString::from(secret_key),
        }
    }

    /// The public API key, sent as `X-MBX-APIKEY`.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Expose the secret key for signing. Never log the return value.
    pub fn expose_secret(&self) -> &str {
        self.secret_key.expose_secret()
    }
}

fn first_var(names: &[&str]) -> Result<String, AuthError> {
    names
        .iter()
        .find_map(|name| std::env::var(name).ok())
        .ok_or_else(|| AuthError::MissingEnvVar(names.join(" or ")))
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
    fn test_try_new_rejects_blank_keys() {
        assert!(matches!(
            ApiCredentials::try_new(String::new(), "s".into()),
            Err(AuthError::InvalidKeyFormat("API key"))
        ));
        assert!(matches!(
            ApiCredentials::try_new("k".into(), "has space".into()),
            Err(AuthError::InvalidKeyFormat("secret key"))
        ));
        assert!(ApiCredentials::try_new("k".into(), "s".into()).is_ok());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let creds = ApiCredentials::new("my_api_key".into(), "super_secret_key".into());
        let debug_str = format!("{:?}", creds);

        assert!(debug_str.contains("my_api_key"));
        assert!(!debug_str.contains("super_secret_key"));
        assert!(debug_str.contains("[REDACTED]"));
    }

    #[test]
    fn test_missing_var_names_all_candidates() {
        let err = first_var(&["HEDGE_TEST_UNSET_A", "HEDGE_TEST_UNSET_B"]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing environment variable: HEDGE_TEST_UNSET_A or HEDGE_TEST_UNSET_B"
        );
    }
}
