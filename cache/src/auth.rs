use async_trait::async_trait;

use crate::error::CacheError;

/// Supplies a bearer credential right before each request. Tokens are
/// short-lived, so implementations must not hand out a stale cached value.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn bearer_token(&self) -> Result<String, CacheError>;
}

#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn bearer_token(&self) -> Result<String, CacheError> {
        non_empty(self.0.clone(), "static token")
    }
}

/// Reads the token from an environment variable on every call so an external
/// login helper can rotate it underneath a running process.
#[derive(Debug, Clone)]
pub struct EnvToken {
    var: String,
}

impl EnvToken {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

#[async_trait]
impl TokenSource for EnvToken {
    async fn bearer_token(&self) -> Result<String, CacheError> {
        let token = std::env::var(&self.var).unwrap_or_default();
        non_empty(token, &self.var)
    }
}

fn non_empty(token: String, origin: &str) -> Result<String, CacheError> {
    let token = token.trim().to_string();
    if token.is_empty() {
        Err(CacheError::Unauthorized(format!(
            "no bearer token available from {origin}; sign in again"
        )))
    } else {
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_static_token_is_unauthorized() {
        let err = StaticToken::new("   ").bearer_token().await.unwrap_err();
        assert!(err.is_auth());
    }

    #[tokio::test]
    async fn missing_env_token_is_unauthorized() {
        let err = EnvToken::new("PANTRY_TEST_TOKEN_THAT_IS_NEVER_SET")
            .bearer_token()
            .await
            .unwrap_err();
        assert!(err.is_auth());
    }
}
