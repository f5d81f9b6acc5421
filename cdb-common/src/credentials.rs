//! Delegated credentials for acting against the legacy system
//!
//! A [`CredentialContext`] travels in the metadata of every domain message so
//! that write-back calls are made on behalf of the user who caused the change.
//! It is never stored on an aggregate.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Subject token issued to the acting user
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCredentials {
    pub token: String,
    pub secret: String,
}

impl TokenCredentials {
    pub fn new(token: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for TokenCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCredentials")
            .field("token", &self.token)
            .field("secret", &"***")
            .finish()
    }
}

/// Application (consumer) credentials
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerCredentials {
    pub key: String,
    pub secret: String,
}

impl ConsumerCredentials {
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for ConsumerCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerCredentials")
            .field("key", &self.key)
            .field("secret", &"***")
            .finish()
    }
}

/// Per-message credential bundle
///
/// `consumer` overrides the application credentials configured for the
/// deployment when the originating request came from another application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialContext {
    pub token: TokenCredentials,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer: Option<ConsumerCredentials>,
}

impl CredentialContext {
    pub fn new(token: TokenCredentials) -> Self {
        Self {
            token,
            consumer: None,
        }
    }

    pub fn with_consumer(mut self, consumer: ConsumerCredentials) -> Self {
        self.consumer = Some(consumer);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secrets() {
        let ctx = CredentialContext::new(TokenCredentials::new("tok", "very-secret"))
            .with_consumer(ConsumerCredentials::new("app", "app-secret"));
        let printed = format!("{:?}", ctx);
        assert!(printed.contains("tok"));
        assert!(printed.contains("app"));
        assert!(!printed.contains("very-secret"));
        assert!(!printed.contains("app-secret"));
    }

    #[test]
    fn test_consumer_is_optional_in_json() {
        let json = r#"{"token":{"token":"t","secret":"s"}}"#;
        let ctx: CredentialContext = serde_json::from_str(json).unwrap();
        assert!(ctx.consumer.is_none());
        assert_eq!(ctx.token.token, "t");
    }
}
