use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::{CoreError, CoreResult};

/// Resolves a connection token to a client id, or rejects it.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> CoreResult<String>;
}

/// Tokens of the form `<client_id>.<hex sha256(secret:client_id)>`.
pub struct SignedTokenVerifier {
    secret: String,
}

impl SignedTokenVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn signature(&self, client_id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update(b":");
        hasher.update(client_id.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Issues a token for a client id. Test and tooling helper.
    pub fn token_for(&self, client_id: &str) -> String {
        format!("{client_id}.{}", self.signature(client_id))
    }
}

#[async_trait]
impl TokenVerifier for SignedTokenVerifier {
    async fn verify(&self, token: &str) -> CoreResult<String> {
        let (client_id, signature) = token
            .rsplit_once('.')
            .ok_or_else(|| CoreError::Unauthorized("malformed token".into()))?;
        if client_id.is_empty() {
            return Err(CoreError::Unauthorized("empty client id".into()));
        }
        if signature != self.signature(client_id) {
            return Err(CoreError::Unauthorized("bad token signature".into()));
        }
        Ok(client_id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn issued_token_verifies() {
        let verifier = SignedTokenVerifier::new("secret");
        let token = verifier.token_for("client-1");
        assert_eq!(verifier.verify(&token).await.unwrap(), "client-1");
    }

    #[tokio::test]
    async fn tampered_token_is_rejected() {
        let verifier = SignedTokenVerifier::new("secret");
        let token = verifier.token_for("client-1");
        let forged = token.replace("client-1.", "client-2.");
        assert!(verifier.verify(&forged).await.is_err());
        assert!(verifier.verify("no-dot-here").await.is_err());
    }

    #[tokio::test]
    async fn different_secret_invalidates() {
        let token = SignedTokenVerifier::new("a").token_for("c");
        assert!(SignedTokenVerifier::new("b").verify(&token).await.is_err());
    }
}
