//! Shared-secret (HS256) token verification.
//!
//! Used for development setups without an identity provider and by the e2e
//! test harness, which mints its own tokens with the same secret. Never
//! deploy this against an issuer that signs with asymmetric keys.

use super::{claims_from_value, AuthError, TokenVerifier, VerifiedClaims};
use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

pub struct StaticKeyVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl StaticKeyVerifier {
    pub fn new(secret: &str, issuer: Option<&str>, audience: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        match issuer {
            Some(issuer) => validation.set_issuer(&[issuer]),
            None => {}
        }
        match audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

#[async_trait]
impl TokenVerifier for StaticKeyVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedClaims, AuthError> {
        let token_data = decode::<serde_json::Value>(token, &self.decoding_key, &self.validation)
            .map_err(|e| AuthError::Rejected(e.to_string()))?;
        claims_from_value(&token_data.claims)
    }
}
