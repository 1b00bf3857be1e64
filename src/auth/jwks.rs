//! JWKS-backed token verification.
//!
//! Fetches the issuer's published key set once and caches it; an unknown `kid`
//! triggers a refetch (rate-limited) so provider key rotation is picked up
//! without a restart.

use super::{claims_from_value, AuthError, TokenVerifier, VerifiedClaims};
use async_trait::async_trait;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use std::str::FromStr;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Minimum time between JWKS refetches triggered by unknown kids.
const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

struct CachedKeys {
    jwks: JwkSet,
    fetched_at: Instant,
}

pub struct JwksVerifier {
    issuer: String,
    audience: Option<String>,
    jwks_url: String,
    http: reqwest::Client,
    cache: RwLock<Option<CachedKeys>>,
}

impl JwksVerifier {
    pub fn new(issuer: String, audience: Option<String>, jwks_url: Option<String>) -> Self {
        let jwks_url = jwks_url.unwrap_or_else(|| {
            format!("{}/.well-known/jwks.json", issuer.trim_end_matches('/'))
        });
        info!("Token verification against JWKS at {}", jwks_url);
        Self {
            issuer,
            audience,
            jwks_url,
            http: reqwest::Client::new(),
            cache: RwLock::new(None),
        }
    }

    async fn fetch_jwks(&self) -> Result<JwkSet, AuthError> {
        debug!("Fetching JWKS from {}", self.jwks_url);
        let response = self
            .http
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| AuthError::JwksFetch(e.to_string()))?;
        if !response.status().is_success() {
            return Err(AuthError::JwksFetch(format!(
                "{} returned {}",
                self.jwks_url,
                response.status()
            )));
        }
        response
            .json::<JwkSet>()
            .await
            .map_err(|e| AuthError::JwksFetch(e.to_string()))
    }

    fn find_key(jwks: &JwkSet, kid: Option<&str>) -> Option<Jwk> {
        match kid {
            Some(kid) => jwks.find(kid).cloned(),
            // Providers with a single unrotated key sometimes omit the kid
            None if jwks.keys.len() == 1 => jwks.keys.first().cloned(),
            None => None,
        }
    }

    /// Look up the signing key for `kid`, refetching the key set when the kid
    /// is unknown and the cache is old enough.
    async fn get_key(&self, kid: Option<&str>) -> Result<Jwk, AuthError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if let Some(jwk) = Self::find_key(&cached.jwks, kid) {
                    return Ok(jwk);
                }
                if cached.fetched_at.elapsed() < MIN_REFRESH_INTERVAL {
                    return Err(AuthError::UnknownKey(kid.map(str::to_string)));
                }
            }
        }

        let jwks = self.fetch_jwks().await?;
        let mut cache = self.cache.write().await;
        *cache = Some(CachedKeys {
            jwks,
            fetched_at: Instant::now(),
        });
        Self::find_key(&cache.as_ref().unwrap().jwks, kid)
            .ok_or_else(|| AuthError::UnknownKey(kid.map(str::to_string)))
    }

    fn validation(&self, algorithm: Algorithm) -> Validation {
        let mut validation = Validation::new(algorithm);
        validation.set_issuer(&[&self.issuer]);
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        validation
    }
}

#[async_trait]
impl TokenVerifier for JwksVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedClaims, AuthError> {
        let header = decode_header(token).map_err(|e| AuthError::Malformed(e.to_string()))?;
        let jwk = self.get_key(header.kid.as_deref()).await?;

        let decoding_key =
            DecodingKey::from_jwk(&jwk).map_err(|e| AuthError::Rejected(e.to_string()))?;
        let algorithm = jwk
            .common
            .key_algorithm
            .and_then(|ka| Algorithm::from_str(&ka.to_string()).ok())
            .unwrap_or(header.alg);

        let token_data = decode::<serde_json::Value>(
            token,
            &decoding_key,
            &self.validation(algorithm),
        )
        .map_err(|e| AuthError::Rejected(e.to_string()))?;

        claims_from_value(&token_data.claims)
    }
}
