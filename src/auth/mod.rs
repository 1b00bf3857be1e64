//! Bearer-token authentication against an external identity provider.
//!
//! All cryptographic and protocol work is delegated to `jsonwebtoken`; this
//! module owns the trait seam between the server and the two verifier
//! implementations, plus the claim-extraction heuristics for the variably
//! shaped tokens real providers emit.

mod jwks;
mod static_key;

pub use jwks::JwksVerifier;
pub use static_key::StaticKeyVerifier;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::user::UserUpsert;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Malformed bearer token: {0}")]
    Malformed(String),
    #[error("Token rejected: {0}")]
    Rejected(String),
    #[error("No signing key matches kid {0:?}")]
    UnknownKey(Option<String>),
    #[error("Failed to fetch JWKS: {0}")]
    JwksFetch(String),
}

/// Claims the rest of the server cares about, extracted from a verified token.
#[derive(Clone, Debug)]
pub struct VerifiedClaims {
    pub subject: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub is_premium: bool,
    /// Token expiration (unix seconds).
    pub expiration: i64,
}

impl VerifiedClaims {
    pub fn to_user_upsert(&self) -> UserUpsert {
        UserUpsert {
            subject: self.subject.clone(),
            email: self.email.clone(),
            display_name: self.display_name.clone(),
            is_premium: self.is_premium,
        }
    }
}

/// Validates a bearer token and extracts claims.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<VerifiedClaims, AuthError>;
}

/// Build [`VerifiedClaims`] from a raw claim set.
///
/// Providers disagree on claim shapes, so extraction is a fallback chain
/// rather than a fixed schema.
pub(crate) fn claims_from_value(claims: &Value) -> Result<VerifiedClaims, AuthError> {
    let subject = claims
        .get("sub")
        .and_then(Value::as_str)
        .ok_or_else(|| AuthError::Rejected("missing sub claim".to_string()))?
        .to_string();
    let expiration = claims
        .get("exp")
        .and_then(Value::as_i64)
        .ok_or_else(|| AuthError::Rejected("missing exp claim".to_string()))?;

    Ok(VerifiedClaims {
        subject,
        email: extract_email(claims),
        display_name: extract_display_name(claims),
        is_premium: extract_premium(claims),
        expiration,
    })
}

/// `email`, then `primary_email`, then the first entry of an `emails` array.
fn extract_email(claims: &Value) -> Option<String> {
    if let Some(email) = claims.get("email").and_then(Value::as_str) {
        return Some(email.to_string());
    }
    if let Some(email) = claims.get("primary_email").and_then(Value::as_str) {
        return Some(email.to_string());
    }
    claims
        .get("emails")
        .and_then(Value::as_array)
        .and_then(|emails| emails.first())
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// `name`, then `preferred_username`, then given/family name glued together.
fn extract_display_name(claims: &Value) -> Option<String> {
    if let Some(name) = claims.get("name").and_then(Value::as_str) {
        return Some(name.to_string());
    }
    if let Some(name) = claims.get("preferred_username").and_then(Value::as_str) {
        return Some(name.to_string());
    }
    let given = claims.get("given_name").and_then(Value::as_str);
    let family = claims.get("family_name").and_then(Value::as_str);
    match (given, family) {
        (Some(g), Some(f)) => Some(format!("{} {}", g, f)),
        (Some(g), None) => Some(g.to_string()),
        (None, Some(f)) => Some(f.to_string()),
        (None, None) => None,
    }
}

/// A boolean `premium` claim, or an `entitlements` array containing "premium".
fn extract_premium(claims: &Value) -> bool {
    if claims.get("premium").and_then(Value::as_bool) == Some(true) {
        return true;
    }
    claims
        .get("entitlements")
        .and_then(Value::as_array)
        .map(|entitlements| {
            entitlements
                .iter()
                .any(|e| e.as_str() == Some("premium"))
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn email_fallback_chain() {
        let claims = json!({"email": "a@x.org", "primary_email": "b@x.org"});
        assert_eq!(extract_email(&claims).as_deref(), Some("a@x.org"));

        let claims = json!({"primary_email": "b@x.org", "emails": ["c@x.org"]});
        assert_eq!(extract_email(&claims).as_deref(), Some("b@x.org"));

        let claims = json!({"emails": ["c@x.org", "d@x.org"]});
        assert_eq!(extract_email(&claims).as_deref(), Some("c@x.org"));

        let claims = json!({"emails": []});
        assert_eq!(extract_email(&claims), None);

        assert_eq!(extract_email(&json!({})), None);
    }

    #[test]
    fn display_name_fallback_chain() {
        let claims = json!({"name": "Ada Quill", "preferred_username": "ada"});
        assert_eq!(extract_display_name(&claims).as_deref(), Some("Ada Quill"));

        let claims = json!({"preferred_username": "ada"});
        assert_eq!(extract_display_name(&claims).as_deref(), Some("ada"));

        let claims = json!({"given_name": "Ada", "family_name": "Quill"});
        assert_eq!(extract_display_name(&claims).as_deref(), Some("Ada Quill"));

        let claims = json!({"given_name": "Ada"});
        assert_eq!(extract_display_name(&claims).as_deref(), Some("Ada"));

        assert_eq!(extract_display_name(&json!({})), None);
    }

    #[test]
    fn premium_from_flag_or_entitlements() {
        assert!(extract_premium(&json!({"premium": true})));
        assert!(!extract_premium(&json!({"premium": false})));
        assert!(extract_premium(
            &json!({"entitlements": ["basic", "premium"]})
        ));
        assert!(!extract_premium(&json!({"entitlements": ["basic"]})));
        assert!(!extract_premium(&json!({})));
    }

    #[test]
    fn claims_require_sub_and_exp() {
        let ok = claims_from_value(&json!({"sub": "s", "exp": 123})).unwrap();
        assert_eq!(ok.subject, "s");
        assert_eq!(ok.expiration, 123);
        assert!(!ok.is_premium);

        assert!(claims_from_value(&json!({"exp": 123})).is_err());
        assert!(claims_from_value(&json!({"sub": "s"})).is_err());
    }
}
