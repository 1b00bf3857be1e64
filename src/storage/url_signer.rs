//! Locally signed streaming URLs.
//!
//! When the storage backend can't presign (local media directory), the server
//! mints its own time-limited URLs: HMAC-SHA256 over the lecture id and
//! expiry, verified by the public signed-stream route. The signature covers
//! exactly what the route checks, nothing else.

use super::PresignedUrl;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::distr::Alphanumeric;
use rand::Rng;
use sha2::Sha256;
use std::time::Duration;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Signed URL has expired")]
    Expired,
    #[error("Signature mismatch")]
    Invalid,
}

pub struct StreamUrlSigner {
    secret: Vec<u8>,
    public_base_url: String,
}

impl StreamUrlSigner {
    pub fn new(secret: &str, public_base_url: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Fresh random secret for deployments that don't configure one.
    /// Signed URLs stop verifying across restarts in that case.
    pub fn random_secret() -> String {
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(48)
            .map(char::from)
            .collect()
    }

    fn mac(&self, lecture_id: &str, expires_at: i64) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(lecture_id.as_bytes());
        mac.update(b"\n");
        mac.update(expires_at.to_string().as_bytes());
        mac
    }

    pub fn sign(&self, lecture_id: &str, expires_at: i64) -> String {
        URL_SAFE_NO_PAD.encode(self.mac(lecture_id, expires_at).finalize().into_bytes())
    }

    pub fn signed_url(&self, lecture_id: &str, ttl: Duration) -> PresignedUrl {
        let expires_at = chrono::Utc::now().timestamp() + ttl.as_secs() as i64;
        let signature = self.sign(lecture_id, expires_at);
        let url = format!(
            "{}/v1/catalog/signed/{}?expires={}&signature={}",
            self.public_base_url,
            urlencoding::encode(lecture_id),
            expires_at,
            signature
        );
        PresignedUrl { url, expires_at }
    }

    pub fn verify(
        &self,
        lecture_id: &str,
        expires_at: i64,
        signature: &str,
    ) -> Result<(), SignatureError> {
        if expires_at < chrono::Utc::now().timestamp() {
            return Err(SignatureError::Expired);
        }
        let decoded = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| SignatureError::Invalid)?;
        self.mac(lecture_id, expires_at)
            .verify_slice(&decoded)
            .map_err(|_| SignatureError::Invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> StreamUrlSigner {
        StreamUrlSigner::new("test-signing-secret", "http://localhost:3001")
    }

    #[test]
    fn signed_url_verifies() {
        let signer = signer();
        let presigned = signer.signed_url("lec-1", Duration::from_secs(300));

        assert!(presigned
            .url
            .starts_with("http://localhost:3001/v1/catalog/signed/lec-1?expires="));

        let signature = signer.sign("lec-1", presigned.expires_at);
        assert!(signer
            .verify("lec-1", presigned.expires_at, &signature)
            .is_ok());
    }

    #[test]
    fn tampered_lecture_id_fails() {
        let signer = signer();
        let expires_at = chrono::Utc::now().timestamp() + 300;
        let signature = signer.sign("lec-1", expires_at);

        assert_eq!(
            signer.verify("lec-2", expires_at, &signature),
            Err(SignatureError::Invalid)
        );
    }

    #[test]
    fn tampered_expiry_fails() {
        let signer = signer();
        let expires_at = chrono::Utc::now().timestamp() + 300;
        let signature = signer.sign("lec-1", expires_at);

        assert_eq!(
            signer.verify("lec-1", expires_at + 1000, &signature),
            Err(SignatureError::Invalid)
        );
    }

    #[test]
    fn expired_signature_fails() {
        let signer = signer();
        let expires_at = chrono::Utc::now().timestamp() - 10;
        let signature = signer.sign("lec-1", expires_at);

        assert_eq!(
            signer.verify("lec-1", expires_at, &signature),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn garbage_signature_fails() {
        let signer = signer();
        let expires_at = chrono::Utc::now().timestamp() + 300;
        assert_eq!(
            signer.verify("lec-1", expires_at, "!!not-base64!!"),
            Err(SignatureError::Invalid)
        );
    }

    #[test]
    fn different_secrets_do_not_cross_verify() {
        let a = StreamUrlSigner::new("secret-a", "http://localhost");
        let b = StreamUrlSigner::new("secret-b", "http://localhost");
        let expires_at = chrono::Utc::now().timestamp() + 300;
        let signature = a.sign("lec-1", expires_at);
        assert_eq!(
            b.verify("lec-1", expires_at, &signature),
            Err(SignatureError::Invalid)
        );
    }
}
