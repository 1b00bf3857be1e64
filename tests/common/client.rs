//! HTTP client for end-to-end tests
//!
//! Wraps reqwest with helpers for every endpoint and with token minting for
//! the test server's static-secret verifier. When routes or request formats
//! change, update only this file.

use super::constants::*;
use jsonwebtoken::{encode, EncodingKey, Header};
use reqwest::Response;
use serde_json::{json, Value};
use std::time::Duration;

/// Mint an HS256 token the test server will accept.
pub fn mint_token(claims: Value) -> String {
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_AUTH_SECRET.as_bytes()),
    )
    .expect("Failed to mint test token")
}

fn future_exp() -> i64 {
    chrono::Utc::now().timestamp() + 3600
}

/// Claims for the regular test user.
pub fn regular_user_claims() -> Value {
    json!({
        "sub": TEST_SUBJECT,
        "exp": future_exp(),
        "email": TEST_EMAIL,
        "name": TEST_NAME,
    })
}

/// Claims for the premium test user.
pub fn premium_user_claims() -> Value {
    json!({
        "sub": PREMIUM_SUBJECT,
        "exp": future_exp(),
        "primary_email": PREMIUM_EMAIL,
        "preferred_username": "marcus",
        "entitlements": ["premium"],
    })
}

pub struct TestClient {
    pub client: reqwest::Client,
    pub base_url: String,
    token: Option<String>,
}

impl TestClient {
    /// Creates a new unauthenticated client.
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self {
            client,
            base_url,
            token: None,
        }
    }

    /// Client carrying a freshly minted token for the regular test user.
    pub fn authenticated(base_url: String) -> Self {
        Self::with_claims(base_url, regular_user_claims())
    }

    /// Client carrying a token with the premium entitlement.
    pub fn authenticated_premium(base_url: String) -> Self {
        Self::with_claims(base_url, premium_user_claims())
    }

    /// Client carrying a token minted from arbitrary claims.
    pub fn with_claims(base_url: String, claims: Value) -> Self {
        let mut client = Self::new(base_url);
        client.token = Some(mint_token(claims));
        client
    }

    /// Client carrying a raw token string (possibly garbage).
    pub fn with_raw_token(base_url: String, token: &str) -> Self {
        let mut client = Self::new(base_url);
        client.token = Some(token.to_string());
        client
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.apply_auth(self.client.get(format!("{}{}", self.base_url, path)))
    }

    fn apply_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.header("Authorization", format!("Bearer {}", token)),
            None => builder,
        }
    }

    // ========================================================================
    // Catalog Endpoints
    // ========================================================================

    /// GET /v1/catalog/speakers
    pub async fn get_speakers(&self) -> Response {
        self.get("/v1/catalog/speakers")
            .send()
            .await
            .expect("Get speakers request failed")
    }

    /// GET /v1/catalog/speakers?page=..&page_size=..
    pub async fn get_speakers_page(&self, page: usize, page_size: usize) -> Response {
        self.get(&format!(
            "/v1/catalog/speakers?page={}&page_size={}",
            page, page_size
        ))
        .send()
        .await
        .expect("Get speakers page request failed")
    }

    /// GET /v1/catalog/speaker/{id}
    pub async fn get_speaker(&self, id: &str) -> Response {
        self.get(&format!("/v1/catalog/speaker/{}", id))
            .send()
            .await
            .expect("Get speaker request failed")
    }

    /// GET /v1/catalog/speaker/{id}/resolved
    pub async fn get_resolved_speaker(&self, id: &str) -> Response {
        self.get(&format!("/v1/catalog/speaker/{}/resolved", id))
            .send()
            .await
            .expect("Get resolved speaker request failed")
    }

    /// GET /v1/catalog/collection/{id}
    pub async fn get_collection(&self, id: &str) -> Response {
        self.get(&format!("/v1/catalog/collection/{}", id))
            .send()
            .await
            .expect("Get collection request failed")
    }

    /// GET /v1/catalog/collection/{id}/resolved
    pub async fn get_resolved_collection(&self, id: &str) -> Response {
        self.get(&format!("/v1/catalog/collection/{}/resolved", id))
            .send()
            .await
            .expect("Get resolved collection request failed")
    }

    /// GET /v1/catalog/lecture/{id}
    pub async fn get_lecture(&self, id: &str) -> Response {
        self.get(&format!("/v1/catalog/lecture/{}", id))
            .send()
            .await
            .expect("Get lecture request failed")
    }

    /// GET /v1/catalog/lecture/{id}/resolved
    pub async fn get_resolved_lecture(&self, id: &str) -> Response {
        self.get(&format!("/v1/catalog/lecture/{}/resolved", id))
            .send()
            .await
            .expect("Get resolved lecture request failed")
    }

    /// GET /v1/catalog/categories
    pub async fn get_categories(&self) -> Response {
        self.get("/v1/catalog/categories")
            .send()
            .await
            .expect("Get categories request failed")
    }

    /// GET /v1/catalog/category/{slug}
    pub async fn get_category(&self, slug: &str) -> Response {
        self.get(&format!("/v1/catalog/category/{}", slug))
            .send()
            .await
            .expect("Get category request failed")
    }

    /// GET /v1/catalog/category/{slug}/lectures
    pub async fn get_category_lectures(&self, slug: &str) -> Response {
        self.get(&format!("/v1/catalog/category/{}/lectures", slug))
            .send()
            .await
            .expect("Get category lectures request failed")
    }

    /// GET /v1/catalog/category/{slug}/collections
    pub async fn get_category_collections(&self, slug: &str) -> Response {
        self.get(&format!("/v1/catalog/category/{}/collections", slug))
            .send()
            .await
            .expect("Get category collections request failed")
    }

    // ========================================================================
    // Streaming Endpoints
    // ========================================================================

    /// GET /v1/catalog/lecture/{id}/stream
    pub async fn stream_lecture(&self, id: &str) -> Response {
        self.get(&format!("/v1/catalog/lecture/{}/stream", id))
            .send()
            .await
            .expect("Stream lecture request failed")
    }

    /// GET /v1/catalog/lecture/{id}/stream with a Range header
    pub async fn stream_lecture_with_range(&self, id: &str, range: &str) -> Response {
        self.get(&format!("/v1/catalog/lecture/{}/stream", id))
            .header("Range", range)
            .send()
            .await
            .expect("Stream lecture range request failed")
    }

    /// GET /v1/catalog/lecture/{id}/audio-url
    pub async fn get_audio_url(&self, id: &str) -> Response {
        self.get(&format!("/v1/catalog/lecture/{}/audio-url", id))
            .send()
            .await
            .expect("Get audio url request failed")
    }

    // ========================================================================
    // User Endpoints
    // ========================================================================

    /// GET /v1/user/me
    pub async fn get_me(&self) -> Response {
        self.get("/v1/user/me")
            .send()
            .await
            .expect("Get me request failed")
    }

    /// POST /v1/user/sync
    pub async fn post_sync(&self) -> Response {
        self.apply_auth(
            self.client
                .post(format!("{}/v1/user/sync", self.base_url)),
        )
        .send()
        .await
        .expect("Sync request failed")
    }

    /// PUT /v1/user/preferences
    pub async fn put_preferences(&self, preferences: &Value) -> Response {
        self.apply_auth(
            self.client
                .put(format!("{}/v1/user/preferences", self.base_url)),
        )
        .json(preferences)
        .send()
        .await
        .expect("Put preferences request failed")
    }

    /// GET /v1/user/favorites
    pub async fn get_favorites(&self) -> Response {
        self.get("/v1/user/favorites")
            .send()
            .await
            .expect("Get favorites request failed")
    }

    /// GET /v1/user/favorite/{lecture_id}
    pub async fn get_favorite(&self, lecture_id: &str) -> Response {
        self.get(&format!("/v1/user/favorite/{}", lecture_id))
            .send()
            .await
            .expect("Get favorite request failed")
    }

    /// PUT /v1/user/favorite/{lecture_id}
    pub async fn put_favorite(&self, lecture_id: &str) -> Response {
        self.apply_auth(
            self.client
                .put(format!("{}/v1/user/favorite/{}", self.base_url, lecture_id)),
        )
        .send()
        .await
        .expect("Put favorite request failed")
    }

    /// DELETE /v1/user/favorite/{lecture_id}
    pub async fn delete_favorite(&self, lecture_id: &str) -> Response {
        self.apply_auth(
            self.client
                .delete(format!("{}/v1/user/favorite/{}", self.base_url, lecture_id)),
        )
        .send()
        .await
        .expect("Delete favorite request failed")
    }

    /// GET /v1/user/playback
    pub async fn get_playback_positions(&self) -> Response {
        self.get("/v1/user/playback")
            .send()
            .await
            .expect("Get playback positions request failed")
    }

    /// GET /v1/user/playback/{lecture_id}
    pub async fn get_playback_position(&self, lecture_id: &str) -> Response {
        self.get(&format!("/v1/user/playback/{}", lecture_id))
            .send()
            .await
            .expect("Get playback position request failed")
    }

    /// PUT /v1/user/playback/{lecture_id}
    pub async fn put_playback_position(&self, lecture_id: &str, position_secs: i64) -> Response {
        self.apply_auth(
            self.client
                .put(format!("{}/v1/user/playback/{}", self.base_url, lecture_id)),
        )
        .json(&json!({ "position_secs": position_secs }))
        .send()
        .await
        .expect("Put playback position request failed")
    }
}
