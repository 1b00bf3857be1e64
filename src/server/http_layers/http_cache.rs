//! HTTP caching middleware for catalog reads.
#![allow(dead_code)] // Used as middleware

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::IntoResponse};

pub async fn http_cache(
    State(max_age_sec): State<usize>,
    request: Request<Body>,
    next: Next,
) -> impl IntoResponse {
    let response = next.run(request).await.into_response();

    let (mut parts, body) = response.into_parts();
    let header_value = if max_age_sec == 0 {
        "no-store".to_string()
    } else {
        format!("private, max-age={}", max_age_sec)
    };
    parts
        .headers
        .insert("Cache-Control", header_value.parse().unwrap());

    axum::http::Response::from_parts(parts, body)
}
