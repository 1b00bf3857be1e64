//! Rate limiting middleware using tower-governor.
//!
//! Token buckets are keyed by client IP, with separate budgets per endpoint
//! class: catalog reads are cheap and generous, streaming is capped to stop
//! rapid skipping, and user writes sit in between. The governor configs are
//! built inline in server.rs because of the layer's type signatures; the
//! constants here are the whole tuning surface.

use axum::{
    extract::{ConnectInfo, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::net::{IpAddr, SocketAddr};
use tower_governor::{key_extractor::KeyExtractor, GovernorError};
use tracing::warn;

// ============================================================================
// Rate Limit Constants (per minute, per IP)
// ============================================================================

/// Catalog browsing (list/get/resolved reads)
pub const CATALOG_READ_PER_MINUTE: u32 = 500;

/// Stream starts and signed-URL fetches (prevents rapid skipping)
pub const STREAM_PER_MINUTE: u32 = 120;

/// User writes (favorites, playback positions, preferences)
pub const USER_WRITE_PER_MINUTE: u32 = 60;

/// Replenish interval in milliseconds for a per-minute budget.
pub const fn replenish_interval_ms(per_minute: u32) -> u64 {
    let interval = 60_000 / per_minute as u64;
    if interval == 0 {
        1
    } else {
        interval
    }
}

// ============================================================================
// Key Extractor
// ============================================================================

/// Extracts the client IP from ConnectInfo for IP-based rate limiting.
/// Ports are deliberately ignored so reconnects share one bucket.
#[derive(Clone)]
pub struct IpKeyExtractor;

impl KeyExtractor for IpKeyExtractor {
    type Key = IpAddr;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        req.extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
            .ok_or(GovernorError::UnableToExtractKey)
    }
}

// ============================================================================
// Error Handler
// ============================================================================

/// Logs rate limit violations and maps them to responses.
pub fn rate_limit_error_handler(err: GovernorError) -> Response {
    match err {
        GovernorError::TooManyRequests { .. } => {
            super::super::metrics::record_rate_limit_hit();
            warn!("Rate limit exceeded");
            StatusCode::TOO_MANY_REQUESTS.into_response()
        }
        other => {
            warn!("Rate limiting error: {:?}", other);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replenish_interval_matches_budget() {
        assert_eq!(replenish_interval_ms(60), 1000);
        assert_eq!(replenish_interval_ms(500), 120);
        // Budgets above 60k/min degrade to one token per millisecond
        assert_eq!(replenish_interval_ms(120_000), 1);
    }

    #[test]
    fn ip_key_ignores_port() {
        let extractor = IpKeyExtractor;
        let mut request = Request::new(());
        request
            .extensions_mut()
            .insert(ConnectInfo("10.0.0.1:1234".parse::<SocketAddr>().unwrap()));
        let key_a = extractor.extract(&request).unwrap();

        let mut request = Request::new(());
        request
            .extensions_mut()
            .insert(ConnectInfo("10.0.0.1:9999".parse::<SocketAddr>().unwrap()));
        let key_b = extractor.extract(&request).unwrap();

        assert_eq!(key_a, key_b);
    }

    #[test]
    fn missing_connect_info_is_an_error() {
        let extractor = IpKeyExtractor;
        let request = Request::new(());
        assert!(extractor.extract(&request).is_err());
    }
}
