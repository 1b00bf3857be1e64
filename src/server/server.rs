use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::auth::TokenVerifier;
use crate::catalog_store::{
    CategoryNode, Collection, Lecture, ResolvedCollection, ResolvedLecture, ResolvedSpeaker,
    Speaker,
};
use crate::storage::{AudioStorage, StreamUrlSigner};
use crate::user::{FavoriteEntry, PlaybackPosition, User, UserManager};
use tower_http::services::ServeDir;

use axum::{
    extract::{Path, Query, State},
    middleware,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

use super::http_layers::{
    http_cache, log_requests, rate_limit_error_handler, replenish_interval_ms, IpKeyExtractor,
    CATALOG_READ_PER_MINUTE, STREAM_PER_MINUTE, USER_WRITE_PER_MINUTE,
};
use super::metrics;
use super::pagination::{Page, PageParams};
use super::session::Session;
use super::state::*;
use super::stream_lecture::{get_lecture_audio_url, stream_lecture, stream_signed};
use super::{ApiError, ServerConfig};

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub hash: String,
    pub speakers: usize,
    pub collections: usize,
    pub lectures: usize,
    pub users: usize,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(State(state): State<ServerState>) -> Json<ServerStats> {
    Json(ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.build_hash.clone(),
        speakers: state.catalog_store.get_speakers_count(),
        collections: state.catalog_store.get_collections_count(),
        lectures: state.catalog_store.get_lectures_count(),
        users: state.user_manager.get_users_count(),
    })
}

// ============================================================================
// Catalog Handlers
// ============================================================================

async fn list_speakers(
    _session: Session,
    Query(params): Query<PageParams>,
    State(catalog_store): State<GuardedCatalogStore>,
) -> Result<Json<Page<Speaker>>, ApiError> {
    let (limit, offset) = params.limit_offset();
    let (speakers, total) = catalog_store.list_speakers(limit, offset)?;
    Ok(Json(Page::new(speakers, &params, total)))
}

async fn get_speaker(
    _session: Session,
    State(catalog_store): State<GuardedCatalogStore>,
    Path(id): Path<String>,
) -> Result<Json<Speaker>, ApiError> {
    catalog_store
        .get_speaker(&id)?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

async fn get_resolved_speaker(
    _session: Session,
    State(catalog_store): State<GuardedCatalogStore>,
    Path(id): Path<String>,
) -> Result<Json<ResolvedSpeaker>, ApiError> {
    catalog_store
        .get_resolved_speaker(&id)?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

async fn get_collection(
    _session: Session,
    State(catalog_store): State<GuardedCatalogStore>,
    Path(id): Path<String>,
) -> Result<Json<Collection>, ApiError> {
    catalog_store
        .get_collection(&id)?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

async fn get_resolved_collection(
    _session: Session,
    State(catalog_store): State<GuardedCatalogStore>,
    Path(id): Path<String>,
) -> Result<Json<ResolvedCollection>, ApiError> {
    catalog_store
        .get_resolved_collection(&id)?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

async fn get_lecture(
    _session: Session,
    State(catalog_store): State<GuardedCatalogStore>,
    Path(id): Path<String>,
) -> Result<Json<Lecture>, ApiError> {
    catalog_store
        .get_lecture(&id)?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

async fn get_resolved_lecture(
    _session: Session,
    State(catalog_store): State<GuardedCatalogStore>,
    Path(id): Path<String>,
) -> Result<Json<ResolvedLecture>, ApiError> {
    catalog_store
        .get_resolved_lecture(&id)?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

async fn get_categories(
    _session: Session,
    State(catalog_store): State<GuardedCatalogStore>,
) -> Result<Json<Vec<CategoryNode>>, ApiError> {
    Ok(Json(catalog_store.get_category_tree()?))
}

async fn get_category(
    _session: Session,
    State(catalog_store): State<GuardedCatalogStore>,
    Path(slug): Path<String>,
) -> Result<Json<CategoryNode>, ApiError> {
    catalog_store
        .get_category(&slug)?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

async fn get_category_lectures(
    _session: Session,
    Query(params): Query<PageParams>,
    State(catalog_store): State<GuardedCatalogStore>,
    Path(slug): Path<String>,
) -> Result<Json<Page<Lecture>>, ApiError> {
    let (limit, offset) = params.limit_offset();
    let (lectures, total) = catalog_store
        .list_category_lectures(&slug, limit, offset)?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(Page::new(lectures, &params, total)))
}

async fn get_category_collections(
    _session: Session,
    State(catalog_store): State<GuardedCatalogStore>,
    Path(slug): Path<String>,
) -> Result<Json<Vec<Collection>>, ApiError> {
    catalog_store
        .list_category_collections(&slug)?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

// ============================================================================
// User Handlers
// ============================================================================

async fn get_me(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
) -> Result<Json<User>, ApiError> {
    user_manager
        .get_user(session.user_id)?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

/// The session extractor has already mirrored the current token claims into
/// the user row, so a sync is simply "return what is stored now".
async fn post_sync(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
) -> Result<Json<User>, ApiError> {
    user_manager
        .get_user(session.user_id)?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

async fn put_preferences(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
    Json(preferences): Json<serde_json::Value>,
) -> Result<Json<User>, ApiError> {
    if !user_manager.set_preferences(session.user_id, &preferences)? {
        return Err(ApiError::NotFound);
    }
    user_manager
        .get_user(session.user_id)?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

async fn get_favorites(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
) -> Result<Json<Vec<FavoriteEntry>>, ApiError> {
    Ok(Json(user_manager.get_favorites(session.user_id)?))
}

#[derive(Serialize)]
struct FavoriteStatus {
    favorite: bool,
}

async fn get_favorite(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
    Path(lecture_id): Path<String>,
) -> Result<Json<FavoriteStatus>, ApiError> {
    user_manager
        .is_favorite(session.user_id, &lecture_id)?
        .map(|favorite| Json(FavoriteStatus { favorite }))
        .ok_or(ApiError::NotFound)
}

async fn put_favorite(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
    Path(lecture_id): Path<String>,
) -> Result<Json<FavoriteStatus>, ApiError> {
    if !user_manager.set_favorite(session.user_id, &lecture_id, true)? {
        return Err(ApiError::NotFound);
    }
    Ok(Json(FavoriteStatus { favorite: true }))
}

async fn delete_favorite(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
    Path(lecture_id): Path<String>,
) -> Result<Json<FavoriteStatus>, ApiError> {
    if !user_manager.set_favorite(session.user_id, &lecture_id, false)? {
        return Err(ApiError::NotFound);
    }
    Ok(Json(FavoriteStatus { favorite: false }))
}

async fn get_playback_positions(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
) -> Result<Json<Vec<PlaybackPosition>>, ApiError> {
    Ok(Json(user_manager.get_playback_positions(session.user_id)?))
}

async fn get_playback_position(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
    Path(lecture_id): Path<String>,
) -> Result<Json<PlaybackPosition>, ApiError> {
    user_manager
        .get_playback_position(session.user_id, &lecture_id)?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

#[derive(Deserialize, Debug)]
struct UpdatePlaybackBody {
    pub position_secs: i64,
}

async fn put_playback_position(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
    Path(lecture_id): Path<String>,
    Json(body): Json<UpdatePlaybackBody>,
) -> Result<Json<PlaybackPosition>, ApiError> {
    if body.position_secs < 0 {
        return Err(ApiError::BadRequest("position_secs must be non-negative"));
    }
    user_manager
        .update_playback_position(session.user_id, &lecture_id, body.position_secs)?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

// ============================================================================
// App Assembly
// ============================================================================

#[allow(clippy::too_many_arguments)]
pub fn make_app(
    config: ServerConfig,
    catalog_store: GuardedCatalogStore,
    user_manager: Arc<UserManager>,
    storage: Arc<dyn AudioStorage>,
    token_verifier: Arc<dyn TokenVerifier>,
    url_signer: Arc<StreamUrlSigner>,
) -> Result<Router> {
    let state = ServerState {
        config: config.clone(),
        start_time: Instant::now(),
        catalog_store,
        user_manager,
        storage,
        token_verifier,
        url_signer,
        build_hash: env!("GIT_HASH").to_string(),
    };

    let mut catalog_routes = Router::new()
        .route("/speakers", get(list_speakers))
        .route("/speaker/{id}", get(get_speaker))
        .route("/speaker/{id}/resolved", get(get_resolved_speaker))
        .route("/collection/{id}", get(get_collection))
        .route("/collection/{id}/resolved", get(get_resolved_collection))
        .route("/lecture/{id}", get(get_lecture))
        .route("/lecture/{id}/resolved", get(get_resolved_lecture))
        .route("/categories", get(get_categories))
        .route("/category/{slug}", get(get_category))
        .route("/category/{slug}/lectures", get(get_category_lectures))
        .route(
            "/category/{slug}/collections",
            get(get_category_collections),
        )
        .layer(middleware::from_fn_with_state(
            config.content_cache_age_sec,
            http_cache,
        ));

    let mut stream_routes = Router::new()
        .route("/lecture/{id}/stream", get(stream_lecture))
        .route("/lecture/{id}/audio-url", get(get_lecture_audio_url))
        .route("/signed/{lecture_id}", get(stream_signed));

    let mut user_routes = Router::new()
        .route("/me", get(get_me))
        .route("/sync", post(post_sync))
        .route("/preferences", put(put_preferences))
        .route("/favorites", get(get_favorites))
        .route(
            "/favorite/{lecture_id}",
            get(get_favorite).put(put_favorite).delete(delete_favorite),
        )
        .route("/playback", get(get_playback_positions))
        .route(
            "/playback/{lecture_id}",
            get(get_playback_position).put(put_playback_position),
        );

    // Governor configs are built inline here; their type parameters don't
    // factor out into helpers nicely.
    if config.rate_limits_enabled {
        let catalog_governor = Arc::new(
            GovernorConfigBuilder::default()
                .key_extractor(IpKeyExtractor)
                .per_millisecond(replenish_interval_ms(CATALOG_READ_PER_MINUTE))
                .burst_size(CATALOG_READ_PER_MINUTE)
                .finish()
                .expect("Invalid catalog rate limit config"),
        );
        catalog_routes = catalog_routes
            .layer(GovernorLayer::new(catalog_governor).error_handler(rate_limit_error_handler));

        let stream_governor = Arc::new(
            GovernorConfigBuilder::default()
                .key_extractor(IpKeyExtractor)
                .per_millisecond(replenish_interval_ms(STREAM_PER_MINUTE))
                .burst_size(STREAM_PER_MINUTE)
                .finish()
                .expect("Invalid stream rate limit config"),
        );
        stream_routes = stream_routes
            .layer(GovernorLayer::new(stream_governor).error_handler(rate_limit_error_handler));

        let user_governor = Arc::new(
            GovernorConfigBuilder::default()
                .key_extractor(IpKeyExtractor)
                .per_millisecond(replenish_interval_ms(USER_WRITE_PER_MINUTE))
                .burst_size(USER_WRITE_PER_MINUTE)
                .finish()
                .expect("Invalid user rate limit config"),
        );
        user_routes = user_routes
            .layer(GovernorLayer::new(user_governor).error_handler(rate_limit_error_handler));
    }

    let catalog_routes = catalog_routes
        .merge(stream_routes)
        .with_state(state.clone());
    let user_routes = user_routes.with_state(state.clone());

    let home_router: Router = match &config.frontend_dir_path {
        Some(frontend_path) => {
            let static_files_service =
                ServeDir::new(frontend_path).append_index_html_on_directories(true);
            Router::new().fallback_service(static_files_service)
        }
        None => Router::new()
            .route("/", get(home))
            .with_state(state.clone()),
    };

    let mut app: Router = home_router
        .nest("/v1/catalog", catalog_routes)
        .nest("/v1/user", user_routes);

    app = app.layer(middleware::from_fn_with_state(state.clone(), log_requests));

    Ok(app)
}

#[allow(clippy::too_many_arguments)]
pub async fn run_server(
    config: ServerConfig,
    metrics_port: u16,
    catalog_store: GuardedCatalogStore,
    user_manager: Arc<UserManager>,
    storage: Arc<dyn AudioStorage>,
    token_verifier: Arc<dyn TokenVerifier>,
    url_signer: Arc<StreamUrlSigner>,
) -> Result<()> {
    let port = config.port;
    let app = make_app(
        config,
        catalog_store,
        user_manager,
        storage,
        token_verifier,
        url_signer,
    )?;

    // Metrics are served on their own port so they're never exposed with the
    // API itself.
    let metrics_app: Router = Router::new().route("/metrics", get(metrics::metrics_handler));
    let metrics_listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", metrics_port))
        .await?;
    tokio::spawn(async move {
        if let Err(err) = axum::serve(metrics_listener, metrics_app).await {
            error!("Metrics server error: {}", err);
        }
    });

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received, stopping server");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_formatting() {
        assert_eq!(format_uptime(Duration::from_secs(0)), "0d 00:00:00");
        assert_eq!(format_uptime(Duration::from_secs(61)), "0d 00:01:01");
        assert_eq!(
            format_uptime(Duration::from_secs(2 * 86_400 + 3 * 3600 + 4 * 60 + 5)),
            "2d 03:04:05"
        );
    }
}
