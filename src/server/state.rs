use axum::extract::FromRef;

use crate::auth::TokenVerifier;
use crate::catalog_store::CatalogStore;
use crate::storage::{AudioStorage, StreamUrlSigner};
use crate::user::UserManager;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedCatalogStore = Arc<dyn CatalogStore>;
pub type GuardedUserManager = Arc<UserManager>;
pub type GuardedAudioStorage = Arc<dyn AudioStorage>;
pub type GuardedTokenVerifier = Arc<dyn TokenVerifier>;
pub type GuardedUrlSigner = Arc<StreamUrlSigner>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub catalog_store: GuardedCatalogStore,
    pub user_manager: GuardedUserManager,
    pub storage: GuardedAudioStorage,
    pub token_verifier: GuardedTokenVerifier,
    pub url_signer: GuardedUrlSigner,
    pub build_hash: String,
}

impl FromRef<ServerState> for GuardedCatalogStore {
    fn from_ref(input: &ServerState) -> Self {
        input.catalog_store.clone()
    }
}

impl FromRef<ServerState> for GuardedUserManager {
    fn from_ref(input: &ServerState) -> Self {
        input.user_manager.clone()
    }
}

impl FromRef<ServerState> for GuardedAudioStorage {
    fn from_ref(input: &ServerState) -> Self {
        input.storage.clone()
    }
}

impl FromRef<ServerState> for GuardedTokenVerifier {
    fn from_ref(input: &ServerState) -> Self {
        input.token_verifier.clone()
    }
}

impl FromRef<ServerState> for GuardedUrlSigner {
    fn from_ref(input: &ServerState) -> Self {
        input.url_signer.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
