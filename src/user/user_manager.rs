//! Coordinates user-facing operations between the user store and the catalog.
//!
//! Favorites and playback positions only reference lectures that exist, so the
//! manager checks the catalog before writing; handlers turn the `false`/`None`
//! results into 404s.

use crate::catalog_store::CatalogStore;
use crate::user::user_models::{FavoriteEntry, PlaybackPosition, User, UserUpsert};
use crate::user::user_store::UserStore;
use anyhow::Result;
use std::sync::Arc;

pub struct UserManager {
    catalog_store: Arc<dyn CatalogStore>,
    user_store: Arc<dyn UserStore>,
}

impl UserManager {
    pub fn new(catalog_store: Arc<dyn CatalogStore>, user_store: Arc<dyn UserStore>) -> Self {
        Self {
            catalog_store,
            user_store,
        }
    }

    /// Mirror the verified token claims into the local user row.
    /// Called on every authenticated request; cheap when nothing changed.
    pub fn sync_user(&self, upsert: &UserUpsert) -> Result<User> {
        self.user_store.upsert_user(upsert)
    }

    pub fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        self.user_store.get_user(user_id)
    }

    /// Returns false when the user row is unknown.
    pub fn set_preferences(&self, user_id: i64, preferences: &serde_json::Value) -> Result<bool> {
        self.user_store.set_preferences(user_id, preferences)
    }

    /// Returns false when the lecture does not exist.
    pub fn set_favorite(&self, user_id: i64, lecture_id: &str, favored: bool) -> Result<bool> {
        if self.catalog_store.get_lecture(lecture_id)?.is_none() {
            return Ok(false);
        }
        self.user_store.set_favorite(user_id, lecture_id, favored)?;
        Ok(true)
    }

    /// Returns None when the lecture does not exist.
    pub fn is_favorite(&self, user_id: i64, lecture_id: &str) -> Result<Option<bool>> {
        if self.catalog_store.get_lecture(lecture_id)?.is_none() {
            return Ok(None);
        }
        Ok(Some(self.user_store.is_favorite(user_id, lecture_id)?))
    }

    pub fn get_favorites(&self, user_id: i64) -> Result<Vec<FavoriteEntry>> {
        self.user_store.get_favorites(user_id)
    }

    /// Returns None when the lecture does not exist.
    pub fn update_playback_position(
        &self,
        user_id: i64,
        lecture_id: &str,
        position_secs: i64,
    ) -> Result<Option<PlaybackPosition>> {
        if self.catalog_store.get_lecture(lecture_id)?.is_none() {
            return Ok(None);
        }
        Ok(Some(self.user_store.upsert_playback_position(
            user_id,
            lecture_id,
            position_secs,
        )?))
    }

    pub fn get_playback_position(
        &self,
        user_id: i64,
        lecture_id: &str,
    ) -> Result<Option<PlaybackPosition>> {
        self.user_store.get_playback_position(user_id, lecture_id)
    }

    pub fn get_playback_positions(&self, user_id: i64) -> Result<Vec<PlaybackPosition>> {
        self.user_store.get_playback_positions(user_id)
    }

    pub fn prune_playback_positions_before(&self, cutoff: i64) -> Result<usize> {
        self.user_store.prune_playback_positions_before(cutoff)
    }

    pub fn get_users_count(&self) -> usize {
        self.user_store.get_users_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog_store::{
        AudioFormat, Collection, Lecture, Speaker, SqliteCatalogStore,
    };
    use crate::user::SqliteUserStore;
    use tempfile::TempDir;

    fn make_manager() -> (TempDir, UserManager) {
        let dir = TempDir::new().unwrap();
        let catalog = SqliteCatalogStore::new(dir.path().join("catalog.db")).unwrap();

        catalog
            .insert_speaker(&Speaker {
                id: "spk-1".to_string(),
                name: "Ada Quill".to_string(),
                bio: None,
                portrait_url: None,
                portrait_thumb_url: None,
                is_premium: false,
            })
            .unwrap();
        catalog
            .insert_collection(&Collection {
                id: "col-1".to_string(),
                title: "On Rivers".to_string(),
                year: None,
                cover_url: None,
                cover_thumb_url: None,
                speaker_id: "spk-1".to_string(),
            })
            .unwrap();
        catalog
            .insert_lecture(&Lecture {
                id: "lec-1".to_string(),
                title: "Headwaters".to_string(),
                object_key: "audio/col-1/lec-1.mp3".to_string(),
                file_name: "lec-1.mp3".to_string(),
                file_size: 4096,
                format: AudioFormat::Mp3,
                duration_secs: Some(1800),
                play_count: 0,
                speaker_id: "spk-1".to_string(),
                collection_id: "col-1".to_string(),
            })
            .unwrap();

        let user_store = SqliteUserStore::new(dir.path().join("user.db")).unwrap();
        let manager = UserManager::new(Arc::new(catalog), Arc::new(user_store));
        (dir, manager)
    }

    fn sync_test_user(manager: &UserManager) -> User {
        manager
            .sync_user(&UserUpsert {
                subject: "sub-1".to_string(),
                email: None,
                display_name: None,
                is_premium: false,
            })
            .unwrap()
    }

    #[test]
    fn favorite_unknown_lecture_is_rejected() {
        let (_dir, manager) = make_manager();
        let user = sync_test_user(&manager);

        assert!(!manager.set_favorite(user.id, "nope", true).unwrap());
        assert!(manager.set_favorite(user.id, "lec-1", true).unwrap());
        assert_eq!(manager.is_favorite(user.id, "lec-1").unwrap(), Some(true));
        assert_eq!(manager.is_favorite(user.id, "nope").unwrap(), None);
    }

    #[test]
    fn playback_position_requires_known_lecture() {
        let (_dir, manager) = make_manager();
        let user = sync_test_user(&manager);

        assert!(manager
            .update_playback_position(user.id, "nope", 30)
            .unwrap()
            .is_none());

        let position = manager
            .update_playback_position(user.id, "lec-1", 30)
            .unwrap()
            .unwrap();
        assert_eq!(position.position_secs, 30);
    }
}
