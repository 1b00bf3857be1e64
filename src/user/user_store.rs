use super::user_models::{FavoriteEntry, PlaybackPosition, User, UserUpsert};
use anyhow::Result;

pub trait UserStore: Send + Sync {
    /// Creates the user if the subject is unseen, refreshes email/display
    /// name/premium if they changed, and returns the row either way.
    fn upsert_user(&self, upsert: &UserUpsert) -> Result<User>;

    /// Returns Ok(None) if the user does not exist.
    fn get_user(&self, user_id: i64) -> Result<Option<User>>;

    /// Returns Ok(None) if no user has this subject.
    fn get_user_by_subject(&self, subject: &str) -> Result<Option<User>>;

    /// Replaces the preferences blob. Returns false if the user is unknown.
    fn set_preferences(&self, user_id: i64, preferences: &serde_json::Value) -> Result<bool>;

    /// Adds or removes a favorite. Adding twice is a no-op.
    fn set_favorite(&self, user_id: i64, lecture_id: &str, favored: bool) -> Result<()>;

    fn is_favorite(&self, user_id: i64, lecture_id: &str) -> Result<bool>;

    /// All favorites for a user, newest first.
    fn get_favorites(&self, user_id: i64) -> Result<Vec<FavoriteEntry>>;

    /// Inserts or updates the playback position and returns the stored row.
    fn upsert_playback_position(
        &self,
        user_id: i64,
        lecture_id: &str,
        position_secs: i64,
    ) -> Result<PlaybackPosition>;

    /// Returns Ok(None) if no position has been stored for the pair.
    fn get_playback_position(
        &self,
        user_id: i64,
        lecture_id: &str,
    ) -> Result<Option<PlaybackPosition>>;

    /// All positions for a user, most recently updated first.
    fn get_playback_positions(&self, user_id: i64) -> Result<Vec<PlaybackPosition>>;

    /// Deletes positions last updated before the cutoff (unix seconds).
    /// Returns the number of rows deleted.
    fn prune_playback_positions_before(&self, cutoff: i64) -> Result<usize>;

    fn get_users_count(&self) -> usize;
}
