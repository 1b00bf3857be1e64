//! User data models

use serde::{Deserialize, Serialize};

/// A local user row, mirrored from the identity provider on first contact.
#[derive(Clone, Debug, Serialize)]
pub struct User {
    pub id: i64,
    /// Subject claim of the external identity provider. Unique.
    pub subject: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub is_premium: bool,
    /// Opaque client preferences blob; the server only stores it.
    pub preferences: serde_json::Value,
    pub created_at: i64,
    pub updated_at: i64,
}

/// What the token claims contribute to a user row.
///
/// The session layer builds this from verified claims and hands it to
/// [`crate::user::UserStore::upsert_user`]; a row is created on first sight of
/// a subject and refreshed whenever the claim-derived fields change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserUpsert {
    pub subject: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub is_premium: bool,
}

/// A favorited lecture.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FavoriteEntry {
    pub lecture_id: String,
    pub created_at: i64,
}

/// Saved playback offset for one user/lecture pair.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlaybackPosition {
    pub lecture_id: String,
    pub position_secs: i64,
    pub updated_at: i64,
}
