mod sqlite_user_store;
mod user_manager;
mod user_models;
mod user_store;

pub use sqlite_user_store::SqliteUserStore;
pub use user_manager::UserManager;
pub use user_models::{FavoriteEntry, PlaybackPosition, User, UserUpsert};
pub use user_store::UserStore;
