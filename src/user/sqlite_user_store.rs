//! SQLite-backed user store.
//!
//! Holds everything that is per-user: the mirrored identity rows, favorites
//! and playback positions. Write volume is low (favorite toggles, position
//! saves), so a single connection behind a mutex is enough.

use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema, BASE_DB_VERSION,
    DEFAULT_TIMESTAMP,
};
use crate::user::user_models::{FavoriteEntry, PlaybackPosition, User, UserUpsert};
use crate::user::user_store::UserStore;
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

const USERS_FK: ForeignKey = ForeignKey {
    foreign_table: "users",
    foreign_column: "rowid",
    on_delete: ForeignKeyOnChange::Cascade,
};

/// V 0
const USERS_TABLE_V_0: Table = Table {
    name: "users",
    columns: &[
        sqlite_column!("rowid", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("subject", &SqlType::Text, non_null = true),
        sqlite_column!("email", &SqlType::Text),
        sqlite_column!("display_name", &SqlType::Text),
        sqlite_column!(
            "is_premium",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!(
            "updated",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_users_subject", "subject")],
    unique_constraints: &[&["subject"]],
};

const FAVORITES_TABLE: Table = Table {
    name: "favorites",
    columns: &[
        sqlite_column!(
            "user_rowid",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&USERS_FK)
        ),
        sqlite_column!("lecture_id", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_favorites_user", "user_rowid")],
    unique_constraints: &[&["user_rowid", "lecture_id"]],
};

const PLAYBACK_POSITIONS_TABLE: Table = Table {
    name: "playback_positions",
    columns: &[
        sqlite_column!(
            "user_rowid",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&USERS_FK)
        ),
        sqlite_column!("lecture_id", &SqlType::Text, non_null = true),
        sqlite_column!("position_secs", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "updated",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[
        ("idx_playback_user", "user_rowid"),
        ("idx_playback_updated", "updated"),
    ],
    unique_constraints: &[&["user_rowid", "lecture_id"]],
};

/// V 1 - adds the preferences blob
const USERS_TABLE_V_1: Table = Table {
    name: "users",
    columns: &[
        sqlite_column!("rowid", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("subject", &SqlType::Text, non_null = true),
        sqlite_column!("email", &SqlType::Text),
        sqlite_column!("display_name", &SqlType::Text),
        sqlite_column!(
            "is_premium",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!(
            "updated",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!(
            "preferences",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'{}'")
        ),
    ],
    indices: &[("idx_users_subject", "subject")],
    unique_constraints: &[&["subject"]],
};

fn migrate_v0_to_v1(conn: &Connection) -> Result<()> {
    conn.execute(
        "ALTER TABLE users ADD COLUMN preferences TEXT NOT NULL DEFAULT '{}'",
        [],
    )?;
    Ok(())
}

pub const USER_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 0,
        tables: &[USERS_TABLE_V_0, FAVORITES_TABLE, PLAYBACK_POSITIONS_TABLE],
        migration: None,
    },
    VersionedSchema {
        version: 1,
        tables: &[USERS_TABLE_V_1, FAVORITES_TABLE, PLAYBACK_POSITIONS_TABLE],
        migration: Some(migrate_v0_to_v1),
    },
];

pub struct SqliteUserStore {
    conn: Arc<Mutex<Connection>>,
}

fn migrate_if_needed(conn: &mut Connection) -> Result<()> {
    let db_version: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;

    let latest_version = USER_VERSIONED_SCHEMAS.len() - 1;
    let latest_schema = &USER_VERSIONED_SCHEMAS[latest_version];

    let table_count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
            [],
            |r| r.get(0),
        )
        .unwrap_or(0);

    if table_count == 0 {
        info!("Creating user db schema at version {}", latest_version);
        latest_schema.create(conn)?;
        return Ok(());
    }

    let mut current_version = if db_version < BASE_DB_VERSION as i64 {
        0
    } else {
        (db_version - BASE_DB_VERSION as i64) as usize
    };

    if current_version >= latest_version {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for schema in USER_VERSIONED_SCHEMAS.iter().skip(current_version + 1) {
        if let Some(migration_fn) = schema.migration {
            info!(
                "Migrating user db from version {} to {}",
                current_version, schema.version
            );
            migration_fn(&tx)?;
            current_version = schema.version;
        }
    }
    tx.pragma_update(None, "user_version", BASE_DB_VERSION + current_version)?;
    tx.commit()?;
    Ok(())
}

const USER_COLUMNS: &str =
    "rowid, subject, email, display_name, is_premium, preferences, created, updated";

fn parse_user_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
    let preferences_str: String = row.get(5)?;
    Ok(User {
        id: row.get(0)?,
        subject: row.get(1)?,
        email: row.get(2)?,
        display_name: row.get(3)?,
        is_premium: row.get::<_, i32>(4)? != 0,
        preferences: serde_json::from_str(&preferences_str)
            .unwrap_or_else(|_| serde_json::json!({})),
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

impl SqliteUserStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let mut conn =
            Connection::open(db_path.as_ref()).context("Failed to open user database")?;
        migrate_if_needed(&mut conn)?;
        USER_VERSIONED_SCHEMAS
            .last()
            .expect("at least one user schema version")
            .validate(&conn)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(SqliteUserStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn get_user_by_subject_locked(
        conn: &Connection,
        subject: &str,
    ) -> Result<Option<User>> {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM users WHERE subject = ?1",
            USER_COLUMNS
        ))?;
        stmt.query_row(params![subject], parse_user_row)
            .optional()
            .map_err(Into::into)
    }
}

impl UserStore for SqliteUserStore {
    fn upsert_user(&self, upsert: &UserUpsert) -> Result<User> {
        let conn = self.conn.lock().unwrap();

        match Self::get_user_by_subject_locked(&conn, &upsert.subject)? {
            None => {
                conn.execute(
                    "INSERT INTO users (subject, email, display_name, is_premium)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        upsert.subject,
                        upsert.email,
                        upsert.display_name,
                        upsert.is_premium as i32
                    ],
                )?;
            }
            Some(existing) => {
                let changed = existing.email != upsert.email
                    || existing.display_name != upsert.display_name
                    || existing.is_premium != upsert.is_premium;
                if changed {
                    conn.execute(
                        "UPDATE users SET email = ?1, display_name = ?2, is_premium = ?3,
                                updated = (cast(strftime('%s','now') as int))
                         WHERE subject = ?4",
                        params![
                            upsert.email,
                            upsert.display_name,
                            upsert.is_premium as i32,
                            upsert.subject
                        ],
                    )?;
                }
            }
        }

        Self::get_user_by_subject_locked(&conn, &upsert.subject)?
            .context("User row vanished during upsert")
    }

    fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM users WHERE rowid = ?1",
            USER_COLUMNS
        ))?;
        stmt.query_row(params![user_id], parse_user_row)
            .optional()
            .map_err(Into::into)
    }

    fn get_user_by_subject(&self, subject: &str) -> Result<Option<User>> {
        let conn = self.conn.lock().unwrap();
        Self::get_user_by_subject_locked(&conn, subject)
    }

    fn set_preferences(&self, user_id: i64, preferences: &serde_json::Value) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE users SET preferences = ?1, updated = (cast(strftime('%s','now') as int))
             WHERE rowid = ?2",
            params![serde_json::to_string(preferences)?, user_id],
        )?;
        Ok(updated > 0)
    }

    fn set_favorite(&self, user_id: i64, lecture_id: &str, favored: bool) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        if favored {
            conn.execute(
                "INSERT OR IGNORE INTO favorites (user_rowid, lecture_id) VALUES (?1, ?2)",
                params![user_id, lecture_id],
            )?;
        } else {
            conn.execute(
                "DELETE FROM favorites WHERE user_rowid = ?1 AND lecture_id = ?2",
                params![user_id, lecture_id],
            )?;
        }
        Ok(())
    }

    fn is_favorite(&self, user_id: i64, lecture_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let found: Option<i32> = conn
            .query_row(
                "SELECT 1 FROM favorites WHERE user_rowid = ?1 AND lecture_id = ?2",
                params![user_id, lecture_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn get_favorites(&self, user_id: i64) -> Result<Vec<FavoriteEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT lecture_id, created FROM favorites
             WHERE user_rowid = ?1 ORDER BY created DESC, rowid DESC",
        )?;
        let favorites = stmt
            .query_map(params![user_id], |row| {
                Ok(FavoriteEntry {
                    lecture_id: row.get(0)?,
                    created_at: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(favorites)
    }

    fn upsert_playback_position(
        &self,
        user_id: i64,
        lecture_id: &str,
        position_secs: i64,
    ) -> Result<PlaybackPosition> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO playback_positions (user_rowid, lecture_id, position_secs)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(user_rowid, lecture_id) DO UPDATE SET
                position_secs = excluded.position_secs,
                updated = (cast(strftime('%s','now') as int))",
            params![user_id, lecture_id, position_secs],
        )?;
        conn.query_row(
            "SELECT lecture_id, position_secs, updated FROM playback_positions
             WHERE user_rowid = ?1 AND lecture_id = ?2",
            params![user_id, lecture_id],
            |row| {
                Ok(PlaybackPosition {
                    lecture_id: row.get(0)?,
                    position_secs: row.get(1)?,
                    updated_at: row.get(2)?,
                })
            },
        )
        .map_err(Into::into)
    }

    fn get_playback_position(
        &self,
        user_id: i64,
        lecture_id: &str,
    ) -> Result<Option<PlaybackPosition>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT lecture_id, position_secs, updated FROM playback_positions
             WHERE user_rowid = ?1 AND lecture_id = ?2",
            params![user_id, lecture_id],
            |row| {
                Ok(PlaybackPosition {
                    lecture_id: row.get(0)?,
                    position_secs: row.get(1)?,
                    updated_at: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(Into::into)
    }

    fn get_playback_positions(&self, user_id: i64) -> Result<Vec<PlaybackPosition>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT lecture_id, position_secs, updated FROM playback_positions
             WHERE user_rowid = ?1 ORDER BY updated DESC, rowid DESC",
        )?;
        let positions = stmt
            .query_map(params![user_id], |row| {
                Ok(PlaybackPosition {
                    lecture_id: row.get(0)?,
                    position_secs: row.get(1)?,
                    updated_at: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(positions)
    }

    fn prune_playback_positions_before(&self, cutoff: i64) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM playback_positions WHERE updated < ?1",
            params![cutoff],
        )?;
        Ok(deleted)
    }

    fn get_users_count(&self) -> usize {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get::<_, i64>(0))
            .unwrap_or(0) as usize
    }
}
