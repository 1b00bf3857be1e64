//! SQLite-backed catalog store implementation.
//!
//! A single write connection guards the few runtime writes (play counts,
//! watchdog repairs, imports); reads go through a small round-robin pool of
//! read-only connections so catalog browsing doesn't serialize behind writes.

use super::models::*;
use super::schema::CATALOG_VERSIONED_SCHEMAS;
use super::trait_def::CatalogStore;
use super::validation;
use crate::sqlite_persistence::BASE_DB_VERSION;
use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

const READ_POOL_SIZE: usize = 4;

#[derive(Clone)]
pub struct SqliteCatalogStore {
    read_pool: Vec<Arc<Mutex<Connection>>>,
    write_conn: Arc<Mutex<Connection>>,
    read_index: Arc<AtomicUsize>,
}

fn migrate_if_needed(conn: &mut Connection) -> Result<()> {
    let db_version: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;

    let latest_version = CATALOG_VERSIONED_SCHEMAS.len() - 1;
    let latest_schema = &CATALOG_VERSIONED_SCHEMAS[latest_version];

    let table_count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
            [],
            |r| r.get(0),
        )
        .unwrap_or(0);

    if table_count == 0 {
        info!("Creating catalog db schema at version {}", latest_version);
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
    for schema in CATALOG_VERSIONED_SCHEMAS.iter().skip(current_version + 1) {
        if let Some(migration_fn) = schema.migration {
            info!(
                "Migrating catalog db from version {} to {}",
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

impl SqliteCatalogStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path_ref = db_path.as_ref();

        let mut write_conn = Connection::open_with_flags(
            db_path_ref,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI
                | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open catalog database")?;

        migrate_if_needed(&mut write_conn)?;
        CATALOG_VERSIONED_SCHEMAS
            .last()
            .expect("at least one catalog schema version")
            .validate(&write_conn)?;

        write_conn.pragma_update(None, "journal_mode", "WAL")?;
        write_conn.pragma_update(None, "foreign_keys", "ON")?;

        let mut read_pool = Vec::with_capacity(READ_POOL_SIZE);
        for _ in 0..READ_POOL_SIZE {
            let read_conn = Connection::open_with_flags(
                db_path_ref,
                rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY
                    | rusqlite::OpenFlags::SQLITE_OPEN_URI
                    | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            read_conn.pragma_update(None, "journal_mode", "WAL")?;
            read_pool.push(Arc::new(Mutex::new(read_conn)));
        }

        let store = SqliteCatalogStore {
            write_conn: Arc::new(Mutex::new(write_conn)),
            read_pool,
            read_index: Arc::new(AtomicUsize::new(0)),
        };

        info!(
            "Opened lecture catalog: {} speakers, {} collections, {} lectures",
            store.get_speakers_count(),
            store.get_collections_count(),
            store.get_lectures_count()
        );

        #[cfg(not(feature = "no_checks"))]
        {
            let mismatches = store.find_speaker_mismatches()?;
            if !mismatches.is_empty() {
                warn!(
                    "Catalog has {} lecture(s) whose speaker disagrees with the collection speaker",
                    mismatches.len()
                );
            }
        }

        Ok(store)
    }

    fn get_read_conn(&self) -> Arc<Mutex<Connection>> {
        let index = self.read_index.fetch_add(1, Ordering::SeqCst) % self.read_pool.len();
        self.read_pool[index].clone()
    }

    // =========================================================================
    // Internal Helper Methods
    // =========================================================================

    fn get_speaker_rowid(conn: &Connection, id: &str) -> Result<Option<i64>> {
        conn.query_row(
            "SELECT rowid FROM speakers WHERE id = ?1",
            params![id],
            |r| r.get(0),
        )
        .optional()
        .map_err(Into::into)
    }

    fn get_collection_rowid(conn: &Connection, id: &str) -> Result<Option<i64>> {
        conn.query_row(
            "SELECT rowid FROM collections WHERE id = ?1",
            params![id],
            |r| r.get(0),
        )
        .optional()
        .map_err(Into::into)
    }

    fn get_lecture_rowid(conn: &Connection, id: &str) -> Result<Option<i64>> {
        conn.query_row(
            "SELECT rowid FROM lectures WHERE id = ?1",
            params![id],
            |r| r.get(0),
        )
        .optional()
        .map_err(Into::into)
    }

    fn get_category_rowid(conn: &Connection, slug: &str) -> Result<Option<i64>> {
        conn.query_row(
            "SELECT rowid FROM categories WHERE slug = ?1",
            params![slug],
            |r| r.get(0),
        )
        .optional()
        .map_err(Into::into)
    }

    /// Parse a Speaker from (id, name, bio, portrait_url, portrait_thumb_url, is_premium).
    fn parse_speaker_row(row: &rusqlite::Row) -> rusqlite::Result<Speaker> {
        Ok(Speaker {
            id: row.get(0)?,
            name: row.get(1)?,
            bio: row.get(2)?,
            portrait_url: row.get(3)?,
            portrait_thumb_url: row.get(4)?,
            is_premium: row.get::<_, i32>(5)? != 0,
        })
    }

    /// Parse a Collection from (id, title, year, cover_url, cover_thumb_url, speaker_id).
    fn parse_collection_row(row: &rusqlite::Row) -> rusqlite::Result<Collection> {
        Ok(Collection {
            id: row.get(0)?,
            title: row.get(1)?,
            year: row.get(2)?,
            cover_url: row.get(3)?,
            cover_thumb_url: row.get(4)?,
            speaker_id: row.get(5)?,
        })
    }

    /// Parse a Lecture from (id, title, object_key, file_name, file_size,
    /// format, duration_secs, play_count, speaker_id, collection_id).
    fn parse_lecture_row(row: &rusqlite::Row) -> rusqlite::Result<Lecture> {
        let format_str: String = row.get(5)?;
        Ok(Lecture {
            id: row.get(0)?,
            title: row.get(1)?,
            object_key: row.get(2)?,
            file_name: row.get(3)?,
            file_size: row.get(4)?,
            format: AudioFormat::from_db_str(&format_str),
            duration_secs: row.get(6)?,
            play_count: row.get(7)?,
            speaker_id: row.get(8)?,
            collection_id: row.get(9)?,
        })
    }

    const SPEAKER_COLUMNS: &'static str =
        "id, name, bio, portrait_url, portrait_thumb_url, is_premium";

    const COLLECTION_COLUMNS: &'static str =
        "c.id, c.title, c.year, c.cover_url, c.cover_thumb_url, s.id";

    const LECTURE_COLUMNS: &'static str = "l.id, l.title, l.object_key, l.file_name, l.file_size, \
         l.format, l.duration_secs, l.play_count, s.id, c.id";

    fn get_collections_for_speaker(
        conn: &Connection,
        speaker_rowid: i64,
    ) -> Result<Vec<Collection>> {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM collections c
             JOIN speakers s ON s.rowid = c.speaker_rowid
             WHERE c.speaker_rowid = ?1
             ORDER BY c.year DESC, c.title",
            Self::COLLECTION_COLUMNS
        ))?;
        let collections = stmt
            .query_map(params![speaker_rowid], Self::parse_collection_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(collections)
    }

    fn get_lectures_for_collection(
        conn: &Connection,
        collection_rowid: i64,
    ) -> Result<Vec<Lecture>> {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM lectures l
             JOIN speakers s ON s.rowid = l.speaker_rowid
             JOIN collections c ON c.rowid = l.collection_rowid
             WHERE l.collection_rowid = ?1
             ORDER BY l.rowid",
            Self::LECTURE_COLUMNS
        ))?;
        let lectures = stmt
            .query_map(params![collection_rowid], Self::parse_lecture_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(lectures)
    }

    fn count(&self, table: &str) -> usize {
        let conn = self.get_read_conn();
        let conn = conn.lock().unwrap();
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| {
            r.get::<_, i64>(0)
        })
        .unwrap_or(0) as usize
    }

    // =========================================================================
    // Write Operations (import tool and test fixtures)
    // =========================================================================

    pub fn insert_speaker(&self, speaker: &Speaker) -> Result<()> {
        validation::validate_speaker(speaker)?;
        let conn = self.write_conn.lock().unwrap();
        conn.execute(
            "INSERT INTO speakers (id, name, bio, portrait_url, portrait_thumb_url, is_premium)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                speaker.id,
                speaker.name,
                speaker.bio,
                speaker.portrait_url,
                speaker.portrait_thumb_url,
                speaker.is_premium as i32
            ],
        )
        .with_context(|| format!("Failed to insert speaker {}", speaker.id))?;
        Ok(())
    }

    pub fn insert_collection(&self, collection: &Collection) -> Result<()> {
        validation::validate_collection(collection)?;
        let conn = self.write_conn.lock().unwrap();
        let speaker_rowid = Self::get_speaker_rowid(&conn, &collection.speaker_id)?
            .with_context(|| format!("Unknown speaker {}", collection.speaker_id))?;
        conn.execute(
            "INSERT INTO collections (id, title, year, cover_url, cover_thumb_url, speaker_rowid)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                collection.id,
                collection.title,
                collection.year,
                collection.cover_url,
                collection.cover_thumb_url,
                speaker_rowid
            ],
        )
        .with_context(|| format!("Failed to insert collection {}", collection.id))?;
        Ok(())
    }

    pub fn insert_lecture(&self, lecture: &Lecture) -> Result<()> {
        validation::validate_lecture(lecture)?;
        let conn = self.write_conn.lock().unwrap();
        let speaker_rowid = Self::get_speaker_rowid(&conn, &lecture.speaker_id)?
            .with_context(|| format!("Unknown speaker {}", lecture.speaker_id))?;
        let collection_rowid = Self::get_collection_rowid(&conn, &lecture.collection_id)?
            .with_context(|| format!("Unknown collection {}", lecture.collection_id))?;
        conn.execute(
            "INSERT INTO lectures (id, title, object_key, file_name, file_size, format,
                                   duration_secs, play_count, speaker_rowid, collection_rowid)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                lecture.id,
                lecture.title,
                lecture.object_key,
                lecture.file_name,
                lecture.file_size,
                lecture.format.to_db_str(),
                lecture.duration_secs,
                lecture.play_count,
                speaker_rowid,
                collection_rowid
            ],
        )
        .with_context(|| format!("Failed to insert lecture {}", lecture.id))?;
        Ok(())
    }

    pub fn insert_category(&self, category: &Category) -> Result<()> {
        validation::validate_category(category)?;
        let conn = self.write_conn.lock().unwrap();
        let parent_rowid = match &category.parent_slug {
            Some(parent_slug) => Some(
                Self::get_category_rowid(&conn, parent_slug)?
                    .with_context(|| format!("Unknown parent category {}", parent_slug))?,
            ),
            None => None,
        };
        conn.execute(
            "INSERT INTO categories (name, slug, parent_rowid) VALUES (?1, ?2, ?3)",
            params![category.name, category.slug, parent_rowid],
        )
        .with_context(|| format!("Failed to insert category {}", category.slug))?;
        Ok(())
    }

    pub fn link_lecture_category(
        &self,
        lecture_id: &str,
        slug: &str,
        is_primary: bool,
    ) -> Result<()> {
        let conn = self.write_conn.lock().unwrap();
        let lecture_rowid = Self::get_lecture_rowid(&conn, lecture_id)?
            .with_context(|| format!("Unknown lecture {}", lecture_id))?;
        let category_rowid = Self::get_category_rowid(&conn, slug)?
            .with_context(|| format!("Unknown category {}", slug))?;
        conn.execute(
            "INSERT INTO lecture_categories (lecture_rowid, category_rowid, is_primary)
             VALUES (?1, ?2, ?3)",
            params![lecture_rowid, category_rowid, is_primary as i32],
        )?;
        Ok(())
    }

    pub fn link_collection_category(
        &self,
        collection_id: &str,
        slug: &str,
        is_primary: bool,
    ) -> Result<()> {
        let conn = self.write_conn.lock().unwrap();
        let collection_rowid = Self::get_collection_rowid(&conn, collection_id)?
            .with_context(|| format!("Unknown collection {}", collection_id))?;
        let category_rowid = Self::get_category_rowid(&conn, slug)?
            .with_context(|| format!("Unknown category {}", slug))?;
        conn.execute(
            "INSERT INTO collection_categories (collection_rowid, category_rowid, is_primary)
             VALUES (?1, ?2, ?3)",
            params![collection_rowid, category_rowid, is_primary as i32],
        )?;
        Ok(())
    }

    pub fn speaker_exists(&self, id: &str) -> Result<bool> {
        let conn = self.get_read_conn();
        let conn = conn.lock().unwrap();
        Ok(Self::get_speaker_rowid(&conn, id)?.is_some())
    }

    pub fn collection_exists(&self, id: &str) -> Result<bool> {
        let conn = self.get_read_conn();
        let conn = conn.lock().unwrap();
        Ok(Self::get_collection_rowid(&conn, id)?.is_some())
    }

    pub fn lecture_exists(&self, id: &str) -> Result<bool> {
        let conn = self.get_read_conn();
        let conn = conn.lock().unwrap();
        Ok(Self::get_lecture_rowid(&conn, id)?.is_some())
    }

    /// Used by the importer for mismatched manifests. Not part of the trait;
    /// runtime code never creates mismatches on purpose.
    pub fn set_lecture_speaker_unchecked(&self, lecture_id: &str, speaker_id: &str) -> Result<()> {
        let conn = self.write_conn.lock().unwrap();
        let speaker_rowid = Self::get_speaker_rowid(&conn, speaker_id)?
            .with_context(|| format!("Unknown speaker {}", speaker_id))?;
        let updated = conn.execute(
            "UPDATE lectures SET speaker_rowid = ?1 WHERE id = ?2",
            params![speaker_rowid, lecture_id],
        )?;
        if updated == 0 {
            bail!("Unknown lecture {}", lecture_id);
        }
        Ok(())
    }
}

impl CatalogStore for SqliteCatalogStore {
    fn get_speaker(&self, id: &str) -> Result<Option<Speaker>> {
        let conn = self.get_read_conn();
        let conn = conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM speakers WHERE id = ?1",
            Self::SPEAKER_COLUMNS
        ))?;
        stmt.query_row(params![id], Self::parse_speaker_row)
            .optional()
            .map_err(Into::into)
    }

    fn get_collection(&self, id: &str) -> Result<Option<Collection>> {
        let conn = self.get_read_conn();
        let conn = conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM collections c
             JOIN speakers s ON s.rowid = c.speaker_rowid
             WHERE c.id = ?1",
            Self::COLLECTION_COLUMNS
        ))?;
        stmt.query_row(params![id], Self::parse_collection_row)
            .optional()
            .map_err(Into::into)
    }

    fn get_lecture(&self, id: &str) -> Result<Option<Lecture>> {
        let conn = self.get_read_conn();
        let conn = conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM lectures l
             JOIN speakers s ON s.rowid = l.speaker_rowid
             JOIN collections c ON c.rowid = l.collection_rowid
             WHERE l.id = ?1",
            Self::LECTURE_COLUMNS
        ))?;
        stmt.query_row(params![id], Self::parse_lecture_row)
            .optional()
            .map_err(Into::into)
    }

    fn list_speakers(&self, limit: usize, offset: usize) -> Result<(Vec<Speaker>, usize)> {
        let conn = self.get_read_conn();
        let conn = conn.lock().unwrap();
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM speakers", [], |r| r.get(0))?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM speakers ORDER BY name LIMIT ?1 OFFSET ?2",
            Self::SPEAKER_COLUMNS
        ))?;
        let speakers = stmt
            .query_map(params![limit as i64, offset as i64], Self::parse_speaker_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok((speakers, total as usize))
    }

    fn get_resolved_speaker(&self, id: &str) -> Result<Option<ResolvedSpeaker>> {
        let conn = self.get_read_conn();
        let conn = conn.lock().unwrap();
        let Some(rowid) = Self::get_speaker_rowid(&conn, id)? else {
            return Ok(None);
        };
        let speaker = conn.query_row(
            &format!("SELECT {} FROM speakers WHERE rowid = ?1", Self::SPEAKER_COLUMNS),
            params![rowid],
            Self::parse_speaker_row,
        )?;
        let collections = Self::get_collections_for_speaker(&conn, rowid)?;
        Ok(Some(ResolvedSpeaker {
            speaker,
            collections,
        }))
    }

    fn get_resolved_collection(&self, id: &str) -> Result<Option<ResolvedCollection>> {
        let conn = self.get_read_conn();
        let conn = conn.lock().unwrap();
        let Some(rowid) = Self::get_collection_rowid(&conn, id)? else {
            return Ok(None);
        };
        let collection = conn.query_row(
            &format!(
                "SELECT {} FROM collections c
                 JOIN speakers s ON s.rowid = c.speaker_rowid
                 WHERE c.rowid = ?1",
                Self::COLLECTION_COLUMNS
            ),
            params![rowid],
            Self::parse_collection_row,
        )?;
        let speaker = conn
            .query_row(
                &format!("SELECT {} FROM speakers WHERE id = ?1", Self::SPEAKER_COLUMNS),
                params![collection.speaker_id],
                Self::parse_speaker_row,
            )
            .context("Collection references a missing speaker")?;
        let lectures = Self::get_lectures_for_collection(&conn, rowid)?;
        Ok(Some(ResolvedCollection {
            collection,
            speaker,
            lectures,
        }))
    }

    fn get_resolved_lecture(&self, id: &str) -> Result<Option<ResolvedLecture>> {
        let conn = self.get_read_conn();
        let conn = conn.lock().unwrap();
        let Some(rowid) = Self::get_lecture_rowid(&conn, id)? else {
            return Ok(None);
        };
        let lecture = conn.query_row(
            &format!(
                "SELECT {} FROM lectures l
                 JOIN speakers s ON s.rowid = l.speaker_rowid
                 JOIN collections c ON c.rowid = l.collection_rowid
                 WHERE l.rowid = ?1",
                Self::LECTURE_COLUMNS
            ),
            params![rowid],
            Self::parse_lecture_row,
        )?;
        let speaker = conn.query_row(
            &format!("SELECT {} FROM speakers WHERE id = ?1", Self::SPEAKER_COLUMNS),
            params![lecture.speaker_id],
            Self::parse_speaker_row,
        )?;
        let collection = conn.query_row(
            &format!(
                "SELECT {} FROM collections c
                 JOIN speakers s ON s.rowid = c.speaker_rowid
                 WHERE c.id = ?1",
                Self::COLLECTION_COLUMNS
            ),
            params![lecture.collection_id],
            Self::parse_collection_row,
        )?;

        let mut stmt = conn.prepare_cached(
            "SELECT cat.name, cat.slug, lc.is_primary FROM lecture_categories lc
             JOIN categories cat ON cat.rowid = lc.category_rowid
             WHERE lc.lecture_rowid = ?1
             ORDER BY lc.is_primary DESC, cat.slug",
        )?;
        let categories = stmt
            .query_map(params![rowid], |row| {
                Ok(CategoryAssignment {
                    name: row.get(0)?,
                    slug: row.get(1)?,
                    is_primary: row.get::<_, i32>(2)? != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(ResolvedLecture {
            lecture,
            speaker,
            collection,
            categories,
        }))
    }

    fn get_category_tree(&self) -> Result<Vec<CategoryNode>> {
        let conn = self.get_read_conn();
        let conn = conn.lock().unwrap();
        build_category_forest(&conn, None)
    }

    fn get_category(&self, slug: &str) -> Result<Option<CategoryNode>> {
        let conn = self.get_read_conn();
        let conn = conn.lock().unwrap();
        let Some(rowid) = Self::get_category_rowid(&conn, slug)? else {
            return Ok(None);
        };
        let nodes = build_category_forest(&conn, Some(rowid))?;
        Ok(nodes.into_iter().next())
    }

    fn list_category_lectures(
        &self,
        slug: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Option<(Vec<Lecture>, usize)>> {
        let conn = self.get_read_conn();
        let conn = conn.lock().unwrap();
        let Some(category_rowid) = Self::get_category_rowid(&conn, slug)? else {
            return Ok(None);
        };
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM lecture_categories WHERE category_rowid = ?1",
            params![category_rowid],
            |r| r.get(0),
        )?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM lectures l
             JOIN speakers s ON s.rowid = l.speaker_rowid
             JOIN collections c ON c.rowid = l.collection_rowid
             JOIN lecture_categories lc ON lc.lecture_rowid = l.rowid
             WHERE lc.category_rowid = ?1
             ORDER BY l.title LIMIT ?2 OFFSET ?3",
            Self::LECTURE_COLUMNS
        ))?;
        let lectures = stmt
            .query_map(
                params![category_rowid, limit as i64, offset as i64],
                Self::parse_lecture_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some((lectures, total as usize)))
    }

    fn list_category_collections(&self, slug: &str) -> Result<Option<Vec<Collection>>> {
        let conn = self.get_read_conn();
        let conn = conn.lock().unwrap();
        let Some(category_rowid) = Self::get_category_rowid(&conn, slug)? else {
            return Ok(None);
        };
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM collections c
             JOIN speakers s ON s.rowid = c.speaker_rowid
             JOIN collection_categories cc ON cc.collection_rowid = c.rowid
             WHERE cc.category_rowid = ?1
             ORDER BY c.title",
            Self::COLLECTION_COLUMNS
        ))?;
        let collections = stmt
            .query_map(params![category_rowid], Self::parse_collection_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(collections))
    }

    fn get_lecture_audio(&self, id: &str) -> Result<Option<LectureAudio>> {
        let conn = self.get_read_conn();
        let conn = conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT l.id, l.object_key, l.format, l.file_size, s.is_premium
             FROM lectures l
             JOIN speakers s ON s.rowid = l.speaker_rowid
             WHERE l.id = ?1",
        )?;
        stmt.query_row(params![id], |row| {
            let format_str: String = row.get(2)?;
            Ok(LectureAudio {
                lecture_id: row.get(0)?,
                object_key: row.get(1)?,
                format: AudioFormat::from_db_str(&format_str),
                file_size: row.get(3)?,
                is_premium: row.get::<_, i32>(4)? != 0,
            })
        })
        .optional()
        .map_err(Into::into)
    }

    fn increment_play_count(&self, id: &str) -> Result<bool> {
        let conn = self.write_conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE lectures SET play_count = play_count + 1 WHERE id = ?1",
            params![id],
        )?;
        Ok(updated > 0)
    }

    fn get_speakers_count(&self) -> usize {
        self.count("speakers")
    }

    fn get_collections_count(&self) -> usize {
        self.count("collections")
    }

    fn get_lectures_count(&self) -> usize {
        self.count("lectures")
    }

    fn get_categories_count(&self) -> usize {
        self.count("categories")
    }

    fn find_speaker_mismatches(&self) -> Result<Vec<SpeakerMismatch>> {
        let conn = self.get_read_conn();
        let conn = conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT l.id, sl.id, c.id, sc.id
             FROM lectures l
             JOIN collections c ON c.rowid = l.collection_rowid
             JOIN speakers sl ON sl.rowid = l.speaker_rowid
             JOIN speakers sc ON sc.rowid = c.speaker_rowid
             WHERE l.speaker_rowid != c.speaker_rowid",
        )?;
        let mismatches = stmt
            .query_map([], |row| {
                Ok(SpeakerMismatch {
                    lecture_id: row.get(0)?,
                    lecture_speaker_id: row.get(1)?,
                    collection_id: row.get(2)?,
                    collection_speaker_id: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(mismatches)
    }

    fn repair_lecture_speaker(&self, lecture_id: &str, speaker_id: &str) -> Result<()> {
        self.set_lecture_speaker_unchecked(lecture_id, speaker_id)
    }

    fn list_all_lecture_audio_keys(&self) -> Result<Vec<(String, String)>> {
        let conn = self.get_read_conn();
        let conn = conn.lock().unwrap();
        let mut stmt = conn.prepare_cached("SELECT id, object_key FROM lectures ORDER BY rowid")?;
        let keys = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    fn list_categories(&self) -> Result<Vec<Category>> {
        let conn = self.get_read_conn();
        let conn = conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT child.name, child.slug, parent.slug
             FROM categories child
             LEFT JOIN categories parent ON parent.rowid = child.parent_rowid
             ORDER BY child.rowid",
        )?;
        let categories = stmt
            .query_map([], |row| {
                Ok(Category {
                    name: row.get(0)?,
                    slug: row.get(1)?,
                    parent_slug: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(categories)
    }
}

/// Build the category tree rooted at `root` (or the whole forest when None).
fn build_category_forest(conn: &Connection, root: Option<i64>) -> Result<Vec<CategoryNode>> {
    struct Row {
        rowid: i64,
        name: String,
        slug: String,
        parent_rowid: Option<i64>,
    }

    let mut stmt =
        conn.prepare_cached("SELECT rowid, name, slug, parent_rowid FROM categories ORDER BY name")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(Row {
                rowid: row.get(0)?,
                name: row.get(1)?,
                slug: row.get(2)?,
                parent_rowid: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut children_of: HashMap<Option<i64>, Vec<&Row>> = HashMap::new();
    for row in &rows {
        children_of.entry(row.parent_rowid).or_default().push(row);
    }

    fn build(
        children_of: &HashMap<Option<i64>, Vec<&Row>>,
        parent: Option<i64>,
    ) -> Vec<CategoryNode> {
        children_of
            .get(&parent)
            .map(|rows| {
                rows.iter()
                    .map(|row| CategoryNode {
                        name: row.name.clone(),
                        slug: row.slug.clone(),
                        children: build(children_of, Some(row.rowid)),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    match root {
        None => Ok(build(&children_of, None)),
        Some(rowid) => {
            let node = rows
                .iter()
                .find(|r| r.rowid == rowid)
                .map(|row| CategoryNode {
                    name: row.name.clone(),
                    slug: row.slug.clone(),
                    children: build(&children_of, Some(row.rowid)),
                });
            Ok(node.into_iter().collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_store() -> (TempDir, SqliteCatalogStore) {
        let dir = TempDir::new().unwrap();
        let store = SqliteCatalogStore::new(dir.path().join("catalog.db")).unwrap();
        (dir, store)
    }

    fn speaker(id: &str, premium: bool) -> Speaker {
        Speaker {
            id: id.to_string(),
            name: format!("Speaker {}", id),
            bio: None,
            portrait_url: None,
            portrait_thumb_url: None,
            is_premium: premium,
        }
    }

    fn collection(id: &str, speaker_id: &str) -> Collection {
        Collection {
            id: id.to_string(),
            title: format!("Collection {}", id),
            year: Some(2020),
            cover_url: None,
            cover_thumb_url: None,
            speaker_id: speaker_id.to_string(),
        }
    }

    fn lecture(id: &str, speaker_id: &str, collection_id: &str) -> Lecture {
        Lecture {
            id: id.to_string(),
            title: format!("Lecture {}", id),
            object_key: format!("audio/{}/{}.mp3", collection_id, id),
            file_name: format!("{}.mp3", id),
            file_size: 4096,
            format: AudioFormat::Mp3,
            duration_secs: Some(1800),
            play_count: 0,
            speaker_id: speaker_id.to_string(),
            collection_id: collection_id.to_string(),
        }
    }

    fn seed(store: &SqliteCatalogStore) {
        store.insert_speaker(&speaker("spk-1", false)).unwrap();
        store.insert_speaker(&speaker("spk-2", true)).unwrap();
        store.insert_collection(&collection("col-1", "spk-1")).unwrap();
        store.insert_collection(&collection("col-2", "spk-2")).unwrap();
        store.insert_lecture(&lecture("lec-1", "spk-1", "col-1")).unwrap();
        store.insert_lecture(&lecture("lec-2", "spk-1", "col-1")).unwrap();
        store.insert_lecture(&lecture("lec-3", "spk-2", "col-2")).unwrap();
    }

    #[test]
    fn insert_and_get_entities() {
        let (_dir, store) = make_store();
        seed(&store);

        let speaker = store.get_speaker("spk-1").unwrap().unwrap();
        assert_eq!(speaker.name, "Speaker spk-1");
        assert!(!speaker.is_premium);

        let collection = store.get_collection("col-1").unwrap().unwrap();
        assert_eq!(collection.speaker_id, "spk-1");

        let lecture = store.get_lecture("lec-1").unwrap().unwrap();
        assert_eq!(lecture.collection_id, "col-1");
        assert_eq!(lecture.format, AudioFormat::Mp3);

        assert!(store.get_speaker("nope").unwrap().is_none());
        assert!(store.get_lecture("nope").unwrap().is_none());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let (_dir, store) = make_store();
        store.insert_speaker(&speaker("spk-1", false)).unwrap();
        assert!(store.insert_speaker(&speaker("spk-1", false)).is_err());
    }

    #[test]
    fn list_speakers_paginates() {
        let (_dir, store) = make_store();
        seed(&store);

        let (page, total) = store.list_speakers(1, 0).unwrap();
        assert_eq!(total, 2);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, "spk-1");

        let (page, total) = store.list_speakers(10, 1).unwrap();
        assert_eq!(total, 2);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, "spk-2");
    }

    #[test]
    fn resolved_collection_has_speaker_and_lectures() {
        let (_dir, store) = make_store();
        seed(&store);

        let resolved = store.get_resolved_collection("col-1").unwrap().unwrap();
        assert_eq!(resolved.speaker.id, "spk-1");
        assert_eq!(resolved.lectures.len(), 2);
        assert_eq!(resolved.lectures[0].id, "lec-1");
        assert_eq!(resolved.lectures[1].id, "lec-2");
    }

    #[test]
    fn resolved_lecture_has_categories() {
        let (_dir, store) = make_store();
        seed(&store);
        store
            .insert_category(&Category {
                name: "History".to_string(),
                slug: "history".to_string(),
                parent_slug: None,
            })
            .unwrap();
        store.link_lecture_category("lec-1", "history", true).unwrap();

        let resolved = store.get_resolved_lecture("lec-1").unwrap().unwrap();
        assert_eq!(resolved.categories.len(), 1);
        assert_eq!(resolved.categories[0].slug, "history");
        assert!(resolved.categories[0].is_primary);
    }

    #[test]
    fn category_tree_nests_children() {
        let (_dir, store) = make_store();
        for (name, slug, parent) in [
            ("History", "history", None),
            ("Ancient", "ancient", Some("history")),
            ("Modern", "modern", Some("history")),
            ("Science", "science", None),
        ] {
            store
                .insert_category(&Category {
                    name: name.to_string(),
                    slug: slug.to_string(),
                    parent_slug: parent.map(str::to_string),
                })
                .unwrap();
        }

        let tree = store.get_category_tree().unwrap();
        assert_eq!(tree.len(), 2);
        let history = tree.iter().find(|n| n.slug == "history").unwrap();
        assert_eq!(history.children.len(), 2);
        assert_eq!(history.children[0].slug, "ancient");

        let ancient = store.get_category("ancient").unwrap().unwrap();
        assert!(ancient.children.is_empty());
        assert!(store.get_category("nope").unwrap().is_none());
    }

    #[test]
    fn category_lectures_paginate_and_unknown_slug_is_none() {
        let (_dir, store) = make_store();
        seed(&store);
        store
            .insert_category(&Category {
                name: "History".to_string(),
                slug: "history".to_string(),
                parent_slug: None,
            })
            .unwrap();
        store.link_lecture_category("lec-1", "history", true).unwrap();
        store.link_lecture_category("lec-2", "history", false).unwrap();

        let (lectures, total) = store
            .list_category_lectures("history", 1, 0)
            .unwrap()
            .unwrap();
        assert_eq!(total, 2);
        assert_eq!(lectures.len(), 1);

        assert!(store.list_category_lectures("nope", 10, 0).unwrap().is_none());
    }

    #[test]
    fn lecture_audio_inherits_speaker_premium() {
        let (_dir, store) = make_store();
        seed(&store);

        let free = store.get_lecture_audio("lec-1").unwrap().unwrap();
        assert!(!free.is_premium);

        let premium = store.get_lecture_audio("lec-3").unwrap().unwrap();
        assert!(premium.is_premium);
        assert_eq!(premium.object_key, "audio/col-2/lec-3.mp3");
    }

    #[test]
    fn play_count_increments() {
        let (_dir, store) = make_store();
        seed(&store);

        assert!(store.increment_play_count("lec-1").unwrap());
        assert!(store.increment_play_count("lec-1").unwrap());
        assert!(!store.increment_play_count("nope").unwrap());

        let lecture = store.get_lecture("lec-1").unwrap().unwrap();
        assert_eq!(lecture.play_count, 2);
    }

    #[test]
    fn speaker_mismatch_detection_and_repair() {
        let (_dir, store) = make_store();
        seed(&store);

        assert!(store.find_speaker_mismatches().unwrap().is_empty());

        // lec-1 belongs to col-1 (spk-1); point its speaker at spk-2
        store.set_lecture_speaker_unchecked("lec-1", "spk-2").unwrap();

        let mismatches = store.find_speaker_mismatches().unwrap();
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].lecture_id, "lec-1");
        assert_eq!(mismatches[0].lecture_speaker_id, "spk-2");
        assert_eq!(mismatches[0].collection_speaker_id, "spk-1");

        store
            .repair_lecture_speaker("lec-1", &mismatches[0].collection_speaker_id)
            .unwrap();
        assert!(store.find_speaker_mismatches().unwrap().is_empty());
    }

    #[test]
    fn counts_reflect_inserts() {
        let (_dir, store) = make_store();
        seed(&store);
        assert_eq!(store.get_speakers_count(), 2);
        assert_eq!(store.get_collections_count(), 2);
        assert_eq!(store.get_lectures_count(), 3);
        assert_eq!(store.get_categories_count(), 0);
    }

    #[test]
    fn reopen_validates_schema() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("catalog.db");
        {
            let store = SqliteCatalogStore::new(&db_path).unwrap();
            store.insert_speaker(&speaker("spk-1", false)).unwrap();
        }
        let store = SqliteCatalogStore::new(&db_path).unwrap();
        assert_eq!(store.get_speakers_count(), 1);
    }
}
