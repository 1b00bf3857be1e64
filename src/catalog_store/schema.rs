//! SQLite schema for the lecture catalog database.
//!
//! Primary keys are integer rowids with unique text ids for lookups; junction
//! tables reference rowids. The catalog is populated by the import tool and is
//! read-mostly at runtime (only play counts are written).

use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema,
};

const SPEAKERS_FK: ForeignKey = ForeignKey {
    foreign_table: "speakers",
    foreign_column: "rowid",
    on_delete: ForeignKeyOnChange::Cascade,
};

const COLLECTIONS_FK: ForeignKey = ForeignKey {
    foreign_table: "collections",
    foreign_column: "rowid",
    on_delete: ForeignKeyOnChange::Cascade,
};

const LECTURES_FK: ForeignKey = ForeignKey {
    foreign_table: "lectures",
    foreign_column: "rowid",
    on_delete: ForeignKeyOnChange::Cascade,
};

const CATEGORIES_FK: ForeignKey = ForeignKey {
    foreign_table: "categories",
    foreign_column: "rowid",
    on_delete: ForeignKeyOnChange::Cascade,
};

const CATEGORY_PARENT_FK: ForeignKey = ForeignKey {
    foreign_table: "categories",
    foreign_column: "rowid",
    on_delete: ForeignKeyOnChange::SetNull,
};

// =============================================================================
// Core Tables
// =============================================================================

const SPEAKERS_TABLE: Table = Table {
    name: "speakers",
    columns: &[
        sqlite_column!("rowid", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("id", &SqlType::Text, non_null = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("bio", &SqlType::Text),
        sqlite_column!("portrait_url", &SqlType::Text),
        sqlite_column!("portrait_thumb_url", &SqlType::Text),
        sqlite_column!(
            "is_premium",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
    ],
    indices: &[("idx_speakers_id", "id")],
    unique_constraints: &[&["id"]],
};

const COLLECTIONS_TABLE: Table = Table {
    name: "collections",
    columns: &[
        sqlite_column!("rowid", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("id", &SqlType::Text, non_null = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("year", &SqlType::Integer),
        sqlite_column!("cover_url", &SqlType::Text),
        sqlite_column!("cover_thumb_url", &SqlType::Text),
        sqlite_column!(
            "speaker_rowid",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&SPEAKERS_FK)
        ),
    ],
    indices: &[
        ("idx_collections_id", "id"),
        ("idx_collections_speaker", "speaker_rowid"),
    ],
    unique_constraints: &[&["id"]],
};

/// Lectures keep both a speaker and a collection reference, matching the
/// upstream manifest. The pair is expected to agree with the collection's own
/// speaker; see the integrity watchdog.
const LECTURES_TABLE: Table = Table {
    name: "lectures",
    columns: &[
        sqlite_column!("rowid", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("id", &SqlType::Text, non_null = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("object_key", &SqlType::Text, non_null = true),
        sqlite_column!("file_name", &SqlType::Text, non_null = true),
        sqlite_column!("file_size", &SqlType::Integer, non_null = true),
        sqlite_column!("format", &SqlType::Text, non_null = true),
        sqlite_column!("duration_secs", &SqlType::Integer),
        sqlite_column!(
            "play_count",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "speaker_rowid",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&SPEAKERS_FK)
        ),
        sqlite_column!(
            "collection_rowid",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&COLLECTIONS_FK)
        ),
    ],
    indices: &[
        ("idx_lectures_id", "id"),
        ("idx_lectures_speaker", "speaker_rowid"),
        ("idx_lectures_collection", "collection_rowid"),
    ],
    unique_constraints: &[&["id"]],
};

const CATEGORIES_TABLE: Table = Table {
    name: "categories",
    columns: &[
        sqlite_column!("rowid", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("slug", &SqlType::Text, non_null = true),
        sqlite_column!(
            "parent_rowid",
            &SqlType::Integer,
            foreign_key = Some(&CATEGORY_PARENT_FK)
        ),
    ],
    indices: &[("idx_categories_slug", "slug")],
    unique_constraints: &[&["slug"]],
};

// =============================================================================
// Junction Tables
// =============================================================================

const LECTURE_CATEGORIES_TABLE: Table = Table {
    name: "lecture_categories",
    columns: &[
        sqlite_column!(
            "lecture_rowid",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&LECTURES_FK)
        ),
        sqlite_column!(
            "category_rowid",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&CATEGORIES_FK)
        ),
        sqlite_column!(
            "is_primary",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
    ],
    indices: &[
        ("idx_lecture_categories_lecture", "lecture_rowid"),
        ("idx_lecture_categories_category", "category_rowid"),
    ],
    unique_constraints: &[&["lecture_rowid", "category_rowid"]],
};

const COLLECTION_CATEGORIES_TABLE: Table = Table {
    name: "collection_categories",
    columns: &[
        sqlite_column!(
            "collection_rowid",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&COLLECTIONS_FK)
        ),
        sqlite_column!(
            "category_rowid",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&CATEGORIES_FK)
        ),
        sqlite_column!(
            "is_primary",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
    ],
    indices: &[
        ("idx_collection_categories_collection", "collection_rowid"),
        ("idx_collection_categories_category", "category_rowid"),
    ],
    unique_constraints: &[&["collection_rowid", "category_rowid"]],
};

// =============================================================================
// Versioned Schema Definition
// =============================================================================

pub const CATALOG_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[
        SPEAKERS_TABLE,
        COLLECTIONS_TABLE,
        LECTURES_TABLE,
        CATEGORIES_TABLE,
        LECTURE_CATEGORIES_TABLE,
        COLLECTION_CATEGORIES_TABLE,
    ],
    migration: None,
}];
