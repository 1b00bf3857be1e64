//! Test fixture creation for catalog, users and media files.
//!
//! Each test gets a fresh temp directory containing catalog.db, user.db and a
//! media/ directory with deterministic audio bytes, so range assertions can
//! compare content byte-for-byte.

use super::constants::*;
use anyhow::Result;
use lectern_catalog_server::catalog_store::{
    AudioFormat, Category, Collection, Lecture, Speaker, SqliteCatalogStore,
};
use lectern_catalog_server::user::SqliteUserStore;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Deterministic audio payload: position-dependent bytes, so any slice of the
/// file identifies its own offset.
pub fn test_audio_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

pub fn audio_key(collection_id: &str, lecture_id: &str) -> String {
    format!("audio/{}/{}.mp3", collection_id, lecture_id)
}

fn speaker(id: &str, name: &str, premium: bool) -> Speaker {
    Speaker {
        id: id.to_string(),
        name: name.to_string(),
        bio: Some(format!("{} has been lecturing for decades.", name)),
        portrait_url: Some(format!("https://cdn.example.org/{}.jpg", id)),
        portrait_thumb_url: Some(format!("https://cdn.example.org/{}_thumb.jpg", id)),
        is_premium: premium,
    }
}

fn collection(id: &str, title: &str, speaker_id: &str) -> Collection {
    Collection {
        id: id.to_string(),
        title: title.to_string(),
        year: Some(2022),
        cover_url: Some(format!("https://cdn.example.org/{}.jpg", id)),
        cover_thumb_url: None,
        speaker_id: speaker_id.to_string(),
    }
}

fn lecture(
    id: &str,
    title: &str,
    speaker_id: &str,
    collection_id: &str,
    file_size: usize,
) -> Lecture {
    Lecture {
        id: id.to_string(),
        title: title.to_string(),
        object_key: audio_key(collection_id, id),
        file_name: format!("{}.mp3", id),
        file_size: file_size as i64,
        format: AudioFormat::Mp3,
        duration_secs: Some(1800),
        play_count: 0,
        speaker_id: speaker_id.to_string(),
        collection_id: collection_id.to_string(),
    }
}

/// Creates a temp directory with a populated catalog database, empty user
/// database, and audio files on disk.
///
/// Returns (temp_dir, catalog_store, user_store, media_path).
pub fn create_test_setup() -> Result<(TempDir, SqliteCatalogStore, SqliteUserStore, PathBuf)> {
    let dir = TempDir::new()?;

    // Write audio files
    let media_path = dir.path().join("media");
    for (collection_id, lecture_id, size) in [
        (COLLECTION_RIVERS_ID, LECTURE_HEADWATERS_ID, TEST_AUDIO_SIZE_BYTES),
        (COLLECTION_RIVERS_ID, LECTURE_DELTAS_ID, 4096),
        (COLLECTION_PREMIUM_ID, LECTURE_PREMIUM_ID, 2048),
    ] {
        let file_path = media_path.join(audio_key(collection_id, lecture_id));
        fs::create_dir_all(file_path.parent().unwrap())?;
        fs::write(file_path, test_audio_bytes(size))?;
    }

    // Populate the catalog
    let catalog_store = SqliteCatalogStore::new(dir.path().join("catalog.db"))?;

    catalog_store.insert_speaker(&speaker(SPEAKER_FREE_ID, SPEAKER_FREE_NAME, false))?;
    catalog_store.insert_speaker(&speaker(SPEAKER_PREMIUM_ID, SPEAKER_PREMIUM_NAME, true))?;

    catalog_store.insert_collection(&collection(
        COLLECTION_RIVERS_ID,
        "On Rivers",
        SPEAKER_FREE_ID,
    ))?;
    catalog_store.insert_collection(&collection(
        COLLECTION_PREMIUM_ID,
        "Collected Seminars",
        SPEAKER_PREMIUM_ID,
    ))?;

    catalog_store.insert_lecture(&lecture(
        LECTURE_HEADWATERS_ID,
        "Headwaters",
        SPEAKER_FREE_ID,
        COLLECTION_RIVERS_ID,
        TEST_AUDIO_SIZE_BYTES,
    ))?;
    catalog_store.insert_lecture(&lecture(
        LECTURE_DELTAS_ID,
        "Deltas",
        SPEAKER_FREE_ID,
        COLLECTION_RIVERS_ID,
        4096,
    ))?;
    catalog_store.insert_lecture(&lecture(
        LECTURE_PREMIUM_ID,
        "The Long Nineteenth Century",
        SPEAKER_PREMIUM_ID,
        COLLECTION_PREMIUM_ID,
        2048,
    ))?;

    // Category tree: history -> ancient-history, plus a root science node
    for (name, slug, parent) in [
        ("History", CATEGORY_HISTORY_SLUG, None),
        ("Ancient History", CATEGORY_ANCIENT_SLUG, Some(CATEGORY_HISTORY_SLUG)),
        ("Science", CATEGORY_SCIENCE_SLUG, None),
    ] {
        catalog_store.insert_category(&Category {
            name: name.to_string(),
            slug: slug.to_string(),
            parent_slug: parent.map(str::to_string),
        })?;
    }
    catalog_store.link_lecture_category(LECTURE_HEADWATERS_ID, CATEGORY_HISTORY_SLUG, true)?;
    catalog_store.link_lecture_category(LECTURE_HEADWATERS_ID, CATEGORY_ANCIENT_SLUG, false)?;
    catalog_store.link_lecture_category(LECTURE_DELTAS_ID, CATEGORY_SCIENCE_SLUG, true)?;
    catalog_store.link_collection_category(COLLECTION_RIVERS_ID, CATEGORY_HISTORY_SLUG, true)?;

    let user_store = SqliteUserStore::new(dir.path().join("user.db"))?;

    Ok((dir, catalog_store, user_store, media_path))
}
