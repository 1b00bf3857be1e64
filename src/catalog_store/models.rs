//! Catalog models for SQLite-backed storage.
//!
//! Entities mirror the content manifest: speakers own collections, collections
//! own lectures, and categories form a tree linked to lectures and collections
//! through junction rows. Premium status lives on the speaker only; collections
//! and lectures inherit it and never store their own flag.

use serde::{Deserialize, Serialize};

// =============================================================================
// Enumerations
// =============================================================================

/// Audio container/codec of a lecture file.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum AudioFormat {
    Mp3,
    M4a,
    OggVorbis,
    Flac,
    Unknown,
}

impl AudioFormat {
    /// Convert from database string representation
    pub fn from_db_str(s: &str) -> Self {
        match s {
            "MP3" => AudioFormat::Mp3,
            "M4A" => AudioFormat::M4a,
            "OGG_VORBIS" => AudioFormat::OggVorbis,
            "FLAC" => AudioFormat::Flac,
            _ => AudioFormat::Unknown,
        }
    }

    /// Convert to database string representation
    pub fn to_db_str(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "MP3",
            AudioFormat::M4a => "M4A",
            AudioFormat::OggVorbis => "OGG_VORBIS",
            AudioFormat::Flac => "FLAC",
            AudioFormat::Unknown => "UNKNOWN",
        }
    }

    /// Content type sent when streaming this format.
    /// Unknown formats fall back to a generic byte stream.
    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::M4a => "audio/mp4",
            AudioFormat::OggVorbis => "audio/ogg",
            AudioFormat::Flac => "audio/flac",
            AudioFormat::Unknown => "application/octet-stream",
        }
    }

    /// Guess the format from a file name extension (used by the importer).
    pub fn from_file_name(name: &str) -> Self {
        match name.rsplit('.').next().map(str::to_ascii_lowercase) {
            Some(ext) if ext == "mp3" => AudioFormat::Mp3,
            Some(ext) if ext == "m4a" || ext == "mp4" => AudioFormat::M4a,
            Some(ext) if ext == "ogg" || ext == "oga" => AudioFormat::OggVorbis,
            Some(ext) if ext == "flac" => AudioFormat::Flac,
            _ => AudioFormat::Unknown,
        }
    }
}

// =============================================================================
// Core Entities
// =============================================================================

/// Speaker entity
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Speaker {
    pub id: String,
    pub name: String,
    pub bio: Option<String>,
    pub portrait_url: Option<String>,
    pub portrait_thumb_url: Option<String>,
    pub is_premium: bool,
}

/// Collection entity
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Collection {
    pub id: String,
    pub title: String,
    pub year: Option<i32>,
    pub cover_url: Option<String>,
    pub cover_thumb_url: Option<String>,
    pub speaker_id: String,
}

/// Lecture entity.
///
/// Carries both a speaker and a collection reference. The references are
/// expected to agree (the collection's speaker is the lecture's speaker); the
/// integrity watchdog scans for rows where they don't.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Lecture {
    pub id: String,
    pub title: String,
    pub object_key: String,
    pub file_name: String,
    pub file_size: i64,
    pub format: AudioFormat,
    pub duration_secs: Option<i32>,
    pub play_count: i64,
    pub speaker_id: String,
    pub collection_id: String,
}

/// Category entity (tree node, identified by slug)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub slug: String,
    pub parent_slug: Option<String>,
}

// =============================================================================
// Relationship Types
// =============================================================================

/// Category assignment on a lecture or collection
#[derive(Clone, Debug, Serialize)]
pub struct CategoryAssignment {
    pub name: String,
    pub slug: String,
    pub is_primary: bool,
}

/// Category with its children, for the tree endpoint
#[derive(Clone, Debug, Serialize)]
pub struct CategoryNode {
    pub name: String,
    pub slug: String,
    pub children: Vec<CategoryNode>,
}

// =============================================================================
// Resolved/Composite Types (API Responses)
// =============================================================================

/// Full speaker with all owned collections
#[derive(Clone, Debug, Serialize)]
pub struct ResolvedSpeaker {
    pub speaker: Speaker,
    pub collections: Vec<Collection>,
}

/// Full collection with its speaker and ordered lectures
#[derive(Clone, Debug, Serialize)]
pub struct ResolvedCollection {
    pub collection: Collection,
    pub speaker: Speaker,
    pub lectures: Vec<Lecture>,
}

/// Lecture with its speaker, collection and categories
#[derive(Clone, Debug, Serialize)]
pub struct ResolvedLecture {
    pub lecture: Lecture,
    pub speaker: Speaker,
    pub collection: Collection,
    pub categories: Vec<CategoryAssignment>,
}

/// The subset of lecture data the streaming path needs.
#[derive(Clone, Debug)]
pub struct LectureAudio {
    pub lecture_id: String,
    pub object_key: String,
    pub format: AudioFormat,
    pub file_size: i64,
    /// Inherited from the owning speaker.
    pub is_premium: bool,
}

/// A lecture whose speaker reference disagrees with its collection's speaker.
#[derive(Clone, Debug, Serialize)]
pub struct SpeakerMismatch {
    pub lecture_id: String,
    pub lecture_speaker_id: String,
    pub collection_id: String,
    pub collection_speaker_id: String,
}
