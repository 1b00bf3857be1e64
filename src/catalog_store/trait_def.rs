//! CatalogStore trait definition.
//!
//! Abstracts catalog reads (and the few runtime writes) behind a trait so the
//! server, the background jobs and the tests don't depend on the SQLite
//! implementation directly.

use anyhow::Result;

use super::models::{
    Category, CategoryNode, Collection, Lecture, LectureAudio, ResolvedCollection, ResolvedLecture,
    ResolvedSpeaker, Speaker, SpeakerMismatch,
};

pub trait CatalogStore: Send + Sync {
    // =========================================================================
    // Basic Entity Retrieval
    // =========================================================================

    /// Get a speaker by ID.
    fn get_speaker(&self, id: &str) -> Result<Option<Speaker>>;

    /// Get a collection by ID.
    fn get_collection(&self, id: &str) -> Result<Option<Collection>>;

    /// Get a lecture by ID.
    fn get_lecture(&self, id: &str) -> Result<Option<Lecture>>;

    /// List speakers ordered by name. Returns the page plus the total count.
    fn list_speakers(&self, limit: usize, offset: usize) -> Result<(Vec<Speaker>, usize)>;

    // =========================================================================
    // Resolved Entity Retrieval
    // =========================================================================

    /// Get a speaker with all owned collections.
    fn get_resolved_speaker(&self, id: &str) -> Result<Option<ResolvedSpeaker>>;

    /// Get a collection with its speaker and ordered lectures.
    fn get_resolved_collection(&self, id: &str) -> Result<Option<ResolvedCollection>>;

    /// Get a lecture with its speaker, collection and categories.
    fn get_resolved_lecture(&self, id: &str) -> Result<Option<ResolvedLecture>>;

    // =========================================================================
    // Categories
    // =========================================================================

    /// Get the full category tree (roots with nested children).
    fn get_category_tree(&self) -> Result<Vec<CategoryNode>>;

    /// Get a category (with children) by slug.
    fn get_category(&self, slug: &str) -> Result<Option<CategoryNode>>;

    /// List lectures assigned to a category, ordered by title.
    /// Returns None when the slug is unknown.
    fn list_category_lectures(
        &self,
        slug: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Option<(Vec<Lecture>, usize)>>;

    /// List collections assigned to a category.
    /// Returns None when the slug is unknown.
    fn list_category_collections(&self, slug: &str) -> Result<Option<Vec<Collection>>>;

    // =========================================================================
    // Streaming Support
    // =========================================================================

    /// Get the audio descriptor for a lecture (object key, format, premium).
    fn get_lecture_audio(&self, id: &str) -> Result<Option<LectureAudio>>;

    /// Increment a lecture's play count. Returns false when the id is unknown.
    fn increment_play_count(&self, id: &str) -> Result<bool>;

    // =========================================================================
    // Counts (for metrics and the stats endpoint)
    // =========================================================================

    fn get_speakers_count(&self) -> usize;
    fn get_collections_count(&self) -> usize;
    fn get_lectures_count(&self) -> usize;
    fn get_categories_count(&self) -> usize;

    // =========================================================================
    // Integrity Watchdog Support
    // =========================================================================

    /// Find lectures whose speaker reference disagrees with the owning
    /// collection's speaker.
    fn find_speaker_mismatches(&self) -> Result<Vec<SpeakerMismatch>>;

    /// Point a lecture's speaker reference at the given speaker id.
    fn repair_lecture_speaker(&self, lecture_id: &str, speaker_id: &str) -> Result<()>;

    /// All (lecture id, object key) pairs, for the missing-audio scan.
    fn list_all_lecture_audio_keys(&self) -> Result<Vec<(String, String)>>;

    /// All categories in insertion order (parents before children is not
    /// guaranteed; callers resolve slugs themselves).
    fn list_categories(&self) -> Result<Vec<Category>>;
}
