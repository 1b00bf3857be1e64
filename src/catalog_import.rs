//! Catalog Import Tool
//!
//! Imports a JSON content manifest (speakers, collections, lectures and a
//! category tree) into the catalog SQLite database. Lecture speaker
//! references are always taken from the owning collection, so the imported
//! data satisfies the speaker/collection agreement invariant by construction.

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use lectern_catalog_server::catalog_store::{
    AudioFormat, CatalogStore, Category, Collection, Lecture, Speaker, SqliteCatalogStore,
};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "lectern-import")]
#[command(about = "Import a JSON content manifest into the catalog database")]
struct Args {
    /// Path to the manifest JSON file
    #[arg(value_name = "MANIFEST")]
    manifest_path: PathBuf,

    /// Directory where catalog.db will be created
    #[arg(value_name = "DB_DIR")]
    db_dir: PathBuf,

    /// Continue import even if some items fail to convert
    #[arg(long, default_value_t = true)]
    continue_on_error: bool,
}

// =============================================================================
// Manifest Shape
// =============================================================================

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    categories: Vec<ManifestCategory>,
    speakers: Vec<ManifestSpeaker>,
}

#[derive(Debug, Deserialize)]
struct ManifestCategory {
    name: String,
    slug: String,
    parent_slug: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ManifestSpeaker {
    id: Option<String>,
    name: String,
    bio: Option<String>,
    portrait_url: Option<String>,
    portrait_thumb_url: Option<String>,
    #[serde(default)]
    premium: bool,
    #[serde(default)]
    collections: Vec<ManifestCollection>,
}

#[derive(Debug, Deserialize)]
struct ManifestCollection {
    id: Option<String>,
    title: String,
    year: Option<i32>,
    cover_url: Option<String>,
    cover_thumb_url: Option<String>,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default)]
    lectures: Vec<ManifestLecture>,
}

#[derive(Debug, Deserialize)]
struct ManifestLecture {
    id: Option<String>,
    title: String,
    /// Object key in audio storage
    file_path: String,
    file_name: Option<String>,
    file_size: i64,
    /// "MP3", "M4A", "OGG_VORBIS", "FLAC"; guessed from the file name if absent
    format: Option<String>,
    duration_secs: Option<i32>,
    #[serde(default)]
    categories: Vec<String>,
    primary_category: Option<String>,
}

#[derive(Default)]
struct ImportStats {
    speakers_imported: usize,
    collections_imported: usize,
    lectures_imported: usize,
    categories_imported: usize,
    category_links: usize,
    errors: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!("Catalog Import Tool");
    info!("===================");
    info!("Manifest: {}", args.manifest_path.display());
    info!("Output database dir: {}", args.db_dir.display());

    let manifest_content = std::fs::read_to_string(&args.manifest_path)
        .with_context(|| format!("Failed to read manifest {:?}", args.manifest_path))?;
    let manifest: Manifest =
        serde_json::from_str(&manifest_content).context("Failed to parse manifest JSON")?;

    let db_path = args.db_dir.join("catalog.db");
    if db_path.exists() {
        warn!("Catalog database already exists: {}", db_path.display());
        warn!("Existing ids will collide with re-imported content.");
    }

    let store = SqliteCatalogStore::new(&db_path)?;
    let mut stats = ImportStats::default();

    info!("Importing categories...");
    let known_slugs = import_categories(&manifest, &store, &args, &mut stats)?;

    info!("Importing speakers, collections and lectures...");
    import_content(&manifest, &store, &args, &known_slugs, &mut stats)?;

    info!("");
    info!("Import Summary");
    info!("==============");
    info!("Categories imported: {}", stats.categories_imported);
    info!("Speakers imported: {}", stats.speakers_imported);
    info!("Collections imported: {}", stats.collections_imported);
    info!("Lectures imported: {}", stats.lectures_imported);
    info!("Category links created: {}", stats.category_links);
    if stats.errors > 0 {
        warn!("Errors encountered: {}", stats.errors);
    }

    info!("");
    info!("Database contains:");
    info!("  {} speakers", store.get_speakers_count());
    info!("  {} collections", store.get_collections_count());
    info!("  {} lectures", store.get_lectures_count());
    info!("  {} categories", store.get_categories_count());

    let mismatches = store.find_speaker_mismatches()?;
    if mismatches.is_empty() {
        info!("Speaker/collection references agree for all lectures.");
    } else {
        // Should be impossible: lecture speakers are assigned from collections
        error!("{} lectures have mismatched speaker references!", mismatches.len());
    }

    info!("");
    info!("Import completed successfully!");

    Ok(())
}

/// Insert categories parents-first; the manifest may list them in any order.
fn import_categories(
    manifest: &Manifest,
    store: &SqliteCatalogStore,
    args: &Args,
    stats: &mut ImportStats,
) -> Result<HashSet<String>> {
    let mut inserted: HashSet<String> = HashSet::new();
    let mut pending: Vec<&ManifestCategory> = manifest.categories.iter().collect();

    while !pending.is_empty() {
        let mut progressed = false;
        let mut still_pending = Vec::new();

        for category in pending {
            let parent_ready = category
                .parent_slug
                .as_ref()
                .map(|p| inserted.contains(p))
                .unwrap_or(true);
            if !parent_ready {
                still_pending.push(category);
                continue;
            }

            let result = store.insert_category(&Category {
                name: category.name.clone(),
                slug: category.slug.clone(),
                parent_slug: category.parent_slug.clone(),
            });
            match result {
                Ok(()) => {
                    inserted.insert(category.slug.clone());
                    stats.categories_imported += 1;
                    progressed = true;
                }
                Err(err) => {
                    stats.errors += 1;
                    if args.continue_on_error {
                        warn!("Skipping category '{}': {}", category.slug, err);
                        progressed = true;
                    } else {
                        return Err(err.context(format!("Importing category '{}'", category.slug)));
                    }
                }
            }
        }

        if !progressed && !still_pending.is_empty() {
            let orphans: Vec<&str> = still_pending.iter().map(|c| c.slug.as_str()).collect();
            bail!(
                "Categories reference missing or cyclic parents: {}",
                orphans.join(", ")
            );
        }
        pending = still_pending;
    }

    Ok(inserted)
}

fn import_content(
    manifest: &Manifest,
    store: &SqliteCatalogStore,
    args: &Args,
    known_slugs: &HashSet<String>,
    stats: &mut ImportStats,
) -> Result<()> {
    let total_lectures: u64 = manifest
        .speakers
        .iter()
        .flat_map(|s| &s.collections)
        .map(|c| c.lectures.len() as u64)
        .sum();
    let progress = ProgressBar::new(total_lectures);
    progress.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} lectures ({eta})")
            .expect("valid progress template"),
    );

    for manifest_speaker in &manifest.speakers {
        let speaker_id = manifest_speaker
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let speaker = Speaker {
            id: speaker_id.clone(),
            name: manifest_speaker.name.clone(),
            bio: manifest_speaker.bio.clone(),
            portrait_url: manifest_speaker.portrait_url.clone(),
            portrait_thumb_url: manifest_speaker.portrait_thumb_url.clone(),
            is_premium: manifest_speaker.premium,
        };
        if let Err(err) = store.insert_speaker(&speaker) {
            stats.errors += 1;
            if !args.continue_on_error {
                return Err(err.context(format!("Importing speaker '{}'", speaker.name)));
            }
            warn!("Skipping speaker '{}': {}", speaker.name, err);
            continue;
        }
        stats.speakers_imported += 1;

        for manifest_collection in &manifest_speaker.collections {
            let collection_id = manifest_collection
                .id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string());

            let collection = Collection {
                id: collection_id.clone(),
                title: manifest_collection.title.clone(),
                year: manifest_collection.year,
                cover_url: manifest_collection.cover_url.clone(),
                cover_thumb_url: manifest_collection.cover_thumb_url.clone(),
                speaker_id: speaker_id.clone(),
            };
            if let Err(err) = store.insert_collection(&collection) {
                stats.errors += 1;
                if !args.continue_on_error {
                    return Err(err.context(format!("Importing collection '{}'", collection.title)));
                }
                warn!("Skipping collection '{}': {}", collection.title, err);
                continue;
            }
            stats.collections_imported += 1;

            link_categories(
                known_slugs,
                &manifest_collection.categories,
                None,
                stats,
                |slug, is_primary| store.link_collection_category(&collection_id, slug, is_primary),
            );

            for manifest_lecture in &manifest_collection.lectures {
                progress.inc(1);

                let lecture_id = manifest_lecture
                    .id
                    .clone()
                    .unwrap_or_else(|| Uuid::new_v4().to_string());
                let file_name = manifest_lecture.file_name.clone().unwrap_or_else(|| {
                    manifest_lecture
                        .file_path
                        .rsplit('/')
                        .next()
                        .unwrap_or(&manifest_lecture.file_path)
                        .to_string()
                });
                let format = match &manifest_lecture.format {
                    Some(format_str) => AudioFormat::from_db_str(format_str),
                    None => AudioFormat::from_file_name(&file_name),
                };

                // The collection's speaker is authoritative
                let lecture = Lecture {
                    id: lecture_id.clone(),
                    title: manifest_lecture.title.clone(),
                    object_key: manifest_lecture.file_path.clone(),
                    file_name,
                    file_size: manifest_lecture.file_size,
                    format,
                    duration_secs: manifest_lecture.duration_secs,
                    play_count: 0,
                    speaker_id: speaker_id.clone(),
                    collection_id: collection_id.clone(),
                };
                if let Err(err) = store.insert_lecture(&lecture) {
                    stats.errors += 1;
                    if !args.continue_on_error {
                        return Err(err.context(format!("Importing lecture '{}'", lecture.title)));
                    }
                    warn!("Skipping lecture '{}': {}", lecture.title, err);
                    continue;
                }
                stats.lectures_imported += 1;

                link_categories(
                    known_slugs,
                    &manifest_lecture.categories,
                    manifest_lecture.primary_category.as_deref(),
                    stats,
                    |slug, is_primary| store.link_lecture_category(&lecture_id, slug, is_primary),
                );
            }
        }
    }

    progress.finish_and_clear();
    Ok(())
}

fn link_categories<F>(
    known_slugs: &HashSet<String>,
    slugs: &[String],
    primary: Option<&str>,
    stats: &mut ImportStats,
    link: F,
) where
    F: Fn(&str, bool) -> Result<()>,
{
    for slug in slugs {
        if !known_slugs.contains(slug) {
            warn!("Unknown category slug '{}', skipping link", slug);
            stats.errors += 1;
            continue;
        }
        let is_primary = primary == Some(slug.as_str());
        match link(slug, is_primary) {
            Ok(()) => stats.category_links += 1,
            Err(err) => {
                warn!("Failed to link category '{}': {}", slug, err);
                stats.errors += 1;
            }
        }
    }
}
