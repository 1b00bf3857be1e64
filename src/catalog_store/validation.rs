//! Validation for catalog entities.
//!
//! Applied by the store before inserts, so a bad manifest fails at import time
//! with a useful message rather than surfacing as constraint errors.

use super::models::{Category, Collection, Lecture, Speaker};
use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

lazy_static! {
    /// Lowercase words separated by single dashes, e.g. `ancient-history`.
    static ref SLUG_RE: Regex = Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").unwrap();
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Field '{field}' is required but was empty")]
    EmptyField { field: &'static str },
    #[error("Field '{field}' must be non-negative, got {value}")]
    NegativeValue { field: &'static str, value: i64 },
    #[error("'{slug}' is not a valid category slug")]
    InvalidSlug { slug: String },
}

pub type ValidationResult<T> = Result<T, ValidationError>;

fn require(field: &'static str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyField { field });
    }
    Ok(())
}

pub fn validate_speaker(speaker: &Speaker) -> ValidationResult<()> {
    require("id", &speaker.id)?;
    require("name", &speaker.name)?;
    Ok(())
}

pub fn validate_collection(collection: &Collection) -> ValidationResult<()> {
    require("id", &collection.id)?;
    require("title", &collection.title)?;
    require("speaker_id", &collection.speaker_id)?;
    Ok(())
}

pub fn validate_lecture(lecture: &Lecture) -> ValidationResult<()> {
    require("id", &lecture.id)?;
    require("title", &lecture.title)?;
    require("object_key", &lecture.object_key)?;
    require("file_name", &lecture.file_name)?;
    require("speaker_id", &lecture.speaker_id)?;
    require("collection_id", &lecture.collection_id)?;
    if lecture.file_size < 0 {
        return Err(ValidationError::NegativeValue {
            field: "file_size",
            value: lecture.file_size,
        });
    }
    if let Some(duration) = lecture.duration_secs {
        if duration < 0 {
            return Err(ValidationError::NegativeValue {
                field: "duration_secs",
                value: duration as i64,
            });
        }
    }
    Ok(())
}

pub fn validate_category(category: &Category) -> ValidationResult<()> {
    require("name", &category.name)?;
    if !SLUG_RE.is_match(&category.slug) {
        return Err(ValidationError::InvalidSlug {
            slug: category.slug.clone(),
        });
    }
    if let Some(parent) = &category.parent_slug {
        if !SLUG_RE.is_match(parent) {
            return Err(ValidationError::InvalidSlug {
                slug: parent.clone(),
            });
        }
    }
    Ok(())
}
