//! Audio streaming.
//!
//! Ranged delivery per RFC 7233, bounded by a configured chunk ceiling: the
//! effective end of a ranged response is clamped to
//! `min(requested end, start + max_chunk - 1, size - 1)`, and a start at or
//! past the object size is rejected with 416. Requests without a Range header
//! get the whole object with a 200.

use super::error::ApiError;
use super::session::Session;
use super::state::ServerState;
use crate::catalog_store::LectureAudio;
use crate::storage::{SignatureError, StorageError};

use axum::{
    body::Body,
    extract::{OptionalFromRequestParts, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::debug;

const HEADER_BYTE_RANGE: &str = "Range";
const STREAM_BUFFER_SIZE: usize = 4096 * 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    start_inclusive: Option<u64>,
    end_inclusive: Option<u64>,
}

impl ByteRange {
    pub fn new(start_inclusive: Option<u64>, end_inclusive: Option<u64>) -> ByteRange {
        ByteRange {
            start_inclusive,
            end_inclusive,
        }
    }

    /// Parse a `bytes=a-b` header value. Syntactically malformed headers
    /// yield None and are ignored, per RFC 7233.
    fn parse<S: AsRef<str>>(s: S) -> Option<ByteRange> {
        let v = s.as_ref();
        let v = v.strip_prefix("bytes=")?;

        let parts: Vec<&str> = v.split('-').collect();
        if parts.len() != 2 {
            return None;
        }

        Some(ByteRange {
            start_inclusive: parts[0].parse::<u64>().ok(),
            end_inclusive: parts[1].parse::<u64>().ok(),
        })
    }
}

impl OptionalFromRequestParts<ServerState> for ByteRange {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &ServerState,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts
            .headers
            .get(HEADER_BYTE_RANGE)
            .and_then(|x| x.to_str().ok())
            .and_then(ByteRange::parse))
    }
}

/// A concrete byte span to serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRange {
    pub start: u64,
    pub len: u64,
    pub total: u64,
    pub partial: bool,
}

#[derive(Debug, PartialEq, Eq)]
pub struct RangeUnsatisfiable;

/// Resolve a request's byte range against the object size and chunk ceiling.
pub fn resolve_range(
    range: Option<ByteRange>,
    object_size: u64,
    max_chunk: u64,
) -> Result<ResolvedRange, RangeUnsatisfiable> {
    let full = ResolvedRange {
        start: 0,
        len: object_size,
        total: object_size,
        partial: false,
    };

    let range = match range {
        None => return Ok(full),
        Some(ByteRange {
            start_inclusive: None,
            end_inclusive: None,
        }) => return Ok(full),
        Some(range) => range,
    };

    if object_size == 0 {
        return Err(RangeUnsatisfiable);
    }
    let max_chunk = max_chunk.max(1);

    match range {
        ByteRange {
            start_inclusive: Some(start),
            end_inclusive,
        } => {
            if start >= object_size {
                return Err(RangeUnsatisfiable);
            }
            let requested_end = end_inclusive.unwrap_or(u64::MAX);
            if requested_end < start {
                return Err(RangeUnsatisfiable);
            }
            let end = requested_end
                .min(start.saturating_add(max_chunk - 1))
                .min(object_size - 1);
            Ok(ResolvedRange {
                start,
                len: end - start + 1,
                total: object_size,
                partial: true,
            })
        }
        ByteRange {
            start_inclusive: None,
            end_inclusive: Some(suffix_len),
        } => {
            if suffix_len == 0 {
                return Err(RangeUnsatisfiable);
            }
            let len = suffix_len.min(object_size).min(max_chunk);
            let start = object_size - suffix_len.min(object_size);
            Ok(ResolvedRange {
                start,
                len,
                total: object_size,
                partial: true,
            })
        }
        ByteRange {
            start_inclusive: None,
            end_inclusive: None,
        } => unreachable!("handled above"),
    }
}

/// Mint a time-limited URL for a lecture's audio.
///
/// The storage backend presigns when it can (S3); otherwise the server signs
/// a URL pointing at its own signed-stream route.
pub async fn get_lecture_audio_url(
    session: Session,
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Result<axum::Json<crate::storage::PresignedUrl>, ApiError> {
    let audio = state
        .catalog_store
        .get_lecture_audio(&id)?
        .ok_or(ApiError::NotFound)?;

    if audio.is_premium && !session.is_premium {
        return Err(ApiError::Forbidden("Premium subscription required"));
    }

    let expiry = std::time::Duration::from_secs(state.config.presign_expiry_secs);
    match state
        .storage
        .presigned_get_url(&audio.object_key, expiry)
        .await
    {
        Ok(presigned) => {
            super::metrics::record_presigned_url("storage");
            Ok(axum::Json(presigned))
        }
        Err(StorageError::PresigningUnsupported) => {
            super::metrics::record_presigned_url("local");
            Ok(axum::Json(state.url_signer.signed_url(&audio.lecture_id, expiry)))
        }
        Err(StorageError::NotFound(_)) => Err(ApiError::NotFound),
        Err(err) => Err(anyhow::Error::from(err).into()),
    }
}

/// Authenticated streaming route. Premium lectures require a premium user.
pub async fn stream_lecture(
    session: Session,
    byte_range: Option<ByteRange>,
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let audio = state
        .catalog_store
        .get_lecture_audio(&id)?
        .ok_or(ApiError::NotFound)?;

    if audio.is_premium && !session.is_premium {
        return Err(ApiError::Forbidden("Premium subscription required"));
    }

    stream_audio(&state, audio, byte_range).await
}

#[derive(Debug, Deserialize)]
pub struct SignedStreamParams {
    expires: i64,
    signature: String,
}

/// Signature-authenticated streaming route, the target of locally signed
/// URLs. No session: possession of a valid unexpired signature is the
/// authorization.
pub async fn stream_signed(
    byte_range: Option<ByteRange>,
    State(state): State<ServerState>,
    Path(lecture_id): Path<String>,
    Query(params): Query<SignedStreamParams>,
) -> Result<Response, ApiError> {
    state
        .url_signer
        .verify(&lecture_id, params.expires, &params.signature)
        .map_err(|err| match err {
            SignatureError::Expired => ApiError::Forbidden("Signed URL has expired"),
            SignatureError::Invalid => ApiError::Forbidden("Invalid signature"),
        })?;

    let audio = state
        .catalog_store
        .get_lecture_audio(&lecture_id)?
        .ok_or(ApiError::NotFound)?;

    stream_audio(&state, audio, byte_range).await
}

async fn stream_audio(
    state: &ServerState,
    audio: LectureAudio,
    byte_range: Option<ByteRange>,
) -> Result<Response, ApiError> {
    debug!("Streaming lecture {}", audio.lecture_id);

    let object_size = match state.storage.object_size(&audio.object_key).await {
        Ok(size) => size,
        Err(StorageError::NotFound(key)) => {
            debug!("Lecture {} audio object {} missing", audio.lecture_id, key);
            return Err(ApiError::NotFound);
        }
        Err(err) => return Err(anyhow::Error::from(err).into()),
    };

    let resolved = resolve_range(
        byte_range,
        object_size,
        state.config.max_stream_chunk_bytes,
    )
    .map_err(|_| ApiError::RangeNotSatisfiable)?;

    // Count a play when delivery starts at the top of the file, not on
    // every seek chunk.
    if resolved.start == 0 {
        if let Err(err) = state.catalog_store.increment_play_count(&audio.lecture_id) {
            debug!(
                "Failed to bump play count for {}: {}",
                audio.lecture_id, err
            );
        }
        super::metrics::record_stream_started(audio.format.to_db_str());
    }

    let reader = match state
        .storage
        .read_range(&audio.object_key, resolved.start, resolved.len)
        .await
    {
        Ok(reader) => reader,
        Err(StorageError::NotFound(_)) => return Err(ApiError::NotFound),
        Err(err) => return Err(anyhow::Error::from(err).into()),
    };

    let stream = ReaderStream::with_capacity(reader, STREAM_BUFFER_SIZE);
    let body = Body::from_stream(stream);

    let status = if resolved.partial {
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };

    let mut builder = Response::builder()
        .status(status)
        .header("Content-Type", audio.format.mime_type())
        .header("Accept-Ranges", "bytes")
        .header("Content-Length", resolved.len);
    if resolved.partial {
        builder = builder.header(
            "Content-Range",
            format!(
                "bytes {}-{}/{}",
                resolved.start,
                resolved.start + resolved.len - 1,
                resolved.total
            ),
        );
    }

    Ok(builder.body(body).unwrap().into_response())
}
