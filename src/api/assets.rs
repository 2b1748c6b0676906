// `/assets/thumbnail`, `/assets/face`, `/assets/video` (spec §6, §9): safe,
// path-validated file serving. Every path served here is resolved from a
// database row, never from a client-supplied path directly — the face
// endpoint additionally checks the resolved path is contained within the
// faces directory, and the video endpoint checks the item is a registered
// row, per the spec's "data-root path validation for asset endpoints"
// redesign note.

use super::{ApiResult, AppState};
use crate::error::EngineError;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

#[derive(Deserialize)]
pub struct ThumbnailQuery {
    frame_id: i64,
}

pub async fn thumbnail(State(state): State<AppState>, Query(q): Query<ThumbnailQuery>) -> ApiResult<Response> {
    let conn = crate::store::open_db(&state.config.data_root)?;
    let frame = crate::store::schema::get_frame(&conn, q.frame_id)?
        .ok_or_else(|| EngineError::NotFound(format!("frame {}", q.frame_id)))?;
    let path = frame.thumbnail_path.ok_or_else(|| EngineError::NotFound("thumbnail not generated yet".into()))?;
    serve_file_within(Path::new(&path), &state.config.thumbs_dir()).await
}

#[derive(Deserialize)]
pub struct FaceQuery {
    face_id: i64,
}

pub async fn face(State(state): State<AppState>, Query(q): Query<FaceQuery>) -> ApiResult<Response> {
    let conn = crate::store::open_db(&state.config.data_root)?;
    let face = crate::store::schema::get_face(&conn, q.face_id)?
        .ok_or_else(|| EngineError::FaceNotFound(q.face_id))?;
    let path = face.crop_path.ok_or_else(|| EngineError::NotFound("face crop not generated yet".into()))?;
    serve_file_within(Path::new(&path), &state.config.faces_dir()).await
}

/// Serve a file whose canonical path must fall within `root`. Used for
/// thumbnails and face crops, both of which are only ever written under
/// their respective data-root subdirectories (spec §9): a path that escapes
/// `root` (a stale row, a tampered value) is rejected rather than served.
async fn serve_file_within(path: &Path, root: &Path) -> ApiResult<Response> {
    let canonical = tokio::fs::canonicalize(path)
        .await
        .map_err(|_| EngineError::NotFound(format!("asset file missing: {}", path.display())))?;
    let canonical_root = tokio::fs::canonicalize(root)
        .await
        .map_err(|_| EngineError::Other("asset root directory missing".into()))?;
    if !canonical.starts_with(&canonical_root) {
        return Err(EngineError::InvalidPath(format!("{} is outside {}", path.display(), root.display())).into());
    }

    let bytes = tokio::fs::read(&canonical).await.map_err(EngineError::Io)?;
    let content_type = mime_guess::from_path(&canonical).first_or_octet_stream();
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, HeaderValue::from_str(content_type.as_ref()).unwrap())],
        bytes,
    )
        .into_response())
}

#[derive(Deserialize)]
pub struct VideoQuery {
    item_id: i64,
}

/// Stream the original media file for a registered Item, honoring `Range`
/// requests (spec §6 table) so the web shell's `<video>` element can seek
/// without downloading the whole file.
pub async fn video(
    State(state): State<AppState>,
    Query(q): Query<VideoQuery>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let conn = crate::store::open_db(&state.config.data_root)?;
    let item = crate::store::schema::get_item(&conn, q.item_id)?.ok_or(EngineError::ItemNotFound(q.item_id))?;
    let library = crate::store::schema::get_library(&conn, item.library_id)?
        .ok_or(EngineError::LibraryNotFound(item.library_id))?;
    let full_path: PathBuf = Path::new(&library.path).join(&item.path);

    let mut file = tokio::fs::File::open(&full_path)
        .await
        .map_err(|_| EngineError::FileNotFound(full_path.display().to_string()))?;
    let file_len = file.metadata().await.map_err(EngineError::Io)?.len();
    let content_type = mime_guess::from_path(&full_path).first_or_octet_stream();

    let range = headers.get(header::RANGE).and_then(|v| v.to_str().ok()).and_then(parse_range);

    match range {
        Some((start, end)) if start < file_len => {
            let end = end.min(file_len.saturating_sub(1));
            let len = end - start + 1;
            file.seek(std::io::SeekFrom::Start(start)).await.map_err(EngineError::Io)?;
            let mut buf = vec![0u8; len as usize];
            file.read_exact(&mut buf).await.map_err(EngineError::Io)?;

            Ok((
                StatusCode::PARTIAL_CONTENT,
                [
                    (header::CONTENT_TYPE, HeaderValue::from_str(content_type.as_ref()).unwrap()),
                    (header::CONTENT_RANGE, HeaderValue::from_str(&format!("bytes {}-{}/{}", start, end, file_len)).unwrap()),
                    (header::ACCEPT_RANGES, HeaderValue::from_static("bytes")),
                ],
                Body::from(buf),
            )
                .into_response())
        }
        _ => Ok((
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, HeaderValue::from_str(content_type.as_ref()).unwrap()),
                (header::ACCEPT_RANGES, HeaderValue::from_static("bytes")),
            ],
            Body::from_stream(tokio_util_reader_stream(file)),
        )
            .into_response()),
    }
}

/// Parse a single-range `Range: bytes=start-end` header. Multi-range
/// requests aren't produced by any real `<video>` client, so they fall back
/// to a full 200 response rather than being rejected.
fn parse_range(header: &str) -> Option<(u64, u64)> {
    let spec = header.strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    let start: u64 = start.parse().ok()?;
    let end: u64 = if end.is_empty() { u64::MAX } else { end.parse().ok()? };
    Some((start, end))
}

fn tokio_util_reader_stream(file: tokio::fs::File) -> impl futures_util::Stream<Item = std::io::Result<bytes::Bytes>> {
    use futures_util::StreamExt;
    tokio_stream::wrappers::ReceiverStream::new({
        let (tx, rx) = tokio::sync::mpsc::channel::<std::io::Result<bytes::Bytes>>(4);
        tokio::spawn(async move {
            let mut file = file;
            let mut buf = vec![0u8; 64 * 1024];
            loop {
                match tokio::io::AsyncReadExt::read(&mut file, &mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(Ok(bytes::Bytes::copy_from_slice(&buf[..n]))).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        break;
                    }
                }
            }
        });
        rx
    })
    .boxed()
}
