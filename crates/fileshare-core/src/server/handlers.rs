use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use log::{debug, info};
use std::fmt::Write;
use std::sync::Arc;
use tokio_util::io::ReaderStream;

use crate::server::{ApiError, AppState};

pub(crate) async fn index() -> &'static str {
    "File Server is running!"
}

pub(crate) async fn list_files(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<String>>, ApiError> {
    let catalog = state.catalog.clone();
    let names = tokio::task::spawn_blocking(move || catalog.list_all()).await??;
    debug!("Listing {} files", names.len());
    Ok(Json(names))
}

pub(crate) async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, &'static str), ApiError> {
    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }

        let name = field.file_name().unwrap_or_default().to_string();
        let mut pending = state.uploads.begin(&name).await?;

        loop {
            match field.chunk().await {
                Ok(Some(chunk)) => {
                    if let Err(e) = pending.write(&chunk).await {
                        pending.abort().await;
                        return Err(e.into());
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    pending.abort().await;
                    return Err(e.into());
                }
            }
        }

        let size = pending.written();
        let path = pending.commit().await?;

        let catalog = state.catalog.clone();
        let record =
            tokio::task::spawn_blocking(move || catalog.insert_if_absent(&name, &path)).await??;

        info!("Uploaded {} ({} bytes)", record.name, size);
        return Ok((StatusCode::CREATED, "File uploaded successfully"));
    }

    Err(ApiError::BadRequest("No file provided".to_string()))
}

pub(crate) async fn download(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    let (file, len) = state.uploads.open(&filename).await?;

    info!("Download request for {}", filename);

    let content_type = mime_guess::from_path(&filename)
        .first_or_octet_stream()
        .to_string();
    let headers = [
        (header::CONTENT_TYPE, content_type),
        (header::CONTENT_DISPOSITION, content_disposition(&filename)),
        (header::CONTENT_LENGTH, len.to_string()),
    ];
    let body = Body::from_stream(ReaderStream::new(file));

    Ok((headers, body).into_response())
}

/// `attachment` 头，非 ASCII 文件名使用 RFC 5987 编码
fn content_disposition(filename: &str) -> String {
    let plain = filename
        .chars()
        .all(|c| c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\');
    if plain {
        return format!("attachment; filename=\"{filename}\"");
    }

    let mut encoded = String::with_capacity(filename.len() * 3);
    for byte in filename.bytes() {
        if byte.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&byte) {
            encoded.push(byte as char);
        } else {
            let _ = write!(encoded, "%{byte:02X}");
        }
    }
    format!("attachment; filename*=UTF-8''{encoded}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_disposition() {
        assert_eq!(
            content_disposition("a b.txt"),
            "attachment; filename=\"a b.txt\""
        );
    }

    #[test]
    fn test_unicode_disposition() {
        assert_eq!(
            content_disposition("é.txt"),
            "attachment; filename*=UTF-8''%C3%A9.txt"
        );
    }

    #[test]
    fn test_quote_is_encoded() {
        assert_eq!(
            content_disposition("a\"b"),
            "attachment; filename*=UTF-8''a%22b"
        );
    }
}
