//! Serving bytes and files with `Last-Modified` conditional semantics.

use std::time::SystemTime;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;

use crate::error::Result;
use crate::workspace::FileDescriptor;

const HTTP_DATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// `Content-Disposition` for `name`. RFC 6266 §4.3 for downloads.
pub fn content_disposition(name: &str, inline: bool) -> HeaderValue {
    if inline {
        return HeaderValue::from_static("inline");
    }
    let value = format!("attachment; filename*=utf-8''{}", urlencoding::encode(name));
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

fn http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).format(HTTP_DATE).to_string()
}

fn parse_http_date(value: &HeaderValue) -> Option<i64> {
    let s = value.to_str().ok()?;
    DateTime::parse_from_rfc2822(s).ok().map(|t| t.timestamp())
}

fn unix_secs(time: SystemTime) -> i64 {
    DateTime::<Utc>::from(time).timestamp()
}

/// Evaluate conditional headers against `modified`, at one-second resolution.
fn precondition(headers: &HeaderMap, modified: SystemTime) -> Option<StatusCode> {
    let modified = unix_secs(modified);
    if let Some(since) = headers.get(header::IF_UNMODIFIED_SINCE).and_then(parse_http_date) {
        if modified > since {
            return Some(StatusCode::PRECONDITION_FAILED);
        }
    }
    if let Some(since) = headers.get(header::IF_MODIFIED_SINCE).and_then(parse_http_date) {
        if modified <= since {
            return Some(StatusCode::NOT_MODIFIED);
        }
    }
    None
}

fn mime_for_name(name: &str) -> String {
    mime_guess::from_path(name)
        .first()
        .map(|m| m.to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

fn builder(modified: SystemTime, mime: &str, len: u64) -> axum::http::response::Builder {
    Response::builder()
        .header(header::CONTENT_TYPE, mime)
        .header(header::CONTENT_LENGTH, len)
        .header(header::LAST_MODIFIED, http_date(modified))
}

fn short_circuit(status: StatusCode, modified: SystemTime) -> Response {
    let mut response = status.into_response();
    if status == StatusCode::NOT_MODIFIED {
        if let Ok(value) = HeaderValue::from_str(&http_date(modified)) {
            response.headers_mut().insert(header::LAST_MODIFIED, value);
        }
    }
    response
}

/// Serve generated preview bytes. The content type comes from the bytes
/// themselves, since a thumbnail of `a.png` may well be JPEG.
pub fn serve_bytes(
    name: &str,
    modified: SystemTime,
    bytes: Vec<u8>,
    headers: &HeaderMap,
) -> Response {
    if let Some(status) = precondition(headers, modified) {
        return short_circuit(status, modified);
    }
    let mime = image::guess_format(&bytes)
        .map(|f| f.to_mime_type().to_string())
        .unwrap_or_else(|_| mime_for_name(name));
    let len = bytes.len() as u64;
    builder(modified, &mime, len)
        .body(Body::from(bytes))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Stream a file from disk unmodified, as large as it was when `file` was taken.
pub async fn serve_file(file: &FileDescriptor, headers: &HeaderMap) -> Result<Response> {
    if let Some(status) = precondition(headers, file.modified) {
        return Ok(short_circuit(status, file.modified));
    }
    let fd = tokio::fs::File::open(&file.real_path).await?;
    let response = builder(file.modified, &mime_for_name(&file.name), file.size)
        .body(Body::from_stream(ReaderStream::new(fd.take(file.size))))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response());
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn with(name: header::HeaderName, time: SystemTime) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_str(&http_date(time)).unwrap());
        headers
    }

    #[test]
    fn disposition_inline_and_attachment() {
        assert_eq!(content_disposition("a b.png", true), "inline");
        assert_eq!(
            content_disposition("a b.png", false),
            "attachment; filename*=utf-8''a%20b.png"
        );
        assert_eq!(
            content_disposition("ñ.jpg", false),
            "attachment; filename*=utf-8''%C3%B1.jpg"
        );
    }

    #[test]
    fn http_date_format() {
        assert_eq!(http_date(at(1_445_412_480)), "Wed, 21 Oct 2015 07:28:00 GMT");
        let parsed = parse_http_date(&HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(parsed, Some(1_445_412_480));
    }

    #[test]
    fn not_modified_when_client_is_current() {
        let modified = at(1_700_000_000);
        let resp = serve_bytes(
            "a.jpg",
            modified,
            b"x".to_vec(),
            &with(header::IF_MODIFIED_SINCE, modified),
        );
        assert_eq!(resp.status(), StatusCode::NOT_MODIFIED);
        assert!(resp.headers().contains_key(header::LAST_MODIFIED));
    }

    #[test]
    fn full_response_when_client_is_stale() {
        let resp = serve_bytes(
            "a.txt",
            at(1_700_000_100),
            b"hello".to_vec(),
            &with(header::IF_MODIFIED_SINCE, at(1_700_000_000)),
        );
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/plain");
        assert_eq!(resp.headers()[header::CONTENT_LENGTH], "5");
    }

    #[test]
    fn precondition_failed_when_modified_after() {
        let resp = serve_bytes(
            "a.txt",
            at(1_700_000_100),
            b"hello".to_vec(),
            &with(header::IF_UNMODIFIED_SINCE, at(1_700_000_000)),
        );
        assert_eq!(resp.status(), StatusCode::PRECONDITION_FAILED);
    }

    #[test]
    fn garbage_conditional_header_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(header::IF_MODIFIED_SINCE, HeaderValue::from_static("yesterday"));
        let resp = serve_bytes("a.txt", at(10), b"x".to_vec(), &headers);
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn serve_file_streams_contents() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"raw bytes").unwrap();
        let ws = crate::workspace::Workspace::new(dir.path()).unwrap();
        let file = ws.describe("notes.txt").await.unwrap();

        let resp = serve_file(&file, &HeaderMap::new()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().contains_key(header::LAST_MODIFIED));
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"raw bytes");
    }

    #[tokio::test]
    async fn serve_file_sends_the_described_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        std::fs::write(&path, b"first").unwrap();
        let ws = crate::workspace::Workspace::new(dir.path()).unwrap();
        let file = ws.describe("log.txt").await.unwrap();
        std::fs::write(&path, b"first and then some").unwrap();

        let resp = serve_file(&file, &HeaderMap::new()).await.unwrap();
        assert_eq!(resp.headers()[header::CONTENT_LENGTH], "5");
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"first");
    }
}
