//! Backend Q&A / document service contracts
//!
//! The service itself is external. This module owns the wire format and the
//! `Backend` seam; `HttpBackend` is the real client.

mod http;
mod upload;

use serde::{Deserialize, Serialize};

use crate::annotations::{Annotation, AnnotationStore};

pub use http::HttpBackend;
pub use upload::{PDF_MIME, UploadFile, mime_for};

/// Fallback shown when a failed save carries no message
pub const SAVE_FAILED_MESSAGE: &str = "Error saving annotations.";

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Please upload a PDF file ({0} is not application/pdf)")]
    NotAPdf(String),

    #[error("file is too large: {size} bytes (limit {limit})")]
    TooLarge { size: u64, limit: u64 },

    #[error("could not read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("network error: {0}")]
    Network(String),

    #[error("{0}")]
    Server(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Serialize)]
pub struct QueryRequest<'a> {
    pub query: &'a str,
}

#[derive(Debug, Default, Deserialize)]
pub struct QueryResponse {
    pub response: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub success: bool,
    pub error: Option<String>,
    pub filename: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SaveResponse {
    #[serde(default)]
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// Position as the backend stores it
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WirePosition {
    pub x: f32,
    pub y: f32,
    #[serde(rename = "pageNum")]
    pub page_num: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub text: String,
    pub comment: String,
    pub position: WirePosition,
}

impl From<&Annotation> for AnnotationRecord {
    fn from(annotation: &Annotation) -> Self {
        Self {
            text: annotation.text.clone(),
            comment: annotation.comment.clone(),
            position: WirePosition {
                x: annotation.position.x,
                y: annotation.position.y,
                page_num: annotation.position.page,
            },
        }
    }
}

/// Body of `POST /save_annotation`: the whole store, every time
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SaveAnnotationsRequest {
    pub annotations: Vec<AnnotationRecord>,
}

impl From<&AnnotationStore> for SaveAnnotationsRequest {
    fn from(store: &AnnotationStore) -> Self {
        Self {
            annotations: store.all().iter().map(AnnotationRecord::from).collect(),
        }
    }
}

/// What the backend said about an accepted upload
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadReceipt {
    pub filename: Option<String>,
}

/// The four backend operations.
///
/// Calls block; the terminal app runs them off the UI thread.
pub trait Backend: Send + Sync {
    /// `POST /gpt`
    fn ask(&self, query: &str) -> Result<String, BackendError>;

    /// `POST /upload`
    fn upload(&self, file: &UploadFile) -> Result<UploadReceipt, BackendError>;

    /// `GET /get_pdf` - the document uploaded in this backend session
    fn fetch_document(&self) -> Result<Vec<u8>, BackendError>;

    /// `POST /save_annotation`
    fn save_annotations(&self, payload: &SaveAnnotationsRequest) -> Result<(), BackendError>;
}

fn generic_failure(status: u16) -> String {
    format!("Request failed with status {status}")
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Server-supplied `{error}` message of a failed response, if any
#[must_use]
pub fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .filter(|e| !e.trim().is_empty())
}

fn server_error(status: u16, body: &str) -> BackendError {
    BackendError::Server(error_message(body).unwrap_or_else(|| generic_failure(status)))
}

fn decode<'a, T: Deserialize<'a>>(body: &'a str) -> Result<T, BackendError> {
    serde_json::from_str(body).map_err(|e| BackendError::InvalidResponse(e.to_string()))
}

pub fn parse_query_response(status: u16, body: &str) -> Result<String, BackendError> {
    if !is_success(status) {
        return Err(server_error(status, body));
    }
    let parsed: QueryResponse = decode(body)?;
    match (parsed.response, parsed.error) {
        (Some(response), _) => Ok(response),
        (None, Some(error)) => Err(BackendError::Server(error)),
        (None, None) => Err(BackendError::InvalidResponse(
            "missing `response` field".to_string(),
        )),
    }
}

pub fn parse_upload_response(status: u16, body: &str) -> Result<UploadReceipt, BackendError> {
    if !is_success(status) {
        return Err(server_error(status, body));
    }
    let parsed: UploadResponse = decode(body)?;
    if parsed.success {
        Ok(UploadReceipt {
            filename: parsed.filename,
        })
    } else {
        Err(BackendError::Server(
            parsed.error.unwrap_or_else(|| generic_failure(status)),
        ))
    }
}

pub fn parse_save_response(status: u16, body: &str) -> Result<(), BackendError> {
    if !is_success(status) {
        return Err(BackendError::Server(
            error_message(body).unwrap_or_else(|| SAVE_FAILED_MESSAGE.to_string()),
        ));
    }
    let parsed: SaveResponse = decode(body)?;
    if parsed.success {
        Ok(())
    } else {
        Err(BackendError::Server(
            parsed
                .error
                .unwrap_or_else(|| SAVE_FAILED_MESSAGE.to_string()),
        ))
    }
}

/// Turn a `/get_pdf` response into document bytes
pub fn parse_document_response(status: u16, body: Vec<u8>) -> Result<Vec<u8>, BackendError> {
    if is_success(status) {
        return Ok(body);
    }
    let text = String::from_utf8_lossy(&body);
    Err(server_error(status, &text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::{HighlightMatching, Selection};
    use crate::geometry::{ScreenPoint, ScreenRect};

    #[test]
    fn payload_uses_page_num_key() {
        let mut store = AnnotationStore::new(HighlightMatching::Text);
        let selection = Selection {
            text: "Foo".to_string(),
            rect: ScreenRect::new(100.0, 50.0, 20.0, 10.0),
            surface: ScreenPoint::new(0.0, 0.0),
        };
        let id = store
            .create_from_selection(&selection, 1, 2.0)
            .unwrap()
            .unwrap();
        store.edit_comment(id, "note".to_string()).unwrap();
        store.create_blank(2);

        let payload = SaveAnnotationsRequest::from(&store);
        let json: serde_json::Value = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "annotations": [
                    {"text": "Foo", "comment": "note", "position": {"x": 50.0, "y": 25.0, "pageNum": 1}},
                    {"text": "New bullet point", "comment": "", "position": {"x": 0.0, "y": 0.0, "pageNum": 2}}
                ]
            })
        );
    }

    #[test]
    fn query_answer_and_server_errors() {
        assert_eq!(
            parse_query_response(200, r#"{"response": "42"}"#).unwrap(),
            "42"
        );

        let err = parse_query_response(400, r#"{"error": "No query provided"}"#).unwrap_err();
        assert_eq!(err.to_string(), "No query provided");

        let err = parse_query_response(502, "<html>bad gateway</html>").unwrap_err();
        assert_eq!(err.to_string(), "Request failed with status 502");

        assert!(matches!(
            parse_query_response(200, "not json"),
            Err(BackendError::InvalidResponse(_))
        ));
    }

    #[test]
    fn upload_reports_server_message() {
        let receipt =
            parse_upload_response(200, r#"{"success": true, "filename": "a.pdf"}"#).unwrap();
        assert_eq!(receipt.filename.as_deref(), Some("a.pdf"));

        let err = parse_upload_response(400, r#"{"error": "File type not allowed"}"#).unwrap_err();
        assert_eq!(err.to_string(), "File type not allowed");
    }

    #[test]
    fn save_failure_falls_back_to_generic_message() {
        parse_save_response(200, r#"{"success": true}"#).unwrap();

        let err = parse_save_response(200, r#"{"success": false}"#).unwrap_err();
        assert_eq!(err.to_string(), SAVE_FAILED_MESSAGE);

        let err = parse_save_response(500, "").unwrap_err();
        assert_eq!(err.to_string(), SAVE_FAILED_MESSAGE);
    }

    #[test]
    fn missing_document_is_a_server_error() {
        let bytes = parse_document_response(200, b"%PDF-1.4".to_vec()).unwrap();
        assert_eq!(bytes, b"%PDF-1.4");

        let err =
            parse_document_response(404, br#"{"error": "No file uploaded"}"#.to_vec()).unwrap_err();
        assert_eq!(err.to_string(), "No file uploaded");
    }
}
