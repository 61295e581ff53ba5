//! Client-side checks for files headed to `/upload`

use std::path::Path;

use log::debug;

use super::BackendError;

pub const PDF_MIME: &str = "application/pdf";

/// Declared MIME type, guessed from the file extension
#[must_use]
pub fn mime_for(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("pdf") => PDF_MIME,
        _ => "application/octet-stream",
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for UploadFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadFile")
            .field("name", &self.name)
            .field("mime", &self.mime)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

impl UploadFile {
    #[must_use]
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        let mime = mime_for(&name).to_string();
        Self { name, mime, bytes }
    }

    /// Read a local file for upload, checking type and size before reading it
    pub fn from_path(path: &Path, max_bytes: u64) -> Result<Self, BackendError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        check_mime(&name, mime_for(&name))?;
        let size = std::fs::metadata(path)?.len();
        check_size(size, max_bytes)?;

        let bytes = std::fs::read(path)?;
        debug!("Prepared {name} for upload ({size} bytes)");
        Ok(Self::new(name, bytes))
    }
}

fn check_mime(name: &str, mime: &str) -> Result<(), BackendError> {
    if mime == PDF_MIME {
        Ok(())
    } else {
        Err(BackendError::NotAPdf(name.to_string()))
    }
}

fn check_size(size: u64, limit: u64) -> Result<(), BackendError> {
    if size > limit {
        Err(BackendError::TooLarge { size, limit })
    } else {
        Ok(())
    }
}
