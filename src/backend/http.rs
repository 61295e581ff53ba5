use std::time::Duration;

use log::{debug, info, warn};
use reqwest::Url;
use reqwest::blocking::{Client, Response, multipart};

use super::{
    Backend, BackendError, QueryRequest, SaveAnnotationsRequest, UploadFile, UploadReceipt,
    parse_document_response, parse_query_response, parse_save_response, parse_upload_response,
};

/// Blocking HTTP client for the backend.
///
/// Keeps a cookie store so `/get_pdf` sees the session `/upload` created.
pub struct HttpBackend {
    client: Client,
    base: Url,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BackendError> {
        let mut normalized = base_url.trim().to_string();
        if !normalized.ends_with('/') {
            normalized.push('/');
        }
        let base = Url::parse(&normalized)
            .map_err(|e| BackendError::Network(format!("invalid backend url {base_url}: {e}")))?;

        let client = Client::builder()
            .cookie_store(true)
            .timeout(timeout)
            .user_agent(concat!("marginalia/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(network)?;

        Ok(Self { client, base })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.base
            .join(path)
            .map_err(|e| BackendError::Network(e.to_string()))
    }

    fn read_text(response: Response) -> Result<(u16, String), BackendError> {
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
        Ok((status, body))
    }
}

fn network(e: reqwest::Error) -> BackendError {
    warn!("Backend request failed: {e}");
    BackendError::Network(e.to_string())
}

impl Backend for HttpBackend {
    fn ask(&self, query: &str) -> Result<String, BackendError> {
        let url = self.endpoint("gpt")?;
        debug!("POST {url} ({} chars)", query.len());
        let response = self
            .client
            .post(url)
            .json(&QueryRequest { query })
            .send()
            .map_err(network)?;
        let (status, body) = Self::read_text(response)?;
        parse_query_response(status, &body)
    }

    fn upload(&self, file: &UploadFile) -> Result<UploadReceipt, BackendError> {
        let url = self.endpoint("upload")?;
        info!("Uploading {} ({} bytes) to {url}", file.name, file.bytes.len());

        let part = multipart::Part::bytes(file.bytes.clone())
            .file_name(file.name.clone())
            .mime_str(&file.mime)
            .map_err(|e| BackendError::NotAPdf(format!("{}: {e}", file.name)))?;
        let form = multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .map_err(network)?;
        let (status, body) = Self::read_text(response)?;
        parse_upload_response(status, &body)
    }

    fn fetch_document(&self) -> Result<Vec<u8>, BackendError> {
        let url = self.endpoint("get_pdf")?;
        debug!("GET {url}");
        let response = self.client.get(url).send().map_err(network)?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
        parse_document_response(status, body.to_vec())
    }

    fn save_annotations(&self, payload: &SaveAnnotationsRequest) -> Result<(), BackendError> {
        let url = self.endpoint("save_annotation")?;
        info!(
            "Saving {} annotation(s) to {url}",
            payload.annotations.len()
        );
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .map_err(network)?;
        let (status, body) = Self::read_text(response)?;
        parse_save_response(status, &body)
    }
}
