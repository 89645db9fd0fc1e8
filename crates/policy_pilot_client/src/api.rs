//! HTTP collaborators: category listing and document upload. Plain
//! request/response calls, outside the streaming protocol.

use std::path::Path;

use serde::Deserialize;

/// API call failure.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The server rejected the request (e.g. invalid category, not a PDF).
    #[error("{detail}")]
    Rejected { status: u16, detail: String },
    #[error("cannot read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    InvalidUpload(String),
}

#[derive(Debug, Deserialize)]
struct CategoriesResponse {
    categories: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RejectionBody {
    detail: String,
}

/// Receipt returned by a successful upload.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadReceipt {
    pub ok: bool,
    pub message: String,
    pub category: String,
    pub filename: String,
}

/// Client for the PolicyPilot HTTP API.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// `base_url` is e.g. `http://127.0.0.1:8000` (no trailing slash).
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// List the valid upload category identifiers.
    pub async fn list_categories(&self) -> Result<Vec<String>, ApiError> {
        let url = format!("{}/api/categories", self.base_url);
        let response = self.http.get(&url).send().await?;
        let response = check(response).await?;
        let body: CategoriesResponse = response.json().await?;
        Ok(body.categories)
    }

    /// Upload one policy document into `category`. The server validates the
    /// category and the PDF magic bytes; we pre-check what we can locally.
    pub async fn upload_document(
        &self,
        category: &str,
        path: &Path,
    ) -> Result<UploadReceipt, ApiError> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ApiError::InvalidUpload("file has no name".into()))?
            .to_string();
        if !filename.to_lowercase().ends_with(".pdf") {
            return Err(ApiError::InvalidUpload("a PDF file is required".into()));
        }
        let bytes = tokio::fs::read(path).await?;

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename)
            .mime_str("application/pdf")?;
        let form = reqwest::multipart::Form::new()
            .text("category", category.to_string())
            .part("file", part);

        let url = format!("{}/api/upload", self.base_url);
        let response = self.http.post(&url).multipart(form).send().await?;
        let response = check(response).await?;
        Ok(response.json().await?)
    }
}

/// Map non-2xx responses to `ApiError::Rejected`, extracting the server's
/// `detail` message when it sends one.
async fn check(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let detail = match response.json::<RejectionBody>().await {
        Ok(body) => body.detail,
        Err(_) => format!("server returned {}", status),
    };
    Err(ApiError::Rejected {
        status: status.as_u16(),
        detail,
    })
}
