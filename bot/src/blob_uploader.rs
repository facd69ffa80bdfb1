//! [`BlobUploader`] adapter streaming oversized files to an external
//! paste-host API (§4.8) via a plain `multipart/form-data` POST.

use async_trait::async_trait;
use reqwest::multipart;

use clipcore::error::TransportError;
use clipcore::ports::BlobUploader;

pub struct CatboxUploader {
    http: reqwest::Client,
    endpoint: String,
}

impl CatboxUploader {
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self { http, endpoint: endpoint.into() }
    }
}

#[async_trait]
impl BlobUploader for CatboxUploader {
    /// A single retry on network failure, per §4.8.
    async fn upload(&self, local_path: &str) -> Result<String, TransportError> {
        match self.try_upload(local_path).await {
            Ok(url) => Ok(url),
            Err(_) => self.try_upload(local_path).await,
        }
    }

    fn name(&self) -> &'static str {
        "catbox"
    }
}

impl CatboxUploader {
    async fn try_upload(&self, local_path: &str) -> Result<String, TransportError> {
        let bytes = tokio::fs::read(local_path).await.map_err(|e| TransportError::Send(e.to_string()))?;
        let file_name = std::path::Path::new(local_path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload.bin".to_string());

        let form = multipart::Form::new()
            .text("reqtype", "fileupload")
            .part("fileToUpload", multipart::Part::bytes(bytes).file_name(file_name));

        let response = self
            .http
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| TransportError::Send(e.to_string()))?;

        let url = response.text().await.map_err(|e| TransportError::Send(e.to_string()))?;
        let url = url.trim().to_string();
        if url.starts_with("http") {
            Ok(url)
        } else {
            Err(TransportError::Send(format!("upload host returned unexpected body: {url}")))
        }
    }
}
