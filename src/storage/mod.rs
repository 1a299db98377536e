use reqwest::Client;
use uuid::Uuid;

use crate::config::Config;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage rejected upload ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("storage unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Client for the hosted object storage (`/storage/v1`).
#[derive(Clone)]
pub struct StorageClient {
    http: Client,
    base_url: String,
    bucket: String,
    anon_key: String,
}

impl StorageClient {
    pub fn new(http: Client, config: &Config) -> Self {
        Self {
            http,
            base_url: format!("{}/storage/v1", config.provider_url),
            bucket: config.storage_bucket.clone(),
            anon_key: config.provider_anon_key.clone(),
        }
    }

    pub fn public_url(&self, path: &str) -> String {
        format!("{}/object/public/{}/{}", self.base_url, self.bucket, path)
    }

    /// Uploads one object on behalf of the signed-in user and returns its public URL.
    pub async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        access_token: &str,
    ) -> Result<String, StorageError> {
        let response = self
            .http
            .post(format!("{}/object/{}/{}", self.base_url, self.bucket, path))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header(reqwest::header::CACHE_CONTROL, "max-age=3600")
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!("Uploaded image to {}", path);
        Ok(self.public_url(path))
    }
}

/// `items/{user}/{millis}-{index}.{ext}`
pub fn object_path(user_id: Uuid, millis: i64, index: usize, ext: &str) -> String {
    format!("items/{}/{}-{}.{}", user_id, millis, index, ext)
}

/// File extension for an uploaded image, preferring the declared content type.
pub fn image_extension(content_type: &str, file_name: Option<&str>) -> Option<String> {
    let from_type = match content_type.to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/avif" => Some("avif"),
        "image/heic" => Some("heic"),
        _ => None,
    };
    if let Some(ext) = from_type {
        return Some(ext.to_string());
    }
    if !content_type.starts_with("image/") {
        return None;
    }
    file_name
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
}
