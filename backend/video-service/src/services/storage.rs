/// Object store gateway
///
/// Uploads pipeline artifacts to durable storage and hands out both
/// permanently-public CDN URLs and short-lived presigned URLs. The S3 adapter
/// talks to AWS (or any S3-compatible endpoint such as MinIO); `MemoryStorage`
/// backs tests without network access.
use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::config::S3Config;
use crate::error::{AppError, Result};

/// Default presigned URL lifetime (1 hour)
pub const DEFAULT_SIGNED_URL_TTL_SECS: u64 = 3600;

/// Infer the upload content type from the object key's extension
pub fn content_type_for_key(key: &str) -> &'static str {
    match key.rsplit('.').next().map(|ext| ext.to_ascii_lowercase()) {
        Some(ext) if ext == "m3u8" => "application/vnd.apple.mpegurl",
        Some(ext) if ext == "ts" => "video/mp2t",
        Some(ext) if ext == "mp4" => "video/mp4",
        Some(ext) if ext == "webm" => "video/webm",
        Some(ext) if ext == "jpg" || ext == "jpeg" => "image/jpeg",
        Some(ext) if ext == "png" => "image/png",
        _ => "application/octet-stream",
    }
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Upload a local file; idempotent by key
    async fn upload_file(&self, local_path: &Path, key: &str) -> Result<String>;

    /// Upload an in-memory buffer; idempotent by key
    async fn upload_bytes(&self, bytes: Vec<u8>, key: &str) -> Result<String>;

    /// Fetch an object to a local path
    async fn download(&self, key: &str, dest: &Path) -> Result<()>;

    /// Time-boxed read URL
    async fn signed_url(&self, key: &str, ttl_secs: u64) -> Result<String>;

    /// Stable public URL: CDN-fronted when configured, raw store URL otherwise
    fn public_url(&self, key: &str) -> String;

    /// Remove an object; the caller decides whether missing-object is fatal
    async fn delete(&self, key: &str) -> Result<()>;
}

/// S3-backed implementation
pub struct S3Storage {
    client: Client,
    bucket: String,
    region: String,
    cdn_domain: Option<String>,
}

impl S3Storage {
    /// Build the AWS client from configuration
    ///
    /// Explicit credentials when provided, the default provider chain
    /// otherwise; an optional custom endpoint supports S3-compatible stores.
    pub async fn from_config(config: &S3Config, cdn_domain: Option<String>) -> Result<Self> {
        use aws_sdk_s3::config::Region;

        let mut aws_config_builder = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        if let (Some(access_key_id), Some(secret_access_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            use aws_sdk_s3::config::Credentials;

            let credentials = Credentials::new(
                access_key_id,
                secret_access_key,
                None,
                None,
                "video_service_s3",
            );
            aws_config_builder = aws_config_builder.credentials_provider(credentials);
        }

        if let Some(endpoint) = &config.endpoint {
            aws_config_builder = aws_config_builder.endpoint_url(endpoint);
        }

        let aws_config = aws_config_builder.load().await;

        Ok(Self {
            client: Client::new(&aws_config),
            bucket: config.bucket.clone(),
            region: config.region.clone(),
            cdn_domain,
        })
    }

    /// Verify bucket connectivity at startup
    ///
    /// Video publishing depends entirely on the object store; when this
    /// fails, the service should not start.
    pub async fn health_check(&self) -> Result<()> {
        match self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .max_keys(1)
            .send()
            .await
        {
            Ok(_) => {
                tracing::info!(
                    "S3 connection validated (bucket: {}, region: {})",
                    self.bucket,
                    self.region
                );
                Ok(())
            }
            Err(e) => {
                let error_msg = e.to_string();
                let guidance = if error_msg.contains("InvalidAccessKeyId") {
                    "Invalid AWS Access Key ID. Check AWS_ACCESS_KEY_ID."
                } else if error_msg.contains("SignatureDoesNotMatch") {
                    "Invalid AWS Secret Access Key. Check AWS_SECRET_ACCESS_KEY."
                } else if error_msg.contains("NoSuchBucket") {
                    "Bucket does not exist. Check S3_BUCKET."
                } else if error_msg.contains("AccessDenied") {
                    "Access denied. Ensure the IAM user/role has S3 permissions."
                } else {
                    "Ensure the S3 bucket is reachable and credentials are valid."
                };

                tracing::error!(
                    "S3 health check failed (bucket: {}): {}. {}",
                    self.bucket,
                    error_msg,
                    guidance
                );
                Err(AppError::Storage(format!(
                    "S3 health check failed: {}. {}",
                    error_msg, guidance
                )))
            }
        }
    }

    fn map_put_error(&self, e: impl std::fmt::Display) -> AppError {
        let error_msg = e.to_string();
        if error_msg.contains("403") || error_msg.contains("Forbidden") {
            AppError::Storage("S3 auth failed (403): check AWS credentials".to_string())
        } else if error_msg.contains("NoSuchBucket") {
            AppError::Storage(format!("S3 bucket not found: {}", self.bucket))
        } else {
            AppError::Storage(format!("S3 upload failed: {}", error_msg))
        }
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn upload_file(&self, local_path: &Path, key: &str) -> Result<String> {
        if !local_path.exists() {
            return Err(AppError::Storage(format!(
                "local file not found: {}",
                local_path.display()
            )));
        }

        let body = ByteStream::from_path(local_path).await.map_err(|e| {
            AppError::Storage(format!(
                "failed to read {}: {}",
                local_path.display(),
                e
            ))
        })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type_for_key(key))
            // Artifacts are immutable: keys are versioned by job id
            .cache_control("max-age=31536000")
            .send()
            .await
            .map_err(|e| self.map_put_error(e))?;

        Ok(key.to_string())
    }

    async fn upload_bytes(&self, bytes: Vec<u8>, key: &str) -> Result<String> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type_for_key(key))
            .cache_control("max-age=31536000")
            .send()
            .await
            .map_err(|e| self.map_put_error(e))?;

        Ok(key.to_string())
    }

    async fn download(&self, key: &str, dest: &Path) -> Result<()> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let error_msg = e.to_string();
                if error_msg.contains("NoSuchKey") || error_msg.contains("404") {
                    AppError::NotFound(format!("object not found: {}", key))
                } else {
                    AppError::Storage(format!("S3 download failed: {}", error_msg))
                }
            })?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| AppError::Storage(format!("failed to read S3 object body: {}", e)))?
            .into_bytes();

        tokio::fs::write(dest, &bytes).await?;
        Ok(())
    }

    async fn signed_url(&self, key: &str, ttl_secs: u64) -> Result<String> {
        let presigning_config = PresigningConfig::builder()
            .expires_in(Duration::from_secs(ttl_secs))
            .build()
            .map_err(|e| AppError::Storage(format!("failed to create presigning config: {e}")))?;

        let presigned_request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning_config)
            .await
            .map_err(|e| AppError::Storage(format!("failed to presign URL: {e}")))?;

        Ok(presigned_request.uri().to_string())
    }

    fn public_url(&self, key: &str) -> String {
        match &self.cdn_domain {
            Some(domain) => format!("https://{}/{}", domain.trim_end_matches('/'), key),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, self.region, key
            ),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let error_msg = e.to_string();
                if error_msg.contains("403") || error_msg.contains("Forbidden") {
                    AppError::Storage("S3 auth failed (403): check AWS credentials".to_string())
                } else {
                    AppError::Storage(format!("S3 delete failed: {}", error_msg))
                }
            })?;

        Ok(())
    }
}

/// In-memory object store for tests and local development
#[derive(Default)]
pub struct MemoryStorage {
    objects: RwLock<HashMap<String, Vec<u8>>>,
    cdn_domain: Option<String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cdn_domain(domain: &str) -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            cdn_domain: Some(domain.to_string()),
        }
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.objects.read().await.contains_key(key)
    }

    pub async fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.read().await.get(key).cloned()
    }

    pub async fn keys(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn upload_file(&self, local_path: &Path, key: &str) -> Result<String> {
        let bytes = tokio::fs::read(local_path).await?;
        self.objects.write().await.insert(key.to_string(), bytes);
        Ok(key.to_string())
    }

    async fn upload_bytes(&self, bytes: Vec<u8>, key: &str) -> Result<String> {
        self.objects.write().await.insert(key.to_string(), bytes);
        Ok(key.to_string())
    }

    async fn download(&self, key: &str, dest: &Path) -> Result<()> {
        let bytes = self
            .objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("object not found: {}", key)))?;
        tokio::fs::write(dest, &bytes).await?;
        Ok(())
    }

    async fn signed_url(&self, key: &str, ttl_secs: u64) -> Result<String> {
        if !self.objects.read().await.contains_key(key) {
            return Err(AppError::NotFound(format!("object not found: {}", key)));
        }
        Ok(format!(
            "{}?X-Expires={}",
            self.public_url(key),
            ttl_secs
        ))
    }

    fn public_url(&self, key: &str) -> String {
        match &self.cdn_domain {
            Some(domain) => format!("https://{}/{}", domain, key),
            None => format!("https://storage.test/{}", key),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        if self.objects.write().await.remove(key).is_none() {
            return Err(AppError::Storage(format!("NoSuchKey: {}", key)));
        }
        Ok(())
    }
}

/// True when a delete failure means the object was already gone
pub fn is_missing_object_error(err: &AppError) -> bool {
    match err {
        AppError::NotFound(_) => true,
        AppError::Storage(msg) => {
            msg.contains("404") || msg.contains("NotFound") || msg.contains("NoSuchKey")
        }
        _ => false,
    }
}
