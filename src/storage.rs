use anyhow::Context;
use async_trait::async_trait;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    presigning::PresigningConfig,
    types::{CompletedMultipartUpload, CompletedPart},
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use bytes::Bytes;
use tracing::warn;

use crate::config::StorageConfig;

/// Bodies above this size go through S3 multipart upload, one part per chunk.
pub const PART_SIZE: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    pub transferred: u64,
    pub total: u64,
}

impl UploadProgress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.transferred as f64 / self.total as f64
    }
}

/// Receives progress ticks while an object is being written.
pub type ProgressFn<'a> = &'a (dyn Fn(UploadProgress) + Send + Sync);

#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
        progress: ProgressFn<'_>,
    ) -> anyhow::Result<()>;
    async fn delete_object(&self, key: &str) -> anyhow::Result<()>;
    /// Retrieval URL for a stored object.
    async fn object_url(&self, key: &str) -> anyhow::Result<String>;
    /// Keys under `prefix`, i.e. a directory listing.
    async fn list_prefix(&self, prefix: &str) -> anyhow::Result<Vec<String>>;
}

#[derive(Clone)]
pub struct Storage {
    client: Client,
    bucket: String,
    public_base_url: Option<String>,
    url_ttl_secs: u64,
}

impl Storage {
    pub async fn new(cfg: &StorageConfig) -> anyhow::Result<Self> {
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()))
            .credentials_provider(Credentials::new(
                &cfg.access_key,
                &cfg.secret_key,
                None,
                None,
                "static",
            ))
            .endpoint_url(&cfg.endpoint)
            .load()
            .await;

        let conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(&cfg.endpoint)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(conf),
            bucket: cfg.bucket.clone(),
            public_base_url: cfg.public_base_url.clone(),
            url_ttl_secs: cfg.url_ttl_secs,
        })
    }

    async fn put_multipart(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
        progress: ProgressFn<'_>,
    ) -> anyhow::Result<()> {
        let total = body.len() as u64;
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .context("s3 create_multipart_upload")?;
        let upload_id = created
            .upload_id()
            .context("s3 create_multipart_upload returned no upload id")?
            .to_string();

        let result = self
            .upload_parts(key, &upload_id, body, total, progress)
            .await;

        match result {
            Ok(parts) => {
                self.client
                    .complete_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .multipart_upload(
                        CompletedMultipartUpload::builder()
                            .set_parts(Some(parts))
                            .build(),
                    )
                    .send()
                    .await
                    .context("s3 complete_multipart_upload")?;
                Ok(())
            }
            Err(e) => {
                if let Err(abort) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    warn!(error = %abort, %key, "abort_multipart_upload failed");
                }
                Err(e)
            }
        }
    }

    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        body: Bytes,
        total: u64,
        progress: ProgressFn<'_>,
    ) -> anyhow::Result<Vec<CompletedPart>> {
        let mut parts = Vec::new();
        let mut offset = 0usize;
        let mut number = 1i32;
        while offset < body.len() {
            let end = (offset + PART_SIZE).min(body.len());
            let chunk = body.slice(offset..end);
            let out = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(number)
                .body(ByteStream::from(chunk))
                .send()
                .await
                .with_context(|| format!("s3 upload_part {number}"))?;
            parts.push(
                CompletedPart::builder()
                    .set_e_tag(out.e_tag().map(str::to_string))
                    .part_number(number)
                    .build(),
            );
            offset = end;
            number += 1;
            progress(UploadProgress {
                transferred: offset as u64,
                total,
            });
        }
        Ok(parts)
    }
}

#[async_trait]
impl StorageClient for Storage {
    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
        progress: ProgressFn<'_>,
    ) -> anyhow::Result<()> {
        let total = body.len() as u64;
        progress(UploadProgress {
            transferred: 0,
            total,
        });
        if body.len() > PART_SIZE {
            return self.put_multipart(key, body, content_type, progress).await;
        }
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .context("s3 put_object")?;
        progress(UploadProgress {
            transferred: total,
            total,
        });
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("s3 delete_object")?;
        Ok(())
    }

    async fn object_url(&self, key: &str) -> anyhow::Result<String> {
        if let Some(base) = &self.public_base_url {
            return Ok(format!("{base}/{key}"));
        }
        let req = self.client.get_object().bucket(&self.bucket).key(key);
        let presigned = req
            .presigned(PresigningConfig::expires_in(
                std::time::Duration::from_secs(self.url_ttl_secs),
            )?)
            .await
            .context("s3 presign_get")?;
        Ok(presigned.uri().to_string())
    }

    async fn list_prefix(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let out = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(token.take())
                .send()
                .await
                .context("s3 list_objects_v2")?;
            keys.extend(
                out.contents()
                    .iter()
                    .filter_map(|o| o.key().map(str::to_string)),
            );
            match out.next_continuation_token() {
                Some(next) if out.is_truncated().unwrap_or(false) => {
                    token = Some(next.to_string())
                }
                _ => break,
            }
        }
        Ok(keys)
    }
}
