use crate::config::S3Config;
use crate::error::FunctionError;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use tracing::{debug, info, instrument};

/// Object storage for mirrored gallery images
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `body` at `path`. With `overwrite` off, an existing object
    /// at the same path makes the upload fail instead of replacing it.
    async fn upload(
        &self,
        path: &str,
        body: Bytes,
        content_type: &str,
        overwrite: bool,
    ) -> Result<(), FunctionError>;

    /// Publicly resolvable URL for an object path
    fn public_url(&self, path: &str) -> String;
}

/// S3 uploader for gallery images
pub struct S3Uploader {
    client: S3Client,
    bucket: String,
    public_base: String,
}

impl S3Uploader {
    /// Create a new S3 uploader
    pub async fn new(config: &S3Config) -> anyhow::Result<Self> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            bucket = %config.bucket,
            region = %config.region,
            "S3 uploader initialized"
        );

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            public_base: config.public_base(),
        })
    }
}

#[async_trait]
impl ObjectStore for S3Uploader {
    #[instrument(skip(self, body), fields(size_bytes = body.len()))]
    async fn upload(
        &self,
        path: &str,
        body: Bytes,
        content_type: &str,
        overwrite: bool,
    ) -> Result<(), FunctionError> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .body(ByteStream::from(body))
            .content_type(content_type);

        // Conditional write: S3 rejects the PUT if the key already exists
        if !overwrite {
            request = request.if_none_match("*");
        }

        request
            .send()
            .await
            .map_err(|e| FunctionError::Upload(DisplayErrorContext(&e).to_string()))?;

        debug!(key = %path, "Object uploaded");
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.public_base, path.trim_start_matches('/'))
    }
}

/// Sanitize a path component to prevent path traversal
pub fn sanitize_path_component(component: &str) -> String {
    component
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}
