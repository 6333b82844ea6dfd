// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! A store that uploads into S3.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_s3::primitives::ByteStream;
use std::fmt;
use thiserror::Error;

use super::ObjectStore;

/// Errors from [`S3Store`].
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum S3StoreError {
    /// The profile could not be opened as an upload body.
    #[error("io error reading profile: {0}")]
    Read(#[from] std::io::Error),
    /// S3 rejected the upload.
    #[error("failed to put profile into S3: {0}")]
    PutObject(aws_sdk_s3::Error),
}

/// A store for S3.
pub struct S3Store {
    s3_client: aws_sdk_s3::Client,
}

impl S3Store {
    /// Makes a new one for buckets in `region`, resolving credentials the way
    /// the AWS SDK does by default.
    pub async fn new(region: impl Into<String>) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.into()))
            .load()
            .await;
        Self::from_sdk_config(&sdk_config)
    }

    /// Makes a new one from an already loaded SDK config.
    pub fn from_sdk_config(sdk_config: &SdkConfig) -> Self {
        let s3_client_config = aws_sdk_s3::config::Builder::from(sdk_config).build();
        Self::from_client(aws_sdk_s3::Client::from_conf(s3_client_config))
    }

    /// Wraps an existing client.
    pub fn from_client(s3_client: aws_sdk_s3::Client) -> Self {
        S3Store { s3_client }
    }

    /// Region the client sends requests to.
    pub fn region(&self) -> Option<&str> {
        self.s3_client.config().region().map(|r| r.as_ref())
    }

    /// Uploads the artifact, streaming it from the file so it is never held
    /// in memory as a whole.
    pub async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: tokio::fs::File,
    ) -> Result<(), S3StoreError> {
        let body = ByteStream::read_from()
            .file(body)
            .build()
            .await
            .map_err(std::io::Error::other)?;

        tracing::debug!(message="uploading to s3", bucket=?bucket, key=?key, len=?body.size_hint());
        self.s3_client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .content_type("application/octet-stream")
            .send()
            .await
            .map_err(|x| S3StoreError::PutObject(x.into()))?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: tokio::fs::File,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.put_object(bucket, key, body)
            .await
            .map_err(|e| Box::new(e) as _)
    }
}

impl fmt::Debug for S3Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Store").finish()
    }
}
