// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! A store that persists into a directory.

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use super::ObjectStore;

/// Errors from [`LocalStore`].
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum LocalStoreError {
    /// Writing the object failed.
    #[error("io error writing {path:?}: {source}")]
    Io {
        /// The object being written.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },
    /// The bucket or key would write outside of the store directory.
    #[error("key {0:?} escapes the store directory")]
    InvalidKey(String),
}

/// A store that writes objects into a directory, as `{directory}/{bucket}/{key}`.
///
/// Useful when running outside of AWS, where there is no bucket to upload to.
#[derive(Debug)]
pub struct LocalStore {
    directory: PathBuf,
}

impl LocalStore {
    /// Instantiate a new LocalStore writing into the provided directory.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        LocalStore {
            directory: directory.into(),
        }
    }

    async fn write_object(
        &self,
        bucket: &str,
        key: &str,
        mut body: tokio::fs::File,
    ) -> Result<(), LocalStoreError> {
        // ARNs contain `:`, which is fine, but `..` components are not
        if key.split('/').any(|c| c == "..") || bucket.contains('/') || bucket == ".." {
            return Err(LocalStoreError::InvalidKey(format!("{bucket}/{key}")));
        }
        let path = self.directory.join(bucket).join(key);
        let io_err = |source: std::io::Error| LocalStoreError::Io {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tracing::debug!(message = "writing object", path = ?path);
        let mut out = tokio::fs::File::create(&path).await.map_err(io_err)?;
        tokio::io::copy(&mut body, &mut out).await.map_err(io_err)?;
        out.flush().await.map_err(io_err)?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: tokio::fs::File,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.write_object(bucket, key, body)
            .await
            .map_err(|e| Box::new(e) as _)
    }
}
