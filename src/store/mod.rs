// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Destinations profiles are persisted to.

use std::fmt;

use async_trait::async_trait;

pub mod local;
#[cfg(feature = "s3-no-defaults")]
pub mod s3;

/// Abstraction around the durable store profiles are persisted to.
///
/// The store takes ownership of the open artifact, so it is closed as soon as
/// the store is done with it, whether or not the write succeeded.
#[async_trait]
pub trait ObjectStore: fmt::Debug {
    /// Write `body` under `key` in `bucket`.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: tokio::fs::File,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}
