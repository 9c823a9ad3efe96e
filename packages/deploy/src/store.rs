//! Object-store seam.
//!
//! The provisioner and the upload pool only see [`ObjectStore`]; the S3
//! implementation lives in [`crate::s3`] and tests use an in-memory fake.

use async_trait::async_trait;
use s3_deploy_models::{CannedAcl, HostingConfig};

/// A classified object-store failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The bucket or object does not exist (HTTP 404).
    #[error("Not found: {message}")]
    NotFound {
        /// Vendor error text.
        message: String,
    },

    /// The caller is not allowed to perform the request (HTTP 403).
    #[error("Access denied: {message}")]
    AccessDenied {
        /// Vendor error text.
        message: String,
    },

    /// Any other transport, throttling, or service failure.
    #[error("{message}")]
    Other {
        /// Vendor error text.
        message: String,
    },

    /// Local I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single object write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutObject {
    /// Target bucket.
    pub bucket: String,
    /// Object key.
    pub key: String,
    /// Object contents.
    pub body: Vec<u8>,
    /// `Content-Type` header.
    pub content_type: &'static str,
    /// Object ACL.
    pub acl: CannedAcl,
    /// `Cache-Control` header, if any.
    pub cache_control: Option<&'static str>,
}

/// Operations the deployment needs from an object store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Checks that `bucket` exists and is accessible.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] or [`StoreError::AccessDenied`] for
    /// the two classified failures, [`StoreError::Other`] for the rest.
    async fn head_bucket(&self, bucket: &str) -> Result<(), StoreError>;

    /// Creates `bucket` in `region` with `acl`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the bucket cannot be created.
    async fn create_bucket(
        &self,
        bucket: &str,
        region: &str,
        acl: CannedAcl,
    ) -> Result<(), StoreError>;

    /// Replaces the website configuration of `bucket`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the configuration is rejected.
    async fn put_bucket_website(
        &self,
        bucket: &str,
        hosting: &HostingConfig,
    ) -> Result<(), StoreError>;

    /// Writes one object, overwriting any existing object at the key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails.
    async fn put_object(&self, object: PutObject) -> Result<(), StoreError>;
}
