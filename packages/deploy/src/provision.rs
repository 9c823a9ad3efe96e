//! Bucket gate: verify or create the target bucket, then optionally apply
//! static-hosting configuration.

use s3_deploy_models::{BucketState, DeploymentOptions, UnusableReason};

use crate::store::{ObjectStore, StoreError};

/// The bucket cannot be deployed to. Aborts the run before any upload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Bucket {bucket} is unusable ({reason}): {message}")]
pub struct ProvisioningError {
    /// Target bucket.
    pub bucket: String,
    /// Why the bucket is unusable.
    pub reason: UnusableReason,
    /// Underlying vendor error text.
    pub message: String,
}

impl ProvisioningError {
    /// Builds the error for an unusable [`BucketState`], or `None` when the
    /// state permits uploading.
    #[must_use]
    pub fn from_state(bucket: &str, state: &BucketState) -> Option<Self> {
        match state {
            BucketState::Exists | BucketState::Created => None,
            BucketState::Unusable { reason, message } => Some(Self {
                bucket: bucket.to_string(),
                reason: *reason,
                message: message.clone(),
            }),
        }
    }
}

/// What happened to the static-hosting step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostingOutcome {
    /// Static hosting was not requested.
    Skipped,
    /// The website configuration was applied.
    Applied,
    /// The store rejected the configuration. Not fatal.
    Failed(String),
}

/// Checks that the configured bucket is usable, creating it when it is
/// missing and creation is enabled.
pub async fn ensure_bucket(store: &dyn ObjectStore, options: &DeploymentOptions) -> BucketState {
    let bucket = &options.bucket;

    match store.head_bucket(bucket).await {
        Ok(()) => {
            log::info!("Bucket {bucket} exists");
            BucketState::Exists
        }
        Err(StoreError::AccessDenied { message }) => {
            log::error!("Access to bucket {bucket} denied: {message}");
            BucketState::Unusable {
                reason: UnusableReason::PermissionDenied,
                message,
            }
        }
        Err(StoreError::NotFound { message }) if !options.create_bucket => {
            log::error!("Bucket {bucket} does not exist and bucket creation is disabled");
            BucketState::Unusable {
                reason: UnusableReason::NotFound,
                message,
            }
        }
        Err(StoreError::NotFound { .. }) => {
            log::info!(
                "Bucket {bucket} not found, creating it in {} ({})",
                options.region,
                options.acl
            );
            match store
                .create_bucket(bucket, &options.region, options.acl)
                .await
            {
                Ok(()) => {
                    log::info!("Bucket {bucket} created");
                    BucketState::Created
                }
                Err(e) => {
                    log::error!("Failed to create bucket {bucket}: {e}");
                    BucketState::Unusable {
                        reason: UnusableReason::CreateFailed,
                        message: e.to_string(),
                    }
                }
            }
        }
        Err(e) => {
            log::error!("Failed to verify bucket {bucket}: {e}");
            BucketState::Unusable {
                reason: UnusableReason::VerificationFailed,
                message: e.to_string(),
            }
        }
    }
}

/// Applies the configured static-hosting settings, if any.
///
/// Failures are logged and reported as [`HostingOutcome::Failed`]; hosting
/// is a convenience setting and never blocks the upload.
pub async fn enable_static_hosting(
    store: &dyn ObjectStore,
    options: &DeploymentOptions,
) -> HostingOutcome {
    let Some(hosting) = &options.hosting else {
        return HostingOutcome::Skipped;
    };

    match store.put_bucket_website(&options.bucket, hosting).await {
        Ok(()) => {
            log::info!("Static hosting enabled on bucket {}", options.bucket);
            HostingOutcome::Applied
        }
        Err(e) => {
            log::error!(
                "Failed to enable static hosting on bucket {}: {e}",
                options.bucket
            );
            HostingOutcome::Failed(e.to_string())
        }
    }
}
