//! CDN cache invalidation.
//!
//! One invalidation batch is created per run, covering every configured
//! path matcher. The result (id + status) is reported; the invalidation is
//! neither retried nor polled to completion.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_cloudfront::error::{DisplayErrorContext, ProvideErrorMetadata as _};
use aws_sdk_cloudfront::operation::RequestId as _;
use aws_sdk_cloudfront::types::{InvalidationBatch, Paths};
use s3_deploy_models::{CdnOptions, InvalidationRequest, InvalidationResult};

/// A failed invalidation request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "Invalidation of {distribution_id} failed: {message} (code: {}, request id: {})",
    .code.as_deref().unwrap_or("unknown"),
    .request_id.as_deref().unwrap_or("unknown")
)]
pub struct CdnError {
    /// Distribution the request targeted.
    pub distribution_id: String,
    /// Vendor error code, if the service returned one.
    pub code: Option<String>,
    /// Human-readable error message.
    pub message: String,
    /// Vendor request id, if the service returned one.
    pub request_id: Option<String>,
}

/// Issues invalidation requests to a CDN.
#[async_trait]
pub trait CdnClient: Send + Sync {
    /// Submits `request` and returns what the CDN reported.
    ///
    /// # Errors
    ///
    /// Returns [`CdnError`] if the CDN rejects the request or cannot be
    /// reached.
    async fn create_invalidation(
        &self,
        request: &InvalidationRequest,
    ) -> Result<InvalidationResult, CdnError>;
}

/// [`CdnClient`] backed by `aws-sdk-cloudfront`.
pub struct CloudFrontCdn {
    client: aws_sdk_cloudfront::Client,
}

impl CloudFrontCdn {
    /// Creates a client from a resolved SDK config.
    #[must_use]
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: aws_sdk_cloudfront::Client::new(sdk_config),
        }
    }
}

#[async_trait]
impl CdnClient for CloudFrontCdn {
    async fn create_invalidation(
        &self,
        request: &InvalidationRequest,
    ) -> Result<InvalidationResult, CdnError> {
        let local_error = |message: String| CdnError {
            distribution_id: request.distribution_id.clone(),
            code: None,
            message,
            request_id: None,
        };

        let quantity = i32::try_from(request.paths.len())
            .map_err(|_| local_error("too many invalidation paths".to_string()))?;

        let paths = Paths::builder()
            .quantity(quantity)
            .set_items(Some(request.paths.clone()))
            .build()
            .map_err(|e| local_error(e.to_string()))?;

        let batch = InvalidationBatch::builder()
            .paths(paths)
            .caller_reference(&request.caller_reference)
            .build()
            .map_err(|e| local_error(e.to_string()))?;

        let output = self
            .client
            .create_invalidation()
            .distribution_id(&request.distribution_id)
            .invalidation_batch(batch)
            .send()
            .await
            .map_err(|err| {
                let service = err.as_service_error();
                CdnError {
                    distribution_id: request.distribution_id.clone(),
                    code: service.and_then(|e| e.code()).map(str::to_string),
                    message: service
                        .and_then(|e| e.message())
                        .map_or_else(|| DisplayErrorContext(&err).to_string(), str::to_string),
                    request_id: service.and_then(|e| e.request_id()).map(str::to_string),
                }
            })?;

        let invalidation = output
            .invalidation()
            .ok_or_else(|| local_error("response did not include an invalidation".to_string()))?;

        Ok(InvalidationResult {
            id: invalidation.id().to_string(),
            status: invalidation.status().to_string(),
            caller_reference: request.caller_reference.clone(),
        })
    }
}

/// Per-process counter appended to caller references.
static CALLER_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Builds a caller reference unique to this invalidation call: the current
/// time in milliseconds plus a per-process sequence number.
#[must_use]
pub fn caller_reference() -> String {
    let seq = CALLER_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("s3-deploy-{}-{seq}", chrono::Utc::now().timestamp_millis())
}

/// Invalidates the configured matchers on the configured distribution.
///
/// # Errors
///
/// Returns [`CdnError`] if the request fails. Callers decide whether that
/// is fatal.
pub async fn invalidate(
    client: &dyn CdnClient,
    options: &CdnOptions,
) -> Result<InvalidationResult, CdnError> {
    let request = InvalidationRequest::new(options, caller_reference());

    log::info!(
        "Invalidating {} path(s) on distribution {}: {}",
        request.paths.len(),
        request.distribution_id,
        request.paths.join(", ")
    );

    let result = client.create_invalidation(&request).await?;

    log::info!("Invalidation {} created ({})", result.id, result.status);

    Ok(result)
}
