//! [`ObjectStore`] backed by `aws-sdk-s3`.
//!
//! Objects above [`MULTIPART_THRESHOLD`] are sent as multipart uploads of
//! [`PART_SIZE`] parts, at most [`MAX_CONCURRENT_PARTS`] in flight per
//! object. A failed multipart upload is aborted so no orphaned parts are
//! left billing in the bucket.

use std::future::Future;

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::operation::create_bucket::CreateBucketError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketCannedAcl, BucketLocationConstraint, CompletedMultipartUpload, CompletedPart, Condition,
    CreateBucketConfiguration, ErrorDocument, IndexDocument, ObjectCannedAcl, Protocol,
    Redirect, RedirectAllRequestsTo, RoutingRule, WebsiteConfiguration,
};
use futures::stream::{self, StreamExt as _};
use s3_deploy_models::{CannedAcl, CustomHostingConfig, DEFAULT_REGION, HostingConfig};

use crate::store::{ObjectStore, PutObject, StoreError};

/// Size of each multipart part (5 MiB, the S3 minimum).
pub const PART_SIZE: usize = 5 * 1024 * 1024;

/// Objects larger than this are uploaded in parts.
pub const MULTIPART_THRESHOLD: usize = PART_SIZE;

/// Maximum parts of one object uploaded concurrently.
pub const MAX_CONCURRENT_PARTS: usize = 4;

/// S3 client used for provisioning and uploads.
pub struct S3Store {
    client: aws_sdk_s3::Client,
}

impl S3Store {
    /// Creates a store from a resolved SDK config.
    ///
    /// `force_path_style` should be set for S3-compatible endpoints
    /// (`MinIO`, R2, `LocalStack`) that do not support virtual-hosted
    /// addressing.
    #[must_use]
    pub fn new(sdk_config: &SdkConfig, force_path_style: bool) -> Self {
        let config = aws_sdk_s3::config::Builder::from(sdk_config)
            .force_path_style(force_path_style)
            .build();

        Self {
            client: aws_sdk_s3::Client::from_conf(config),
        }
    }

    async fn put_single(&self, object: PutObject) -> Result<(), StoreError> {
        self.client
            .put_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .body(ByteStream::from(object.body))
            .content_type(object.content_type)
            .acl(ObjectCannedAcl::from(object.acl.as_ref()))
            .set_cache_control(object.cache_control.map(str::to_string))
            .send()
            .await
            .map_err(classify)?;

        Ok(())
    }

    async fn put_multipart(&self, object: &PutObject) -> Result<(), StoreError> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&object.bucket)
            .key(&object.key)
            .content_type(object.content_type)
            .acl(ObjectCannedAcl::from(object.acl.as_ref()))
            .set_cache_control(object.cache_control.map(str::to_string))
            .send()
            .await
            .map_err(classify)?;

        let upload_id = created
            .upload_id()
            .ok_or_else(|| StoreError::Other {
                message: format!(
                    "No upload id returned for s3://{}/{}",
                    object.bucket, object.key
                ),
            })?
            .to_string();

        log::debug!(
            "Multipart upload {upload_id} for s3://{}/{} ({} parts)",
            object.bucket,
            object.key,
            object.body.len().div_ceil(PART_SIZE)
        );

        let parts = match self.upload_parts(object, &upload_id).await {
            Ok(parts) => parts,
            Err(e) => {
                self.abort_multipart(object, &upload_id).await;
                return Err(e);
            }
        };

        let completed = self
            .client
            .complete_multipart_upload()
            .bucket(&object.bucket)
            .key(&object.key)
            .upload_id(&upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await;

        if let Err(e) = completed {
            self.abort_multipart(object, &upload_id).await;
            return Err(classify(e));
        }

        Ok(())
    }

    async fn upload_parts(
        &self,
        object: &PutObject,
        upload_id: &str,
    ) -> Result<Vec<CompletedPart>, StoreError> {
        let parts = split_parts(object)?;

        upload_in_parts(parts, |part_number, chunk| async move {
            let output = self
                .client
                .upload_part()
                .bucket(&object.bucket)
                .key(&object.key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(chunk))
                .send()
                .await
                .map_err(classify)?;

            Ok::<_, StoreError>(
                CompletedPart::builder()
                    .part_number(part_number)
                    .set_e_tag(output.e_tag().map(str::to_string))
                    .build(),
            )
        })
        .await
    }

    async fn abort_multipart(&self, object: &PutObject, upload_id: &str) {
        let result = self
            .client
            .abort_multipart_upload()
            .bucket(&object.bucket)
            .key(&object.key)
            .upload_id(upload_id)
            .send()
            .await;

        if let Err(e) = result {
            log::warn!(
                "Failed to abort multipart upload {upload_id} for s3://{}/{}: {}",
                object.bucket,
                object.key,
                DisplayErrorContext(&e)
            );
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn head_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        self.client
            .head_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn create_bucket(
        &self,
        bucket: &str,
        region: &str,
        acl: CannedAcl,
    ) -> Result<(), StoreError> {
        // us-east-1 rejects an explicit location constraint
        let configuration = (region != DEFAULT_REGION).then(|| {
            CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(region))
                .build()
        });

        let result = self
            .client
            .create_bucket()
            .bucket(bucket)
            .set_acl(acl.is_bucket_acl().then(|| BucketCannedAcl::from(acl.as_ref())))
            .set_create_bucket_configuration(configuration)
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(CreateBucketError::is_bucket_already_owned_by_you) =>
            {
                log::warn!("Bucket {bucket} already exists and is owned by this account");
                Ok(())
            }
            Err(err) => Err(classify(err)),
        }
    }

    async fn put_bucket_website(
        &self,
        bucket: &str,
        hosting: &HostingConfig,
    ) -> Result<(), StoreError> {
        self.client
            .put_bucket_website()
            .bucket(bucket)
            .website_configuration(website_configuration(hosting)?)
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn put_object(&self, object: PutObject) -> Result<(), StoreError> {
        if object.body.len() > MULTIPART_THRESHOLD {
            self.put_multipart(&object).await
        } else {
            self.put_single(object).await
        }
    }
}

/// Splits an object body into numbered [`PART_SIZE`] chunks, starting at
/// part 1.
fn split_parts(object: &PutObject) -> Result<Vec<(i32, Vec<u8>)>, StoreError> {
    object
        .body
        .chunks(PART_SIZE)
        .enumerate()
        .map(|(index, chunk)| {
            let part_number = i32::try_from(index + 1).map_err(|_| StoreError::Other {
                message: format!("Too many parts for s3://{}/{}", object.bucket, object.key),
            })?;
            Ok((part_number, chunk.to_vec()))
        })
        .collect()
}

/// Uploads `parts` with at most [`MAX_CONCURRENT_PARTS`] in flight and
/// returns the completed parts in part-number order.
async fn upload_in_parts<F, Fut>(
    parts: Vec<(i32, Vec<u8>)>,
    upload_part: F,
) -> Result<Vec<CompletedPart>, StoreError>
where
    F: Fn(i32, Vec<u8>) -> Fut,
    Fut: Future<Output = Result<CompletedPart, StoreError>>,
{
    let results: Vec<Result<CompletedPart, StoreError>> = stream::iter(parts)
        .map(|(part_number, chunk)| upload_part(part_number, chunk))
        .buffer_unordered(MAX_CONCURRENT_PARTS)
        .collect()
        .await;

    let mut completed = results.into_iter().collect::<Result<Vec<_>, _>>()?;
    completed.sort_by_key(CompletedPart::part_number);
    Ok(completed)
}

/// Converts a [`HostingConfig`] into the SDK's website configuration.
///
/// # Errors
///
/// Returns [`StoreError::Other`] if a required element is missing.
pub fn website_configuration(hosting: &HostingConfig) -> Result<WebsiteConfiguration, StoreError> {
    match hosting {
        HostingConfig::Documents {
            index_document,
            error_document,
        } => Ok(WebsiteConfiguration::builder()
            .index_document(
                IndexDocument::builder()
                    .suffix(index_document)
                    .build()
                    .map_err(build_error)?,
            )
            .error_document(
                ErrorDocument::builder()
                    .key(error_document)
                    .build()
                    .map_err(build_error)?,
            )
            .build()),
        HostingConfig::Custom(custom) => custom_website_configuration(custom),
    }
}

fn custom_website_configuration(
    custom: &CustomHostingConfig,
) -> Result<WebsiteConfiguration, StoreError> {
    let mut builder = WebsiteConfiguration::builder();

    if let Some(index) = &custom.index_document {
        builder = builder.index_document(
            IndexDocument::builder()
                .suffix(&index.suffix)
                .build()
                .map_err(build_error)?,
        );
    }

    if let Some(error) = &custom.error_document {
        builder = builder.error_document(
            ErrorDocument::builder()
                .key(&error.key)
                .build()
                .map_err(build_error)?,
        );
    }

    if let Some(redirect_all) = &custom.redirect_all_requests_to {
        builder = builder.redirect_all_requests_to(
            RedirectAllRequestsTo::builder()
                .host_name(&redirect_all.host_name)
                .set_protocol(redirect_all.protocol.as_deref().map(Protocol::from))
                .build()
                .map_err(build_error)?,
        );
    }

    for rule in &custom.routing_rules {
        let condition = rule.condition.as_ref().map(|c| {
            Condition::builder()
                .set_http_error_code_returned_equals(c.http_error_code_returned_equals.clone())
                .set_key_prefix_equals(c.key_prefix_equals.clone())
                .build()
        });

        let redirect = Redirect::builder()
            .set_host_name(rule.redirect.host_name.clone())
            .set_http_redirect_code(rule.redirect.http_redirect_code.clone())
            .set_protocol(rule.redirect.protocol.as_deref().map(Protocol::from))
            .set_replace_key_prefix_with(rule.redirect.replace_key_prefix_with.clone())
            .set_replace_key_with(rule.redirect.replace_key_with.clone())
            .build();

        builder = builder.routing_rules(
            RoutingRule::builder()
                .set_condition(condition)
                .redirect(redirect)
                .build(),
        );
    }

    Ok(builder.build())
}

fn build_error(e: aws_sdk_s3::error::BuildError) -> StoreError {
    StoreError::Other {
        message: format!("Invalid website configuration: {e}"),
    }
}

/// Maps an SDK error onto [`StoreError`] using the raw HTTP status.
fn classify<E>(err: SdkError<E, HttpResponse>) -> StoreError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let status = err.raw_response().map(|r| r.status().as_u16());
    let message = DisplayErrorContext(&err).to_string();

    match status {
        Some(404) => StoreError::NotFound { message },
        Some(403) => StoreError::AccessDenied { message },
        _ => StoreError::Other { message },
    }
}
