//! SDK configuration and client construction.
//!
//! Credentials come from the default AWS provider chain (environment,
//! shared config/credentials files, SSO, IMDS), optionally narrowed to a
//! named profile.

use std::sync::Arc;
use std::time::Duration;

use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use s3_deploy_models::DeploymentOptions;

use crate::cdn::{CdnClient, CloudFrontCdn};
use crate::s3::S3Store;
use crate::store::ObjectStore;

/// Connect timeout applied to every SDK call.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Read timeout applied to every SDK call.
pub const READ_TIMEOUT: Duration = Duration::from_secs(120);

/// Resolves credentials, region, endpoint and timeouts for this run.
pub async fn load_sdk_config(options: &DeploymentOptions) -> SdkConfig {
    let timeouts = TimeoutConfig::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .read_timeout(READ_TIMEOUT)
        .build();

    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(options.region.clone()))
        .timeout_config(timeouts);

    if let Some(profile) = &options.profile {
        log::debug!("Using credentials profile {profile}");
        loader = loader.profile_name(profile);
    }

    if let Some(endpoint) = &options.endpoint_url {
        log::info!("Using custom endpoint {endpoint}");
        loader = loader.endpoint_url(endpoint);
    }

    loader.load().await
}

/// Object store for the run. Path-style addressing is forced when a
/// custom endpoint is configured.
#[must_use]
pub fn object_store(sdk_config: &SdkConfig, options: &DeploymentOptions) -> Arc<dyn ObjectStore> {
    Arc::new(S3Store::new(sdk_config, options.endpoint_url.is_some()))
}

/// CDN client for the run, or `None` when invalidation is disabled.
#[must_use]
pub fn cdn_client(
    sdk_config: &SdkConfig,
    options: &DeploymentOptions,
) -> Option<Arc<dyn CdnClient>> {
    options
        .cdn
        .as_ref()
        .map(|_| Arc::new(CloudFrontCdn::new(sdk_config)) as Arc<dyn CdnClient>)
}
