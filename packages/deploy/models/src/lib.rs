#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Deployment options and the value types that flow through a deploy run.
//!
//! A run is described by one immutable [`DeploymentOptions`]. Local files
//! become [`FileTask`]s (local path + remote key), the bucket gate yields a
//! [`BucketState`], and CDN purges are described by an
//! [`InvalidationRequest`]. Everything here is pure: no I/O, no clients.

use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// `Cache-Control` value attached to PWA no-cache keys so browsers and
/// CDNs revalidate on every fetch.
pub const NO_CACHE_CONTROL: &str = "no-store, no-cache, must-revalidate, proxy-revalidate, max-age=0";

/// Region used when none is configured.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Upload concurrency used when none is configured.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Default static-hosting index document suffix.
pub const DEFAULT_INDEX_DOCUMENT: &str = "index.html";

/// Default static-hosting error document key.
pub const DEFAULT_ERROR_DOCUMENT: &str = "index.html";

/// Default file-match glob (every file under the asset root).
pub const DEFAULT_FILE_PATTERN: &str = "**";

/// Default CDN invalidation matchers.
pub const DEFAULT_INVALIDATION_PATHS: &str = "/*";

/// Errors raised while validating deployment configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Concurrency was not an integer ≥ 1.
    #[error("Invalid upload concurrency {value:?}: expected an integer >= 1")]
    InvalidConcurrency {
        /// The rejected raw value.
        value: String,
    },

    /// No bucket name was configured.
    #[error("A bucket name is required")]
    MissingBucket,

    /// The ACL is not one of the S3 canned ACLs.
    #[error("Unknown canned ACL {value:?}")]
    InvalidAcl {
        /// The rejected raw value.
        value: String,
    },

    /// The custom hosting configuration could not be parsed.
    #[error("Invalid static hosting configuration: {source}")]
    InvalidHostingConfig {
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// CDN invalidation was enabled without a distribution id.
    #[error("CDN invalidation is enabled but no distribution id was given")]
    MissingDistributionId,

    /// CDN invalidation was enabled with an empty matcher list.
    #[error("CDN invalidation is enabled but no invalidation paths were given")]
    EmptyInvalidationPaths,
}

/// Errors raised while deriving a remote key from a local path.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    /// The file does not live under the asset root.
    #[error("{} is not under the asset root {}", path.display(), root.display())]
    OutsideRoot {
        /// Offending local path.
        path: PathBuf,
        /// Asset root it was expected under.
        root: PathBuf,
    },

    /// A path component is not valid UTF-8 and cannot become a key.
    #[error("{} contains a non UTF-8 component", path.display())]
    NonUtf8 {
        /// Offending local path.
        path: PathBuf,
    },

    /// The relative path contains `..`, a root, or is empty.
    #[error("{} cannot be mapped to an object key", path.display())]
    Unmappable {
        /// Offending local path.
        path: PathBuf,
    },
}

/// S3 canned access-control lists.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum CannedAcl {
    /// Owner-only access.
    Private,
    /// Anyone may read.
    #[default]
    PublicRead,
    /// Anyone may read and write.
    PublicReadWrite,
    /// Any authenticated AWS principal may read.
    AuthenticatedRead,
    /// EC2 may read AMI bundles (object only).
    AwsExecRead,
    /// Bucket owner may read (object only).
    BucketOwnerRead,
    /// Bucket owner has full control (object only).
    BucketOwnerFullControl,
}

impl CannedAcl {
    /// Whether this ACL may also be applied to a bucket at creation time.
    #[must_use]
    pub const fn is_bucket_acl(self) -> bool {
        matches!(
            self,
            Self::Private | Self::PublicRead | Self::PublicReadWrite | Self::AuthenticatedRead
        )
    }

    /// Parses an ACL name such as `public-read`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAcl`] for unknown names.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        raw.trim().parse().map_err(|_| ConfigError::InvalidAcl {
            value: raw.to_string(),
        })
    }
}

/// Remote deploy-path prefix.
///
/// Always either empty or `segment(/segment)*/`: no leading slash and
/// exactly one trailing slash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DeployPath(String);

impl DeployPath {
    /// Normalizes a raw prefix: `/assets` and `assets/` both become
    /// `assets/`, while an empty or all-slash input stays empty.
    #[must_use]
    pub fn new(raw: &str) -> Self {
        let trimmed = raw.trim().trim_start_matches('/').trim_end_matches('/');
        if trimmed.is_empty() {
            Self(String::new())
        } else {
            Self(format!("{trimmed}/"))
        }
    }

    /// The normalized prefix.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the prefix is empty (upload to the bucket root).
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for DeployPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A local file paired with the key it is uploaded to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTask {
    /// Local path of the file.
    pub local_path: PathBuf,
    /// Full remote key, including the deploy-path prefix.
    pub key: String,
    /// Key relative to the deploy-path prefix (the asset-root-relative path
    /// with `/` separators).
    pub relative_key: String,
}

impl FileTask {
    /// Derives the task for `local_path` under `root`.
    ///
    /// The key is built by joining the relative path's components with
    /// `/`, so distinct local files always map to distinct keys.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError`] if the path is outside `root`, has a non UTF-8
    /// component, or contains components that have no key equivalent.
    pub fn new(root: &Path, local_path: PathBuf, prefix: &DeployPath) -> Result<Self, KeyError> {
        let relative = local_path
            .strip_prefix(root)
            .map_err(|_| KeyError::OutsideRoot {
                path: local_path.clone(),
                root: root.to_path_buf(),
            })?;

        let mut parts = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => {
                    let part = part.to_str().ok_or_else(|| KeyError::NonUtf8 {
                        path: local_path.clone(),
                    })?;
                    parts.push(part);
                }
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(KeyError::Unmappable {
                        path: local_path.clone(),
                    });
                }
            }
        }

        if parts.is_empty() {
            return Err(KeyError::Unmappable { path: local_path });
        }

        let relative_key = parts.join("/");
        let key = format!("{prefix}{relative_key}");

        Ok(Self {
            local_path,
            key,
            relative_key,
        })
    }
}

/// Why a bucket cannot be deployed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum UnusableReason {
    /// The existence check was refused.
    PermissionDenied,
    /// The bucket does not exist and creation was not requested.
    NotFound,
    /// The bucket did not exist and creating it failed.
    CreateFailed,
    /// The existence check failed for any other reason.
    VerificationFailed,
}

/// Outcome of the bucket gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BucketState {
    /// The bucket already existed and is accessible.
    Exists,
    /// The bucket was created during this run.
    Created,
    /// The bucket cannot be used; the run must not upload.
    Unusable {
        /// Classification of the failure.
        reason: UnusableReason,
        /// Underlying vendor error text.
        message: String,
    },
}

impl BucketState {
    /// Whether uploads may proceed.
    #[must_use]
    pub const fn is_usable(&self) -> bool {
        matches!(self, Self::Exists | Self::Created)
    }
}

/// `IndexDocument` element of a website configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IndexDocumentConfig {
    /// Suffix appended to directory requests (e.g. `index.html`).
    pub suffix: String,
}

/// `ErrorDocument` element of a website configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorDocumentConfig {
    /// Object key served on 4xx errors.
    pub key: String,
}

/// `RedirectAllRequestsTo` element of a website configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RedirectAllConfig {
    /// Target host name.
    pub host_name: String,
    /// `http` or `https`.
    pub protocol: Option<String>,
}

/// Condition half of a routing rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RoutingConditionConfig {
    pub http_error_code_returned_equals: Option<String>,
    pub key_prefix_equals: Option<String>,
}

/// Redirect half of a routing rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RoutingRedirectConfig {
    pub host_name: Option<String>,
    pub http_redirect_code: Option<String>,
    pub protocol: Option<String>,
    pub replace_key_prefix_with: Option<String>,
    pub replace_key_with: Option<String>,
}

/// One website routing rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RoutingRuleConfig {
    pub condition: Option<RoutingConditionConfig>,
    pub redirect: RoutingRedirectConfig,
}

/// A complete bucket website configuration, in the same JSON shape the S3
/// API documents (`{"IndexDocument": {"Suffix": "index.html"}, ...}`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomHostingConfig {
    pub index_document: Option<IndexDocumentConfig>,
    pub error_document: Option<ErrorDocumentConfig>,
    pub redirect_all_requests_to: Option<RedirectAllConfig>,
    #[serde(default)]
    pub routing_rules: Vec<RoutingRuleConfig>,
}

/// Static-hosting configuration to apply to the bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostingConfig {
    /// Plain index/error document pair.
    Documents {
        /// Index document suffix.
        index_document: String,
        /// Error document key.
        error_document: String,
    },
    /// A full website configuration, applied verbatim.
    Custom(CustomHostingConfig),
}

impl HostingConfig {
    /// Parses a custom website configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidHostingConfig`] if the JSON does not
    /// match the website configuration shape.
    pub fn custom_from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json)
            .map(Self::Custom)
            .map_err(|source| ConfigError::InvalidHostingConfig { source })
    }
}

/// CDN invalidation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdnOptions {
    /// Distribution to invalidate.
    pub distribution_id: String,
    /// Path matchers, in configured order.
    pub paths: Vec<String>,
}

impl CdnOptions {
    /// Builds CDN options from a distribution id and a comma-separated
    /// matcher list.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingDistributionId`] or
    /// [`ConfigError::EmptyInvalidationPaths`] when either part is empty.
    pub fn new(distribution_id: &str, paths: &str) -> Result<Self, ConfigError> {
        let distribution_id = distribution_id.trim();
        if distribution_id.is_empty() {
            return Err(ConfigError::MissingDistributionId);
        }
        let paths = split_csv(paths);
        if paths.is_empty() {
            return Err(ConfigError::EmptyInvalidationPaths);
        }
        Ok(Self {
            distribution_id: distribution_id.to_string(),
            paths,
        })
    }
}

/// Immutable settings for one deployment run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentOptions {
    /// Target bucket name.
    pub bucket: String,
    /// Bucket region.
    pub region: String,
    /// Named credentials profile, if any.
    pub profile: Option<String>,
    /// S3-compatible endpoint override, if any.
    pub endpoint_url: Option<String>,
    /// ACL applied to the bucket (on creation) and to every object.
    pub acl: CannedAcl,
    /// Static hosting to apply, or `None` to leave the bucket as is.
    pub hosting: Option<HostingConfig>,
    /// Create the bucket when it does not exist.
    pub create_bucket: bool,
    /// Local asset root.
    pub dist_folder: PathBuf,
    /// Glob matched against asset-root-relative paths.
    pub file_pattern: String,
    /// Remote key prefix.
    pub deploy_path: DeployPath,
    /// Maximum number of concurrent uploads.
    pub concurrency: NonZeroUsize,
    /// CDN invalidation, or `None` when disabled.
    pub cdn: Option<CdnOptions>,
    /// Keys uploaded with [`NO_CACHE_CONTROL`]; empty when PWA mode is off.
    pub no_cache_keys: BTreeSet<String>,
}

impl DeploymentOptions {
    /// Options for `bucket` and `dist_folder` with every other setting at
    /// its default.
    #[must_use]
    pub fn new(bucket: impl Into<String>, dist_folder: impl Into<PathBuf>) -> Self {
        Self {
            bucket: bucket.into(),
            region: DEFAULT_REGION.to_string(),
            profile: None,
            endpoint_url: None,
            acl: CannedAcl::default(),
            hosting: None,
            create_bucket: false,
            dist_folder: dist_folder.into(),
            file_pattern: DEFAULT_FILE_PATTERN.to_string(),
            deploy_path: DeployPath::default(),
            concurrency: NonZeroUsize::new(DEFAULT_CONCURRENCY).unwrap_or(NonZeroUsize::MIN),
            cdn: None,
            no_cache_keys: BTreeSet::new(),
        }
    }

    /// Whether `task` must be uploaded with [`NO_CACHE_CONTROL`].
    ///
    /// Matches on either the full remote key or the key relative to the
    /// deploy path.
    #[must_use]
    pub fn is_no_cache(&self, task: &FileTask) -> bool {
        self.no_cache_keys.contains(&task.key) || self.no_cache_keys.contains(&task.relative_key)
    }

    /// `Cache-Control` header for `task`, if any.
    #[must_use]
    pub fn cache_control_for(&self, task: &FileTask) -> Option<&'static str> {
        self.is_no_cache(task).then_some(NO_CACHE_CONTROL)
    }
}

/// A CDN cache-invalidation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationRequest {
    /// Distribution to invalidate.
    pub distribution_id: String,
    /// Path matchers, each starting with `/`.
    pub paths: Vec<String>,
    /// Unique token identifying this request to the CDN.
    pub caller_reference: String,
}

impl InvalidationRequest {
    /// Builds a request, prefixing `/` onto matchers that lack it.
    #[must_use]
    pub fn new(options: &CdnOptions, caller_reference: impl Into<String>) -> Self {
        let paths = options
            .paths
            .iter()
            .map(|path| {
                if path.starts_with('/') {
                    path.clone()
                } else {
                    format!("/{path}")
                }
            })
            .collect();

        Self {
            distribution_id: options.distribution_id.clone(),
            paths,
            caller_reference: caller_reference.into(),
        }
    }
}

/// What the CDN reported for a created invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationResult {
    /// Invalidation identifier.
    pub id: String,
    /// Status string (e.g. `InProgress`).
    pub status: String,
    /// Caller reference echoed back by the CDN.
    pub caller_reference: String,
}

/// Splits a comma-separated list, trimming entries and dropping empties.
#[must_use]
pub fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parses the comma-separated PWA no-cache list into a key set.
///
/// Leading slashes are stripped since object keys never carry one.
#[must_use]
pub fn parse_no_cache_keys(raw: &str) -> BTreeSet<String> {
    split_csv(raw)
        .into_iter()
        .map(|key| key.trim_start_matches('/').to_string())
        .filter(|key| !key.is_empty())
        .collect()
}

/// Parses a string-encoded upload concurrency.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidConcurrency`] for non-integers and for
/// values below 1.
pub fn parse_concurrency(raw: &str) -> Result<NonZeroUsize, ConfigError> {
    let value: i64 = raw
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidConcurrency {
            value: raw.to_string(),
        })?;
    validate_concurrency(value)
}

/// Validates an integer upload concurrency.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidConcurrency`] for values below 1.
pub fn validate_concurrency(value: i64) -> Result<NonZeroUsize, ConfigError> {
    usize::try_from(value)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| ConfigError::InvalidConcurrency {
            value: value.to_string(),
        })
}
