//! Option resolution: command-line flags over `s3-deploy.toml` over
//! built-in defaults.

use std::path::{Path, PathBuf};

use clap::Parser;
use s3_deploy_models::{
    CannedAcl, CdnOptions, ConfigError, CustomHostingConfig, DEFAULT_ERROR_DOCUMENT,
    DEFAULT_INDEX_DOCUMENT, DEFAULT_INVALIDATION_PATHS, DeployPath, DeploymentOptions,
    HostingConfig, parse_concurrency, parse_no_cache_keys, validate_concurrency,
};
use serde::Deserialize;

/// Config file read from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "s3-deploy.toml";

/// Asset folder used when none is configured.
pub const DEFAULT_DIST_FOLDER: &str = "dist";

#[derive(Parser, Debug, Default)]
#[command(name = "s3_deploy", about = "Deploy a static site to S3")]
pub struct Cli {
    /// Target bucket name
    #[arg(long)]
    pub bucket: Option<String>,
    /// Bucket region (default: us-east-1)
    #[arg(long)]
    pub region: Option<String>,
    /// Named AWS credentials profile
    #[arg(long)]
    pub profile: Option<String>,
    /// S3-compatible endpoint (`MinIO`, R2, `LocalStack`); forces path-style addressing
    #[arg(long)]
    pub endpoint_url: Option<String>,
    /// Canned ACL for the bucket and every object (default: public-read)
    #[arg(long)]
    pub acl: Option<String>,
    /// Enable static website hosting on the bucket
    #[arg(long)]
    pub static_hosting: bool,
    /// Index document for static hosting (default: index.html)
    #[arg(long)]
    pub index_document: Option<String>,
    /// Error document for static hosting (default: index.html)
    #[arg(long)]
    pub error_document: Option<String>,
    /// Full website configuration as JSON; replaces the index/error documents
    #[arg(long)]
    pub hosting_config: Option<String>,
    /// Create the bucket if it does not exist
    #[arg(long)]
    pub create_bucket: bool,
    /// Local folder to upload (default: dist)
    #[arg(long)]
    pub dist_folder: Option<PathBuf>,
    /// Glob matched against paths relative to the dist folder (default: **)
    #[arg(long)]
    pub file_pattern: Option<String>,
    /// Remote key prefix, e.g. `releases/v2`
    #[arg(long)]
    pub deploy_path: Option<String>,
    /// Maximum concurrent uploads (default: 10)
    #[arg(long, allow_negative_numbers = true)]
    pub concurrency: Option<String>,
    /// Invalidate the CloudFront distribution after uploading
    #[arg(long)]
    pub cdn: bool,
    /// CloudFront distribution id
    #[arg(long)]
    pub distribution_id: Option<String>,
    /// Comma-separated invalidation paths (default: /*)
    #[arg(long)]
    pub invalidation_paths: Option<String>,
    /// Upload the `--no-cache` keys with a no-cache `Cache-Control` header
    #[arg(long)]
    pub pwa: bool,
    /// Comma-separated keys (relative to the dist folder) that must never be cached
    #[arg(long)]
    pub no_cache: Option<String>,
    /// Config file (default: ./s3-deploy.toml when present)
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Hide the progress bar
    #[arg(long, short)]
    pub quiet: bool,
}

/// Concurrency as written in the config file: `concurrency = 8` or
/// `concurrency = "8"`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ConcurrencySetting {
    Number(i64),
    Text(String),
}

/// Contents of `s3-deploy.toml`. Every key is optional.
#[derive(Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileConfig {
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub profile: Option<String>,
    pub endpoint_url: Option<String>,
    pub acl: Option<String>,
    pub static_hosting: Option<bool>,
    pub index_document: Option<String>,
    pub error_document: Option<String>,
    /// Website configuration table, same shape as the `--hosting-config`
    /// JSON.
    pub hosting_config: Option<CustomHostingConfig>,
    pub create_bucket: Option<bool>,
    pub dist_folder: Option<PathBuf>,
    pub file_pattern: Option<String>,
    pub deploy_path: Option<String>,
    pub concurrency: Option<ConcurrencySetting>,
    pub cdn: Option<bool>,
    pub distribution_id: Option<String>,
    pub invalidation_paths: Option<String>,
    pub pwa: Option<bool>,
    pub no_cache: Option<String>,
}

/// Errors raised while loading or resolving configuration.
#[derive(Debug, thiserror::Error)]
pub enum FileConfigError {
    /// The config file could not be read.
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The config file is not valid TOML or has unknown keys.
    #[error("Failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Loads the config file named by `--config`, or [`DEFAULT_CONFIG_FILE`]
/// if it exists. A missing default file yields an empty config.
///
/// # Errors
///
/// Returns [`FileConfigError`] if the file cannot be read or parsed.
pub fn load_file_config(explicit: Option<&Path>) -> Result<FileConfig, FileConfigError> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            if !default.is_file() {
                return Ok(FileConfig::default());
            }
            default
        }
    };

    log::debug!("Loading config from {}", path.display());

    let contents = std::fs::read_to_string(&path).map_err(|source| FileConfigError::Read {
        path: path.clone(),
        source,
    })?;

    parse_file_config(&contents).map_err(|source| FileConfigError::Parse { path, source })
}

/// Parses `s3-deploy.toml` contents.
///
/// # Errors
///
/// Returns the TOML error if the contents are malformed or contain
/// unknown keys.
pub fn parse_file_config(contents: &str) -> Result<FileConfig, toml::de::Error> {
    toml::from_str(contents)
}

/// Merges flags over the file config over defaults and validates the
/// result.
///
/// # Errors
///
/// Returns [`ConfigError`] for a missing bucket, an unknown ACL, an
/// invalid concurrency, malformed hosting JSON, or CDN settings without a
/// distribution id or paths.
pub fn resolve(cli: Cli, file: FileConfig) -> Result<DeploymentOptions, ConfigError> {
    let bucket = cli
        .bucket
        .or(file.bucket)
        .map(|b| b.trim().to_string())
        .filter(|b| !b.is_empty())
        .ok_or(ConfigError::MissingBucket)?;

    let dist_folder = cli
        .dist_folder
        .or(file.dist_folder)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DIST_FOLDER));

    let mut options = DeploymentOptions::new(bucket, dist_folder);

    if let Some(region) = cli.region.or(file.region) {
        options.region = region;
    }
    options.profile = cli.profile.or(file.profile);
    options.endpoint_url = cli.endpoint_url.or(file.endpoint_url);

    if let Some(acl) = cli.acl.or(file.acl) {
        options.acl = CannedAcl::parse(&acl)?;
    }

    options.hosting = if let Some(json) = cli.hosting_config {
        Some(HostingConfig::custom_from_json(&json)?)
    } else if let Some(custom) = file.hosting_config {
        Some(HostingConfig::Custom(custom))
    } else if cli.static_hosting || file.static_hosting.unwrap_or(false) {
        Some(HostingConfig::Documents {
            index_document: cli
                .index_document
                .or(file.index_document)
                .unwrap_or_else(|| DEFAULT_INDEX_DOCUMENT.to_string()),
            error_document: cli
                .error_document
                .or(file.error_document)
                .unwrap_or_else(|| DEFAULT_ERROR_DOCUMENT.to_string()),
        })
    } else {
        None
    };

    options.create_bucket = cli.create_bucket || file.create_bucket.unwrap_or(false);

    if let Some(pattern) = cli.file_pattern.or(file.file_pattern) {
        options.file_pattern = pattern;
    }

    if let Some(prefix) = cli.deploy_path.or(file.deploy_path) {
        options.deploy_path = DeployPath::new(&prefix);
    }

    if let Some(raw) = cli.concurrency {
        options.concurrency = parse_concurrency(&raw)?;
    } else if let Some(setting) = file.concurrency {
        options.concurrency = match setting {
            ConcurrencySetting::Number(n) => validate_concurrency(n)?,
            ConcurrencySetting::Text(raw) => parse_concurrency(&raw)?,
        };
    }

    if cli.cdn || file.cdn.unwrap_or(false) {
        let distribution_id = cli
            .distribution_id
            .or(file.distribution_id)
            .unwrap_or_default();
        let paths = cli
            .invalidation_paths
            .or(file.invalidation_paths)
            .unwrap_or_else(|| DEFAULT_INVALIDATION_PATHS.to_string());
        options.cdn = Some(CdnOptions::new(&distribution_id, &paths)?);
    }

    if cli.pwa || file.pwa.unwrap_or(false) {
        let keys = cli.no_cache.or(file.no_cache).unwrap_or_default();
        options.no_cache_keys = parse_no_cache_keys(&keys);
        if options.no_cache_keys.is_empty() {
            log::warn!("PWA mode is enabled but no --no-cache keys were given");
        }
    }

    Ok(options)
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("s3_deploy").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let options = resolve(cli(&["--bucket", "site"]), FileConfig::default()).unwrap();

        assert_eq!(options.bucket, "site");
        assert_eq!(options.region, "us-east-1");
        assert_eq!(options.acl, CannedAcl::PublicRead);
        assert_eq!(options.dist_folder, PathBuf::from("dist"));
        assert_eq!(options.file_pattern, "**");
        assert!(options.deploy_path.is_empty());
        assert_eq!(options.concurrency.get(), 10);
        assert!(options.hosting.is_none());
        assert!(options.cdn.is_none());
        assert!(options.no_cache_keys.is_empty());
        assert!(!options.create_bucket);
    }

    #[test]
    fn flags_override_file_values() {
        let file = parse_file_config(
            r#"
            bucket = "from-file"
            region = "eu-west-1"
            concurrency = 4
            deploy-path = "/file/"
            "#,
        )
        .unwrap();

        let options = resolve(cli(&["--bucket", "from-flag", "--concurrency", "2"]), file).unwrap();

        assert_eq!(options.bucket, "from-flag");
        assert_eq!(options.region, "eu-west-1");
        assert_eq!(options.concurrency, NonZeroUsize::new(2).unwrap());
        assert_eq!(options.deploy_path.as_str(), "file/");
    }

    #[test]
    fn concurrency_string_in_file_is_accepted() {
        let file = parse_file_config("bucket = \"b\"\nconcurrency = \"6\"").unwrap();
        let options = resolve(Cli::default(), file).unwrap();
        assert_eq!(options.concurrency.get(), 6);
    }

    #[test]
    fn non_positive_concurrency_is_rejected() {
        for value in ["0", "-3", "many"] {
            let args = cli(&["--bucket", "b", "--concurrency", value]);
            let err = resolve(args, FileConfig::default()).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidConcurrency { .. }), "{value}");
        }

        let file = parse_file_config("bucket = \"b\"\nconcurrency = 0").unwrap();
        assert!(matches!(
            resolve(Cli::default(), file),
            Err(ConfigError::InvalidConcurrency { .. })
        ));
    }

    #[test]
    fn negative_concurrency_reaches_validation() {
        let args = cli(&["--bucket", "b", "--concurrency", "-3"]);
        assert_eq!(args.concurrency.as_deref(), Some("-3"));

        let err = resolve(args, FileConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConcurrency { value } if value == "-3"));

        let file = parse_file_config("bucket = \"b\"\nconcurrency = -2").unwrap();
        assert!(matches!(
            resolve(Cli::default(), file),
            Err(ConfigError::InvalidConcurrency { .. })
        ));
    }

    #[test]
    fn bucket_is_required() {
        assert!(matches!(
            resolve(Cli::default(), FileConfig::default()),
            Err(ConfigError::MissingBucket)
        ));
        assert!(matches!(
            resolve(cli(&["--bucket", "  "]), FileConfig::default()),
            Err(ConfigError::MissingBucket)
        ));
    }

    #[test]
    fn unknown_acl_is_rejected() {
        let args = cli(&["--bucket", "b", "--acl", "world-writable"]);
        let err = resolve(args, FileConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAcl { .. }));
    }

    #[test]
    fn static_hosting_uses_document_defaults() {
        let options = resolve(
            cli(&["--bucket", "b", "--static-hosting", "--error-document", "404.html"]),
            FileConfig::default(),
        )
        .unwrap();

        assert_eq!(
            options.hosting,
            Some(HostingConfig::Documents {
                index_document: "index.html".to_string(),
                error_document: "404.html".to_string(),
            })
        );
    }

    #[test]
    fn hosting_json_replaces_documents() {
        let json = r#"{"IndexDocument":{"Suffix":"home.html"},"RoutingRules":[]}"#;
        let options = resolve(
            cli(&["--bucket", "b", "--static-hosting", "--hosting-config", json]),
            FileConfig::default(),
        )
        .unwrap();

        let Some(HostingConfig::Custom(custom)) = options.hosting else {
            panic!("expected custom hosting");
        };
        assert_eq!(custom.index_document.unwrap().suffix, "home.html");
        assert!(custom.error_document.is_none());
    }

    #[test]
    fn malformed_hosting_json_is_rejected() {
        let err = resolve(
            cli(&["--bucket", "b", "--hosting-config", "{not json"]),
            FileConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidHostingConfig { .. }));
    }

    #[test]
    fn hosting_table_in_file() {
        let file = parse_file_config(
            r#"
            bucket = "b"

            [hosting-config.IndexDocument]
            Suffix = "index.html"

            [hosting-config.ErrorDocument]
            Key = "error.html"
            "#,
        )
        .unwrap();

        let options = resolve(Cli::default(), file).unwrap();

        let Some(HostingConfig::Custom(custom)) = options.hosting else {
            panic!("expected custom hosting");
        };
        assert_eq!(custom.error_document.unwrap().key, "error.html");
    }

    #[test]
    fn cdn_requires_distribution_id() {
        let err = resolve(cli(&["--bucket", "b", "--cdn"]), FileConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingDistributionId));
    }

    #[test]
    fn cdn_paths_default_to_everything() {
        let options = resolve(
            cli(&["--bucket", "b", "--cdn", "--distribution-id", "E2EXAMPLE"]),
            FileConfig::default(),
        )
        .unwrap();

        let cdn = options.cdn.unwrap();
        assert_eq!(cdn.distribution_id, "E2EXAMPLE");
        assert_eq!(cdn.paths, vec!["/*"]);
    }

    #[test]
    fn cdn_settings_ignored_unless_enabled() {
        let options = resolve(
            cli(&["--bucket", "b", "--distribution-id", "E2EXAMPLE"]),
            FileConfig::default(),
        )
        .unwrap();
        assert!(options.cdn.is_none());
    }

    #[test]
    fn pwa_keys_only_apply_in_pwa_mode() {
        let off = resolve(cli(&["--bucket", "b", "--no-cache", "sw.js"]), FileConfig::default())
            .unwrap();
        assert!(off.no_cache_keys.is_empty());

        let on = resolve(
            cli(&["--bucket", "b", "--pwa", "--no-cache", "sw.js, index.html ,"]),
            FileConfig::default(),
        )
        .unwrap();
        assert_eq!(
            on.no_cache_keys.into_iter().collect::<Vec<_>>(),
            vec!["index.html", "sw.js"]
        );
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        assert!(parse_file_config("bukket = \"typo\"").is_err());
    }
}
