#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Static-site deployment to S3.
//!
//! A run verifies (or creates) the target bucket, optionally enables static
//! website hosting, uploads every matching file under the asset folder with
//! bounded concurrency, purges the CDN, and finally checks that every file
//! in the snapshot was uploaded.
//!
//! ```text
//! Deployer::run
//!   ├─ provision::ensure_bucket      (fatal on failure)
//!   ├─ provision::enable_static_hosting
//!   ├─ files::build_tasks            (immutable snapshot)
//!   ├─ upload::upload_all            (buffer_unordered fan-out)
//!   ├─ cdn::invalidate               (reported, never fatal)
//!   └─ uploaded == total ?
//! ```
//!
//! The object store and the CDN are reached through the [`ObjectStore`] and
//! [`CdnClient`] traits, built by [`clients`] from the resolved AWS config.

pub mod cdn;
pub mod clients;
pub mod content_type;
pub mod coordinator;
pub mod files;
pub mod progress;
pub mod provision;
pub mod s3;
pub mod store;
pub mod upload;

#[cfg(test)]
mod fakes;

pub use cdn::{CdnClient, CdnError, CloudFrontCdn};
pub use coordinator::{DeployError, DeployReport, Deployer};
pub use files::FilesError;
pub use provision::{HostingOutcome, ProvisioningError};
pub use s3::S3Store;
pub use store::{ObjectStore, PutObject, StoreError};
pub use upload::{PoolOutcome, UploadError};
