//! End-to-end deployment run.
//!
//! Bucket gate, hosting, snapshot, upload pool, invalidation, then the
//! `uploaded == total` verdict. Only the gate and the verdict can fail the
//! run; hosting and invalidation failures are reported alongside it.

use std::sync::Arc;

use s3_deploy_models::{BucketState, DeploymentOptions, InvalidationResult};

use crate::cdn::{self, CdnClient, CdnError};
use crate::files::{self, FilesError};
use crate::progress::ProgressCallback;
use crate::provision::{self, HostingOutcome, ProvisioningError};
use crate::store::ObjectStore;
use crate::upload::{self, UploadError};

/// What a run did.
#[derive(Debug)]
pub struct DeployReport {
    /// Result of the bucket gate. Always usable in a returned report.
    pub bucket_state: BucketState,
    /// Result of the static-hosting step.
    pub hosting: HostingOutcome,
    /// Files uploaded successfully.
    pub uploaded: u64,
    /// Files in the snapshot.
    pub total: u64,
    /// One entry per failed upload.
    pub failures: Vec<UploadError>,
    /// Invalidation outcome, `None` when CDN invalidation is disabled.
    pub invalidation: Option<Result<InvalidationResult, CdnError>>,
}

impl DeployReport {
    /// Whether every file in the snapshot was uploaded.
    #[must_use]
    pub const fn is_reconciled(&self) -> bool {
        self.uploaded == self.total
    }
}

/// Run-level failures. Each one means a non-zero exit status.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// The bucket gate failed; nothing was uploaded.
    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),

    /// The local file snapshot could not be built; nothing was uploaded.
    #[error(transparent)]
    Files(#[from] FilesError),

    /// Some files in the snapshot were not uploaded.
    #[error("Upload mismatch: {uploaded}/{total} files uploaded")]
    Reconciliation {
        uploaded: u64,
        total: u64,
        /// Everything the run did before the verdict.
        report: Box<DeployReport>,
    },
}

/// Runs deployments against an explicit set of clients.
pub struct Deployer {
    store: Arc<dyn ObjectStore>,
    cdn: Option<Arc<dyn CdnClient>>,
    progress: Arc<dyn ProgressCallback>,
}

impl Deployer {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, progress: Arc<dyn ProgressCallback>) -> Self {
        Self {
            store,
            cdn: None,
            progress,
        }
    }

    /// Sets the client used when the options enable CDN invalidation.
    #[must_use]
    pub fn with_cdn(mut self, cdn: Arc<dyn CdnClient>) -> Self {
        self.cdn = Some(cdn);
        self
    }

    /// Deploys the asset folder described by `options`.
    ///
    /// # Errors
    ///
    /// * [`DeployError::Provisioning`] if the bucket is unusable
    /// * [`DeployError::Files`] if the asset folder cannot be enumerated
    /// * [`DeployError::Reconciliation`] if any file failed to upload
    pub async fn run(&self, options: &DeploymentOptions) -> Result<DeployReport, DeployError> {
        let store = self.store.as_ref();

        let bucket_state = provision::ensure_bucket(store, options).await;
        if let Some(e) = ProvisioningError::from_state(&options.bucket, &bucket_state) {
            return Err(e.into());
        }

        let hosting = provision::enable_static_hosting(store, options).await;

        let tasks = files::build_tasks(options)?;
        if options.deploy_path.is_empty() {
            log::info!(
                "Found {} file(s) in {}",
                tasks.len(),
                options.dist_folder.display()
            );
        } else {
            log::info!(
                "Found {} file(s) in {}, deploying under {}",
                tasks.len(),
                options.dist_folder.display(),
                options.deploy_path
            );
        }

        let outcome = upload::upload_all(store, options, tasks, self.progress.as_ref()).await;

        let invalidation = self.invalidate(options).await;

        let report = DeployReport {
            bucket_state,
            hosting,
            uploaded: outcome.succeeded,
            total: outcome.total,
            failures: outcome.failures,
            invalidation,
        };

        if report.is_reconciled() {
            log::info!(
                "Deployed {}/{} file(s) to {}",
                report.uploaded,
                report.total,
                options.bucket
            );
            Ok(report)
        } else {
            Err(DeployError::Reconciliation {
                uploaded: report.uploaded,
                total: report.total,
                report: Box::new(report),
            })
        }
    }

    async fn invalidate(
        &self,
        options: &DeploymentOptions,
    ) -> Option<Result<InvalidationResult, CdnError>> {
        let cdn_options = options.cdn.as_ref()?;

        let Some(client) = &self.cdn else {
            log::warn!(
                "CDN invalidation requested for {} but no CDN client is configured",
                cdn_options.distribution_id
            );
            return None;
        };

        let result = cdn::invalidate(client.as_ref(), cdn_options).await;
        if let Err(e) = &result {
            log::error!("{e}");
        }
        Some(result)
    }
}
