#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! `s3_deploy` command-line entry point.
//!
//! Resolves options from flags and `s3-deploy.toml`, builds the S3 and
//! CloudFront clients from the default AWS credential chain, runs the
//! deployment, and exits non-zero unless every file was uploaded.

mod config;

use std::process::ExitCode;

use clap::Parser;
use s3_deploy::clients;
use s3_deploy::progress::null_progress;
use s3_deploy::{DeployError, DeployReport, Deployer, HostingOutcome};
use s3_deploy_cli_utils::IndicatifProgress;

use crate::config::Cli;

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let multi = s3_deploy_cli_utils::init_logger();
    let cli = Cli::parse();

    let quiet = cli.quiet;
    let file = config::load_file_config(cli.config.as_deref())?;
    let options = config::resolve(cli, file)?;

    let sdk_config = clients::load_sdk_config(&options).await;

    let progress = if quiet {
        null_progress()
    } else {
        IndicatifProgress::upload_bar(&multi, &options.bucket)
    };

    let mut deployer = Deployer::new(clients::object_store(&sdk_config, &options), progress);
    if let Some(cdn) = clients::cdn_client(&sdk_config, &options) {
        deployer = deployer.with_cdn(cdn);
    }

    match deployer.run(&options).await {
        Ok(report) => {
            println!("{}", summary(&options.bucket, &report));
            Ok(ExitCode::SUCCESS)
        }
        Err(DeployError::Reconciliation { report, .. }) => {
            log::error!(
                "Deploy to {} incomplete: {}/{} file(s) uploaded",
                options.bucket,
                report.uploaded,
                report.total
            );
            println!("{}", summary(&options.bucket, &report));
            Ok(ExitCode::FAILURE)
        }
        Err(e) => {
            log::error!("{e}");
            Ok(ExitCode::FAILURE)
        }
    }
}

/// One-line run summary, plus the invalidation id and status when one was
/// created.
fn summary(bucket: &str, report: &DeployReport) -> String {
    let mut line = format!(
        "{}/{} file(s) uploaded to {bucket}",
        report.uploaded, report.total
    );

    match &report.hosting {
        HostingOutcome::Skipped => {}
        HostingOutcome::Applied => line.push_str(", static hosting enabled"),
        HostingOutcome::Failed(_) => line.push_str(", static hosting failed"),
    }

    match &report.invalidation {
        Some(Ok(invalidation)) => line.push_str(&format!(
            ", invalidation {} {}",
            invalidation.id, invalidation.status
        )),
        Some(Err(_)) => line.push_str(", invalidation failed"),
        None => {}
    }

    line
}
