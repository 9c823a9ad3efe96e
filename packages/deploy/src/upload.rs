//! Bounded-concurrency upload pool.
//!
//! The captured task snapshot is drained through a bounded unordered
//! stream: at most `concurrency` uploads are in flight, every task is
//! attempted exactly once, and a failed upload is logged and counted
//! without disturbing its siblings.

use std::future::Future;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::stream::{self, StreamExt as _};
use s3_deploy_models::{DeploymentOptions, FileTask};

use crate::content_type::content_type_for;
use crate::progress::ProgressCallback;
use crate::store::{ObjectStore, PutObject, StoreError};

/// A single file failed to upload.
#[derive(Debug, thiserror::Error)]
#[error("Failed to upload {} -> {key}: {source}", path.display())]
pub struct UploadError {
    /// Remote key of the failed task.
    pub key: String,
    /// Local file of the failed task.
    pub path: PathBuf,
    /// Underlying store or I/O error.
    pub source: StoreError,
}

/// Result of draining the task snapshot.
#[derive(Debug, Default)]
pub struct PoolOutcome {
    /// Tasks whose upload completed successfully.
    pub succeeded: u64,
    /// Tasks in the snapshot. Fixed when the pool starts.
    pub total: u64,
    /// One entry per failed task.
    pub failures: Vec<UploadError>,
}

impl PoolOutcome {
    /// Number of failed tasks.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.failures.len() as u64
    }

    /// Whether every task succeeded.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.succeeded == self.total
    }
}

/// Runs `upload` over every task with at most `concurrency` in flight.
///
/// Each task's outcome is logged individually along with the running
/// `(count/total)` fraction. The pool returns only after every task has
/// been attempted.
pub async fn run_pool<F, Fut>(
    tasks: Vec<FileTask>,
    concurrency: NonZeroUsize,
    progress: &dyn ProgressCallback,
    upload: F,
) -> PoolOutcome
where
    F: Fn(FileTask) -> Fut,
    Fut: Future<Output = Result<(), UploadError>>,
{
    let total = tasks.len() as u64;
    progress.set_total(total);

    log::info!(
        "Uploading {total} file(s) with concurrency {}",
        concurrency.get()
    );

    let succeeded = AtomicU64::new(0);
    let attempted = AtomicU64::new(0);

    let results: Vec<Option<UploadError>> = stream::iter(tasks)
        .map(|task| {
            let key = task.key.clone();
            let pending = upload(task);
            let succeeded = &succeeded;
            let attempted = &attempted;
            async move {
                let result = pending.await;
                attempted.fetch_add(1, Ordering::Relaxed);

                let failure = match result {
                    Ok(()) => {
                        let count = succeeded.fetch_add(1, Ordering::Relaxed) + 1;
                        log::info!("Uploaded {key} ({count}/{total})");
                        None
                    }
                    Err(e) => {
                        let count = succeeded.load(Ordering::Relaxed);
                        log::error!("{e} ({count}/{total})");
                        Some(e)
                    }
                };

                progress.inc(1);
                progress.set_message(key);
                failure
            }
        })
        .buffer_unordered(concurrency.get())
        .collect()
        .await;

    let outcome = PoolOutcome {
        succeeded: succeeded.into_inner(),
        total,
        failures: results.into_iter().flatten().collect(),
    };

    debug_assert_eq!(attempted.into_inner(), total);
    progress.finish(format!("{}/{} uploaded", outcome.succeeded, outcome.total));

    outcome
}

/// Uploads one task's file to the store with its per-file metadata.
pub struct Uploader<'a> {
    store: &'a dyn ObjectStore,
    options: &'a DeploymentOptions,
}

impl<'a> Uploader<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn ObjectStore, options: &'a DeploymentOptions) -> Self {
        Self { store, options }
    }

    /// Reads the task's file and writes it to its key with the configured
    /// ACL, the extension's content type, and the no-cache directive when
    /// the key is in the PWA list.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError`] if the file cannot be read or the store
    /// rejects the write.
    pub async fn upload(&self, task: FileTask) -> Result<(), UploadError> {
        let body = match tokio::fs::read(&task.local_path).await {
            Ok(body) => body,
            Err(e) => {
                return Err(UploadError {
                    key: task.key,
                    path: task.local_path,
                    source: StoreError::Io(e),
                });
            }
        };

        let object = PutObject {
            bucket: self.options.bucket.clone(),
            key: task.key.clone(),
            body,
            content_type: content_type_for(&task.local_path),
            acl: self.options.acl,
            cache_control: self.options.cache_control_for(&task),
        };

        self.store
            .put_object(object)
            .await
            .map_err(|source| UploadError {
                key: task.key,
                path: task.local_path,
                source,
            })
    }
}

/// Uploads every task through `store` using the run's options.
pub async fn upload_all(
    store: &dyn ObjectStore,
    options: &DeploymentOptions,
    tasks: Vec<FileTask>,
    progress: &dyn ProgressCallback,
) -> PoolOutcome {
    let uploader = Uploader::new(store, options);
    run_pool(tasks, options.concurrency, progress, |task| uploader.upload(task)).await
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    use s3_deploy_models::{CannedAcl, DeployPath, NO_CACHE_CONTROL, parse_no_cache_keys};

    use super::*;
    use crate::fakes::FakeStore;
    use crate::progress::NullProgress;

    fn tasks(n: usize) -> Vec<FileTask> {
        let root = Path::new("/dist");
        (0..n)
            .map(|i| {
                FileTask::new(
                    root,
                    root.join(format!("file-{i}.txt")),
                    &DeployPath::default(),
                )
                .unwrap()
            })
            .collect()
    }

    fn failure(task: &FileTask) -> UploadError {
        UploadError {
            key: task.key.clone(),
            path: task.local_path.clone(),
            source: StoreError::Other {
                message: "simulated".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn every_task_attempted_exactly_once_for_any_concurrency() {
        let n = 7;
        for c in 1..=n {
            let seen = Mutex::new(Vec::new());
            let outcome = run_pool(
                tasks(n),
                NonZeroUsize::new(c).unwrap(),
                &NullProgress,
                |task| {
                    seen.lock().unwrap().push(task.key.clone());
                    async move {
                        tokio::task::yield_now().await;
                        if task.key.ends_with("3.txt") || task.key.ends_with("5.txt") {
                            Err(failure(&task))
                        } else {
                            Ok::<(), UploadError>(())
                        }
                    }
                },
            )
            .await;

            let seen = seen.into_inner().unwrap();
            let unique: BTreeSet<&String> = seen.iter().collect();
            assert_eq!(seen.len(), n, "concurrency {c}");
            assert_eq!(unique.len(), n, "concurrency {c}");
            assert_eq!(outcome.total, n as u64);
            assert_eq!(outcome.succeeded, 5);
            assert_eq!(outcome.succeeded + outcome.failed(), outcome.total);
            assert!(!outcome.is_complete());
        }
    }

    #[tokio::test]
    async fn in_flight_uploads_never_exceed_concurrency() {
        let in_flight = AtomicUsize::new(0);
        let max_seen = AtomicUsize::new(0);

        let outcome = run_pool(
            tasks(10),
            NonZeroUsize::new(3).unwrap(),
            &NullProgress,
            |_task| {
                let in_flight = &in_flight;
                let max_seen = &max_seen;
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    for _ in 0..3 {
                        tokio::task::yield_now().await;
                    }
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok::<(), UploadError>(())
                }
            },
        )
        .await;

        assert!(outcome.is_complete());
        assert_eq!(max_seen.load(Ordering::SeqCst), 3);
    }

    #[derive(Default)]
    struct RecordingProgress {
        events: Mutex<Vec<String>>,
    }

    impl ProgressCallback for RecordingProgress {
        fn set_total(&self, total: u64) {
            self.events.lock().unwrap().push(format!("total {total}"));
        }
        fn inc(&self, delta: u64) {
            self.events.lock().unwrap().push(format!("inc {delta}"));
        }
        fn set_message(&self, _msg: String) {}
        fn finish(&self, msg: String) {
            self.events.lock().unwrap().push(format!("finish {msg}"));
        }
    }

    #[tokio::test]
    async fn progress_sees_total_each_attempt_and_finish() {
        let progress = RecordingProgress::default();

        let outcome = run_pool(tasks(3), NonZeroUsize::MIN, &progress, |task| async move {
            if task.key.ends_with("1.txt") {
                Err(failure(&task))
            } else {
                Ok(())
            }
        })
        .await;

        assert_eq!(outcome.succeeded, 2);
        assert_eq!(
            progress.events.into_inner().unwrap(),
            vec!["total 3", "inc 1", "inc 1", "inc 1", "finish 2/3 uploaded"]
        );
    }

    #[tokio::test]
    async fn empty_snapshot_is_complete() {
        let outcome = run_pool(
            Vec::new(),
            NonZeroUsize::MIN,
            &NullProgress,
            |_task| async { Ok::<(), UploadError>(()) },
        )
        .await;

        assert_eq!(outcome.total, 0);
        assert!(outcome.is_complete());
    }

    fn write_fixture(name: &str, files: &[&str]) -> std::path::PathBuf {
        let root = std::env::temp_dir()
            .join(format!("s3_deploy_upload_{}_{name}", std::process::id()));
        let _ = std::fs::remove_dir_all(&root);
        std::fs::create_dir_all(&root).unwrap();
        for file in files {
            std::fs::write(root.join(file), b"contents").unwrap();
        }
        root
    }

    #[tokio::test]
    async fn uploads_with_content_type_acl_and_no_cache() {
        let root = write_fixture("metadata", &["sw.js", "app.js", "index.html"]);
        let mut options = DeploymentOptions::new("bucket", &root);
        options.acl = CannedAcl::Private;
        options.no_cache_keys = parse_no_cache_keys("sw.js");
        let tasks: Vec<FileTask> = ["sw.js", "app.js", "index.html"]
            .iter()
            .map(|f| FileTask::new(&root, root.join(f), &options.deploy_path).unwrap())
            .collect();
        let store = FakeStore::existing();

        let outcome = upload_all(&store, &options, tasks, &NullProgress).await;

        assert!(outcome.is_complete());
        let sw = store.put_for("sw.js").unwrap();
        assert_eq!(sw.cache_control, Some(NO_CACHE_CONTROL));
        assert_eq!(sw.content_type, "application/javascript");
        assert_eq!(sw.acl, CannedAcl::Private);
        assert_eq!(sw.size, 8);
        assert_eq!(store.put_for("app.js").unwrap().cache_control, None);
        assert_eq!(store.put_for("index.html").unwrap().content_type, "text/html");
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn unreadable_file_is_counted_as_failure() {
        let root = write_fixture("unreadable", &["present.txt"]);
        let options = DeploymentOptions::new("bucket", &root);
        let tasks = vec![
            FileTask::new(&root, root.join("present.txt"), &options.deploy_path).unwrap(),
            FileTask::new(&root, root.join("vanished.txt"), &options.deploy_path).unwrap(),
        ];
        let store = FakeStore::existing();

        let outcome = upload_all(&store, &options, tasks, &NullProgress).await;

        assert_eq!(outcome.succeeded, 1);
        assert_eq!(outcome.total, 2);
        assert_eq!(outcome.failures[0].key, "vanished.txt");
        assert!(matches!(outcome.failures[0].source, StoreError::Io(_)));
        assert_eq!(store.puts().len(), 1);
        let _ = std::fs::remove_dir_all(&root);
    }
}
