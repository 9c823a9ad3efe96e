//! Progress reporting for the upload pool.
//!
//! The pool only talks to [`ProgressCallback`]; whether that renders an
//! `indicatif` bar, nothing at all, or something else is decided by the
//! binary.

use std::sync::Arc;

/// Receives upload progress.
///
/// Implementations must be `Send + Sync` since every in-flight upload
/// reports through the same shared handle.
pub trait ProgressCallback: Send + Sync {
    /// Set the number of files in the snapshot.
    fn set_total(&self, total: u64);

    /// Record `delta` more attempted files.
    fn inc(&self, delta: u64);

    /// Show the key currently being reported on.
    fn set_message(&self, msg: String);

    /// Mark the run as complete with a final message.
    fn finish(&self, msg: String);
}

/// Discards every progress update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// Returns a shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
