//! Local file enumeration.
//!
//! The asset root is walked once, in file-name order, and every regular
//! file whose root-relative path matches the configured glob becomes a
//! [`FileTask`]. The resulting list is the run's immutable snapshot.

use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};
use s3_deploy_models::{DeploymentOptions, FileTask, KeyError};
use walkdir::WalkDir;

/// Errors raised while building the file snapshot.
#[derive(Debug, thiserror::Error)]
pub enum FilesError {
    /// The asset root does not exist or is not a directory.
    #[error("Asset folder {} does not exist or is not a directory", path.display())]
    MissingRoot {
        /// Configured asset root.
        path: PathBuf,
    },

    /// The file pattern is not a valid glob.
    #[error("Invalid file pattern {pattern:?}: {source}")]
    Pattern {
        /// Configured pattern.
        pattern: String,
        /// Underlying glob error.
        source: globset::Error,
    },

    /// Walking the asset root failed.
    #[error("Failed to read asset folder: {0}")]
    Walk(#[from] walkdir::Error),

    /// A file could not be mapped to an object key.
    #[error(transparent)]
    Key(#[from] KeyError),
}

/// Lists regular files under `root` whose root-relative path matches
/// `pattern`, sorted by path. Symbolic links are followed and listed under
/// their own name.
///
/// # Errors
///
/// Returns [`FilesError`] if the root is missing, the pattern is invalid,
/// or the directory cannot be read.
pub fn collect_files(root: &Path, pattern: &str) -> Result<Vec<PathBuf>, FilesError> {
    if !root.is_dir() {
        return Err(FilesError::MissingRoot {
            path: root.to_path_buf(),
        });
    }

    let matcher = compile(pattern)?;
    let mut files = Vec::new();

    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };

        if matcher.is_match(slash_path(relative)) {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

/// Builds the task snapshot for a run.
///
/// # Errors
///
/// Returns [`FilesError`] if enumeration fails or any file cannot be
/// mapped to a key.
pub fn build_tasks(options: &DeploymentOptions) -> Result<Vec<FileTask>, FilesError> {
    let root = &options.dist_folder;

    collect_files(root, &options.file_pattern)?
        .into_iter()
        .map(|path| FileTask::new(root, path, &options.deploy_path).map_err(FilesError::from))
        .collect()
}

fn compile(pattern: &str) -> Result<GlobMatcher, FilesError> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|source| FilesError::Pattern {
            pattern: pattern.to_string(),
            source,
        })
}

/// `/`-joined form of a relative path, used only for glob matching.
fn slash_path(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
