//! Bundling a store's files into a single archive.

use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("{0:?} is not under the archive root")]
    OutsideRoot(PathBuf),
    #[error("archive I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A finished archive on disk. The backing file is deleted on drop.
#[derive(Debug)]
pub struct BuiltArchive {
    file: NamedTempFile,
    len: u64,
}

impl BuiltArchive {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Produces one byte stream of known length from a set of files.
///
/// Implementations block; callers run them on the blocking pool.
pub trait ArchiveBuilder: Send + Sync {
    /// Archive `files`, naming each entry relative to `root`. An empty file
    /// list still yields a valid archive.
    fn build(&self, root: &Path, files: &[PathBuf]) -> Result<BuiltArchive, ArchiveError>;
}

/// POSIX tar via the `tar` crate.
#[derive(Debug, Clone, Default)]
pub struct TarArchiveBuilder {
    scratch_dir: Option<PathBuf>,
}

impl TarArchiveBuilder {
    /// Write scratch archives under `dir` instead of the system temp dir.
    pub fn with_scratch_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: Some(dir.into()),
        }
    }

    fn scratch_file(&self) -> std::io::Result<NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("extstore-").suffix(".tar");
        match &self.scratch_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
    }
}

impl ArchiveBuilder for TarArchiveBuilder {
    fn build(&self, root: &Path, files: &[PathBuf]) -> Result<BuiltArchive, ArchiveError> {
        let mut file = self.scratch_file()?;

        let mut tar = tar::Builder::new(file.as_file_mut());
        tar.follow_symlinks(false);
        for path in files {
            let name = path
                .strip_prefix(root)
                .map_err(|_| ArchiveError::OutsideRoot(path.clone()))?;
            tar.append_path_with_name(path, name)?;
        }
        tar.finish()?;
        drop(tar);

        let len = file.as_file().metadata()?.len();
        tracing::debug!(entries = files.len(), len, "built archive for {:?}", root);
        Ok(BuiltArchive { file, len })
    }
}
