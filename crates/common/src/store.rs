//! Storage under one store's physical root.
//!
//! A [`LocalStore`] owns a single extension class beneath a private root
//! directory and mirrors the client-visible directory layout there. It has no
//! locking: concurrent writers to the same file race and the last one wins.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::path::{PathError, VirtualPath};
use crate::routing::Extension;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to create directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read directory {path:?}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to walk store root: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Path(#[from] PathError),
}

#[derive(Debug, Clone)]
pub struct LocalStore {
    name: String,
    root: PathBuf,
    extension: Extension,
}

impl LocalStore {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>, extension: Extension) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            extension,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extension(&self) -> &Extension {
        &self.extension
    }

    pub fn resolve(&self, path: &VirtualPath) -> PathBuf {
        path.resolve(&self.root)
    }

    /// Create the root directory if it is missing.
    pub async fn ensure_root(&self) -> Result<(), StoreError> {
        create_dir_all(&self.root).await
    }

    /// Create every missing directory of `dir` below the root and return the
    /// physical directory. Calling it again for the same path is a no-op.
    pub async fn materialize_dir(&self, dir: &VirtualPath) -> Result<PathBuf, StoreError> {
        let physical = self.resolve(dir);
        create_dir_all(&physical).await?;
        Ok(physical)
    }

    /// Regular file at `path`, if one exists.
    pub async fn find_file(&self, path: &VirtualPath) -> Option<PathBuf> {
        let physical = self.resolve(path);
        match tokio::fs::metadata(&physical).await {
            Ok(meta) if meta.is_file() => Some(physical),
            _ => None,
        }
    }

    /// Delete the file at `path`. `Ok(false)` means there was nothing to
    /// delete.
    pub async fn remove(&self, path: &VirtualPath) -> Result<bool, StoreError> {
        let Some(physical) = self.find_file(path).await else {
            return Ok(false);
        };
        match tokio::fs::remove_file(&physical).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Files of this store's extension directly inside `dir`, re-qualified
    /// as virtual paths, in directory iteration order.
    ///
    /// A missing directory, or a path naming a file, lists as empty.
    pub async fn list_native(&self, dir: &VirtualPath) -> Result<Vec<VirtualPath>, StoreError> {
        let physical = self.resolve(dir);
        match tokio::fs::metadata(&physical).await {
            Ok(meta) if meta.is_dir() => {}
            _ => return Ok(Vec::new()),
        }

        let mut entries = tokio::fs::read_dir(&physical)
            .await
            .map_err(|source| StoreError::ReadDir {
                path: physical.clone(),
                source,
            })?;

        let mut listed = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                tracing::debug!("skipping non UTF-8 entry {:?}", entry.path());
                continue;
            };
            if !self.extension.matches(name) {
                continue;
            }
            if !entry.file_type().await?.is_file() {
                continue;
            }
            listed.push(dir.join(name)?);
        }
        Ok(listed)
    }

    /// Every file of this store's extension anywhere under the root.
    ///
    /// Blocking: walks the whole tree.
    pub fn native_files(&self) -> Result<Vec<PathBuf>, StoreError> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(false) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let matches = entry
                .file_name()
                .to_str()
                .is_some_and(|name| self.extension.matches(name));
            if matches {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }
}

/// Recursive, idempotent directory creation. A concurrent creator winning
/// the race is not an error.
async fn create_dir_all(path: &Path) -> Result<(), StoreError> {
    match tokio::fs::create_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
        Err(source) => Err(StoreError::CreateDir {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    use crate::path::MountToken;

    fn store(dir: &TempDir) -> LocalStore {
        LocalStore::new(
            "S3",
            dir.path().join("S3"),
            Extension::parse(".txt").unwrap(),
        )
    }

    fn vpath(raw: &str) -> VirtualPath {
        MountToken::default().parse(raw).unwrap()
    }

    #[tokio::test]
    async fn test_materialize_dir_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let dir = vpath("~S1/a/b/c");

        let first = store.materialize_dir(&dir).await.unwrap();
        let second = store.materialize_dir(&dir).await.unwrap();
        assert_eq!(first, second);
        assert!(first.is_dir());
        assert_eq!(first, temp.path().join("S3/a/b/c"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_materialize_dir_all_succeed() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let dir = vpath("~S1/shared/deep/tree");

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let dir = dir.clone();
                tokio::spawn(async move { store.materialize_dir(&dir).await })
            })
            .collect();
        for task in tasks {
            let created = task.await.unwrap().unwrap();
            assert_eq!(created, temp.path().join("S3/shared/deep/tree"));
        }
        assert!(temp.path().join("S3/shared/deep/tree").is_dir());
    }

    #[tokio::test]
    async fn test_materialize_dir_through_a_file_fails() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.ensure_root().await.unwrap();
        std::fs::write(store.root().join("blocker"), b"x").unwrap();

        let err = store.materialize_dir(&vpath("~S1/blocker/sub")).await;
        assert!(matches!(err, Err(StoreError::CreateDir { .. })));
    }

    #[tokio::test]
    async fn test_list_native_filters_by_extension() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let docs = store.materialize_dir(&vpath("~S1/docs")).await.unwrap();
        std::fs::write(docs.join("a.txt"), b"a").unwrap();
        std::fs::write(docs.join("b.pdf"), b"b").unwrap();
        std::fs::create_dir(docs.join("dir.txt")).unwrap();

        let listed = store.list_native(&vpath("~S1/docs")).await.unwrap();
        let listed: Vec<_> = listed.iter().map(ToString::to_string).collect();
        assert_eq!(listed, vec!["~S1/docs/a.txt".to_string()]);
    }

    #[tokio::test]
    async fn test_list_missing_or_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        assert!(store.list_native(&vpath("~S1/nope")).await.unwrap().is_empty());

        let docs = store.materialize_dir(&vpath("~S1/docs")).await.unwrap();
        std::fs::write(docs.join("a.txt"), b"a").unwrap();
        assert!(store
            .list_native(&vpath("~S1/docs/a.txt"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_remove() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let docs = store.materialize_dir(&vpath("~S1/docs")).await.unwrap();
        std::fs::write(docs.join("a.txt"), b"a").unwrap();

        assert!(store.remove(&vpath("~S1/docs/a.txt")).await.unwrap());
        assert!(!store.remove(&vpath("~S1/docs/a.txt")).await.unwrap());
        // directories are never removed
        assert!(!store.remove(&vpath("~S1/docs")).await.unwrap());
        assert!(docs.is_dir());
    }

    #[tokio::test]
    async fn test_native_files_walks_recursively() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        assert!(store.native_files().unwrap().is_empty());

        let deep = store.materialize_dir(&vpath("~S1/x/y")).await.unwrap();
        std::fs::write(deep.join("deep.txt"), b"d").unwrap();
        std::fs::write(store.root().join("top.txt"), b"t").unwrap();
        std::fs::write(store.root().join("skip.c"), b"s").unwrap();

        let mut files = store.native_files().unwrap();
        files.sort();
        assert_eq!(files, vec![store.root().join("top.txt"), deep.join("deep.txt")]);
    }
}
