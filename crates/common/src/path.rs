//! Client-visible virtual paths
//!
//! Every path on the wire is rooted at a symbolic mount token (`~S1` by
//! default) rather than at a real directory. Each store substitutes its own
//! physical root for the token:
//!
//! ```text
//! ~S1/docs/notes.txt  --router-->  /home/me/S1/docs/notes.txt
//!                     --backend->  /home/me/S3/docs/notes.txt
//! ```
//!
//! The token is matched explicitly, segment by segment; a path that does not
//! start with the token, or that tries to climb out with `..`, is rejected.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::routing::Extension;

/// Default mount token used by every store.
pub const DEFAULT_MOUNT_TOKEN: &str = "~S1";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("mount token must be non-empty and contain no '/' or whitespace: {0:?}")]
    InvalidToken(String),
    #[error("path {path:?} is not rooted at {token}")]
    MissingMount { path: String, token: String },
    #[error("path {0:?} escapes the mount root")]
    Traversal(String),
    #[error("invalid file name: {0:?}")]
    InvalidFileName(String),
}

/// The symbolic root every virtual path starts with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountToken(String);

impl MountToken {
    pub fn new(token: impl Into<String>) -> Result<Self, PathError> {
        let token = token.into();
        if token.is_empty() || token.contains('/') || token.chars().any(char::is_whitespace) {
            return Err(PathError::InvalidToken(token));
        }
        Ok(Self(token))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse a raw wire path into a [`VirtualPath`] under this token.
    pub fn parse(&self, raw: &str) -> Result<VirtualPath, PathError> {
        let rest = if raw == self.0 {
            ""
        } else if let Some(rest) = raw
            .strip_prefix(self.0.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
        {
            rest
        } else {
            return Err(PathError::MissingMount {
                path: raw.to_string(),
                token: self.0.clone(),
            });
        };

        let mut segments = Vec::new();
        for segment in rest.split('/') {
            match segment {
                "" | "." => continue,
                ".." => return Err(PathError::Traversal(raw.to_string())),
                s => segments.push(s.to_string()),
            }
        }

        Ok(VirtualPath {
            token: self.clone(),
            segments,
        })
    }

    /// The virtual path naming the mount root itself.
    pub fn root(&self) -> VirtualPath {
        VirtualPath {
            token: self.clone(),
            segments: Vec::new(),
        }
    }
}

impl Default for MountToken {
    fn default() -> Self {
        Self(DEFAULT_MOUNT_TOKEN.to_string())
    }
}

impl fmt::Display for MountToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A normalized path below a [`MountToken`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualPath {
    token: MountToken,
    segments: Vec<String>,
}

impl VirtualPath {
    pub fn token(&self) -> &MountToken {
        &self.token
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// The path relative to the mount root.
    pub fn relative(&self) -> PathBuf {
        self.segments.iter().collect()
    }

    /// Substitute a store's physical root for the mount token.
    pub fn resolve(&self, root: &Path) -> PathBuf {
        root.join(self.relative())
    }

    /// Last segment, if this is not the mount root.
    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn extension(&self) -> Option<Extension> {
        self.file_name().and_then(Extension::of_file_name)
    }

    /// Qualify a single directory entry back into virtual form.
    pub fn join(&self, name: &str) -> Result<VirtualPath, PathError> {
        let name = file_name_only(name)?;
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Ok(VirtualPath {
            token: self.token.clone(),
            segments,
        })
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token.as_str())?;
        for segment in &self.segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

/// Reduce a client supplied file name to its final component.
pub fn file_name_only(name: &str) -> Result<&str, PathError> {
    let base = name.rsplit('/').next().unwrap_or_default();
    if base.is_empty() || base == "." || base == ".." {
        return Err(PathError::InvalidFileName(name.to_string()));
    }
    Ok(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> MountToken {
        MountToken::default()
    }

    #[test]
    fn test_parse_root() {
        let path = token().parse("~S1").unwrap();
        assert!(path.is_root());
        assert_eq!(path.to_string(), "~S1");

        let path = token().parse("~S1/").unwrap();
        assert!(path.is_root());
    }

    #[test]
    fn test_parse_nested_normalizes_segments() {
        let path = token().parse("~S1//docs/./notes.txt").unwrap();
        assert_eq!(path.relative(), PathBuf::from("docs/notes.txt"));
        assert_eq!(path.to_string(), "~S1/docs/notes.txt");
        assert_eq!(path.file_name(), Some("notes.txt"));
    }

    #[test]
    fn test_parse_rejects_other_roots() {
        assert!(matches!(
            token().parse("/tmp/notes.txt"),
            Err(PathError::MissingMount { .. })
        ));
        // token must be followed by a separator, not glued to a name
        assert!(matches!(
            token().parse("~S1docs"),
            Err(PathError::MissingMount { .. })
        ));
        assert!(matches!(
            token().parse("~S2/docs"),
            Err(PathError::MissingMount { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_traversal() {
        assert_eq!(
            token().parse("~S1/docs/../../etc"),
            Err(PathError::Traversal("~S1/docs/../../etc".to_string()))
        );
    }

    #[test]
    fn test_resolve_against_root() {
        let path = token().parse("~S1/a/b").unwrap();
        assert_eq!(
            path.resolve(Path::new("/srv/S3")),
            PathBuf::from("/srv/S3/a/b")
        );
        assert_eq!(
            token().root().resolve(Path::new("/srv/S3")),
            PathBuf::from("/srv/S3")
        );
    }

    #[test]
    fn test_join_requalifies_entry() {
        let dir = token().parse("~S1/docs").unwrap();
        let entry = dir.join("notes.txt").unwrap();
        assert_eq!(entry.to_string(), "~S1/docs/notes.txt");
        assert_eq!(entry.extension().unwrap().as_str(), ".txt");
        assert!(dir.join("..").is_err());
    }

    #[test]
    fn test_invalid_tokens() {
        assert!(MountToken::new("").is_err());
        assert!(MountToken::new("~a/b").is_err());
        assert!(MountToken::new("~a b").is_err());
        assert!(MountToken::new("~ROOT").is_ok());
    }

    #[test]
    fn test_file_name_only() {
        assert_eq!(file_name_only("dir/sub/sample.c").unwrap(), "sample.c");
        assert_eq!(file_name_only("sample.c").unwrap(), "sample.c");
        assert!(file_name_only("dir/").is_err());
        assert!(file_name_only("..").is_err());
    }
}
