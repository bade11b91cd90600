//! Extension based placement.
//!
//! The file-name extension is the only routing key. Exactly one extension is
//! stored natively by the router; every other supported extension belongs to
//! exactly one backend. The table is built once from configuration and never
//! mutated afterwards.

use std::collections::HashMap;
use std::fmt;

/// A file-name extension including its leading dot, e.g. `.txt`.
///
/// Matching is case-sensitive: `.TXT` and `.txt` are different keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Extension(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtensionError {
    #[error("extension must start with '.' and name at least one character: {0:?}")]
    Malformed(String),
}

impl Extension {
    pub fn parse(raw: &str) -> Result<Self, ExtensionError> {
        match raw.strip_prefix('.') {
            Some(rest) if !rest.is_empty() && !rest.contains(['.', '/']) => {
                Ok(Self(raw.to_string()))
            }
            _ => Err(ExtensionError::Malformed(raw.to_string())),
        }
    }

    /// Take everything from the last `.` of a file name.
    pub fn of_file_name(name: &str) -> Option<Self> {
        let base = name.rsplit('/').next()?;
        let idx = base.rfind('.')?;
        if idx + 1 == base.len() {
            return None;
        }
        Some(Self(base[idx..].to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short upper-case label used in status replies (`.txt` -> `TXT`).
    pub fn label(&self) -> String {
        self.0.trim_start_matches('.').to_uppercase()
    }

    pub fn matches(&self, file_name: &str) -> bool {
        Self::of_file_name(file_name).as_ref() == Some(self)
    }
}

impl fmt::Display for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Index of a backend in the configured fan-out order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BackendId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Stored by the router itself.
    Native,
    Backend(BackendId),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssignmentError {
    #[error("extension {0} is assigned more than once")]
    Duplicate(Extension),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("file has no extension")]
    NoExtension,
    #[error("unsupported file type {0}")]
    Unsupported(Extension),
}

/// Static mapping from [`Extension`] to [`Placement`].
#[derive(Debug, Clone)]
pub struct StoreAssignment {
    native: Extension,
    table: HashMap<Extension, Placement>,
}

impl StoreAssignment {
    pub fn new(native: Extension) -> Self {
        let mut table = HashMap::new();
        table.insert(native.clone(), Placement::Native);
        Self { native, table }
    }

    pub fn assign(&mut self, extension: Extension, id: BackendId) -> Result<(), AssignmentError> {
        if self.table.contains_key(&extension) {
            return Err(AssignmentError::Duplicate(extension));
        }
        self.table.insert(extension, Placement::Backend(id));
        Ok(())
    }

    pub fn native(&self) -> &Extension {
        &self.native
    }

    pub fn resolve(&self, extension: &Extension) -> Option<Placement> {
        self.table.get(extension).copied()
    }

    pub fn route_file_name(&self, file_name: &str) -> Result<Placement, RouteError> {
        let extension = Extension::of_file_name(file_name).ok_or(RouteError::NoExtension)?;
        self.resolve(&extension)
            .ok_or(RouteError::Unsupported(extension))
    }

    /// Every supported extension with its placement, native first.
    pub fn entries(&self) -> Vec<(Extension, Placement)> {
        let mut entries: Vec<_> = self
            .table
            .iter()
            .map(|(ext, placement)| (ext.clone(), *placement))
            .collect();
        entries.sort_by_key(|(_, placement)| match placement {
            Placement::Native => None,
            Placement::Backend(id) => Some(*id),
        });
        entries
    }
}
