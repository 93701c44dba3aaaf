// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource path normalization for lock comparison.
//!
//! Lock equality is string equality on the normalized form, so every claim
//! path must normalize identically regardless of how the planner spelled it.
//! Prefix containment is NOT a conflict: locking `a/b` does not lock `a/b/c`.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// A normalized filesystem resource named by a claim.
///
/// Absolute, lexically folded (`.` and `..` removed), symlink-resolved when
/// the path exists on disk. A trailing `/` is preserved as a marker that the
/// claim locks the directory as a single named resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourcePath(String);

impl ResourcePath {
    /// Normalize a raw claim path against the job working directory.
    pub fn normalize(raw: &str, base: &Path) -> Self {
        let is_dir = raw.ends_with('/');
        let joined = {
            let p = Path::new(raw);
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                base.join(p)
            }
        };

        // Resolve symlinks when the target exists; otherwise fold lexically
        // so claims on not-yet-created files still normalize consistently.
        let resolved = std::fs::canonicalize(&joined).unwrap_or_else(|_| lexical_fold(&joined));

        let mut s = resolved.to_string_lossy().into_owned();
        if is_dir && !s.ends_with('/') {
            s.push('/');
        }
        Self(s)
    }

    /// Construct from an already-normalized string (store rehydration).
    pub fn from_normalized(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when this resource names a directory locked as a unit.
    pub fn is_dir(&self) -> bool {
        self.0.ends_with('/')
    }
}

impl std::fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::borrow::Borrow<str> for ResourcePath {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Fold `.` and `..` components without touching the filesystem.
fn lexical_fold(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
#[path = "respath_tests.rs"]
mod tests;
