//! Resource identifiers.
//!
//! Every folder root, extra file and match is addressed by a URI. The URI
//! scheme decides which provider a query is routed to, so `file:///src` and
//! `vfs://host/src` go to different backends even if their paths agree.

use crate::error::{Result, SearchError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(Url);

impl ResourceId {
    /// Parse a URI such as `file:///home/me/notes.txt` or `untitled:Untitled-1`.
    pub fn parse(input: &str) -> Result<Self> {
        Url::parse(input)
            .map(ResourceId)
            .map_err(|e| SearchError::InvalidResource(format!("{input}: {e}")))
    }

    /// Build a `file:` resource from an absolute local path.
    pub fn from_file_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        Url::from_file_path(path).map(ResourceId).map_err(|_| {
            SearchError::InvalidResource(format!("not an absolute path: {}", path.display()))
        })
    }

    pub fn from_url(url: Url) -> Self {
        ResourceId(url)
    }

    pub fn as_url(&self) -> &Url {
        &self.0
    }

    pub fn scheme(&self) -> &str {
        self.0.scheme()
    }

    /// Path of the resource as the filesystem sees it.
    ///
    /// `file:` URIs are converted to a native path; other schemes keep their
    /// URI path verbatim.
    pub fn fs_path(&self) -> PathBuf {
        if self.scheme() == "file" {
            if let Ok(path) = self.0.to_file_path() {
                return path;
            }
        }
        PathBuf::from(self.0.path())
    }

    /// Last path segment, if any.
    pub fn file_name(&self) -> Option<String> {
        self.fs_path()
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
    }

    /// Key used to decide whether two identifiers address the same resource.
    pub fn comparison_key(&self) -> String {
        let mut url = self.0.clone();
        url.set_fragment(None);
        if url.path().len() > 1 && url.path().ends_with('/') {
            let trimmed = url.path().trim_end_matches('/').to_string();
            url.set_path(&trimmed);
        }
        url.into()
    }

    pub fn same_resource(&self, other: &ResourceId) -> bool {
        self.comparison_key() == other.comparison_key()
    }

    /// Resolve a child path below this resource.
    pub fn join(&self, relative: &str) -> Result<Self> {
        let mut base = self.0.clone();
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        base.join(relative)
            .map(ResourceId)
            .map_err(|e| SearchError::InvalidResource(format!("{relative}: {e}")))
    }

    /// True if `self` is `other` or one of its ancestors (same scheme and authority).
    pub fn is_equal_or_parent_of(&self, other: &ResourceId) -> bool {
        if self.scheme() != other.scheme() || self.0.host_str() != other.0.host_str() {
            return false;
        }
        other.fs_path().starts_with(self.fs_path())
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl FromStr for ResourceId {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        ResourceId::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_and_path() {
        let id = ResourceId::parse("vfs://host/project/src/lib.rs").unwrap();
        assert_eq!(id.scheme(), "vfs");
        assert_eq!(id.fs_path(), PathBuf::from("/project/src/lib.rs"));
        assert_eq!(id.file_name().as_deref(), Some("lib.rs"));
    }

    #[test]
    fn test_untitled_resource() {
        let id = ResourceId::parse("untitled:Untitled-1").unwrap();
        assert_eq!(id.scheme(), "untitled");
    }

    #[test]
    fn test_comparison_key_ignores_fragment_and_trailing_slash() {
        let a = ResourceId::parse("file:///work/src/").unwrap();
        let b = ResourceId::parse("file:///work/src#L10").unwrap();
        assert!(a.same_resource(&b));
        assert_eq!(
            ResourceId::parse("file:///").unwrap().comparison_key(),
            "file:///"
        );
    }

    #[test]
    fn test_join_and_parent() {
        let root = ResourceId::parse("file:///work").unwrap();
        let child = root.join("src/main.rs").unwrap();
        assert_eq!(child.to_string(), "file:///work/src/main.rs");
        assert!(root.is_equal_or_parent_of(&child));
        assert!(!child.is_equal_or_parent_of(&root));

        let other_scheme = ResourceId::parse("vfs:///work/src/main.rs").unwrap();
        assert!(!root.is_equal_or_parent_of(&other_scheme));
    }

    #[test]
    fn test_invalid_resource() {
        let err = ResourceId::parse("not a uri").unwrap_err();
        assert_eq!(err.code_str(), "invalid_resource");
    }
}
