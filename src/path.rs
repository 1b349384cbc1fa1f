use serde::{Deserialize, Serialize};
use std::{borrow::Borrow, fmt};

use crate::error::{DfsResult, Error};

pub const SEPARATOR: char = '/';

/// An absolute, normalized path inside a remote store namespace.
///
/// Never ends with a separator (except the root) and never contains empty,
/// `.` or `..` components.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RemotePath(String);

impl RemotePath {
    #[must_use]
    pub fn root() -> Self {
        Self(SEPARATOR.to_string())
    }

    /// Parses a rooted path. A fully qualified `scheme://authority/path` is
    /// accepted and reduced to its path part.
    pub fn new(path: &str) -> DfsResult<Self> {
        let rooted = strip_authority(path).unwrap_or(path);
        if !rooted.starts_with(SEPARATOR) {
            return Err(Error::InvalidInput(format!("{path} is not an absolute path")));
        }

        let mut parts: Vec<&str> = Vec::new();
        for part in rooted.split(SEPARATOR) {
            match part {
                "" | "." => {}
                ".." => {
                    if parts.pop().is_none() {
                        return Err(Error::InvalidInput(format!("{path} escapes the root")));
                    }
                }
                part => parts.push(part),
            }
        }

        Ok(Self(format!("{SEPARATOR}{}", parts.join("/"))))
    }

    /// Resolves `path` against `working_dir`.
    ///
    /// Rooted and fully qualified paths are taken as they are, bare names are
    /// placed under the working directory and an empty path is the working
    /// directory itself.
    pub fn resolve(working_dir: &RemotePath, path: &str) -> DfsResult<Self> {
        if path.is_empty() {
            Ok(working_dir.clone())
        } else if path.starts_with(SEPARATOR) || strip_authority(path).is_some() {
            Self::new(path)
        } else {
            Self::new(&format!("{working_dir}{SEPARATOR}{path}"))
        }
    }

    /// Appends a single child name, as returned by a directory listing.
    #[must_use]
    pub fn join(&self, name: &str) -> Self {
        if self.is_root() {
            Self(format!("{SEPARATOR}{name}"))
        } else {
            Self(format!("{}{SEPARATOR}{name}", self.0))
        }
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.len() == 1
    }

    /// Last component; empty for the root.
    #[must_use]
    pub fn name(&self) -> &str {
        self.0.rsplit(SEPARATOR).next().unwrap_or_default()
    }

    #[must_use]
    pub fn parent(&self) -> Option<RemotePath> {
        if self.is_root() {
            return None;
        }

        match self.0.rfind(SEPARATOR) {
            Some(0) | None => Some(Self::root()),
            Some(idx) => Some(Self(self.0[..idx].to_owned())),
        }
    }

    /// Returns `true` if `self` is `other` or lies below it.
    #[must_use]
    pub fn starts_with(&self, other: &RemotePath) -> bool {
        other.is_root()
            || self.0 == other.0
            || (self.0.starts_with(&other.0) && self.0[other.0.len()..].starts_with(SEPARATOR))
    }

    /// Components from the root down, excluding the root itself.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split(SEPARATOR).filter(|part| !part.is_empty())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn strip_authority(path: &str) -> Option<&str> {
    let (scheme, rest) = path.split_once("://")?;
    if scheme.is_empty() || scheme.contains(SEPARATOR) {
        return None;
    }

    Some(rest.find(SEPARATOR).map_or("/", |idx| &rest[idx..]))
}

impl Borrow<str> for RemotePath {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RemotePath {
    type Error = Error;

    fn try_from(path: String) -> Result<Self, Self::Error> {
        Self::new(&path)
    }
}

impl From<RemotePath> for String {
    fn from(path: RemotePath) -> Self {
        path.0
    }
}
