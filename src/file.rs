use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{error::DfsResult, path::RemotePath, utils};

/// One item of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: RemotePath,
    /// Length in bytes; `0` for directories.
    pub len: u64,
    pub is_dir: bool,
    pub modified: Option<DateTime<Utc>>,
}

impl FileEntry {
    #[must_use]
    pub fn file(path: RemotePath, len: u64) -> Self {
        Self {
            path,
            len,
            is_dir: false,
            modified: None,
        }
    }

    #[must_use]
    pub fn dir(path: RemotePath) -> Self {
        Self {
            path,
            len: 0,
            is_dir: true,
            modified: None,
        }
    }

    #[must_use]
    pub fn with_modified(mut self, modified: DateTime<Utc>) -> Self {
        self.modified = Some(modified);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.path.name()
    }

    #[must_use]
    pub fn parent(&self) -> Option<RemotePath> {
        self.path.parent()
    }

    /// Length formatted by [`convert_size`](crate::convert_size).
    pub fn human_size(&self) -> DfsResult<String> {
        utils::convert_len(self.len)
    }
}

/// Status line of one storage node of a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub hostname: String,
    pub report: String,
}
