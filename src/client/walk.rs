use std::collections::VecDeque;

use super::Session;
use crate::{error::DfsResult, file::FileEntry, path::RemotePath};

/// Depth-first traversal of a remote tree.
///
/// Directories are listed one at a time, only when the entries already listed
/// have been consumed, and the pending ones are kept on an explicit stack so
/// the depth of the tree never reaches the call stack. A path is yielded once;
/// the root itself is not yielded unless it is a file.
pub struct Walk {
    session: Session,
    root: RemotePath,
    pending: Vec<RemotePath>,
    listed: VecDeque<FileEntry>,
    finished: bool,
}

impl Walk {
    pub(super) fn new(session: Session, root: RemotePath) -> Self {
        Self {
            session,
            pending: vec![root.clone()],
            root,
            listed: VecDeque::new(),
            finished: false,
        }
    }

    #[must_use]
    pub fn root(&self) -> &RemotePath {
        &self.root
    }

    /// Returns the next entry, or `None` once the tree is exhausted.
    ///
    /// A directory that fails to list is reported and returned as an error;
    /// calling again continues with the remaining directories.
    pub async fn next_entry(&mut self) -> DfsResult<Option<FileEntry>> {
        loop {
            if let Some(entry) = self.listed.pop_front() {
                if entry.is_dir {
                    self.pending.push(entry.path.clone());
                }
                return Ok(Some(entry));
            }

            let Some(dir) = self.pending.pop() else {
                if !self.finished {
                    self.finished = true;
                    let _ = self.session.report("walk", &self.root, Ok(()));
                }
                return Ok(None);
            };

            debug!("listing {dir}");
            let children = self.session.list_status(&dir).await;
            self.listed
                .extend(self.session.report_failure("walk", &dir, children)?);
        }
    }

    /// Starts over from the root; the tree is listed again from the store.
    pub fn restart(&mut self) {
        self.pending = vec![self.root.clone()];
        self.listed.clear();
        self.finished = false;
    }

    /// Drains the remaining entries.
    pub async fn collect(mut self) -> DfsResult<Vec<FileEntry>> {
        let mut entries = Vec::new();
        while let Some(entry) = self.next_entry().await? {
            entries.push(entry);
        }
        Ok(entries)
    }
}
