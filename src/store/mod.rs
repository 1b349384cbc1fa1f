//! The external store seam.
//!
//! A [`FileStore`] is the client of one remote distributed filesystem. The
//! session layer never talks to a store in any other way, so a new backend
//! only needs this trait and a [`Connector`] that builds it from a
//! [`Configuration`].

mod copy;
pub mod local;
pub mod memory;

use serde::{Deserialize, Serialize};
use std::{path::Path, sync::Arc};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    config::Configuration,
    error::{DfsResult, Error},
    file::{FileEntry, NodeInfo},
    path::RemotePath,
};

pub use local::{LocalConnector, LocalStore};
pub use memory::{MemoryCluster, MemoryConnector, MemoryStore};

pub type ReadStream = Box<dyn AsyncRead + Send + Unpin>;
/// Writable stream on a store file. Dropping it releases the file.
pub type WriteStream = Box<dyn AsyncWrite + Send + Unpin>;

/// Optional features declared by a store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capabilities(u32);

bitflags! {
    impl Capabilities: u32 {
        /// Existing files can be reopened for appending.
        const APPEND = 0x00000001;
        /// The store reports its storage nodes.
        const CLUSTER_TOPOLOGY = 0x00000002;
        /// Requests may run concurrently on one connection.
        const CONCURRENT = 0x00000004;
    }
}

#[async_trait]
pub trait FileStore: Send + Sync {
    fn capabilities(&self) -> Capabilities;

    /// Effective settings of this connection.
    fn configuration(&self) -> &Configuration;

    /// Metadata of a single path.
    async fn status(&self, path: &RemotePath) -> DfsResult<FileEntry>;

    /// Children of a directory, or the entry itself for a file.
    async fn list_status(&self, path: &RemotePath) -> DfsResult<Vec<FileEntry>>;

    /// Creates a directory and its missing parents. An existing directory is a success.
    async fn mkdirs(&self, path: &RemotePath) -> DfsResult<bool>;

    /// Returns `false` when there was nothing to delete.
    async fn delete(&self, path: &RemotePath, recursive: bool) -> DfsResult<bool>;

    /// Creates missing parents, truncates an existing file when `overwrite` is set.
    async fn create(&self, path: &RemotePath, overwrite: bool) -> DfsResult<WriteStream>;

    async fn append(&self, path: &RemotePath) -> DfsResult<WriteStream> {
        Err(Error::Unsupported(format!("append to {path}")))
    }

    async fn open(&self, path: &RemotePath) -> DfsResult<ReadStream>;

    async fn datanode_report(&self) -> DfsResult<Vec<NodeInfo>> {
        Err(Error::Unsupported("cluster topology".to_owned()))
    }

    /// Copies a local file or directory tree to `dst`, overwriting what is there.
    ///
    /// If `dst` is an existing directory the source is placed inside it.
    async fn copy_from_local(&self, src: &Path, dst: &RemotePath) -> DfsResult<()> {
        copy::from_local(self, src, dst).await
    }

    /// Copies `src` to the local filesystem, the mirror of [`Self::copy_from_local`].
    async fn copy_to_local(&self, src: &RemotePath, dst: &Path) -> DfsResult<()> {
        copy::to_local(self, src, dst).await
    }

    async fn close(&self) -> DfsResult<()> {
        Ok(())
    }
}

/// Builds stores for one URL scheme.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &Configuration) -> DfsResult<Arc<dyn FileStore>>;
}
