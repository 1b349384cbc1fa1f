//! Convenience client for remote distributed file stores.
//!
//! A [`FileStoreClient`] turns an endpoint into a [`Session`], which offers
//! the usual chores on the remote namespace: create and remove directory
//! trees, upload and download, walk a tree, and read, write or append framed
//! text records. The store itself is reached through the
//! [`FileStore`](store::FileStore) trait.
//!
//! ```no_run
//! use std::sync::Arc;
//! use dfs_util::{FileStoreClient, store::{MemoryCluster, MemoryConnector}};
//!
//! # async fn demo() -> dfs_util::error::DfsResult<()> {
//! let connector = MemoryConnector::new();
//! connector.register("namenode", 8020, Arc::new(MemoryCluster::new()));
//! let client = FileStoreClient::new().register("hdfs", connector);
//!
//! let session = client.connect("namenode", 8020).await?;
//! session.mkdirs("reports").await?;
//! session.write("reports/today", "all good").await?;
//! assert_eq!(session.read("reports/today").await?, "all good");
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate log;
#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate async_trait;

mod buf;
pub mod client;
pub mod config;
pub mod error;
pub mod file;
pub mod path;
pub mod report;
/// Store backends and the trait they implement
pub mod store;
mod utils;

pub use buf::MAX_RECORD_LEN;
pub use client::{FileStoreClient, Session, Walk};
pub use config::{Configuration, Endpoint};
pub use file::{FileEntry, NodeInfo};
pub use path::RemotePath;
pub use utils::convert_size;
