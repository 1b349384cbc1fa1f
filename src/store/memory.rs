//! In-process store.
//!
//! A [`MemoryCluster`] keeps a whole namespace in memory and describes a set of
//! simulated storage nodes. Every [`MemoryStore`] connected to the same cluster
//! sees the same files. Writers hold a per-file lease, like a namenode grants
//! one writer per file, and release it when closed or dropped.

use chrono::{DateTime, Utc};
use std::{
    collections::{BTreeMap, HashMap},
    ops::Bound,
    io::{self, Cursor},
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock},
    task::{Context, Poll},
};
use tokio::io::AsyncWrite;

use super::{Capabilities, Connector, FileStore, ReadStream, WriteStream};
use crate::{
    config::{self, Configuration},
    error::{DfsResult, Error},
    file::{FileEntry, NodeInfo},
    path::{RemotePath, SEPARATOR},
};

#[derive(Debug)]
enum Node {
    Dir {
        modified: DateTime<Utc>,
    },
    File {
        data: Vec<u8>,
        modified: DateTime<Utc>,
    },
}

#[derive(Debug)]
struct Namespace {
    nodes: BTreeMap<RemotePath, Node>,
    leases: HashMap<RemotePath, u64>,
    next_lease: u64,
}

impl Namespace {
    fn new() -> Self {
        let mut nodes = BTreeMap::new();
        let _ = nodes.insert(RemotePath::root(), Node::Dir { modified: Utc::now() });
        Self {
            nodes,
            leases: HashMap::new(),
            next_lease: 0,
        }
    }

    fn entry(path: &RemotePath, node: &Node) -> FileEntry {
        match node {
            Node::Dir { modified } => FileEntry::dir(path.clone()).with_modified(*modified),
            Node::File { data, modified } => {
                FileEntry::file(path.clone(), data.len() as u64).with_modified(*modified)
            }
        }
    }

    /// Direct children of `dir`, in key order.
    ///
    /// Seeks from child to child: once a key below a child is met, the rest of
    /// that child's subtree is skipped with a single range lookup.
    fn children(&self, dir: &RemotePath) -> Vec<FileEntry> {
        let prefix = if dir.is_root() {
            dir.to_string()
        } else {
            format!("{dir}{SEPARATOR}")
        };

        let mut entries = Vec::new();
        let mut from = prefix.clone();
        let mut inclusive = false;
        loop {
            let lower = if inclusive {
                Bound::Included(from.as_str())
            } else {
                Bound::Excluded(from.as_str())
            };
            let Some((path, node)) = self.nodes.range::<str, _>((lower, Bound::Unbounded)).next()
            else {
                break;
            };
            let Some(rest) = path.as_str().strip_prefix(&prefix) else {
                break;
            };

            match rest.find(SEPARATOR) {
                None => {
                    entries.push(Self::entry(path, node));
                    from = path.to_string();
                    inclusive = false;
                }
                // '0' sorts right after the separator
                Some(idx) => {
                    from = format!("{prefix}{}0", &rest[..idx]);
                    inclusive = true;
                }
            }
        }
        entries
    }

    fn mkdirs(&mut self, path: &RemotePath) -> DfsResult<()> {
        let mut current = RemotePath::root();
        for part in path.components() {
            current = current.join(part);
            match self.nodes.get(&current) {
                Some(Node::Dir { .. }) => {}
                Some(Node::File { .. }) => {
                    return Err(Error::operation(
                        "mkdirs",
                        path,
                        format!("{current} is a file"),
                    ))
                }
                None => {
                    let _ = self
                        .nodes
                        .insert(current.clone(), Node::Dir { modified: Utc::now() });
                }
            }
        }
        Ok(())
    }

    fn lease(&mut self, path: &RemotePath) -> DfsResult<u64> {
        if self.leases.contains_key(path) {
            return Err(Error::operation(
                "lease",
                path,
                "file is already open for writing",
            ));
        }
        self.next_lease += 1;
        let _ = self.leases.insert(path.clone(), self.next_lease);
        Ok(self.next_lease)
    }

    fn holds_lease(&self, path: &RemotePath, lease: u64) -> bool {
        self.leases.get(path) == Some(&lease)
    }
}

fn lock(namespace: &Mutex<Namespace>) -> MutexGuard<'_, Namespace> {
    namespace.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A simulated cluster: a shared namespace plus a list of storage nodes.
pub struct MemoryCluster {
    namespace: Arc<Mutex<Namespace>>,
    datanodes: Vec<NodeInfo>,
    capabilities: Capabilities,
}

impl MemoryCluster {
    /// A cluster with three storage nodes that supports append.
    #[must_use]
    pub fn new() -> Self {
        Self {
            namespace: Arc::new(Mutex::new(Namespace::new())),
            datanodes: Vec::new(),
            capabilities: Capabilities::APPEND | Capabilities::CLUSTER_TOPOLOGY,
        }
        .with_datanodes(3)
    }

    #[must_use]
    pub fn with_datanodes(mut self, count: usize) -> Self {
        self.datanodes = (1..=count)
            .map(|n| NodeInfo {
                hostname: format!("datanode-{n}"),
                report: format!(
                    "Name: 10.0.0.{n}:50010\nDecommission Status : Normal\nConfigured Capacity: {}",
                    config::DEFAULT_BLOCK_SIZE * 1024
                ),
            })
            .collect();
        self
    }

    #[must_use]
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }
}

impl Default for MemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves endpoints to registered [`MemoryCluster`]s by `host:port`.
#[derive(Default)]
pub struct MemoryConnector {
    clusters: RwLock<HashMap<String, Arc<MemoryCluster>>>,
}

impl MemoryConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `cluster` reachable at `host:port`, replacing what was there.
    pub fn register<H: Into<String>>(&self, host: H, port: u16, cluster: Arc<MemoryCluster>) {
        let authority = format!("{}:{port}", host.into());
        let _ = self
            .clusters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(authority, cluster);
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, config: &Configuration) -> DfsResult<Arc<dyn FileStore>> {
        let endpoint = config.endpoint()?;
        let authority = endpoint.authority();
        let cluster = self
            .clusters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&authority)
            .cloned()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    format!("no cluster listens on {authority}"),
                )
            })?;

        Ok(Arc::new(MemoryStore {
            cluster,
            config: config.clone(),
        }))
    }
}

/// Connection to a [`MemoryCluster`].
pub struct MemoryStore {
    cluster: Arc<MemoryCluster>,
    config: Configuration,
}

impl MemoryStore {
    fn namespace(&self) -> MutexGuard<'_, Namespace> {
        lock(&self.cluster.namespace)
    }

    fn writer(&self, path: &RemotePath, lease: u64) -> WriteStream {
        Box::new(MemoryWriter {
            namespace: self.cluster.namespace.clone(),
            path: path.clone(),
            lease,
            closed: false,
        })
    }
}

#[async_trait]
impl FileStore for MemoryStore {
    fn capabilities(&self) -> Capabilities {
        self.cluster.capabilities
    }

    fn configuration(&self) -> &Configuration {
        &self.config
    }

    async fn status(&self, path: &RemotePath) -> DfsResult<FileEntry> {
        let namespace = self.namespace();
        namespace
            .nodes
            .get(path)
            .map(|node| Namespace::entry(path, node))
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }

    async fn list_status(&self, path: &RemotePath) -> DfsResult<Vec<FileEntry>> {
        let namespace = self.namespace();
        match namespace.nodes.get(path) {
            None => Err(Error::NotFound(path.to_string())),
            Some(node @ Node::File { .. }) => Ok(vec![Namespace::entry(path, node)]),
            Some(Node::Dir { .. }) => Ok(namespace.children(path)),
        }
    }

    async fn mkdirs(&self, path: &RemotePath) -> DfsResult<bool> {
        self.namespace().mkdirs(path)?;
        Ok(true)
    }

    async fn delete(&self, path: &RemotePath, recursive: bool) -> DfsResult<bool> {
        if path.is_root() {
            return Ok(false);
        }

        let mut namespace = self.namespace();
        match namespace.nodes.get(path) {
            None => return Ok(false),
            Some(Node::Dir { .. }) if !recursive && !namespace.children(path).is_empty() => {
                return Err(Error::operation("delete", path, "directory is not empty"));
            }
            Some(_) => {}
        }

        namespace.nodes.retain(|p, _| !p.starts_with(path));
        namespace.leases.retain(|p, _| !p.starts_with(path));
        Ok(true)
    }

    async fn create(&self, path: &RemotePath, overwrite: bool) -> DfsResult<WriteStream> {
        let mut namespace = self.namespace();
        match namespace.nodes.get(path) {
            Some(Node::Dir { .. }) => {
                return Err(Error::operation("create", path, "path is a directory"));
            }
            Some(Node::File { .. }) if !overwrite => {
                return Err(Error::operation("create", path, "file already exists"));
            }
            _ => {}
        }
        if let Some(parent) = path.parent() {
            namespace.mkdirs(&parent)?;
        }

        let lease = namespace.lease(path)?;
        let _ = namespace.nodes.insert(
            path.clone(),
            Node::File {
                data: Vec::new(),
                modified: Utc::now(),
            },
        );
        drop(namespace);

        Ok(self.writer(path, lease))
    }

    async fn append(&self, path: &RemotePath) -> DfsResult<WriteStream> {
        if !self.cluster.capabilities.contains(Capabilities::APPEND) {
            return Err(Error::Unsupported(format!("append to {path}")));
        }

        let mut namespace = self.namespace();
        match namespace.nodes.get(path) {
            None => return Err(Error::NotFound(path.to_string())),
            Some(Node::Dir { .. }) => {
                return Err(Error::operation("append", path, "path is a directory"));
            }
            Some(Node::File { .. }) => {}
        }
        let lease = namespace.lease(path)?;
        drop(namespace);

        Ok(self.writer(path, lease))
    }

    async fn open(&self, path: &RemotePath) -> DfsResult<ReadStream> {
        let namespace = self.namespace();
        match namespace.nodes.get(path) {
            None => Err(Error::NotFound(path.to_string())),
            Some(Node::Dir { .. }) => Err(Error::operation("open", path, "path is a directory")),
            Some(Node::File { data, .. }) => Ok(Box::new(Cursor::new(data.clone()))),
        }
    }

    async fn datanode_report(&self) -> DfsResult<Vec<NodeInfo>> {
        if !self.cluster.capabilities.contains(Capabilities::CLUSTER_TOPOLOGY) {
            return Err(Error::Unsupported("cluster topology".to_owned()));
        }
        Ok(self.cluster.datanodes.clone())
    }
}

/// Appends straight into the namespace; the lease is given back on shutdown or drop.
///
/// A writer whose lease is gone, because the file was deleted and possibly
/// created again, fails every write and leaves the current lease alone.
struct MemoryWriter {
    namespace: Arc<Mutex<Namespace>>,
    path: RemotePath,
    lease: u64,
    closed: bool,
}

impl MemoryWriter {
    fn release(&mut self) {
        if !self.closed {
            let mut namespace = lock(&self.namespace);
            if namespace.holds_lease(&self.path, self.lease) {
                let _ = namespace.leases.remove(&self.path);
            }
            self.closed = true;
        }
    }
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize, io::Error>> {
        if self.closed {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "stream is closed",
            )));
        }

        let mut namespace = lock(&self.namespace);
        if !namespace.holds_lease(&self.path, self.lease) {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                format!("lease on {} was revoked", self.path),
            )));
        }
        match namespace.nodes.get_mut(&self.path) {
            Some(Node::File { data, modified }) => {
                data.extend_from_slice(buf);
                *modified = Utc::now();
                Poll::Ready(Ok(buf.len()))
            }
            _ => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} was removed while open", self.path),
            ))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Result<(), io::Error>> {
        self.release();
        Poll::Ready(Ok(()))
    }
}

impl Drop for MemoryWriter {
    fn drop(&mut self) {
        self.release();
    }
}
