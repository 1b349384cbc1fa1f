use bytes::{Buf, Bytes, BytesMut};
use std::{fmt::Display, io, path::Path, sync::Arc};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    sync::{Mutex, MutexGuard},
};

use super::Walk;
use crate::{
    buf::{decode_utf, PutBuf, TryBuf},
    config::Endpoint,
    error::{DfsResult, Error},
    file::{FileEntry, NodeInfo},
    path::RemotePath,
    report::{Outcome, Reporter},
    store::{Capabilities, FileStore, ReadStream, WriteStream},
};

/// High-level access to one connected store.
///
/// Paths given as `&str` are resolved against the session working directory,
/// see [`RemotePath::resolve`]. Every call reports exactly one outcome to the
/// client reporter, and returns the same outcome to the caller.
///
/// Clones share the connection. Unless the store declares
/// [`Capabilities::CONCURRENT`], requests made through one connection (and its
/// clones) are serialized; other connections are never blocked.
#[derive(Clone)]
pub struct Session {
    store: Arc<dyn FileStore>,
    gate: Option<Arc<Mutex<()>>>,
    endpoint: Endpoint,
    working_dir: RemotePath,
    reporter: Arc<dyn Reporter>,
}

impl Session {
    pub(crate) fn new(
        store: Arc<dyn FileStore>,
        endpoint: Endpoint,
        reporter: Arc<dyn Reporter>,
    ) -> DfsResult<Self> {
        let working_dir = store.configuration().working_dir()?;
        let gate = if store.capabilities().contains(Capabilities::CONCURRENT) {
            None
        } else {
            Some(Arc::new(Mutex::new(())))
        };

        Ok(Self {
            store,
            gate,
            endpoint,
            working_dir,
            reporter,
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.store.capabilities()
    }

    /// Returns `true` if requests on this connection run one at a time.
    #[must_use]
    pub fn is_serialized(&self) -> bool {
        self.gate.is_some()
    }

    #[must_use]
    pub fn working_directory(&self) -> &RemotePath {
        &self.working_dir
    }

    /// Changes the directory relative paths are resolved against. Only this
    /// handle is affected, not its clones.
    pub fn set_working_directory(&mut self, path: &str) -> DfsResult<()> {
        self.working_dir = self.resolve_for("cd", path)?;
        Ok(())
    }

    pub fn resolve(&self, path: &str) -> DfsResult<RemotePath> {
        RemotePath::resolve(&self.working_dir, path)
    }

    /// Storage nodes of the cluster, for stores that expose them.
    pub async fn list_cluster_nodes(&self) -> DfsResult<Vec<NodeInfo>> {
        let result = {
            let _gate = self.acquire().await;
            self.store.datanode_report().await
        };
        self.report("list nodes", &self.endpoint, result)
    }

    /// Effective settings, in the order the configuration holds them.
    pub fn list_config(&self) -> Vec<(String, String)> {
        let entries: Vec<_> = self
            .store
            .configuration()
            .iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        for (key, value) in &entries {
            info!("{key}: {value}");
        }
        self.reporter
            .report("list config", &self.endpoint.to_string(), Outcome::Done);
        entries
    }

    /// Creates `dir` and its missing parents.
    pub async fn mkdirs(&self, dir: &str) -> DfsResult<bool> {
        let path = self.resolve_for("mkdirs", dir)?;
        let result = {
            let _gate = self.acquire().await;
            self.store.mkdirs(&path).await
        };
        self.report_flag("mkdirs", &path, result)
    }

    /// Removes `dir` with everything below it. `Ok(false)` when nothing was there.
    pub async fn rmdirs(&self, dir: &str) -> DfsResult<bool> {
        let path = self.resolve_for("rmdirs", dir)?;
        let result = {
            let _gate = self.acquire().await;
            self.store.delete(&path, true).await
        };
        self.report_flag("rmdirs", &path, result)
    }

    /// Copies a local file or tree to `remote`. The source is left in place and
    /// existing remote files are overwritten.
    pub async fn upload<P: AsRef<Path>>(&self, local: P, remote: &str) -> DfsResult<()> {
        let local = local.as_ref();
        let target = format!("{} to {remote}", local.display());
        let dst = self.report_failure("upload", &target, self.resolve(remote))?;
        let result = {
            let _gate = self.acquire().await;
            self.store.copy_from_local(local, &dst).await
        };
        self.report("upload", &target, result)
    }

    /// Copies `remote` to the local filesystem.
    pub async fn download<P: AsRef<Path>>(&self, local: P, remote: &str) -> DfsResult<()> {
        let local = local.as_ref();
        let target = format!("{remote} to {}", local.display());
        let src = self.report_failure("download", &target, self.resolve(remote))?;
        let result = {
            let _gate = self.acquire().await;
            self.store.copy_to_local(&src, local).await
        };
        self.report("download", &target, result)
    }

    /// Replaces the file at `path` with a single framed record holding `data`.
    pub async fn write(&self, path: &str, data: &str) -> DfsResult<()> {
        let dst = self.resolve_for("write", path)?;
        let result = {
            let _gate = self.acquire().await;
            write_record(self.store.create(&dst, true).await, data).await
        };
        self.report("write", &dst, result)
    }

    /// Adds one framed record holding `data` at the end of an existing file.
    pub async fn append(&self, path: &str, data: &str) -> DfsResult<()> {
        let dst = self.resolve_for("append", path)?;
        let result = {
            let _gate = self.acquire().await;
            write_record(self.store.append(&dst).await, data).await
        };
        self.report("append", &dst, result)
    }

    /// Reads the first framed record of the file at `path`.
    pub async fn read(&self, path: &str) -> DfsResult<String> {
        let src = self.resolve_for("read", path)?;
        let result = {
            let _gate = self.acquire().await;
            read_record(self.store.open(&src).await).await
        };
        self.report("read", &src, result)
    }

    /// Reads every framed record of the file at `path`, in order.
    pub async fn read_records(&self, path: &str) -> DfsResult<Vec<String>> {
        let src = self.resolve_for("read", path)?;
        let result = {
            let _gate = self.acquire().await;
            read_all_records(self.store.open(&src).await).await
        };
        self.report("read", &src, result)
    }

    pub async fn exists(&self, path: &str) -> DfsResult<bool> {
        let target = self.resolve_for("exists", path)?;
        let result = match self.stat(&target).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        };
        self.report("exists", &target, result)
    }

    pub async fn status(&self, path: &str) -> DfsResult<FileEntry> {
        let target = self.resolve_for("status", path)?;
        let result = self.stat(&target).await;
        self.report("status", &target, result)
    }

    /// Entries directly below `path`; a file lists as itself.
    pub async fn list(&self, path: &str) -> DfsResult<Vec<FileEntry>> {
        let target = self.resolve_for("list", path)?;
        let result = self.list_status(&target).await;
        self.report("list", &target, result)
    }

    /// Lazily enumerates everything below `path`, directories included.
    pub fn walk(&self, path: &str) -> DfsResult<Walk> {
        let root = self.resolve_for("walk", path)?;
        Ok(Walk::new(self.clone(), root))
    }

    /// Every file below `path`.
    pub async fn list_files(&self, path: &str) -> DfsResult<Vec<FileEntry>> {
        let mut walk = self.walk(path)?;
        let mut files = Vec::new();
        while let Some(entry) = walk.next_entry().await? {
            if !entry.is_dir {
                files.push(entry);
            }
        }
        Ok(files)
    }

    /// Writes `<size>\t<path>` for every file below `path`, returning how many
    /// lines were written.
    pub async fn print_tree<W: io::Write>(&self, path: &str, out: &mut W) -> DfsResult<usize> {
        let mut walk = self.walk(path)?;
        let mut count = 0;
        while let Some(entry) = walk.next_entry().await? {
            if entry.is_dir {
                continue;
            }
            let line = entry
                .human_size()
                .and_then(|size| Ok(writeln!(out, "{size}\t{}", entry.path)?));
            self.report_failure("print", &entry.path, line)?;
            count += 1;
        }
        Ok(count)
    }

    /// Releases the connection shared by this handle and its clones.
    pub async fn close(&self) -> DfsResult<()> {
        let result = {
            let _gate = self.acquire().await;
            self.store.close().await
        };
        self.report("close", &self.endpoint, result)
    }

    pub(super) async fn list_status(&self, dir: &RemotePath) -> DfsResult<Vec<FileEntry>> {
        let _gate = self.acquire().await;
        self.store.list_status(dir).await
    }

    async fn stat(&self, path: &RemotePath) -> DfsResult<FileEntry> {
        let _gate = self.acquire().await;
        self.store.status(path).await
    }

    async fn acquire(&self) -> Option<MutexGuard<'_, ()>> {
        match &self.gate {
            Some(gate) => Some(gate.lock().await),
            None => None,
        }
    }

    /// Resolves `path`, reporting only a failure.
    fn resolve_for(&self, op: &str, path: &str) -> DfsResult<RemotePath> {
        self.report_failure(op, path, self.resolve(path))
    }

    pub(super) fn report<T>(&self, op: &str, target: impl Display, result: DfsResult<T>) -> DfsResult<T> {
        let target = target.to_string();
        match &result {
            Ok(_) => self.reporter.report(op, &target, Outcome::Done),
            Err(err) => self.reporter.report(op, &target, Outcome::Failed(err)),
        }
        result
    }

    fn report_flag(&self, op: &str, target: impl Display, result: DfsResult<bool>) -> DfsResult<bool> {
        let target = target.to_string();
        match &result {
            Ok(true) => self.reporter.report(op, &target, Outcome::Done),
            Ok(false) => self.reporter.report(op, &target, Outcome::Declined),
            Err(err) => self.reporter.report(op, &target, Outcome::Failed(err)),
        }
        result
    }

    pub(super) fn report_failure<T>(
        &self,
        op: &str,
        target: impl Display,
        result: DfsResult<T>,
    ) -> DfsResult<T> {
        if let Err(err) = &result {
            self.reporter
                .report(op, &target.to_string(), Outcome::Failed(err));
        }
        result
    }
}

// The stream is dropped, and so released, on every early return.
async fn write_record(stream: DfsResult<WriteStream>, data: &str) -> DfsResult<()> {
    let mut stream = stream?;
    let mut record = BytesMut::new();
    record.put_utf(data)?;
    stream.write_all(&record).await?;
    stream.shutdown().await?;
    Ok(())
}

async fn read_record(stream: DfsResult<ReadStream>) -> DfsResult<String> {
    let mut stream = stream?;
    let len = stream.read_u16().await.map_err(|err| match err.kind() {
        io::ErrorKind::UnexpectedEof => Error::Framing("file holds no record".to_owned()),
        _ => err.into(),
    })?;

    let mut body = vec![0; usize::from(len)];
    stream.read_exact(&mut body).await.map_err(|err| match err.kind() {
        io::ErrorKind::UnexpectedEof => {
            Error::Framing(format!("record announces {len} bytes, file is shorter"))
        }
        _ => err.into(),
    })?;

    decode_utf(&body)
}

async fn read_all_records(stream: DfsResult<ReadStream>) -> DfsResult<Vec<String>> {
    let mut stream = stream?;
    let mut data = Vec::new();
    let _ = stream.read_to_end(&mut data).await?;

    let mut data = Bytes::from(data);
    let mut records = Vec::new();
    while data.has_remaining() {
        records.push(data.try_get_utf()?);
    }
    Ok(records)
}
