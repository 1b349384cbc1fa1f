//! Store backed by a directory of the local filesystem.
//!
//! The remote namespace is mapped below a root directory, so `/a/b` lives at
//! `<root>/a/b`. Reached through the `file` scheme.

use std::{
    fs::Metadata,
    io,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::fs::{self, OpenOptions};

use super::{Capabilities, Connector, FileStore, ReadStream, WriteStream};
use crate::{
    config::Configuration,
    error::{DfsResult, Error},
    file::FileEntry,
    path::RemotePath,
    utils,
};

pub const SCHEME: &str = "file";

/// Metadata of an entry met while descending a local tree.
///
/// Symbolic links are followed only to regular files. A link to a directory,
/// a dangling link or a link loop gives `None`, so a traversal never revisits
/// a directory through a link.
pub(super) async fn walkable_metadata(child: &fs::DirEntry) -> io::Result<Option<Metadata>> {
    if !child.file_type().await?.is_symlink() {
        return child.metadata().await.map(Some);
    }
    match fs::metadata(child.path()).await {
        Ok(meta) if meta.is_file() => Ok(Some(meta)),
        _ => Ok(None),
    }
}

/// Opens [`LocalStore`]s rooted at one directory, whatever the endpoint host.
#[derive(Debug, Clone)]
pub struct LocalConnector {
    root: PathBuf,
}

impl LocalConnector {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Connector for LocalConnector {
    async fn connect(&self, config: &Configuration) -> DfsResult<Arc<dyn FileStore>> {
        let meta = fs::metadata(&self.root).await?;
        if !meta.is_dir() {
            return Err(Error::InvalidInput(format!(
                "{} is not a directory",
                self.root.display()
            )));
        }

        Ok(Arc::new(LocalStore {
            root: self.root.clone(),
            config: config.clone(),
        }))
    }
}

pub struct LocalStore {
    root: PathBuf,
    config: Configuration,
}

impl LocalStore {
    fn local(&self, path: &RemotePath) -> PathBuf {
        path.components()
            .fold(self.root.clone(), |local, part| local.join(part))
    }

    fn map_err<'a>(op: &'static str, path: &'a RemotePath) -> impl FnOnce(io::Error) -> Error + 'a {
        move |err| match err.kind() {
            io::ErrorKind::NotFound => Error::NotFound(path.to_string()),
            _ => Error::operation(op, path, err),
        }
    }

    async fn entry(path: RemotePath, local: &Path) -> io::Result<FileEntry> {
        let meta = fs::metadata(local).await?;
        Ok(Self::from_metadata(path, &meta))
    }

    fn from_metadata(path: RemotePath, meta: &Metadata) -> FileEntry {
        let entry = if meta.is_dir() {
            FileEntry::dir(path)
        } else {
            FileEntry::file(path, meta.len())
        };

        match meta.modified() {
            Ok(time) => entry.with_modified(utils::datetime(time)),
            Err(_) => entry,
        }
    }
}

#[async_trait]
impl FileStore for LocalStore {
    fn capabilities(&self) -> Capabilities {
        Capabilities::APPEND | Capabilities::CONCURRENT
    }

    fn configuration(&self) -> &Configuration {
        &self.config
    }

    async fn status(&self, path: &RemotePath) -> DfsResult<FileEntry> {
        Self::entry(path.clone(), &self.local(path))
            .await
            .map_err(Self::map_err("stat", path))
    }

    async fn list_status(&self, path: &RemotePath) -> DfsResult<Vec<FileEntry>> {
        let local = self.local(path);
        let entry = Self::entry(path.clone(), &local)
            .await
            .map_err(Self::map_err("list", path))?;
        if !entry.is_dir {
            return Ok(vec![entry]);
        }

        let mut entries = Vec::new();
        let mut dir = fs::read_dir(&local).await.map_err(Self::map_err("list", path))?;
        while let Some(child) = dir.next_entry().await.map_err(Self::map_err("list", path))? {
            let Some(name) = child.file_name().to_str().map(ToOwned::to_owned) else {
                warn!("skipping non UTF-8 name in {}", local.display());
                continue;
            };
            let Some(meta) = walkable_metadata(&child)
                .await
                .map_err(Self::map_err("list", path))?
            else {
                warn!("not following link {}", child.path().display());
                continue;
            };
            entries.push(Self::from_metadata(path.join(&name), &meta));
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(entries)
    }

    async fn mkdirs(&self, path: &RemotePath) -> DfsResult<bool> {
        fs::create_dir_all(self.local(path))
            .await
            .map_err(|err| Error::operation("mkdirs", path, err))?;
        Ok(true)
    }

    async fn delete(&self, path: &RemotePath, recursive: bool) -> DfsResult<bool> {
        if path.is_root() {
            return Ok(false);
        }

        let local = self.local(path);
        let meta = match fs::symlink_metadata(&local).await {
            Ok(meta) => meta,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(Error::operation("delete", path, err)),
        };

        let result = if !meta.is_dir() {
            fs::remove_file(&local).await
        } else if recursive {
            fs::remove_dir_all(&local).await
        } else {
            fs::remove_dir(&local).await
        };
        result.map_err(|err| Error::operation("delete", path, err))?;

        Ok(true)
    }

    async fn create(&self, path: &RemotePath, overwrite: bool) -> DfsResult<WriteStream> {
        let local = self.local(path);
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| Error::operation("create", path, err))?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create(overwrite)
            .create_new(!overwrite)
            .truncate(overwrite)
            .open(&local)
            .await
            .map_err(|err| Error::operation("create", path, err))?;

        Ok(Box::new(file))
    }

    async fn append(&self, path: &RemotePath) -> DfsResult<WriteStream> {
        let file = OpenOptions::new()
            .append(true)
            .open(self.local(path))
            .await
            .map_err(Self::map_err("append", path))?;

        Ok(Box::new(file))
    }

    async fn open(&self, path: &RemotePath) -> DfsResult<ReadStream> {
        let local = self.local(path);
        let meta = fs::metadata(&local).await.map_err(Self::map_err("open", path))?;
        if meta.is_dir() {
            return Err(Error::operation("open", path, "path is a directory"));
        }

        let file = fs::File::open(&local)
            .await
            .map_err(Self::map_err("open", path))?;
        Ok(Box::new(file))
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;
    use crate::config::Endpoint;

    fn path(s: &str) -> RemotePath {
        RemotePath::new(s).unwrap()
    }

    async fn store(root: &Path) -> Arc<dyn FileStore> {
        let config = Configuration::for_endpoint(&Endpoint::with_scheme(SCHEME, "localhost", 0));
        LocalConnector::new(root).connect(&config).await.unwrap()
    }

    #[tokio::test]
    async fn paths_map_below_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;

        let mut w = store.create(&path("/x/y.txt"), true).await.unwrap();
        w.write_all(b"abc").await.unwrap();
        w.shutdown().await.unwrap();

        assert_eq!(std::fs::read(dir.path().join("x").join("y.txt")).unwrap(), b"abc");
        let entry = store.status(&path("/x/y.txt")).await.unwrap();
        assert_eq!(entry.len, 3);
        assert!(entry.modified.is_some());
    }

    #[tokio::test]
    async fn append_extends_and_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;

        assert!(store.append(&path("/none")).await.err().unwrap().is_not_found());

        let mut w = store.create(&path("/f"), true).await.unwrap();
        w.write_all(b"a").await.unwrap();
        w.shutdown().await.unwrap();
        let mut w = store.append(&path("/f")).await.unwrap();
        w.write_all(b"b").await.unwrap();
        w.shutdown().await.unwrap();

        let mut buf = String::new();
        let _ = store.open(&path("/f")).await.unwrap().read_to_string(&mut buf).await.unwrap();
        assert_eq!(buf, "ab");
    }

    #[tokio::test]
    async fn listing_is_sorted_and_delete_reports_absence() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;
        for name in ["/d/b", "/d/a", "/d/c"] {
            drop(store.create(&path(name), true).await.unwrap());
        }

        let names: Vec<_> = store
            .list_status(&path("/d"))
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name().to_owned())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);

        assert!(store.delete(&path("/d"), false).await.is_err());
        assert!(store.delete(&path("/d"), true).await.unwrap());
        assert!(!store.delete(&path("/d"), true).await.unwrap());
    }

    #[tokio::test]
    async fn missing_root_cannot_connect() {
        let dir = tempfile::tempdir().unwrap();
        let config = Configuration::for_endpoint(&Endpoint::with_scheme(SCHEME, "localhost", 0));
        let result = LocalConnector::new(dir.path().join("missing")).connect(&config).await;
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn links_are_followed_to_files_only() {
        use std::os::unix::fs::symlink;

        let dir = tempfile::tempdir().unwrap();
        let d = dir.path().join("d");
        std::fs::create_dir(&d).unwrap();
        std::fs::write(d.join("f"), b"abc").unwrap();
        symlink(d.join("f"), d.join("f_link")).unwrap();
        symlink(&d, d.join("loop")).unwrap();
        symlink(d.join("gone"), d.join("dangling")).unwrap();

        let store = store(dir.path()).await;
        let names: Vec<_> = store
            .list_status(&path("/d"))
            .await
            .unwrap()
            .into_iter()
            .map(|e| (e.name().to_owned(), e.len))
            .collect();
        assert_eq!(names, vec![("f".to_owned(), 3), ("f_link".to_owned(), 3)]);

        // uploading the same tree applies the same rule
        store.copy_from_local(&d, &path("/up")).await.unwrap();
        let copied = store.list_status(&path("/up")).await.unwrap();
        assert_eq!(copied.len(), 2);
        assert!(copied.iter().all(|e| !e.is_dir && e.len == 3));
    }
}
