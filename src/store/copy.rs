use std::{
    io,
    path::{Path, PathBuf},
};
use tokio::{fs, io::AsyncWriteExt};

use super::{local::walkable_metadata, FileStore};
use crate::{
    error::{DfsResult, Error},
    file::FileEntry,
    path::RemotePath,
};

fn local_error<'a>(op: &'static str, path: &'a Path) -> impl FnOnce(io::Error) -> Error + 'a {
    move |err| Error::operation(op, path.display(), err)
}

fn local_name(path: &Path) -> DfsResult<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(ToOwned::to_owned)
        .ok_or_else(|| Error::InvalidInput(format!("{} has no usable file name", path.display())))
}

pub(super) async fn from_local<S>(store: &S, src: &Path, dst: &RemotePath) -> DfsResult<()>
where
    S: FileStore + ?Sized,
{
    let meta = fs::metadata(src).await.map_err(local_error("stat", src))?;

    let target = match store.status(dst).await {
        Ok(entry) if entry.is_dir => dst.join(&local_name(src)?),
        Ok(_) => dst.clone(),
        Err(err) if err.is_not_found() => dst.clone(),
        Err(err) => return Err(err),
    };

    let mut pending = vec![(src.to_path_buf(), target, meta.is_dir())];
    while let Some((local, remote, is_dir)) = pending.pop() {
        if is_dir {
            let _ = store.mkdirs(&remote).await?;
            let mut dir = fs::read_dir(&local).await.map_err(local_error("read dir", &local))?;
            while let Some(child) = dir.next_entry().await.map_err(local_error("read dir", &local))? {
                let path = child.path();
                let Some(meta) = walkable_metadata(&child)
                    .await
                    .map_err(local_error("stat", &path))?
                else {
                    warn!("not following link {}", path.display());
                    continue;
                };
                let is_dir = meta.is_dir();
                let child_remote = remote.join(&local_name(&path)?);
                pending.push((path, child_remote, is_dir));
            }
        } else {
            debug!("copy {} -> {remote}", local.display());
            let mut reader = fs::File::open(&local).await.map_err(local_error("open", &local))?;
            let mut writer = store.create(&remote, true).await?;
            let _ = tokio::io::copy(&mut reader, &mut writer).await?;
            writer.shutdown().await?;
        }
    }

    Ok(())
}

pub(super) async fn to_local<S>(store: &S, src: &RemotePath, dst: &Path) -> DfsResult<()>
where
    S: FileStore + ?Sized,
{
    let root = store.status(src).await?;

    let target = match fs::metadata(dst).await {
        Ok(meta) if meta.is_dir() && !src.is_root() => dst.join(src.name()),
        _ => dst.to_path_buf(),
    };

    let mut pending: Vec<(FileEntry, PathBuf)> = vec![(root, target)];
    while let Some((entry, local)) = pending.pop() {
        if entry.is_dir {
            fs::create_dir_all(&local).await.map_err(local_error("mkdir", &local))?;
            for child in store.list_status(&entry.path).await? {
                let path = local.join(child.name());
                pending.push((child, path));
            }
        } else {
            debug!("copy {} -> {}", entry.path, local.display());
            let mut reader = store.open(&entry.path).await?;
            let mut file = fs::File::create(&local).await.map_err(local_error("create", &local))?;
            let _ = tokio::io::copy(&mut reader, &mut file).await?;
            file.flush().await.map_err(local_error("flush", &local))?;
        }
    }

    Ok(())
}
