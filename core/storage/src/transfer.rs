//! Streaming data movement shared by backends and the client.
//!
//! Every transfer is strictly sequential: read one chunk, write it, repeat.

use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use storagekit_common::{Error, Result};

use crate::backend::{Backend, Metadata};
use crate::uri;

/// Chunk size for streamed copies (8 MiB).
pub const COPY_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Fill `buf` from `reader` until it is full or the reader is exhausted.
pub async fn read_chunk<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Copy everything from `reader` to `writer` in [`COPY_CHUNK_SIZE`] chunks,
/// then shut the writer down so the data is committed.
///
/// Returns the number of bytes transferred.
pub async fn stream_copy<R, W>(reader: &mut R, writer: &mut W) -> Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; COPY_CHUNK_SIZE];
    let mut total = 0u64;

    loop {
        let n = read_chunk(reader, &mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        total += n as u64;
    }

    writer.shutdown().await?;
    Ok(total)
}

/// Every file under `root` on `backend`, sorted by path.
pub async fn walk<B: Backend + ?Sized>(backend: &B, root: &str) -> Result<Vec<Metadata>> {
    let meta = backend.info(root).await?;
    if !meta.is_directory {
        return Ok(vec![meta]);
    }

    let mut files = Vec::new();
    let mut pending = vec![root.to_string()];

    while let Some(dir) = pending.pop() {
        for entry in backend.list(&dir).await? {
            if entry.name.trim_end_matches('/') == dir.trim_end_matches('/') {
                continue;
            }
            if entry.is_directory {
                pending.push(entry.name);
            } else {
                files.push(entry);
            }
        }
    }

    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

/// Directories and files under a local root, each sorted.
pub async fn local_tree(root: &Path) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    let mut dirs = Vec::new();
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|e| Error::from_io(&dir.display().to_string(), e))?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                dirs.push(path.clone());
                pending.push(path);
            } else {
                files.push(path);
            }
        }
    }

    dirs.sort();
    files.sort();
    Ok((dirs, files))
}

/// `/`-joined form of `path` relative to `root`.
pub fn local_relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Upload a local file or tree through `backend.open_write`.
pub async fn put<B: Backend + ?Sized>(
    backend: &B,
    local: &Path,
    remote: &str,
    recursive: bool,
) -> Result<()> {
    let local_meta = fs::metadata(local)
        .await
        .map_err(|e| Error::from_io(&local.display().to_string(), e))?;

    if !local_meta.is_dir() {
        // Uploading onto an existing directory places the file inside it
        let target = match backend.info(remote).await {
            Ok(meta) if meta.is_directory => {
                let name = local
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                uri::join_path(remote, &name)
            }
            _ => remote.to_string(),
        };
        put_file(backend, local, &target).await?;
        return Ok(());
    }

    if !recursive {
        return Err(Error::InvalidInput(format!(
            "{} is a directory; upload it with recursive",
            local.display()
        )));
    }

    let (dirs, files) = local_tree(local).await?;
    backend.makedirs(remote, true).await?;
    for dir in dirs {
        let target = uri::join_path(remote, &local_relative(local, &dir));
        backend.makedirs(&target, true).await?;
    }
    for file in files {
        let target = uri::join_path(remote, &local_relative(local, &file));
        put_file(backend, &file, &target).await?;
    }

    Ok(())
}

async fn put_file<B: Backend + ?Sized>(backend: &B, local: &Path, remote: &str) -> Result<u64> {
    let mut reader = fs::File::open(local)
        .await
        .map_err(|e| Error::from_io(&local.display().to_string(), e))?;
    let mut writer = backend.open_write(remote).await?;

    let bytes = stream_copy(&mut reader, &mut writer).await?;
    debug!("Uploaded {} -> {} ({} bytes)", local.display(), remote, bytes);
    Ok(bytes)
}

/// Download a backend file or tree through `backend.open_read`.
pub async fn get<B: Backend + ?Sized>(
    backend: &B,
    remote: &str,
    local: &Path,
    recursive: bool,
) -> Result<()> {
    let meta = backend.info(remote).await?;

    if !meta.is_directory {
        let target = if fs::metadata(local).await.map(|m| m.is_dir()).unwrap_or(false) {
            local.join(uri::base_name(remote))
        } else {
            local.to_path_buf()
        };
        get_file(backend, remote, &target).await?;
        return Ok(());
    }

    if !recursive {
        return Err(Error::InvalidInput(format!(
            "{} is a directory; download it with recursive",
            remote
        )));
    }

    fs::create_dir_all(local).await?;
    for entry in walk(backend, remote).await? {
        let target = local.join(uri::relative_path(remote, &entry.name));
        get_file(backend, &entry.name, &target).await?;
    }

    Ok(())
}

async fn get_file<B: Backend + ?Sized>(backend: &B, remote: &str, local: &Path) -> Result<u64> {
    if let Some(parent) = local.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }

    let mut reader = backend.open_read(remote).await?;
    let mut file = fs::File::create(local)
        .await
        .map_err(|e| Error::from_io(&local.display().to_string(), e))?;

    let bytes = stream_copy(&mut reader, &mut file).await?;
    debug!("Downloaded {} -> {} ({} bytes)", remote, local.display(), bytes);
    Ok(bytes)
}
