use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

use futures::TryStreamExt;
use tokio::{fs::File, io::AsyncWriteExt};
use url::Url;

use crate::{
    error::{ProxyError, ProxyResult},
    util::{http::HttpClient, path::ProxyPathExt},
};

/// A `.part` file without writes for this long is left over from an interrupted run.
const STALE_PART_AGE: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Fetched,
    /// The destination already existed, no request was made.
    Skipped,
    /// Another task is writing the destination, no request was made.
    InProgress,
}

/// Exclusive claim on `<dest>.part`, removed on drop unless committed.
struct PartFile {
    path: PathBuf,
    file: Option<File>,
}

impl PartFile {
    async fn create(path: PathBuf) -> std::io::Result<Self> {
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            file: Some(file),
        })
    }

    /// Claim `path`, replacing it when it is stale. `None` when another task holds it.
    async fn claim(path: PathBuf) -> ProxyResult<Option<Self>> {
        match Self::create(path.clone()).await {
            Ok(claimed) => return Ok(Some(claimed)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e.into()),
        }

        let stale = tokio::fs::metadata(&path)
            .await
            .and_then(|metadata| metadata.modified())
            .ok()
            .and_then(|modified| modified.elapsed().ok())
            .is_some_and(|age| age > STALE_PART_AGE);
        if !stale {
            return Ok(None);
        }

        tracing::warn!("Removing stale partial download {}", path.display());
        match tokio::fs::remove_file(&path).await {
            Err(e) if e.kind() != ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }
        match Self::create(path).await {
            Ok(claimed) => Ok(Some(claimed)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_from<R>(&mut self, reader: &mut R) -> ProxyResult<()>
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };
        tokio::io::copy(reader, file).await?;
        file.flush().await?;
        Ok(())
    }

    async fn commit(mut self, dest: &Path) -> ProxyResult<()> {
        drop(self.file.take());
        tokio::fs::rename(&self.path, dest).await?;
        // committed, nothing left to clean up
        self.path = PathBuf::new();
        Ok(())
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        // close before removing
        drop(self.file.take());
        if !self.path.as_os_str().is_empty() {
            _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Download `url` to `dest` unless `dest` already exists.
///
/// The body is streamed to `<dest>.part` first and renamed once complete, so a file at
/// `dest` is always a finished download. The `.part` file is created exclusively: concurrent
/// fetches of one destination make a single request.
pub async fn fetch_to_file(
    client: &HttpClient,
    url: &Url,
    dest: &Path,
) -> ProxyResult<FetchOutcome> {
    if dest.is_file() {
        tracing::debug!("File {} already exists, ignoring.", dest.display());
        return Ok(FetchOutcome::Skipped);
    }
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let Some(mut part) = PartFile::claim(dest.part_path()).await? else {
        tracing::debug!("File {} is being downloaded, ignoring.", dest.display());
        return Ok(FetchOutcome::InProgress);
    };

    let response = client.get_with_retry(url.clone()).await?;
    if !response.status().is_success() {
        let status = response.status();
        if let Ok(body) = response.text().await {
            tracing::debug!("Error body: {body}");
        }
        return Err(ProxyError::HttpError(status));
    }

    let stream = response.bytes_stream().map_err(std::io::Error::other);
    let mut reader = tokio_util::io::StreamReader::new(stream);
    part.write_from(&mut reader).await?;
    part.commit(dest).await?;
    Ok(FetchOutcome::Fetched)
}
