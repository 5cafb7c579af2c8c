//! Read-at-offset upload sources.
//!
//! Part uploads read their own byte range, possibly more than once when a part is
//! retried, so the source must support random access. Non-seekable input such as an
//! HTTP body is first buffered with [`buffer_stream`].

use super::UploadError;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use std::fmt::Display;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

#[async_trait]
pub trait RandomAccessSource: Send + Sync {
    /// Total size in bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read exactly `len` bytes starting at `offset`.
    async fn read_at(&self, offset: u64, len: u64) -> io::Result<Bytes>;
}

fn check_range(total: u64, offset: u64, len: u64) -> io::Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= total => Ok(()),
        _ => Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("range {}+{} exceeds source length {}", offset, len, total),
        )),
    }
}

#[async_trait]
impl RandomAccessSource for Bytes {
    fn len(&self) -> u64 {
        Bytes::len(self) as u64
    }

    async fn read_at(&self, offset: u64, len: u64) -> io::Result<Bytes> {
        check_range(RandomAccessSource::len(self), offset, len)?;
        Ok(self.slice(offset as usize..(offset + len) as usize))
    }
}

/// Payload spilled to a temporary file, deleted when dropped.
#[derive(Debug)]
pub struct SpooledFile {
    path: TempPath,
    len: u64,
}

impl SpooledFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RandomAccessSource for SpooledFile {
    fn len(&self) -> u64 {
        self.len
    }

    async fn read_at(&self, offset: u64, len: u64) -> io::Result<Bytes> {
        check_range(self.len, offset, len)?;
        // A handle per read keeps concurrent part reads independent.
        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(SeekFrom::Start(offset)).await?;
        let mut buf = vec![0u8; len as usize];
        file.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}

/// Output of [`buffer_stream`].
#[derive(Debug)]
pub enum BufferedSource {
    Memory(Bytes),
    Spooled(SpooledFile),
}

impl BufferedSource {
    pub fn is_spooled(&self) -> bool {
        matches!(self, BufferedSource::Spooled(_))
    }
}

#[async_trait]
impl RandomAccessSource for BufferedSource {
    fn len(&self) -> u64 {
        match self {
            BufferedSource::Memory(bytes) => RandomAccessSource::len(bytes),
            BufferedSource::Spooled(file) => file.len(),
        }
    }

    async fn read_at(&self, offset: u64, len: u64) -> io::Result<Bytes> {
        match self {
            BufferedSource::Memory(bytes) => bytes.read_at(offset, len).await,
            BufferedSource::Spooled(file) => file.read_at(offset, len).await,
        }
    }
}

/// Drain `stream` into memory, spilling to a temporary file in `spool_dir` (or the
/// system temp dir) once more than `spool_threshold` bytes arrived.
///
/// Fails with [`UploadError::TooLarge`] as soon as more than `max_size` bytes arrived.
pub async fn buffer_stream<S, E>(
    stream: S,
    spool_threshold: u64,
    max_size: u64,
    spool_dir: Option<PathBuf>,
) -> Result<BufferedSource, UploadError>
where
    S: Stream<Item = Result<Bytes, E>> + Send,
    E: Display + Send,
{
    futures::pin_mut!(stream);
    let mut memory = BytesMut::new();
    let mut spool: Option<(tokio::fs::File, TempPath)> = None;
    let mut total = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| UploadError::Body(e.to_string()))?;
        total += chunk.len() as u64;
        if total > max_size {
            return Err(UploadError::TooLarge { limit: max_size });
        }

        if spool.is_none() && total > spool_threshold {
            let named = match &spool_dir {
                Some(dir) => tempfile::Builder::new().prefix("upload-").tempfile_in(dir)?,
                None => tempfile::Builder::new().prefix("upload-").tempfile()?,
            };
            let (std_file, path) = named.into_parts();
            let mut file = tokio::fs::File::from_std(std_file);
            file.write_all(&memory).await?;
            memory = BytesMut::new();
            tracing::debug!(path = %path.display(), buffered_bytes = total - chunk.len() as u64, "Spilling upload to disk");
            spool = Some((file, path));
        }

        match spool.as_mut() {
            Some((file, _)) => file.write_all(&chunk).await?,
            None => memory.extend_from_slice(&chunk),
        }
    }

    match spool {
        Some((mut file, path)) => {
            file.flush().await?;
            file.sync_all().await?;
            Ok(BufferedSource::Spooled(SpooledFile { path, len: total }))
        }
        None => Ok(BufferedSource::Memory(memory.freeze())),
    }
}
