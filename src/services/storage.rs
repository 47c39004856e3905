use async_trait::async_trait;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;

use crate::models::artifact::{Artifact, RemoteFolder};

/// Remote storage capability used by the retrieval phase.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// All folders whose name is exactly `name`.
    async fn find_folders(&self, name: &str) -> Result<Vec<RemoteFolder>, StorageError>;

    /// Files directly inside `folder`.
    async fn list(&self, folder: &RemoteFolder) -> Result<Vec<Artifact>, StorageError>;

    /// Stream the artifact's bytes into `writer`, returning the number of
    /// bytes written.
    async fn download_to(
        &self,
        artifact: &Artifact,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, StorageError>;

    async fn delete(&self, artifact: &Artifact) -> Result<(), StorageError>;
}

/// Passes writes through and counts the bytes accepted.
pub struct CountingWriter<'a> {
    inner: &'a mut (dyn AsyncWrite + Send + Unpin),
    written: u64,
}

impl<'a> CountingWriter<'a> {
    pub fn new(inner: &'a mut (dyn AsyncWrite + Send + Unpin)) -> Self {
        Self { inner, written: 0 }
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl AsyncWrite for CountingWriter<'_> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = &mut *self;
        let poll = Pin::new(&mut *this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = &poll {
            this.written += *n as u64;
        }
        poll
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.inner).poll_shutdown(cx)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("Storage service returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Local write failed: {0}")]
    Io(#[from] io::Error),

    #[error("Storage configuration error: {0}")]
    Config(String),
}
