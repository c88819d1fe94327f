//! Blob storage: upload and download byte payloads at named paths.

pub mod config;
pub mod error;
pub mod gcs;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};

pub use config::BlobConfig;
pub use error::BlobError;
pub use gcs::GcsBlobStore;

/// Content type used when the caller does not pick one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/pdf";

/// A bucket of named blobs.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload an in-memory buffer. Returns the blob's public URL.
    async fn put(&self, path: &str, bytes: Bytes, content_type: &str) -> Result<String, BlobError>;

    /// Upload by streaming from a reader. Returns the blob's public URL.
    async fn put_reader(
        &self,
        path: &str,
        reader: Box<dyn AsyncRead + Send + Sync + Unpin>,
        content_type: &str,
    ) -> Result<String, BlobError>;

    /// Download a whole blob into memory.
    async fn get(&self, path: &str) -> Result<Bytes, BlobError>;

    /// Stream a blob into a writer. Returns the number of bytes written.
    async fn get_to_writer(
        &self,
        path: &str,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, BlobError>;
}
