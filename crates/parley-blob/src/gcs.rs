//! Google Cloud Storage over its JSON API.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::{Body, RequestBuilder, Response, Url};
use secrecy::ExposeSecret;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, instrument};

use crate::config::BlobConfig;
use crate::error::BlobError;
use crate::BlobStore;

pub struct GcsBlobStore {
    client: reqwest::Client,
    config: BlobConfig,
}

impl GcsBlobStore {
    pub fn new(config: BlobConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(client: reqwest::Client, config: BlobConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &BlobConfig {
        &self.config
    }

    /// Public URL of a blob: `{endpoint}/{bucket}/{path}` with each path
    /// segment percent-encoded.
    pub fn public_url(&self, path: &str) -> Result<String, BlobError> {
        let bucket = self.config.bucket()?;
        let mut url = self.endpoint()?;
        url.path_segments_mut()
            .map_err(|()| BlobError::InvalidEndpoint(self.config.endpoint.clone()))?
            .pop_if_empty()
            .push(bucket)
            .extend(path.split('/'));
        Ok(url.to_string())
    }

    fn endpoint(&self) -> Result<Url, BlobError> {
        Url::parse(&self.config.endpoint)
            .map_err(|e| BlobError::InvalidEndpoint(format!("{}: {e}", self.config.endpoint)))
    }

    fn upload_url(&self, bucket: &str) -> Result<Url, BlobError> {
        let mut url = self.endpoint()?;
        url.path_segments_mut()
            .map_err(|()| BlobError::InvalidEndpoint(self.config.endpoint.clone()))?
            .pop_if_empty()
            .extend(["upload", "storage", "v1", "b", bucket, "o"]);
        Ok(url)
    }

    /// Object media URL; the object name is a single encoded segment.
    fn media_url(&self, bucket: &str, path: &str) -> Result<Url, BlobError> {
        let mut url = self.endpoint()?;
        url.path_segments_mut()
            .map_err(|()| BlobError::InvalidEndpoint(self.config.endpoint.clone()))?
            .pop_if_empty()
            .extend(["storage", "v1", "b", bucket, "o", path]);
        url.query_pairs_mut().append_pair("alt", "media");
        Ok(url)
    }

    async fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder, BlobError> {
        let mut request = request;
        if let Some(token) = self.config.bearer_token().await? {
            request = request.bearer_auth(token.expose_secret());
        }
        if let Some(project) = &self.config.project_id {
            request = request.header("x-goog-user-project", project);
        }
        Ok(request)
    }

    async fn upload(&self, path: &str, body: Body, content_type: &str) -> Result<String, BlobError> {
        let bucket = self.config.bucket()?;
        let url = self.upload_url(bucket)?;
        let request = self
            .client
            .post(url)
            .query(&[("uploadType", "media"), ("name", path)])
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body);

        let response = self.authorize(request).await?.send().await?;
        check_status(response, path).await?;
        debug!(bucket, path, "blob uploaded");
        self.public_url(path)
    }

    async fn download(&self, path: &str) -> Result<Response, BlobError> {
        let bucket = self.config.bucket()?;
        let url = self.media_url(bucket, path)?;
        let response = self.authorize(self.client.get(url)).await?.send().await?;
        check_status(response, path).await
    }
}

async fn check_status(response: Response, path: &str) -> Result<Response, BlobError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(BlobError::from_status(status.as_u16(), path, body))
}

#[async_trait]
impl BlobStore for GcsBlobStore {
    #[instrument(skip(self, bytes), fields(len = bytes.len()))]
    async fn put(&self, path: &str, bytes: Bytes, content_type: &str) -> Result<String, BlobError> {
        self.upload(path, Body::from(bytes), content_type).await
    }

    #[instrument(skip(self, reader))]
    async fn put_reader(
        &self,
        path: &str,
        reader: Box<dyn AsyncRead + Send + Sync + Unpin>,
        content_type: &str,
    ) -> Result<String, BlobError> {
        let body = Body::wrap_stream(ReaderStream::new(reader));
        self.upload(path, body, content_type).await
    }

    #[instrument(skip(self))]
    async fn get(&self, path: &str) -> Result<Bytes, BlobError> {
        Ok(self.download(path).await?.bytes().await?)
    }

    #[instrument(skip(self, writer))]
    async fn get_to_writer(
        &self,
        path: &str,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, BlobError> {
        let mut stream = self.download(path).await?.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        writer.flush().await?;
        Ok(written)
    }
}
