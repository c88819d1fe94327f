use std::path::PathBuf;

use parley_settings::BlobSettings;
use secrecy::SecretString;

use crate::error::BlobError;

pub const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";

/// Where blobs live and how to authenticate.
///
/// Only the bucket is mandatory, and only once a transfer is attempted.
#[derive(Clone, Debug, PartialEq)]
pub struct BlobConfig {
    pub bucket_name: Option<String>,
    /// File containing an OAuth bearer token. Unauthenticated when absent.
    pub credentials: Option<PathBuf>,
    /// Billing project sent as `x-goog-user-project`.
    pub project_id: Option<String>,
    pub endpoint: String,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            bucket_name: None,
            credentials: None,
            project_id: None,
            endpoint: DEFAULT_ENDPOINT.into(),
        }
    }
}

impl From<&BlobSettings> for BlobConfig {
    fn from(settings: &BlobSettings) -> Self {
        Self {
            bucket_name: Some(settings.bucket_name.clone()).filter(|b| !b.is_empty()),
            credentials: settings.credentials.clone(),
            project_id: settings.project_id.clone().filter(|p| !p.is_empty()),
            endpoint: settings.endpoint.clone(),
        }
    }
}

impl BlobConfig {
    pub fn for_bucket(bucket: impl Into<String>) -> Self {
        Self {
            bucket_name: Some(bucket.into()),
            ..Self::default()
        }
    }

    pub fn bucket(&self) -> Result<&str, BlobError> {
        self.bucket_name
            .as_deref()
            .filter(|b| !b.is_empty())
            .ok_or(BlobError::MissingBucket)
    }

    /// Read the bearer token, if credentials are configured.
    pub async fn bearer_token(&self) -> Result<Option<SecretString>, BlobError> {
        let Some(path) = &self.credentials else {
            return Ok(None);
        };
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| BlobError::Credentials(format!("{}: {e}", path.display())))?;
        let token = raw.trim();
        if token.is_empty() {
            return Err(BlobError::Credentials(format!("{} is empty", path.display())));
        }
        Ok(Some(SecretString::from(token.to_string())))
    }
}
