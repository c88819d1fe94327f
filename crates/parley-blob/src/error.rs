#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("blob bucket name is not configured")]
    MissingBucket,

    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("storage returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("storage request failed: {0}")]
    Transport(String),

    #[error("invalid storage endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("credentials unusable: {0}")]
    Credentials(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for BlobError {
    fn from(e: reqwest::Error) -> Self {
        BlobError::Transport(e.to_string())
    }
}

impl BlobError {
    /// Classify a non-success storage response.
    pub fn from_status(status: u16, path: &str, body: String) -> Self {
        match status {
            404 => Self::NotFound(path.to_string()),
            _ => Self::Http { status, body },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_status_mapping() {
        assert!(matches!(
            BlobError::from_status(404, "a/b.pdf", String::new()),
            BlobError::NotFound(ref p) if p == "a/b.pdf"
        ));
        assert!(matches!(
            BlobError::from_status(403, "a", "denied".into()),
            BlobError::Http { status: 403, .. }
        ));
    }

    #[test]
    fn missing_bucket_display() {
        assert_eq!(
            BlobError::MissingBucket.to_string(),
            "blob bucket name is not configured"
        );
    }
}
