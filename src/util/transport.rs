use async_trait::async_trait;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWrite;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Html,
    Xml,
}
impl DocumentKind {
    /// Selects the document kind from a `Content-Type` header value, ignoring parameters like
    ///  `charset`
    pub fn for_content_type(content_type: &str) -> Option<DocumentKind> {
        let mime = content_type.split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        match mime.as_str() {
            "text/html" => Some(DocumentKind::Html),
            "application/xml" | "text/xml" => Some(DocumentKind::Xml),
            _ => None,
        }
    }
}

/// A fetched text document together with the kind of markup it was declared as
#[derive(Debug, Clone)]
pub struct Document {
    pub kind: DocumentKind,
    pub text: String,
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("not found: {method} {url}")]
    NotFound { method: &'static str, url: Url },
    #[error("conflict: {method} {url}: {body:?}")]
    Conflict { method: &'static str, url: Url, body: String },
    #[error("request failed: {method} {url}: status {status}: {body:?}")]
    Status { method: &'static str, url: Url, status: u16, body: String },
    #[error("missing content type: GET {0}")]
    MissingContentType(Url),
    #[error("unsupported content type {content_type:?}: GET {url}")]
    UnsupportedContentType { url: Url, content_type: String },
    #[error("timed out: {method} {url}")]
    Timeout { method: &'static str, url: Url },
    #[error("invalid request for {url}: {reason}")]
    InvalidRequest { url: Url, reason: String },
    #[error(transparent)]
    Http(#[from] hyper::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
impl TransportError {
    /// "not found" means absent, which callers treat as a regular outcome rather than a failure
    pub fn is_not_found(&self) -> bool {
        matches!(self, TransportError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, TransportError::Conflict { .. })
    }
}

/// Finds out whether an error chain bottoms out in a "not found" response
pub fn is_not_found(error: &anyhow::Error) -> bool {
    error.chain()
        .filter_map(|e| e.downcast_ref::<TransportError>())
        .any(TransportError::is_not_found)
}

/// Access to one repository server. Implementations take care of authentication, timeouts and
///  mapping of HTTP status codes to [TransportError].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch_document(&self, url: &Url) -> Result<Document, TransportError>;

    /// Streams the body of `url` into `sink`, returning the number of bytes written
    async fn download_to(&self, url: &Url, sink: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<u64, TransportError>;

    async fn upload_from(&self, url: &Url, source: File) -> Result<(), TransportError>;

    async fn upload_string(&self, url: &Url, content: String) -> Result<(), TransportError>;
}
