use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hyper::{Body, Client, HeaderMap, Method, Request, Response, StatusCode, Uri};
use hyper::body::HttpBody;
use hyper::client::HttpConnector;
use hyper::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, HeaderValue, USER_AGENT};
use hyper_tls::HttpsConnector;
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, trace};
use url::Url;

use crate::config::RepositoryCredentials;
use crate::util::transport::{Document, DocumentKind, Transport, TransportError};

const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Debug, Clone)]
pub struct HttpTransportOptions {
    pub credentials: Option<RepositoryCredentials>,
    pub log_http_headers: bool,
    /// upper bound for getting the response headers of a request
    pub request_timeout: Duration,
    /// upper bound for the pause between two chunks of a response body
    pub read_timeout: Duration,
}
impl Default for HttpTransportOptions {
    fn default() -> Self {
        HttpTransportOptions {
            credentials: None,
            log_http_headers: false,
            request_timeout: Duration::from_secs(45),
            read_timeout: Duration::from_secs(45),
        }
    }
}

/// [Transport] over HTTP(S). Redirects are not followed, credentials are sent pre-emptively as
///  HTTP basic authentication.
///
/// Instances do HTTP connection caching internally, so keeping them alive has performance benefits.
pub struct HttpTransport {
    client: Client<HttpsConnector<HttpConnector>>,
    authorization: Option<HeaderValue>,
    user_agent: HeaderValue,
    options: HttpTransportOptions,
}
impl HttpTransport {
    pub fn new(options: HttpTransportOptions) -> anyhow::Result<HttpTransport> {
        let authorization = match &options.credentials {
            Some(credentials) => {
                let token = BASE64.encode(format!("{}:{}", credentials.username, credentials.password));
                let mut value = HeaderValue::try_from(format!("Basic {}", token))?;
                value.set_sensitive(true);
                Some(value)
            }
            None => None,
        };

        Ok(HttpTransport {
            client: Client::builder()
                .build::<_, Body>(HttpsConnector::new()),
            authorization,
            // Maven Central returns a 403 without a user agent
            user_agent: HeaderValue::from_static(concat!("maven-sync/", env!("CARGO_PKG_VERSION"))),
            options,
        })
    }

    fn build_request(&self, method: Method, url: &Url, body: Body, headers: &[(hyper::header::HeaderName, HeaderValue)]) -> Result<Request<Body>, TransportError> {
        let uri = Uri::try_from(url.as_str())
            .map_err(|e| TransportError::InvalidRequest { url: url.clone(), reason: e.to_string() })?;

        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(USER_AGENT, self.user_agent.clone());
        if let Some(authorization) = &self.authorization {
            builder = builder.header(AUTHORIZATION, authorization.clone());
        }
        for (name, value) in headers {
            builder = builder.header(name, value.clone());
        }

        builder.body(body)
            .map_err(|e| TransportError::InvalidRequest { url: url.clone(), reason: e.to_string() })
    }

    /// Sends a request and maps non-2xx responses to errors
    async fn execute(&self, method: &'static str, url: &Url, request: Request<Body>) -> Result<Response<Body>, TransportError> {
        if self.options.log_http_headers {
            debug!("{} {} request headers: {}", method, url, redacted(request.headers()));
        }
        trace!("{} {}", method, url);

        let response = self.with_timeout(method, url, self.options.request_timeout, self.client.request(request))
            .await??;

        if self.options.log_http_headers {
            debug!("{} {} response {} headers: {}", method, url, response.status(), redacted(response.headers()));
        }

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = self.error_body(method, url, response).await;
        Err(match status {
            StatusCode::NOT_FOUND => TransportError::NotFound { method, url: url.clone() },
            StatusCode::CONFLICT => TransportError::Conflict { method, url: url.clone(), body },
            _ => TransportError::Status { method, url: url.clone(), status: status.as_u16(), body },
        })
    }

    async fn error_body(&self, method: &'static str, url: &Url, response: Response<Body>) -> String {
        match self.with_timeout(method, url, self.options.read_timeout, hyper::body::to_bytes(response.into_body())).await {
            Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes)
                .chars()
                .take(MAX_ERROR_BODY_CHARS)
                .collect(),
            _ => "<body failed decoding>".to_string(),
        }
    }

    async fn with_timeout<T>(&self, method: &'static str, url: &Url, duration: Duration, f: impl Future<Output = T>) -> Result<T, TransportError> {
        tokio::time::timeout(duration, f)
            .await
            .map_err(|_| TransportError::Timeout { method, url: url.clone() })
    }

    async fn put(&self, url: &Url, body: Body, content_type: &'static str, content_length: u64) -> Result<StatusCode, TransportError> {
        let request = self.build_request(Method::PUT, url, body, &[
            (CONTENT_TYPE, HeaderValue::from_static(content_type)),
            (CONTENT_LENGTH, HeaderValue::from(content_length)),
        ])?;
        let response = self.execute("PUT", url, request).await?;
        Ok(response.status())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch_document(&self, url: &Url) -> Result<Document, TransportError> {
        let request = self.build_request(Method::GET, url, Body::empty(), &[])?;
        let response = self.execute("GET", url, request).await?;

        let content_type = response.headers()
            .get(CONTENT_TYPE)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).to_string())
            .ok_or_else(|| TransportError::MissingContentType(url.clone()))?;
        let kind = DocumentKind::for_content_type(&content_type)
            .ok_or_else(|| TransportError::UnsupportedContentType { url: url.clone(), content_type: content_type.clone() })?;

        let bytes = self.with_timeout("GET", url, self.options.read_timeout, hyper::body::to_bytes(response.into_body()))
            .await??;

        Ok(Document {
            kind,
            text: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }

    async fn download_to(&self, url: &Url, sink: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<u64, TransportError> {
        let request = self.build_request(Method::GET, url, Body::empty(), &[])?;
        let mut body = self.execute("GET", url, request).await?
            .into_body();

        let mut size = 0u64;
        while let Some(chunk) = self.with_timeout("GET", url, self.options.read_timeout, body.data()).await? {
            let chunk = chunk?;
            sink.write_all(&chunk).await?;
            size += chunk.len() as u64;
        }
        sink.flush().await?;

        trace!("downloaded {}: size={}", url, size);
        Ok(size)
    }

    async fn upload_from(&self, url: &Url, source: File) -> Result<(), TransportError> {
        let size = source.metadata().await?.len();
        let body = Body::wrap_stream(ReaderStream::new(source));

        let status = self.put(url, body, "application/octet-stream", size).await?;
        info!("uploaded {}: status={} size={}", url, status, size);
        Ok(())
    }

    async fn upload_string(&self, url: &Url, content: String) -> Result<(), TransportError> {
        let size = content.len() as u64;
        let status = self.put(url, Body::from(content), "application/xml; charset=UTF-8", size).await?;
        info!("uploaded {}: status={}", url, status);
        Ok(())
    }
}

fn redacted(headers: &HeaderMap) -> String {
    headers.iter()
        .map(|(name, value)| {
            if *name == AUTHORIZATION {
                format!("{}: ***", name)
            }
            else {
                format!("{}: {}", name, String::from_utf8_lossy(value.as_bytes()))
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}
