use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use url::Url;

use crate::util::transport::{Document, DocumentKind, Transport, TransportError};

struct StoredFile {
    content_type: &'static str,
    content: Vec<u8>,
}

/// A fake repository server keeping its files in memory. Directories exist implicitly for every
///  stored file and are served as `<pre>` style listings.
pub struct MemoryTransport {
    files: Mutex<BTreeMap<String, StoredFile>>,
    hidden: Mutex<HashSet<String>>,
    failing: Mutex<HashSet<String>>,
    panicking: Mutex<HashSet<String>>,
    conflicting: Mutex<HashSet<String>>,
    held_prefixes: Mutex<Vec<String>>,
    released: watch::Sender<bool>,
    fetches: Mutex<Vec<String>>,
    uploads: Mutex<Vec<String>>,
}

impl MemoryTransport {
    pub fn new() -> MemoryTransport {
        let (released, _) = watch::channel(false);
        MemoryTransport {
            files: Default::default(),
            hidden: Default::default(),
            failing: Default::default(),
            panicking: Default::default(),
            conflicting: Default::default(),
            held_prefixes: Default::default(),
            released,
            fetches: Default::default(),
            uploads: Default::default(),
        }
    }

    pub fn put_file(&self, url: &str, content: &[u8]) {
        self.put(url, "application/octet-stream", content.to_vec());
    }

    pub fn put_xml(&self, url: &str, xml: &str) {
        self.put(url, "application/xml", xml.as_bytes().to_vec());
    }

    fn put(&self, url: &str, content_type: &'static str, content: Vec<u8>) {
        self.files.lock().unwrap()
            .insert(url.to_string(), StoredFile { content_type, content });
    }

    /// Requests for `url` are answered with 'not found' even if there is a file or directory
    pub fn hide(&self, url: &str) {
        self.hidden.lock().unwrap().insert(url.to_string());
    }

    /// All requests for `url` fail with a server error
    pub fn fail(&self, url: &str) {
        self.failing.lock().unwrap().insert(url.to_string());
    }

    /// Fetching `url` panics, taking down the calling task
    pub fn panic_on(&self, url: &str) {
        self.panicking.lock().unwrap().insert(url.to_string());
    }

    /// Document fetches below `prefix` are recorded, but do not complete until [MemoryTransport::release]
    pub fn hold(&self, prefix: &str) {
        self.held_prefixes.lock().unwrap().push(prefix.to_string());
    }

    pub fn release(&self) {
        self.released.send_replace(true);
    }

    /// Uploads to `url` are rejected as conflicting
    pub fn conflict(&self, url: &str) {
        self.conflicting.lock().unwrap().insert(url.to_string());
    }

    pub fn content(&self, url: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap()
            .get(url)
            .map(|f| f.content.clone())
    }

    /// URLs of all documents fetched so far, in request order
    pub fn fetches(&self) -> Vec<String> {
        self.fetches.lock().unwrap().clone()
    }

    /// URLs of all successful uploads so far, in request order
    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }

    fn check(&self, method: &'static str, url: &Url) -> Result<(), TransportError> {
        if self.failing.lock().unwrap().contains(url.as_str()) {
            return Err(TransportError::Status { method, url: url.clone(), status: 500, body: "injected failure".to_string() });
        }
        if self.hidden.lock().unwrap().contains(url.as_str()) {
            return Err(TransportError::NotFound { method, url: url.clone() });
        }
        Ok(())
    }

    fn listing(&self, url: &Url) -> Option<String> {
        let prefix = url.as_str();
        let files = self.files.lock().unwrap();

        let mut directories = BTreeSet::new();
        let mut leaves = BTreeMap::new();
        for (key, file) in files.range(prefix.to_string()..) {
            let Some(rest) = key.strip_prefix(prefix) else { break };
            match rest.find('/') {
                Some(idx) => { directories.insert(rest[..=idx].to_string()); }
                None => { leaves.insert(rest.to_string(), file.content.len()); }
            }
        }
        if directories.is_empty() && leaves.is_empty() {
            return None;
        }

        let mut html = String::from("<html>\n<body>\n<pre>\n<a href=\"../\">../</a>\n");
        for name in directories {
            html.push_str(&format!("<a href=\"{0}\" title=\"{0}\">{0}</a>    2024-01-10 12:00         -\n", name));
        }
        for (name, size) in leaves {
            html.push_str(&format!("<a href=\"{0}\" title=\"{0}\">{0}</a>    2024-01-10 12:00    {1}\n", name, size));
        }
        html.push_str("</pre>\n</body>\n</html>\n");
        Some(html)
    }

    fn store_upload(&self, method: &'static str, url: &Url, content_type: &'static str, content: Vec<u8>) -> Result<(), TransportError> {
        self.check(method, url)?;
        if self.conflicting.lock().unwrap().contains(url.as_str()) {
            return Err(TransportError::Conflict { method, url: url.clone(), body: "already exists".to_string() });
        }
        self.put(url.as_str(), content_type, content);
        self.uploads.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn fetch_document(&self, url: &Url) -> Result<Document, TransportError> {
        self.fetches.lock().unwrap().push(url.to_string());

        // the flags are read into locals so that no lock is held across the await or the panic
        let held = self.held_prefixes.lock().unwrap().iter().any(|p| url.as_str().starts_with(p.as_str()));
        if held {
            let mut released = self.released.subscribe();
            let _ = released.wait_for(|r| *r).await;
        }
        let panics = self.panicking.lock().unwrap().contains(url.as_str());
        if panics {
            panic!("injected panic fetching {}", url);
        }

        self.check("GET", url)?;

        if url.path().ends_with('/') {
            return match self.listing(url) {
                Some(text) => Ok(Document { kind: DocumentKind::Html, text }),
                None => Err(TransportError::NotFound { method: "GET", url: url.clone() }),
            };
        }

        let files = self.files.lock().unwrap();
        let file = files.get(url.as_str())
            .ok_or_else(|| TransportError::NotFound { method: "GET", url: url.clone() })?;
        let kind = DocumentKind::for_content_type(file.content_type)
            .ok_or_else(|| TransportError::UnsupportedContentType { url: url.clone(), content_type: file.content_type.to_string() })?;
        Ok(Document { kind, text: String::from_utf8_lossy(&file.content).into_owned() })
    }

    async fn download_to(&self, url: &Url, sink: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<u64, TransportError> {
        self.check("GET", url)?;
        let content = self.content(url.as_str())
            .ok_or_else(|| TransportError::NotFound { method: "GET", url: url.clone() })?;
        sink.write_all(&content).await?;
        Ok(content.len() as u64)
    }

    async fn upload_from(&self, url: &Url, mut source: File) -> Result<(), TransportError> {
        let mut content = vec![];
        source.read_to_end(&mut content).await?;
        self.store_upload("PUT", url, "application/octet-stream", content)
    }

    async fn upload_string(&self, url: &Url, content: String) -> Result<(), TransportError> {
        self.store_upload("PUT", url, "application/xml", content.into_bytes())
    }
}
