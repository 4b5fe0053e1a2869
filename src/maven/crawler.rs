use std::time::Duration;

use anyhow::anyhow;
use tokio::sync::mpsc::Sender;
use tracing::{debug, info, warn};
use url::Url;

use crate::maven::coordinates::*;
use crate::maven::paths::ListingUrlExt;
use crate::maven::remote_repo::MavenHttpRepository;
use crate::util::transport::TransportError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlReport {
    pub directories_visited: usize,
    pub directories_failed: usize,
    pub artifacts_found: usize,
}

/// What a single directory turned out to be
enum Visit {
    Artifact(ArtifactMetadata),
    /// a directory that holds releases, but nothing that can be synchronized
    Exhausted,
    Descend(Vec<Url>),
}

/// Walks a repository's directory tree and emits the metadata of every artifact it finds. A
///  directory is an artifact if it has a `maven-metadata.xml` with released versions, or if all of
///  its subdirectories are named like versions. Everything else is searched for artifacts further
///  down.
pub struct RepositoryCrawler<'a> {
    repository: &'a MavenHttpRepository,
    crawl_delay: Duration,
    fetched_any: bool,
    report: CrawlReport,
}

impl <'a> RepositoryCrawler<'a> {
    pub fn new(repository: &'a MavenHttpRepository, crawl_delay: Duration) -> RepositoryCrawler<'a> {
        RepositoryCrawler {
            repository,
            crawl_delay,
            fetched_any: false,
            report: CrawlReport::default(),
        }
    }

    /// Crawls each of `start_paths` in turn, or the whole repository if there are none. Artifacts
    ///  are handed to `sink` as they are found, waiting while it is full.
    ///
    /// A directory that can not be read is logged and skipped. This fails only if `sink` is closed.
    pub async fn crawl(mut self, start_paths: &[String], sink: &Sender<ArtifactMetadata>) -> anyhow::Result<CrawlReport> {
        let start_urls = if start_paths.is_empty() {
            vec![self.repository.layout().base().clone()]
        }
        else {
            let mut urls = vec![];
            for path in start_paths {
                urls.push(self.repository.layout().start_url(path)?);
            }
            urls
        };

        for start_url in start_urls {
            info!("crawling {}", start_url);
            self.crawl_tree(start_url, sink).await?;
        }
        Ok(self.report)
    }

    async fn crawl_tree(&mut self, start_url: Url, sink: &Sender<ArtifactMetadata>) -> anyhow::Result<()> {
        let mut pending = vec![start_url];

        while let Some(directory) = pending.pop() {
            self.report.directories_visited += 1;
            match self.visit(&directory).await {
                Ok(Visit::Artifact(metadata)) => {
                    debug!("found {}", metadata);
                    self.report.artifacts_found += 1;
                    sink.send(metadata).await
                        .map_err(|_| anyhow!("artifact queue closed while crawling {}", directory))?;
                }
                Ok(Visit::Exhausted) => {}
                Ok(Visit::Descend(children)) => {
                    // reversed so that children are visited in listing order
                    pending.extend(children.into_iter().rev());
                }
                Err(e) => {
                    warn!("skipping {}: {:#}", directory, e);
                    self.report.directories_failed += 1;
                }
            }
        }
        Ok(())
    }

    async fn visit(&mut self, directory: &Url) -> anyhow::Result<Visit> {
        self.pace().await;
        let children = self.repository.list_directory(directory).await?;

        if let Some(metadata) = self.read_descriptor(directory, &children).await? {
            return Ok(Visit::Artifact(metadata));
        }

        let subdirectories: Vec<Url> = children.iter()
            .filter(|c| c.is_directory())
            .cloned()
            .collect();

        if let Some(versions) = as_version_directories(&subdirectories) {
            return Ok(self.synthesize(directory, versions));
        }

        for file in children.iter().filter(|c| !c.is_directory()) {
            check_stray_file(file);
        }
        Ok(Visit::Descend(subdirectories))
    }

    /// sleeps before every directory fetch except the very first one
    async fn pace(&mut self) {
        if self.fetched_any && !self.crawl_delay.is_zero() {
            tokio::time::sleep(self.crawl_delay).await;
        }
        self.fetched_any = true;
    }

    /// `Ok(None)` means: no usable descriptor, inspect the directory's children instead. That
    ///  includes descriptors that do not describe an artifact, e.g. the plugin listing of a group.
    ///
    /// A descriptor that can not be fetched fails the directory.
    async fn read_descriptor(&self, directory: &Url, children: &[Url]) -> anyhow::Result<Option<ArtifactMetadata>> {
        let Some(descriptor) = children.iter()
            .find(|c| c.filename().map(|f| f.is_maven_metadata()).unwrap_or(false))
        else {
            return Ok(None);
        };

        match self.repository.fetch_metadata(descriptor).await {
            Ok(Some(metadata)) if !metadata.versions().is_empty() => Ok(Some(metadata)),
            Ok(Some(_)) => {
                debug!("{} lists no released versions", descriptor);
                Ok(None)
            }
            Ok(None) => {
                debug!("{} is listed but does not exist", descriptor);
                Ok(None)
            }
            Err(e) if e.chain().any(|c| c.is::<TransportError>()) => {
                Err(e.context(format!("fetching the descriptor of {}", directory)))
            }
            Err(e) => {
                warn!("ignoring descriptor in {}: {:#}", directory, e);
                Ok(None)
            }
        }
    }

    fn synthesize(&self, directory: &Url, versions: Vec<ArtifactVersion>) -> Visit {
        let (group, artifact) = match self.repository.layout().group_and_artifact(directory) {
            Ok(ga) => ga,
            Err(e) => {
                warn!("version directories without an artifact: {:#}", e);
                return Visit::Exhausted;
            }
        };

        let mut versions = versions;
        versions.sort();
        let metadata = ArtifactMetadata::new(group, artifact, versions);
        if metadata.versions().is_empty() {
            debug!("{} has only snapshot versions", directory);
            return Visit::Exhausted;
        }

        info!("no maven-metadata.xml in {}, inferred {}", directory, metadata);
        Visit::Artifact(metadata)
    }
}

/// `Some` if there is at least one subdirectory, and all subdirectories are named like versions
fn as_version_directories(subdirectories: &[Url]) -> Option<Vec<ArtifactVersion>> {
    if subdirectories.is_empty() {
        return None;
    }
    subdirectories.iter()
        .map(|d| d.leaf_name().and_then(|name| ArtifactVersion::parse_directory_name(&name)))
        .collect()
}

fn check_stray_file(file: &Url) {
    match file.filename() {
        Some(name) if name.is_checksum() || name.is_signature() || name.is_pom() || name.is_maven_metadata() || name.is_ignored() => {}
        _ => warn!("unexpected file {}, probably misplaced", file),
    }
}
