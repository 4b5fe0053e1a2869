use std::sync::Arc;

use anyhow::{anyhow, Context};
use chrono::Utc;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

use crate::maven::coordinates::*;
use crate::maven::listing::{CompositeDirectoryListingParser, DirectoryListingParser};
use crate::maven::metadata_xml::{last_updated_timestamp, parse_metadata, release_descriptor};
use crate::maven::paths::{ListingUrlExt, RepositoryLayout};
use crate::util::staging::StagingArea;
use crate::util::transport::{is_not_found, DocumentKind, Transport};

/// A Maven repository reachable through a [Transport], read by following its directory listings and
///  written by plain uploads.
pub struct MavenHttpRepository {
    transport: Arc<dyn Transport>,
    layout: RepositoryLayout,
    listing_parser: CompositeDirectoryListingParser,
}

impl MavenHttpRepository {
    pub fn new(base_url: &str, transport: Arc<dyn Transport>) -> anyhow::Result<MavenHttpRepository> {
        Ok(MavenHttpRepository {
            transport,
            layout: RepositoryLayout::new(base_url)?,
            listing_parser: CompositeDirectoryListingParser::default(),
        })
    }

    pub fn layout(&self) -> &RepositoryLayout {
        &self.layout
    }

    /// The children of a directory, as absolute URLs below `directory`
    pub async fn list_directory(&self, directory: &Url) -> anyhow::Result<Vec<Url>> {
        let document = self.transport.fetch_document(directory).await?;
        let children = self.listing_parser.parse(directory, &document)?;
        debug!("listed {}: {} entries", directory, children.len());
        Ok(children)
    }

    /// Reads a `maven-metadata.xml` file, `None` if there is no such file
    pub async fn fetch_metadata(&self, url: &Url) -> anyhow::Result<Option<ArtifactMetadata>> {
        let document = match self.transport.fetch_document(url).await {
            Ok(document) => document,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if document.kind != DocumentKind::Xml {
            return Err(anyhow!("{} is not an XML document", url));
        }

        let metadata = parse_metadata(&document.text)
            .with_context(|| format!("parsing {}", url))?;
        Ok(Some(metadata))
    }

    /// The released versions this repository knows for an artifact. An artifact without a
    ///  `maven-metadata.xml` simply has no versions yet.
    pub async fn query_artifact_metadata(&self, group: &Group, artifact: &Artifact) -> anyhow::Result<ArtifactMetadata> {
        let url = self.layout.metadata_url(group, artifact);
        match self.fetch_metadata(&url).await? {
            Some(metadata) => Ok(metadata),
            None => {
                debug!("no metadata at {}", url);
                Ok(ArtifactMetadata::empty(group.clone(), artifact.clone()))
            }
        }
    }

    /// All files of a release, i.e. the files in its version directory whose names start with
    ///  `<artifact>-<version>`
    pub async fn list_artifact_version_assets(&self, coordinates: &Coordinates, include_checksums: bool, include_signatures: bool) -> anyhow::Result<Vec<ArtifactVersionAsset>> {
        let directory = self.layout.version_directory_url(coordinates);
        let children = match self.list_directory(&directory).await {
            Ok(children) => children,
            Err(e) if is_not_found(&e) => {
                warn!("version directory {} does not exist", directory);
                return Ok(vec![]);
            }
            Err(e) => return Err(e),
        };

        let prefix = coordinates.asset_base_name();
        let result = children.iter()
            .filter_map(|child| child.filename())
            .filter(|name| name.as_str().starts_with(&prefix))
            .filter(|name| include_checksums || !name.is_checksum())
            .filter(|name| include_signatures || !name.is_signature())
            .map(|name| ArtifactVersionAsset { coordinates: coordinates.clone(), name })
            .collect();
        Ok(result)
    }

    /// Copies one file from this repository to `target`, staging it in a local temp file in between.
    ///  Returns the number of bytes copied.
    pub async fn copy_asset(&self, asset: &ArtifactVersionAsset, target: &MavenHttpRepository, staging: &StagingArea) -> anyhow::Result<u64> {
        let staged = staging.stage()?;

        let source_url = self.layout.asset_url(asset);
        let mut writer = staged.open()?;
        let size = self.transport.download_to(&source_url, &mut writer).await
            .with_context(|| format!("downloading {}", asset))?;
        writer.flush().await?;
        drop(writer);
        debug!("downloaded {} to {}: {} bytes", source_url, staged.path().display(), size);

        target.upload_asset(asset, staged.open()?).await?;
        Ok(size)
    }

    pub async fn upload_asset(&self, asset: &ArtifactVersionAsset, content: File) -> anyhow::Result<()> {
        let url = self.layout.asset_url(asset);
        self.transport.upload_from(&url, content).await
            .map_err(|e| {
                let context = if e.is_conflict() {
                    format!("{} already exists on target", asset)
                }
                else {
                    format!("uploading {}", asset)
                };
                anyhow::Error::new(e).context(context)
            })
    }

    /// Makes a freshly copied version visible: the artifact's current metadata is re-read, the
    ///  version is added, and the result is published with the version as both `latest` and `release`.
    pub async fn release_version(&self, coordinates: &Coordinates) -> anyhow::Result<()> {
        let current = self.query_artifact_metadata(&coordinates.group, &coordinates.artifact).await?;
        let updated = current.with_version(coordinates.version.clone());

        let descriptor = release_descriptor(&updated, &coordinates.version, &last_updated_timestamp(Utc::now()));
        let url = self.layout.metadata_url(&coordinates.group, &coordinates.artifact);
        self.transport.upload_string(&url, descriptor).await
            .with_context(|| format!("publishing metadata for {}", coordinates))?;

        info!("released {}", coordinates);
        Ok(())
    }
}


#[cfg(test)]
mod test {
    use rstest::*;
    use crate::util::memory_transport::MemoryTransport;
    use super::*;

    const SOURCE: &str = "https://source.example.com/maven2/";
    const TARGET: &str = "https://target.example.com/releases/";

    fn coordinates(version: &str) -> Coordinates {
        Coordinates::new(
            Group::new("org.example").unwrap(),
            Artifact::new("demo").unwrap(),
            ArtifactVersion::new(version).unwrap(),
        )
    }

    fn repository(transport: &Arc<MemoryTransport>, base: &str) -> MavenHttpRepository {
        MavenHttpRepository::new(base, transport.clone()).unwrap()
    }

    fn demo_release(transport: &MemoryTransport) {
        for file in ["demo-1.1.jar", "demo-1.1.jar.sha1", "demo-1.1.jar.asc", "demo-1.1.pom", "demo-1.1.pom.md5", "unrelated.txt"] {
            transport.put_file(&format!("{}org/example/demo/1.1/{}", SOURCE, file), file.as_bytes());
        }
    }

    #[rstest]
    #[case::everything(true, true, vec!["demo-1.1.jar", "demo-1.1.jar.asc", "demo-1.1.jar.sha1", "demo-1.1.pom", "demo-1.1.pom.md5"])]
    #[case::no_checksums(false, true, vec!["demo-1.1.jar", "demo-1.1.jar.asc", "demo-1.1.pom"])]
    #[case::no_signatures(true, false, vec!["demo-1.1.jar", "demo-1.1.jar.sha1", "demo-1.1.pom", "demo-1.1.pom.md5"])]
    #[case::plain(false, false, vec!["demo-1.1.jar", "demo-1.1.pom"])]
    #[tokio::test]
    async fn test_list_artifact_version_assets(#[case] checksums: bool, #[case] signatures: bool, #[case] expected: Vec<&str>) {
        let transport = Arc::new(MemoryTransport::new());
        demo_release(&transport);

        let assets = repository(&transport, SOURCE)
            .list_artifact_version_assets(&coordinates("1.1"), checksums, signatures).await
            .unwrap();

        let mut names: Vec<&str> = assets.iter().map(|a| a.name.as_str()).collect();
        names.sort();
        assert_eq!(names, expected);
        assert!(assets.iter().all(|a| a.coordinates == coordinates("1.1")));
    }

    #[tokio::test]
    async fn test_list_assets_of_missing_version() {
        let transport = Arc::new(MemoryTransport::new());
        demo_release(&transport);

        let assets = repository(&transport, SOURCE)
            .list_artifact_version_assets(&coordinates("9.9"), true, true).await
            .unwrap();
        assert!(assets.is_empty());
    }

    #[tokio::test]
    async fn test_query_missing_metadata_is_empty() {
        let transport = Arc::new(MemoryTransport::new());
        let metadata = repository(&transport, TARGET)
            .query_artifact_metadata(&Group::new("org.example").unwrap(), &Artifact::new("demo").unwrap()).await
            .unwrap();

        assert!(metadata.versions().is_empty());
        assert_eq!(metadata.artifact.as_str(), "demo");
    }

    #[tokio::test]
    async fn test_query_broken_metadata_fails() {
        let transport = Arc::new(MemoryTransport::new());
        transport.put_xml(&format!("{}org/example/demo/maven-metadata.xml", TARGET), "<metadata><versioning/></metadata>");

        let result = repository(&transport, TARGET)
            .query_artifact_metadata(&Group::new("org.example").unwrap(), &Artifact::new("demo").unwrap()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_copy_asset() {
        let transport = Arc::new(MemoryTransport::new());
        demo_release(&transport);
        let staging_dir = tempfile::tempdir().unwrap();

        let source = repository(&transport, SOURCE);
        let target = repository(&transport, TARGET);
        let asset = ArtifactVersionAsset {
            coordinates: coordinates("1.1"),
            name: Filename::new("demo-1.1.jar").unwrap(),
        };

        let size = source.copy_asset(&asset, &target, &StagingArea::new(Some(staging_dir.path().to_path_buf()))).await.unwrap();

        assert_eq!(size, "demo-1.1.jar".len() as u64);
        assert_eq!(
            transport.uploads(),
            vec![format!("{}org/example/demo/1.1/demo-1.1.jar", TARGET)],
        );
        assert_eq!(
            transport.content(&format!("{}org/example/demo/1.1/demo-1.1.jar", TARGET)).unwrap(),
            b"demo-1.1.jar".to_vec(),
        );
        assert_eq!(std::fs::read_dir(staging_dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_copy_missing_asset_cleans_up() {
        let transport = Arc::new(MemoryTransport::new());
        let staging_dir = tempfile::tempdir().unwrap();

        let asset = ArtifactVersionAsset {
            coordinates: coordinates("1.1"),
            name: Filename::new("demo-1.1.jar").unwrap(),
        };
        let result = repository(&transport, SOURCE)
            .copy_asset(&asset, &repository(&transport, TARGET), &StagingArea::new(Some(staging_dir.path().to_path_buf()))).await;

        assert!(result.is_err());
        assert!(transport.uploads().is_empty());
        assert_eq!(std::fs::read_dir(staging_dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_release_version_appends_to_current_metadata() {
        let transport = Arc::new(MemoryTransport::new());
        transport.put_xml(&format!("{}org/example/demo/maven-metadata.xml", TARGET), r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata>
  <groupId>org.example</groupId>
  <artifactId>demo</artifactId>
  <versioning>
    <versions>
      <version>1.0</version>
    </versions>
  </versioning>
</metadata>"#);

        let target = repository(&transport, TARGET);
        target.release_version(&coordinates("1.1")).await.unwrap();

        let published = target
            .query_artifact_metadata(&Group::new("org.example").unwrap(), &Artifact::new("demo").unwrap()).await
            .unwrap();
        let versions: Vec<&str> = published.versions().iter().map(|v| v.as_str()).collect();
        assert_eq!(versions, vec!["1.0", "1.1"]);

        let xml = String::from_utf8(transport.content(&format!("{}org/example/demo/maven-metadata.xml", TARGET)).unwrap()).unwrap();
        assert!(xml.contains("<latest>1.1</latest>"));
        assert!(xml.contains("<release>1.1</release>"));
    }
}
