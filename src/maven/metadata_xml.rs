use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::maven::coordinates::{Artifact, ArtifactMetadata, ArtifactVersion, Group};

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("invalid maven-metadata.xml: {0}")]
    InvalidDescriptor(String),
    #[error("malformed maven-metadata.xml: {0}")]
    Xml(#[from] serde_xml_rs::Error),
}

/// The subset of the maven-metadata.xml format that is needed for synchronization, see
///  https://maven.apache.org/ref/3.9.5/maven-repository-metadata/repository-metadata.html
#[derive(Debug, Deserialize)]
struct MetadataXml {
    #[serde(rename = "groupId")]
    group_id: Option<String>,
    #[serde(rename = "artifactId")]
    artifact_id: Option<String>,
    version: Option<String>,
    versioning: Option<Versioning>,
}

#[derive(Debug, Deserialize)]
struct Versioning {
    versions: Option<Versions>,
}

#[derive(Debug, Deserialize)]
struct Versions {
    #[serde(default)]
    version: Vec<String>,
}

/// Reads an artifact level maven-metadata.xml. Snapshot versions are dropped, and so are version
///  strings that are not valid versions at all.
pub fn parse_metadata(xml: &str) -> Result<ArtifactMetadata, MetadataError> {
    let parsed: MetadataXml = serde_xml_rs::from_str(xml)?;

    let group = parsed.group_id
        .as_deref()
        .map(str::trim)
        .ok_or_else(|| MetadataError::InvalidDescriptor("missing groupId".to_string()))?;
    let group = Group::new(group)
        .map_err(|e| MetadataError::InvalidDescriptor(format!("invalid groupId: {}", e)))?;

    let artifact = parsed.artifact_id
        .as_deref()
        .map(str::trim)
        .ok_or_else(|| MetadataError::InvalidDescriptor("missing artifactId".to_string()))?;
    let artifact = Artifact::new(artifact)
        .map_err(|e| MetadataError::InvalidDescriptor(format!("invalid artifactId: {}", e)))?;

    let raw_versions = parsed.version.into_iter()
        .chain(parsed.versioning
            .and_then(|v| v.versions)
            .map(|v| v.version)
            .unwrap_or_default());

    let versions = raw_versions
        .filter_map(|raw| match ArtifactVersion::new(raw.trim()) {
            Ok(version) => Some(version),
            Err(e) => {
                warn!("skipping version of {}:{}: {}", group, artifact, e);
                None
            }
        })
        .collect::<Vec<_>>();

    Ok(ArtifactMetadata::new(group, artifact, versions))
}

/// `lastUpdated` format used by Maven, e.g. `20241224173330`
pub fn last_updated_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d%H%M%S").to_string()
}

/// Renders the descriptor published after `released` was added to `metadata`. `latest` and
///  `release` both point to the newly released version.
pub fn release_descriptor(metadata: &ArtifactMetadata, released: &ArtifactVersion, last_updated: &str) -> String {
    let mut xml = String::with_capacity(1024 + 100 * metadata.versions().len());
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str("<metadata>\n");
    push_element(&mut xml, 1, "groupId", metadata.group.as_str());
    push_element(&mut xml, 1, "artifactId", metadata.artifact.as_str());
    xml.push_str("  <versioning>\n");
    push_element(&mut xml, 2, "latest", released.as_str());
    push_element(&mut xml, 2, "release", released.as_str());
    xml.push_str("    <versions>\n");
    for version in metadata.versions() {
        push_element(&mut xml, 3, "version", version.as_str());
    }
    xml.push_str("    </versions>\n");
    push_element(&mut xml, 2, "lastUpdated", last_updated);
    xml.push_str("  </versioning>\n");
    xml.push_str("</metadata>\n");
    xml
}

fn push_element(xml: &mut String, depth: usize, name: &str, text: &str) {
    for _ in 0..depth {
        xml.push_str("  ");
    }
    xml.push('<');
    xml.push_str(name);
    xml.push('>');
    xml.push_str(&escape_xml_content(text));
    xml.push_str("</");
    xml.push_str(name);
    xml.push_str(">\n");
}

/// Escapes text for use as element content. Control characters that XML 1.0 cannot represent are
///  dropped.
pub fn escape_xml_content(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '\t' | '\n' | '\r' => escaped.push(c),
            c if c.is_control() && (c as u32) < 0x20 => {}
            '\u{fffe}' | '\u{ffff}' => {}
            c => escaped.push(c),
        }
    }
    escaped
}
