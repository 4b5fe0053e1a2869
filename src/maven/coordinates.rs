use std::collections::HashSet;
use std::fmt::{Display, Formatter};

use thiserror::Error;

pub use crate::maven::version::ArtifactVersion;

pub const MAVEN_METADATA_XML_FILE: &str = "maven-metadata.xml";
pub const CHECKSUM_EXTENSIONS: [&str; 4] = ["md5", "sha1", "sha256", "sha512"];
pub const SIGNATURE_EXTENSIONS: [&str; 1] = ["asc"];
pub const IGNORED_FILES: [&str; 3] = ["archetype-catalog.xml", "last_updated.txt", "robots.txt"];

/// Constructor-time validation failures of the value types in this module
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("{0} cannot be blank")]
    Blank(&'static str),
    #[error("group cannot start with a dot: {0}")]
    GroupStartsWithDot(String),
    #[error("{kind} cannot contain '/': {value}")]
    ContainsSlash { kind: &'static str, value: String },
    #[error("not a valid version: {0:?}")]
    InvalidVersion(String),
}

fn check_segment(kind: &'static str, value: &str) -> Result<(), ValueError> {
    if value.trim().is_empty() {
        return Err(ValueError::Blank(kind));
    }
    if value.contains('/') {
        return Err(ValueError::ContainsSlash { kind, value: value.to_string() });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Group(String);
impl Group {
    pub fn new(value: impl Into<String>) -> Result<Group, ValueError> {
        let value = value.into();
        check_segment("group", &value)?;
        if value.starts_with('.') {
            return Err(ValueError::GroupStartsWithDot(value));
        }
        Ok(Group(value))
    }

    /// Builds a group from the directory segments of a repository path, e.g. `["org", "example"]`
    pub fn from_path_segments<S: AsRef<str>>(segments: &[S]) -> Result<Group, ValueError> {
        let joined = segments.iter()
            .map(|s| s.as_ref())
            .collect::<Vec<_>>()
            .join(".");
        Group::new(joined)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn path_segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }
}
impl Display for Group {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Artifact(String);
impl Artifact {
    pub fn new(value: impl Into<String>) -> Result<Artifact, ValueError> {
        let value = value.into();
        check_segment("artifact", &value)?;
        Ok(Artifact(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl Display for Artifact {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies exactly one release
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Coordinates {
    pub group: Group,
    pub artifact: Artifact,
    pub version: ArtifactVersion,
}
impl Coordinates {
    pub fn new(group: Group, artifact: Artifact, version: ArtifactVersion) -> Coordinates {
        Coordinates { group, artifact, version }
    }

    /// The prefix every file of this release starts with, i.e. `<artifact>-<version>`
    pub fn asset_base_name(&self) -> String {
        format!("{}-{}", self.artifact, self.version)
    }
}
impl Display for Coordinates {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.artifact, self.version)
    }
}

/// All known release versions of one artifact on one repository. Versions are kept in the order
///  they were read, without duplicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactMetadata {
    pub group: Group,
    pub artifact: Artifact,
    versions: Vec<ArtifactVersion>,
}
impl ArtifactMetadata {
    /// Snapshot versions are dropped, duplicates are collapsed keeping the first occurrence
    pub fn new(group: Group, artifact: Artifact, versions: impl IntoIterator<Item = ArtifactVersion>) -> ArtifactMetadata {
        let mut seen = HashSet::new();
        let versions = versions.into_iter()
            .filter(|v| !v.is_snapshot())
            .filter(|v| seen.insert(v.clone()))
            .collect();

        ArtifactMetadata { group, artifact, versions }
    }

    pub fn empty(group: Group, artifact: Artifact) -> ArtifactMetadata {
        ArtifactMetadata { group, artifact, versions: vec![] }
    }

    pub fn versions(&self) -> &[ArtifactVersion] {
        &self.versions
    }

    pub fn contains(&self, version: &ArtifactVersion) -> bool {
        self.versions.contains(version)
    }

    /// Versions present here but not in `other`, in this metadata's order
    pub fn missing_from(&self, other: &ArtifactMetadata) -> Vec<ArtifactVersion> {
        let present: HashSet<&ArtifactVersion> = other.versions.iter().collect();
        self.versions.iter()
            .filter(|v| !present.contains(v))
            .cloned()
            .collect()
    }

    pub fn with_version(&self, version: ArtifactVersion) -> ArtifactMetadata {
        ArtifactMetadata::new(
            self.group.clone(),
            self.artifact.clone(),
            self.versions.iter().cloned().chain(std::iter::once(version)),
        )
    }

    pub fn coordinates(&self, version: ArtifactVersion) -> Coordinates {
        Coordinates::new(self.group.clone(), self.artifact.clone(), version)
    }
}
impl Display for ArtifactMetadata {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} [", self.group, self.artifact)?;
        for (i, v) in self.versions.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", v)?;
        }
        f.write_str("]")
    }
}

/// A leaf name inside a repository directory
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Filename(String);
impl Filename {
    pub fn new(value: impl Into<String>) -> Result<Filename, ValueError> {
        let value = value.into();
        check_segment("filename", &value)?;
        Ok(Filename(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// the part after the last '.', or the whole name if there is none
    pub fn extension(&self) -> &str {
        match self.0.rfind('.') {
            Some(idx) => &self.0[idx + 1..],
            None => &self.0,
        }
    }

    pub fn is_pom(&self) -> bool {
        self.extension() == "pom"
    }

    pub fn is_checksum(&self) -> bool {
        CHECKSUM_EXTENSIONS.contains(&self.extension())
    }

    pub fn is_signature(&self) -> bool {
        SIGNATURE_EXTENSIONS.contains(&self.extension())
    }

    pub fn is_maven_metadata(&self) -> bool {
        self.0 == MAVEN_METADATA_XML_FILE
    }

    pub fn is_ignored(&self) -> bool {
        IGNORED_FILES.contains(&self.0.as_str())
    }
}
impl Display for Filename {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One transferable file of one release
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactVersionAsset {
    pub coordinates: Coordinates,
    pub name: Filename,
}
impl Display for ArtifactVersionAsset {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.coordinates, self.name)
    }
}
