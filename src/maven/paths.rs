use anyhow::anyhow;
use url::Url;

use crate::maven::coordinates::*;

/// Maps Maven concepts to URLs inside one repository, rooted at a base URL that always ends with '/'
#[derive(Debug, Clone)]
pub struct RepositoryLayout {
    base: Url,
}
impl RepositoryLayout {
    pub fn new(base_url: &str) -> anyhow::Result<RepositoryLayout> {
        let base = Url::parse(&normalize_directory_path(base_url))?;
        if base.cannot_be_a_base() {
            return Err(anyhow!("not a valid repository URL: {}", base_url));
        }
        Ok(RepositoryLayout { base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// The directory URL a crawl of `path` (relative to the repository root) starts at
    pub fn start_url(&self, path: &str) -> anyhow::Result<Url> {
        let relative = normalize_directory_path(path.trim_start_matches('/'));
        if relative == "/" {
            return Ok(self.base.clone());
        }
        Ok(self.base.join(&relative)?)
    }

    pub fn artifact_directory_url(&self, group: &Group, artifact: &Artifact) -> Url {
        self.build(group.path_segments().chain([artifact.as_str(), ""]))
    }

    pub fn metadata_url(&self, group: &Group, artifact: &Artifact) -> Url {
        self.build(group.path_segments().chain([artifact.as_str(), MAVEN_METADATA_XML_FILE]))
    }

    pub fn version_directory_url(&self, coordinates: &Coordinates) -> Url {
        self.build(coordinates.group.path_segments()
            .chain([coordinates.artifact.as_str(), coordinates.version.as_str(), ""]))
    }

    pub fn asset_url(&self, asset: &ArtifactVersionAsset) -> Url {
        let coordinates = &asset.coordinates;
        self.build(coordinates.group.path_segments()
            .chain([coordinates.artifact.as_str(), coordinates.version.as_str(), asset.name.as_str()]))
    }

    fn build<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            path.extend(segments);
        }
        url
    }

    /// The path segments of a directory below the repository root, e.g. `["org", "example", "demo"]`
    ///  for `<base>/org/example/demo/`
    pub fn relative_segments(&self, directory: &Url) -> Option<Vec<String>> {
        let relative = directory.as_str().strip_prefix(self.base.as_str())?;
        Some(relative
            .split('/')
            .filter(|s| !s.is_empty())
            .map(decode_segment)
            .collect())
    }

    /// Interprets a directory as `<group path>/<artifact>/`, the way a directory that directly
    ///  contains version directories is laid out
    pub fn group_and_artifact(&self, directory: &Url) -> anyhow::Result<(Group, Artifact)> {
        let segments = self.relative_segments(directory)
            .ok_or_else(|| anyhow!("{} is outside of repository {}", directory, self.base))?;

        match segments.split_last() {
            Some((artifact, group)) if !group.is_empty() => {
                Ok((Group::from_path_segments(group)?, Artifact::new(artifact.as_str())?))
            }
            _ => Err(anyhow!("{} is too shallow to be an artifact directory", directory)),
        }
    }
}

/// URLs carry path segments percent-encoded, names in coordinates are plain text. Segments that do
///  not decode to UTF-8 are kept as they are.
fn decode_segment(segment: &str) -> String {
    match urlencoding::decode(segment) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => segment.to_string(),
    }
}

pub fn normalize_directory_path(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    }
    else {
        format!("{}/", path)
    }
}

/// Classification of URLs found in directory listings
pub trait ListingUrlExt {
    fn is_directory(&self) -> bool;

    /// the last non-empty path segment, i.e. the file name or the directory name, percent-decoded
    fn leaf_name(&self) -> Option<String>;

    fn filename(&self) -> Option<Filename> {
        if self.is_directory() {
            return None;
        }
        self.leaf_name().and_then(|name| Filename::new(name).ok())
    }
}
impl ListingUrlExt for Url {
    fn is_directory(&self) -> bool {
        self.path().ends_with('/')
    }

    fn leaf_name(&self) -> Option<String> {
        self.path_segments()?
            .filter(|s| !s.is_empty())
            .last()
            .map(decode_segment)
    }
}


#[cfg(test)]
mod test {
    use rstest::*;
    use super::*;

    fn layout() -> RepositoryLayout {
        RepositoryLayout::new("https://repo.example.com/maven2").unwrap()
    }

    fn coordinates() -> Coordinates {
        Coordinates::new(
            Group::new("org.example").unwrap(),
            Artifact::new("demo").unwrap(),
            ArtifactVersion::new("1.0").unwrap(),
        )
    }

    #[test]
    fn test_base_gets_trailing_slash() {
        assert_eq!(layout().base().as_str(), "https://repo.example.com/maven2/");
    }

    #[rstest]
    #[case::empty("", "https://repo.example.com/maven2/")]
    #[case::root("/", "https://repo.example.com/maven2/")]
    #[case::relative("org/example", "https://repo.example.com/maven2/org/example/")]
    #[case::leading_slash("/org/example/", "https://repo.example.com/maven2/org/example/")]
    fn test_start_url(#[case] path: &str, #[case] expected: &str) {
        assert_eq!(layout().start_url(path).unwrap().as_str(), expected);
    }

    #[test]
    fn test_urls_for_coordinates() {
        let layout = layout();
        let coordinates = coordinates();
        assert_eq!(
            layout.version_directory_url(&coordinates).as_str(),
            "https://repo.example.com/maven2/org/example/demo/1.0/",
        );
        assert_eq!(
            layout.metadata_url(&coordinates.group, &coordinates.artifact).as_str(),
            "https://repo.example.com/maven2/org/example/demo/maven-metadata.xml",
        );
        assert_eq!(
            layout.artifact_directory_url(&coordinates.group, &coordinates.artifact).as_str(),
            "https://repo.example.com/maven2/org/example/demo/",
        );

        let asset = ArtifactVersionAsset { coordinates, name: Filename::new("demo-1.0.jar").unwrap() };
        assert_eq!(
            layout.asset_url(&asset).as_str(),
            "https://repo.example.com/maven2/org/example/demo/1.0/demo-1.0.jar",
        );
    }

    #[rstest]
    #[case::nested("https://repo.example.com/maven2/org/example/demo/", Some(("org.example", "demo")))]
    #[case::single_group_segment("https://repo.example.com/maven2/junit/junit/", Some(("junit", "junit")))]
    #[case::too_shallow("https://repo.example.com/maven2/demo/", None)]
    #[case::root("https://repo.example.com/maven2/", None)]
    #[case::outside("https://other.example.com/org/demo/", None)]
    fn test_group_and_artifact(#[case] directory: &str, #[case] expected: Option<(&str, &str)>) {
        let actual = layout().group_and_artifact(&Url::parse(directory).unwrap());

        match expected {
            Some((group, artifact)) => {
                let (actual_group, actual_artifact) = actual.unwrap();
                assert_eq!(actual_group.as_str(), group);
                assert_eq!(actual_artifact.as_str(), artifact);
            }
            None => assert!(actual.is_err()),
        }
    }

    #[test]
    fn test_encoded_names_are_not_encoded_twice() {
        let layout = layout();
        let directory = Url::parse("https://repo.example.com/maven2/org/my%20group/my%20lib/").unwrap();

        let (group, artifact) = layout.group_and_artifact(&directory).unwrap();
        assert_eq!(group.as_str(), "org.my group");
        assert_eq!(artifact.as_str(), "my lib");

        assert_eq!(layout.artifact_directory_url(&group, &artifact), directory);
        assert_eq!(
            layout.metadata_url(&group, &artifact).as_str(),
            "https://repo.example.com/maven2/org/my%20group/my%20lib/maven-metadata.xml",
        );
    }

    #[rstest]
    #[case::directory("https://r.example.com/a/b/", true, Some("b"), None)]
    #[case::file("https://r.example.com/a/b-1.0.jar", false, Some("b-1.0.jar"), Some("b-1.0.jar"))]
    #[case::root("https://r.example.com/", true, None, None)]
    #[case::encoded_file("https://r.example.com/a/my%20lib-1.0.jar", false, Some("my lib-1.0.jar"), Some("my lib-1.0.jar"))]
    #[case::encoded_directory("https://r.example.com/a/1.0%2Bbuild/", true, Some("1.0+build"), None)]
    fn test_listing_url_ext(#[case] url: &str, #[case] is_directory: bool, #[case] leaf: Option<&str>, #[case] filename: Option<&str>) {
        let url = Url::parse(url).unwrap();
        assert_eq!(url.is_directory(), is_directory);
        assert_eq!(url.leaf_name().as_deref(), leaf);
        assert_eq!(url.filename().as_ref().map(|f| f.as_str()), filename);
    }
}
