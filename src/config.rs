use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

const DEFAULTS: &str = include_str!("../config/defaults.toml");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub transfer_checksums: bool,
    pub transfer_signatures: bool,
    /// number of artifacts synchronized in parallel, and the capacity of the crawl queue
    pub artifact_concurrency: usize,
    /// where files are staged between download and upload, defaults to the system temp directory
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,
    pub source: SourceRepositoryConfig,
    pub target: TargetRepositoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRepositoryConfig {
    pub url: String,
    #[serde(default)]
    pub credentials: Option<RepositoryCredentials>,
    #[serde(default)]
    pub log_http_headers: bool,
    pub crawl_delay_ms: u64,
    pub download_delay_ms: u64,
    /// subtrees to crawl, relative to `url`; empty means the whole repository
    #[serde(default)]
    pub paths: Vec<String>,
}
impl SourceRepositoryConfig {
    pub fn crawl_delay(&self) -> Duration {
        Duration::from_millis(self.crawl_delay_ms)
    }

    pub fn download_delay(&self) -> Duration {
        Duration::from_millis(self.download_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetRepositoryConfig {
    pub url: String,
    #[serde(default)]
    pub credentials: Option<RepositoryCredentials>,
    #[serde(default)]
    pub log_http_headers: bool,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryCredentials {
    pub username: String,
    pub password: String,
}
impl Debug for RepositoryCredentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Settings given on the command line, they take precedence over all config files
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub source_url: Option<String>,
    pub target_url: Option<String>,
    pub artifact_concurrency: Option<usize>,
    pub crawl_delay_ms: Option<u64>,
    pub download_delay_ms: Option<u64>,
    pub paths: Vec<String>,
    pub transfer_checksums: Option<bool>,
    pub transfer_signatures: Option<bool>,
}
impl ConfigOverrides {
    fn apply(&self, root: &mut toml::Value) {
        if let Some(url) = &self.source_url {
            set(root, &["source", "url"], toml::Value::String(url.clone()));
        }
        if let Some(url) = &self.target_url {
            set(root, &["target", "url"], toml::Value::String(url.clone()));
        }
        if let Some(n) = self.artifact_concurrency {
            set(root, &["artifact_concurrency"], toml::Value::Integer(n as i64));
        }
        if let Some(ms) = self.crawl_delay_ms {
            set(root, &["source", "crawl_delay_ms"], toml::Value::Integer(ms as i64));
        }
        if let Some(ms) = self.download_delay_ms {
            set(root, &["source", "download_delay_ms"], toml::Value::Integer(ms as i64));
        }
        if !self.paths.is_empty() {
            let paths = self.paths.iter()
                .map(|p| toml::Value::String(p.clone()))
                .collect();
            set(root, &["source", "paths"], toml::Value::Array(paths));
        }
        if let Some(flag) = self.transfer_checksums {
            set(root, &["transfer_checksums"], toml::Value::Boolean(flag));
        }
        if let Some(flag) = self.transfer_signatures {
            set(root, &["transfer_signatures"], toml::Value::Boolean(flag));
        }
    }
}

/// Loads the configuration from the built-in defaults, then each of `files` in order (missing files
///  are skipped), then `overrides`.
pub fn load_config(files: &[PathBuf], overrides: &ConfigOverrides) -> anyhow::Result<SyncConfig> {
    let mut layers = vec![];
    for file in files {
        match read_layer(file)? {
            Some(layer) => layers.push(layer),
            None => warn!("config file {} does not exist, skipping", file.display()),
        }
    }
    load_layers(layers, overrides)
}

fn read_layer(file: &Path) -> anyhow::Result<Option<toml::Value>> {
    if !file.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("reading config file {}", file.display()))?;
    let layer = toml::from_str(&text)
        .with_context(|| format!("parsing config file {}", file.display()))?;
    debug!("read config file {}", file.display());
    Ok(Some(layer))
}

fn load_layers(layers: Vec<toml::Value>, overrides: &ConfigOverrides) -> anyhow::Result<SyncConfig> {
    let mut merged: toml::Value = toml::from_str(DEFAULTS)
        .context("parsing built-in defaults")?;
    for layer in layers {
        merge(&mut merged, layer);
    }
    overrides.apply(&mut merged);

    let config: SyncConfig = merged.try_into()
        .context("invalid configuration")?;
    config.validate()?;
    Ok(config)
}

impl SyncConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.artifact_concurrency == 0 {
            return Err(anyhow!("artifact_concurrency must be at least 1"));
        }
        validate_url("source.url", &self.source.url)?;
        validate_url("target.url", &self.target.url)?;
        Ok(())
    }
}

fn validate_url(name: &str, url: &str) -> anyhow::Result<()> {
    let parsed = Url::parse(url)
        .with_context(|| format!("{} is not a valid URL: {:?}", name, url))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(anyhow!("{} must be an http(s) URL, was {}", name, other)),
    }
}

/// Tables are merged recursively, everything else in `overlay` replaces the value in `base`
fn merge(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn set(root: &mut toml::Value, path: &[&str], value: toml::Value) {
    let (last, parents) = match path.split_last() {
        Some(split) => split,
        None => return,
    };

    let mut current = root;
    for key in parents {
        if !current.is_table() {
            *current = toml::Value::Table(Default::default());
        }
        let Some(table) = current.as_table_mut() else { return };
        current = table.entry(key.to_string())
            .or_insert_with(|| toml::Value::Table(Default::default()));
    }
    if !current.is_table() {
        *current = toml::Value::Table(Default::default());
    }
    if let Some(table) = current.as_table_mut() {
        table.insert(last.to_string(), value);
    }
}
