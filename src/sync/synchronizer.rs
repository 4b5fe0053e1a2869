use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::maven::coordinates::*;
use crate::maven::remote_repo::MavenHttpRepository;
use crate::util::staging::StagingArea;

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub transfer_checksums: bool,
    pub transfer_signatures: bool,
    /// pause between two versions of the same artifact
    pub download_delay: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArtifactSyncOutcome {
    pub versions_transferred: usize,
    pub assets_copied: usize,
    pub bytes_copied: u64,
}

/// Copies the releases of one artifact that exist in the source repository but not in the target
///  repository, one version at a time.
pub struct Synchronizer {
    source: Arc<MavenHttpRepository>,
    target: Arc<MavenHttpRepository>,
    staging: StagingArea,
    options: SyncOptions,
}

impl Synchronizer {
    pub fn new(source: Arc<MavenHttpRepository>, target: Arc<MavenHttpRepository>, staging: StagingArea, options: SyncOptions) -> Synchronizer {
        Synchronizer {
            source,
            target,
            staging,
            options,
        }
    }

    /// `source_metadata` is the artifact's metadata as found in the source repository. The
    ///  target's metadata is read here, and every version missing there is copied and then
    ///  published.
    ///
    /// A version's assets are uploaded before the target's metadata is updated, so an interrupted
    ///  transfer is repeated in full by the next run.
    pub async fn synchronize(&self, source_metadata: &ArtifactMetadata) -> anyhow::Result<ArtifactSyncOutcome> {
        let target_metadata = self.target
            .query_artifact_metadata(&source_metadata.group, &source_metadata.artifact).await
            .with_context(|| format!("reading target metadata of {}:{}", source_metadata.group, source_metadata.artifact))?;

        let missing = source_metadata.missing_from(&target_metadata);
        if missing.is_empty() {
            debug!("{}:{} is up to date", source_metadata.group, source_metadata.artifact);
            return Ok(ArtifactSyncOutcome::default());
        }
        info!("{}:{}: {} of {} versions missing on target", source_metadata.group, source_metadata.artifact, missing.len(), source_metadata.versions().len());

        let mut outcome = ArtifactSyncOutcome::default();
        for (idx, version) in missing.into_iter().enumerate() {
            if idx > 0 && !self.options.download_delay.is_zero() {
                tokio::time::sleep(self.options.download_delay).await;
            }

            let coordinates = source_metadata.coordinates(version);
            let (assets, bytes) = self.transfer_version(&coordinates).await
                .with_context(|| format!("transferring {}", coordinates))?;
            if assets == 0 {
                continue;
            }

            self.target.release_version(&coordinates).await?;
            outcome.versions_transferred += 1;
            outcome.assets_copied += assets;
            outcome.bytes_copied += bytes;
        }
        Ok(outcome)
    }

    /// Returns the number of assets and bytes copied
    async fn transfer_version(&self, coordinates: &Coordinates) -> anyhow::Result<(usize, u64)> {
        let assets = self.source
            .list_artifact_version_assets(coordinates, self.options.transfer_checksums, self.options.transfer_signatures).await?;
        if assets.is_empty() {
            warn!("{} has no files, not releasing it", coordinates);
            return Ok((0, 0));
        }

        let mut bytes = 0;
        for asset in &assets {
            let size = self.source.copy_asset(asset, &self.target, &self.staging).await?;
            debug!("copied {} ({} bytes)", asset, size);
            bytes += size;
        }
        Ok((assets.len(), bytes))
    }
}
