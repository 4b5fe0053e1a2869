use std::path::{Path, PathBuf};

use tempfile::{Builder, NamedTempFile};
use tokio::fs::File;
use tracing::trace;

/// Local scratch space for files travelling from one repository to the other. Every staged file is
///  deleted when its [StagedFile] is dropped, whether the transfer succeeded or not.
#[derive(Debug, Clone, Default)]
pub struct StagingArea {
    directory: Option<PathBuf>,
}
impl StagingArea {
    /// `None` stages in the system's temp directory
    pub fn new(directory: Option<PathBuf>) -> StagingArea {
        StagingArea { directory }
    }

    pub fn stage(&self) -> anyhow::Result<StagedFile> {
        let mut builder = Builder::new();
        builder.prefix("maven-sync-").suffix(".staged");

        let file = match &self.directory {
            Some(directory) => builder.tempfile_in(directory)?,
            None => builder.tempfile()?,
        };
        trace!("staging to {}", file.path().display());
        Ok(StagedFile { file })
    }
}

pub struct StagedFile {
    file: NamedTempFile,
}
impl StagedFile {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// A fresh handle positioned at the start of the file, for writing or reading
    pub fn open(&self) -> anyhow::Result<File> {
        Ok(File::from_std(self.file.reopen()?))
    }
}
