use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use futures::future::join_all;
use tokio::sync::{mpsc, Mutex};
use tokio::sync::mpsc::Receiver;
use tracing::{debug, error, info};

use crate::maven::coordinates::ArtifactMetadata;
use crate::maven::crawler::{CrawlReport, RepositoryCrawler};
use crate::maven::remote_repo::MavenHttpRepository;
use crate::sync::synchronizer::{ArtifactSyncOutcome, Synchronizer};

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// number of workers, and capacity of the queue between crawler and workers
    pub concurrency: usize,
    pub crawl_delay: Duration,
    pub start_paths: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub crawl: CrawlReport,
    pub artifacts_synchronized: usize,
    pub artifacts_failed: usize,
    pub versions_transferred: usize,
    pub assets_copied: usize,
    pub bytes_copied: u64,
}
impl PipelineReport {
    fn add(&mut self, worker: WorkerTally) {
        self.artifacts_synchronized += worker.synchronized;
        self.artifacts_failed += worker.failed;
        self.versions_transferred += worker.outcome.versions_transferred;
        self.assets_copied += worker.outcome.assets_copied;
        self.bytes_copied += worker.outcome.bytes_copied;
    }
}
impl Display for PipelineReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} directories crawled ({} failed), {} artifacts found, {} synchronized, {} failed, {} versions / {} files / {} bytes transferred",
            self.crawl.directories_visited,
            self.crawl.directories_failed,
            self.crawl.artifacts_found,
            self.artifacts_synchronized,
            self.artifacts_failed,
            self.versions_transferred,
            self.assets_copied,
            self.bytes_copied,
        )
    }
}

#[derive(Default)]
struct WorkerTally {
    synchronized: usize,
    failed: usize,
    outcome: ArtifactSyncOutcome,
}

/// Crawls `source` and synchronizes every artifact found, with a fixed number of workers fed
///  through a bounded queue. The crawler waits while all workers are busy and the queue is full.
///
/// Failing artifacts are logged and counted, they do not stop the run.
pub async fn run_pipeline(source: Arc<MavenHttpRepository>, synchronizer: Arc<Synchronizer>, options: PipelineOptions) -> anyhow::Result<PipelineReport> {
    if options.concurrency == 0 {
        return Err(anyhow!("concurrency must be at least 1"));
    }

    let (sender, receiver) = mpsc::channel::<ArtifactMetadata>(options.concurrency);
    let receiver = Arc::new(Mutex::new(receiver));

    let mut workers = vec![];
    for worker_id in 0..options.concurrency {
        let receiver = receiver.clone();
        let synchronizer = synchronizer.clone();
        workers.push(tokio::spawn(async move {
            work(worker_id, receiver, synchronizer).await
        }));
    }
    // only the workers own the queue's receiving end, so the crawler notices if all of them are gone
    drop(receiver);

    let crawl_result = RepositoryCrawler::new(&source, options.crawl_delay)
        .crawl(&options.start_paths, &sender).await;
    // closing the queue lets the workers finish once it is drained
    drop(sender);

    let mut report = PipelineReport::default();
    for worker in join_all(workers).await {
        report.add(worker?);
    }
    report.crawl = crawl_result?;

    info!("synchronization finished: {}", report);
    Ok(report)
}

async fn work(worker_id: usize, receiver: Arc<Mutex<Receiver<ArtifactMetadata>>>, synchronizer: Arc<Synchronizer>) -> WorkerTally {
    let mut tally = WorkerTally::default();
    loop {
        let next = receiver.lock().await.recv().await;
        let Some(metadata) = next else {
            break;
        };

        debug!("worker {} picked up {}", worker_id, metadata);
        match synchronizer.synchronize(&metadata).await {
            Ok(outcome) => {
                tally.synchronized += 1;
                tally.outcome.versions_transferred += outcome.versions_transferred;
                tally.outcome.assets_copied += outcome.assets_copied;
                tally.outcome.bytes_copied += outcome.bytes_copied;
            }
            Err(e) => {
                error!("failed to synchronize {}:{}: {:#}", metadata.group, metadata.artifact, e);
                tally.failed += 1;
            }
        }
    }
    debug!("worker {} done", worker_id);
    tally
}
