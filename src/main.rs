use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use maven_sync::config::{load_config, ConfigOverrides, SyncConfig};
use maven_sync::maven::remote_repo::MavenHttpRepository;
use maven_sync::sync::pipeline::{run_pipeline, PipelineOptions, PipelineReport};
use maven_sync::sync::synchronizer::{SyncOptions, Synchronizer};
use maven_sync::util::http_transport::{HttpTransport, HttpTransportOptions};
use maven_sync::util::staging::StagingArea;

/// Copies released artifacts that are missing in a target Maven repository from a source repository
#[derive(Parser, Debug)]
#[command(name = "maven-sync", version)]
struct Cli {
    /// TOML config files, later files override earlier ones
    #[arg(short, long = "config")]
    config: Vec<PathBuf>,

    /// debug logging for this program (RUST_LOG takes precedence)
    #[arg(long)]
    debug: bool,

    #[arg(long, env = "MAVEN_SYNC_SOURCE_URL")]
    source_url: Option<String>,
    #[arg(long, env = "MAVEN_SYNC_TARGET_URL")]
    target_url: Option<String>,

    /// number of artifacts synchronized in parallel
    #[arg(long)]
    concurrency: Option<usize>,
    #[arg(long)]
    crawl_delay_ms: Option<u64>,
    #[arg(long)]
    download_delay_ms: Option<u64>,

    /// restrict the crawl to this path of the source repository, can be repeated
    #[arg(long = "path")]
    paths: Vec<String>,

    #[arg(long)]
    transfer_checksums: Option<bool>,
    #[arg(long)]
    transfer_signatures: Option<bool>,
}
impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            source_url: self.source_url.clone(),
            target_url: self.target_url.clone(),
            artifact_concurrency: self.concurrency,
            crawl_delay_ms: self.crawl_delay_ms,
            download_delay_ms: self.download_delay_ms,
            paths: self.paths.clone(),
            transfer_checksums: self.transfer_checksums,
            transfer_signatures: self.transfer_signatures,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let config = match load_config(&cli.config, &cli.overrides()) {
        Ok(config) => config,
        Err(e) => {
            error!("configuration error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    info!("effective configuration: {:?}", config);

    match run(config).await {
        Ok(report) => {
            if report.artifacts_failed > 0 {
                info!("{} artifacts failed and will be retried by the next run", report.artifacts_failed);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("synchronization aborted: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(debug: bool) {
    let default_directive = if debug { "maven_sync=debug" } else { "maven_sync=info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();
}

async fn run(config: SyncConfig) -> anyhow::Result<PipelineReport> {
    let source_transport = HttpTransport::new(HttpTransportOptions {
        credentials: config.source.credentials.clone(),
        log_http_headers: config.source.log_http_headers,
        ..Default::default()
    })?;
    let target_transport = HttpTransport::new(HttpTransportOptions {
        credentials: config.target.credentials.clone(),
        log_http_headers: config.target.log_http_headers,
        ..Default::default()
    })?;

    let source = Arc::new(MavenHttpRepository::new(&config.source.url, Arc::new(source_transport))?);
    let target = Arc::new(MavenHttpRepository::new(&config.target.url, Arc::new(target_transport))?);

    let synchronizer = Arc::new(Synchronizer::new(
        source.clone(),
        target,
        StagingArea::new(config.staging_dir.clone()),
        SyncOptions {
            transfer_checksums: config.transfer_checksums,
            transfer_signatures: config.transfer_signatures,
            download_delay: config.source.download_delay(),
        },
    ));

    run_pipeline(source, synchronizer, PipelineOptions {
        concurrency: config.artifact_concurrency,
        crawl_delay: config.source.crawl_delay(),
        start_paths: config.source.paths.clone(),
    }).await
}
