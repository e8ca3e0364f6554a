use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use feedharvest::{
    convert_all, harvest_all, info_time, DedupPolicy, ExtractConfig, HarvestConfig, Result,
    SnapshotSurface,
};

#[derive(Parser)]
#[command(name = "feedharvest")]
#[command(about = "Harvest infinite-scroll post feeds and extract them into a table")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the crawl loop over captured feed frames
    Harvest(HarvestArgs),

    /// Extract harvested artifacts into one CSV table
    Extract(ExtractArgs),
}

#[derive(Args)]
struct HarvestArgs {
    /// Directory holding one sub-directory of numbered frames per feed
    #[arg(long)]
    snapshots: PathBuf,

    /// Feed to harvest, repeatable. Defaults to every feed under --snapshots
    #[arg(long = "feed")]
    feeds: Vec<String>,

    #[arg(long)]
    output: Option<PathBuf>,

    #[arg(long)]
    target: Option<usize>,

    #[arg(long)]
    max_iterations: Option<usize>,

    #[arg(long)]
    stall_limit: Option<usize>,

    #[arg(long)]
    settle_ms: Option<u64>,

    /// Skip items already saved by earlier runs instead of starting from index 0
    #[arg(long)]
    resume: bool,
}

#[derive(Args)]
struct ExtractArgs {
    #[arg(long)]
    input: Option<PathBuf>,

    #[arg(long)]
    output: Option<PathBuf>,

    /// Add an Identity column with each post's detail-link path
    #[arg(long)]
    with_identity: bool,

    #[arg(long)]
    no_bom: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("feedharvest=info")),
        )
        .init();

    let start_time = Local::now();
    match Cli::parse().command {
        Commands::Harvest(args) => harvest(args).await?,
        Commands::Extract(args) => extract(args).await?,
    }
    info_time!(start_time, "Full program time:");

    Ok(())
}

async fn harvest(args: HarvestArgs) -> Result<()> {
    let defaults = HarvestConfig::default();
    let feeds = if args.feeds.is_empty() {
        snapshot_feeds(&args.snapshots).await?
    } else {
        args.feeds
    };
    let config = HarvestConfig {
        feeds,
        output_root: args.output.unwrap_or(defaults.output_root.clone()),
        target_count: args.target.unwrap_or(defaults.target_count),
        max_iterations: args.max_iterations.unwrap_or(defaults.max_iterations),
        stall_limit: args.stall_limit.unwrap_or(defaults.stall_limit),
        settle_delay: args
            .settle_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.settle_delay),
        dedup: if args.resume {
            DedupPolicy::ResumeFromDisk
        } else {
            DedupPolicy::ResetPerRun
        },
        ..defaults
    };

    let surface = SnapshotSurface::new(&args.snapshots);
    harvest_all(&config, &surface).await;
    Ok(())
}

async fn extract(args: ExtractArgs) -> Result<()> {
    let defaults = ExtractConfig::default();
    let config = ExtractConfig {
        input_root: args.input.unwrap_or(defaults.input_root),
        output_path: args.output.unwrap_or(defaults.output_path),
        include_identity: args.with_identity,
        write_bom: !args.no_bom,
    };
    convert_all(&config).await?;
    Ok(())
}

async fn snapshot_feeds(root: &Path) -> Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(root).await?;
    let mut feeds = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            feeds.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    feeds.sort_unstable();
    Ok(feeds)
}
