use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use roadmatch::export::{route_to_geojson, write_segments_csv};
use roadmatch::osm::{import_pbf, load_network, save_network_json};
use roadmatch::trace::load_trace;
use roadmatch::{
    CachedNetworkProvider, CsvCheckpointStore, MatcherConfig, NetworkProvider, RetryingProvider,
    RoadMatcher, StaticNetworkProvider,
};

/// Networks kept in memory by the on-disk network cache
const CACHED_NETWORKS: usize = 64;

#[derive(Parser)]
#[command(name = "roadmatch")]
#[command(about = "Match GPS traces onto an OpenStreetMap road network")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Match a GPX or CSV trace and write the matched segments
    Match(MatchArgs),
    /// Convert an OSM PBF extract into the JSON network form
    Import {
        #[arg(long)]
        pbf: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
}

#[derive(clap::Args)]
struct MatchArgs {
    /// Road network: OSM PBF extract or JSON network
    #[arg(long)]
    network: PathBuf,

    /// Trace file (.gpx, or CSV with latitude,longitude columns)
    #[arg(long)]
    trace: PathBuf,

    /// Segment table output; stdout when omitted
    #[arg(long)]
    output: Option<PathBuf>,

    /// Also write the matched route as GeoJSON
    #[arg(long)]
    geojson: Option<PathBuf>,

    /// Resume from and save per-batch checkpoints here
    #[arg(long)]
    checkpoint_dir: Option<PathBuf>,

    /// Cache fetched sub-networks here
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// JSON matcher configuration; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Candidate paths per piece
    #[arg(short)]
    k: Option<usize>,

    /// Fetch window expansion in degrees
    #[arg(long)]
    delta: Option<f64>,

    /// Trace points per batch
    #[arg(long)]
    batch_size: Option<usize>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::builder()
        .filter_level(if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .format_target(false)
        .format_timestamp(None)
        .target(env_logger::Target::Stderr)
        .parse_default_env()
        .init();

    match cli.command {
        Command::Match(args) => run_match(args, cli.verbose),
        Command::Import { pbf, output } => {
            let network = import_pbf(&pbf).with_context(|| format!("importing {:?}", pbf))?;
            save_network_json(&network, &output)
                .with_context(|| format!("writing {:?}", output))?;
            info!(
                "Wrote {} nodes and {} edges to {:?}",
                network.node_count(),
                network.edge_count(),
                output
            );
            Ok(())
        }
    }
}

fn run_match(args: MatchArgs, verbose: bool) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => MatcherConfig::from_json_file(path)
            .with_context(|| format!("reading config {:?}", path))?,
        None => MatcherConfig::default(),
    };
    if let Some(k) = args.k {
        config.candidate_paths = k;
    }
    if let Some(delta) = args.delta {
        config.delta = delta;
    }
    if let Some(batch_size) = args.batch_size {
        config.points_per_batch = batch_size;
    }

    let network = load_network(&args.network)
        .with_context(|| format!("loading network {:?}", args.network))?;
    let points =
        load_trace(&args.trace).with_context(|| format!("loading trace {:?}", args.trace))?;

    let base = StaticNetworkProvider::new(network);
    let provider: Box<dyn NetworkProvider> = match &args.cache_dir {
        Some(dir) => Box::new(CachedNetworkProvider::new(base, dir, CACHED_NETWORKS)?),
        None => Box::new(base),
    };
    let provider = RetryingProvider::new(
        provider,
        config.provider_retries,
        Duration::from_millis(config.provider_backoff_ms),
    );

    let mut matcher = RoadMatcher::new(provider, config)?.with_progress(!verbose);
    if let Some(dir) = &args.checkpoint_dir {
        matcher = matcher.with_checkpoints(CsvCheckpointStore::new(dir)?);
    }

    let route = matcher
        .match_trace(&points)
        .with_context(|| format!("matching {:?}", args.trace))?;
    info!(
        "{} pieces, {} segments, {:.1} m of road",
        route.pieces.len(),
        route.segments.len(),
        route.total_osm_length()
    );

    match &args.output {
        Some(path) => {
            let file = BufWriter::new(File::create(path)?);
            write_segments_csv(file, &route.segments)?;
            info!("Segments written to {:?}", path);
        }
        None => write_segments_csv(std::io::stdout().lock(), &route.segments)?,
    }

    if let Some(path) = &args.geojson {
        let file = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(file, &route_to_geojson(&route.segments))?;
        info!("GeoJSON written to {:?}", path);
    }

    Ok(())
}
