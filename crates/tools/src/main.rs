use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use meshing::{CapacityPolicy, Mode, RunSummary};
use tools::{BuildOptions, build, inspect, load_config};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Turns GeoJSON features into render-ready mesh chunks")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate chunks, polylines and instance batches into a directory
    Build {
        /// Input GeoJSON FeatureCollection
        input: PathBuf,

        /// Output directory (manifest.json is written here)
        #[arg(long, short)]
        out: PathBuf,

        /// Pipeline configuration JSON; flags below override it
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long, value_enum)]
        mode: Option<ModeArg>,

        /// Grid resolution N (N x N cells)
        #[arg(long)]
        grid: Option<u32>,

        /// Maximum vertices per mesh chunk
        #[arg(long)]
        vertex_budget: Option<usize>,

        /// Maximum transforms per instance batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Skip polygons larger than the vertex budget instead of failing
        #[arg(long)]
        skip_oversized: bool,

        /// Name recorded in the manifest
        #[arg(long)]
        name: Option<String>,
    },

    /// Print geometry counts and the source extent
    Inspect {
        input: PathBuf,
    },
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ModeArg {
    Stream,
    Grid,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if let Err(e) = real_main(Args::parse()) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn real_main(args: Args) -> Result<(), String> {
    match args.command {
        Command::Build {
            input,
            out,
            config,
            mode,
            grid,
            vertex_budget,
            batch_size,
            skip_oversized,
            name,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(mode) = mode {
                config.mode = match mode {
                    ModeArg::Stream => Mode::Stream,
                    ModeArg::Grid => Mode::Grid,
                };
            }
            if let Some(n) = grid {
                config.grid_resolution = n;
            }
            if let Some(budget) = vertex_budget {
                config.vertex_budget = budget;
            }
            if let Some(size) = batch_size {
                config.instance_batch_size = size;
            }
            if skip_oversized {
                config.capacity_policy = CapacityPolicy::Skip;
            }

            let report = build(&BuildOptions {
                input,
                out_dir: out.clone(),
                config,
                name,
            })?;
            print_summary(&report.summary);
            eprintln!(
                "wrote {} ({} entries, content_hash={})",
                out.join(formats::MANIFEST_FILE_NAME).display(),
                report.manifest.entries.len(),
                report.manifest.content_hash.unwrap_or_default()
            );
            Ok(())
        }
        Command::Inspect { input } => {
            print!("{}", inspect(&input)?);
            Ok(())
        }
    }
}

fn print_summary(summary: &RunSummary) {
    eprintln!(
        "{:?} mode: {} features, {} cells, {} chunks, {} polylines, {} batches, {} placements",
        summary.mode,
        summary.features,
        summary.cells,
        summary.chunks,
        summary.polylines,
        summary.batches,
        summary.placements
    );
    eprintln!(
        "cache: {} entries, {} hits, {} computed",
        summary.cache.entries, summary.cache.hits, summary.cache.computed
    );
    for (name, histogram) in &summary.metrics.histograms {
        if let Some(mean) = histogram.mean() {
            eprintln!(
                "{name}: mean {mean:.1}, min {}, max {}",
                histogram.min, histogram.max
            );
        }
    }
    for event in &summary.events {
        eprintln!("  [{:?}] {}: {}", event.severity, event.kind, event.message);
    }
}
