mod demo;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use hashes_counter::CounterConfig;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    Plain,
    Weighted,
    Uncapped,
    Hybrid,
}

#[derive(Parser, Debug)]
#[command(
    about = "Aggregates synthetic hash samples into a filtered abundance table",
    long_about = None
)]
pub struct Args {
    /// Which accumulator to run.
    #[arg(short, long, value_enum, default_value_t = Mode::Plain)]
    pub mode: Mode,
    /// Number of samples (ingestion batches).
    #[arg(short, long, default_value_t = 32)]
    pub samples: usize,
    /// Hashes drawn per sample.
    #[arg(long, default_value_t = 100_000)]
    pub hashes_per_sample: usize,
    /// Hashes are drawn from [0..universe).
    #[arg(short, long, default_value_t = 1_000_000)]
    pub universe: u64,
    /// Remove hashes seen once (plain mode only).
    #[arg(long)]
    pub remove_singletons: bool,
    /// Keep only hashes with at least this count (not used in hybrid mode).
    #[arg(long)]
    pub min_abund: Option<u32>,
    /// Number of shards per table; a power of two.
    #[arg(long, default_value_t = hashes_counter::config::DEFAULT_SHARDS)]
    pub shards: usize,
    /// Seed for the sample generator.
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
    /// Render the abundance spectrum to this PNG file.
    #[arg(long)]
    pub plot: Option<String>,
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .try_init()?;

    let args = Args::parse();
    let config = CounterConfig::default().with_shards(args.shards);
    config.validate()?;

    let spectrum = demo::synthetic::run(&args, &config)?;

    if let Some(path) = &args.plot {
        demo::spectrum::plot_spectrum(path, &spectrum)
            .map_err(|e| anyhow::anyhow!("failed to plot {}: {}", path, e))?;
    }

    Ok(())
}
