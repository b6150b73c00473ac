use crate::{Args, Mode};
use hashes_counter::counters::CapPolicy;
use hashes_counter::parallel_counting::{self, Sample};
use hashes_counter::{
    Counter, CounterConfig, HybridDosageCounter, PlainCounter, WeightedCounter,
    WeightedCounterUncapped,
};
use log::{info, warn};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::time::Instant;
use xxhash_rust::xxh64::xxh64;

/// Count value to number of hashes carrying it.
pub type Spectrum = BTreeMap<u32, u64>;

/// Draws `samples` batches. Values are squared-uniform over the universe so
/// that low values recur across samples, then hashed to spread them.
pub fn generate_samples(args: &Args) -> Vec<Sample> {
    (0..args.samples as u64)
        .into_par_iter()
        .map(|idx| {
            let seed = args.seed ^ idx.wrapping_mul(0x9e37_79b9_7f4a_7c15);
            let mut rng = SmallRng::seed_from_u64(seed);
            let mut hashes = Vec::with_capacity(args.hashes_per_sample);
            let mut abundances = Vec::with_capacity(args.hashes_per_sample);
            for _ in 0..args.hashes_per_sample {
                let u: f64 = rng.random();
                let value = (u * u * args.universe as f64) as u64;
                hashes.push(xxh64(&value.to_le_bytes(), 0));
                abundances.push(rng.random_range(1..=20) as f32);
            }
            Sample::with_mean_abundance(hashes, abundances)
        })
        .collect()
}

fn spectrum_of(counts: impl IntoIterator<Item = u32>) -> Spectrum {
    let mut spectrum = Spectrum::new();
    for count in counts {
        *spectrum.entry(count).or_insert(0) += 1;
    }
    spectrum
}

/// Flags given on the command line that the selected mode ignores.
fn ignored_flags(args: &Args) -> Vec<&'static str> {
    let mut ignored = Vec::new();
    if args.remove_singletons && args.mode != Mode::Plain {
        ignored.push("--remove-singletons");
    }
    if args.min_abund.is_some() && args.mode == Mode::Hybrid {
        ignored.push("--min-abund");
    }
    ignored
}

fn finish_weighted<P: CapPolicy>(
    counter: &WeightedCounter<P>,
    samples: &[Sample],
    min_abund: Option<u32>,
) -> anyhow::Result<Spectrum> {
    parallel_counting::add_samples_parallel(counter, samples)?;
    let skipped = counter.round_scores();
    info!("skipped {} hashes at finalization", skipped);
    if let Some(min_abund) = min_abund {
        counter.keep_min_abundance(min_abund);
    }
    Ok(spectrum_of(counter.get_kmers().into_values()))
}

/// Runs the selected accumulator over synthetic samples and prints a
/// summary. Returns the spectrum of the exported table (sample counts in
/// hybrid mode).
pub fn run(args: &Args, config: &CounterConfig) -> anyhow::Result<Spectrum> {
    for flag in ignored_flags(args) {
        warn!("{} has no effect in {:?} mode", flag, args.mode);
    }

    let start = Instant::now();
    let samples = generate_samples(args);
    info!("generated {} samples in {:?}", samples.len(), start.elapsed());

    let start = Instant::now();
    let (size, spectrum) = match args.mode {
        Mode::Plain => {
            let counter = PlainCounter::with_config(config)?;
            let batches: Vec<Vec<u64>> = samples.into_iter().map(|s| s.hashes).collect();
            parallel_counting::count_hashes_parallel(&counter, &batches);
            if args.remove_singletons {
                let removed = counter.remove_singletons();
                info!("removed {} singletons", removed);
            }
            if let Some(min_abund) = args.min_abund {
                counter.keep_min_abundance(min_abund);
            }
            (counter.size(), spectrum_of(counter.get_kmers().into_values()))
        }
        Mode::Weighted => {
            let counter: WeightedCounter = WeightedCounter::with_config(config)?;
            let spectrum = finish_weighted(&counter, &samples, args.min_abund)?;
            (counter.size(), spectrum)
        }
        Mode::Uncapped => {
            let counter = WeightedCounterUncapped::with_config(config)?;
            let spectrum = finish_weighted(&counter, &samples, args.min_abund)?;
            (counter.size(), spectrum)
        }
        Mode::Hybrid => {
            let counter = HybridDosageCounter::with_config(config)?;
            parallel_counting::add_samples_parallel(&counter, &samples)?;
            let evicted = counter.round_scores();
            info!("evicted {} hashes seen in a single sample", evicted);
            let export = counter.export();
            (counter.size(), spectrum_of(export.sample_counts))
        }
    };
    let duration = start.elapsed();

    println!(
        "\n{:<10} | {:<10} | {:<15} | {:<15}",
        "Mode", "Samples", "Hashes kept", "Time"
    );
    println!("{:-<60}", "");
    println!(
        "{:<10} | {:<10} | {:<15} | {:?}",
        format!("{:?}", args.mode),
        args.samples,
        size,
        duration
    );
    println!();

    Ok(spectrum)
}
