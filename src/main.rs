use std::time::Instant;

use anyhow::{Context, Result};
use log::info;

use orb_vocabulary_creator::{aggregate, resolve, BowErr, Cli, Config, OrbExtractor, Vocabulary};

fn main() -> Result<()> {
    let config: Config = Cli::parse_args(std::env::args_os()).into();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stdout)
        .init();

    run(&config)
}

fn run(config: &Config) -> Result<()> {
    // Extract orb descriptors from images
    let files = resolve(&config.source_pattern)
        .with_context(|| format!("failed to list {}", config.source_pattern))?;
    let mut orb = OrbExtractor::new()?;
    let features = aggregate(files, &mut orb);
    info!(
        "Detected {} ORB features in {} images.",
        features.report.descriptor_count(),
        features.batch.len()
    );

    // Create vocabulary from features
    let params = &config.params;
    info!(
        "Creating a {}^{} vocabulary ...",
        params.branching_factor, params.depth_levels
    );
    let timer = Instant::now();
    let voc = Vocabulary::create(features.batch, params).context("vocabulary creation failed")?;
    info!("... done in {} ms", timer.elapsed().as_millis());
    info!("Vocabulary information: {}", voc);
    log::debug!("{:#?}", voc);

    let output = &config.output_path;
    let timer = Instant::now();
    info!("Saving vocabulary to {} ...", output.display());
    voc.save(output)
        .with_context(|| format!("failed to save vocabulary to {}", output.display()))?;
    info!("... done in {} ms", timer.elapsed().as_millis());

    // Load it again and make sure save & load worked
    let timer = Instant::now();
    info!("Test reading vocabulary from {} ...", output.display());
    let loaded = Vocabulary::load(output)
        .with_context(|| format!("failed to load vocabulary from {}", output.display()))?;
    info!("... done in {} ms", timer.elapsed().as_millis());
    info!("Loaded vocabulary information: {}", loaded);

    if loaded.stats() != voc.stats() {
        return Err(BowErr::RoundTripMismatch(output.clone()).into());
    }
    Ok(())
}
