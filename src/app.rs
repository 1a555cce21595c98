// Declare modules
pub mod cli;
pub mod config;
pub mod emitter;
pub mod error;
pub mod extractor;
pub mod generator;
pub mod models;
pub mod scanner;
pub mod transform;

use anyhow::{bail, Context, Result};
use clap::Parser;
use pathdiff::diff_paths;
use rayon::prelude::*;
use std::env;
use std::path::Path;

use self::cli::Cli;
use self::config::{generate_sample, resolve_config, SAMPLE_PATH};
use self::emitter::{Emitter, DEFAULT_TEMPLATE};
use self::generator::{generate, persist};
use self::models::{Job, RuntimeConfig};

/// Initializes components and orchestrates data flow.
pub fn run() -> Result<()> {
    // 1. Parse Args
    let args = Cli::parse();

    if args.init {
        generate_sample(Path::new(SAMPLE_PATH))?;
        log::info!("Generated {SAMPLE_PATH}");
        return Ok(());
    }

    // 2. Resolve Configuration
    let config = resolve_config(args)?;

    if config.jobs.is_empty() {
        log::warn!("No DTOs declared; nothing to generate.");
        return Ok(());
    }

    // 3. Generate
    run_jobs(&config)
}

/// Generates every job, reporting failures without stopping the batch.
pub fn run_jobs(config: &RuntimeConfig) -> Result<()> {
    let emitter = Emitter::new(DEFAULT_TEMPLATE);

    // Rendering is independent per job; writes happen afterwards in declaration order.
    let results: Vec<Result<_>> = config
        .jobs
        .par_iter()
        .map(|job| generate(job, &emitter).with_context(|| describe(job)))
        .collect();

    let cwd = env::current_dir().context("Failed to get current directory")?;
    let mut failures = 0;

    for (job, result) in config.jobs.iter().zip(results) {
        let outcome = result.and_then(|generated| {
            persist(&generated).with_context(|| describe(job))?;
            Ok(generated)
        });

        match outcome {
            Ok(generated) => {
                let shown = diff_paths(&generated.destination, &cwd)
                    .unwrap_or_else(|| generated.destination.clone());
                if generated.formatted {
                    log::info!("Generated {}", shown.display());
                } else {
                    log::warn!("Generated {} (unformatted)", shown.display());
                }
            }
            Err(err) if !config.batch => return Err(err),
            Err(err) => {
                log::error!("{err:#}");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!("{failures} of {} DTO(s) failed", config.jobs.len());
    }

    Ok(())
}

fn describe(job: &Job) -> String {
    format!(
        "generating {} from `{}` in {}",
        job.transform.dto_name, job.type_name, job.source
    )
}
