//! Run-once experiment orchestrator.
//!
//! Resolves a work directory (first CLI argument, default `workarea`),
//! loads or creates its configuration, generates a batch of sparse
//! operands, drives the systolic array to completion, verifies the results
//! against the exact algebraic product, and persists a timestamped summary
//! next to the configuration.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use rand::rngs::StdRng;
use rand::SeedableRng;

use mtsa::config::ExperimentConfig;
use mtsa::inputs;
use mtsa::SystolicArray;

fn main() -> ExitCode {
    env_logger::init();

    let workdir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("workarea"));
    if let Err(e) = std::fs::create_dir_all(&workdir) {
        log::error!("cannot create work directory {}: {e}", workdir.display());
        return ExitCode::from(1);
    }

    match run_once(&workdir) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::from(2)
        }
    }
}

fn run_once(workdir: &Path) -> Result<(), String> {
    let config = ExperimentConfig::load_or_create(workdir)?;
    log::info!("configuration: {config:?}");

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let edge = config.array_size;
    let depth = edge * config.input_multiplier;
    let west = inputs::sparse_batch(&mut rng, config.thread_number, edge, depth, config.sparsity)?;
    let north = inputs::sparse_batch(&mut rng, config.thread_number, depth, edge, config.sparsity)?;
    let expected = inputs::matmul_batch(&west, &north);

    let mut array = SystolicArray::new(
        west,
        north,
        edge,
        config.thread_number,
        config.effective_depth(),
        config.logging_now,
    )
    .map_err(|e| e.to_string())?;

    let start = std::time::Instant::now();
    loop {
        array.tick(config.logging_now).map_err(|e| e.to_string())?;
        if array.is_done() {
            break;
        }
    }
    let summary = array.summarize();
    log::info!(
        "simulated {} steady-state clocks ({:.2} per matrix) in {:.2?}",
        summary.total_clock,
        summary.avg_clock_per_matrix,
        start.elapsed(),
    );

    if array.results != expected {
        return Err("systolic array results differ from the algebraic product".into());
    }

    let path = summary.save_timestamped(workdir)?;
    log::info!("summary saved to {}", path.display());
    Ok(())
}
