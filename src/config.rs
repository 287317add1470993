//! Experiment configuration, stored as JSON in the work directory.
//!
//! A work directory holds one `ConfigFile.json` and the summaries of the
//! runs performed with it; sweeps are separate work directories.  A missing
//! config file is created with defaults so the parameters of every run stay
//! on disk next to its results.

use std::path::Path;

use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "ConfigFile.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub thread_number: usize,
    /// Edge of the square PE grid.
    pub array_size: usize,
    /// Probability of a zero cell in the generated operands, in `[0, 1]`.
    pub sparsity: f64,
    pub is_limited_buffer: bool,
    /// Per-lane depth limit when `is_limited_buffer` is set; must be >= 2.
    pub buffer_depth: i64,
    /// Operand depth as a multiple of the array edge: west operands are
    /// `N × N·input_multiplier`, north operands `N·input_multiplier × N`.
    pub input_multiplier: usize,
    /// Full per-cycle tracing.  Roughly an order of magnitude slower.
    pub logging_now: bool,
    /// RNG seed for reproducible runs; absent = seed from the OS.
    pub seed: Option<u64>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            thread_number: 2,
            array_size: 8,
            sparsity: 0.3,
            is_limited_buffer: true,
            buffer_depth: 6,
            input_multiplier: 100,
            logging_now: false,
            seed: None,
        }
    }
}

impl ExperimentConfig {
    /// The buffer depth handed to the simulator: negative (unbounded) when
    /// buffers are not limited.
    pub fn effective_depth(&self) -> i64 {
        if self.is_limited_buffer {
            self.buffer_depth
        } else {
            -1
        }
    }

    /// Load the config from `dir`, or create the file with defaults if it
    /// does not exist yet.
    pub fn load_or_create(dir: &Path) -> Result<Self, String> {
        let path = dir.join(CONFIG_FILE);
        if path.exists() {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
            serde_json::from_str(&content)
                .map_err(|e| format!("bad configuration {}: {e}", path.display()))
        } else {
            log::info!("no configuration in {}, writing defaults", dir.display());
            let config = Self::default();
            config.save(dir)?;
            Ok(config)
        }
    }

    /// Save the config as pretty JSON into `dir`.
    pub fn save(&self, dir: &Path) -> Result<(), String> {
        let path = dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("cannot serialize configuration: {e}"))?;
        std::fs::write(&path, json).map_err(|e| format!("cannot write {}: {e}", path.display()))
    }
}
