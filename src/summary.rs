//! Run summary: the statistics record produced by `summarize`, persisted
//! under a timestamped name in the work directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    /// Steady-state clock count (fill/drain cycles removed).
    pub total_clock: i64,
    pub avg_clock_per_matrix: f64,
    pub utilization_per_pe: Vec<Vec<f64>>,
    pub total_avg_utilization: f64,
    pub total_std_utilization: f64,
    /// Per-tick non-bubble occupancy per thread, keyed `"i,j,H"` for
    /// horizontal internal buffers and `"i,j,V"` for vertical ones.
    pub load_record_per_buffer: BTreeMap<String, Vec<Vec<u32>>>,
}

impl RunSummary {
    /// Write the summary as pretty JSON under `Summary<timestamp>.json` in
    /// `dir`.  Returns the path written.
    pub fn save_timestamped(&self, dir: &Path) -> Result<PathBuf, String> {
        let stamp = chrono::Local::now().format("%m_%d_%Y_%H_%M_%S");
        let path = dir.join(format!("Summary{stamp}.json"));
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("cannot serialize summary: {e}"))?;
        std::fs::write(&path, json).map_err(|e| format!("cannot write {}: {e}", path.display()))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RunSummary {
        RunSummary {
            total_clock: 107,
            avg_clock_per_matrix: 26.75,
            utilization_per_pe: vec![vec![0.5, 0.25], vec![0.75, 1.0]],
            total_avg_utilization: 0.625,
            total_std_utilization: 0.28,
            load_record_per_buffer: BTreeMap::from([
                ("0,0,H".to_string(), vec![vec![0, 1, 2]]),
                ("0,0,V".to_string(), vec![vec![1, 1, 0]]),
            ]),
        }
    }

    #[test]
    fn test_save_writes_readable_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = sample().save_timestamped(dir.path()).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["total_clock"], 107);
        assert_eq!(value["load_record_per_buffer"]["0,0,H"][0][2], 2);
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("Summary"));
    }
}
