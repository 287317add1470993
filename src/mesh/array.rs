//! Systolic array driver.
//!
//! Owns the `N×N` PE grid, the buffer grids between them, the boundary
//! input FIFOs and output sinks, and the global clock.  One `tick` advances
//! every PE once in row-major order and then samples every internal
//! buffer's load.  PEs hold no buffer pointers: the driver resolves the
//! four neighbor ports of each PE from the grids by position and lends
//! them out for the duration of the PE's cycle.
//!
//! PEs are evaluated sequentially in a single pass, so east/south writes
//! made by an earlier PE are visible to its downstream neighbors within
//! the same tick.  That is the mesh's definition of "one shift per clock",
//! not an artifact.

use ndarray::{Array2, Array3};
use std::collections::BTreeMap;

use crate::summary::RunSummary;

use super::buffer::LaneBuffer;
use super::error::MeshError;
use super::pack;
use super::pe::{Pe, Ports};

pub struct SystolicArray {
    array_size: usize,
    thread_count: usize,
    /// Global clock; starts at 1, incremented at the start of every tick.
    /// Signed because the steady-state correction in `summarize` can drive
    /// it to zero on degenerate inputs.
    clock: i64,

    pes: Vec<Vec<Pe>>,
    /// `horizontal[i][j]` sits east of PE `(i, j)`; the last column is the
    /// row of east output sinks.
    horizontal: Vec<Vec<LaneBuffer>>,
    /// `vertical[i][j]` sits south of PE `(i, j)`; the last row is the row
    /// of south output sinks.
    vertical: Vec<Vec<LaneBuffer>>,
    west_inputs: Vec<LaneBuffer>,
    north_inputs: Vec<LaneBuffer>,

    west: Array3<i64>,
    north: Array3<i64>,

    /// Per-thread products, populated by `summarize`.
    pub results: Array3<i64>,
    /// Steady-state MAC utilization per PE, populated by `summarize`.
    pub utilization_per_pe: Array2<f64>,
}

impl SystolicArray {
    // ── Construction ──────────────────────────────────────────

    /// Build the mesh for a batch of `west` (`T×N×M`) and `north` (`T×M×N`)
    /// operands.  `buffer_depth` is negative for unbounded internal buffers
    /// or a per-lane limit of at least 2.
    pub fn new(
        west: Array3<i64>,
        north: Array3<i64>,
        array_size: usize,
        thread_count: usize,
        buffer_depth: i64,
        log: bool,
    ) -> Result<Self, MeshError> {
        let (west_threads, west_rows, west_depth) = west.dim();
        let (north_threads, north_depth, north_cols) = north.dim();

        if west_threads != thread_count || north_threads != thread_count {
            log::error!(target: "systolic", "operand thread counts {west_threads}/{north_threads} do not match {thread_count}");
            return Err(MeshError::ThreadCountMismatch {
                expected: thread_count,
                west: west_threads,
                north: north_threads,
            });
        }
        if west_rows != array_size || north_cols != array_size {
            log::error!(target: "systolic", "array edge {array_size} does not match operand edges {west_rows}/{north_cols}");
            return Err(MeshError::EdgeMismatch {
                edge: array_size,
                west_rows,
                north_cols,
            });
        }
        if west_depth != north_depth {
            log::error!(target: "systolic", "operand depths {west_depth}/{north_depth} do not match");
            return Err(MeshError::OperandDepthMismatch {
                west: west_depth,
                north: north_depth,
            });
        }
        if buffer_depth == 0 || buffer_depth == 1 {
            log::error!(target: "systolic", "buffer depth must be at least 2");
            return Err(MeshError::InvalidBufferDepth(buffer_depth));
        }

        let limited = buffer_depth >= 0;
        let depth_limit = if limited { buffer_depth as usize } else { 0 };
        if log {
            if limited {
                log::debug!(target: "systolic", "bounded internal buffers, depth {depth_limit}");
            } else {
                log::debug!(target: "systolic", "unbounded internal buffers");
            }
        }

        let west_inputs = pack::pack_west(&west, log);
        let north_inputs = pack::pack_north(&north, log);

        let pes = (0..array_size)
            .map(|i| {
                (0..array_size)
                    .map(|j| Pe::new(i, j, thread_count, log))
                    .collect()
            })
            .collect();

        // The last column of the horizontal grid and the last row of the
        // vertical grid are the boundary sinks; everything else is an
        // internal buffer of the configured kind.
        let horizontal = (0..array_size)
            .map(|i| {
                (0..array_size)
                    .map(|j| {
                        if j == array_size - 1 {
                            LaneBuffer::output(thread_count, i as i32, j as i32, log)
                        } else if limited {
                            LaneBuffer::bounded(thread_count, depth_limit, i as i32, j as i32, log)
                        } else {
                            LaneBuffer::internal(thread_count, i as i32, j as i32, log)
                        }
                    })
                    .collect()
            })
            .collect();
        let vertical = (0..array_size)
            .map(|i| {
                (0..array_size)
                    .map(|j| {
                        if i == array_size - 1 {
                            LaneBuffer::output(thread_count, i as i32, j as i32, log)
                        } else if limited {
                            LaneBuffer::bounded(thread_count, depth_limit, i as i32, j as i32, log)
                        } else {
                            LaneBuffer::internal(thread_count, i as i32, j as i32, log)
                        }
                    })
                    .collect()
            })
            .collect();

        Ok(Self {
            array_size,
            thread_count,
            clock: 1,
            pes,
            horizontal,
            vertical,
            west_inputs,
            north_inputs,
            results: Array3::zeros((thread_count, array_size, array_size)),
            utilization_per_pe: Array2::zeros((array_size, array_size)),
            west,
            north,
        })
    }

    pub fn clock(&self) -> i64 {
        self.clock
    }

    pub fn array_size(&self) -> usize {
        self.array_size
    }

    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    // ── Clock ─────────────────────────────────────────────────

    /// One shift of data between PEs.
    pub fn tick(&mut self, log: bool) -> Result<(), MeshError> {
        self.clock += 1;
        if log {
            log::info!(target: "systolic", "raising edge, clock {}", self.clock);
        }

        let n = self.array_size;
        let Self {
            pes,
            horizontal,
            vertical,
            west_inputs,
            north_inputs,
            ..
        } = self;

        for i in 0..n {
            for j in 0..n {
                let (west, east) = if j == 0 {
                    (&mut west_inputs[i], &mut horizontal[i][0])
                } else {
                    let (left, right) = horizontal[i].split_at_mut(j);
                    (&mut left[j - 1], &mut right[0])
                };
                let (north, south) = if i == 0 {
                    (&mut north_inputs[j], &mut vertical[0][j])
                } else {
                    let (upper, lower) = vertical.split_at_mut(i);
                    (&mut upper[i - 1][j], &mut lower[0][j])
                };
                pes[i][j].advance(Ports { west, north, east, south }, log)?;
            }
        }

        for row in horizontal.iter_mut().chain(vertical.iter_mut()) {
            for buffer in row {
                if buffer.is_internal() {
                    buffer.sample_load();
                }
            }
        }
        Ok(())
    }

    // ── Termination & statistics ──────────────────────────────

    /// True iff the boundary sinks have reproduced the operands: the east
    /// sinks hold `west` and the south sinks hold `north`.  Partial lanes
    /// are ignored until complete.
    pub fn is_done(&self) -> bool {
        let n = self.array_size;

        let east: Vec<&LaneBuffer> = (0..n).map(|i| &self.horizontal[i][n - 1]).collect();
        if pack::unpack_east(&east, self.west.dim()) != self.west {
            return false;
        }

        let south: Vec<&LaneBuffer> = (0..n).map(|j| &self.vertical[n - 1][j]).collect();
        let done = pack::unpack_south(&south, self.north.dim()) == self.north;
        if done {
            log::info!(target: "systolic", "sinks match operands, array done at clock {}", self.clock);
        }
        done
    }

    /// Finalize statistics: apply the steady-state correction, copy each
    /// PE's accumulators into `results`, derive per-PE utilization, and
    /// collect the per-buffer load histories.
    ///
    /// The mesh needs `N-1` cycles to fill and `N-1` to drain on each of
    /// its two input sides, so `4·(N-1)` cycles are removed from the clock
    /// and from both ends of every utilization record.  Runs shorter than
    /// the correction report zero utilization.
    pub fn summarize(&mut self) -> RunSummary {
        let n = self.array_size;
        let trim = 4 * (n - 1);
        self.clock -= trim as i64;

        for row in &mut self.pes {
            for pe in row {
                let mu = &mut pe.mac_utility;
                if mu.len() > trim {
                    mu.drain(..trim);
                } else {
                    mu.clear();
                }
                let keep = mu.len().saturating_sub(trim);
                mu.truncate(keep);
            }
        }

        let steady_clock = self.clock;
        for i in 0..n {
            for j in 0..n {
                let pe = &self.pes[i][j];
                for t in 0..self.thread_count {
                    self.results[[t, i, j]] = pe.result[t];
                }
                let fired = pe.mac_utility.iter().filter(|&&b| b).count();
                self.utilization_per_pe[[i, j]] = if steady_clock > 0 {
                    fired as f64 / steady_clock as f64
                } else {
                    0.0
                };
            }
        }

        let total_avg_utilization = self.utilization_per_pe.mean().unwrap_or(0.0);
        let total_std_utilization = self.utilization_per_pe.std(0.0);

        let mut load_record_per_buffer = BTreeMap::new();
        for row in &self.horizontal {
            for buffer in row {
                if buffer.is_internal() {
                    load_record_per_buffer.insert(
                        format!("{},{},H", buffer.iindex, buffer.jindex),
                        buffer.load_history().to_vec(),
                    );
                }
            }
        }
        for row in &self.vertical {
            for buffer in row {
                if buffer.is_internal() {
                    load_record_per_buffer.insert(
                        format!("{},{},V", buffer.iindex, buffer.jindex),
                        buffer.load_history().to_vec(),
                    );
                }
            }
        }

        let avg_clock_per_matrix = self.clock as f64 / self.thread_count as f64;
        log::info!(target: "systolic", "final clock: {}", self.clock);
        log::info!(target: "systolic", "clock cycles per matrix on average: {avg_clock_per_matrix}");
        log::info!(target: "systolic", "utilization per PE: avg {total_avg_utilization:.4}, std {total_std_utilization:.4}");

        RunSummary {
            total_clock: self.clock,
            avg_clock_per_matrix,
            utilization_per_pe: (0..n)
                .map(|i| (0..n).map(|j| self.utilization_per_pe[[i, j]]).collect())
                .collect(),
            total_avg_utilization,
            total_std_utilization,
            load_record_per_buffer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inputs;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn run_to_completion(array: &mut SystolicArray) -> usize {
        let mut ticks = 0;
        loop {
            array.tick(false).unwrap();
            ticks += 1;
            if array.is_done() {
                return ticks;
            }
            assert!(ticks < 100_000, "simulation did not terminate");
        }
    }

    #[test]
    fn test_two_by_two_product() {
        let west: Array3<i64> = array![[[1, 2], [3, 4]]];
        let north: Array3<i64> = array![[[5, 6], [7, 8]]];
        let mut sa = SystolicArray::new(west, north, 2, 1, -1, false).unwrap();

        let ticks = run_to_completion(&mut sa);
        assert_eq!(ticks, 4);
        assert_eq!(sa.clock(), 5);

        let summary = sa.summarize();
        assert_eq!(summary.total_clock, 1);
        assert_eq!(sa.results, array![[[19, 22], [43, 50]]]);
        for &u in sa.utilization_per_pe.iter() {
            assert!(u.is_finite() && (0.0..=1.0).contains(&u));
        }
    }

    #[test]
    fn test_more_threads_take_more_clocks() {
        let mut single = SystolicArray::new(
            array![[[1, 2], [3, 4]]],
            array![[[5, 6], [7, 8]]],
            2,
            1,
            -1,
            false,
        )
        .unwrap();
        run_to_completion(&mut single);
        let single_summary = single.summarize();

        let west: Array3<i64> = array![[[1, 2], [3, 4]], [[2, 3], [4, 5]]];
        let north: Array3<i64> = array![[[5, 6], [7, 8]], [[1, 2], [3, 4]]];
        let expected = inputs::matmul_batch(&west, &north);
        let mut double = SystolicArray::new(west, north, 2, 2, -1, false).unwrap();
        run_to_completion(&mut double);
        assert_eq!(double.clock(), 7);
        let double_summary = double.summarize();

        assert_eq!(double.results, expected);
        assert!(double_summary.total_clock > single_summary.total_clock);
        assert!(double_summary.total_avg_utilization >= single_summary.total_avg_utilization);
    }

    #[test]
    fn test_sparsity_cuts_clocks_per_matrix() {
        let (t, n, m) = (2, 4, 16);
        let dense_west = Array3::from_elem((t, n, m), 2);
        let dense_north = Array3::from_elem((t, m, n), 3);
        let sparse_west =
            Array3::from_shape_fn((t, n, m), |(_, i, k)| if (i + k) % 2 == 0 { 0 } else { 5 });
        let sparse_north =
            Array3::from_shape_fn((t, m, n), |(_, k, j)| if (k + j) % 2 == 0 { 0 } else { 4 });

        let dense_expected = inputs::matmul_batch(&dense_west, &dense_north);
        let sparse_expected = inputs::matmul_batch(&sparse_west, &sparse_north);

        let mut dense = SystolicArray::new(dense_west, dense_north, n, t, -1, false).unwrap();
        run_to_completion(&mut dense);
        let dense_summary = dense.summarize();
        assert_eq!(dense.results, dense_expected);

        let mut sparse = SystolicArray::new(sparse_west, sparse_north, n, t, -1, false).unwrap();
        run_to_completion(&mut sparse);
        let sparse_summary = sparse.summarize();
        assert_eq!(sparse.results, sparse_expected);

        assert_eq!(dense_summary.total_clock, 27);
        assert_eq!(sparse_summary.total_clock, 12);
        assert!(sparse_summary.avg_clock_per_matrix < dense_summary.avg_clock_per_matrix);
    }

    #[test]
    fn test_bounded_buffers_backpressure() {
        let (t, n, m) = (4, 4, 32);
        let mut rng = StdRng::seed_from_u64(7);
        let west = inputs::sparse_batch(&mut rng, t, n, m, 0.3).unwrap();
        let north = inputs::sparse_batch(&mut rng, t, m, n, 0.3).unwrap();
        let expected = inputs::matmul_batch(&west, &north);

        let mut sa = SystolicArray::new(west, north, n, t, 2, false).unwrap();
        run_to_completion(&mut sa);
        let summary = sa.summarize();

        assert_eq!(sa.results, expected);
        assert!(!summary.load_record_per_buffer.is_empty());
        for history in summary.load_record_per_buffer.values() {
            for lane in history {
                assert!(lane.iter().all(|&load| load <= 2));
            }
        }
    }

    #[test]
    fn test_identity_north_reproduces_west() {
        let west: Array3<i64> = array![[[1, 2, 3], [4, 5, 6], [7, 8, 9]]];
        let identity: Array3<i64> = array![[[1, 0, 0], [0, 1, 0], [0, 0, 1]]];
        let mut sa = SystolicArray::new(west.clone(), identity, 3, 1, -1, false).unwrap();

        run_to_completion(&mut sa);
        sa.summarize();
        assert_eq!(sa.results, west);
    }

    #[test]
    fn test_identical_runs_are_identical() {
        let build = || {
            let mut rng = StdRng::seed_from_u64(42);
            let west = inputs::sparse_batch(&mut rng, 2, 4, 8, 0.5).unwrap();
            let north = inputs::sparse_batch(&mut rng, 2, 8, 4, 0.5).unwrap();
            SystolicArray::new(west, north, 4, 2, 3, false).unwrap()
        };

        let mut first = build();
        let mut second = build();
        let ticks_first = run_to_completion(&mut first);
        let ticks_second = run_to_completion(&mut second);
        assert_eq!(ticks_first, ticks_second);

        let summary_first = first.summarize();
        let summary_second = second.summarize();
        assert_eq!(first.results, second.results);
        assert_eq!(summary_first.total_clock, summary_second.total_clock);
        assert_eq!(summary_first.utilization_per_pe, summary_second.utilization_per_pe);
        assert_eq!(
            summary_first.load_record_per_buffer,
            summary_second.load_record_per_buffer
        );
    }

    #[test]
    fn test_one_utilization_bit_and_load_sample_per_tick() {
        let west: Array3<i64> = Array3::from_elem((1, 3, 6), 1);
        let north: Array3<i64> = Array3::from_elem((1, 6, 3), 1);
        let mut sa = SystolicArray::new(west, north, 3, 1, -1, false).unwrap();

        for tick in 1..=5 {
            sa.tick(false).unwrap();
            for row in &sa.pes {
                for pe in row {
                    assert_eq!(pe.mac_utility.len(), tick);
                }
            }
            for row in sa.horizontal.iter().chain(sa.vertical.iter()) {
                for buffer in row {
                    if buffer.is_internal() {
                        for lane in buffer.load_history() {
                            assert_eq!(lane.len(), tick);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_construction_validation() {
        let west: Array3<i64> = Array3::zeros((2, 2, 4));
        let north: Array3<i64> = Array3::zeros((1, 4, 2));
        assert!(matches!(
            SystolicArray::new(west, north, 2, 2, -1, false),
            Err(MeshError::ThreadCountMismatch { .. })
        ));

        let west: Array3<i64> = Array3::zeros((1, 3, 4));
        let north: Array3<i64> = Array3::zeros((1, 4, 2));
        assert!(matches!(
            SystolicArray::new(west, north, 2, 1, -1, false),
            Err(MeshError::EdgeMismatch { .. })
        ));

        let west: Array3<i64> = Array3::zeros((1, 2, 4));
        let north: Array3<i64> = Array3::zeros((1, 6, 2));
        assert!(matches!(
            SystolicArray::new(west, north, 2, 1, -1, false),
            Err(MeshError::OperandDepthMismatch { .. })
        ));

        for bad_depth in [0, 1] {
            let west: Array3<i64> = Array3::zeros((1, 2, 2));
            let north: Array3<i64> = Array3::zeros((1, 2, 2));
            assert_eq!(
                SystolicArray::new(west, north, 2, 1, bad_depth, false).err(),
                Some(MeshError::InvalidBufferDepth(bad_depth))
            );
        }

        let west: Array3<i64> = Array3::zeros((1, 2, 2));
        let north: Array3<i64> = Array3::zeros((1, 2, 2));
        assert!(SystolicArray::new(west, north, 2, 1, 2, false).is_ok());
    }
}
