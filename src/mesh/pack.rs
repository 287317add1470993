//! Input packing and output unpacking.
//!
//! Row `i` of the west operands becomes input FIFO `i` with `i` leading
//! bubbles per lane; column `j` of the north operands becomes input FIFO
//! `j` with `j` leading bubbles.  The staircase of bubbles is the diagonal
//! skew that lands each operand at PE `(i, j)` on the cycle its partner
//! arrives.  Unpacking reverses the trip at the sinks so the driver can
//! recognize completion.

use ndarray::Array3;

use super::buffer::LaneBuffer;
use super::cell::Cell;

// ── Packing ───────────────────────────────────────────────────

/// West-edge input FIFOs, one per array row.  Lane `t` of FIFO `i` carries
/// `i` bubbles followed by `west[t, i, :]`.
pub fn pack_west(west: &Array3<i64>, log: bool) -> Vec<LaneBuffer> {
    let (threads, rows, cols) = west.dim();
    (0..rows)
        .map(|i| {
            let lanes = (0..threads)
                .map(|t| {
                    let mut lane = Vec::with_capacity(i + cols);
                    lane.resize(i, Cell::Bubble);
                    lane.extend((0..cols).map(|k| Cell::Value(west[[t, i, k]])));
                    lane
                })
                .collect();
            LaneBuffer::input(lanes, i as i32, -1, log)
        })
        .collect()
}

/// North-edge input FIFOs, one per array column.  Lane `t` of FIFO `j`
/// carries `j` bubbles followed by `north[t, :, j]`.
pub fn pack_north(north: &Array3<i64>, log: bool) -> Vec<LaneBuffer> {
    let (threads, rows, cols) = north.dim();
    (0..cols)
        .map(|j| {
            let lanes = (0..threads)
                .map(|t| {
                    let mut lane = Vec::with_capacity(j + rows);
                    lane.resize(j, Cell::Bubble);
                    lane.extend((0..rows).map(|k| Cell::Value(north[[t, k, j]])));
                    lane
                })
                .collect();
            LaneBuffer::input(lanes, -1, j as i32, log)
        })
        .collect()
}

// ── Unpacking ─────────────────────────────────────────────────

/// Reassemble the east sinks (one per row) into a `T×N×M` tensor.  Only
/// full-length lanes are written; everything else stays zero.
pub fn unpack_east(sinks: &[&LaneBuffer], shape: (usize, usize, usize)) -> Array3<i64> {
    let (threads, _rows, cols) = shape;
    let mut out = Array3::zeros(shape);
    for (i, sink) in sinks.iter().enumerate() {
        for t in 0..threads {
            let lane = match sink.lane(t) {
                Some(lane) if lane.len() == cols => lane,
                _ => continue,
            };
            for (k, cell) in lane.iter().enumerate() {
                if let Cell::Value(v) = cell {
                    out[[t, i, k]] = *v;
                }
            }
        }
    }
    out
}

/// Reassemble the south sinks (one per column) into a `T×M×N` tensor.
pub fn unpack_south(sinks: &[&LaneBuffer], shape: (usize, usize, usize)) -> Array3<i64> {
    let (threads, rows, _cols) = shape;
    let mut out = Array3::zeros(shape);
    for (j, sink) in sinks.iter().enumerate() {
        for t in 0..threads {
            let lane = match sink.lane(t) {
                Some(lane) if lane.len() == rows => lane,
                _ => continue,
            };
            for (k, cell) in lane.iter().enumerate() {
                if let Cell::Value(v) = cell {
                    out[[t, k, j]] = *v;
                }
            }
        }
    }
    out
}
