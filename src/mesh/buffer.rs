//! Per-thread FIFO buffers between PEs and at the mesh boundary.
//!
//! One `LaneBuffer` sits on every edge of the PE grid.  Each thread owns an
//! independent FIFO lane inside it (head = oldest).  Four behavioral kinds:
//!
//! - `Unbounded` — internal buffer of unlimited depth.  Every lane starts
//!   with a single `Bubble`, the one-cycle pipeline delay between adjacent
//!   PEs.
//! - `Bounded` — internal buffer with a per-lane `depth_limit >= 2`; a push
//!   into a full lane is rejected and the writer must retry next cycle.
//! - `Input` — boundary FIFO pre-populated by the packer; the packer (not
//!   the buffer) inserts the leading bubbles that form the diagonal skew.
//! - `Output` — boundary sink.  Stores only real values, drops bubbles,
//!   never back-pressures.
//!
//! Internal kinds also record a load history: once per tick the driver
//! samples the number of non-bubble entries in every lane.

use std::collections::VecDeque;

use super::cell::Cell;
use super::error::MeshError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    Unbounded,
    Bounded { depth_limit: usize },
    Input,
    Output,
}

pub struct LaneBuffer {
    kind: BufferKind,
    /// One FIFO per thread; index = thread id.
    lanes: Vec<VecDeque<Cell>>,
    /// Per-thread occupancy history, internal kinds only.
    load: Vec<Vec<u32>>,
    /// Grid coordinates, used for logging and summary keys.  Input FIFOs
    /// carry -1 on the axis they feed from.
    pub iindex: i32,
    pub jindex: i32,
}

impl LaneBuffer {
    // ── Constructors ──────────────────────────────────────────

    /// Internal buffer of unlimited depth.
    pub fn internal(thread_count: usize, iindex: i32, jindex: i32, log: bool) -> Self {
        Self::new_internal(BufferKind::Unbounded, thread_count, iindex, jindex, log)
    }

    /// Internal buffer with a per-lane depth limit.
    pub fn bounded(
        thread_count: usize,
        depth_limit: usize,
        iindex: i32,
        jindex: i32,
        log: bool,
    ) -> Self {
        Self::new_internal(
            BufferKind::Bounded { depth_limit },
            thread_count,
            iindex,
            jindex,
            log,
        )
    }

    fn new_internal(
        kind: BufferKind,
        thread_count: usize,
        iindex: i32,
        jindex: i32,
        log: bool,
    ) -> Self {
        let lanes = (0..thread_count)
            .map(|_| VecDeque::from([Cell::Bubble]))
            .collect();
        if log {
            log::debug!(target: "buffer", "<{iindex},{jindex}>: {kind:?} buffer, {thread_count} lanes");
        }
        Self {
            kind,
            lanes,
            load: vec![Vec::new(); thread_count],
            iindex,
            jindex,
        }
    }

    /// Boundary input FIFO with lanes pre-populated by the packer.
    pub fn input(lanes: Vec<Vec<Cell>>, iindex: i32, jindex: i32, log: bool) -> Self {
        if log {
            log::debug!(target: "buffer", "<{iindex},{jindex}>: input FIFO, {} lanes", lanes.len());
        }
        Self {
            kind: BufferKind::Input,
            lanes: lanes.into_iter().map(VecDeque::from).collect(),
            load: Vec::new(),
            iindex,
            jindex,
        }
    }

    /// Boundary output sink.  Lanes start empty; bubbles are never stored.
    pub fn output(thread_count: usize, iindex: i32, jindex: i32, log: bool) -> Self {
        if log {
            log::debug!(target: "buffer", "<{iindex},{jindex}>: output sink, {thread_count} lanes");
        }
        Self {
            kind: BufferKind::Output,
            lanes: vec![VecDeque::new(); thread_count],
            load: Vec::new(),
            iindex,
            jindex,
        }
    }

    // ── Lane access ───────────────────────────────────────────

    fn lane_mut(&mut self, thread: usize) -> Result<&mut VecDeque<Cell>, MeshError> {
        let (i, j) = (self.iindex, self.jindex);
        self.lanes
            .get_mut(thread)
            .ok_or(MeshError::InvalidThread { thread, i, j })
    }

    pub fn lane(&self, thread: usize) -> Option<&VecDeque<Cell>> {
        self.lanes.get(thread)
    }

    pub fn thread_count(&self) -> usize {
        self.lanes.len()
    }

    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    pub fn is_internal(&self) -> bool {
        matches!(self.kind, BufferKind::Unbounded | BufferKind::Bounded { .. })
    }

    // ── FIFO operations ───────────────────────────────────────

    /// Append `value` to the thread's lane.  Returns `Ok(false)` when a
    /// bounded lane is full; output sinks accept everything but store only
    /// real values.
    pub fn push(&mut self, thread: usize, value: Cell, log: bool) -> Result<bool, MeshError> {
        let (i, j) = (self.iindex, self.jindex);
        match self.kind {
            BufferKind::Output => {
                if !value.is_bubble() {
                    self.lane_mut(thread)?.push_back(value);
                }
                Ok(true)
            }
            BufferKind::Bounded { depth_limit } => {
                let lane = self.lane_mut(thread)?;
                if lane.len() >= depth_limit {
                    if log {
                        log::info!(target: "buffer", "<{i},{j}>: {value} rejected on thread {thread}, lane full");
                    }
                    Ok(false)
                } else {
                    lane.push_back(value);
                    if log {
                        log::info!(target: "buffer", "<{i},{j}>: {value} pushed to thread {thread}, lane size {}", lane.len());
                    }
                    Ok(true)
                }
            }
            _ => {
                let lane = self.lane_mut(thread)?;
                lane.push_back(value);
                if log {
                    log::debug!(target: "buffer", "<{i},{j}>: {value} pushed to thread {thread}");
                }
                Ok(true)
            }
        }
    }

    /// Remove and return the head of the thread's lane; `Ok(None)` when the
    /// lane is empty.
    pub fn pop_head(&mut self, thread: usize) -> Result<Option<Cell>, MeshError> {
        Ok(self.lane_mut(thread)?.pop_front())
    }

    /// Put a value back at the head (an input the PE could not consume this
    /// cycle).
    pub fn insert_head(&mut self, thread: usize, value: Cell) -> Result<(), MeshError> {
        self.lane_mut(thread)?.push_front(value);
        Ok(())
    }

    /// Remove the most recently appended element.  Rollback helper for
    /// bounded buffers; the steady-state PE algorithm never needs it.
    pub fn delete_last(&mut self, thread: usize) -> Result<Option<Cell>, MeshError> {
        Ok(self.lane_mut(thread)?.pop_back())
    }

    /// True iff the thread's lane is at its depth limit.  Unbounded buffers
    /// and output sinks never report full.
    pub fn is_full(&self, thread: usize) -> bool {
        match self.kind {
            BufferKind::Bounded { depth_limit } => self
                .lanes
                .get(thread)
                .map_or(false, |lane| lane.len() >= depth_limit),
            _ => false,
        }
    }

    // ── Load history ──────────────────────────────────────────

    /// Record the current non-bubble occupancy of every lane.  Called once
    /// per tick by the array driver, internal buffers only.
    pub fn sample_load(&mut self) {
        for (lane, history) in self.lanes.iter().zip(self.load.iter_mut()) {
            history.push(lane.iter().filter(|c| !c.is_bubble()).count() as u32);
        }
    }

    pub fn load_history(&self) -> &[Vec<u32>] {
        &self.load
    }
}
