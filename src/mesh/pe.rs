//! Processing element: one multiply-accumulate per clock, time-multiplexed
//! across threads.
//!
//! Each cycle the PE walks its threads round-robin, starting at the cursor
//! left by the previous MAC.  The first thread holding two real non-zero
//! operands fires the MAC; zero operands are forwarded without arithmetic
//! so a later thread can still claim the MAC in the same cycle.  That
//! zero-skip is where the sparsity speedup comes from.

use super::buffer::LaneBuffer;
use super::cell::Cell;
use super::error::MeshError;

/// The four neighbor FIFOs a PE touches during one cycle, borrowed from the
/// array's buffer grids for the duration of the call.
pub struct Ports<'a> {
    pub west: &'a mut LaneBuffer,
    pub north: &'a mut LaneBuffer,
    pub east: &'a mut LaneBuffer,
    pub south: &'a mut LaneBuffer,
}

pub struct Pe {
    pub iindex: usize,
    pub jindex: usize,
    thread_count: usize,

    /// Per-thread accumulator register.
    pub result: Vec<i64>,
    /// Round-robin cursor: the thread served first next cycle.  Advances by
    /// exactly one on each fired MAC, never on skips or pass-throughs.
    on_thread: usize,
    /// One entry per clock cycle: did the MAC fire.
    pub mac_utility: Vec<bool>,
}

impl Pe {
    pub fn new(iindex: usize, jindex: usize, thread_count: usize, log: bool) -> Self {
        if log {
            log::info!(target: "pe", "<{iindex},{jindex}> initialized, {thread_count} threads");
        }
        Self {
            iindex,
            jindex,
            thread_count,
            result: vec![0; thread_count],
            on_thread: 0,
            mac_utility: Vec::new(),
        }
    }

    pub fn on_thread(&self) -> usize {
        self.on_thread
    }

    /// One clock cycle of work.
    ///
    /// Visits threads round-robin from the cursor.  Per thread: pop the west
    /// head (skip the thread if empty), pop the north head (restore the west
    /// head and skip if empty), then classify the pair:
    ///
    /// - two live operands: fire the MAC once per cycle, provided the east
    ///   and south lanes have room; otherwise restore both heads.
    /// - a zero operand: forward both downstream without firing, so the MAC
    ///   stays available for the remaining threads.  Zeros still obey
    ///   back-pressure.
    /// - bubbles (or a mixed bubble/value pair, which the input skew never
    ///   produces): forward both, no bookkeeping.
    ///
    /// Exactly one utilization bit is recorded per call.
    pub fn advance(&mut self, ports: Ports<'_>, log: bool) -> Result<(), MeshError> {
        let (pi, pj) = (self.iindex, self.jindex);
        let start = self.on_thread;
        let mut mac_fired = false;

        for k in 0..self.thread_count {
            let t = (start + k) % self.thread_count;

            let w = match ports.west.pop_head(t)? {
                Some(w) => w,
                None => {
                    if log {
                        log::debug!(target: "pe", "<{pi},{pj}> thread {t}: west lane empty");
                    }
                    continue;
                }
            };
            let n = match ports.north.pop_head(t)? {
                Some(n) => n,
                None => {
                    ports.west.insert_head(t, w)?;
                    if log {
                        log::debug!(target: "pe", "<{pi},{pj}> thread {t}: north lane empty, west head restored");
                    }
                    continue;
                }
            };

            if log {
                log::info!(target: "pe", "<{pi},{pj}> thread {t}: west {w}, north {n}");
            }

            match (w, n) {
                (Cell::Value(wv), Cell::Value(nv)) if wv != 0 && nv != 0 => {
                    if mac_fired || ports.east.is_full(t) || ports.south.is_full(t) {
                        ports.north.insert_head(t, n)?;
                        ports.west.insert_head(t, w)?;
                        if log {
                            log::debug!(target: "pe", "<{pi},{pj}> thread {t}: operands restored (MAC busy or downstream full)");
                        }
                        continue;
                    }
                    self.result[t] += wv * nv;
                    self.on_thread = (self.on_thread + 1) % self.thread_count;
                    mac_fired = true;
                    ports.east.push(t, w, log)?;
                    ports.south.push(t, n, log)?;
                    if log {
                        log::debug!(target: "pe", "<{pi},{pj}> thread {t}: MAC fired, accumulator {}", self.result[t]);
                    }
                }
                _ if w.is_zero() || n.is_zero() => {
                    // Result already known; the zero still has to travel.
                    if ports.east.is_full(t) || ports.south.is_full(t) {
                        ports.north.insert_head(t, n)?;
                        ports.west.insert_head(t, w)?;
                        if log {
                            log::debug!(target: "pe", "<{pi},{pj}> thread {t}: zero pair restored, downstream full");
                        }
                        continue;
                    }
                    ports.east.push(t, w, log)?;
                    ports.south.push(t, n, log)?;
                }
                _ => {
                    // Bubble pair: forward without MAC work.
                    ports.east.push(t, w, log)?;
                    ports.south.push(t, n, log)?;
                }
            }
        }

        self.mac_utility.push(mac_fired);
        Ok(())
    }
}
