//! Per-station scheduling state.

use crate::models::Direction;
use crate::tbs::TransportBlockSizer;

/// Scheduling record for one attached station.
///
/// Everything except `throughput` and `last_served` is transient and
/// cleared at the end of every subframe.
#[derive(Clone, Debug, PartialEq)]
pub struct StationState {
    /// MCS chosen this subframe, per direction
    pub mcs: [u8; 2],
    /// Bytes waiting at the start of the fill, per direction
    pub buffered: [u32; 2],
    /// EWMA of bytes delivered per subframe, per direction
    pub throughput: [f64; 2],
    /// Symbols granted for new data this subframe
    pub granted_symbols: [u32; 2],
    /// Transport block size of the granted symbols
    pub tb_size: [u32; 2],
    /// Bytes taken from the queues for new data this subframe
    pub dispatched: [u32; 2],
    /// Already holds a grant this subframe (a retransmission)
    pub served: [bool; 2],
    /// Direction that received the most recent symbol
    pub last_served: Direction,
}

impl StationState {
    pub fn new() -> Self {
        Self {
            mcs: [0; 2],
            buffered: [0; 2],
            throughput: [0.0; 2],
            granted_symbols: [0; 2],
            tb_size: [0; 2],
            dispatched: [0; 2],
            served: [false; 2],
            // A fresh station is offered downlink first
            last_served: Direction::Uplink,
        }
    }

    /// Whether `direction` still wants symbols from the bucket for `mcs`.
    fn wants_symbol(&self, direction: Direction, mcs: u8, max_symbols: u32) -> bool {
        let i = direction.index();
        !self.served[i]
            && self.mcs[i] == mcs
            && self.buffered[i] > 0
            && self.tb_size[i] < self.buffered[i]
            && self.granted_symbols[i] < max_symbols
    }

    /// Direction to offer the next symbol to, alternating away from the
    /// last one served when both directions have unmet demand.
    pub fn next_direction(&self, mcs: u8, max_symbols: u32) -> Option<Direction> {
        let preferred = self.last_served.opposite();
        [preferred, preferred.opposite()]
            .into_iter()
            .find(|d| self.wants_symbol(*d, mcs, max_symbols))
    }

    /// Grant one more symbol in `direction` and recompute the block size.
    pub fn grant_symbol(&mut self, direction: Direction, tbs: &TransportBlockSizer) {
        let i = direction.index();
        self.granted_symbols[i] += 1;
        self.tb_size[i] = tbs.size_for_symbols(self.mcs[i], self.granted_symbols[i]);
        self.last_served = direction;
    }

    /// Fold this subframe into the throughput average and clear the per-tick fields.
    pub fn end_subframe(&mut self, alpha: f64) {
        for i in 0..2 {
            self.throughput[i] = (1.0 - alpha) * self.throughput[i] + alpha * self.dispatched[i] as f64;
        }
        self.mcs = [0; 2];
        self.buffered = [0; 2];
        self.granted_symbols = [0; 2];
        self.tb_size = [0; 2];
        self.dispatched = [0; 2];
        self.served = [false; 2];
    }
}

impl Default for StationState {
    fn default() -> Self {
        Self::new()
    }
}
