//! Transport block sizing.
//!
//! Maps (MCS, symbol count) to byte capacity and inverts that mapping by
//! bisection. The mapping is static for a given configuration, so every
//! value is computed once up front and lookups never allocate.

use crate::amc::{MCS_COUNT, SPECTRAL_EFFICIENCY_FOR_MCS};
use crate::config::SchedulerConfig;

/// CRC bits attached to every transport block.
const TB_CRC_BITS: u64 = 24;

/// Result of a minimum-symbols search.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SymbolFit {
    /// Smallest symbol count whose capacity reaches the target (or the
    /// whole domain when nothing does).
    pub num_symbols: u32,
    /// Exact capacity in bytes at `num_symbols`.
    pub tb_size: u32,
}

impl SymbolFit {
    /// Whether the fit actually carries `target_bytes`.
    pub fn covers(&self, target_bytes: u32) -> bool {
        self.tb_size >= target_bytes
    }
}

/// Capacity in bytes of `num_symbols` symbols at `mcs`.
///
/// Pure function behind the table; exposed for hosts that size blocks
/// without building a scheduler.
pub fn compute_tb_size(resource_elements_per_symbol: u32, mcs: u8, num_symbols: u32) -> u32 {
    let mcs = (mcs as usize).min(MCS_COUNT - 1);
    let resource_elements = num_symbols as f64 * resource_elements_per_symbol as f64;
    let bits = (resource_elements * SPECTRAL_EFFICIENCY_FOR_MCS[mcs]).floor() as u64;
    (bits.saturating_sub(TB_CRC_BITS) / 8).min(u32::MAX as u64) as u32
}

/// Precomputed (MCS, symbols) -> bytes table.
#[derive(Clone, Debug)]
pub struct TransportBlockSizer {
    /// Upper end of the symbol domain (inclusive).
    max_symbols: u32,
    /// Row-major by MCS, `max_symbols + 1` entries per row.
    table: Vec<u32>,
}

impl TransportBlockSizer {
    pub fn new(resource_elements_per_symbol: u32, max_symbols: u32) -> Self {
        let row = max_symbols as usize + 1;
        let mut table = Vec::with_capacity(MCS_COUNT * row);
        for mcs in 0..MCS_COUNT as u8 {
            for num_symbols in 0..=max_symbols {
                table.push(compute_tb_size(resource_elements_per_symbol, mcs, num_symbols));
            }
        }
        Self { max_symbols, table }
    }

    /// Sizer over the whole subframe for `config`.
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self::new(
            config.resource_elements_per_symbol(),
            config.symbols_per_subframe,
        )
    }

    /// Upper end of the symbol domain.
    pub fn max_symbols(&self) -> u32 {
        self.max_symbols
    }

    /// Capacity in bytes; symbol counts beyond the domain are clamped.
    #[inline]
    pub fn size_for_symbols(&self, mcs: u8, num_symbols: u32) -> u32 {
        let mcs = (mcs as usize).min(MCS_COUNT - 1);
        let num_symbols = num_symbols.min(self.max_symbols) as usize;
        self.table[mcs * (self.max_symbols as usize + 1) + num_symbols]
    }

    /// Smallest symbol count whose capacity is at least `target_bytes`.
    ///
    /// Bisection over `[0, max_symbols]`. If even the full domain falls
    /// short, returns the full domain and its capacity; check with
    /// [`SymbolFit::covers`].
    pub fn min_symbols_for_bytes(&self, mcs: u8, target_bytes: u32) -> SymbolFit {
        let mut low = 0u32;
        let mut high = self.max_symbols;
        while low < high {
            let mid = low + (high - low) / 2;
            if self.size_for_symbols(mcs, mid) >= target_bytes {
                high = mid;
            } else {
                low = mid + 1;
            }
        }
        SymbolFit {
            num_symbols: low,
            tb_size: self.size_for_symbols(mcs, low),
        }
    }
}
