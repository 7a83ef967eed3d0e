//! Channel-quality tracking with validity timers.
//!
//! Downlink quality arrives as a wideband CQI; uplink quality arrives as
//! per-chunk SINR measured on a previous uplink grant and is attributed to
//! the station through the uplink allocation map.

use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

use crate::amc::{mcs_from_cqi, mcs_from_sinr, wideband_sinr};
use crate::arena::StationHandle;
use crate::models::Direction;

/// Latest downlink report for a station.
#[derive(Clone, Debug, PartialEq)]
pub struct DlCqiEntry {
    pub cqi: u8,
    pub mcs: u8,
    /// Subframes left before the report expires.
    pub timer: u32,
}

/// Accumulated uplink measurements for a station.
#[derive(Clone, Debug, PartialEq)]
pub struct UlCqiEntry {
    /// Linear SINR per chunk; NaN for chunks never measured.
    pub sinr_per_chunk: Vec<f64>,
    pub mcs: u8,
    pub timer: u32,
    /// Symbols used by the grant the latest measurement was taken on.
    pub num_symbols: u32,
    /// Transport block size of that grant.
    pub tb_size: u32,
}

/// Which station occupied which symbols of an uplink subframe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UlAllocationRecord {
    pub handle: StationHandle,
    pub harq_process: u8,
    pub symbol_start: u32,
    pub num_symbols: u32,
    pub tb_size: u32,
}

/// Per-station CQI tables plus the uplink allocation map.
#[derive(Debug, Clone)]
pub struct ChannelQualityTracker {
    validity: u32,
    round_trip: u32,
    dl: FxHashMap<StationHandle, DlCqiEntry>,
    ul: FxHashMap<StationHandle, UlCqiEntry>,
    /// Subframe index -> uplink grants scheduled in that subframe.
    ul_allocation_map: BTreeMap<u64, Vec<UlAllocationRecord>>,
}

impl ChannelQualityTracker {
    pub fn new(validity: u32, round_trip: u32) -> Self {
        Self {
            validity,
            round_trip,
            dl: FxHashMap::default(),
            ul: FxHashMap::default(),
            ul_allocation_map: BTreeMap::new(),
        }
    }

    /// Insert or refresh a downlink CQI, restarting its validity timer.
    pub fn report_downlink(&mut self, handle: StationHandle, cqi: u8) -> u8 {
        let mcs = mcs_from_cqi(cqi);
        self.dl.insert(
            handle,
            DlCqiEntry {
                cqi,
                mcs,
                timer: self.validity,
            },
        );
        mcs
    }

    /// Accumulate per-chunk SINR samples for a station.
    ///
    /// Non-finite samples leave the stored chunk untouched. Returns the
    /// resulting uplink MCS, or `None` if no chunk has ever been measured.
    pub fn report_uplink(
        &mut self,
        handle: StationHandle,
        chunk_sinr: &[f64],
        num_symbols: u32,
        tb_size: u32,
    ) -> Option<u8> {
        let mut chunks = self
            .ul
            .remove(&handle)
            .map(|e| e.sinr_per_chunk)
            .unwrap_or_default();
        if chunks.len() < chunk_sinr.len() {
            chunks.resize(chunk_sinr.len(), f64::NAN);
        }
        for (stored, sample) in chunks.iter_mut().zip(chunk_sinr) {
            if sample.is_finite() {
                *stored = *sample;
            }
        }

        let mcs = mcs_from_sinr(wideband_sinr(&chunks)?);
        self.ul.insert(
            handle,
            UlCqiEntry {
                sinr_per_chunk: chunks,
                mcs,
                timer: self.validity,
                num_symbols,
                tb_size,
            },
        );
        Some(mcs)
    }

    /// Remember an uplink grant so a later SINR report can be attributed.
    pub fn record_ul_allocation(&mut self, subframe_index: u64, record: UlAllocationRecord) {
        self.ul_allocation_map
            .entry(subframe_index)
            .or_default()
            .push(record);
    }

    /// Consume the record covering `symbol_start` in `subframe_index`.
    ///
    /// Each record is handed out at most once.
    pub fn take_ul_allocation(
        &mut self,
        subframe_index: u64,
        symbol_start: u32,
    ) -> Option<UlAllocationRecord> {
        let records = self.ul_allocation_map.get_mut(&subframe_index)?;
        let pos = records.iter().position(|r| {
            symbol_start >= r.symbol_start && symbol_start < r.symbol_start + r.num_symbols
        })?;
        let record = records.swap_remove(pos);
        if records.is_empty() {
            self.ul_allocation_map.remove(&subframe_index);
        }
        Some(record)
    }

    /// Advance every validity timer by one subframe.
    ///
    /// Returns the (station, direction) pairs whose report expired. Also
    /// drops allocation-map records older than one round trip.
    pub fn tick(&mut self, current_index: u64) -> Vec<(StationHandle, Direction)> {
        let mut evicted = Vec::new();

        self.dl.retain(|handle, entry| {
            entry.timer = entry.timer.saturating_sub(1);
            if entry.timer == 0 {
                evicted.push((*handle, Direction::Downlink));
                false
            } else {
                true
            }
        });
        self.ul.retain(|handle, entry| {
            entry.timer = entry.timer.saturating_sub(1);
            if entry.timer == 0 {
                evicted.push((*handle, Direction::Uplink));
                false
            } else {
                true
            }
        });
        evicted.sort();

        let horizon = current_index.saturating_sub(self.round_trip as u64);
        self.ul_allocation_map = self.ul_allocation_map.split_off(&horizon);

        evicted
    }

    /// MCS from a valid report, if any.
    pub fn mcs(&self, handle: StationHandle, direction: Direction) -> Option<u8> {
        match direction {
            Direction::Downlink => self.dl.get(&handle).map(|e| e.mcs),
            Direction::Uplink => self.ul.get(&handle).map(|e| e.mcs),
        }
    }

    pub fn downlink(&self, handle: StationHandle) -> Option<&DlCqiEntry> {
        self.dl.get(&handle)
    }

    pub fn uplink(&self, handle: StationHandle) -> Option<&UlCqiEntry> {
        self.ul.get(&handle)
    }

    /// Number of allocation-map records still awaiting a report.
    pub fn pending_ul_allocations(&self) -> usize {
        self.ul_allocation_map.values().map(Vec::len).sum()
    }

    /// Erase every entry belonging to a detached station.
    pub fn remove_station(&mut self, handle: StationHandle) {
        self.dl.remove(&handle);
        self.ul.remove(&handle);
        for records in self.ul_allocation_map.values_mut() {
            records.retain(|r| r.handle != handle);
        }
        self.ul_allocation_map.retain(|_, records| !records.is_empty());
    }
}
