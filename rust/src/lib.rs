//! Per-subframe radio resource scheduler.
//!
//! Decides, once per subframe, which attached stations transmit or receive,
//! in which direction, on how many symbols and at which MCS. The scheduler
//! tracks channel quality, buffered bytes and HARQ processes for every
//! station and emits an ordered slot plan per subframe.
//!
//! The Rust API lives in [`scheduler::SubframeScheduler`]; the `subframe_sched`
//! Python module wraps it for simulation hosts.

// Allow clippy warning triggered by PyO3 macro expansion
#![allow(clippy::useless_conversion)]

use pyo3::exceptions::{PyKeyError, PyValueError};
use pyo3::prelude::*;
use std::collections::HashMap;

pub mod amc;
pub mod arena;
pub mod buffer;
pub mod config;
pub mod cqi;
pub mod harq;
pub mod logging;
pub mod models;
pub mod scheduler;
pub mod tbs;

pub use config::SchedulerConfig;
pub use harq::ProcessState;
pub use models::{
    AllocationPlan, Direction, Grant, LossEvent, LossReason, QosClass, Slot, SlotKind, StationId,
};
pub use scheduler::{HarqFeedback, SchedulerError, SchedulerEvent, SchedulerStats, SubframeScheduler};
pub use tbs::{SymbolFit, TransportBlockSizer};

impl From<SchedulerError> for PyErr {
    fn from(err: SchedulerError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}

/// Scheduler handle exposed to Python.
#[pyclass(name = "SubframeScheduler")]
pub struct PySubframeScheduler {
    inner: SubframeScheduler,
}

#[pymethods]
impl PySubframeScheduler {
    #[new]
    #[pyo3(signature = (config=None))]
    fn new(config: Option<SchedulerConfig>) -> PyResult<Self> {
        logging::init_tracing();
        Ok(Self {
            inner: SubframeScheduler::new(config.unwrap_or_default())?,
        })
    }

    #[getter]
    fn config(&self) -> SchedulerConfig {
        self.inner.config().clone()
    }

    fn attach_station(&mut self, station: StationId) {
        self.inner.attach_station(station);
    }

    fn detach_station(&mut self, station: StationId) -> bool {
        self.inner.detach_station(station)
    }

    fn is_attached(&self, station: StationId) -> bool {
        self.inner.is_attached(station)
    }

    fn configure_channel(
        &mut self,
        station: StationId,
        channel: u8,
        direction: Direction,
        qci: u8,
    ) -> PyResult<()> {
        Ok(self.inner.configure_channel(station, channel, direction, qci)?)
    }

    fn release_channel(&mut self, station: StationId, channel: u8, direction: Direction) -> bool {
        self.inner.release_channel(station, channel, direction)
    }

    /// Downlink RLC queue report; returns the bytes newly accounted for.
    #[pyo3(signature = (station, lcid, packet_sizes, packet_delays_us, total_bytes))]
    fn report_dl_queue(
        &mut self,
        station: StationId,
        lcid: u8,
        packet_sizes: Vec<u32>,
        packet_delays_us: Vec<u32>,
        total_bytes: u32,
    ) -> Option<u32> {
        self.inner
            .report_dl_queue(station, lcid, &packet_sizes, &packet_delays_us, total_bytes)
    }

    fn report_dl_rlc_status(
        &mut self,
        station: StationId,
        lcid: u8,
        retx_bytes: u32,
        status_bytes: u32,
    ) -> bool {
        self.inner
            .report_dl_rlc_status(station, lcid, retx_bytes, status_bytes)
    }

    fn report_ul_bsr(&mut self, station: StationId, lcg: u8, reported_bytes: u32) -> Option<u32> {
        self.inner.report_ul_bsr(station, lcg, reported_bytes)
    }

    fn report_dl_cqi(&mut self, station: StationId, cqi: u8) -> Option<u8> {
        self.inner.report_dl_cqi(station, cqi)
    }

    fn report_ul_cqi(
        &mut self,
        subframe_index: u64,
        symbol_start: u32,
        chunk_sinr: Vec<f64>,
    ) -> Option<StationId> {
        self.inner
            .report_ul_cqi(subframe_index, symbol_start, &chunk_sinr)
    }

    fn harq_feedback(&mut self, station: StationId, direction: Direction, harq_process: u8, ack: bool) {
        self.inner
            .harq_feedback(station, direction, harq_process, ack);
    }

    /// Run one scheduling pass and return the slot plan.
    fn on_subframe(&mut self, frame: u32, subframe: u32) -> PyResult<AllocationPlan> {
        Ok(self.inner.on_subframe(frame, subframe)?)
    }

    fn buffered_bytes(&self, station: StationId, direction: Direction) -> Option<u32> {
        self.inner.buffered_bytes(station, direction)
    }

    fn current_mcs(&self, station: StationId, direction: Direction) -> Option<u8> {
        self.inner.current_mcs(station, direction)
    }

    fn throughput(&self, station: StationId, direction: Direction) -> Option<f64> {
        self.inner.throughput(station, direction)
    }

    fn busy_processes(&self, station: StationId, direction: Direction) -> Option<usize> {
        self.inner.busy_processes(station, direction)
    }

    fn dl_cqi(&self, station: StationId) -> Option<u8> {
        self.inner.dl_cqi(station)
    }

    fn ul_sinr(&self, station: StationId) -> Option<Vec<f64>> {
        self.inner.ul_sinr(station).map(<[f64]>::to_vec)
    }

    fn pending_ul_allocations(&self) -> usize {
        self.inner.pending_ul_allocations()
    }

    /// Redundancy version of a busy process, `None` when it is free.
    fn harq_rv(&self, station: StationId, direction: Direction, harq_process: u8) -> PyResult<Option<u8>> {
        match self.inner.harq_state(station, direction, harq_process) {
            Some(ProcessState::Busy { rv, .. }) => Ok(Some(rv)),
            Some(ProcessState::Free) => Ok(None),
            None => Err(PyKeyError::new_err(format!(
                "no HARQ process {} for station {}",
                harq_process, station
            ))),
        }
    }

    fn stats(&self) -> HashMap<&'static str, u64> {
        let s = self.inner.stats();
        HashMap::from([
            ("subframes", s.subframes),
            ("new_grants", s.new_grants),
            ("retransmissions", s.retransmissions),
            ("deferred_retransmissions", s.deferred_retransmissions),
            ("harq_exhausted", s.harq_exhausted),
            ("lost_blocks", s.lost_blocks),
            ("lost_bytes", s.lost_bytes),
            ("ignored_reports", s.ignored_reports),
        ])
    }

    fn __repr__(&self) -> String {
        format!(
            "SubframeScheduler(stations={}, pending_retx={}, subframes={})",
            self.inner.num_stations(),
            self.inner.pending_retransmissions(),
            self.inner.stats().subframes
        )
    }
}

/// Transport block size in bytes for `num_symbols` symbols at `mcs`.
#[pyfunction]
#[pyo3(signature = (mcs, num_symbols, config=None))]
fn tb_size_for_symbols(mcs: u8, num_symbols: u32, config: Option<SchedulerConfig>) -> PyResult<u32> {
    let config = config.unwrap_or_default();
    config.validate()?;
    Ok(tbs::compute_tb_size(
        config.resource_elements_per_symbol(),
        mcs,
        num_symbols,
    ))
}

/// Smallest symbol count carrying `target_bytes` at `mcs`.
///
/// Returns `(num_symbols, tb_size)`; when no count within the subframe
/// suffices, the largest count and its capacity are returned.
#[pyfunction]
#[pyo3(signature = (mcs, target_bytes, config=None))]
fn min_symbols_for_bytes(
    mcs: u8,
    target_bytes: u32,
    config: Option<SchedulerConfig>,
) -> PyResult<(u32, u32)> {
    let config = config.unwrap_or_default();
    config.validate()?;
    let fit = TransportBlockSizer::from_config(&config).min_symbols_for_bytes(mcs, target_bytes);
    Ok((fit.num_symbols, fit.tb_size))
}

/// MCS index for a wideband CQI report.
#[pyfunction]
fn mcs_from_cqi(cqi: u8) -> u8 {
    amc::mcs_from_cqi(cqi)
}

#[pymodule]
fn subframe_sched(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Plan types
    m.add_class::<Direction>()?;
    m.add_class::<SlotKind>()?;
    m.add_class::<Grant>()?;
    m.add_class::<Slot>()?;
    m.add_class::<AllocationPlan>()?;

    // Config and scheduler
    m.add_class::<SchedulerConfig>()?;
    m.add_class::<PySubframeScheduler>()?;

    // Sizing helpers
    m.add_function(wrap_pyfunction!(tb_size_for_symbols, m)?)?;
    m.add_function(wrap_pyfunction!(min_symbols_for_bytes, m)?)?;
    m.add_function(wrap_pyfunction!(mcs_from_cqi, m)?)?;

    Ok(())
}
