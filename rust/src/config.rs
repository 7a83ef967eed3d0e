//! Configuration types for the subframe scheduler.

use pyo3::prelude::*;
use serde::{Deserialize, Serialize};

use crate::amc::MCS_COUNT;
use crate::scheduler::SchedulerError;

/// Symbols reserved per subframe for the downlink and uplink control slots.
pub const CONTROL_SYMBOLS: u32 = 2;

/// Highest redundancy version a HARQ process can reach.
pub const MAX_REDUNDANCY_VERSION: u8 = 3;

/// Numeric policy for the scheduler. All windows are expressed in subframes.
#[pyclass]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Total symbols per subframe, including the two control symbols
    #[pyo3(get, set)]
    pub symbols_per_subframe: u32,
    /// Frequency chunks per symbol
    #[pyo3(get, set)]
    pub chunks_per_symbol: u32,
    /// Subcarriers (resource elements) per chunk per symbol
    #[pyo3(get, set)]
    pub subcarriers_per_chunk: u32,
    /// Subframes per radio frame
    #[pyo3(get, set)]
    pub subframes_per_frame: u32,
    /// Subframe duration in microseconds
    #[pyo3(get, set)]
    pub subframe_period_us: u32,
    /// HARQ process slots per station per direction
    #[pyo3(get, set)]
    pub num_harq_processes: u8,
    /// Subframes a busy HARQ process may go without a refresh before it is released
    #[pyo3(get, set)]
    pub harq_timeout: u32,
    /// Maximum redundancy version; the NACK after it drops the block
    #[pyo3(get, set)]
    pub max_retx: u8,
    /// When false, a NACK drops the block instead of retransmitting
    #[pyo3(get, set)]
    pub harq_enabled: bool,
    /// Subframes a CQI report stays valid
    #[pyo3(get, set)]
    pub cqi_validity: u32,
    /// Subframes between the trigger and the subframe the plan describes
    #[pyo3(get, set)]
    pub ul_sched_delay: u32,
    /// Subframes an uplink allocation-map record is kept for CQI attribution
    #[pyo3(get, set)]
    pub round_trip: u32,
    /// MCS used when a station has no valid CQI report
    #[pyo3(get, set)]
    pub default_mcs: u8,
    /// Forced downlink MCS, ignoring CQI
    #[pyo3(get, set)]
    pub fixed_mcs_dl: Option<u8>,
    /// Forced uplink MCS, ignoring CQI
    #[pyo3(get, set)]
    pub fixed_mcs_ul: Option<u8>,
    /// EWMA weight for per-direction throughput
    #[pyo3(get, set)]
    pub throughput_alpha: f64,
    /// Verbosity level: 0=silent, 1=changes, 2=checks, 3=debug
    #[pyo3(get, set)]
    pub verbosity: u8,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            symbols_per_subframe: 24,
            chunks_per_symbol: 72,
            subcarriers_per_chunk: 12,
            subframes_per_frame: 10,
            subframe_period_us: 100,
            num_harq_processes: 20,
            harq_timeout: 20,
            max_retx: MAX_REDUNDANCY_VERSION,
            harq_enabled: true,
            cqi_validity: 1000,
            ul_sched_delay: 1,
            round_trip: 4,
            default_mcs: 1,
            fixed_mcs_dl: None,
            fixed_mcs_ul: None,
            throughput_alpha: 0.1,
            verbosity: 0,
        }
    }
}

#[pymethods]
impl SchedulerConfig {
    #[new]
    #[pyo3(signature = (
        symbols_per_subframe=None,
        chunks_per_symbol=None,
        subcarriers_per_chunk=None,
        subframes_per_frame=None,
        subframe_period_us=None,
        num_harq_processes=None,
        harq_timeout=None,
        max_retx=None,
        harq_enabled=None,
        cqi_validity=None,
        ul_sched_delay=None,
        round_trip=None,
        default_mcs=None,
        fixed_mcs_dl=None,
        fixed_mcs_ul=None,
        throughput_alpha=None,
        verbosity=None
    ))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        symbols_per_subframe: Option<u32>,
        chunks_per_symbol: Option<u32>,
        subcarriers_per_chunk: Option<u32>,
        subframes_per_frame: Option<u32>,
        subframe_period_us: Option<u32>,
        num_harq_processes: Option<u8>,
        harq_timeout: Option<u32>,
        max_retx: Option<u8>,
        harq_enabled: Option<bool>,
        cqi_validity: Option<u32>,
        ul_sched_delay: Option<u32>,
        round_trip: Option<u32>,
        default_mcs: Option<u8>,
        fixed_mcs_dl: Option<u8>,
        fixed_mcs_ul: Option<u8>,
        throughput_alpha: Option<f64>,
        verbosity: Option<u8>,
    ) -> Self {
        let defaults = Self::default();
        Self {
            symbols_per_subframe: symbols_per_subframe.unwrap_or(defaults.symbols_per_subframe),
            chunks_per_symbol: chunks_per_symbol.unwrap_or(defaults.chunks_per_symbol),
            subcarriers_per_chunk: subcarriers_per_chunk.unwrap_or(defaults.subcarriers_per_chunk),
            subframes_per_frame: subframes_per_frame.unwrap_or(defaults.subframes_per_frame),
            subframe_period_us: subframe_period_us.unwrap_or(defaults.subframe_period_us),
            num_harq_processes: num_harq_processes.unwrap_or(defaults.num_harq_processes),
            harq_timeout: harq_timeout.unwrap_or(defaults.harq_timeout),
            max_retx: max_retx.unwrap_or(defaults.max_retx),
            harq_enabled: harq_enabled.unwrap_or(defaults.harq_enabled),
            cqi_validity: cqi_validity.unwrap_or(defaults.cqi_validity),
            ul_sched_delay: ul_sched_delay.unwrap_or(defaults.ul_sched_delay),
            round_trip: round_trip.unwrap_or(defaults.round_trip),
            default_mcs: default_mcs.unwrap_or(defaults.default_mcs),
            fixed_mcs_dl,
            fixed_mcs_ul,
            throughput_alpha: throughput_alpha.unwrap_or(defaults.throughput_alpha),
            verbosity: verbosity.unwrap_or(defaults.verbosity),
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "SchedulerConfig(symbols_per_subframe={}, num_harq_processes={}, harq_timeout={}, cqi_validity={})",
            self.symbols_per_subframe, self.num_harq_processes, self.harq_timeout, self.cqi_validity
        )
    }
}

impl SchedulerConfig {
    /// Symbols available for data slots once the control slots are reserved.
    pub fn data_symbols(&self) -> u32 {
        self.symbols_per_subframe.saturating_sub(CONTROL_SYMBOLS)
    }

    /// Resource elements carried by one symbol.
    pub fn resource_elements_per_symbol(&self) -> u32 {
        self.chunks_per_symbol * self.subcarriers_per_chunk
    }

    /// Reject configurations the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        let invalid = |msg: String| Err(SchedulerError::InvalidConfig(msg));

        if self.symbols_per_subframe <= CONTROL_SYMBOLS {
            return invalid(format!(
                "symbols_per_subframe must exceed the {} control symbols, got {}",
                CONTROL_SYMBOLS, self.symbols_per_subframe
            ));
        }
        if self.chunks_per_symbol == 0 || self.subcarriers_per_chunk == 0 {
            return invalid("chunks_per_symbol and subcarriers_per_chunk must be non-zero".into());
        }
        if self
            .chunks_per_symbol
            .checked_mul(self.subcarriers_per_chunk)
            .is_none()
        {
            return invalid(format!(
                "chunks_per_symbol * subcarriers_per_chunk overflows: {} * {}",
                self.chunks_per_symbol, self.subcarriers_per_chunk
            ));
        }
        if self.subframes_per_frame == 0 {
            return invalid("subframes_per_frame must be non-zero".into());
        }
        if self.num_harq_processes == 0 {
            return invalid("num_harq_processes must be non-zero".into());
        }
        if self.harq_timeout == 0 {
            return invalid("harq_timeout must be non-zero".into());
        }
        if self.cqi_validity == 0 {
            return invalid("cqi_validity must be non-zero".into());
        }
        if self.max_retx > MAX_REDUNDANCY_VERSION {
            return invalid(format!(
                "max_retx must be at most {}, got {}",
                MAX_REDUNDANCY_VERSION, self.max_retx
            ));
        }
        for (name, mcs) in [
            ("default_mcs", Some(self.default_mcs)),
            ("fixed_mcs_dl", self.fixed_mcs_dl),
            ("fixed_mcs_ul", self.fixed_mcs_ul),
        ] {
            if let Some(mcs) = mcs {
                if mcs as usize >= MCS_COUNT {
                    return invalid(format!("{} must be below {}, got {}", name, MCS_COUNT, mcs));
                }
            }
        }
        if !(self.throughput_alpha > 0.0 && self.throughput_alpha <= 1.0) {
            return invalid(format!(
                "throughput_alpha must be in (0, 1], got {}",
                self.throughput_alpha
            ));
        }
        Ok(())
    }
}
