//! Core data types shared by the scheduler tables and the allocation plan.

use pyo3::prelude::*;

use crate::scheduler::SchedulerEvent;

/// Numeric station identifier assigned by the host (RNTI-like).
pub type StationId = u16;

/// Transmission direction of a grant, flow, HARQ process or CQI report.
#[pyclass(eq, eq_int)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    Downlink,
    Uplink,
}

impl Direction {
    /// Both directions, downlink first (the order data slots are laid out in).
    pub const ALL: [Direction; 2] = [Direction::Downlink, Direction::Uplink];

    /// Index into per-direction arrays.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Direction::Downlink => 0,
            Direction::Uplink => 1,
        }
    }

    #[inline]
    pub fn opposite(self) -> Direction {
        match self {
            Direction::Downlink => Direction::Uplink,
            Direction::Uplink => Direction::Downlink,
        }
    }
}

/// Downlink control information: what one station was granted in one subframe.
///
/// Immutable once emitted; the HARQ table keeps a copy for retransmission.
#[pyclass]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Grant {
    #[pyo3(get)]
    pub station: StationId,
    #[pyo3(get)]
    pub direction: Direction,
    #[pyo3(get)]
    pub symbol_start: u32,
    #[pyo3(get)]
    pub num_symbols: u32,
    #[pyo3(get)]
    pub mcs: u8,
    /// Transport block size in bytes.
    #[pyo3(get)]
    pub tb_size: u32,
    #[pyo3(get)]
    pub harq_process: u8,
    #[pyo3(get)]
    pub rv: u8,
    /// New-data indicator: false for a HARQ retransmission.
    #[pyo3(get)]
    pub ndi: bool,
}

#[pymethods]
impl Grant {
    fn __repr__(&self) -> String {
        format!(
            "Grant(station={}, direction={:?}, symbols={}+{}, mcs={}, tb_size={}, harq={}, rv={})",
            self.station,
            self.direction,
            self.symbol_start,
            self.num_symbols,
            self.mcs,
            self.tb_size,
            self.harq_process,
            self.rv
        )
    }
}

impl Grant {
    /// Copy of this grant for the next redundancy version of the same block.
    pub fn retransmission(&self) -> Grant {
        Grant {
            rv: self.rv + 1,
            ndi: false,
            ..*self
        }
    }

    /// One past the last symbol occupied by this grant.
    #[inline]
    pub fn symbol_end(&self) -> u32 {
        self.symbol_start + self.num_symbols
    }
}

/// Purpose of a slot within the subframe.
#[pyclass(eq, eq_int)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlotKind {
    DlControl,
    DlData,
    UlData,
    UlControl,
}

impl SlotKind {
    pub fn is_control(self) -> bool {
        matches!(self, SlotKind::DlControl | SlotKind::UlControl)
    }

    pub fn data(direction: Direction) -> SlotKind {
        match direction {
            Direction::Downlink => SlotKind::DlData,
            Direction::Uplink => SlotKind::UlData,
        }
    }
}

/// A contiguous run of symbols assigned to one purpose.
#[pyclass]
#[derive(Clone, Debug, PartialEq)]
pub struct Slot {
    #[pyo3(get)]
    pub index: u32,
    #[pyo3(get)]
    pub kind: SlotKind,
    #[pyo3(get)]
    pub symbol_start: u32,
    #[pyo3(get)]
    pub num_symbols: u32,
    /// Present for data slots only.
    #[pyo3(get)]
    pub grant: Option<Grant>,
}

#[pymethods]
impl Slot {
    fn __repr__(&self) -> String {
        format!(
            "Slot(index={}, kind={:?}, symbols={}+{}, station={:?})",
            self.index,
            self.kind,
            self.symbol_start,
            self.num_symbols,
            self.grant.map(|g| g.station)
        )
    }
}

/// Output of one scheduler invocation: the ordered slot list for one subframe.
#[pyclass]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AllocationPlan {
    /// Frame number of the trigger that produced this plan.
    #[pyo3(get)]
    pub frame: u32,
    /// Subframe number of the trigger that produced this plan.
    #[pyo3(get)]
    pub subframe: u32,
    /// Absolute index of the subframe the plan describes (trigger + scheduling delay).
    #[pyo3(get)]
    pub subframe_index: u64,
    #[pyo3(get)]
    pub slots: Vec<Slot>,
    /// Recoverable conditions raised while building the plan.
    pub events: Vec<SchedulerEvent>,
}

#[pymethods]
impl AllocationPlan {
    /// Total symbols occupied by all slots, control included.
    pub fn used_symbols(&self) -> u32 {
        self.slots.iter().map(|s| s.num_symbols).sum()
    }

    /// Number of data slots in the plan.
    pub fn num_grants(&self) -> usize {
        self.slots.iter().filter(|s| s.grant.is_some()).count()
    }

    /// Human-readable form of every event raised while building the plan.
    pub fn describe_events(&self) -> Vec<String> {
        self.events.iter().map(|e| format!("{:?}", e)).collect()
    }

    fn __repr__(&self) -> String {
        format!(
            "AllocationPlan(frame={}, subframe={}, slots={}, events={})",
            self.frame,
            self.subframe,
            self.slots.len(),
            self.events.len()
        )
    }
}

impl AllocationPlan {
    /// Grants carried by the data slots, in slot order.
    pub fn grants(&self) -> impl Iterator<Item = &Grant> {
        self.slots.iter().filter_map(|s| s.grant.as_ref())
    }

    /// The grant issued to `station` in `direction`, if any.
    pub fn grant_for(&self, station: StationId, direction: Direction) -> Option<&Grant> {
        self.grants()
            .find(|g| g.station == station && g.direction == direction)
    }
}

/// Bytes taken from one logical channel to fill a transport block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RlcPdu {
    pub lcid: u8,
    pub size: u32,
}

/// Why a transport block was permanently discarded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LossReason {
    /// NACK received at the last redundancy version.
    RetryLimit,
    /// No feedback (or no retransmission opportunity) within the HARQ timeout.
    Timeout,
    /// NACK received with HARQ disabled.
    HarqDisabled,
}

/// Record of a permanently lost transport block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LossEvent {
    pub station: StationId,
    pub direction: Direction,
    pub harq_process: u8,
    pub rv: u8,
    pub bytes: u32,
    pub reason: LossReason,
}

/// Resource type of a QoS class.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceType {
    Gbr,
    NonGbr,
    DelayCriticalGbr,
}

/// Standardized QoS class characteristics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QosClass {
    pub qci: u8,
    pub resource_type: ResourceType,
    /// Priority level times ten (lower is served first).
    pub priority_x10: u16,
    /// Packet delay budget in milliseconds.
    pub delay_budget_ms: u32,
}

impl QosClass {
    /// Look up a standardized QCI; `None` for unknown classes.
    pub fn from_qci(qci: u8) -> Option<QosClass> {
        use ResourceType::*;
        let (resource_type, priority_x10, delay_budget_ms) = match qci {
            1 => (Gbr, 20, 100),
            2 => (Gbr, 40, 150),
            3 => (Gbr, 30, 50),
            4 => (Gbr, 50, 300),
            65 => (Gbr, 7, 75),
            66 => (Gbr, 20, 100),
            75 => (Gbr, 25, 50),
            5 => (NonGbr, 10, 100),
            6 => (NonGbr, 60, 300),
            7 => (NonGbr, 70, 100),
            8 => (NonGbr, 80, 300),
            9 => (NonGbr, 90, 300),
            69 => (NonGbr, 5, 60),
            70 => (NonGbr, 55, 200),
            79 => (NonGbr, 65, 50),
            80 => (NonGbr, 68, 10),
            82 => (DelayCriticalGbr, 19, 10),
            83 => (DelayCriticalGbr, 22, 10),
            84 => (DelayCriticalGbr, 24, 30),
            85 => (DelayCriticalGbr, 21, 5),
            86 => (DelayCriticalGbr, 18, 5),
            _ => return None,
        };
        Some(QosClass {
            qci,
            resource_type,
            priority_x10,
            delay_budget_ms,
        })
    }

    /// Deadline for low-latency classing; only delay-critical classes carry one.
    pub fn deadline_ms(&self) -> Option<u32> {
        match self.resource_type {
            ResourceType::DelayCriticalGbr => Some(self.delay_budget_ms),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant() -> Grant {
        Grant {
            station: 7,
            direction: Direction::Downlink,
            symbol_start: 3,
            num_symbols: 4,
            mcs: 10,
            tb_size: 1200,
            harq_process: 2,
            rv: 0,
            ndi: true,
        }
    }

    #[test]
    fn test_direction_helpers() {
        assert_eq!(Direction::Downlink.opposite(), Direction::Uplink);
        assert_eq!(Direction::Uplink.opposite(), Direction::Downlink);
        assert_eq!(Direction::Downlink.index(), 0);
        assert_eq!(Direction::Uplink.index(), 1);
    }

    #[test]
    fn test_retransmission_keeps_resources() {
        let retx = grant().retransmission();
        assert_eq!(retx.rv, 1);
        assert!(!retx.ndi);
        assert_eq!(retx.num_symbols, 4);
        assert_eq!(retx.tb_size, 1200);
        assert_eq!(retx.harq_process, 2);
        assert_eq!(grant().symbol_end(), 7);
    }

    #[test]
    fn test_qos_lookup() {
        let voice = QosClass::from_qci(1).unwrap();
        assert_eq!(voice.resource_type, ResourceType::Gbr);
        assert_eq!(voice.deadline_ms(), None);

        let urllc = QosClass::from_qci(85).unwrap();
        assert_eq!(urllc.deadline_ms(), Some(5));

        assert!(QosClass::from_qci(0).is_none());
        assert!(QosClass::from_qci(42).is_none());
    }

    #[test]
    fn test_plan_accessors() {
        let plan = AllocationPlan {
            slots: vec![
                Slot {
                    index: 0,
                    kind: SlotKind::DlControl,
                    symbol_start: 0,
                    num_symbols: 1,
                    grant: None,
                },
                Slot {
                    index: 1,
                    kind: SlotKind::DlData,
                    symbol_start: 3,
                    num_symbols: 4,
                    grant: Some(grant()),
                },
            ],
            ..Default::default()
        };
        assert_eq!(plan.used_symbols(), 5);
        assert_eq!(plan.num_grants(), 1);
        assert!(plan.grant_for(7, Direction::Downlink).is_some());
        assert!(plan.grant_for(7, Direction::Uplink).is_none());
    }
}
