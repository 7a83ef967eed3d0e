//! HARQ process table.
//!
//! Each station owns a fixed number of stop-and-wait processes per
//! direction. A busy process keeps a copy of its grant and the RLC split
//! of its transport block so the block can be replayed on NACK.

use rustc_hash::FxHashMap;

use crate::arena::StationHandle;
use crate::models::{Direction, Grant, LossReason, RlcPdu};

/// State of a single HARQ process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessState {
    Free,
    /// Waiting for feedback or for a retransmission opportunity.
    Busy {
        rv: u8,
        /// Subframes since the process was last (re)transmitted.
        timeout: u32,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct HarqProcess {
    pub state: ProcessState,
    pub grant: Option<Grant>,
    pub payload: Vec<RlcPdu>,
}

impl HarqProcess {
    fn free() -> Self {
        Self {
            state: ProcessState::Free,
            grant: None,
            payload: Vec::new(),
        }
    }

    pub fn is_free(&self) -> bool {
        self.state == ProcessState::Free
    }

    fn clear(&mut self) -> (Option<Grant>, Vec<RlcPdu>) {
        self.state = ProcessState::Free;
        (self.grant.take(), std::mem::take(&mut self.payload))
    }
}

/// A busy process force-released by [`HarqTable::tick`].
#[derive(Clone, Debug, PartialEq)]
pub struct ExpiredProcess {
    pub handle: StationHandle,
    pub direction: Direction,
    pub process_id: u8,
    pub grant: Option<Grant>,
    pub payload: Vec<RlcPdu>,
}

/// Result of applying one feedback report.
#[derive(Clone, Debug, PartialEq)]
pub enum FeedbackOutcome {
    /// ACK, or the process was already free; the slot is free now.
    Released {
        grant: Option<Grant>,
        payload: Vec<RlcPdu>,
    },
    /// NACK with retries left; the process stays busy awaiting replay.
    Retransmit { grant: Grant },
    /// NACK with no retries left; the slot is free and the block is lost.
    Dropped {
        grant: Grant,
        payload: Vec<RlcPdu>,
        reason: LossReason,
    },
    /// No such station or process id.
    Unknown,
}

/// HARQ processes for every attached station.
#[derive(Debug, Clone)]
pub struct HarqTable {
    num_processes: u8,
    timeout: u32,
    max_retx: u8,
    enabled: bool,
    processes: FxHashMap<StationHandle, [Vec<HarqProcess>; 2]>,
}

impl HarqTable {
    pub fn new(num_processes: u8, timeout: u32, max_retx: u8, enabled: bool) -> Self {
        Self {
            num_processes,
            timeout,
            max_retx,
            enabled,
            processes: FxHashMap::default(),
        }
    }

    pub fn add_station(&mut self, handle: StationHandle) {
        let n = self.num_processes as usize;
        self.processes.entry(handle).or_insert_with(|| {
            [
                vec![HarqProcess::free(); n],
                vec![HarqProcess::free(); n],
            ]
        });
    }

    pub fn remove_station(&mut self, handle: StationHandle) {
        self.processes.remove(&handle);
    }

    pub fn has_station(&self, handle: StationHandle) -> bool {
        self.processes.contains_key(&handle)
    }

    fn process_mut(
        &mut self,
        handle: StationHandle,
        direction: Direction,
        process_id: u8,
    ) -> Option<&mut HarqProcess> {
        self.processes
            .get_mut(&handle)?
            .get_mut(direction.index())?
            .get_mut(process_id as usize)
    }

    pub fn process(
        &self,
        handle: StationHandle,
        direction: Direction,
        process_id: u8,
    ) -> Option<&HarqProcess> {
        self.processes
            .get(&handle)?
            .get(direction.index())?
            .get(process_id as usize)
    }

    /// Age every busy process by one subframe.
    ///
    /// A process reaching the timeout is forced free so a lost feedback
    /// report cannot leak the slot. Returns the released processes in
    /// (station, direction, process id) order.
    pub fn tick(&mut self) -> Vec<ExpiredProcess> {
        let limit = self.timeout;
        let mut expired = Vec::new();
        for (handle, directions) in self.processes.iter_mut() {
            for direction in Direction::ALL {
                for (pid, process) in directions[direction.index()].iter_mut().enumerate() {
                    if let ProcessState::Busy { timeout, .. } = &mut process.state {
                        *timeout += 1;
                        if *timeout >= limit {
                            let (grant, payload) = process.clear();
                            expired.push(ExpiredProcess {
                                handle: *handle,
                                direction,
                                process_id: pid as u8,
                                grant,
                                payload,
                            });
                        }
                    }
                }
            }
        }
        expired.sort_by_key(|e| (e.handle, e.direction, e.process_id));
        expired
    }

    /// Whether a free process exists for the station in `direction`.
    pub fn has_free(&self, handle: StationHandle, direction: Direction) -> bool {
        self.processes
            .get(&handle)
            .is_some_and(|d| d[direction.index()].iter().any(HarqProcess::is_free))
    }

    /// Reserve the first free process. `None` when all are busy or the
    /// station is unknown.
    pub fn allocate(&mut self, handle: StationHandle, direction: Direction) -> Option<u8> {
        let processes = &mut self.processes.get_mut(&handle)?[direction.index()];
        let pid = processes.iter().position(HarqProcess::is_free)?;
        processes[pid].state = ProcessState::Busy { rv: 0, timeout: 0 };
        Some(pid as u8)
    }

    /// Archive a new transmission on a reserved process.
    pub fn store(&mut self, grant: Grant, handle: StationHandle, payload: Vec<RlcPdu>) -> bool {
        let Some(process) = self.process_mut(handle, grant.direction, grant.harq_process) else {
            return false;
        };
        process.state = ProcessState::Busy {
            rv: grant.rv,
            timeout: 0,
        };
        process.grant = Some(grant);
        process.payload = payload;
        true
    }

    /// Record that a retransmission of a busy process was scheduled.
    pub fn commit_retransmission(&mut self, grant: Grant, handle: StationHandle) -> bool {
        match self.process_mut(handle, grant.direction, grant.harq_process) {
            Some(process) if !process.is_free() => {
                process.state = ProcessState::Busy {
                    rv: grant.rv,
                    timeout: 0,
                };
                process.grant = Some(grant);
                true
            }
            _ => false,
        }
    }

    /// Apply ACK (`ok`) or NACK feedback for one process.
    pub fn on_feedback(
        &mut self,
        handle: StationHandle,
        direction: Direction,
        process_id: u8,
        ok: bool,
    ) -> FeedbackOutcome {
        let enabled = self.enabled;
        let max_retx = self.max_retx;
        let Some(process) = self.process_mut(handle, direction, process_id) else {
            return FeedbackOutcome::Unknown;
        };

        if ok || process.is_free() {
            let (grant, payload) = process.clear();
            return FeedbackOutcome::Released { grant, payload };
        }

        let Some(grant) = process.grant else {
            // Reserved but never archived; nothing to replay.
            process.clear();
            return FeedbackOutcome::Released {
                grant: None,
                payload: Vec::new(),
            };
        };

        let reason = if !enabled {
            Some(LossReason::HarqDisabled)
        } else if grant.rv >= max_retx {
            Some(LossReason::RetryLimit)
        } else {
            None
        };
        match reason {
            Some(reason) => {
                let (_, payload) = process.clear();
                FeedbackOutcome::Dropped {
                    grant,
                    payload,
                    reason,
                }
            }
            None => FeedbackOutcome::Retransmit { grant },
        }
    }

    /// Stored grant of a busy process.
    pub fn stored_grant(
        &self,
        handle: StationHandle,
        direction: Direction,
        process_id: u8,
    ) -> Option<&Grant> {
        self.process(handle, direction, process_id)
            .filter(|p| !p.is_free())
            .and_then(|p| p.grant.as_ref())
    }

    pub fn state(
        &self,
        handle: StationHandle,
        direction: Direction,
        process_id: u8,
    ) -> Option<ProcessState> {
        self.process(handle, direction, process_id).map(|p| p.state)
    }

    pub fn busy_count(&self, handle: StationHandle, direction: Direction) -> usize {
        self.processes.get(&handle).map_or(0, |d| {
            d[direction.index()].iter().filter(|p| !p.is_free()).count()
        })
    }
}
