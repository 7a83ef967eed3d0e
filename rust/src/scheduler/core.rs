//! Core subframe allocator implementation.

use thiserror::Error;

use crate::amc::MCS_COUNT;
use crate::arena::{StationArena, StationHandle};
use crate::buffer::{BufferAccountant, DlFlow, UlFlow};
use crate::config::SchedulerConfig;
use crate::cqi::{ChannelQualityTracker, UlAllocationRecord};
use crate::harq::{FeedbackOutcome, HarqTable, ProcessState};
use crate::models::{
    AllocationPlan, Direction, Grant, LossEvent, LossReason, QosClass, RlcPdu, Slot, SlotKind,
    StationId,
};
use crate::tbs::TransportBlockSizer;
use crate::{log_changes, log_checks, log_debug};

use super::events::{SchedulerEvent, SchedulerStats};
use super::state::StationState;

/// Errors that can occur while configuring or running the scheduler.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchedulerError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Unknown QoS class: {0}")]
    UnknownQosClass(u8),
    #[error("Unknown station: {0}")]
    UnknownStation(StationId),
    #[error("Station {station} is attached but has no {table} entry")]
    MissingTableEntry {
        station: StationId,
        table: &'static str,
    },
}

/// One HARQ acknowledgment report as delivered by the PHY.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HarqFeedback {
    pub station: StationId,
    pub direction: Direction,
    pub harq_process: u8,
    pub ack: bool,
}

/// A NACKed process waiting for symbols.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct PendingRetx {
    handle: StationHandle,
    direction: Direction,
    harq_process: u8,
}

/// A grant chosen this subframe, before symbol positions are assigned.
struct PlannedGrant {
    handle: StationHandle,
    grant: Grant,
    /// RLC split for new data; `None` for a retransmission.
    payload: Option<Vec<RlcPdu>>,
}

/// Per-subframe radio resource scheduler.
///
/// Owns every per-station table. Inbound reports may arrive in any order
/// between two [`SubframeScheduler::on_subframe`] calls; HARQ feedback is
/// queued and merged at the start of the next call.
pub struct SubframeScheduler {
    config: SchedulerConfig,
    stations: StationArena<StationState>,
    cqi: ChannelQualityTracker,
    buffers: BufferAccountant,
    harq: HarqTable,
    tbs: TransportBlockSizer,

    feedback_inbox: Vec<HarqFeedback>,
    /// NACKed processes still to be replayed, oldest first
    pending_retx: Vec<PendingRetx>,

    stats: SchedulerStats,
}

impl SubframeScheduler {
    /// Create a new scheduler. Fails on an invalid configuration.
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        config.validate()?;

        Ok(Self {
            cqi: ChannelQualityTracker::new(config.cqi_validity, config.round_trip),
            buffers: BufferAccountant::new(config.subframe_period_us),
            harq: HarqTable::new(
                config.num_harq_processes,
                config.harq_timeout,
                config.max_retx,
                config.harq_enabled,
            ),
            tbs: TransportBlockSizer::from_config(&config),
            stations: StationArena::default(),
            feedback_inbox: Vec::new(),
            pending_retx: Vec::new(),
            stats: SchedulerStats::default(),
            config,
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    pub fn sizer(&self) -> &TransportBlockSizer {
        &self.tbs
    }

    // ------------------------------------------------------------------
    // Station lifecycle
    // ------------------------------------------------------------------

    /// Attach a station. Attaching an already attached station is a no-op.
    pub fn attach_station(&mut self, station: StationId) {
        let (handle, created) = self.stations.insert_with(station, StationState::new);
        if created {
            self.buffers.add_station(handle);
            self.harq.add_station(handle);
            log_changes!(self.config.verbosity, "Station {} attached", station);
        }
    }

    /// Detach a station and erase every table entry it owns.
    ///
    /// Returns false if the station was not attached.
    pub fn detach_station(&mut self, station: StationId) -> bool {
        let Some((handle, _)) = self.stations.remove(station) else {
            return false;
        };
        self.cqi.remove_station(handle);
        self.buffers.remove_station(handle);
        self.harq.remove_station(handle);
        self.pending_retx.retain(|p| p.handle != handle);
        self.feedback_inbox.retain(|f| f.station != station);
        log_changes!(self.config.verbosity, "Station {} detached", station);
        true
    }

    pub fn is_attached(&self, station: StationId) -> bool {
        self.stations.handle(station).is_some()
    }

    pub fn num_stations(&self) -> usize {
        self.stations.len()
    }

    /// Configure a logical channel (downlink) or channel group (uplink).
    pub fn configure_channel(
        &mut self,
        station: StationId,
        channel: u8,
        direction: Direction,
        qci: u8,
    ) -> Result<(), SchedulerError> {
        let qos = QosClass::from_qci(qci).ok_or(SchedulerError::UnknownQosClass(qci))?;
        let handle = self
            .stations
            .handle(station)
            .ok_or(SchedulerError::UnknownStation(station))?;
        if !self.buffers.configure_channel(handle, channel, direction, qos) {
            return Err(SchedulerError::MissingTableEntry {
                station,
                table: "buffer",
            });
        }
        log_changes!(
            self.config.verbosity,
            "Station {} channel {} {:?} configured with QCI {}",
            station,
            channel,
            direction,
            qci
        );
        Ok(())
    }

    /// Release a logical channel; its queued bytes are discarded.
    pub fn release_channel(&mut self, station: StationId, channel: u8, direction: Direction) -> bool {
        match self.stations.handle(station) {
            Some(handle) => self.buffers.release_channel(handle, channel, direction),
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Inbound reports
    // ------------------------------------------------------------------

    fn resolve_report(&mut self, station: StationId, what: &str) -> Option<StationHandle> {
        let handle = self.stations.handle(station);
        if handle.is_none() {
            self.stats.ignored_reports += 1;
            log_checks!(
                self.config.verbosity,
                "Ignoring {} for unknown station {}",
                what,
                station
            );
        }
        handle
    }

    /// Downlink RLC queue report. Returns the bytes newly accounted for.
    pub fn report_dl_queue(
        &mut self,
        station: StationId,
        lcid: u8,
        packet_sizes: &[u32],
        packet_delays_us: &[u32],
        total_bytes: u32,
    ) -> Option<u32> {
        let handle = self.resolve_report(station, "downlink queue report")?;
        let added = self.buffers.update_downlink_queue(
            handle,
            lcid,
            packet_sizes,
            packet_delays_us,
            total_bytes,
        );
        if added.is_none() {
            self.stats.ignored_reports += 1;
            log_checks!(
                self.config.verbosity,
                "Ignoring queue report for unconfigured channel {} of station {}",
                lcid,
                station
            );
        }
        added
    }

    /// Downlink RLC status and retransmission backlog for one channel.
    pub fn report_dl_rlc_status(
        &mut self,
        station: StationId,
        lcid: u8,
        retx_bytes: u32,
        status_bytes: u32,
    ) -> bool {
        match self.resolve_report(station, "RLC status report") {
            Some(handle) => {
                self.buffers
                    .update_downlink_rlc_status(handle, lcid, retx_bytes, status_bytes)
            }
            None => false,
        }
    }

    /// Uplink buffer status report. Returns the bytes added to the estimate.
    pub fn report_ul_bsr(&mut self, station: StationId, lcg: u8, reported_bytes: u32) -> Option<u32> {
        let handle = self.resolve_report(station, "buffer status report")?;
        let added = self.buffers.update_uplink_estimate(handle, lcg, reported_bytes);
        if added.is_none() {
            self.stats.ignored_reports += 1;
            log_checks!(
                self.config.verbosity,
                "Ignoring BSR for unconfigured group {} of station {}",
                lcg,
                station
            );
        }
        added
    }

    /// Wideband downlink CQI. Returns the MCS it maps to.
    pub fn report_dl_cqi(&mut self, station: StationId, cqi: u8) -> Option<u8> {
        let handle = self.resolve_report(station, "downlink CQI")?;
        Some(self.cqi.report_downlink(handle, cqi))
    }

    /// Uplink SINR measured on the grant at `symbol_start` of `subframe_index`.
    ///
    /// Returns the station the report was attributed to. Each uplink grant
    /// can be attributed at most once.
    pub fn report_ul_cqi(
        &mut self,
        subframe_index: u64,
        symbol_start: u32,
        chunk_sinr: &[f64],
    ) -> Option<StationId> {
        let Some(record) = self.cqi.take_ul_allocation(subframe_index, symbol_start) else {
            self.stats.ignored_reports += 1;
            log_checks!(
                self.config.verbosity,
                "No uplink allocation at subframe {} symbol {}",
                subframe_index,
                symbol_start
            );
            return None;
        };
        let station = self.stations.id(record.handle)?;
        let mcs = self
            .cqi
            .report_uplink(record.handle, chunk_sinr, record.num_symbols, record.tb_size);
        log_checks!(
            self.config.verbosity,
            "Uplink CQI for station {} (harq {}) -> MCS {:?}",
            station,
            record.harq_process,
            mcs
        );
        Some(station)
    }

    /// Queue HARQ feedback for the next subframe.
    pub fn harq_feedback(&mut self, station: StationId, direction: Direction, harq_process: u8, ack: bool) {
        self.feedback_inbox.push(HarqFeedback {
            station,
            direction,
            harq_process,
            ack,
        });
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Bytes still queued for a station.
    pub fn buffered_bytes(&self, station: StationId, direction: Direction) -> Option<u32> {
        let handle = self.stations.handle(station)?;
        Some(self.buffers.buffered(handle, direction))
    }

    /// Worst head-of-line delay across a station's channels.
    pub fn hol_delay_us(&self, station: StationId, direction: Direction) -> Option<u32> {
        let handle = self.stations.handle(station)?;
        Some(self.buffers.hol_delay_us(handle, direction))
    }

    pub fn dl_flow(&self, station: StationId, lcid: u8) -> Option<&DlFlow> {
        self.buffers.dl_flow(self.stations.handle(station)?, lcid)
    }

    pub fn ul_flow(&self, station: StationId, lcg: u8) -> Option<&UlFlow> {
        self.buffers.ul_flow(self.stations.handle(station)?, lcg)
    }

    pub fn harq_state(
        &self,
        station: StationId,
        direction: Direction,
        harq_process: u8,
    ) -> Option<ProcessState> {
        self.harq
            .state(self.stations.handle(station)?, direction, harq_process)
    }

    /// MCS the station would be scheduled at right now.
    pub fn current_mcs(&self, station: StationId, direction: Direction) -> Option<u8> {
        Some(self.resolve_mcs(self.stations.handle(station)?, direction))
    }

    /// Average bytes delivered per subframe.
    pub fn throughput(&self, station: StationId, direction: Direction) -> Option<f64> {
        let handle = self.stations.handle(station)?;
        self.stations
            .get(handle)
            .map(|s| s.throughput[direction.index()])
    }

    pub fn pending_retransmissions(&self) -> usize {
        self.pending_retx.len()
    }

    /// HARQ processes awaiting feedback or replay.
    pub fn busy_processes(&self, station: StationId, direction: Direction) -> Option<usize> {
        let handle = self.stations.handle(station)?;
        self.harq
            .has_station(handle)
            .then(|| self.harq.busy_count(handle, direction))
    }

    /// Latest valid wideband downlink CQI.
    pub fn dl_cqi(&self, station: StationId) -> Option<u8> {
        self.cqi.downlink(self.stations.handle(station)?).map(|e| e.cqi)
    }

    /// Accumulated uplink SINR per chunk; NaN where never measured.
    pub fn ul_sinr(&self, station: StationId) -> Option<&[f64]> {
        self.cqi
            .uplink(self.stations.handle(station)?)
            .map(|e| e.sinr_per_chunk.as_slice())
    }

    /// Uplink grants still waiting for their SINR report.
    pub fn pending_ul_allocations(&self) -> usize {
        self.cqi.pending_ul_allocations()
    }

    fn resolve_mcs(&self, handle: StationHandle, direction: Direction) -> u8 {
        let fixed = match direction {
            Direction::Downlink => self.config.fixed_mcs_dl,
            Direction::Uplink => self.config.fixed_mcs_ul,
        };
        fixed
            .or_else(|| self.cqi.mcs(handle, direction))
            .unwrap_or(self.config.default_mcs)
    }

    // ------------------------------------------------------------------
    // Subframe pass
    // ------------------------------------------------------------------

    /// Run one full scheduling pass for the trigger at (frame, subframe).
    ///
    /// The plan describes subframe `trigger + ul_sched_delay`. Errors only
    /// on a broken internal invariant.
    pub fn on_subframe(&mut self, frame: u32, subframe: u32) -> Result<AllocationPlan, SchedulerError> {
        let current = frame as u64 * self.config.subframes_per_frame as u64 + subframe as u64;
        let target = current + self.config.ul_sched_delay as u64;
        let mut events = Vec::new();

        // Phase 1: timers
        self.refresh_timers(current, &mut events);

        // Phase 2: feedback received since the last pass
        self.merge_feedback(&mut events)?;

        // Phase 3: retransmissions first
        let mut budget = self.config.data_symbols();
        let mut planned = Vec::new();
        self.drain_retransmissions(&mut budget, &mut planned, &mut events);

        // Phase 4: new data, highest MCS bucket first
        if budget > 0 {
            let buckets = self.bucket_by_mcs(&mut events)?;
            self.greedy_fill(&buckets, &mut budget);
            self.build_new_grants(&mut planned, &mut events);
        }

        // Phase 5: lay out slots between the control symbols
        let plan = self.emit_slots(frame, subframe, target, planned, events)?;

        // Phase 6: clear per-tick counters
        let alpha = self.config.throughput_alpha;
        for (_, _, state) in self.stations.iter_mut() {
            state.end_subframe(alpha);
        }
        self.stats.subframes += 1;

        Ok(plan)
    }

    fn record_loss(&mut self, loss: LossEvent, events: &mut Vec<SchedulerEvent>) {
        tracing::warn!(
            station = loss.station,
            direction = ?loss.direction,
            harq_process = loss.harq_process,
            rv = loss.rv,
            bytes = loss.bytes,
            reason = ?loss.reason,
            "Transport block lost"
        );
        events.push(SchedulerEvent::Loss(loss));
    }

    /// Bytes of an uplink block that are no longer in flight.
    fn release_uplink(&mut self, handle: StationHandle, direction: Direction, payload: &[RlcPdu]) {
        if direction == Direction::Uplink {
            for pdu in payload {
                self.buffers.release_inflight(handle, pdu.lcid, pdu.size);
            }
        }
    }

    fn refresh_timers(&mut self, current: u64, events: &mut Vec<SchedulerEvent>) {
        let verbosity = self.config.verbosity;

        for (handle, direction) in self.cqi.tick(current) {
            log_checks!(
                verbosity,
                "CQI expired for station {:?} {:?}",
                self.stations.id(handle),
                direction
            );
        }

        for expired in self.harq.tick() {
            self.pending_retx.retain(|p| {
                !(p.handle == expired.handle
                    && p.direction == expired.direction
                    && p.harq_process == expired.process_id)
            });
            self.release_uplink(expired.handle, expired.direction, &expired.payload);

            let (Some(station), Some(grant)) = (self.stations.id(expired.handle), expired.grant)
            else {
                continue;
            };
            self.record_loss(
                LossEvent {
                    station,
                    direction: expired.direction,
                    harq_process: expired.process_id,
                    rv: grant.rv,
                    bytes: grant.tb_size,
                    reason: LossReason::Timeout,
                },
                events,
            );
        }
    }

    fn merge_feedback(&mut self, events: &mut Vec<SchedulerEvent>) -> Result<(), SchedulerError> {
        let verbosity = self.config.verbosity;

        for feedback in std::mem::take(&mut self.feedback_inbox) {
            let Some(handle) = self.resolve_report(feedback.station, "HARQ feedback") else {
                continue;
            };

            match self
                .harq
                .on_feedback(handle, feedback.direction, feedback.harq_process, feedback.ack)
            {
                FeedbackOutcome::Released { grant, payload } => {
                    self.release_uplink(handle, feedback.direction, &payload);
                    if grant.is_some() {
                        log_changes!(
                            verbosity,
                            "Station {} {:?} HARQ {} released (ack={})",
                            feedback.station,
                            feedback.direction,
                            feedback.harq_process,
                            feedback.ack
                        );
                    }
                }
                FeedbackOutcome::Retransmit { grant } => {
                    let entry = PendingRetx {
                        handle,
                        direction: feedback.direction,
                        harq_process: feedback.harq_process,
                    };
                    if !self.pending_retx.contains(&entry) {
                        self.pending_retx.push(entry);
                    }
                    log_changes!(
                        verbosity,
                        "Station {} {:?} HARQ {} NACK at rv {}",
                        feedback.station,
                        feedback.direction,
                        feedback.harq_process,
                        grant.rv
                    );
                }
                FeedbackOutcome::Dropped {
                    grant,
                    payload,
                    reason,
                } => {
                    self.pending_retx.retain(|p| {
                        !(p.handle == handle
                            && p.direction == feedback.direction
                            && p.harq_process == feedback.harq_process)
                    });
                    self.release_uplink(handle, feedback.direction, &payload);
                    self.record_loss(
                        LossEvent {
                            station: feedback.station,
                            direction: feedback.direction,
                            harq_process: feedback.harq_process,
                            rv: grant.rv,
                            bytes: grant.tb_size,
                            reason,
                        },
                        events,
                    );
                }
                FeedbackOutcome::Unknown => {
                    if !self.harq.has_station(handle) {
                        return Err(SchedulerError::MissingTableEntry {
                            station: feedback.station,
                            table: "harq",
                        });
                    }
                    self.stats.ignored_reports += 1;
                    log_checks!(
                        verbosity,
                        "Ignoring feedback for unknown HARQ process {} of station {}",
                        feedback.harq_process,
                        feedback.station
                    );
                }
            }
        }
        Ok(())
    }

    fn drain_retransmissions(
        &mut self,
        budget: &mut u32,
        planned: &mut Vec<PlannedGrant>,
        events: &mut Vec<SchedulerEvent>,
    ) {
        let verbosity = self.config.verbosity;
        let mut carried = Vec::new();

        for entry in std::mem::take(&mut self.pending_retx) {
            let (Some(station), Some(stored)) = (
                self.stations.id(entry.handle),
                self.harq
                    .stored_grant(entry.handle, entry.direction, entry.harq_process)
                    .copied(),
            ) else {
                // Detached, acknowledged late, or timed out: nothing to replay
                continue;
            };
            let Some(state) = self.stations.get_mut(entry.handle) else {
                continue;
            };
            let i = entry.direction.index();

            if stored.num_symbols > *budget || state.served[i] {
                events.push(SchedulerEvent::RetransmissionDeferred {
                    station,
                    direction: entry.direction,
                    harq_process: entry.harq_process,
                    rv: stored.rv,
                    num_symbols: stored.num_symbols,
                });
                log_checks!(
                    verbosity,
                    "Deferring retransmission of station {} {:?} HARQ {} ({} symbols, {} left)",
                    station,
                    entry.direction,
                    entry.harq_process,
                    stored.num_symbols,
                    budget
                );
                carried.push(entry);
                continue;
            }

            *budget -= stored.num_symbols;
            state.served[i] = true;
            planned.push(PlannedGrant {
                handle: entry.handle,
                grant: stored.retransmission(),
                payload: None,
            });
        }

        self.pending_retx = carried;
    }

    /// Group stations with unmet demand by the MCS of each direction.
    fn bucket_by_mcs(
        &mut self,
        events: &mut Vec<SchedulerEvent>,
    ) -> Result<Vec<Vec<StationHandle>>, SchedulerError> {
        let verbosity = self.config.verbosity;
        let mut buckets: Vec<Vec<StationHandle>> = vec![Vec::new(); MCS_COUNT];

        for handle in self.stations.handles() {
            let station = self.stations.id(handle).unwrap_or_default();
            if !self.buffers.has_station(handle) {
                return Err(SchedulerError::MissingTableEntry {
                    station,
                    table: "buffer",
                });
            }
            if !self.harq.has_station(handle) {
                return Err(SchedulerError::MissingTableEntry {
                    station,
                    table: "harq",
                });
            }
            let served = self.stations.get(handle).map(|s| s.served).unwrap_or_default();

            for direction in Direction::ALL {
                let i = direction.index();
                if served[i] {
                    continue;
                }
                let buffered = self.buffers.buffered(handle, direction);
                if buffered == 0 {
                    continue;
                }
                if !self.harq.has_free(handle, direction) {
                    log_checks!(
                        verbosity,
                        "Station {} {:?} has {} bytes but no free HARQ process",
                        station,
                        direction,
                        buffered
                    );
                    events.push(SchedulerEvent::HarqExhausted { station, direction });
                    continue;
                }

                let mcs = self.resolve_mcs(handle, direction);
                if let Some(state) = self.stations.get_mut(handle) {
                    state.mcs[i] = mcs;
                    state.buffered[i] = buffered;
                }
                let bucket = &mut buckets[mcs as usize];
                if !bucket.contains(&handle) {
                    bucket.push(handle);
                }
            }
        }

        Ok(buckets)
    }

    /// Hand out symbols one at a time, highest MCS bucket first.
    fn greedy_fill(&mut self, buckets: &[Vec<StationHandle>], budget: &mut u32) {
        let verbosity = self.config.verbosity;
        let max_symbols = self.config.data_symbols();

        for (mcs, bucket) in buckets.iter().enumerate().rev() {
            if bucket.is_empty() {
                continue;
            }
            loop {
                let mut progressed = false;
                for &handle in bucket {
                    if *budget == 0 {
                        return;
                    }
                    let Some(state) = self.stations.get_mut(handle) else {
                        continue;
                    };
                    let Some(direction) = state.next_direction(mcs as u8, max_symbols) else {
                        continue;
                    };
                    state.grant_symbol(direction, &self.tbs);
                    *budget -= 1;
                    progressed = true;
                    log_debug!(
                        verbosity,
                        "Bucket {}: handle {:?} {:?} -> {} symbols, tb {} / {} bytes",
                        mcs,
                        handle,
                        direction,
                        state.granted_symbols[direction.index()],
                        state.tb_size[direction.index()],
                        state.buffered[direction.index()]
                    );
                }
                if !progressed {
                    break;
                }
            }
        }
    }

    /// Turn granted symbols into grants: reserve a process and take the bytes.
    fn build_new_grants(&mut self, planned: &mut Vec<PlannedGrant>, events: &mut Vec<SchedulerEvent>) {
        let Self {
            stations,
            buffers,
            harq,
            config,
            ..
        } = self;

        for (handle, station, state) in stations.iter_mut() {
            for direction in Direction::ALL {
                let i = direction.index();
                let num_symbols = state.granted_symbols[i];
                if num_symbols == 0 || state.tb_size[i] == 0 {
                    continue;
                }
                let Some(harq_process) = harq.allocate(handle, direction) else {
                    events.push(SchedulerEvent::HarqExhausted { station, direction });
                    continue;
                };
                let tb_size = state.tb_size[i];
                let payload = buffers.dispatch(handle, direction, tb_size);
                state.dispatched[i] = payload.iter().map(|p| p.size).sum();

                log_changes!(
                    config.verbosity,
                    "Station {} {:?}: {} symbols at MCS {}, tb {} bytes, HARQ {}",
                    station,
                    direction,
                    num_symbols,
                    state.mcs[i],
                    tb_size,
                    harq_process
                );

                planned.push(PlannedGrant {
                    handle,
                    grant: Grant {
                        station,
                        direction,
                        symbol_start: 0,
                        num_symbols,
                        mcs: state.mcs[i],
                        tb_size,
                        harq_process,
                        rv: 0,
                        ndi: true,
                    },
                    payload: Some(payload),
                });
            }
        }
    }

    /// Assign symbol positions, archive grants, and wrap them in control slots.
    fn emit_slots(
        &mut self,
        frame: u32,
        subframe: u32,
        target: u64,
        mut planned: Vec<PlannedGrant>,
        events: Vec<SchedulerEvent>,
    ) -> Result<AllocationPlan, SchedulerError> {
        // Downlink before uplink; retransmissions stay ahead of new data
        planned.sort_by_key(|p| p.grant.direction);

        let mut slots = Vec::with_capacity(planned.len() + 2);
        slots.push(Slot {
            index: 0,
            kind: SlotKind::DlControl,
            symbol_start: 0,
            num_symbols: 1,
            grant: None,
        });

        let mut next_symbol = 1;
        for PlannedGrant {
            handle,
            mut grant,
            payload,
        } in planned
        {
            grant.symbol_start = next_symbol;
            next_symbol += grant.num_symbols;

            let archived = match payload {
                Some(payload) => {
                    self.stats.new_grants += 1;
                    self.harq.store(grant, handle, payload)
                }
                None => {
                    self.stats.retransmissions += 1;
                    log_changes!(
                        self.config.verbosity,
                        "Station {} {:?}: retransmitting HARQ {} at rv {}",
                        grant.station,
                        grant.direction,
                        grant.harq_process,
                        grant.rv
                    );
                    self.harq.commit_retransmission(grant, handle)
                }
            };
            if !archived {
                return Err(SchedulerError::MissingTableEntry {
                    station: grant.station,
                    table: "harq",
                });
            }

            if grant.direction == Direction::Uplink {
                self.cqi.record_ul_allocation(
                    target,
                    UlAllocationRecord {
                        handle,
                        harq_process: grant.harq_process,
                        symbol_start: grant.symbol_start,
                        num_symbols: grant.num_symbols,
                        tb_size: grant.tb_size,
                    },
                );
            }

            slots.push(Slot {
                index: slots.len() as u32,
                kind: SlotKind::data(grant.direction),
                symbol_start: grant.symbol_start,
                num_symbols: grant.num_symbols,
                grant: Some(grant),
            });
        }

        slots.push(Slot {
            index: slots.len() as u32,
            kind: SlotKind::UlControl,
            symbol_start: self.config.symbols_per_subframe - 1,
            num_symbols: 1,
            grant: None,
        });

        for event in &events {
            self.stats.record(event);
        }

        Ok(AllocationPlan {
            frame,
            subframe,
            subframe_index: target,
            slots,
            events,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amc::mcs_from_sinr;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rustc_hash::FxHashSet;

    const A: StationId = 10;
    const B: StationId = 20;
    const DL_LCID: u8 = 3;
    const UL_LCG: u8 = 1;

    /// 72 chunks x 48 subcarriers, 10 data symbols.
    fn config() -> SchedulerConfig {
        SchedulerConfig {
            symbols_per_subframe: 12,
            chunks_per_symbol: 72,
            subcarriers_per_chunk: 48,
            ..Default::default()
        }
    }

    fn scheduler(config: SchedulerConfig, stations: &[StationId]) -> SubframeScheduler {
        let mut sched = SubframeScheduler::new(config).unwrap();
        for &station in stations {
            sched.attach_station(station);
            sched
                .configure_channel(station, DL_LCID, Direction::Downlink, 9)
                .unwrap();
            sched
                .configure_channel(station, UL_LCG, Direction::Uplink, 9)
                .unwrap();
        }
        sched
    }

    fn queue(sched: &mut SubframeScheduler, station: StationId, bytes: u32) {
        sched
            .report_dl_queue(station, DL_LCID, &[bytes], &[0], bytes)
            .unwrap();
    }

    fn check_layout(plan: &AllocationPlan, config: &SchedulerConfig) {
        let first = plan.slots.first().unwrap();
        let last = plan.slots.last().unwrap();
        assert_eq!((first.kind, first.symbol_start, first.num_symbols), (SlotKind::DlControl, 0, 1));
        assert_eq!(
            (last.kind, last.symbol_start, last.num_symbols),
            (SlotKind::UlControl, config.symbols_per_subframe - 1, 1)
        );
        assert!(plan.used_symbols() <= config.symbols_per_subframe);

        let mut next = 1;
        let mut seen = FxHashSet::default();
        for slot in &plan.slots[1..plan.slots.len() - 1] {
            let grant = slot.grant.unwrap();
            assert_eq!(slot.symbol_start, next);
            assert_eq!(grant.symbol_start, slot.symbol_start);
            assert_eq!(slot.kind, SlotKind::data(grant.direction));
            assert!(grant.rv <= 3);
            assert!(seen.insert((grant.station, grant.direction)));
            next = grant.symbol_end();
        }
        assert!(next < config.symbols_per_subframe);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let result = SubframeScheduler::new(SchedulerConfig {
            num_harq_processes: 0,
            ..Default::default()
        });
        assert!(matches!(result, Err(SchedulerError::InvalidConfig(_))));
    }

    #[test]
    fn test_configure_channel_errors() {
        let mut sched = scheduler(config(), &[A]);
        assert_eq!(
            sched.configure_channel(A, 4, Direction::Downlink, 42),
            Err(SchedulerError::UnknownQosClass(42))
        );
        assert_eq!(
            sched.configure_channel(99, 4, Direction::Downlink, 9),
            Err(SchedulerError::UnknownStation(99))
        );
    }

    #[test]
    fn test_empty_subframe_has_only_control_slots() {
        let config = config();
        let mut sched = scheduler(config.clone(), &[A]);
        let plan = sched.on_subframe(3, 4).unwrap();
        assert_eq!(plan.slots.len(), 2);
        assert_eq!(plan.subframe_index, 35);
        check_layout(&plan, &config);
    }

    #[test]
    fn test_higher_mcs_is_served_first() {
        let config = config();
        let mut sched = scheduler(config.clone(), &[A, B]);
        assert_eq!(sched.report_dl_cqi(A, 6), Some(10));
        assert_eq!(sched.report_dl_cqi(B, 3), Some(4));
        queue(&mut sched, A, 2000);
        queue(&mut sched, B, 500);

        let plan = sched.on_subframe(0, 0).unwrap();
        check_layout(&plan, &config);

        let a = plan.grant_for(A, Direction::Downlink).unwrap();
        assert_eq!((a.symbol_start, a.num_symbols, a.mcs, a.tb_size), (1, 4, 10, 2036));
        assert_eq!((a.harq_process, a.rv, a.ndi), (0, 0, true));
        let b = plan.grant_for(B, Direction::Downlink).unwrap();
        assert_eq!((b.symbol_start, b.num_symbols, b.mcs, b.tb_size), (5, 4, 4, 653));

        assert_eq!(sched.buffered_bytes(A, Direction::Downlink), Some(0));
        assert_eq!(sched.buffered_bytes(B, Direction::Downlink), Some(0));
        assert_eq!(sched.stats().new_grants, 2);
    }

    #[test]
    fn test_budget_is_exhausted_by_one_station() {
        let mut sched = scheduler(config(), &[A, B]);
        sched.report_dl_cqi(A, 6);
        queue(&mut sched, A, 10_000);
        queue(&mut sched, B, 100);

        let plan = sched.on_subframe(0, 0).unwrap();
        let a = plan.grant_for(A, Direction::Downlink).unwrap();
        assert_eq!(a.num_symbols, 10);
        assert!(plan.grant_for(B, Direction::Downlink).is_none());
        assert_eq!(
            sched.buffered_bytes(A, Direction::Downlink),
            Some(10_000 - a.tb_size)
        );
        assert_eq!(sched.buffered_bytes(B, Direction::Downlink), Some(100));
    }

    #[test]
    fn test_directions_alternate_across_subframes() {
        let config = SchedulerConfig {
            symbols_per_subframe: 5,
            ..config()
        };
        let mut sched = scheduler(config.clone(), &[A]);
        queue(&mut sched, A, 1000);
        sched.report_ul_bsr(A, UL_LCG, 1000).unwrap();

        let plan = sched.on_subframe(0, 0).unwrap();
        check_layout(&plan, &config);
        assert_eq!(plan.grant_for(A, Direction::Downlink).unwrap().num_symbols, 2);
        let ul = plan.grant_for(A, Direction::Uplink).unwrap();
        assert_eq!((ul.symbol_start, ul.num_symbols), (3, 1));

        let plan = sched.on_subframe(0, 1).unwrap();
        assert_eq!(plan.grant_for(A, Direction::Downlink).unwrap().num_symbols, 1);
        assert_eq!(plan.grant_for(A, Direction::Uplink).unwrap().num_symbols, 2);
    }

    #[test]
    fn test_uplink_bytes_move_in_flight_until_ack() {
        let mut sched = scheduler(config(), &[A]);
        sched.report_ul_bsr(A, UL_LCG, 100).unwrap();

        let plan = sched.on_subframe(0, 0).unwrap();
        let ul = *plan.grant_for(A, Direction::Uplink).unwrap();
        assert_eq!((ul.num_symbols, ul.tb_size), (2, 161));
        let flow = sched.ul_flow(A, UL_LCG).unwrap();
        assert_eq!((flow.estimated, flow.inflight), (0, 100));

        // The same report again must not double count in-flight bytes
        assert_eq!(sched.report_ul_bsr(A, UL_LCG, 100), Some(0));

        sched.harq_feedback(A, Direction::Uplink, ul.harq_process, true);
        sched.on_subframe(0, 1).unwrap();
        assert_eq!(sched.ul_flow(A, UL_LCG).unwrap().inflight, 0);
    }

    #[test]
    fn test_ack_releases_only_the_group_it_carried() {
        let mut sched = scheduler(config(), &[A]);
        sched.configure_channel(A, 2, Direction::Uplink, 5).unwrap();

        sched.report_ul_bsr(A, 2, 100).unwrap();
        let first = *sched.on_subframe(0, 0).unwrap().grant_for(A, Direction::Uplink).unwrap();
        sched.report_ul_bsr(A, UL_LCG, 100).unwrap();
        let second = *sched.on_subframe(0, 1).unwrap().grant_for(A, Direction::Uplink).unwrap();
        assert_eq!((first.harq_process, second.harq_process), (0, 1));
        assert_eq!(sched.busy_processes(A, Direction::Uplink), Some(2));

        sched.harq_feedback(A, Direction::Uplink, second.harq_process, true);
        sched.on_subframe(0, 2).unwrap();
        assert_eq!(sched.ul_flow(A, UL_LCG).unwrap().inflight, 0);
        assert_eq!(sched.ul_flow(A, 2).unwrap().inflight, 100);
        assert_eq!(sched.busy_processes(A, Direction::Uplink), Some(1));

        // Group 2 still in flight: the same report is not counted again
        assert_eq!(sched.report_ul_bsr(A, 2, 100), Some(0));
        assert_eq!(sched.buffered_bytes(A, Direction::Uplink), Some(0));
    }

    #[test]
    fn test_default_mcs_without_valid_cqi() {
        let config = SchedulerConfig {
            cqi_validity: 3,
            ..config()
        };
        let mut sched = scheduler(config, &[A]);
        assert_eq!(sched.current_mcs(A, Direction::Downlink), Some(1));
        assert_eq!(sched.current_mcs(A, Direction::Uplink), Some(1));

        sched.report_dl_cqi(A, 6);
        assert_eq!(sched.dl_cqi(A), Some(6));
        assert_eq!(sched.current_mcs(A, Direction::Downlink), Some(10));
        for subframe in 0..3 {
            sched.on_subframe(0, subframe).unwrap();
        }
        assert_eq!(sched.dl_cqi(A), None);
        assert_eq!(sched.current_mcs(A, Direction::Downlink), Some(1));

        queue(&mut sched, A, 100);
        let plan = sched.on_subframe(0, 3).unwrap();
        let grant = plan.grant_for(A, Direction::Downlink).unwrap();
        assert_eq!((grant.mcs, grant.num_symbols, grant.tb_size), (1, 2, 161));
    }

    #[test]
    fn test_fixed_mcs_overrides_cqi() {
        let config = SchedulerConfig {
            fixed_mcs_dl: Some(20),
            ..config()
        };
        let mut sched = scheduler(config, &[A]);
        sched.report_dl_cqi(A, 2);
        assert_eq!(sched.current_mcs(A, Direction::Downlink), Some(20));
        assert_eq!(sched.current_mcs(A, Direction::Uplink), Some(1));
    }

    #[test]
    fn test_nack_climbs_redundancy_versions_then_drops() {
        let config = config();
        let mut sched = scheduler(config.clone(), &[A]);
        queue(&mut sched, A, 100);

        let plan = sched.on_subframe(0, 0).unwrap();
        let first = *plan.grant_for(A, Direction::Downlink).unwrap();
        assert_eq!((first.harq_process, first.rv, first.ndi), (0, 0, true));

        for (subframe, rv) in [(1, 1), (2, 2), (3, 3)] {
            sched.harq_feedback(A, Direction::Downlink, 0, false);
            let plan = sched.on_subframe(0, subframe).unwrap();
            check_layout(&plan, &config);
            let retx = plan.grant_for(A, Direction::Downlink).unwrap();
            assert_eq!((retx.harq_process, retx.rv, retx.ndi), (0, rv, false));
            assert_eq!((retx.num_symbols, retx.tb_size), (first.num_symbols, first.tb_size));
            assert_eq!(
                sched.harq_state(A, Direction::Downlink, 0),
                Some(ProcessState::Busy { rv, timeout: 0 })
            );
        }

        sched.harq_feedback(A, Direction::Downlink, 0, false);
        let plan = sched.on_subframe(0, 4).unwrap();
        assert!(plan.grant_for(A, Direction::Downlink).is_none());
        assert_eq!(
            plan.events,
            vec![SchedulerEvent::Loss(LossEvent {
                station: A,
                direction: Direction::Downlink,
                harq_process: 0,
                rv: 3,
                bytes: first.tb_size,
                reason: LossReason::RetryLimit,
            })]
        );
        assert_eq!(sched.harq_state(A, Direction::Downlink, 0), Some(ProcessState::Free));
        assert_eq!(sched.stats().retransmissions, 3);
        assert_eq!(sched.stats().lost_blocks, 1);
    }

    #[test]
    fn test_disabled_harq_drops_on_first_nack() {
        let config = SchedulerConfig {
            harq_enabled: false,
            ..config()
        };
        let mut sched = scheduler(config, &[A]);
        queue(&mut sched, A, 100);
        sched.on_subframe(0, 0).unwrap();

        sched.harq_feedback(A, Direction::Downlink, 0, false);
        let plan = sched.on_subframe(0, 1).unwrap();
        assert_eq!(plan.num_grants(), 0);
        assert!(matches!(
            plan.events.as_slice(),
            [SchedulerEvent::Loss(LossEvent {
                reason: LossReason::HarqDisabled,
                ..
            })]
        ));
    }

    #[test]
    fn test_retransmission_deferred_when_it_does_not_fit() {
        let mut sched = scheduler(config(), &[A]);
        queue(&mut sched, A, 10_000);

        let p0 = *sched.on_subframe(0, 0).unwrap().grant_for(A, Direction::Downlink).unwrap();
        let p1 = *sched.on_subframe(0, 1).unwrap().grant_for(A, Direction::Downlink).unwrap();
        assert_eq!((p0.harq_process, p0.num_symbols), (0, 10));
        assert_eq!((p1.harq_process, p1.num_symbols), (1, 10));

        sched.harq_feedback(A, Direction::Downlink, 0, false);
        sched.harq_feedback(A, Direction::Downlink, 1, false);
        let plan = sched.on_subframe(0, 2).unwrap();
        let retx = plan.grant_for(A, Direction::Downlink).unwrap();
        assert_eq!((retx.harq_process, retx.rv), (0, 1));
        assert_eq!(plan.num_grants(), 1);
        assert_eq!(
            plan.events,
            vec![SchedulerEvent::RetransmissionDeferred {
                station: A,
                direction: Direction::Downlink,
                harq_process: 1,
                rv: 0,
                num_symbols: 10,
            }]
        );
        assert_eq!(sched.pending_retransmissions(), 1);

        let plan = sched.on_subframe(0, 3).unwrap();
        let retx = plan.grant_for(A, Direction::Downlink).unwrap();
        assert_eq!((retx.harq_process, retx.rv), (1, 1));
        assert_eq!(sched.pending_retransmissions(), 0);
    }

    #[test]
    fn test_missing_feedback_times_out() {
        let config = SchedulerConfig {
            harq_timeout: 3,
            ..config()
        };
        let mut sched = scheduler(config, &[A]);
        queue(&mut sched, A, 100);
        let grant = *sched.on_subframe(0, 0).unwrap().grant_for(A, Direction::Downlink).unwrap();

        assert!(sched.on_subframe(0, 1).unwrap().events.is_empty());
        assert!(sched.on_subframe(0, 2).unwrap().events.is_empty());
        let plan = sched.on_subframe(0, 3).unwrap();
        assert_eq!(
            plan.events,
            vec![SchedulerEvent::Loss(LossEvent {
                station: A,
                direction: Direction::Downlink,
                harq_process: 0,
                rv: 0,
                bytes: grant.tb_size,
                reason: LossReason::Timeout,
            })]
        );
        assert_eq!(sched.harq_state(A, Direction::Downlink, 0), Some(ProcessState::Free));
    }

    #[test]
    fn test_harq_exhaustion_is_reported() {
        let config = SchedulerConfig {
            num_harq_processes: 1,
            ..config()
        };
        let mut sched = scheduler(config, &[A]);
        queue(&mut sched, A, 10_000);
        assert_eq!(sched.on_subframe(0, 0).unwrap().num_grants(), 1);

        let plan = sched.on_subframe(0, 1).unwrap();
        assert_eq!(plan.num_grants(), 0);
        assert_eq!(
            plan.events,
            vec![SchedulerEvent::HarqExhausted {
                station: A,
                direction: Direction::Downlink,
            }]
        );
    }

    #[test]
    fn test_late_feedback_after_detach_is_ignored() {
        let mut plans = Vec::new();
        for late_feedback in [false, true] {
            let mut sched = scheduler(config(), &[A, B]);
            queue(&mut sched, A, 5000);
            queue(&mut sched, B, 300);
            sched.on_subframe(0, 0).unwrap();

            assert!(sched.detach_station(B));
            assert!(!sched.detach_station(B));
            if late_feedback {
                sched.harq_feedback(B, Direction::Downlink, 0, false);
            }
            plans.push(sched.on_subframe(0, 1).unwrap());
            assert_eq!(sched.stats().ignored_reports, late_feedback as u64);
            assert_eq!(sched.buffered_bytes(B, Direction::Downlink), None);
        }
        assert_eq!(plans[0], plans[1]);
        assert!(plans[0].grant_for(B, Direction::Downlink).is_none());
    }

    #[test]
    fn test_detach_discards_pending_retransmissions() {
        let mut sched = scheduler(config(), &[A]);
        queue(&mut sched, A, 10_000);
        sched.on_subframe(0, 0).unwrap();
        sched.on_subframe(0, 1).unwrap();
        sched.harq_feedback(A, Direction::Downlink, 0, false);
        sched.harq_feedback(A, Direction::Downlink, 1, false);
        sched.on_subframe(0, 2).unwrap();
        assert_eq!(sched.pending_retransmissions(), 1);

        sched.detach_station(A);
        assert_eq!(sched.pending_retransmissions(), 0);
        assert_eq!(sched.on_subframe(0, 3).unwrap().num_grants(), 0);

        // Reattach starts from clean tables
        sched.attach_station(A);
        assert_eq!(sched.harq_state(A, Direction::Downlink, 0), Some(ProcessState::Free));
        assert_eq!(sched.buffered_bytes(A, Direction::Downlink), Some(0));
    }

    #[test]
    fn test_uplink_cqi_attributed_at_most_once() {
        let mut sched = scheduler(config(), &[A]);
        sched.report_ul_bsr(A, UL_LCG, 500).unwrap();
        let plan = sched.on_subframe(0, 0).unwrap();
        let ul = *plan.grant_for(A, Direction::Uplink).unwrap();

        assert_eq!(sched.pending_ul_allocations(), 1);

        let sinr = vec![100.0; 72];
        assert_eq!(sched.report_ul_cqi(plan.subframe_index, ul.symbol_start, &sinr), Some(A));
        assert_eq!(sched.current_mcs(A, Direction::Uplink), Some(mcs_from_sinr(100.0)));
        assert_eq!(sched.ul_sinr(A), Some(sinr.as_slice()));
        assert_eq!(sched.pending_ul_allocations(), 0);
        assert_eq!(sched.report_ul_cqi(plan.subframe_index, ul.symbol_start, &sinr), None);
        assert_eq!(sched.report_ul_cqi(plan.subframe_index + 5, 1, &sinr), None);
        assert_eq!(sched.stats().ignored_reports, 2);
    }

    #[test]
    fn test_reports_for_unknown_station_are_ignored() {
        let mut sched = scheduler(config(), &[A]);
        assert_eq!(sched.report_dl_queue(77, DL_LCID, &[10], &[0], 10), None);
        assert_eq!(sched.report_ul_bsr(77, UL_LCG, 10), None);
        assert_eq!(sched.report_dl_cqi(77, 5), None);
        assert!(!sched.report_dl_rlc_status(77, DL_LCID, 10, 10));
        // Configured station, unconfigured channel
        assert_eq!(sched.report_dl_queue(A, 9, &[10], &[0], 10), None);
        assert_eq!(sched.stats().ignored_reports, 5);
    }

    #[test]
    fn test_rlc_status_is_served_with_new_data() {
        let mut sched = scheduler(config(), &[A]);
        queue(&mut sched, A, 50);
        assert!(sched.report_dl_rlc_status(A, DL_LCID, 20, 5));
        assert_eq!(sched.buffered_bytes(A, Direction::Downlink), Some(75));

        sched.on_subframe(0, 0).unwrap();
        let flow = sched.dl_flow(A, DL_LCID).unwrap();
        assert_eq!((flow.status_queue, flow.retx_queue, flow.tx_queue), (0, 0, 0));
    }

    #[test]
    fn test_throughput_tracks_dispatched_bytes() {
        let config = SchedulerConfig {
            throughput_alpha: 0.5,
            ..config()
        };
        let mut sched = scheduler(config, &[A]);
        queue(&mut sched, A, 100);
        sched.on_subframe(0, 0).unwrap();
        assert!((sched.throughput(A, Direction::Downlink).unwrap() - 50.0).abs() < 1e-9);
        sched.on_subframe(0, 1).unwrap();
        assert!((sched.throughput(A, Direction::Downlink).unwrap() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_bytes_removed_match_block_size() {
        let mut sched = scheduler(config(), &[A, B]);
        sched.report_dl_cqi(B, 9);
        queue(&mut sched, A, 300);
        queue(&mut sched, B, 4321);

        let plan = sched.on_subframe(0, 0).unwrap();
        for (station, before) in [(A, 300), (B, 4321)] {
            let after = sched.buffered_bytes(station, Direction::Downlink).unwrap();
            let tb_size = plan
                .grant_for(station, Direction::Downlink)
                .map_or(0, |g| g.tb_size);
            assert_eq!(before - after, tb_size.min(before));
        }
    }

    #[test]
    fn test_random_traffic_keeps_plans_consistent() {
        let config = SchedulerConfig {
            harq_timeout: 8,
            cqi_validity: 20,
            ..config()
        };
        let mut sched = scheduler(config.clone(), &[]);
        let mut rng = StdRng::seed_from_u64(7);
        let stations: Vec<StationId> = (1..=8).collect();
        let mut last_grants: Vec<Grant> = Vec::new();

        for tick in 0..400u32 {
            for &station in &stations {
                if !sched.is_attached(station) {
                    if rng.random_bool(0.3) {
                        sched.attach_station(station);
                        sched
                            .configure_channel(station, DL_LCID, Direction::Downlink, 9)
                            .unwrap();
                        sched
                            .configure_channel(station, UL_LCG, Direction::Uplink, 7)
                            .unwrap();
                    }
                    continue;
                }
                if rng.random_bool(0.02) {
                    sched.detach_station(station);
                    continue;
                }
                if rng.random_bool(0.4) {
                    let pending = sched.dl_flow(station, DL_LCID).map_or(0, |f| f.pending());
                    let add = rng.random_range(0..3000);
                    sched.report_dl_queue(station, DL_LCID, &[add], &[0], pending + add);
                }
                if rng.random_bool(0.3) {
                    sched.report_ul_bsr(station, UL_LCG, rng.random_range(0..3000));
                }
                if rng.random_bool(0.2) {
                    sched.report_dl_cqi(station, rng.random_range(0..16));
                }
            }
            for grant in last_grants.drain(..) {
                if rng.random_bool(0.9) {
                    sched.harq_feedback(grant.station, grant.direction, grant.harq_process, rng.random_bool(0.7));
                }
            }

            let plan = sched
                .on_subframe(tick / config.subframes_per_frame, tick % config.subframes_per_frame)
                .unwrap();
            check_layout(&plan, &config);

            let mut processes = FxHashSet::default();
            for grant in plan.grants() {
                assert!(sched.is_attached(grant.station));
                assert!(processes.insert((grant.station, grant.direction, grant.harq_process)));
                assert!(matches!(
                    sched.harq_state(grant.station, grant.direction, grant.harq_process),
                    Some(ProcessState::Busy { rv, .. }) if rv == grant.rv
                ));
                if grant.direction == Direction::Uplink && rng.random_bool(0.5) {
                    sched.report_ul_cqi(plan.subframe_index, grant.symbol_start, &[rng.random_range(1.0..500.0); 72]);
                }
            }
            last_grants = plan.grants().copied().collect();
        }
        assert_eq!(sched.stats().subframes, 400);
        assert!(sched.stats().new_grants > 0);
    }
}
