//! Per-station, per-logical-channel byte accounting.
//!
//! Downlink flows track three sub-queues fed by RLC reports: status,
//! retransmit and fresh transmit. Uplink flows track an estimate derived
//! from buffer status reports plus the bytes already granted but not yet
//! acknowledged.

use rustc_hash::FxHashMap;

use crate::arena::StationHandle;
use crate::models::{Direction, QosClass, RlcPdu};

/// A queued packet as last reported (or synthesized from a BSR).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingPacket {
    pub size: u32,
    pub delay_us: u32,
}

/// Downlink logical channel.
#[derive(Clone, Debug, PartialEq)]
pub struct DlFlow {
    pub lcid: u8,
    pub qos: QosClass,
    pub status_queue: u32,
    pub retx_queue: u32,
    pub tx_queue: u32,
    /// Worst head-of-line delay in the latest report.
    pub hol_delay_us: u32,
    pub deadline_ms: Option<u32>,
    pub packets: Vec<PendingPacket>,
}

impl DlFlow {
    fn new(lcid: u8, qos: QosClass) -> Self {
        Self {
            lcid,
            qos,
            status_queue: 0,
            retx_queue: 0,
            tx_queue: 0,
            hol_delay_us: 0,
            deadline_ms: qos.deadline_ms(),
            packets: Vec::new(),
        }
    }

    /// Bytes waiting in all three sub-queues.
    pub fn pending(&self) -> u32 {
        self.status_queue
            .saturating_add(self.retx_queue)
            .saturating_add(self.tx_queue)
    }

    /// Remove up to `bytes`: status first, then retransmit, then fresh data.
    fn consume(&mut self, bytes: u32) -> u32 {
        let mut remaining = bytes;
        for queue in [
            &mut self.status_queue,
            &mut self.retx_queue,
            &mut self.tx_queue,
        ] {
            let take = remaining.min(*queue);
            *queue -= take;
            remaining -= take;
        }
        let consumed = bytes - remaining;
        trim_packets(&mut self.packets, self.tx_queue);
        self.hol_delay_us = worst_delay(&self.packets);
        consumed
    }
}

/// Uplink logical channel group.
#[derive(Clone, Debug, PartialEq)]
pub struct UlFlow {
    pub lcg: u8,
    pub qos: QosClass,
    /// Bytes believed queued at the station and not yet granted.
    pub estimated: u32,
    /// Bytes granted but not yet acknowledged.
    pub inflight: u32,
    pub hol_delay_us: u32,
    pub packets: Vec<PendingPacket>,
}

impl UlFlow {
    fn new(lcg: u8, qos: QosClass) -> Self {
        Self {
            lcg,
            qos,
            estimated: 0,
            inflight: 0,
            hol_delay_us: 0,
            packets: Vec::new(),
        }
    }

    fn consume(&mut self, bytes: u32) -> u32 {
        let take = bytes.min(self.estimated);
        self.estimated -= take;
        self.inflight = self.inflight.saturating_add(take);
        trim_packets(&mut self.packets, self.estimated);
        self.hol_delay_us = worst_delay(&self.packets);
        take
    }
}

/// Drop packets from the head until the list carries no more than `remaining` bytes.
fn trim_packets(packets: &mut Vec<PendingPacket>, remaining: u32) {
    let mut total: u64 = packets.iter().map(|p| p.size as u64).sum();
    let mut drop = 0;
    for packet in packets.iter_mut() {
        if total <= remaining as u64 {
            break;
        }
        let excess = (total - remaining as u64).min(packet.size as u64) as u32;
        packet.size -= excess;
        total -= excess as u64;
        if packet.size == 0 {
            drop += 1;
        }
    }
    packets.drain(..drop);
}

fn worst_delay(packets: &[PendingPacket]) -> u32 {
    packets.iter().map(|p| p.delay_us).max().unwrap_or(0)
}

/// Byte accounting for every attached station.
#[derive(Debug, Clone)]
pub struct BufferAccountant {
    subframe_period_us: u32,
    dl: FxHashMap<StationHandle, Vec<DlFlow>>,
    ul: FxHashMap<StationHandle, Vec<UlFlow>>,
}

impl BufferAccountant {
    pub fn new(subframe_period_us: u32) -> Self {
        Self {
            subframe_period_us,
            dl: FxHashMap::default(),
            ul: FxHashMap::default(),
        }
    }

    pub fn add_station(&mut self, handle: StationHandle) {
        self.dl.entry(handle).or_default();
        self.ul.entry(handle).or_default();
    }

    pub fn remove_station(&mut self, handle: StationHandle) {
        self.dl.remove(&handle);
        self.ul.remove(&handle);
    }

    pub fn has_station(&self, handle: StationHandle) -> bool {
        self.dl.contains_key(&handle) && self.ul.contains_key(&handle)
    }

    /// Create (or reclassify) a logical channel. Returns false for an unknown station.
    pub fn configure_channel(
        &mut self,
        handle: StationHandle,
        channel: u8,
        direction: Direction,
        qos: QosClass,
    ) -> bool {
        match direction {
            Direction::Downlink => {
                let Some(flows) = self.dl.get_mut(&handle) else {
                    return false;
                };
                match flows.iter_mut().find(|f| f.lcid == channel) {
                    Some(flow) => {
                        flow.qos = qos;
                        flow.deadline_ms = qos.deadline_ms();
                    }
                    None => flows.push(DlFlow::new(channel, qos)),
                }
                flows.sort_by_key(|f| (f.qos.priority_x10, f.lcid));
            }
            Direction::Uplink => {
                let Some(flows) = self.ul.get_mut(&handle) else {
                    return false;
                };
                match flows.iter_mut().find(|f| f.lcg == channel) {
                    Some(flow) => flow.qos = qos,
                    None => flows.push(UlFlow::new(channel, qos)),
                }
                flows.sort_by_key(|f| (f.qos.priority_x10, f.lcg));
            }
        }
        true
    }

    /// Remove a logical channel and whatever it still had queued.
    pub fn release_channel(&mut self, handle: StationHandle, channel: u8, direction: Direction) -> bool {
        match direction {
            Direction::Downlink => self.dl.get_mut(&handle).is_some_and(|flows| {
                let before = flows.len();
                flows.retain(|f| f.lcid != channel);
                flows.len() != before
            }),
            Direction::Uplink => self.ul.get_mut(&handle).is_some_and(|flows| {
                let before = flows.len();
                flows.retain(|f| f.lcg != channel);
                flows.len() != before
            }),
        }
    }

    /// Apply a downlink queue report.
    ///
    /// The report covers the fresh-transmit queue only. The packet list is
    /// replaced; only bytes above what that queue already tracks are added. Returns the bytes
    /// added, or `None` if the channel is not configured.
    pub fn update_downlink_queue(
        &mut self,
        handle: StationHandle,
        lcid: u8,
        sizes: &[u32],
        delays_us: &[u32],
        total_bytes: u32,
    ) -> Option<u32> {
        let flow = self
            .dl
            .get_mut(&handle)?
            .iter_mut()
            .find(|f| f.lcid == lcid)?;

        flow.packets = sizes
            .iter()
            .enumerate()
            .map(|(i, &size)| PendingPacket {
                size,
                delay_us: delays_us.get(i).copied().unwrap_or(0),
            })
            .collect();
        flow.hol_delay_us = delays_us.iter().copied().max().unwrap_or(0);

        let delta = total_bytes.saturating_sub(flow.tx_queue);
        flow.tx_queue = flow.tx_queue.saturating_add(delta);
        Some(delta)
    }

    /// Replace the status and retransmit sub-queues of a downlink channel.
    pub fn update_downlink_rlc_status(
        &mut self,
        handle: StationHandle,
        lcid: u8,
        retx_bytes: u32,
        status_bytes: u32,
    ) -> bool {
        let Some(flow) = self
            .dl
            .get_mut(&handle)
            .and_then(|flows| flows.iter_mut().find(|f| f.lcid == lcid))
        else {
            return false;
        };
        flow.retx_queue = retx_bytes;
        flow.status_queue = status_bytes;
        true
    }

    /// Fold a buffer status report into the uplink estimate.
    ///
    /// Bytes already estimated or in flight are not counted again; the
    /// surplus becomes a synthetic packet with a one-subframe delay. A
    /// report below the current estimate lowers it. Returns the bytes
    /// added, or `None` if the group is not configured.
    pub fn update_uplink_estimate(
        &mut self,
        handle: StationHandle,
        lcg: u8,
        reported_bytes: u32,
    ) -> Option<u32> {
        let period = self.subframe_period_us;
        let flow = self
            .ul
            .get_mut(&handle)?
            .iter_mut()
            .find(|f| f.lcg == lcg)?;

        if reported_bytes < flow.estimated {
            flow.estimated = reported_bytes;
            trim_packets(&mut flow.packets, flow.estimated);
        }
        let known = flow.estimated.saturating_add(flow.inflight);
        let delta = reported_bytes.saturating_sub(known);
        if delta > 0 {
            flow.estimated += delta;
            flow.packets.push(PendingPacket {
                size: delta,
                delay_us: period,
            });
        }
        flow.hol_delay_us = worst_delay(&flow.packets);
        Some(delta)
    }

    /// Remove dispatched bytes from one channel. Returns the bytes actually removed.
    pub fn consume(
        &mut self,
        handle: StationHandle,
        channel: u8,
        direction: Direction,
        bytes: u32,
    ) -> u32 {
        match direction {
            Direction::Downlink => self
                .dl
                .get_mut(&handle)
                .and_then(|flows| flows.iter_mut().find(|f| f.lcid == channel))
                .map_or(0, |f| f.consume(bytes)),
            Direction::Uplink => self
                .ul
                .get_mut(&handle)
                .and_then(|flows| flows.iter_mut().find(|f| f.lcg == channel))
                .map_or(0, |f| f.consume(bytes)),
        }
    }

    /// Fill a transport block of `tb_size` bytes from the station's channels
    /// in QoS priority order. Returns the per-channel byte split.
    pub fn dispatch(&mut self, handle: StationHandle, direction: Direction, tb_size: u32) -> Vec<RlcPdu> {
        let channels: Vec<u8> = match direction {
            Direction::Downlink => self
                .dl
                .get(&handle)
                .map(|flows| flows.iter().filter(|f| f.pending() > 0).map(|f| f.lcid).collect()),
            Direction::Uplink => self
                .ul
                .get(&handle)
                .map(|flows| flows.iter().filter(|f| f.estimated > 0).map(|f| f.lcg).collect()),
        }
        .unwrap_or_default();

        let mut remaining = tb_size;
        let mut pdus = Vec::new();
        for lcid in channels {
            if remaining == 0 {
                break;
            }
            let size = self.consume(handle, lcid, direction, remaining);
            if size > 0 {
                remaining -= size;
                pdus.push(RlcPdu { lcid, size });
            }
        }
        pdus
    }

    /// Release uplink bytes of one channel group that were acknowledged or lost.
    ///
    /// Returns the bytes actually released.
    pub fn release_inflight(&mut self, handle: StationHandle, lcg: u8, bytes: u32) -> u32 {
        let Some(flow) = self
            .ul
            .get_mut(&handle)
            .and_then(|flows| flows.iter_mut().find(|f| f.lcg == lcg))
        else {
            return 0;
        };
        let take = bytes.min(flow.inflight);
        flow.inflight -= take;
        take
    }

    /// Bytes waiting to be scheduled for a station in one direction.
    pub fn buffered(&self, handle: StationHandle, direction: Direction) -> u32 {
        match direction {
            Direction::Downlink => self.dl.get(&handle).map_or(0, |flows| {
                flows.iter().fold(0u32, |acc, f| acc.saturating_add(f.pending()))
            }),
            Direction::Uplink => self.ul.get(&handle).map_or(0, |flows| {
                flows.iter().fold(0u32, |acc, f| acc.saturating_add(f.estimated))
            }),
        }
    }

    /// Worst head-of-line delay across a station's channels.
    pub fn hol_delay_us(&self, handle: StationHandle, direction: Direction) -> u32 {
        let worst = match direction {
            Direction::Downlink => self
                .dl
                .get(&handle)
                .and_then(|flows| flows.iter().map(|f| f.hol_delay_us).max()),
            Direction::Uplink => self
                .ul
                .get(&handle)
                .and_then(|flows| flows.iter().map(|f| f.hol_delay_us).max()),
        };
        worst.unwrap_or(0)
    }

    pub fn dl_flow(&self, handle: StationHandle, lcid: u8) -> Option<&DlFlow> {
        self.dl.get(&handle)?.iter().find(|f| f.lcid == lcid)
    }

    pub fn ul_flow(&self, handle: StationHandle, lcg: u8) -> Option<&UlFlow> {
        self.ul.get(&handle)?.iter().find(|f| f.lcg == lcg)
    }
}
