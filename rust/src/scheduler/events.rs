//! Recoverable scheduling events and running counters.

use crate::models::{Direction, LossEvent, StationId};

/// Record of a recoverable condition raised while building a plan.
///
/// Attached to the emitted plan so the host can see every deferral and
/// every permanent loss.
#[derive(Clone, Debug, PartialEq)]
pub enum SchedulerEvent {
    /// A transport block was permanently discarded.
    Loss(LossEvent),
    /// A station had data but every HARQ process in that direction was busy.
    HarqExhausted {
        station: StationId,
        direction: Direction,
    },
    /// A pending retransmission did not fit and was carried to the next subframe.
    RetransmissionDeferred {
        station: StationId,
        direction: Direction,
        harq_process: u8,
        rv: u8,
        num_symbols: u32,
    },
}

/// Counters accumulated across every subframe since construction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub subframes: u64,
    pub new_grants: u64,
    pub retransmissions: u64,
    pub deferred_retransmissions: u64,
    pub harq_exhausted: u64,
    pub lost_blocks: u64,
    pub lost_bytes: u64,
    /// Reports dropped because the station or process was unknown.
    pub ignored_reports: u64,
}

impl SchedulerStats {
    /// Fold one event into the counters.
    pub fn record(&mut self, event: &SchedulerEvent) {
        match event {
            SchedulerEvent::Loss(loss) => {
                self.lost_blocks += 1;
                self.lost_bytes += loss.bytes as u64;
            }
            SchedulerEvent::HarqExhausted { .. } => self.harq_exhausted += 1,
            SchedulerEvent::RetransmissionDeferred { .. } => self.deferred_retransmissions += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LossReason;

    #[test]
    fn test_stats_record() {
        let mut stats = SchedulerStats::default();
        stats.record(&SchedulerEvent::Loss(LossEvent {
            station: 1,
            direction: Direction::Downlink,
            harq_process: 0,
            rv: 3,
            bytes: 1500,
            reason: LossReason::RetryLimit,
        }));
        stats.record(&SchedulerEvent::HarqExhausted {
            station: 1,
            direction: Direction::Uplink,
        });
        assert_eq!(stats.lost_blocks, 1);
        assert_eq!(stats.lost_bytes, 1500);
        assert_eq!(stats.harq_exhausted, 1);
        assert_eq!(stats.deferred_retransmissions, 0);
    }
}
