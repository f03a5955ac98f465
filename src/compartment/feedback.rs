//! Inbound peer-message processing: acknowledgment analysis and the
//! resulting active-state switch.
//!
//! The peer acknowledges a saved state by echoing its `(priority, zid)` pair
//! as a 4-byte feedback item. An acknowledged state only becomes the new
//! compression basis if the peer can be proven to still hold it: the peer
//! evicts by priority, so every state that may still compete for its memory
//! is charged against the known capacity first.

use tracing::{debug, warn};

use crate::telemetry::TelemetryEvent;
use crate::types::{FullStateId, Priority, SequenceId, StateKey};
use crate::wire::params::parse_feedback_item;

use super::DynCompartment;

/// What the caller hands over when a message arrives from the peer.
#[derive(Debug, Clone, Copy)]
pub struct PeerFeedback<'a> {
    /// The returned feedback item extracted from the inbound message; empty
    /// when the peer echoed nothing.
    pub returned_feedback_item: &'a [u8],
    /// The peer's state memory size as announced in the inbound message.
    pub remote_sms: usize,
}

/// Result of processing one inbound peer message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackOutcome {
    /// No feedback item was present.
    NoFeedback,
    /// The feedback item was malformed, referenced an unknown state, or
    /// arrived for a state already slated for removal.
    StaleOrUnknown,
    /// A message was acknowledged but the compression basis did not change.
    /// Covers both a saved state the peer cannot be proven to hold and a
    /// message that never asked the peer to save one.
    Acknowledged,
    /// A state was acknowledged and became the new compression basis.
    ActiveChanged,
}

/// What the acknowledgment lookup established, before any basis switch.
enum AckResult {
    /// Unknown state, or one already slated for removal.
    Stale,
    /// The acked message created no state; delivery is all it confirmed.
    Delivered,
    /// A saved state was acknowledged.
    Saved { key: StateKey, usable: bool },
}

impl DynCompartment {
    /// Processes one inbound peer message.
    ///
    /// Always advances the peer-message counters; feedback analysis and any
    /// active-state switch happen on top of that.
    pub fn on_peer_message(&mut self, feedback: &PeerFeedback<'_>) -> FeedbackOutcome {
        self.cur_time += 1;
        self.cur_time_sec = self.clock.now_secs();
        self.last_peer_message_num = self.cur_time;
        self.last_peer_message_time = self.cur_time_sec;

        let Some((prio, zid)) = parse_feedback_item(feedback.returned_feedback_item) else {
            if !feedback.returned_feedback_item.is_empty() {
                debug!(
                    len = feedback.returned_feedback_item.len(),
                    "ignoring malformed feedback item"
                );
                self.telemetry.record(TelemetryEvent::FeedbackIgnored);
            }
            return FeedbackOutcome::NoFeedback;
        };

        if !self.peer_info_known {
            // First feedback: the peer demonstrably saved the bootstrap
            // state, so its real capacity replaces the configured hint.
            self.peer_info_known = true;
            let init_size = self.table[self.init_key].state_size;
            self.peer_comp_size = feedback.remote_sms.saturating_sub(init_size);
            self.table[self.init_key].includes_bytecode = true;
            debug!(peer_comp_size = self.peer_comp_size, "peer capacity locked in");
        }

        match self.ack_state(prio, zid) {
            AckResult::Stale => {
                self.telemetry.record(TelemetryEvent::FeedbackIgnored);
                FeedbackOutcome::StaleOrUnknown
            }
            AckResult::Delivered => FeedbackOutcome::Acknowledged,
            AckResult::Saved { key, usable } => {
                if usable && self.table[key].fid.outranks(&self.active_fid()) {
                    match self.change_active(key) {
                        Ok(()) => {
                            self.clear_unneeded_states();
                            FeedbackOutcome::ActiveChanged
                        }
                        Err(e) => {
                            warn!(error = %e, "active state switch failed, keeping old basis");
                            FeedbackOutcome::Acknowledged
                        }
                    }
                } else {
                    FeedbackOutcome::Acknowledged
                }
            }
        }
    }

    /// Marks the state `(prio, zid)` acknowledged and decides whether the
    /// peer can be proven to still hold it.
    fn ack_state(&mut self, prio: Priority, zid: SequenceId) -> AckResult {
        let Some(key) = self.table.find_by_wire_fid(prio, zid) else {
            debug!(%prio, %zid, "ack for unknown state");
            return AckResult::Stale;
        };

        // An acknowledgment is a round trip: widen the trip-time ceiling if
        // this one took longer than anything seen before.
        let trip = (self.cur_time_sec.saturating_sub(self.table[key].send_time_sec) + 1) >> 1;
        if trip > self.max_trip_time {
            debug!(trip, "trip time ceiling widened");
            self.max_trip_time = trip;
        }

        if self.table[key].delete_requests_sent > 0 {
            // We already asked the peer to drop it; treat the ack as stale.
            debug!(fid = %self.table[key].fid, "ack for state slated for removal");
            return AckResult::Stale;
        }

        let mut removed: Vec<FullStateId> = Vec::new();
        if !self.table[key].acked {
            let node = &mut self.table[key];
            node.acked = true;
            node.acked_time = self.cur_time;
            node.acked_time_sec = self.cur_time_sec;
            removed = node.remove_requests.clone();

            // The peer executed this message, removal requests included.
            for fid in &removed {
                if let Some(k) = self.table.find_by_fid(*fid) {
                    self.delete_state(k);
                }
            }

            if !self.table[key].creates_state {
                // Nothing was saved; the ack only told us the message arrived.
                self.delete_state(key);
                return AckResult::Delivered;
            }
            self.table.unlink_dependent(key);
        }

        if !self.table[key].fid.outranks(&self.active_fid()) {
            return AckResult::Saved { key, usable: false };
        }

        // Charge every state that may still compete for peer memory at the
        // moment this state was saved. States provably gone by then are
        // excluded:
        //   1. below-priority states that already served as the basis,
        //   2. states whose message had certainly arrived (and was evicted)
        //      before this one was sent,
        //   3. states acknowledged before this one was sent, at or below its
        //      priority,
        //   4. states compressed against a state this message removed, at or
        //      below its priority.
        let a_prio = self.table[key].fid.prio;
        let a_send_time = self.table[key].send_time;
        let min_arrive = self.table[key].send_time_sec;
        let mut high_demand = 0usize;
        let mut low_demand = 0usize;
        for &k in self.table.order() {
            let cur = &self.table[k];
            let excluded = (cur.served_as_active && cur.fid.prio < a_prio)
                || (cur.fid.prio <= a_prio
                    && min_arrive > cur.send_time_sec + self.max_trip_time)
                || (cur.acked && cur.acked_time <= a_send_time && cur.fid.prio <= a_prio)
                || (cur.fid.prio <= a_prio && removed.contains(&cur.dfid));
            if excluded || !cur.creates_state {
                continue;
            }
            if cur.fid.prio >= a_prio {
                high_demand += cur.state_size;
            } else {
                low_demand = low_demand.max(cur.state_size);
            }
        }

        let demands = high_demand + low_demand;
        let usable = self.table[key].creates_state && demands <= self.peer_comp_size;
        debug!(fid = %self.table[key].fid, demands, usable, "acknowledgment analyzed");
        AckResult::Saved { key, usable }
    }

    /// After a basis switch, drops the caches of every state that can no
    /// longer become the basis (everything at or below the new active
    /// priority). The nodes stay tracked for the peer-capacity model.
    fn clear_unneeded_states(&mut self) {
        let active_fid = self.active_fid();
        for k in self.table.order().to_vec() {
            if k == self.active_key || self.table[k].fid.outranks(&active_fid) {
                continue;
            }
            let cache = self.table[k].cache.take();
            self.dispose_cache(cache);
        }
    }
}
