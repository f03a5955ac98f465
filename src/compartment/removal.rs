//! Removal-candidate selection: which stale states the next message asks the
//! peer to delete.

use tracing::debug;

use crate::constants::MAX_STATES_TO_REMOVE;
use crate::state::StateNode;
use crate::types::{Priority, StateKey};

use super::DynCompartment;

impl DynCompartment {
    /// Whether `node` can be deleted without risking the loss of a state the
    /// peer may still acknowledge or depend on.
    fn safe_to_delete(&self, key: StateKey, node: &StateNode) -> bool {
        if !node.acked {
            // Give the acknowledgment two full round trips to arrive.
            return node.send_time_sec + 2 * self.max_trip_time < self.last_peer_message_time;
        }
        if key == self.active_key {
            return false;
        }
        // Acknowledged: wait until the youngest message compressed against
        // this state has had time to arrive.
        let mut latest_unacked = node.last_dependent_time;
        if let Some(dep) = node.first_dependent {
            latest_unacked = latest_unacked.max(self.table[dep].send_time_sec);
        }
        latest_unacked == 0 || latest_unacked + self.max_trip_time < self.cur_time_sec
    }

    /// Scans the tracked states, deletes the ones nothing can reference
    /// anymore and returns up to [`MAX_STATES_TO_REMOVE`] candidates whose
    /// removal the next message should announce to the peer.
    ///
    /// Safe states below every priority still in use are dropped locally on
    /// the spot: the peer evicts by priority, so it has already let go of
    /// them. The rest must be announced; when more than the ceiling qualify,
    /// candidates that have been announced most often yield their slot so the
    /// announcements round-robin across passes.
    pub(crate) fn find_remove_states(&mut self) -> Vec<StateKey> {
        let keys: Vec<StateKey> = self.table.order().to_vec();

        let mut min_keep_prio = Priority::new(u16::MAX);
        let mut safety: Vec<(StateKey, bool)> = Vec::with_capacity(keys.len());
        for &k in &keys {
            let safe = self.safe_to_delete(k, &self.table[k]);
            safety.push((k, safe));
            if !safe {
                min_keep_prio = min_keep_prio.min(self.table[k].fid.prio);
            }
        }
        for &(k, safe) in &safety {
            self.table[k].may_be_deleted = safe;
        }

        let mut selected: Vec<StateKey> = Vec::new();
        for (k, safe) in safety {
            if !safe {
                continue;
            }
            if self.table[k].fid.prio < min_keep_prio {
                debug!(fid = %self.table[k].fid, "dropping state below all kept priorities");
                self.delete_state(k);
                continue;
            }
            if selected.len() < MAX_STATES_TO_REMOVE {
                selected.push(k);
                continue;
            }
            // Over the ceiling: bump the candidate that has been announced
            // the most, if it has been announced more often than this one.
            let cur_count = self.table[k].delete_requests_sent;
            if let Some(idx) = (0..selected.len())
                .max_by_key(|&i| self.table[selected[i]].delete_requests_sent)
                && self.table[selected[idx]].delete_requests_sent > cur_count
            {
                selected[idx] = k;
            }
        }

        for &k in &selected {
            self.table[k].delete_requests_sent += 1;
        }
        if !selected.is_empty() {
            debug!(count = selected.len(), "removal candidates selected");
        }
        selected
    }
}
