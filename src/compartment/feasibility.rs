//! Save-feasibility decision: can the next message ask the peer to save a
//! new state, and what may be cached locally for it?

use tracing::debug;

use crate::types::{Priority, StateKey};

use super::DynCompartment;

/// Outcome of the save-feasibility check for one outgoing message.
///
/// Ordered from most to least restrictive: anything above [`DontSave`]
/// creates peer-side state.
///
/// [`DontSave`]: SaveDecision::DontSave
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SaveDecision {
    /// Do not ask the peer to save state and do not announce removals.
    DontSaveAny,
    /// Do not ask the peer to save state (removals still announced).
    DontSave,
    /// Ask the peer to save state; cache the plaintext locally.
    SavePlain,
    /// Ask the peer to save state; keep the live stream context locally.
    SaveStream,
}

impl SaveDecision {
    /// Whether the message asks the peer to save a new state.
    pub fn creates_state(self) -> bool {
        self > SaveDecision::DontSave
    }
}

impl DynCompartment {
    /// Decides whether the next message may create peer-side state.
    ///
    /// `state_size` is the peer-side footprint of the candidate state,
    /// `local_size` the local plaintext footprint, `removals` the candidates
    /// selected for this message (their announced removal cannot be assumed
    /// effective yet).
    ///
    /// On unreliable transports the decision additionally proves that even in
    /// the worst acknowledgment order the peer can hold every state that may
    /// still affect the lowest-priority acknowledged survivor, plus the
    /// candidate.
    pub(crate) fn may_save_state(
        &mut self,
        state_size: usize,
        local_size: usize,
        removals: &[StateKey],
    ) -> SaveDecision {
        if state_size > self.peer_comp_size {
            debug!(state_size, peer_comp_size = self.peer_comp_size, "state too large for peer");
            return SaveDecision::DontSaveAny;
        }
        if self.table.len() == self.table.max_states() {
            debug!(max_states = self.table.max_states(), "state table full");
            return SaveDecision::DontSaveAny;
        }

        // What could we cache locally?
        let base = if self.table.cached_streams() + 1 <= self.table.max_cached_streams() {
            SaveDecision::SaveStream
        } else if self.table.total_size() + local_size > self.table.max_total_size() {
            return SaveDecision::DontSave;
        } else {
            SaveDecision::SavePlain
        };

        if self.reliable {
            return base;
        }

        // Anchor: the lowest-priority acknowledged state that is not about to
        // be deleted. It is the state the peer evicts last, so its worst-case
        // companions bound the demand.
        let mut anchor: Option<StateKey> = None;
        let mut min_prio = Priority::new(u16::MAX);
        for &k in self.table.order() {
            let cur = &self.table[k];
            if cur.acked && !cur.may_be_deleted && cur.fid.prio < min_prio {
                min_prio = cur.fid.prio;
                anchor = Some(k);
            }
        }
        let Some(anchor) = anchor else {
            return base;
        };
        if self.table[anchor].persistent {
            return base;
        }

        for &k in removals {
            self.table[k].marked = true;
        }

        let mut demands = state_size;
        let mut low_prio_demand = 0usize;
        for &k in self.table.order() {
            let cur = &self.table[k];
            if cur.marked || !self.may_affect(anchor, k) {
                continue;
            }
            if cur.fid.prio >= self.table[anchor].fid.prio {
                demands += cur.state_size;
            } else {
                low_prio_demand = low_prio_demand.max(cur.state_size);
            }
        }
        demands += low_prio_demand;

        for &k in removals {
            self.table[k].marked = false;
        }

        if demands <= self.peer_comp_size {
            base
        } else {
            debug!(demands, peer_comp_size = self.peer_comp_size, "worst-case demand too high");
            SaveDecision::DontSave
        }
    }

    /// Whether state `candidate` may still occupy peer memory at the moment
    /// the peer holds `anchor` (i.e. the peer cannot be assumed to have
    /// evicted it by then).
    fn may_affect(&self, anchor: StateKey, candidate: StateKey) -> bool {
        let a = &self.table[anchor];
        let c = &self.table[candidate];
        if !c.creates_state {
            return false;
        }
        if c.acked {
            // Acknowledged lower-priority states were evicted before the
            // anchor was saved.
            return c.fid.prio >= a.fid.prio;
        }
        // Unacknowledged: higher priority always competes; lower priority
        // competes only while its message may still be in flight relative to
        // the anchor's send time.
        c.fid.prio > a.fid.prio || a.send_time_sec <= c.send_time_sec + self.max_trip_time
    }
}
