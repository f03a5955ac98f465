//! Per-compartment tuning knobs.

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_MAX_STATES, DEFAULT_MAX_TOTAL_STATES_SIZE, DEFAULT_MAX_TRIP_TIME, DEFAULT_PEER_SMS,
};

/// Configuration of a dynamic-compression compartment.
///
/// Defaults match the values the engine ships with; applications typically
/// only lower `max_states` / `max_total_states_size` on constrained targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynConfig {
    /// Initial ceiling on the observed round-trip time, in seconds. Widened
    /// automatically as acknowledgments arrive, forced to 0 on reliable
    /// transports.
    pub max_trip_time: u32,
    /// Maximum number of states tracked per compartment (peer-side bound).
    pub max_states: usize,
    /// Local cache budget in bytes; half of it caps cached plaintext copies,
    /// the other half is notionally reserved for stream contexts.
    pub max_total_states_size: usize,
    /// Peer state-memory size assumed until the first feedback reports the
    /// real value.
    pub peer_sms_hint: usize,
}

impl Default for DynConfig {
    fn default() -> Self {
        Self {
            max_trip_time: DEFAULT_MAX_TRIP_TIME,
            max_states: DEFAULT_MAX_STATES,
            max_total_states_size: DEFAULT_MAX_TOTAL_STATES_SIZE,
            peer_sms_hint: DEFAULT_PEER_SMS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = DynConfig::default();
        assert!(cfg.max_states > 0);
        assert!(cfg.peer_sms_hint >= 2048);
        assert!(cfg.max_total_states_size >= cfg.peer_sms_hint);
    }
}
