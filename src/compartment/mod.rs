//! The dynamic-compression compartment: one per remote endpoint.
//!
//! A [`DynCompartment`] owns the tracked-state arena, the active compression
//! basis and the peer-capacity model for a single peer. The protocol work is
//! split across submodules: save feasibility ([`feasibility`]), inbound
//! acknowledgment processing ([`feedback`]), removal-candidate selection
//! ([`removal`]) and the compress orchestrator ([`compress`]).

pub mod compress;
pub mod feasibility;
pub mod feedback;
pub mod removal;

use std::sync::Arc;

use bytes::Bytes;
use sha1::{Digest, Sha1};
use tracing::debug;

use crate::algorithm::{AlgorithmParams, CompressionAlgorithm, CompressionStream};
use crate::config::DynConfig;
use crate::constants::STATE_SIZE_OVERHEAD;
use crate::error::DynCompressError;
use crate::state::{StateCache, StateNode, StateTable};
use crate::telemetry::{TelemetryEvent, TelemetrySink};
use crate::time::Clock;
use crate::types::{FullStateId, SequenceId, StateKey};

pub use compress::CompressionInfo;
pub use feasibility::SaveDecision;
pub use feedback::{FeedbackOutcome, PeerFeedback};

/// Compressor-side state bookkeeping for one peer.
#[derive(Debug)]
pub struct DynCompartment {
    pub(crate) algo: Arc<dyn CompressionAlgorithm>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) telemetry: Arc<dyn TelemetrySink>,
    pub(crate) table: StateTable,
    /// The bootstrap state; detached from the send-ordered list.
    pub(crate) init_key: StateKey,
    /// Current compression basis.
    pub(crate) active_key: StateKey,
    /// The first feedback has locked in the peer's real state memory size.
    pub(crate) peer_info_known: bool,
    /// Peer state memory available for dynamic states, in bytes.
    pub(crate) peer_comp_size: usize,
    /// Observed ceiling on the round-trip time, in seconds.
    pub(crate) max_trip_time: u32,
    /// Transport reliability as of the latest compress call.
    pub(crate) reliable: bool,
    /// Inbound peer-message counter.
    pub(crate) cur_time: u32,
    /// Wall-clock second of the latest compress or peer-message event.
    pub(crate) cur_time_sec: u32,
    /// Wall-clock second of the latest inbound peer message.
    pub(crate) last_peer_message_time: u32,
    /// Value of `cur_time` at the latest inbound peer message.
    pub(crate) last_peer_message_num: u32,
    /// Sequence id for the next outgoing message; resets on active switch.
    pub(crate) cur_zid: SequenceId,
    /// Running total of plain bytes offered for compression.
    pub(crate) cur_plain: u64,
    /// Running total of SigComp bytes produced.
    pub(crate) cur_compressed: u64,
}

impl DynCompartment {
    /// Creates a compartment around an algorithm and its bootstrap stream
    /// context (a fresh context whose dictionary is empty or holds the
    /// algorithm's static dictionary).
    pub fn new(
        algo: Arc<dyn CompressionAlgorithm>,
        init_stream: Box<dyn CompressionStream>,
        clock: Arc<dyn Clock>,
        telemetry: Arc<dyn TelemetrySink>,
        config: &DynConfig,
    ) -> Self {
        let params = algo.params();
        let init_state_size = params.bytecode.len() + STATE_SIZE_OVERHEAD;
        let max_total_size = config.max_total_states_size / 2;
        let max_cached_streams = 1 + max_total_size / params.local_state_size.max(1);
        let now = clock.now_secs();

        let mut table = StateTable::new(config.max_states, max_total_size, max_cached_streams);
        let init = StateNode {
            fid: FullStateId::ROOT,
            dfid: FullStateId::ROOT,
            sid: init_state_id(params),
            state_size: init_state_size,
            send_time_sec: now,
            acked_time_sec: now,
            cache: StateCache::Stream(init_stream),
            acked: true,
            creates_state: true,
            persistent: true,
            ..Default::default()
        };
        let init_key = table.insert_detached(init);
        table.note_stream_cached();

        Self {
            algo,
            clock,
            telemetry,
            table,
            init_key,
            active_key: init_key,
            peer_info_known: false,
            peer_comp_size: config.peer_sms_hint.saturating_sub(init_state_size),
            max_trip_time: config.max_trip_time,
            reliable: false,
            cur_time: 0,
            cur_time_sec: now,
            last_peer_message_time: 0,
            last_peer_message_num: 0,
            cur_zid: SequenceId::FIRST,
            cur_plain: 0,
            cur_compressed: 0,
        }
    }

    /// Identity of the current compression basis.
    pub fn active_fid(&self) -> FullStateId {
        self.table[self.active_key].fid
    }

    /// Number of tracked (non-bootstrap) states.
    pub fn state_count(&self) -> usize {
        self.table.len()
    }

    /// High-water mark of tracked states.
    pub fn peak_states(&self) -> usize {
        self.table.peak_states()
    }

    /// High-water mark of cached plaintext bytes.
    pub fn peak_total_size(&self) -> usize {
        self.table.peak_total_size()
    }

    /// Peer state memory currently assumed available for dynamic states.
    pub fn peer_comp_size(&self) -> usize {
        self.peer_comp_size
    }

    /// Current ceiling on the observed round-trip time, in seconds.
    pub fn max_trip_time(&self) -> u32 {
        self.max_trip_time
    }

    /// Sequence id the next outgoing message will carry.
    pub fn next_sequence_id(&self) -> SequenceId {
        self.cur_zid
    }

    /// Running (plain, compressed) byte totals since construction.
    pub fn compression_totals(&self) -> (u64, u64) {
        (self.cur_plain, self.cur_compressed)
    }

    /// Forces the next message to re-upload the UDVM bytecode instead of
    /// referencing a saved state. Recovery hook for when the peer reports it
    /// lost the referenced state.
    pub fn clear_bytecode_flag(&mut self) {
        self.table[self.active_key].includes_bytecode = false;
    }

    /// Releases a cache, updating the accounting.
    pub(crate) fn dispose_cache(&mut self, cache: StateCache) {
        match cache {
            StateCache::None => {}
            StateCache::Plain(plain) => {
                self.table.note_plain_released(plain.len());
            }
            StateCache::Stream(stream) => {
                self.table.note_stream_released();
                self.algo.release_stream(stream);
            }
        }
    }

    /// Drops a tracked state entirely: arena, list, dependency links, cache.
    pub(crate) fn delete_state(&mut self, key: StateKey) {
        debug_assert_ne!(key, self.active_key);
        if let Some(node) = self.table.remove(key) {
            let fid = node.fid;
            debug!(%fid, "dropping state");
            self.dispose_cache(node.cache);
            self.telemetry.record(TelemetryEvent::StateDropped {
                prio: fid.prio.value(),
                zid: fid.zid.value(),
            });
        }
    }

    /// Switches the compression basis to `new_key`.
    ///
    /// When the new state cached only plaintext, the outgoing stream context
    /// is transplanted from the old basis and caught up by absorbing the
    /// plaintext, so the dictionary matches what the peer reconstructed.
    pub(crate) fn change_active(&mut self, new_key: StateKey) -> Result<(), DynCompressError> {
        if self.table[new_key].cache.is_stream() {
            let old = self.table[self.active_key].cache.take();
            self.dispose_cache(old);
        } else {
            let plain = match self.table[new_key].cache.take() {
                StateCache::Plain(plain) => {
                    self.table.note_plain_released(plain.len());
                    plain
                }
                _ => Bytes::new(),
            };
            let StateCache::Stream(mut stream) = self.table[self.active_key].cache.take() else {
                return Err(DynCompressError::Compressor(
                    "active state lost its stream context".into(),
                ));
            };
            if let Err(e) = self.algo.absorb(stream.as_mut(), &plain) {
                self.table.note_stream_released();
                self.algo.release_stream(stream);
                return Err(e);
            }
            self.table[new_key].cache = StateCache::Stream(stream);
        }

        self.active_key = new_key;
        self.cur_zid = SequenceId::FIRST;
        let fid = self.table[new_key].fid;
        debug!(%fid, "active state changed");
        self.telemetry.record(TelemetryEvent::ActiveStateChanged {
            prio: fid.prio.value(),
            zid: fid.zid.value(),
        });
        Ok(())
    }
}

/// State id of the bootstrap state: SHA-1 over the standard preamble the
/// decompressor hashes when saving the bytecode-bearing state, followed by
/// the bytecode itself.
fn init_state_id(params: &AlgorithmParams) -> crate::types::StateId {
    let mut hasher = Sha1::new();
    let mut preamble = [0u8; 8];
    preamble[0..2].copy_from_slice(&(params.bytecode.len() as u16).to_be_bytes());
    preamble[2..4].copy_from_slice(&params.code_start.to_be_bytes());
    preamble[4..6].copy_from_slice(&params.code_start.to_be_bytes());
    preamble[6..8].copy_from_slice(&(params.min_access_len as u16).to_be_bytes());
    hasher.update(preamble);
    hasher.update(&params.bytecode);
    crate::types::StateId(hasher.finalize().into())
}
