//! The compress orchestrator: frames one outgoing message and commits the
//! state it creates.
//!
//! Order of operations per message: removal-candidate selection, save
//! feasibility, SigComp header, dynamic-compression sub-header,
//! returned-parameters block, the compressed payload itself, the remote
//! memory budget check, and finally the new tracked state (nothing is
//! committed if any step fails).

use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use crate::constants::{DYN_HEADER_SIZE, STATE_SIZE_OVERHEAD};
use crate::error::{DynCompressError, HeaderBuildError};
use crate::state::{StateCache, StateNode};
use crate::telemetry::TelemetryEvent;
use crate::types::{FullStateId, StateId, Transport};
use crate::wire::header::{BytecodeRef, generate_sigcomp_header};
use crate::wire::params::{LocalCapabilities, write_returned_params};

use super::{DynCompartment, SaveDecision};

/// Per-message inputs supplied by the caller.
#[derive(Debug, Clone, Copy)]
pub struct CompressionInfo<'a> {
    /// Transport the message travels on.
    pub transport: Transport,
    /// The peer's decompression memory size in bytes.
    pub remote_dms: usize,
    /// Feedback item the peer asked us to echo; empty for none.
    pub requested_feedback_item: &'a [u8],
    /// Local capabilities to advertise, when the peer requested them.
    pub capabilities: Option<LocalCapabilities>,
    /// Locally saved state ids to advertise, when the peer requested them.
    pub local_state_ids: Option<&'a [u8]>,
}

impl DynCompartment {
    /// Compresses `plain` into a complete SigComp message in `out` and
    /// returns its length.
    ///
    /// The message is always compressed against the current active state.
    /// Depending on feasibility it also asks the peer to save the resulting
    /// dictionary as a new state, which is then tracked until acknowledged
    /// or aged out.
    ///
    /// # Errors
    /// - [`DynCompressError::Header`] - Framing failed (buffer too small,
    ///   illegal parameters)
    /// - [`DynCompressError::MessageExceedsRemoteBudget`] - The peer could
    ///   not decompress a message this large
    /// - [`DynCompressError::StreamAllocation`] /
    ///   [`DynCompressError::Compressor`] - The compressor failed
    pub fn compress(
        &mut self,
        info: &CompressionInfo<'_>,
        plain: &[u8],
        out: &mut [u8],
    ) -> Result<usize, DynCompressError> {
        self.cur_time_sec = self.clock.now_secs();
        self.reliable = info.transport.reliable;
        if self.reliable {
            // Nothing is ever in flight long on a reliable transport.
            self.max_trip_time = 0;
        }

        let algo = Arc::clone(&self.algo);
        let params = algo.params();

        let mut removals = self.find_remove_states();
        let state_size = params.state_size + STATE_SIZE_OVERHEAD;
        let decision = self.may_save_state(state_size, plain.len(), &removals);
        debug!(?decision, removals = removals.len(), "save decision");

        if decision == SaveDecision::DontSaveAny {
            // No node will track this message; remember on the basis itself
            // that something unrecorded was compressed against it.
            removals.clear();
            let now = self.cur_time_sec;
            self.table[self.active_key].last_dependent_time = now;
        }
        let creates_state = decision.creates_state();

        let new_fid = self.active_fid().successor(self.cur_zid);
        self.cur_zid = self.cur_zid.wrapping_add(1);

        let mal = params.min_access_len;
        let removal_meta: Vec<(FullStateId, StateId)> = removals
            .iter()
            .map(|&k| (self.table[k].fid, self.table[k].sid))
            .collect();
        let active_sid = self.table[self.active_key].sid;

        let bytecode_ref = if self.table[self.active_key].includes_bytecode {
            BytecodeRef::StateId(active_sid.prefix(mal))
        } else {
            BytecodeRef::Code {
                code: &params.bytecode,
                start: params.code_start,
            }
        };
        let mut cursor = generate_sigcomp_header(out, info.requested_feedback_item, bytecode_ref)?;

        let dyn_len = DYN_HEADER_SIZE + mal * removal_meta.len();
        if cursor + dyn_len > out.len() {
            return Err(HeaderBuildError::BufferTooSmall {
                needed: dyn_len,
                available: out.len() - cursor,
                context: "dynamic compression sub-header",
            }
            .into());
        }
        out[cursor..cursor + 2].copy_from_slice(&new_fid.prio.value().to_be_bytes());
        out[cursor + 2..cursor + 4].copy_from_slice(&new_fid.zid.value().to_be_bytes());
        out[cursor + 4] = ((removal_meta.len() as u8) << 1) | creates_state as u8;
        cursor += DYN_HEADER_SIZE;
        for (_, sid) in &removal_meta {
            out[cursor..cursor + mal].copy_from_slice(sid.prefix(mal));
            cursor += mal;
        }

        let ret_params_len = write_returned_params(
            &mut out[cursor..],
            info.capabilities.as_ref(),
            info.local_state_ids,
        )?;
        cursor += ret_params_len;

        let mut stream = algo.alloc_stream()?;
        let chunk = {
            let StateCache::Stream(base) = &self.table[self.active_key].cache else {
                algo.release_stream(stream);
                return Err(DynCompressError::Compressor(
                    "active state lost its stream context".into(),
                ));
            };
            algo.compress(stream.as_mut(), base.as_ref(), plain, &mut out[cursor..])
        };
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                algo.release_stream(stream);
                return Err(e);
            }
        };
        let total = cursor + chunk.len;

        // The peer must fit the whole decompressed message plus the fixed
        // returned-parameters region into its UDVM memory; on stream
        // transports half the memory is reserved for the ring buffer.
        let available = if info.transport.stream {
            info.remote_dms / 2
        } else {
            info.remote_dms.saturating_sub(total)
        };
        let required = params.returned_params_location + ret_params_len;
        if required > available {
            algo.release_stream(stream);
            return Err(DynCompressError::MessageExceedsRemoteBudget {
                required,
                available,
            });
        }

        self.table[self.active_key].served_as_active = true;
        self.cur_plain += plain.len() as u64;
        self.cur_compressed += total as u64;
        self.telemetry.record(TelemetryEvent::MessageCompressed {
            plain_size: plain.len(),
            compressed_size: total,
        });

        if decision == SaveDecision::DontSaveAny {
            algo.release_stream(stream);
            debug!(total, "message compressed, nothing tracked");
            return Ok(total);
        }

        let cache = match decision {
            SaveDecision::SaveStream => {
                self.table.note_stream_cached();
                StateCache::Stream(stream)
            }
            SaveDecision::SavePlain => {
                algo.release_stream(stream);
                self.table.note_plain_cached(plain.len());
                StateCache::Plain(Bytes::copy_from_slice(plain))
            }
            _ => {
                algo.release_stream(stream);
                StateCache::None
            }
        };
        let node = StateNode {
            fid: new_fid,
            sid: chunk.state_id,
            state_size: if creates_state { state_size } else { 0 },
            send_time: self.cur_time,
            send_time_sec: self.cur_time_sec,
            remove_requests: removal_meta.iter().map(|(fid, _)| *fid).collect(),
            creates_state,
            includes_bytecode: true,
            cache,
            ..Default::default()
        };
        let new_key = self.table.push_back(node);
        self.table.add_dependent(self.active_key, new_key);

        if creates_state && self.reliable {
            // The peer is guaranteed to receive this message, so the new
            // state is trusted immediately.
            self.table[new_key].acked = true;
            self.table[new_key].acked_time = self.cur_time;
            self.table[new_key].acked_time_sec = self.cur_time_sec;
            self.change_active(new_key)?;
        }

        debug!(fid = %new_fid, ?decision, total, "message compressed");
        Ok(total)
    }
}
