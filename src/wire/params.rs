//! Returned-parameters block construction and inbound feedback parsing.
//!
//! The returned-parameters block rides at a fixed UDVM location in every
//! message and carries, on request, the local endpoint's capabilities and its
//! list of locally saved state ids (RFC 3320, Sec 9.4.9 style layout).

use crate::constants::{
    CPB_EXPONENT_OFFSET, FEEDBACK_ITEM_SIZE, MEMORY_EXPONENT_OFFSET, SIGCOMP_VERSION,
};
use crate::error::HeaderBuildError;
use crate::types::{Priority, SequenceId};

/// Local endpoint capabilities advertised through the returned-parameters
/// block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalCapabilities {
    /// UDVM cycles per bit the local decompressor offers.
    pub cycles_per_bit: u32,
    /// Local decompression memory size in bytes.
    pub decompression_memory: u32,
    /// Local state memory size in bytes.
    pub state_memory: u32,
}

fn floor_log2(v: u32) -> i32 {
    if v == 0 { 0 } else { (31 - v.leading_zeros()) as i32 }
}

/// Writes the returned-parameters block into the front of `out` and returns
/// the number of bytes written.
///
/// When neither capabilities nor a state-id list was requested the block is
/// exactly two zero bytes. Otherwise: a big-endian length field covering the
/// capability/version pair and the id list, the capability byte and version
/// (or a zero pair when only the id list was requested), then the raw id
/// list.
///
/// # Errors
/// - [`HeaderBuildError::BufferTooSmall`] - `out` cannot hold the block
/// - [`HeaderBuildError::ReturnedParamsInfeasible`] - Local decompression
///   memory too small to announce
pub fn write_returned_params(
    out: &mut [u8],
    capabilities: Option<&LocalCapabilities>,
    state_id_list: Option<&[u8]>,
) -> Result<usize, HeaderBuildError> {
    let id_list = state_id_list.unwrap_or(&[]);

    if capabilities.is_none() && state_id_list.is_none() {
        if out.len() < 2 {
            return Err(HeaderBuildError::BufferTooSmall {
                needed: 2,
                available: out.len(),
                context: "returned parameters",
            });
        }
        out[0] = 0;
        out[1] = 0;
        return Ok(2);
    }

    let body_len = 2 + id_list.len();
    let total = 2 + body_len;
    if out.len() < total {
        return Err(HeaderBuildError::BufferTooSmall {
            needed: total,
            available: out.len(),
            context: "returned parameters",
        });
    }

    out[0..2].copy_from_slice(&(body_len as u16).to_be_bytes());

    match capabilities {
        None => {
            out[2] = 0;
            out[3] = 0;
        }
        Some(caps) => {
            let cpb = (floor_log2(caps.cycles_per_bit) - CPB_EXPONENT_OFFSET as i32).clamp(0, 3);
            let dms = floor_log2(caps.decompression_memory) - MEMORY_EXPONENT_OFFSET as i32;
            if dms <= 2 {
                return Err(HeaderBuildError::ReturnedParamsInfeasible { dms_exponent: dms });
            }
            let dms = dms.min(7);
            let sms = (floor_log2(caps.state_memory) - MEMORY_EXPONENT_OFFSET as i32).clamp(0, 7);

            out[2] = ((cpb as u8) << 6) | ((dms as u8) << 3) | sms as u8;
            out[3] = SIGCOMP_VERSION;
        }
    }

    out[4..4 + id_list.len()].copy_from_slice(id_list);
    Ok(total)
}

/// Parses an inbound returned feedback item as a state acknowledgment.
///
/// Only items of exactly 4 bytes — big-endian priority then zid — count;
/// anything else yields `None` and is ignored by the caller.
pub fn parse_feedback_item(item: &[u8]) -> Option<(Priority, SequenceId)> {
    if item.len() != FEEDBACK_ITEM_SIZE {
        return None;
    }
    let prio = u16::from_be_bytes([item[0], item[1]]);
    let zid = u16::from_be_bytes([item[2], item[3]]);
    Some((Priority::new(prio), SequenceId::new(zid)))
}

/// Encodes the feedback item acknowledging a state, for the receiving side
/// of the protocol (and for tests).
pub fn encode_feedback_item(prio: Priority, zid: SequenceId) -> [u8; FEEDBACK_ITEM_SIZE] {
    let p = prio.value().to_be_bytes();
    let z = zid.value().to_be_bytes();
    [p[0], p[1], z[0], z[1]]
}
