//! RFC 3320 SigComp message header construction.
//!
//! Layout (Sec 7): a `11111xxx` lead byte carrying the T bit and the
//! state-id length code, an optional returned feedback item, then either a
//! partial state-id reference or the uploaded UDVM bytecode with its
//! destination address.

use crate::constants::{
    MAX_BYTECODE_DESTINATION, MAX_BYTECODE_SIZE, MIN_BYTECODE_DESTINATION, SIGCOMP_HEADER_BASE,
    SIGCOMP_HEADER_T_BIT,
};
use crate::error::HeaderBuildError;

/// How the outgoing message tells the peer where the UDVM bytecode is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BytecodeRef<'a> {
    /// Reference a previously saved state containing the bytecode by the
    /// leading bytes of its state id (6, 9 or 12 of them).
    StateId(&'a [u8]),
    /// Upload the bytecode itself, to be loaded at `start`.
    Code {
        /// The UDVM bytecode.
        code: &'a [u8],
        /// Load address; must be a multiple of 64 with `start/64` in 2..=16.
        start: u16,
    },
}

fn ensure(
    out: &[u8],
    cursor: usize,
    needed: usize,
    context: &'static str,
) -> Result<(), HeaderBuildError> {
    if cursor + needed > out.len() {
        return Err(HeaderBuildError::BufferTooSmall {
            needed,
            available: out.len() - cursor.min(out.len()),
            context,
        });
    }
    Ok(())
}

/// Writes the SigComp header into the front of `out` and returns the number
/// of bytes written.
///
/// `feedback_item` is the peer's requested feedback being echoed back; pass
/// an empty slice to omit it (the T bit stays clear).
///
/// # Errors
/// - [`HeaderBuildError::BufferTooSmall`] - `out` cannot hold the header
/// - [`HeaderBuildError::FeedbackItemTooLong`] - Feedback item over 127 bytes
/// - [`HeaderBuildError::InvalidStateIdLength`] - Reference length not 6/9/12
/// - [`HeaderBuildError::BytecodeTooLarge`] - Bytecode over 4095 bytes
/// - [`HeaderBuildError::InvalidBytecodeStart`] - Load address not a legal
///   64-byte-aligned destination
pub fn generate_sigcomp_header(
    out: &mut [u8],
    feedback_item: &[u8],
    bytecode: BytecodeRef<'_>,
) -> Result<usize, HeaderBuildError> {
    ensure(out, 0, 1, "sigcomp header byte")?;
    out[0] = SIGCOMP_HEADER_BASE;
    let mut cursor = 1;

    if !feedback_item.is_empty() {
        out[0] |= SIGCOMP_HEADER_T_BIT;
        if feedback_item.len() == 1 && feedback_item[0] < 128 {
            ensure(out, cursor, 1, "returned feedback item")?;
            out[cursor] = feedback_item[0];
            cursor += 1;
        } else {
            if feedback_item.len() > 127 {
                return Err(HeaderBuildError::FeedbackItemTooLong(feedback_item.len()));
            }
            ensure(out, cursor, 1 + feedback_item.len(), "returned feedback item")?;
            out[cursor] = 0x80 | feedback_item.len() as u8;
            cursor += 1;
            out[cursor..cursor + feedback_item.len()].copy_from_slice(feedback_item);
            cursor += feedback_item.len();
        }
    }

    match bytecode {
        BytecodeRef::StateId(id) => {
            if !matches!(id.len(), 6 | 9 | 12) {
                return Err(HeaderBuildError::InvalidStateIdLength(id.len()));
            }
            out[0] |= (id.len() / 3 - 1) as u8;
            ensure(out, cursor, id.len(), "state id reference")?;
            out[cursor..cursor + id.len()].copy_from_slice(id);
            cursor += id.len();
        }
        BytecodeRef::Code { code, start } => {
            if code.len() > MAX_BYTECODE_SIZE {
                return Err(HeaderBuildError::BytecodeTooLarge(code.len()));
            }
            let destination = start >> 6;
            if destination << 6 != start
                || !(MIN_BYTECODE_DESTINATION..=MAX_BYTECODE_DESTINATION).contains(&destination)
            {
                return Err(HeaderBuildError::InvalidBytecodeStart(start));
            }
            ensure(out, cursor, 2 + code.len(), "uploaded bytecode")?;
            out[cursor] = (code.len() >> 4) as u8;
            out[cursor + 1] = ((code.len() as u8 & 0x0F) << 4) | (destination - 1) as u8;
            cursor += 2;
            out[cursor..cursor + code.len()].copy_from_slice(code);
            cursor += code.len();
        }
    }

    Ok(cursor)
}
