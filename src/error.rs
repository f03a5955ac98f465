//! Error types for the SigComp dynamic-compression engine.
//!
//! Errors are split by phase: [`HeaderBuildError`] covers wire-format framing
//! failures, [`DynCompressError`] covers the whole compress operation and
//! wraps framing errors.

use thiserror::Error;

/// Errors during SigComp header and returned-parameters construction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderBuildError {
    /// Output buffer cannot hold the bytes being written.
    #[error(
        "Insufficient buffer for {context}: needed {needed} bytes, available {available} bytes"
    )]
    BufferTooSmall {
        /// Bytes required for the pending write.
        needed: usize,
        /// Bytes left in the output buffer.
        available: usize,
        /// What was being written.
        context: &'static str,
    },

    /// A partial state-id reference must be 6, 9 or 12 bytes long.
    #[error("Illegal state id length {0}: must be 6, 9 or 12 bytes")]
    InvalidStateIdLength(usize),

    /// Uploaded bytecode must land on a 64-byte boundary within UDVM memory.
    #[error("Illegal bytecode start address {0}: must be 64*n with 2 <= n <= 16")]
    InvalidBytecodeStart(u16),

    /// Uploaded bytecode exceeds the 12-bit length field.
    #[error("Bytecode of {0} bytes exceeds the 4095 byte limit")]
    BytecodeTooLarge(usize),

    /// A returned feedback item longer than 127 bytes cannot be framed.
    #[error("Returned feedback item of {0} bytes exceeds the 127 byte limit")]
    FeedbackItemTooLong(usize),

    /// Local decompression memory is too small to announce.
    #[error("Local decompression memory too small: encoded exponent {dms_exponent} must exceed 2")]
    ReturnedParamsInfeasible {
        /// Offset exponent computed from the local DMS value.
        dms_exponent: i32,
    },
}

/// Errors during a compress operation on a dynamic compartment.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DynCompressError {
    /// Wire framing failed.
    #[error("Header build error: {0}")]
    Header(#[from] HeaderBuildError),

    /// The finished message would not fit the remote decompressor's memory.
    #[error(
        "Message needs {required} bytes of remote UDVM memory, only {available} available"
    )]
    MessageExceedsRemoteBudget {
        /// UDVM bytes the decompressed message would occupy.
        required: usize,
        /// UDVM bytes the remote endpoint can offer for it.
        available: usize,
    },

    /// The compressor could not allocate a new stream context.
    #[error("Compression stream allocation failed: {0}")]
    StreamAllocation(String),

    /// The compressor callback itself failed.
    #[error("Compressor failure: {0}")]
    Compressor(String),
}
