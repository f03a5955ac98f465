//! The seam to the externally supplied compression algorithm.
//!
//! The compartment engine never compresses bytes itself: it orchestrates
//! state bookkeeping around an implementation of [`CompressionAlgorithm`]
//! (deflate over UDVM bytecode in practice) and owns the per-state
//! [`CompressionStream`] contexts the algorithm hands out.

use std::any::Any;
use std::fmt::Debug;

use bytes::Bytes;

use crate::error::DynCompressError;
use crate::types::StateId;

/// Static description of a compression algorithm and its UDVM bytecode.
#[derive(Debug, Clone)]
pub struct AlgorithmParams {
    /// Human-readable algorithm name, for logs.
    pub name: &'static str,
    /// UDVM bytecode executed by the peer to decompress messages.
    pub bytecode: Bytes,
    /// UDVM memory address the bytecode is loaded at. Must be a multiple of
    /// 64 in `128..=1024`.
    pub code_start: u16,
    /// Peer-side footprint of one saved dictionary state, excluding the fixed
    /// 64-byte protocol overhead.
    pub state_size: usize,
    /// Negotiated partial state-id length sent on the wire (6, 9 or 12).
    pub min_access_len: usize,
    /// Local footprint of one cached plaintext dictionary, used to size the
    /// stream-context budget.
    pub local_state_size: usize,
    /// UDVM address where the decompressor expects the returned-parameters
    /// block; bounds the remote memory budget check.
    pub returned_params_location: usize,
}

/// Output of one compression callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressedChunk {
    /// Bytes written to the output buffer.
    pub len: usize,
    /// Hash of the state the peer will save when executing this message.
    pub state_id: StateId,
}

/// One compression context (dictionary window) owned by a tracked state.
///
/// Opaque to the engine; `as_any` lets algorithm implementations downcast
/// back to their concrete context type.
pub trait CompressionStream: Debug + Send {
    /// Returns self as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;
    /// Returns self as mutable `Any` for downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// A pluggable compression algorithm.
pub trait CompressionAlgorithm: Debug + Send + Sync {
    /// Static algorithm parameters.
    fn params(&self) -> &AlgorithmParams;

    /// Allocates a fresh stream context.
    ///
    /// # Errors
    /// - [`DynCompressError::StreamAllocation`] - Context pool exhausted
    fn alloc_stream(&self) -> Result<Box<dyn CompressionStream>, DynCompressError>;

    /// Returns a stream context to the algorithm. Default drops it.
    fn release_stream(&self, stream: Box<dyn CompressionStream>) {
        drop(stream);
    }

    /// Compresses `plain` into `out`, continuing from the dictionary in
    /// `base` and recording the resulting dictionary in `stream`.
    ///
    /// # Errors
    /// - [`DynCompressError::Compressor`] - Underlying compressor failed or
    ///   `out` is too small
    fn compress(
        &self,
        stream: &mut dyn CompressionStream,
        base: &dyn CompressionStream,
        plain: &[u8],
        out: &mut [u8],
    ) -> Result<CompressedChunk, DynCompressError>;

    /// Feeds `plain` through `stream` to advance its dictionary without
    /// producing output. Used when the active state switches to a state that
    /// only cached plaintext.
    ///
    /// # Errors
    /// - [`DynCompressError::Compressor`] - Underlying compressor failed
    fn absorb(
        &self,
        stream: &mut dyn CompressionStream,
        plain: &[u8],
    ) -> Result<(), DynCompressError>;
}
