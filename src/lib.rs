//! `sigdyn`: compressor-side state bookkeeping for SigComp dynamic
//! compression (RFC 3320 / RFC 3321).
//!
//! This library tracks, per remote endpoint, the dictionary states a SigComp
//! peer saves while decompressing our messages, and decides for every
//! outgoing message whether a new state can be created, which old states to
//! ask the peer to remove, and when an acknowledged state may become the new
//! compression basis. The primary entry point is the [`DynCompartment`].
//!
//! ## Core Concepts
//!
//! - **[`DynCompartment`]**: One per peer. Orchestrates framing, feasibility,
//!   removal and acknowledgment processing around a pluggable compressor.
//! - **States**: Snapshots of the compression dictionary the peer holds after
//!   decompressing a particular message, identified locally by
//!   `(wrap, priority, zid)` and on the wire by a SHA-1 state id. The peer
//!   evicts by priority, which drives all capacity reasoning.
//! - **[`CompressionAlgorithm`]**: The seam to the actual compressor (deflate
//!   over UDVM bytecode in practice). The engine never touches payload bytes
//!   itself.
//! - **Feedback**: The peer acknowledges saved states by echoing their
//!   `(priority, zid)` pair; [`DynCompartment::on_peer_message`] turns those
//!   acknowledgments into basis switches once the peer provably holds the
//!   state.
//!
//! ## Sketch
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sigdyn::{DynCompartment, DynConfig, NullTelemetry, SystemClock};
//!
//! let algo = Arc::new(MyDeflate::new());
//! let init_stream = algo.alloc_stream()?;
//! let mut compartment = DynCompartment::new(
//!     algo,
//!     init_stream,
//!     Arc::new(SystemClock::new()),
//!     Arc::new(NullTelemetry),
//!     &DynConfig::default(),
//! );
//!
//! let mut out = [0u8; 1500];
//! let len = compartment.compress(&info, sip_message, &mut out)?;
//! // ... later, when the peer answers:
//! compartment.on_peer_message(&feedback);
//! ```

pub mod algorithm;
pub mod compartment;
pub mod config;
pub mod constants;
pub mod error;
pub mod state;
pub mod telemetry;
pub mod time;
pub mod types;
pub mod wire;

pub use algorithm::{AlgorithmParams, CompressedChunk, CompressionAlgorithm, CompressionStream};
pub use compartment::{
    CompressionInfo, DynCompartment, FeedbackOutcome, PeerFeedback, SaveDecision,
};
pub use config::DynConfig;
pub use error::{DynCompressError, HeaderBuildError};
pub use telemetry::{NullTelemetry, TelemetryEvent, TelemetrySink};
pub use time::{Clock, SystemClock};
pub use types::{FullStateId, Priority, SequenceId, StateId, Transport};
pub use wire::params::LocalCapabilities;
