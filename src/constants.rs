//! SigComp dynamic-compression protocol constants and engine defaults.
//!
//! Defines the RFC 3320/3321 wire-format constants and the fixed parameters of
//! the compartment state model. Tunable per-compartment knobs live in
//! [`crate::config::DynConfig`]; everything here is structural.

// --- SigComp Header Constants (RFC 3320, Sec 7) ---

/// Fixed high bits of the first SigComp header byte (`11111` prefix).
pub const SIGCOMP_HEADER_BASE: u8 = 0xF8;
/// T bit: set when the header echoes a returned feedback item.
pub const SIGCOMP_HEADER_T_BIT: u8 = 0x04;
/// SigComp version announced in the returned-parameters block.
pub const SIGCOMP_VERSION: u8 = 1;
/// Maximum uploaded bytecode size encodable in the 12-bit `code_len` field.
pub const MAX_BYTECODE_SIZE: usize = 4095;
/// Smallest legal UDVM bytecode destination (`start / 64`).
pub const MIN_BYTECODE_DESTINATION: u16 = 2;
/// Largest legal UDVM bytecode destination (`start / 64`).
pub const MAX_BYTECODE_DESTINATION: u16 = 16;

// --- Capability Encoding (RFC 3320, Sec 3.3.1) ---

/// Exponent offset for cycles-per-bit encoding (`cpb = 2^(N+4)`).
pub const CPB_EXPONENT_OFFSET: u32 = 4;
/// Exponent offset for memory-size encoding (`dms/sms = 2^(N+10)`).
pub const MEMORY_EXPONENT_OFFSET: u32 = 10;

// --- Dynamic-Compression Sub-Header (RFC 3321 scheme) ---

/// Fixed part of the dynamic-compression sub-header: priority (2), zid (2),
/// flags (1). Removal-request state ids follow.
pub const DYN_HEADER_SIZE: usize = 5;
/// Length of the feedback item acknowledging a state: priority (2) + zid (2).
pub const FEEDBACK_ITEM_SIZE: usize = 4;
/// Upper bound on removal requests announced in a single message.
pub const MAX_STATES_TO_REMOVE: usize = 4;

// --- State Model Constants ---

/// Largest priority before wrapping back to 1 and bumping the wrap counter.
pub const MAX_STATE_PRIO: u16 = 65534;
/// Fixed per-state overhead added to every peer-side state footprint
/// (RFC 3320, Sec 6.2: 64 bytes on top of `state_length`).
pub const STATE_SIZE_OVERHEAD: usize = 64;

// --- Engine Defaults ---

/// Peer state-memory size assumed before the first feedback arrives.
pub const DEFAULT_PEER_SMS: usize = 8192;
/// Default ceiling on the observed round-trip time, in seconds.
pub const DEFAULT_MAX_TRIP_TIME: u32 = 7;
/// Default ceiling on tracked states per compartment.
pub const DEFAULT_MAX_STATES: usize = 32;
/// Default local cache budget (plaintext + stream halves combined), in bytes.
pub const DEFAULT_MAX_TOTAL_STATES_SIZE: usize = 131_072;
