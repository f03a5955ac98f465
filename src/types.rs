//! Core type definitions for the dynamic-compression engine.
//!
//! Provides zero-cost newtypes to prevent field mixups at compile time,
//! plus the composite state identifiers used throughout the compartment
//! bookkeeping.

use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

use crate::constants::MAX_STATE_PRIO;

/// Macro to generate newtype wrappers with common implementations.
macro_rules! sigdyn_newtype {
    (
        $(#[$meta:meta])*
        $name:ident($inner:ty) => $prefix:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        #[derive(Serialize, Deserialize)]
        #[repr(transparent)]
        pub struct $name(pub $inner);

        impl $name {
            /// Creates a new instance
            #[inline]
            pub const fn new(value: $inner) -> Self {
                Self(value)
            }

            /// Raw value
            #[inline]
            pub const fn value(self) -> $inner {
                self.0
            }

            /// Wrapping addition
            #[inline]
            pub const fn wrapping_add(self, rhs: $inner) -> Self {
                Self(self.0.wrapping_add(rhs))
            }
        }

        // Display with custom prefix
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }

        // Deref for transparent access
        impl Deref for $name {
            type Target = $inner;

            #[inline]
            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        // From/Into conversions
        impl From<$inner> for $name {
            #[inline]
            fn from(value: $inner) -> Self {
                Self(value)
            }
        }

        impl From<$name> for $inner {
            #[inline]
            fn from(value: $name) -> Self {
                value.0
            }
        }

        // Enable direct comparisons with raw values
        impl PartialEq<$inner> for $name {
            #[inline]
            fn eq(&self, other: &$inner) -> bool {
                self.0 == *other
            }
        }

        impl PartialEq<$name> for $inner {
            #[inline]
            fn eq(&self, other: &$name) -> bool {
                *self == other.0
            }
        }

        impl PartialOrd<$inner> for $name {
            #[inline]
            fn partial_cmp(&self, other: &$inner) -> Option<std::cmp::Ordering> {
                self.0.partial_cmp(other)
            }
        }
    };
}

sigdyn_newtype!(
    /// State retention priority assigned to an outgoing message.
    Priority(u16) => "P"
);

sigdyn_newtype!(
    /// Per-active-state sequence id ("zid") of an outgoing message.
    SequenceId(u16) => "Z"
);

sigdyn_newtype!(
    /// Stable arena handle of a tracked state inside one compartment.
    StateKey(u32) => "S"
);

impl Priority {
    /// The priority of the bootstrap state.
    pub const INITIAL: Self = Self::new(0);
}

impl SequenceId {
    /// The sequence id assigned to the first message after an active-state switch.
    pub const FIRST: Self = Self::new(1);
}

/// Full state id: local identity of a state within one compartment's history.
///
/// Priorities wrap through `wrap_cnt` at a fixed ceiling, so ordering is
/// lexicographic over `(wrap_cnt, prio, zid)` — the derived `Ord` matches the
/// protocol comparison exactly.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct FullStateId {
    pub wrap_cnt: u32,
    pub prio: Priority,
    pub zid: SequenceId,
}

impl FullStateId {
    /// Identity of the bootstrap state.
    pub const ROOT: Self = Self {
        wrap_cnt: 0,
        prio: Priority::INITIAL,
        zid: SequenceId::new(0),
    };

    /// Creates a full state id from its parts.
    pub const fn new(wrap_cnt: u32, prio: u16, zid: u16) -> Self {
        Self {
            wrap_cnt,
            prio: Priority::new(prio),
            zid: SequenceId::new(zid),
        }
    }

    /// Whether this state ranks strictly above `other` as a compression basis.
    ///
    /// Only `(wrap_cnt, prio)` participate: two messages sharing a priority
    /// never compete for the active slot.
    #[inline]
    pub fn outranks(&self, other: &FullStateId) -> bool {
        (self.wrap_cnt, self.prio) > (other.wrap_cnt, other.prio)
    }

    /// Identity of a message compressed against this state as its basis.
    ///
    /// The priority ceiling is reserved: the step that would reach it wraps
    /// the priority back to 1 and increments `wrap_cnt` instead, so the
    /// ceiling value is never assigned.
    pub fn successor(&self, zid: SequenceId) -> Self {
        let mut wrap_cnt = self.wrap_cnt;
        let mut prio = self.prio.value().saturating_add(1);
        if prio >= MAX_STATE_PRIO {
            prio = 1;
            wrap_cnt += 1;
        }
        Self {
            wrap_cnt,
            prio: Priority::new(prio),
            zid,
        }
    }
}

impl fmt::Display for FullStateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{},{}>", self.prio.value(), self.zid.value())
    }
}

/// SHA-1 derived content hash identifying a state globally (sent to the peer).
///
/// Only a negotiated prefix (`min_access_len`, 6-20 bytes) ever goes on the
/// wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StateId(pub [u8; StateId::LENGTH]);

impl StateId {
    /// Full SHA-1 hash length in bytes.
    pub const LENGTH: usize = 20;

    /// The leading `len` bytes, as referenced on the wire.
    #[inline]
    pub fn prefix(&self, len: usize) -> &[u8] {
        &self.0[..len]
    }
}

impl fmt::Debug for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StateId({:02x}{:02x}{:02x}{:02x}{:02x}{:02x}..)",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.prefix(6) {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// Transport properties of the connection an outgoing message travels on.
///
/// Mirrors the or-able transport-type flags of the surrounding SIP stack:
/// stream vs. datagram framing and reliable vs. unreliable delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Transport {
    /// Stream-oriented framing (e.g. TCP); affects the remote UDVM budget split.
    pub stream: bool,
    /// Reliable delivery; allows trusting new states without a round trip.
    pub reliable: bool,
}

impl Transport {
    /// Unreliable datagram transport (UDP).
    pub const UDP: Self = Self {
        stream: false,
        reliable: false,
    };

    /// Reliable stream transport (TCP).
    pub const TCP: Self = Self {
        stream: true,
        reliable: true,
    };
}
