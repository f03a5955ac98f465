//! Injectable telemetry seam for compartment-level statistics.
//!
//! The compartment reports lifecycle events through a [`TelemetrySink`]
//! supplied at construction; embedders aggregate compression ratios or state
//! churn however they like. [`NullTelemetry`] discards everything.

use std::fmt::Debug;

/// A lifecycle event reported by a compartment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryEvent {
    /// A message was compressed and framed successfully.
    MessageCompressed {
        /// Application payload size in bytes.
        plain_size: usize,
        /// Final SigComp message size in bytes.
        compressed_size: usize,
    },
    /// The compression basis switched to a newer state.
    ActiveStateChanged {
        /// Priority of the new active state.
        prio: u16,
        /// Sequence id of the new active state.
        zid: u16,
    },
    /// A tracked state was dropped from local bookkeeping.
    StateDropped {
        /// Priority of the dropped state.
        prio: u16,
        /// Sequence id of the dropped state.
        zid: u16,
    },
    /// An inbound feedback item was malformed or referenced no known state.
    FeedbackIgnored,
}

/// Receiver for compartment telemetry events.
pub trait TelemetrySink: Send + Sync + Debug {
    /// Records one event. Must not block.
    fn record(&self, event: TelemetryEvent);
}

/// A sink that discards all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTelemetry;

impl TelemetrySink for NullTelemetry {
    fn record(&self, _event: TelemetryEvent) {}
}

/// Test utilities for capturing telemetry.
pub mod recording {
    use std::sync::Mutex;

    use super::*;

    /// A sink that stores every event for later inspection in tests.
    #[derive(Debug, Default)]
    pub struct RecordingSink {
        events: Mutex<Vec<TelemetryEvent>>,
    }

    impl RecordingSink {
        /// Creates an empty recording sink.
        pub fn new() -> Self {
            Self::default()
        }

        /// All events recorded so far, in order.
        pub fn events(&self) -> Vec<TelemetryEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    impl TelemetrySink for RecordingSink {
        fn record(&self, event: TelemetryEvent) {
            self.events.lock().unwrap().push(event);
        }
    }
}
