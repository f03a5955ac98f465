//! Common test utilities for the dynamic-compression integration tests.
//!
//! Provides a mock compression algorithm whose "compression" is a verbatim
//! copy (so output sizes are predictable), plus builders wiring a compartment
//! to a shared mock clock and a recording telemetry sink.

#![allow(dead_code)] // Allow dead code for unused test helpers during development

use std::any::Any;
use std::sync::Arc;

use bytes::Bytes;
use sha1::{Digest, Sha1};

use sigdyn::telemetry::recording::RecordingSink;
use sigdyn::time::mock_clock::MockClock;
use sigdyn::{
    AlgorithmParams, CompressedChunk, CompressionAlgorithm, CompressionInfo, CompressionStream,
    DynCompartment, DynCompressError, DynConfig, PeerFeedback, StateId, Transport,
};

/// Peer decompression memory used by default in tests.
pub const TEST_REMOTE_DMS: usize = 65536;
/// Peer state memory announced in test feedback.
pub const TEST_REMOTE_SMS: usize = 8192;

/// Dictionary-tracking stream context for [`MockDeflate`].
#[derive(Debug, Default)]
pub struct MockStream {
    /// Everything this context has "compressed" so far.
    pub dict: Vec<u8>,
}

impl CompressionStream for MockStream {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A compressor stand-in that copies input verbatim and hashes it for the
/// state id. Dictionary continuity is tracked so tests can assert the
/// catch-up path on active-state switches.
#[derive(Debug)]
pub struct MockDeflate {
    params: AlgorithmParams,
}

impl MockDeflate {
    pub fn new() -> Self {
        Self {
            params: AlgorithmParams {
                name: "mock-deflate",
                bytecode: Bytes::from_static(&[0xA0; 128]),
                code_start: 128,
                state_size: 1024,
                min_access_len: 6,
                local_state_size: 4096,
                returned_params_location: 512,
            },
        }
    }

    /// Same algorithm with a custom peer-side state footprint.
    pub fn with_state_size(state_size: usize) -> Self {
        let mut this = Self::new();
        this.params.state_size = state_size;
        this
    }
}

impl Default for MockDeflate {
    fn default() -> Self {
        Self::new()
    }
}

impl CompressionAlgorithm for MockDeflate {
    fn params(&self) -> &AlgorithmParams {
        &self.params
    }

    fn alloc_stream(&self) -> Result<Box<dyn CompressionStream>, DynCompressError> {
        Ok(Box::new(MockStream::default()))
    }

    fn compress(
        &self,
        stream: &mut dyn CompressionStream,
        base: &dyn CompressionStream,
        plain: &[u8],
        out: &mut [u8],
    ) -> Result<CompressedChunk, DynCompressError> {
        if out.len() < plain.len() {
            return Err(DynCompressError::Compressor(
                "output buffer too small".into(),
            ));
        }
        let base_dict = base
            .as_any()
            .downcast_ref::<MockStream>()
            .map(|s| s.dict.clone())
            .unwrap_or_default();
        let stream = stream
            .as_any_mut()
            .downcast_mut::<MockStream>()
            .ok_or_else(|| DynCompressError::Compressor("unexpected stream type".into()))?;
        stream.dict = base_dict;
        stream.dict.extend_from_slice(plain);
        out[..plain.len()].copy_from_slice(plain);

        let mut hasher = Sha1::new();
        hasher.update(&stream.dict);
        Ok(CompressedChunk {
            len: plain.len(),
            state_id: StateId(hasher.finalize().into()),
        })
    }

    fn absorb(
        &self,
        stream: &mut dyn CompressionStream,
        plain: &[u8],
    ) -> Result<(), DynCompressError> {
        let stream = stream
            .as_any_mut()
            .downcast_mut::<MockStream>()
            .ok_or_else(|| DynCompressError::Compressor("unexpected stream type".into()))?;
        stream.dict.extend_from_slice(plain);
        Ok(())
    }
}

/// A compartment wired to controllable test doubles.
pub struct TestHarness {
    pub compartment: DynCompartment,
    pub clock: Arc<MockClock>,
    pub telemetry: Arc<RecordingSink>,
}

/// Builds a compartment around [`MockDeflate`] with the given config.
pub fn harness_with_config(config: DynConfig) -> TestHarness {
    harness_with_algo(MockDeflate::new(), config)
}

/// Builds a compartment around a custom algorithm instance.
pub fn harness_with_algo(algo: MockDeflate, config: DynConfig) -> TestHarness {
    let algo: Arc<dyn CompressionAlgorithm> = Arc::new(algo);
    let clock = Arc::new(MockClock::new(1000));
    let telemetry = Arc::new(RecordingSink::new());
    let init_stream = algo.alloc_stream().unwrap();
    let compartment = DynCompartment::new(
        Arc::clone(&algo),
        init_stream,
        clock.clone() as Arc<dyn sigdyn::Clock>,
        telemetry.clone() as Arc<dyn sigdyn::TelemetrySink>,
        &config,
    );
    TestHarness {
        compartment,
        clock,
        telemetry,
    }
}

/// Builds a compartment with the default config.
pub fn default_harness() -> TestHarness {
    harness_with_config(DynConfig::default())
}

/// Per-message info for an unreliable datagram transport.
pub fn udp_info() -> CompressionInfo<'static> {
    CompressionInfo {
        transport: Transport::UDP,
        remote_dms: TEST_REMOTE_DMS,
        requested_feedback_item: &[],
        capabilities: None,
        local_state_ids: None,
    }
}

/// Per-message info for a reliable stream transport.
pub fn tcp_info() -> CompressionInfo<'static> {
    CompressionInfo {
        transport: Transport::TCP,
        remote_dms: TEST_REMOTE_DMS,
        requested_feedback_item: &[],
        capabilities: None,
        local_state_ids: None,
    }
}

/// Feedback acknowledging the state `(prio, zid)`.
pub fn ack_item(prio: u16, zid: u16) -> [u8; 4] {
    let p = prio.to_be_bytes();
    let z = zid.to_be_bytes();
    [p[0], p[1], z[0], z[1]]
}

/// Wraps a feedback item buffer with the default remote SMS.
pub fn feedback<'a>(item: &'a [u8]) -> PeerFeedback<'a> {
    PeerFeedback {
        returned_feedback_item: item,
        remote_sms: TEST_REMOTE_SMS,
    }
}
