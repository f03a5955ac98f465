//! SigComp wire framing: the RFC 3320 message header and the
//! returned-parameters block, plus inbound feedback-item parsing.

pub mod header;
pub mod params;

pub use header::{BytecodeRef, generate_sigcomp_header};
pub use params::{LocalCapabilities, parse_feedback_item, write_returned_params};
