//! Generic I/O layer
//!
//! Transport abstraction and engine process management. Nothing in this
//! module knows about the wire protocol; see `crate::protocol` for framing
//! and message schema.

pub mod process;
pub mod transport;

pub use process::{EngineProcess, ProcessError, ProcessState, StopMode};
pub use transport::{MockHandle, MockTransport, StdioTransport, Transport};
