//! Engine wire protocol
//!
//! Layered the same way the connection processes data:
//!
//! - **Framing**: Content-Length frames over a raw byte transport
//! - **Messages**: closed, tagged message enums for both directions
//! - **Dispatcher**: correlation-identifier routing of inbound messages

pub mod dispatcher;
pub mod framing;
pub mod messages;

pub use dispatcher::{CorrelationId, DispatchError, RequestId, ResponseDispatcher};
pub use framing::{Framed, FramingError};
pub use messages::{
    ClientMessage, Config, EngineMessage, FileId, FileVersion, InboundEnvelope, OutboundEnvelope,
    ProjectId, RenderColor, SolutionId, SpanClassInfo,
};
