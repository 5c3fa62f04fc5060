//! Error types for engine sessions

use crate::io::process::ProcessError;
use crate::protocol::dispatcher::DispatchError;
use crate::protocol::messages::FileId;

/// Errors surfaced by an engine session.
///
/// Only two kinds are fatal: `ChannelClosed` means the connection has been
/// torn down, and `VersionMismatch` means the engine rejected the handshake —
/// in both cases the session is dead and the host must start a new one.
/// Everything else degrades gracefully.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Send attempted after the connection was torn down.
    #[error("engine channel closed")]
    ChannelClosed,

    /// The engine rejected the version-check handshake. Fatal: the session
    /// refuses all further sends and the engine process must be restarted.
    #[error("protocol version mismatch: engine expects {expected}, client offered {actual}")]
    VersionMismatch { expected: String, actual: String },

    /// Lifecycle gate violation: the operation references a file that is not
    /// currently between its FileLoaded and FileUnloaded messages.
    #[error("file {file:?} is not loaded")]
    FileNotLoaded { file: FileId },

    /// Inbound message dropped for lack of a registered handler. Non-fatal;
    /// reported for diagnostics while dispatch continues.
    #[error(transparent)]
    UnroutedMessage(#[from] DispatchError),

    /// Span-class lookup miss. Callers that only need a display color should
    /// use the fallback-rendering path instead, which never fails.
    #[error("unknown span class: {name}")]
    UnknownSpanClass { name: String },

    /// Engine process management failure (spawn, stop).
    #[error("process error: {0}")]
    Process(#[from] ProcessError),

    /// Configuration validation failure.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Missing required configuration field.
    #[error("missing required field: {field}")]
    MissingField { field: String },

    /// A session without languages can never forward a file to the engine.
    #[error("no languages configured")]
    NoLanguages,
}

impl ConfigError {
    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_conversion() {
        let config_error = ConfigError::missing_field("engine_path");
        let session_error: SessionError = config_error.into();
        assert!(matches!(session_error, SessionError::Config(_)));
    }

    #[test]
    fn test_dispatch_error_conversion() {
        let dispatch_error = DispatchError::Unrouted { cid: 9 };
        let session_error: SessionError = dispatch_error.into();
        assert!(matches!(session_error, SessionError::UnroutedMessage(_)));
    }
}
