//! Engine session layer
//!
//! Everything above the wire protocol: session lifecycle, host configuration
//! and its wire translation, open-file tracking, the recognized-extension set
//! and span-class aggregation.

pub mod config;
pub mod error;
pub mod extensions;
pub mod files;
pub mod session;
pub mod span_classes;
pub mod testing;

pub use config::{EngineConfig, EngineConfigBuilder, LanguageConfig, ProjectSupport, SessionConfig};
pub use error::{ConfigError, SessionError};
pub use extensions::ExtensionRegistry;
pub use files::FileRegistry;
pub use session::EngineSession;
pub use span_classes::SpanClassRegistry;
