//! Editor-side client for an out-of-process incremental language-analysis
//! engine.
//!
//! The crate bridges an interactive editor front-end with the engine process:
//! it converts editor lifecycle events (solution/project/file open-close,
//! caret movement) into an ordered outbound message stream, correlates
//! inbound responses — including unsolicited engine notifications — back to
//! the right handler, and aggregates the span-classification descriptors the
//! engine streams back as each configured language finishes loading.
//!
//! Layering, bottom up:
//!
//! - [`io`]: raw byte transport and engine process management
//! - [`protocol`]: Content-Length framing, the closed message catalogue and
//!   correlation-identifier dispatch
//! - [`session`]: [`EngineSession`] and the state it owns (open files,
//!   recognized extensions, span classes)
//!
//! # Example
//!
//! ```no_run
//! use analyzer_client::session::{
//!     EngineConfigBuilder, EngineSession, LanguageConfig, ProjectSupport, SessionConfig,
//! };
//! use analyzer_client::protocol::messages::{FileId, FileVersion, ProjectId};
//!
//! # async fn run() -> Result<(), analyzer_client::session::SessionError> {
//! let engine = EngineConfigBuilder::new()
//!     .engine_path("/usr/bin/analysis-engine")
//!     .build()?;
//! let config = SessionConfig {
//!     project_support: ProjectSupport {
//!         caption: "Json".into(),
//!         type_full_name: "Json.ProjectSupport".into(),
//!         path: "/opt/json/support.dll".into(),
//!     },
//!     languages: vec![LanguageConfig {
//!         name: "Json".into(),
//!         path: "/opt/json/language.dll".into(),
//!         extensions: vec![".json".into()],
//!     }],
//! };
//!
//! let session = EngineSession::spawn(engine, config).await?;
//! session.project_start_loading(ProjectId(1), "/solution/app.proj")?;
//! session.file_added(ProjectId(1), "/solution/a.json", FileId(1), FileVersion::INITIAL)?;
//! session.caret_moved(FileId(1), FileVersion::INITIAL, 0)?;
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod io;
pub mod logging;
pub mod protocol;
pub mod session;

#[cfg(test)]
mod test_utils;

pub use protocol::messages::{FileId, FileVersion, ProjectId, SolutionId};
pub use session::{EngineSession, SessionConfig, SessionError};
