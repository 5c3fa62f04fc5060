//! Session and engine configuration
//!
//! [`SessionConfig`] describes what the host wants analyzed: the configured
//! languages and the project-support descriptor. It is constructed once per
//! session and translated into a wire [`Config`] on every project load.
//! [`EngineConfig`] describes how to start the engine process and is built
//! through [`EngineConfigBuilder`] with validation.

use std::path::PathBuf;
use std::sync::Arc;

use crate::protocol::messages::{Config, LanguageInfo, ProjectSupportInfo};
use crate::session::error::ConfigError;

// ============================================================================
// Session Configuration
// ============================================================================

/// Immutable description of one supported language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageConfig {
    /// Language name, e.g. `"Json"`.
    pub name: String,

    /// Path to the module defining the language.
    pub path: String,

    /// File extensions this language recognizes, with leading dot
    /// (e.g. `".json"`). Matched case-insensitively.
    pub extensions: Vec<String>,
}

/// Project-support descriptor forwarded to the engine verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSupport {
    pub caption: String,
    pub type_full_name: String,
    pub path: String,
}

/// Host-side session configuration: an ordered language list plus the
/// project-support descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub project_support: ProjectSupport,
    pub languages: Vec<LanguageConfig>,
}

impl SessionConfig {
    /// Validate the configuration before a session is constructed from it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.languages.is_empty() {
            return Err(ConfigError::NoLanguages);
        }
        for language in &self.languages {
            if language.name.is_empty() {
                return Err(ConfigError::missing_field("language.name"));
            }
        }
        Ok(())
    }

    /// Translate into the wire-level configuration message.
    ///
    /// Pure and deterministic: project-support fields are copied verbatim,
    /// each language maps to a wire [`LanguageInfo`] with an empty
    /// dynamic-extension list (a fixed placeholder in the current protocol
    /// revision), and the script-path list is left empty. Called identically
    /// on every project load.
    pub fn to_wire(&self) -> Config {
        Config {
            project_support: ProjectSupportInfo {
                caption: self.project_support.caption.clone(),
                type_full_name: self.project_support.type_full_name.clone(),
                path: self.project_support.path.clone(),
            },
            languages: self
                .languages
                .iter()
                .map(|language| LanguageInfo {
                    name: language.name.clone(),
                    path: language.path.clone(),
                    dynamic_extensions: Vec::new(),
                })
                .collect(),
            script_paths: Vec::new(),
        }
    }
}

// ============================================================================
// Engine Process Configuration
// ============================================================================

/// Configuration for starting the engine process.
#[derive(Clone)]
pub struct EngineConfig {
    /// Path to the engine executable.
    pub engine_path: String,

    /// Additional engine command-line arguments.
    pub extra_args: Vec<String>,

    /// Working directory for the engine process (optional).
    pub working_directory: Option<PathBuf>,

    /// Optional handler for engine stderr lines.
    pub stderr_handler: Option<Arc<dyn Fn(String) + Send + Sync>>,
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("engine_path", &self.engine_path)
            .field("extra_args", &self.extra_args)
            .field("working_directory", &self.working_directory)
            .field(
                "stderr_handler",
                &self.stderr_handler.as_ref().map(|_| "Fn(String)"),
            )
            .finish()
    }
}

/// Builder for [`EngineConfig`] with validation.
#[derive(Default)]
pub struct EngineConfigBuilder {
    engine_path: Option<String>,
    extra_args: Vec<String>,
    working_directory: Option<PathBuf>,
    stderr_handler: Option<Arc<dyn Fn(String) + Send + Sync>>,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the engine executable path
    pub fn engine_path(mut self, path: impl Into<String>) -> Self {
        self.engine_path = Some(path.into());
        self
    }

    /// Add one engine command-line argument
    pub fn add_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    /// Set the engine process working directory
    pub fn working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    /// Install a handler for engine stderr lines
    pub fn stderr_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.stderr_handler = Some(Arc::new(handler));
        self
    }

    /// Build the configuration, validating required fields
    pub fn build(self) -> Result<EngineConfig, ConfigError> {
        let engine_path = self
            .engine_path
            .filter(|path| !path.is_empty())
            .ok_or_else(|| ConfigError::missing_field("engine_path"))?;

        Ok(EngineConfig {
            engine_path,
            extra_args: self.extra_args,
            working_directory: self.working_directory,
            stderr_handler: self.stderr_handler,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> SessionConfig {
        SessionConfig {
            project_support: ProjectSupport {
                caption: "Sample".to_string(),
                type_full_name: "Sample.ProjectSupport".to_string(),
                path: "/opt/sample/support.dll".to_string(),
            },
            languages: vec![
                LanguageConfig {
                    name: "Json".to_string(),
                    path: "/opt/sample/json.dll".to_string(),
                    extensions: vec![".json".to_string()],
                },
                LanguageConfig {
                    name: "Calc".to_string(),
                    path: "/opt/sample/calc.dll".to_string(),
                    extensions: vec![".calc".to_string(), ".cl".to_string()],
                },
            ],
        }
    }

    #[test]
    fn test_wire_translation_is_deterministic() {
        let config = sample_config();

        let first = serde_json::to_string(&config.to_wire()).unwrap();
        let second = serde_json::to_string(&config.to_wire()).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_wire_translation_copies_fields_and_leaves_placeholders_empty() {
        let wire = sample_config().to_wire();

        assert_eq!(wire.project_support.caption, "Sample");
        assert_eq!(wire.project_support.type_full_name, "Sample.ProjectSupport");
        assert_eq!(wire.languages.len(), 2);
        assert_eq!(wire.languages[0].name, "Json");
        assert!(wire.languages[0].dynamic_extensions.is_empty());
        assert!(wire.languages[1].dynamic_extensions.is_empty());
        assert!(wire.script_paths.is_empty());
    }

    #[test]
    fn test_validate_rejects_empty_language_list() {
        let mut config = sample_config();
        config.languages.clear();
        assert_eq!(config.validate(), Err(ConfigError::NoLanguages));
    }

    #[test]
    fn test_validate_rejects_unnamed_language() {
        let mut config = sample_config();
        config.languages[0].name.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingField { .. })
        ));
    }

    #[test]
    fn test_engine_config_builder() {
        let config = EngineConfigBuilder::new()
            .engine_path("/usr/bin/analysis-engine")
            .add_arg("--incremental")
            .working_directory("/tmp")
            .build()
            .unwrap();

        assert_eq!(config.engine_path, "/usr/bin/analysis-engine");
        assert_eq!(config.extra_args, vec!["--incremental"]);
        assert_eq!(config.working_directory, Some(PathBuf::from("/tmp")));
    }

    #[test]
    fn test_engine_config_builder_requires_path() {
        let result = EngineConfigBuilder::new().build();
        assert!(matches!(result, Err(ConfigError::MissingField { .. })));

        let result = EngineConfigBuilder::new().engine_path("").build();
        assert!(matches!(result, Err(ConfigError::MissingField { .. })));
    }
}
