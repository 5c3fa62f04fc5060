//! Recognized file extensions
//!
//! Built once per session from the configured languages; gates which files
//! are forwarded to the engine at all. Reconfiguration requires a new
//! session, so the set never changes after construction.

use std::collections::HashSet;
use std::path::Path;

use crate::session::config::SessionConfig;

/// Case-insensitive union of every configured language's extensions.
#[derive(Debug, Clone)]
pub struct ExtensionRegistry {
    /// Extensions with leading dot, lowercased.
    extensions: HashSet<String>,
}

impl ExtensionRegistry {
    /// Derive the registry from a session configuration.
    pub fn new(config: &SessionConfig) -> Self {
        let mut extensions = HashSet::new();
        for language in &config.languages {
            for extension in &language.extensions {
                extensions.insert(extension.to_lowercase());
            }
        }
        Self { extensions }
    }

    /// Exact case-insensitive membership test for an extension with leading
    /// dot, e.g. `".json"`.
    pub fn is_supported(&self, extension: &str) -> bool {
        self.extensions.contains(&extension.to_lowercase())
    }

    /// Whether a path's extension belongs to any configured language.
    ///
    /// Paths without an extension are never supported.
    pub fn supports_path(&self, path: &Path) -> bool {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(extension) => self.is_supported(&format!(".{extension}")),
            None => false,
        }
    }

    /// Number of distinct recognized extensions.
    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::config::{LanguageConfig, ProjectSupport};

    fn config_with_extensions(extensions: Vec<Vec<&str>>) -> SessionConfig {
        SessionConfig {
            project_support: ProjectSupport {
                caption: "Test".to_string(),
                type_full_name: "Test.Support".to_string(),
                path: String::new(),
            },
            languages: extensions
                .into_iter()
                .enumerate()
                .map(|(i, exts)| LanguageConfig {
                    name: format!("Lang{i}"),
                    path: String::new(),
                    extensions: exts.into_iter().map(str::to_string).collect(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_membership_is_case_insensitive() {
        let registry = ExtensionRegistry::new(&config_with_extensions(vec![vec![".foo"]]));

        assert!(registry.is_supported(".foo"));
        assert!(registry.is_supported(".FOO"));
        assert!(registry.is_supported(".Foo"));
        assert!(!registry.is_supported(".bar"));
    }

    #[test]
    fn test_union_across_languages() {
        let registry = ExtensionRegistry::new(&config_with_extensions(vec![
            vec![".foo", ".FOO"],
            vec![".bar"],
        ]));

        // Case variants collapse into one entry
        assert_eq!(registry.len(), 2);
        assert!(registry.is_supported(".foo"));
        assert!(registry.is_supported(".bar"));
    }

    #[test]
    fn test_supports_path() {
        let registry = ExtensionRegistry::new(&config_with_extensions(vec![vec![".json"]]));

        assert!(registry.supports_path(Path::new("/solution/a.json")));
        assert!(registry.supports_path(Path::new("b.JSON")));
        assert!(!registry.supports_path(Path::new("c.txt")));
        assert!(!registry.supports_path(Path::new("no_extension")));
    }
}
