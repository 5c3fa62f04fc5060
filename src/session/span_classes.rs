//! Span-class aggregation
//!
//! The engine streams span-class descriptors one batch per language, as that
//! language's definitions finish loading. Batches accumulate in arrival order
//! into an append-only collection; nothing is ever revoked or superseded
//! within a session.
//!
//! The dispatcher's delivery context is the single writer. Readers take an
//! `Arc` snapshot, so a concurrent append is never observed half-applied and
//! lookups from the editor context stay lock-free after the snapshot swap.

use std::sync::{Arc, RwLock};

use crate::protocol::messages::{RenderColor, SpanClassInfo};
use crate::session::error::SessionError;

/// Append-only collection of span classes received so far.
pub struct SpanClassRegistry {
    classes: RwLock<Arc<[SpanClassInfo]>>,
}

impl SpanClassRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            classes: RwLock::new(Arc::from([])),
        }
    }

    /// Append one language's batch, preserving arrival order.
    ///
    /// No deduplication: a name collision across two languages yields two
    /// entries, and lookup returns the earlier one. An empty batch leaves the
    /// collection untouched.
    pub fn append(&self, batch: Vec<SpanClassInfo>) {
        if batch.is_empty() {
            return;
        }

        // Intentional .unwrap() - poisoned lock indicates serious bug, panic is appropriate
        let mut classes = self.classes.write().unwrap();
        let mut merged = Vec::with_capacity(classes.len() + batch.len());
        merged.extend_from_slice(&classes);
        merged.extend(batch);
        *classes = Arc::from(merged);
    }

    /// Snapshot of all span classes in arrival order.
    pub fn snapshot(&self) -> Arc<[SpanClassInfo]> {
        // Intentional .unwrap() - poisoned lock indicates serious bug, panic is appropriate
        Arc::clone(&self.classes.read().unwrap())
    }

    /// First span class with the given fully-qualified name, in arrival
    /// order, or `None`.
    pub fn lookup(&self, full_name: &str) -> Option<SpanClassInfo> {
        self.snapshot()
            .iter()
            .find(|info| info.full_name == full_name)
            .cloned()
    }

    /// Like [`lookup`](Self::lookup) but reports a miss as an error.
    pub fn get(&self, full_name: &str) -> Result<SpanClassInfo, SessionError> {
        self.lookup(full_name)
            .ok_or_else(|| SessionError::UnknownSpanClass {
                name: full_name.to_string(),
            })
    }

    /// Decoded display color for a span class.
    ///
    /// Unknown names resolve to [`RenderColor::FALLBACK`] (opaque black); the
    /// miss is traced but never fails, so rendering always has a color.
    pub fn render_color(&self, full_name: &str) -> RenderColor {
        match self.lookup(full_name) {
            Some(info) => RenderColor::from_argb(info.foreground_color),
            None => {
                tracing::debug!("Unknown span class '{}', using fallback color", full_name);
                RenderColor::FALLBACK
            }
        }
    }

    /// Number of span classes received so far.
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }
}

impl Default for SpanClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn class(name: &str, color: u32) -> SpanClassInfo {
        SpanClassInfo {
            full_name: name.to_string(),
            foreground_color: color,
        }
    }

    #[test]
    fn test_batches_accumulate_in_arrival_order() {
        let registry = SpanClassRegistry::new();

        registry.append(vec![class("A", 1), class("B", 2)]);
        registry.append(vec![class("C", 3)]);

        let snapshot = registry.snapshot();
        let names: Vec<&str> = snapshot.iter().map(|c| c.full_name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);

        assert_eq!(registry.lookup("B"), Some(class("B", 2)));
    }

    #[test]
    fn test_empty_batch_is_a_no_op() {
        let registry = SpanClassRegistry::new();

        registry.append(Vec::new());

        assert!(registry.is_empty());
        assert_eq!(registry.lookup("anything"), None);

        // Same after a real batch has arrived
        registry.append(vec![class("A", 1)]);
        registry.append(Vec::new());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_name_collision_keeps_both_first_wins_on_lookup() {
        let registry = SpanClassRegistry::new();

        registry.append(vec![class("Keyword", 0xFF00_0001)]);
        registry.append(vec![class("Keyword", 0xFF00_0002)]);

        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.lookup("Keyword"),
            Some(class("Keyword", 0xFF00_0001))
        );
    }

    #[test]
    fn test_render_color_decodes_known_class() {
        let registry = SpanClassRegistry::new();
        registry.append(vec![class("String", 0xFFA3_1515)]);

        assert_eq!(
            registry.render_color("String"),
            RenderColor {
                a: 0xFF,
                r: 0xA3,
                g: 0x15,
                b: 0x15
            }
        );
    }

    #[test]
    fn test_render_color_falls_back_for_unknown_class() {
        let registry = SpanClassRegistry::new();
        assert_eq!(registry.render_color("Missing"), RenderColor::FALLBACK);

        assert!(matches!(
            registry.get("Missing"),
            Err(SessionError::UnknownSpanClass { .. })
        ));
    }

    #[test]
    fn test_snapshot_is_stable_across_later_appends() {
        let registry = SpanClassRegistry::new();
        registry.append(vec![class("A", 1)]);

        let snapshot = registry.snapshot();
        registry.append(vec![class("B", 2)]);

        // The earlier snapshot still sees exactly one class
        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.len(), 2);
    }
}
