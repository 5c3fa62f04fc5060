//! Wire message schema for the engine protocol
//!
//! Closed, tagged message types for both directions. The dispatcher routes on
//! the envelope's correlation identifier and pattern-matches on the message
//! variant, so the compiler checks exhaustiveness whenever the catalogue
//! grows.

use serde::{Deserialize, Serialize};

/// Protocol compatibility token carried by the version-check handshake.
///
/// Regenerated whenever the wire schema changes incompatibly; the engine
/// rejects sessions offering a token it does not recognize.
pub const PROTOCOL_VERSION: &str = "d3b6a5f1-8c42-4e9b-b7d0-2f61c0a97e35";

/// Assembly identity of the core library every project implicitly references.
pub const CORE_LIBRARY_IDENTITY: &str =
    "mscorlib, Version=4.0.0.0, Culture=neutral, PublicKeyToken=b77a5c561934e089";

/// Prefix tagging a reference spec as a file path.
pub const FILE_REFERENCE_PREFIX: &str = "File:";

/// Prefix tagging a reference spec as an assembly identity.
pub const FULL_NAME_REFERENCE_PREFIX: &str = "FullName:";

/// Wire value of the reserved broadcast correlation identifier.
pub const BROADCAST_CID: i64 = -1;

// ============================================================================
// Identifiers
// ============================================================================

/// Opaque solution identifier, stable for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SolutionId(pub i32);

/// Opaque project identifier, stable for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub i32);

/// Opaque file identifier, stable for the session and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub i32);

/// Version of a file's buffer content.
///
/// Strictly increases on every edit; accompanies any message referring to
/// buffer content so the engine can discard stale analyses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileVersion(pub i32);

impl FileVersion {
    /// Version of a freshly opened, unedited buffer.
    pub const INITIAL: FileVersion = FileVersion(0);
}

// ============================================================================
// Span Classification
// ============================================================================

/// One lexical/syntactic category the engine classifies spans into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanClassInfo {
    /// Fully-qualified class name, e.g. `Language.SpanClasses.Keyword`.
    pub full_name: String,

    /// Packed 32-bit ARGB foreground color.
    pub foreground_color: u32,
}

/// Decoded display color for a span class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderColor {
    pub a: u8,
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl RenderColor {
    /// Color used for span classes no loaded language has declared: opaque
    /// black. Deterministic by design so unknown classes render identically
    /// everywhere.
    pub const FALLBACK: RenderColor = RenderColor {
        a: 0xFF,
        r: 0x00,
        g: 0x00,
        b: 0x00,
    };

    /// Decode a packed 32-bit ARGB value, byte order A,R,G,B from most- to
    /// least-significant byte.
    pub fn from_argb(packed: u32) -> Self {
        Self {
            a: (packed >> 24) as u8,
            r: (packed >> 16) as u8,
            g: (packed >> 8) as u8,
            b: packed as u8,
        }
    }
}

// ============================================================================
// Wire Configuration
// ============================================================================

/// Wire-level session configuration sent with every ProjectStartLoading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub project_support: ProjectSupportInfo,
    pub languages: Vec<LanguageInfo>,
    pub script_paths: Vec<String>,
}

/// Project-support descriptor, copied verbatim from the host configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSupportInfo {
    pub caption: String,
    pub type_full_name: String,
    pub path: String,
}

/// Wire description of one configured language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageInfo {
    pub name: String,

    /// Path to the module defining the language.
    pub path: String,

    /// Always empty in the current protocol revision; the field is reserved
    /// for dynamically registered extensions.
    pub dynamic_extensions: Vec<DynamicExtensionInfo>,
}

/// Dynamically registered language extension (reserved, currently unused).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicExtensionInfo {
    pub name: String,
    pub path: String,
}

// ============================================================================
// Client → Engine Messages
// ============================================================================

/// Messages the client sends to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "msg", content = "args")]
pub enum ClientMessage {
    /// Version-check handshake; always the first message of a session.
    CheckVersion { version: String },

    SolutionStartLoading { solution: SolutionId, path: String },

    SolutionLoaded { solution: SolutionId },

    ProjectStartLoading {
        project: ProjectId,
        path: String,
        config: Config,
    },

    ProjectLoaded { project: ProjectId },

    /// `reference` is a tagged string: `"File:" + path` or
    /// `"FullName:" + assemblyIdentity`.
    ReferenceLoaded { project: ProjectId, reference: String },

    ProjectUnloaded { project: ProjectId },

    FileLoaded {
        project: ProjectId,
        path: String,
        file: FileId,
        version: FileVersion,
    },

    FileUnloaded { file: FileId },

    SetCaretPos {
        file: FileId,
        version: FileVersion,
        pos: u64,
    },
}

// ============================================================================
// Engine → Client Messages
// ============================================================================

/// Messages the engine sends to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "msg", content = "args")]
pub enum EngineMessage {
    /// Unsolicited: one language finished loading its definitions; carries
    /// that language's span-class batch.
    LanguageLoaded { span_class_infos: Vec<SpanClassInfo> },

    /// Unsolicited: the version-check handshake offered an incompatible
    /// protocol token. Fatal to the session.
    VersionRejected { expected: String, actual: String },

    /// Generic solicited completion reply.
    Ack,

    /// Synthesized locally by the receive path when the transport fails;
    /// never sent by the engine.
    TransportFailed { reason: String },
}

// ============================================================================
// Envelopes
// ============================================================================

/// Outbound frame: correlation identifier plus payload.
///
/// Fire-and-forget notifications carry the broadcast identifier; requests
/// carry their allocated per-request identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundEnvelope {
    pub cid: i64,
    pub message: ClientMessage,
}

impl OutboundEnvelope {
    /// Wrap a fire-and-forget notification.
    pub fn notification(message: ClientMessage) -> Self {
        Self {
            cid: BROADCAST_CID,
            message,
        }
    }
}

/// Inbound frame: correlation identifier plus payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEnvelope {
    pub cid: i64,
    pub message: EngineMessage,
}

impl InboundEnvelope {
    /// Wrap an unsolicited engine message.
    pub fn broadcast(message: EngineMessage) -> Self {
        Self {
            cid: BROADCAST_CID,
            message,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_color_decodes_argb_most_significant_first() {
        let color = RenderColor::from_argb(0x8040_20FF);
        assert_eq!(color.a, 0x80);
        assert_eq!(color.r, 0x40);
        assert_eq!(color.g, 0x20);
        assert_eq!(color.b, 0xFF);
    }

    #[test]
    fn test_fallback_color_is_opaque_black() {
        assert_eq!(
            RenderColor::FALLBACK,
            RenderColor {
                a: 0xFF,
                r: 0,
                g: 0,
                b: 0
            }
        );
    }

    #[test]
    fn test_client_message_wire_shape() {
        let envelope = OutboundEnvelope::notification(ClientMessage::SetCaretPos {
            file: FileId(3),
            version: FileVersion(7),
            pos: 42,
        });

        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            value,
            json!({
                "cid": -1,
                "message": {
                    "msg": "SetCaretPos",
                    "args": { "file": 3, "version": 7, "pos": 42 }
                }
            })
        );
    }

    #[test]
    fn test_engine_message_round_trip() {
        let envelope = InboundEnvelope::broadcast(EngineMessage::LanguageLoaded {
            span_class_infos: vec![SpanClassInfo {
                full_name: "Json.SpanClasses.String".to_string(),
                foreground_color: 0xFFA3_1515,
            }],
        });

        let encoded = serde_json::to_string(&envelope).unwrap();
        let decoded: InboundEnvelope = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_unknown_engine_message_variant_is_rejected() {
        let frame = r#"{"cid":-1,"message":{"msg":"NotARealMessage"}}"#;
        assert!(serde_json::from_str::<InboundEnvelope>(frame).is_err());
    }
}
