//! Testing utilities
//!
//! Helpers for exercising a session against a [`MockTransport`]: a canonical
//! single-language configuration, frame encoding/decoding for both
//! directions, and a polling helper for the asynchronous pump.

use std::time::Duration;

use crate::io::transport::{MockHandle, MockTransport};
use crate::protocol::messages::{InboundEnvelope, OutboundEnvelope};
use crate::session::config::{LanguageConfig, ProjectSupport, SessionConfig};
use crate::session::session::EngineSession;

/// A minimal single-language configuration (Json, `.json`).
pub fn sample_session_config() -> SessionConfig {
    SessionConfig {
        project_support: ProjectSupport {
            caption: "Json".to_string(),
            type_full_name: "Json.ProjectSupport".to_string(),
            path: "/opt/json/support.dll".to_string(),
        },
        languages: vec![LanguageConfig {
            name: "Json".to_string(),
            path: "/opt/json/language.dll".to_string(),
            extensions: vec![".json".to_string()],
        }],
    }
}

/// Connect a session over a mock transport, returning the test-side handle.
pub fn connect_mock(config: SessionConfig) -> (EngineSession, MockHandle) {
    let (transport, handle) = MockTransport::new();
    let session = EngineSession::connect(config, transport).expect("mock session connects");
    (session, handle)
}

/// Encode one inbound envelope the way the engine would put it on the wire.
pub fn encode_inbound(envelope: &InboundEnvelope) -> Vec<u8> {
    let body = serde_json::to_string(envelope).expect("inbound envelope encodes");
    format!("Content-Length: {}\r\n\r\n{}", body.len(), body).into_bytes()
}

/// Decode every complete outbound frame from concatenated sent bytes.
pub fn decode_outbound(mut bytes: &[u8]) -> Vec<OutboundEnvelope> {
    let mut envelopes = Vec::new();

    while !bytes.is_empty() {
        let header_end = bytes
            .windows(4)
            .position(|window| window == b"\r\n\r\n")
            .expect("frame header separator present");

        let header = std::str::from_utf8(&bytes[..header_end]).expect("header is UTF-8");
        let length: usize = header
            .lines()
            .find_map(|line| line.strip_prefix("Content-Length:"))
            .expect("Content-Length header present")
            .trim()
            .parse()
            .expect("content length parses");

        let body_start = header_end + 4;
        let body = &bytes[body_start..body_start + length];
        envelopes.push(serde_json::from_slice(body).expect("outbound envelope decodes"));

        bytes = &bytes[body_start + length..];
    }

    envelopes
}

/// Poll until `condition` holds, panicking after a generous timeout.
pub async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("Timed out waiting for: {what}");
}
