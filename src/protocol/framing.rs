//! Message framing layer
//!
//! The engine protocol frames each JSON message with a Content-Length header:
//!
//! `Content-Length: <length>\r\n\r\n<content>`
//!
//! The framing layer reassembles transport chunks into complete frames and is
//! the only place that deals with partial reads; everything above it sees
//! whole messages.

use crate::io::transport::Transport;
use std::collections::VecDeque;
use std::string::FromUtf8Error;
use tracing::trace;

/// Maximum frame size to prevent memory exhaustion
const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024; // 16MB

/// Error types for message framing
#[derive(Debug, thiserror::Error)]
pub enum FramingError<T: std::error::Error + Send + Sync + 'static> {
    #[error("Transport error: {0}")]
    Transport(T),

    #[error("Invalid frame header: {0}")]
    InvalidHeader(String),

    #[error("Invalid content length: {0}")]
    InvalidContentLength(String),

    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Frame body is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] FromUtf8Error),
}

/// Framing wrapper over a byte transport
///
/// Buffers inbound bytes until a complete frame is available and prefixes
/// every outbound frame with its Content-Length header.
pub struct Framed<T: Transport> {
    /// Underlying transport
    transport: T,

    /// Buffer accumulating partial frames
    receive_buffer: Vec<u8>,

    /// Complete frames ready to be returned
    frame_queue: VecDeque<String>,
}

impl<T: Transport> Framed<T> {
    /// Create a new framing wrapper around a transport
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            receive_buffer: Vec::new(),
            frame_queue: VecDeque::new(),
        }
    }

    /// Send one frame
    pub async fn send(&mut self, frame: &str) -> Result<(), FramingError<T::Error>> {
        let framed = format!("Content-Length: {}\r\n\r\n{}", frame.len(), frame);

        trace!("Framed: sending frame ({} bytes content)", frame.len());

        self.transport
            .send(framed.as_bytes())
            .await
            .map_err(FramingError::Transport)
    }

    /// Receive the next complete frame
    pub async fn receive(&mut self) -> Result<String, FramingError<T::Error>> {
        loop {
            if let Some(frame) = self.frame_queue.pop_front() {
                return Ok(frame);
            }

            let chunk = self
                .transport
                .receive()
                .await
                .map_err(FramingError::Transport)?;
            self.receive_buffer.extend_from_slice(&chunk);

            while let Some(frame) = self.try_extract_frame()? {
                self.frame_queue.push_back(frame);
            }
        }
    }

    /// Close the underlying transport
    pub async fn close(&mut self) -> Result<(), FramingError<T::Error>> {
        self.transport
            .close()
            .await
            .map_err(FramingError::Transport)
    }

    /// Check if the underlying transport is still active
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Try to extract one complete frame from the receive buffer
    ///
    /// Returns `Ok(None)` if more data is needed.
    fn try_extract_frame(&mut self) -> Result<Option<String>, FramingError<T::Error>> {
        let header_end = match find_header_end(&self.receive_buffer) {
            Some(pos) => pos,
            None => return Ok(None),
        };

        let content_length = parse_content_length::<T>(&self.receive_buffer[..header_end])?;
        let content_start = header_end + 4;

        if self.receive_buffer.len() - content_start < content_length {
            trace!(
                "Framed: incomplete frame - need {} more bytes",
                content_length - (self.receive_buffer.len() - content_start)
            );
            return Ok(None);
        }

        let body: Vec<u8> = self
            .receive_buffer
            .drain(..content_start + content_length)
            .skip(content_start)
            .collect();

        let frame = String::from_utf8(body)?;
        trace!("Framed: extracted complete frame ({} bytes)", content_length);
        Ok(Some(frame))
    }
}

/// Locate the `\r\n\r\n` header separator
fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|window| window == b"\r\n\r\n")
}

/// Parse the Content-Length value out of a frame header block
fn parse_content_length<T: Transport>(
    header: &[u8],
) -> Result<usize, FramingError<T::Error>> {
    let header = std::str::from_utf8(header)
        .map_err(|e| FramingError::InvalidHeader(e.to_string()))?;

    for line in header.lines() {
        if let Some(value) = line.strip_prefix("Content-Length:") {
            let value = value.trim();
            let length = value
                .parse::<usize>()
                .map_err(|_| FramingError::InvalidContentLength(value.to_string()))?;

            if length > MAX_FRAME_SIZE {
                return Err(FramingError::FrameTooLarge {
                    size: length,
                    max: MAX_FRAME_SIZE,
                });
            }

            return Ok(length);
        }
    }

    Err(FramingError::InvalidHeader(
        "Missing Content-Length header".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::transport::MockTransport;

    fn framed_bytes(content: &str) -> Vec<u8> {
        format!("Content-Length: {}\r\n\r\n{}", content.len(), content).into_bytes()
    }

    #[tokio::test]
    async fn test_framing_send() {
        let (transport, handle) = MockTransport::new();
        let mut framed = Framed::new(transport);

        let frame = r#"{"cid":-1,"message":{"msg":"SolutionLoaded"}}"#;
        framed.send(frame).await.unwrap();

        assert_eq!(handle.sent_messages(), vec![framed_bytes(frame)]);
    }

    #[tokio::test]
    async fn test_framing_receive() {
        let frame = r#"{"cid":-1,"message":{"msg":"Ack"}}"#;
        let (transport, _handle) = MockTransport::with_inbound(vec![framed_bytes(frame)]);
        let mut framed = Framed::new(transport);

        assert_eq!(framed.receive().await.unwrap(), frame);
    }

    #[tokio::test]
    async fn test_framing_reassembles_split_frame() {
        let frame = r#"{"cid":7,"message":{"msg":"Ack"}}"#;
        let bytes = framed_bytes(frame);
        let (head, tail) = bytes.split_at(bytes.len() / 2);

        let (transport, _handle) =
            MockTransport::with_inbound(vec![head.to_vec(), tail.to_vec()]);
        let mut framed = Framed::new(transport);

        assert_eq!(framed.receive().await.unwrap(), frame);
    }

    #[tokio::test]
    async fn test_framing_multiple_frames_in_one_chunk() {
        let frame1 = r#"{"cid":1,"message":{"msg":"Ack"}}"#;
        let frame2 = r#"{"cid":2,"message":{"msg":"Ack"}}"#;

        let mut combined = framed_bytes(frame1);
        combined.extend(framed_bytes(frame2));

        let (transport, _handle) = MockTransport::with_inbound(vec![combined]);
        let mut framed = Framed::new(transport);

        assert_eq!(framed.receive().await.unwrap(), frame1);
        assert_eq!(framed.receive().await.unwrap(), frame2);
    }

    #[tokio::test]
    async fn test_framing_preserves_multibyte_content_split_mid_character() {
        // "λ" is two bytes in UTF-8; split the chunk inside it
        let frame = r#"{"path":"λ.json"}"#;
        let bytes = framed_bytes(frame);
        let split_at = bytes.len() - 8; // between the two bytes of the λ
        let (head, tail) = bytes.split_at(split_at);

        let (transport, _handle) =
            MockTransport::with_inbound(vec![head.to_vec(), tail.to_vec()]);
        let mut framed = Framed::new(transport);

        assert_eq!(framed.receive().await.unwrap(), frame);
    }

    #[tokio::test]
    async fn test_framing_invalid_content_length() {
        let (transport, _handle) = MockTransport::with_inbound(vec![
            b"Content-Length: invalid\r\n\r\n{}".to_vec(),
        ]);
        let mut framed = Framed::new(transport);

        match framed.receive().await.unwrap_err() {
            FramingError::InvalidContentLength(_) => {}
            other => panic!("Expected InvalidContentLength error, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_framing_frame_too_large() {
        let oversized = MAX_FRAME_SIZE + 1;
        let (transport, _handle) = MockTransport::with_inbound(vec![
            format!("Content-Length: {oversized}\r\n\r\n").into_bytes(),
        ]);
        let mut framed = Framed::new(transport);

        match framed.receive().await.unwrap_err() {
            FramingError::FrameTooLarge { size, max } => {
                assert_eq!(size, oversized);
                assert_eq!(max, MAX_FRAME_SIZE);
            }
            other => panic!("Expected FrameTooLarge error, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_framing_missing_content_length_header() {
        let (transport, _handle) = MockTransport::with_inbound(vec![
            b"Content-Type: application/json\r\n\r\n{}".to_vec(),
        ]);
        let mut framed = Framed::new(transport);

        match framed.receive().await.unwrap_err() {
            FramingError::InvalidHeader(_) => {}
            other => panic!("Expected InvalidHeader error, got: {other:?}"),
        }
    }
}
