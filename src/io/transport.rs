//! Transport layer - raw byte exchange with the engine process
//!
//! This module provides the transport abstraction the engine connection is
//! built on. A transport moves opaque byte chunks in both directions and knows
//! nothing about message framing or wire schema; those live one layer up in
//! `crate::protocol`.

use async_trait::async_trait;
use std::io;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, ChildStdout};
use tokio::sync::mpsc;
use tracing::{error, trace};

/// Core transport trait for bidirectional byte exchange
///
/// `receive` yields chunks at arbitrary boundaries; reassembly into protocol
/// frames is the framing layer's job.
#[async_trait]
pub trait Transport: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Send a chunk of bytes
    async fn send(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;

    /// Receive the next chunk of bytes
    async fn receive(&mut self) -> Result<Vec<u8>, Self::Error>;

    /// Close the transport
    async fn close(&mut self) -> Result<(), Self::Error>;

    /// Check if transport is still active
    fn is_connected(&self) -> bool;
}

// ============================================================================
// Stdio Transport Implementation
// ============================================================================

/// Read buffer size for the stdout reader task
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Error types for stdio transport
#[derive(Debug, thiserror::Error)]
pub enum StdioTransportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Transport is disconnected")]
    Disconnected,

    #[error("Channel error: {0}")]
    Channel(String),
}

/// Transport implementation over a child process's stdin/stdout streams
pub struct StdioTransport {
    /// Channel for sending bytes to stdin
    stdin_sender: Option<mpsc::UnboundedSender<Vec<u8>>>,

    /// Channel for receiving bytes from stdout
    stdout_receiver: Option<mpsc::UnboundedReceiver<Vec<u8>>>,

    /// Connection status
    connected: bool,
}

impl StdioTransport {
    /// Create a new StdioTransport from child process streams
    pub fn new(stdin: ChildStdin, stdout: ChildStdout) -> Self {
        let (stdin_sender, stdin_receiver) = mpsc::unbounded_channel();
        let (stdout_sender, stdout_receiver) = mpsc::unbounded_channel();

        // Spawn background task for stdin writing
        tokio::spawn(Self::stdin_writer_task(stdin, stdin_receiver));

        // Spawn background task for stdout reading
        tokio::spawn(Self::stdout_reader_task(stdout, stdout_sender));

        Self {
            stdin_sender: Some(stdin_sender),
            stdout_receiver: Some(stdout_receiver),
            connected: true,
        }
    }

    /// Background task that writes byte chunks to stdin
    async fn stdin_writer_task(
        mut stdin: ChildStdin,
        mut receiver: mpsc::UnboundedReceiver<Vec<u8>>,
    ) {
        while let Some(chunk) = receiver.recv().await {
            trace!("StdioTransport: writing {} bytes to stdin", chunk.len());

            if let Err(e) = stdin.write_all(&chunk).await {
                error!("Failed to write to stdin: {}", e);
                break;
            }

            if let Err(e) = stdin.flush().await {
                error!("Failed to flush stdin: {}", e);
                break;
            }
        }

        trace!("StdioTransport: stdin writer task finished");
    }

    /// Background task that reads byte chunks from stdout
    async fn stdout_reader_task(mut stdout: ChildStdout, sender: mpsc::UnboundedSender<Vec<u8>>) {
        let mut buf = vec![0u8; READ_CHUNK_SIZE];

        loop {
            match stdout.read(&mut buf).await {
                Ok(0) => {
                    trace!("StdioTransport: stdout reader reached EOF");
                    break;
                }
                Ok(n) => {
                    trace!("StdioTransport: read {} bytes from stdout", n);

                    if sender.send(buf[..n].to_vec()).is_err() {
                        trace!("StdioTransport: stdout receiver dropped, stopping reader");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to read from stdout: {}", e);
                    break;
                }
            }
        }

        trace!("StdioTransport: stdout reader task finished");
    }
}

#[async_trait]
impl Transport for StdioTransport {
    type Error = StdioTransportError;

    async fn send(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        if !self.connected {
            return Err(StdioTransportError::Disconnected);
        }

        let sender = self
            .stdin_sender
            .as_ref()
            .ok_or(StdioTransportError::Disconnected)?;

        sender
            .send(bytes.to_vec())
            .map_err(|e| StdioTransportError::Channel(e.to_string()))?;

        Ok(())
    }

    async fn receive(&mut self) -> Result<Vec<u8>, Self::Error> {
        if !self.connected {
            return Err(StdioTransportError::Disconnected);
        }

        let receiver = self
            .stdout_receiver
            .as_mut()
            .ok_or(StdioTransportError::Disconnected)?;

        receiver
            .recv()
            .await
            .ok_or(StdioTransportError::Disconnected)
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        self.connected = false;
        self.stdin_sender.take();
        self.stdout_receiver.take();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

// ============================================================================
// Mock Transport Implementation
// ============================================================================

/// Error type for mock transport
#[derive(Debug, thiserror::Error)]
pub enum MockTransportError {
    #[error("Transport is disconnected")]
    Disconnected,
}

/// Mock transport for testing
///
/// Records every sent chunk and replays inbound chunks pushed through the
/// paired [`MockHandle`]. `receive` blocks until a chunk is pushed, so a
/// connection pump built on top of it idles realistically instead of erroring
/// out when the script runs dry.
pub struct MockTransport {
    /// Chunks that were sent via this transport
    sent: Arc<Mutex<Vec<Vec<u8>>>>,

    /// Inbound chunk queue fed by the test
    inbound_receiver: mpsc::UnboundedReceiver<Vec<u8>>,

    /// Connection status
    connected: bool,
}

/// Test-side handle to a [`MockTransport`] that has been handed off to a
/// session or framing layer.
#[derive(Clone)]
pub struct MockHandle {
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    inbound_sender: mpsc::UnboundedSender<Vec<u8>>,
}

impl MockTransport {
    /// Create a new mock transport and its test-side handle
    pub fn new() -> (Self, MockHandle) {
        let (inbound_sender, inbound_receiver) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));

        let transport = Self {
            sent: Arc::clone(&sent),
            inbound_receiver,
            connected: true,
        };
        let handle = MockHandle {
            sent,
            inbound_sender,
        };

        (transport, handle)
    }

    /// Create a mock transport with pre-queued inbound chunks
    pub fn with_inbound(chunks: Vec<Vec<u8>>) -> (Self, MockHandle) {
        let (transport, handle) = Self::new();
        for chunk in chunks {
            handle.push_inbound(chunk);
        }
        (transport, handle)
    }
}

impl MockHandle {
    /// Queue a chunk to be returned by the transport's next `receive` call
    pub fn push_inbound(&self, chunk: impl Into<Vec<u8>>) {
        // Ignore errors: the transport side may already be closed
        let _ = self.inbound_sender.send(chunk.into());
    }

    /// All chunks sent via the transport so far
    pub fn sent_messages(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    /// All sent bytes, concatenated in send order
    pub fn sent_bytes(&self) -> Vec<u8> {
        self.sent.lock().unwrap().concat()
    }

    /// Number of discrete sent chunks
    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Error = MockTransportError;

    async fn send(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        if !self.connected {
            return Err(MockTransportError::Disconnected);
        }

        self.sent.lock().unwrap().push(bytes.to_vec());
        Ok(())
    }

    async fn receive(&mut self) -> Result<Vec<u8>, Self::Error> {
        if !self.connected {
            return Err(MockTransportError::Disconnected);
        }

        self.inbound_receiver
            .recv()
            .await
            .ok_or(MockTransportError::Disconnected)
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;
    use tokio::process::Command;

    #[tokio::test]
    async fn test_stdio_transport_round_trip() {
        // `cat` echoes stdin back on stdout
        let mut child = Command::new("cat")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .expect("Failed to spawn cat");

        let stdin = child.stdin.take().unwrap();
        let stdout = child.stdout.take().unwrap();

        let mut transport = StdioTransport::new(stdin, stdout);

        transport.send(b"hello engine").await.unwrap();

        let mut received = Vec::new();
        while received.len() < b"hello engine".len() {
            received.extend(transport.receive().await.unwrap());
        }
        assert_eq!(received, b"hello engine");

        assert!(transport.is_connected());

        transport.close().await.unwrap();
        let _ = child.kill().await;
        let _ = child.wait().await;
    }

    #[tokio::test]
    async fn test_mock_transport_send_receive() {
        let (mut transport, handle) =
            MockTransport::with_inbound(vec![b"chunk1".to_vec(), b"chunk2".to_vec()]);

        transport.send(b"out1").await.unwrap();
        transport.send(b"out2").await.unwrap();

        assert_eq!(transport.receive().await.unwrap(), b"chunk1");
        assert_eq!(transport.receive().await.unwrap(), b"chunk2");

        assert_eq!(
            handle.sent_messages(),
            vec![b"out1".to_vec(), b"out2".to_vec()]
        );
        assert_eq!(handle.sent_bytes(), b"out1out2");
    }

    #[tokio::test]
    async fn test_mock_transport_receive_blocks_until_pushed() {
        let (mut transport, handle) = MockTransport::new();

        let pushed = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            handle.push_inbound(b"late".to_vec());
        });

        let received = transport.receive().await.unwrap();
        assert_eq!(received, b"late");
        pushed.await.unwrap();
    }

    #[tokio::test]
    async fn test_mock_transport_disconnect() {
        let (mut transport, _handle) = MockTransport::new();

        assert!(transport.is_connected());

        transport.close().await.unwrap();

        assert!(!transport.is_connected());
        assert!(transport.send(b"test").await.is_err());
        assert!(transport.receive().await.is_err());
    }
}
