//! Engine session management
//!
//! [`EngineSession`] is the live connection to one analysis-engine process.
//! It owns the transport, the response dispatcher's registration table and
//! the span-class registry, and translates editor lifecycle events into the
//! outbound message stream.
//!
//! Construction is initialization: the broadcast handler is registered and
//! the version-check handshake is enqueued before the constructor returns,
//! so no message can ever precede it.

use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex as TokioMutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::io::process::{EngineProcess, StopMode};
use crate::io::transport::Transport;
use crate::protocol::dispatcher::{Handler, RequestId, ResponseDispatcher};
use crate::protocol::framing::Framed;
use crate::protocol::messages::{
    CORE_LIBRARY_IDENTITY, ClientMessage, EngineMessage, FILE_REFERENCE_PREFIX,
    FULL_NAME_REFERENCE_PREFIX, FileId, FileVersion, InboundEnvelope, OutboundEnvelope,
    PROTOCOL_VERSION, ProjectId, SolutionId,
};
use crate::session::config::{EngineConfig, SessionConfig};
use crate::session::error::SessionError;
use crate::session::extensions::ExtensionRegistry;
use crate::session::files::FileRegistry;
use crate::session::span_classes::SpanClassRegistry;

/// Engine versions the handshake rejected, recorded by the broadcast handler.
type VersionReject = Arc<StdMutex<Option<(String, String)>>>;

/// Commands consumed by the connection pump.
enum PumpCommand {
    /// Deliver one outbound envelope to the engine.
    Deliver(OutboundEnvelope),
    /// Close the transport and stop the pump.
    Shutdown,
}

// ============================================================================
// Engine Session
// ============================================================================

/// Live connection to one analysis-engine process.
///
/// Created once per editor session. All event methods are non-blocking: they
/// enqueue exactly one outbound message each, in call order. Inbound messages
/// are routed on a background pump task, one at a time in arrival order.
pub struct EngineSession {
    /// Host-side session configuration.
    config: SessionConfig,

    /// Extensions recognized by the configured languages.
    extensions: ExtensionRegistry,

    /// Span classes accumulated from LanguageLoaded notifications.
    span_classes: Arc<SpanClassRegistry>,

    /// Correlation-identifier routing table.
    dispatcher: Arc<ResponseDispatcher>,

    /// Files currently loaded into the engine.
    files: StdMutex<FileRegistry>,

    /// Outbound queue drained by the pump.
    outbound: mpsc::UnboundedSender<PumpCommand>,

    /// Set when the engine rejects the handshake; fails all later sends.
    version_reject: VersionReject,

    /// Connection pump task.
    pump: Option<JoinHandle<()>>,

    /// Engine process, when this session spawned it.
    process: Option<EngineProcess>,
}

impl EngineSession {
    /// Connect over an existing transport.
    ///
    /// Registers the broadcast handler and sends the version-check handshake
    /// before returning. Must be called within a Tokio runtime.
    pub fn connect<T: Transport + 'static>(
        config: SessionConfig,
        transport: T,
    ) -> Result<Self, SessionError> {
        config.validate()?;

        let extensions = ExtensionRegistry::new(&config);
        let span_classes = Arc::new(SpanClassRegistry::new());
        let dispatcher = Arc::new(ResponseDispatcher::new());
        let version_reject: VersionReject = Arc::new(StdMutex::new(None));

        dispatcher.register_broadcast(Self::broadcast_handler(
            Arc::clone(&span_classes),
            Arc::clone(&version_reject),
        ));
        // The handshake below must never beat the broadcast registration
        assert!(
            dispatcher.has_broadcast(),
            "broadcast handler must be registered before the first outbound message"
        );

        let (outbound, commands) = mpsc::unbounded_channel();
        let pump = spawn_pump(transport, commands, Arc::clone(&dispatcher));

        let session = Self {
            config,
            extensions,
            span_classes,
            dispatcher,
            files: StdMutex::new(FileRegistry::new()),
            outbound,
            version_reject,
            pump: Some(pump),
            process: None,
        };

        // Version-check handshake: exactly once, before any other message
        session.post(ClientMessage::CheckVersion {
            version: PROTOCOL_VERSION.to_string(),
        })?;

        info!("Engine session connected");
        Ok(session)
    }

    /// Spawn the engine process and connect to it.
    pub async fn spawn(
        engine: EngineConfig,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        info!("Starting engine session with process: {}", engine.engine_path);

        let mut process = EngineProcess::new(
            engine.engine_path,
            engine.extra_args,
            engine.working_directory,
        );

        if let Some(handler) = engine.stderr_handler {
            process.on_stderr_line(move |line| handler(line));
        }

        process.start().await?;
        let transport = process.take_transport()?;

        let mut session = Self::connect(config, transport)?;
        session.process = Some(process);
        Ok(session)
    }

    /// Handler for every unsolicited engine message.
    fn broadcast_handler(
        span_classes: Arc<SpanClassRegistry>,
        version_reject: VersionReject,
    ) -> Handler {
        Arc::new(move |message| match message {
            EngineMessage::LanguageLoaded { span_class_infos } => {
                debug!(
                    "Language loaded with {} span classes",
                    span_class_infos.len()
                );
                span_classes.append(span_class_infos);
            }
            EngineMessage::VersionRejected { expected, actual } => {
                error!(
                    "Engine rejected protocol version: expects {}, client offered {}",
                    expected, actual
                );
                // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
                *version_reject.lock().unwrap() = Some((expected, actual));
            }
            EngineMessage::TransportFailed { reason } => {
                error!("Engine transport failed: {}", reason);
            }
            EngineMessage::Ack => {
                trace!("Unsolicited ack ignored");
            }
        })
    }

    // ========================================================================
    // Lifecycle Events
    // ========================================================================

    pub fn solution_start_loading(
        &self,
        solution: SolutionId,
        path: &str,
    ) -> Result<(), SessionError> {
        self.post(ClientMessage::SolutionStartLoading {
            solution,
            path: path.to_string(),
        })
    }

    pub fn solution_loaded(&self, solution: SolutionId) -> Result<(), SessionError> {
        self.post(ClientMessage::SolutionLoaded { solution })
    }

    /// Begin loading a project. The wire configuration is re-derived from the
    /// session configuration on every call.
    pub fn project_start_loading(
        &self,
        project: ProjectId,
        path: &str,
    ) -> Result<(), SessionError> {
        self.post(ClientMessage::ProjectStartLoading {
            project,
            path: path.to_string(),
            config: self.config.to_wire(),
        })
    }

    pub fn project_loaded(&self, project: ProjectId) -> Result<(), SessionError> {
        self.post(ClientMessage::ProjectLoaded { project })
    }

    /// Report a file reference added to a project.
    pub fn reference_added(&self, project: ProjectId, path: &str) -> Result<(), SessionError> {
        self.post(ClientMessage::ReferenceLoaded {
            project,
            reference: format!("{FILE_REFERENCE_PREFIX}{path}"),
        })
    }

    /// Report the implicit core-library reference every project carries.
    pub fn core_library_reference_added(&self, project: ProjectId) -> Result<(), SessionError> {
        self.post(ClientMessage::ReferenceLoaded {
            project,
            reference: format!("{FULL_NAME_REFERENCE_PREFIX}{CORE_LIBRARY_IDENTITY}"),
        })
    }

    pub fn project_unloaded(&self, project: ProjectId) -> Result<(), SessionError> {
        self.post(ClientMessage::ProjectUnloaded { project })
    }

    /// Report a file added to a project.
    ///
    /// Files whose extension no configured language recognizes are not
    /// forwarded to the engine; returns `Ok(false)` for those.
    pub fn file_added(
        &self,
        project: ProjectId,
        path: &str,
        file: FileId,
        version: FileVersion,
    ) -> Result<bool, SessionError> {
        if !self.extensions.supports_path(Path::new(path)) {
            debug!("Skipping file with unsupported extension: {}", path);
            return Ok(false);
        }

        {
            // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
            self.files.lock().unwrap().open(file, project, version);
        }

        self.post(ClientMessage::FileLoaded {
            project,
            path: path.to_string(),
            file,
            version,
        })?;
        Ok(true)
    }

    /// Report a file removed. Fails with `FileNotLoaded` if the file was
    /// never forwarded to the engine, in which case nothing is emitted.
    pub fn file_unloaded(&self, file: FileId) -> Result<(), SessionError> {
        {
            // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
            if !self.files.lock().unwrap().close(file) {
                return Err(SessionError::FileNotLoaded { file });
            }
        }

        self.post(ClientMessage::FileUnloaded { file })
    }

    /// Report a caret move within an open file.
    ///
    /// Emits the highest version seen for the file so the engine never
    /// observes a version regression. Fails with `FileNotLoaded` for files
    /// outside their loaded window, in which case nothing is emitted.
    pub fn caret_moved(
        &self,
        file: FileId,
        version: FileVersion,
        pos: u64,
    ) -> Result<(), SessionError> {
        let effective = {
            // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
            self.files.lock().unwrap().observe_version(file, version)?
        };

        self.post(ClientMessage::SetCaretPos {
            file,
            version: effective,
            pos,
        })
    }

    // ========================================================================
    // Requests
    // ========================================================================

    /// Send a correlated request.
    ///
    /// Allocates a request identifier, registers `on_reply` for it and sends
    /// the message. The handler is invoked on the delivery context when the
    /// matching response arrives; on teardown pending handlers are discarded
    /// without invocation.
    pub fn send_request<F>(
        &self,
        message: ClientMessage,
        on_reply: F,
    ) -> Result<RequestId, SessionError>
    where
        F: Fn(EngineMessage) + Send + Sync + 'static,
    {
        self.ensure_live()?;

        let id = self.dispatcher.allocate_request_id();
        self.dispatcher.register(id, Arc::new(on_reply));

        let envelope = OutboundEnvelope {
            cid: id.wire(),
            message,
        };
        match self.outbound.send(PumpCommand::Deliver(envelope)) {
            Ok(()) => Ok(id),
            Err(_) => {
                self.dispatcher.unregister(id);
                Err(SessionError::ChannelClosed)
            }
        }
    }

    // ========================================================================
    // State Access
    // ========================================================================

    /// Span classes accumulated so far.
    pub fn span_classes(&self) -> &SpanClassRegistry {
        &self.span_classes
    }

    /// Extensions recognized by the configured languages.
    pub fn extensions(&self) -> &ExtensionRegistry {
        &self.extensions
    }

    /// The session configuration this session was constructed from.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Number of files currently loaded into the engine.
    pub fn open_file_count(&self) -> usize {
        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        self.files.lock().unwrap().len()
    }

    /// Number of inbound messages dropped for lack of a handler.
    pub fn unrouted_messages(&self) -> u64 {
        self.dispatcher.unrouted_count()
    }

    /// Number of requests still awaiting a response.
    pub fn pending_requests(&self) -> usize {
        self.dispatcher.pending_count()
    }

    /// Whether the connection pump is still accepting messages.
    pub fn is_connected(&self) -> bool {
        !self.outbound.is_closed()
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Graceful teardown, consuming the session.
    ///
    /// Discards pending request handlers without invoking them, closes the
    /// transport and stops the engine process if this session spawned it.
    pub async fn close(mut self) -> Result<(), SessionError> {
        info!("Closing engine session");

        self.dispatcher.discard_pending();

        // Pump closes the transport on shutdown; ignore failure if it is
        // already gone
        let _ = self.outbound.send(PumpCommand::Shutdown);
        if let Some(pump) = self.pump.take() {
            let _ = pump.await;
        }

        if let Some(mut process) = self.process.take() {
            process.stop(StopMode::Graceful).await?;
        }

        Ok(())
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Fail fast once the engine has rejected the handshake.
    fn ensure_live(&self) -> Result<(), SessionError> {
        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        if let Some((expected, actual)) = self.version_reject.lock().unwrap().clone() {
            return Err(SessionError::VersionMismatch { expected, actual });
        }
        Ok(())
    }

    /// Enqueue one fire-and-forget notification.
    fn post(&self, message: ClientMessage) -> Result<(), SessionError> {
        self.ensure_live()?;

        self.outbound
            .send(PumpCommand::Deliver(OutboundEnvelope::notification(message)))
            .map_err(|_| SessionError::ChannelClosed)
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if let Some(process) = &mut self.process {
            if process.is_running() {
                eprintln!(
                    "Warning: EngineSession dropped without calling close() - force killing engine process"
                );
                process.kill_sync();
            }
        }
    }
}

// ============================================================================
// Connection Pump
// ============================================================================

/// Spawn the task that owns the framed transport.
///
/// Serializes all sends (callers never need a lock) and processes inbound
/// frames one at a time in arrival order, which yields a total order for
/// inbound notifications. Transport failures are surfaced to the broadcast
/// handler as a `TransportFailed` sentinel, never thrown at a sender.
fn spawn_pump<T: Transport + 'static>(
    transport: T,
    mut commands: mpsc::UnboundedReceiver<PumpCommand>,
    dispatcher: Arc<ResponseDispatcher>,
) -> JoinHandle<()> {
    let framed = Arc::new(TokioMutex::new(Framed::new(transport)));

    tokio::spawn(async move {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(PumpCommand::Deliver(envelope)) => {
                        let frame = match serde_json::to_string(&envelope) {
                            Ok(frame) => frame,
                            Err(e) => {
                                error!("Failed to encode outbound message: {}", e);
                                continue;
                            }
                        };

                        trace!(cid = envelope.cid, "Sending frame to engine");
                        let mut framed = framed.lock().await;
                        if let Err(e) = framed.send(&frame).await {
                            error!("Failed to send frame to engine: {}", e);
                            let _ = dispatcher.dispatch(InboundEnvelope::broadcast(
                                EngineMessage::TransportFailed {
                                    reason: e.to_string(),
                                },
                            ));
                            break;
                        }
                    }
                    Some(PumpCommand::Shutdown) | None => {
                        let mut framed = framed.lock().await;
                        let _ = framed.close().await;
                        break;
                    }
                },
                inbound = async { framed.lock().await.receive().await } => match inbound {
                    Ok(frame) => match serde_json::from_str::<InboundEnvelope>(&frame) {
                        Ok(envelope) => {
                            trace!(cid = envelope.cid, "Dispatching inbound message");
                            if let Err(e) = dispatcher.dispatch(envelope) {
                                warn!("Protocol anomaly: {}", e);
                            }
                        }
                        Err(e) => {
                            warn!("Dropping unparseable frame from engine: {}", e);
                        }
                    },
                    Err(e) => {
                        let _ = dispatcher.dispatch(InboundEnvelope::broadcast(
                            EngineMessage::TransportFailed {
                                reason: e.to_string(),
                            },
                        ));
                        break;
                    }
                },
            }
        }

        trace!("Engine connection pump finished");
    })
}

// ============================================================================
// Tests
// ============================================================================
