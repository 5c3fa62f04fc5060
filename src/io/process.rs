//! Engine process management
//!
//! Handles the analysis-engine child process lifecycle and stderr monitoring,
//! completely separate from transport concerns.

use crate::io::transport::StdioTransport;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{error, info, trace, warn};

// ============================================================================
// Process State Management
// ============================================================================

/// How to stop the engine process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    /// Request graceful shutdown first (SIGTERM); the caller may follow up
    /// with `Force` if the engine does not exit
    Graceful,
    /// Force kill immediately (SIGKILL)
    Force,
}

/// Process lifecycle states
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessState {
    /// Process has not been started yet
    NotStarted,
    /// Process is currently running
    Running { pid: u32 },
    /// Process has been stopped (either gracefully or forcefully)
    Stopped,
}

impl ProcessState {
    /// Get the process ID if the process is running
    pub fn pid(&self) -> Option<u32> {
        match self {
            ProcessState::Running { pid } => Some(*pid),
            _ => None,
        }
    }

    /// Check if the process is currently running
    pub fn is_running(&self) -> bool {
        matches!(self, ProcessState::Running { .. })
    }
}

// ============================================================================
// Process Errors
// ============================================================================

/// Error types for engine process management
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Process not started")]
    NotStarted,

    #[error("Process already started")]
    AlreadyStarted,

    #[error("Stdin not available")]
    StdinNotAvailable,

    #[error("Stdout not available")]
    StdoutNotAvailable,

    #[error("Stderr not available")]
    StderrNotAvailable,
}

// ============================================================================
// Engine Process
// ============================================================================

/// Manages the analysis-engine child process
///
/// Spawns the engine with piped stdio, exposes stdin/stdout as a
/// [`StdioTransport`], and always drains stderr so the engine cannot block on
/// a full pipe. An installable stderr handler receives each line for host-side
/// diagnostics.
pub struct EngineProcess {
    /// Command to execute
    command: String,

    /// Command arguments
    args: Vec<String>,

    /// Working directory for the process (optional)
    working_directory: Option<PathBuf>,

    /// Thread-safe process state
    state: Arc<Mutex<ProcessState>>,

    /// Stdio transport (created when the process starts)
    transport: Option<StdioTransport>,

    /// Stderr handler
    stderr_handler: Option<Box<dyn Fn(String) + Send + Sync>>,

    /// Stderr monitoring task handle
    stderr_task: Option<JoinHandle<()>>,

    /// Process wait task handle (reaps the child on exit)
    wait_task: Option<JoinHandle<()>>,
}

impl EngineProcess {
    /// Create a new engine process manager
    pub fn new(command: String, args: Vec<String>, working_dir: Option<PathBuf>) -> Self {
        Self {
            command,
            args,
            working_directory: working_dir,
            state: Arc::new(Mutex::new(ProcessState::NotStarted)),
            transport: None,
            stderr_handler: None,
            stderr_task: None,
            wait_task: None,
        }
    }

    /// Install a handler for stderr lines
    ///
    /// Only one handler can be active at a time; installing a new handler
    /// replaces the previous one. Must be installed before `start` to take
    /// effect.
    pub fn on_stderr_line<F>(&mut self, handler: F)
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.stderr_handler = Some(Box::new(handler));
    }

    /// Get current process state (thread-safe)
    pub fn state(&self) -> ProcessState {
        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        self.state.lock().unwrap().clone()
    }

    /// Check if the process is currently running
    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// Start the engine process
    pub async fn start(&mut self) -> Result<(), ProcessError> {
        if self.is_running() {
            return Err(ProcessError::AlreadyStarted);
        }

        info!("Starting engine process: {} {:?}", self.command, self.args);

        let mut command_builder = Command::new(&self.command);
        command_builder
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(working_dir) = &self.working_directory {
            command_builder.current_dir(working_dir);
        }

        let mut child = command_builder.spawn()?;

        let pid = child
            .id()
            .ok_or_else(|| ProcessError::Io(io::Error::other("Failed to get process ID")))?;
        info!("Engine process started with PID: {}", pid);

        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        *self.state.lock().unwrap() = ProcessState::Running { pid };

        // Extract stdio streams before the child is moved into the wait task
        let stdin = child.stdin.take().ok_or(ProcessError::StdinNotAvailable)?;
        let stdout = child
            .stdout
            .take()
            .ok_or(ProcessError::StdoutNotAvailable)?;
        let stderr = child
            .stderr
            .take()
            .ok_or(ProcessError::StderrNotAvailable)?;

        self.transport = Some(StdioTransport::new(stdin, stdout));

        self.spawn_stderr_monitor(stderr);
        self.spawn_wait_task(child);

        Ok(())
    }

    /// Take the stdio transport for communicating with the engine
    ///
    /// Consumes the process's stdin/stdout; can be called once per `start`.
    pub fn take_transport(&mut self) -> Result<StdioTransport, ProcessError> {
        self.transport.take().ok_or(ProcessError::NotStarted)
    }

    /// Stop the engine process
    pub async fn stop(&mut self, mode: StopMode) -> Result<(), ProcessError> {
        let pid = match self.state().pid() {
            Some(pid) => pid,
            None => return Err(ProcessError::NotStarted),
        };

        match mode {
            StopMode::Graceful => info!("Gracefully stopping engine process with PID: {}", pid),
            StopMode::Force => info!("Force killing engine process with PID: {}", pid),
        }

        // Close the transport first; engines that exit on stdin EOF shut
        // themselves down before the signal lands
        if let Some(mut transport) = self.transport.take() {
            use crate::io::transport::Transport;
            let _ = transport.close().await;
        }

        #[cfg(unix)]
        {
            unsafe {
                match mode {
                    StopMode::Graceful => {
                        if libc::kill(pid as libc::pid_t, libc::SIGTERM) == 0 {
                            info!("Sent SIGTERM to engine process {}", pid);
                        }
                        // The wait task observes the actual exit; callers can
                        // escalate to StopMode::Force if the engine lingers
                    }
                    StopMode::Force => {
                        libc::kill(pid as libc::pid_t, libc::SIGKILL);
                        info!("Sent SIGKILL to engine process {}", pid);
                    }
                }
            }
        }
        #[cfg(not(unix))]
        {
            warn!("Engine process termination is only implemented for unix targets");
        }

        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }

        // Update state immediately for API consistency; the wait task also
        // updates it when it observes the actual exit
        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        *self.state.lock().unwrap() = ProcessState::Stopped;

        Ok(())
    }

    /// Synchronous force kill for Drop implementations
    ///
    /// Skips async transport cleanup and directly kills the process.
    pub fn kill_sync(&mut self) {
        if let Some(pid) = self.state().pid() {
            warn!("Force killing engine process {} synchronously", pid);
            #[cfg(unix)]
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGKILL);
            }
            // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
            *self.state.lock().unwrap() = ProcessState::Stopped;
        }
    }

    /// Spawn the stderr monitoring task
    ///
    /// Always drains stderr to prevent the engine from blocking. If a handler
    /// is installed, lines are forwarded to it.
    fn spawn_stderr_monitor(&mut self, stderr: tokio::process::ChildStderr) {
        let handler = self.stderr_handler.take();

        let task = tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut line = String::new();

            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        trace!("EngineProcess: stderr EOF reached");
                        break;
                    }
                    Ok(_) => {
                        let content = line.trim().to_string();
                        if !content.is_empty() {
                            if let Some(ref handler) = handler {
                                handler(content);
                            } else {
                                trace!("EngineProcess: stderr drained: {}", content);
                            }
                        }
                    }
                    Err(e) => {
                        error!("Failed to read from engine stderr: {}", e);
                        break;
                    }
                }
            }

            trace!("EngineProcess: stderr monitoring finished");
        });

        self.stderr_task = Some(task);
    }

    /// Spawn the wait task that reaps the child process on exit
    fn spawn_wait_task(&mut self, mut child: Child) {
        let pid = self.state().pid();
        let state = Arc::clone(&self.state);

        let task = tokio::spawn(async move {
            match child.wait().await {
                Ok(exit_status) => {
                    info!("Engine process {:?} exited with status: {}", pid, exit_status);
                }
                Err(e) => {
                    error!("Error waiting for engine process {:?}: {}", pid, e);
                }
            }

            if let Ok(mut process_state) = state.lock() {
                *process_state = ProcessState::Stopped;
            }
        });

        self.wait_task = Some(task);
    }
}

impl Drop for EngineProcess {
    fn drop(&mut self) {
        if self.is_running() {
            self.kill_sync();
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
