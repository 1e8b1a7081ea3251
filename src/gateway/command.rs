use crate::error::Error;
use crate::gateway::breakpoint::BreakpointResult;
use crate::state::{Frame, Handle, Scope, Thread, Variable};
use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;
use strum_macros::IntoStaticStr;
use sysinfo::{ProcessRefreshKind, System};

/// Completion side of a command, owned by the engine thread.
pub struct Reply<T>(mpsc::SyncSender<T>);

impl<T> Reply<T> {
    pub(super) fn channel() -> (Self, mpsc::Receiver<T>) {
        let (sender, receiver) = mpsc::sync_channel(1);
        (Self(sender), receiver)
    }

    /// Complete the command. A result for a caller that stopped waiting is discarded.
    pub fn send(self, value: T) {
        if self.0.try_send(value).is_err() {
            debug!(target: "gateway", "late result discarded");
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingError {
    #[error("no result in {0:?}")]
    Timeout(Duration),
    #[error("command dropped by the engine thread")]
    Dropped,
}

/// Caller side of a submitted command.
pub struct Pending<T> {
    receiver: mpsc::Receiver<T>,
    timeout: Duration,
    command: &'static str,
}

impl<T> Pending<T> {
    pub(super) fn new(receiver: mpsc::Receiver<T>, timeout: Duration, command: &'static str) -> Self {
        Self {
            receiver,
            timeout,
            command,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn command(&self) -> &'static str {
        self.command
    }

    pub fn try_wait(self) -> Result<T, PendingError> {
        let timeout = self.timeout;
        self.receiver.recv_timeout(timeout).map_err(|e| match e {
            mpsc::RecvTimeoutError::Timeout => PendingError::Timeout(timeout),
            mpsc::RecvTimeoutError::Disconnected => PendingError::Dropped,
        })
    }
}

impl<T: Default> Pending<T> {
    /// Wait for the result, default value if the command times out or is dropped.
    pub fn wait(self) -> T {
        let command = self.command;
        self.try_wait().unwrap_or_else(|e| {
            warn!(target: "gateway", "{command}: {e}");
            T::default()
        })
    }
}

/// Debuggee process information, known after successful launch or attach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    /// Debuggee pointer size in bytes.
    pub pointer_size: u8,
    pub target: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub target: PathBuf,
    pub command_line: String,
    pub source_paths: Vec<String>,
    pub symbol_paths: Vec<String>,
}

impl LaunchRequest {
    /// Resolve `program` (through `PATH` if it isn't an existing file) and build a command line.
    pub fn new(program: &str, args: &[String], cwd: Option<&Path>) -> Result<Self, Error> {
        let mut target = PathBuf::from(program);
        if target.is_relative() {
            if let Some(cwd) = cwd {
                let in_cwd = cwd.join(&target);
                if in_cwd.exists() {
                    target = in_cwd;
                }
            }
        }
        if !target.exists() {
            target = which::which(program).map_err(|_| Error::TargetNotFound(program.to_string()))?;
        }

        let command_line = format!("{} {}", target.display(), args.join(" "))
            .trim()
            .to_string();
        Ok(Self {
            target,
            command_line,
            source_paths: vec![],
            symbol_paths: vec![],
        })
    }

    pub fn with_paths(mut self, source_paths: Vec<String>, symbol_paths: Vec<String>) -> Self {
        self.source_paths = source_paths;
        self.symbol_paths = symbol_paths;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachRequest {
    pub pid: u32,
    pub target: Option<PathBuf>,
    pub source_paths: Vec<String>,
    pub symbol_paths: Vec<String>,
}

impl AttachRequest {
    /// Find an executable of a running process.
    pub fn new(pid: u32) -> Result<Self, Error> {
        let mut sys = System::new();
        let sys_pid = sysinfo::Pid::from_u32(pid);
        sys.refresh_process_specifics(sys_pid, ProcessRefreshKind::new().with_exe(sysinfo::UpdateKind::Always));
        let process = sys
            .process(sys_pid)
            .ok_or(Error::AttachedProcessNotFound(pid))?;
        Ok(Self {
            pid,
            target: process.exe().map(Path::to_path_buf),
            source_paths: vec![],
            symbol_paths: vec![],
        })
    }

    pub fn with_paths(mut self, source_paths: Vec<String>, symbol_paths: Vec<String>) -> Self {
        self.source_paths = source_paths;
        self.symbol_paths = symbol_paths;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchResult {
    Started(ProcessInfo),
    Failed(String),
}

impl Default for LaunchResult {
    fn default() -> Self {
        LaunchResult::Failed("engine thread did not respond".to_string())
    }
}

/// Result of an execution control command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetVariableResult {
    pub variable: Option<Variable>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluateResult {
    pub value: String,
    pub type_name: String,
    /// Expandable result handle, [`Handle::NONE`] if result has no children.
    pub reference: Handle,
    pub error: Option<String>,
}

/// Step kind, selects native execution status or command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Into,
    Over,
    Out,
}

/// Command for the engine thread.
#[derive(IntoStaticStr)]
#[strum(serialize_all = "camelCase")]
pub enum Command {
    Launch(LaunchRequest, Reply<LaunchResult>),
    Attach(AttachRequest, Reply<LaunchResult>),
    Continue(Reply<ExecutionResult>),
    Step {
        step: Step,
        thread: Option<u32>,
        reply: Reply<ExecutionResult>,
    },
    Pause(Reply<ExecutionResult>),
    Terminate(Reply<ExecutionResult>),
    SetBreakpoints {
        file: String,
        lines: Vec<u32>,
        reply: Reply<Vec<BreakpointResult>>,
    },
    Threads(Reply<Vec<Thread>>),
    StackTrace {
        thread: u32,
        reply: Reply<Vec<Frame>>,
    },
    Scopes {
        frame: Handle,
        reply: Reply<Vec<Scope>>,
    },
    Variables {
        reference: Handle,
        reply: Reply<Vec<Variable>>,
    },
    SetVariable {
        reference: Handle,
        name: String,
        value: String,
        reply: Reply<SetVariableResult>,
    },
    Evaluate {
        expression: String,
        frame: Option<Handle>,
        reply: Reply<EvaluateResult>,
    },
    ProcessInfo(Reply<Option<ProcessInfo>>),
}

impl Command {
    pub fn name(&self) -> &'static str {
        self.into()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_late_result_is_discarded() {
        let (reply, receiver) = Reply::channel();
        let pending = Pending::new(receiver, Duration::from_millis(10), "threads");
        assert_eq!(
            pending.try_wait(),
            Err::<u32, _>(PendingError::Timeout(Duration::from_millis(10)))
        );
        reply.send(1);
    }

    #[test]
    fn test_dropped_command_gives_default() {
        let (reply, receiver) = Reply::<Vec<u32>>::channel();
        let pending = Pending::new(receiver, Duration::from_secs(10), "threads");
        drop(reply);
        assert!(pending.wait().is_empty());
    }

    #[test]
    fn test_command_names() {
        let (reply, _r) = Reply::channel();
        assert_eq!(Command::Continue(reply).name(), "continue");
        let (reply, _r) = Reply::channel();
        let cmd = Command::StackTrace { thread: 1, reply };
        assert_eq!(cmd.name(), "stackTrace");
    }

    #[test]
    fn test_launch_request_command_line() {
        let exe = std::env::current_exe().unwrap();
        let request = LaunchRequest::new(
            exe.to_str().unwrap(),
            &["--flag".to_string(), "value".to_string()],
            None,
        )
        .unwrap();
        assert_eq!(
            request.command_line,
            format!("{} --flag value", exe.display())
        );

        let request = LaunchRequest::new(exe.to_str().unwrap(), &[], None).unwrap();
        assert_eq!(request.command_line, exe.display().to_string());

        assert!(matches!(
            LaunchRequest::new("surely-not-an-existing-binary-42", &[], None),
            Err(Error::TargetNotFound(_))
        ));
    }
}
