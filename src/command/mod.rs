pub mod exit;
pub mod output;
pub mod process;

use std::fmt::Display;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::ServiceName;

pub use exit::{exit_watch, ExitNotifier, ExitWatch};
pub use process::OsExecutor;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not deliver {signal}: {reason}")]
    Signal {
        signal: ProcessSignal,
        reason: String,
    },

    #[error("stdio pipe `{0}` was not captured")]
    StreamPipe(&'static str),
}

/// Everything needed to launch one service child: resolved binary, argv,
/// the sanitized environment (applied onto a cleared environment, later
/// entries overriding earlier ones) and an optional working directory.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    pub service: ServiceName,
    pub binary: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub current_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(service: ServiceName, binary: PathBuf) -> Self {
        Self {
            service,
            binary,
            args: Vec::default(),
            env: Vec::default(),
            current_dir: None,
        }
    }

    pub fn with_args(self, args: Vec<String>) -> Self {
        Self { args, ..self }
    }

    pub fn with_env(self, env: Vec<(String, String)>) -> Self {
        Self { env, ..self }
    }

    pub fn with_current_dir(self, current_dir: Option<PathBuf>) -> Self {
        Self { current_dir, ..self }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessSignal {
    Term,
    Kill,
}

impl Display for ProcessSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessSignal::Term => f.write_str("SIGTERM"),
            ProcessSignal::Kill => f.write_str("SIGKILL"),
        }
    }
}

/// How a child ended, distinguishing a voluntary exit from death by signal
/// from a failed wait on the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    Exited(i32),
    Signaled(i32),
    WaitFailed(String),
}

impl ExitOutcome {
    /// A voluntary, successful exit.
    pub fn is_clean(&self) -> bool {
        matches!(self, ExitOutcome::Exited(0))
    }
}

impl Display for ExitOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitOutcome::Exited(code) => write!(f, "exited with code {code}"),
            ExitOutcome::Signaled(sig) => write!(f, "terminated by signal {sig}"),
            ExitOutcome::WaitFailed(reason) => write!(f, "wait failed: {reason}"),
        }
    }
}

/// The seam between the orchestrator and the operating system: spawns a
/// child described by a [`CommandSpec`] with its output streams already
/// attached. The production implementation is [`OsExecutor`]; tests drive
/// the orchestrator through a mock.
#[cfg_attr(test, mockall::automock)]
pub trait CommandExecutor: Send + Sync {
    fn spawn(&self, spec: CommandSpec) -> Result<Box<dyn ChildHandle>, CommandError>;
}

/// Handle on a started child process. `wait` blocks until the child exits
/// and is intended for a single caller; signals are deliverable from any
/// thread for as long as the pid is valid. Signalling an already-exited
/// child reports an error, which callers treat as non-fatal.
pub trait ChildHandle: Send + Sync + std::fmt::Debug {
    fn pid(&self) -> u32;

    fn wait(&self) -> ExitOutcome;

    fn signal(&self, signal: ProcessSignal) -> Result<(), CommandError>;

    fn kill(&self) -> Result<(), CommandError> {
        self.signal(ProcessSignal::Kill)
    }
}
