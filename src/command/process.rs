use std::os::unix::process::ExitStatusExt;
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;

use nix::sys::signal;
use nix::unistd::Pid;

use super::output::{spawn_output_forwarder, OutputStream};
use super::{ChildHandle, CommandError, CommandExecutor, CommandSpec, ExitOutcome, ProcessSignal};

/// Production executor wrapping OS process primitives. Children get piped
/// stdio wired to the output forwarder and a cleared environment so only the
/// entries in the spec reach them.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsExecutor;

impl CommandExecutor for OsExecutor {
    fn spawn(&self, spec: CommandSpec) -> Result<Box<dyn ChildHandle>, CommandError> {
        let mut cmd = Command::new(&spec.binary);
        cmd.args(&spec.args)
            .env_clear()
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &spec.current_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or(CommandError::StreamPipe("stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or(CommandError::StreamPipe("stderr"))?;
        spawn_output_forwarder(spec.service.clone(), OutputStream::Stdout, stdout);
        spawn_output_forwarder(spec.service, OutputStream::Stderr, stderr);

        Ok(Box::new(OsChild {
            pid: child.id(),
            child: Mutex::new(Some(child)),
        }))
    }
}

#[derive(Debug)]
pub struct OsChild {
    pid: u32,
    child: Mutex<Option<Child>>,
}

impl ChildHandle for OsChild {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn wait(&self) -> ExitOutcome {
        // Take the child out so the lock is not held across the blocking
        // wait; signal delivery goes through the pid and needs no lock.
        let Some(mut child) = self.child.lock().unwrap().take() else {
            return ExitOutcome::WaitFailed("process was already waited on".to_string());
        };
        match child.wait() {
            Ok(status) => match status.code() {
                Some(code) => ExitOutcome::Exited(code),
                None => ExitOutcome::Signaled(status.signal().unwrap_or_default()),
            },
            Err(err) => ExitOutcome::WaitFailed(err.to_string()),
        }
    }

    fn signal(&self, process_signal: ProcessSignal) -> Result<(), CommandError> {
        let sig = match process_signal {
            ProcessSignal::Term => signal::SIGTERM,
            ProcessSignal::Kill => signal::SIGKILL,
        };
        signal::kill(Pid::from_raw(self.pid as i32), sig).map_err(|err| CommandError::Signal {
            signal: process_signal,
            reason: err.to_string(),
        })
    }
}
