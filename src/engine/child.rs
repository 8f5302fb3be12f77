//! Child process handles driven by the runner.

use super::command::ProvisionCommand;
use crate::error::{InstallerError, Result};
use crate::model::ExitState;
use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use nix::pty::openpty;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::os::fd::{AsRawFd, OwnedFd};
use std::process::{Child, ExitStatus, Stdio};
use tracing::{debug, warn};

/// Outcome of asking whether the child has terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reap {
    Exited(ExitState),
    Running,
    /// Someone else already collected the status; nothing more to learn.
    AlreadyReaped,
}

pub trait ProvisionChild {
    /// Output lines until end of input. Lazy and finite; a second call yields nothing.
    fn lines(&mut self) -> Box<dyn Iterator<Item = io::Result<String>> + '_>;

    /// Non-blocking status check.
    fn check(&mut self) -> Reap;

    /// Block until the child terminates.
    fn wait(&mut self) -> Reap;
}

/// Line reader over a pty master. A hang-up (`EIO`) is end of input.
pub struct OutputLines<R> {
    reader: Option<R>,
}

impl<R: BufRead> OutputLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: Some(reader),
        }
    }
}

impl<R: BufRead> Iterator for OutputLines<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        let reader = self.reader.as_mut()?;
        let mut buf = Vec::new();
        loop {
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) if buf.is_empty() => break,
                Ok(_) => return Some(Ok(String::from_utf8_lossy(&buf).into_owned())),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.raw_os_error() == Some(Errno::EIO as i32) => {
                    debug!("provisioning output hung up");
                    if !buf.is_empty() {
                        self.reader = None;
                        return Some(Ok(String::from_utf8_lossy(&buf).into_owned()));
                    }
                    break;
                }
                Err(e) => {
                    self.reader = None;
                    return Some(Err(e));
                }
            }
        }
        self.reader = None;
        None
    }
}

/// A spawned provisioning process whose stdio is a pseudo-terminal.
pub struct PtyChild {
    child: Child,
    output: Option<BufReader<File>>,
}

impl PtyChild {
    pub fn spawn(command: &ProvisionCommand) -> Result<Self> {
        let spawn_error = |source: io::Error| InstallerError::Spawn {
            command: command.to_string(),
            source,
        };
        let pty = openpty(None, None).map_err(|e| spawn_error(io::Error::from(e)))?;
        close_on_exec(&pty.master).map_err(spawn_error)?;
        close_on_exec(&pty.slave).map_err(spawn_error)?;

        let mut cmd = command.to_command();
        cmd.stdin(Stdio::from(pty.slave.try_clone().map_err(spawn_error)?))
            .stdout(Stdio::from(pty.slave.try_clone().map_err(spawn_error)?))
            .stderr(Stdio::from(pty.slave));
        let child = cmd.spawn().map_err(spawn_error)?;
        // the parent must not hold the slave side open, or EOF never arrives
        drop(cmd);
        debug!("spawned provisioning process {}", child.id());

        Ok(Self {
            child,
            output: Some(BufReader::new(File::from(pty.master))),
        })
    }
}

impl ProvisionChild for PtyChild {
    fn lines(&mut self) -> Box<dyn Iterator<Item = io::Result<String>> + '_> {
        match self.output.take() {
            Some(reader) => Box::new(OutputLines::new(reader)),
            None => Box::new(std::iter::empty()),
        }
    }

    fn check(&mut self) -> Reap {
        match self.child.try_wait() {
            Ok(Some(status)) => Reap::Exited(exit_state(status)),
            Ok(None) => Reap::Running,
            Err(e) => reap_error(e),
        }
    }

    fn wait(&mut self) -> Reap {
        match self.child.wait() {
            Ok(status) => Reap::Exited(exit_state(status)),
            Err(e) => reap_error(e),
        }
    }
}

/// Keep pty descriptors out of unrelated children; stdio gets its own copies.
fn close_on_exec(fd: &OwnedFd) -> io::Result<()> {
    fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;
    Ok(())
}

fn reap_error(e: io::Error) -> Reap {
    if e.raw_os_error() != Some(Errno::ECHILD as i32) {
        warn!("could not collect provisioning process status: {e}");
    }
    Reap::AlreadyReaped
}

pub(crate) fn exit_state(status: ExitStatus) -> ExitState {
    if let Some(code) = status.code() {
        return ExitState::Code(code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return ExitState::Signal(signal);
        }
    }
    ExitState::Code(1)
}
