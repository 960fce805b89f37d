//! Forks the configured child and arbitrates the report-pipe protocol.

use std::fmt::Display;
use std::os::fd::AsRawFd;

use crate::cmdline;
use crate::error::{Error, Result};
use crate::os;

use super::channel::ChannelSet;
use super::child::{Bootstrap, ExecImage};
use super::request::Launch;
use super::stream::{ChildStderr, ChildStdin, ChildStdout};

/// A launched (or, with defer-start, pending) child process.
///
/// One `Process` drives exactly one launch; the request and its channel
/// set belong to it alone and are consumed by the fork.
#[derive(Debug)]
pub struct Process {
    request: Launch,
    channels: ChannelSet,
    pid: Option<libc::pid_t>,
    started: bool,
    exit_status: Option<ExitStatus>,
    /// Write end of the child's stdin pipe, if stdin was piped.
    pub stdin: Option<ChildStdin>,
    /// Read end of the child's stdout pipe, if stdout was piped.
    pub stdout: Option<ChildStdout>,
    /// Read end of the child's stderr pipe, if stderr was piped.
    pub stderr: Option<ChildStderr>,
}

impl Process {
    /// Take over `request` and launch it, unless it defers the start.
    pub fn spawn(mut request: Launch) -> Result<Self> {
        let channels = ChannelSet::open(
            std::mem::take(&mut request.stdin),
            std::mem::take(&mut request.stdout),
            std::mem::take(&mut request.stderr),
        );
        let mut process = Self {
            request,
            channels,
            pid: None,
            started: false,
            exit_status: None,
            stdin: None,
            stdout: None,
            stderr: None,
        };
        if !process.request.defer_start {
            process.execute()?;
        }
        Ok(process)
    }

    /// Launch a request built with the defer-start option.
    ///
    /// Calling this when the process was already started is a caller bug
    /// and panics.
    pub fn start(&mut self) -> Result<()> {
        assert!(
            self.request.defer_start,
            "start is only for requests built with defer_start"
        );
        assert!(!self.started, "process was already started");
        self.execute()
    }

    /// Identifier of the running child, while one exists.
    pub fn pid(&self) -> Option<u32> {
        self.pid.map(|pid| pid as u32)
    }

    /// Block until the child exits, and reap it.
    ///
    /// Panics if no launch ever happened; repeated calls return the status
    /// collected by the first.
    pub fn wait(&mut self) -> Result<ExitStatus> {
        if let Some(status) = self.exit_status {
            return Ok(status);
        }
        let pid = self.pid.expect("no process was launched");
        let status = ExitStatus::from_raw(os::wait_blocking(pid)?);
        self.pid = None;
        self.exit_status = Some(status);
        Ok(status)
    }

    fn execute(&mut self) -> Result<()> {
        self.started = true;

        // The report pipe is the only way the child can tell us about a
        // failure between fork and exec; close-on-exec makes a successful
        // exec read back here as clean end-of-data.
        let (report_rd, report_wr) = os::pipe_cloexec()?;
        let exe = self.request.resolve_executable().to_owned();
        let image = ExecImage::prepare(&self.request, &exe)?;
        log::trace!("forking for `{}`", cmdline::join(&self.request.args, " "));

        let pid = os::fork()?;
        if pid == 0 {
            // Child branch: only our copies of the descriptors are
            // touched, and the bootstrap never returns.
            self.channels.close_parent_side();
            drop(report_rd);
            Bootstrap::new(&self.request, &image, &self.channels, report_wr.as_raw_fd()).run()
        }

        self.pid = Some(pid);
        // Keep only the read end, or the read below never sees end-of-data.
        drop(report_wr);
        self.channels.close_child_side();

        let mut report = [0u8; os::REPORT_LIMIT];
        match os::read_atmost(report_rd.as_raw_fd(), &mut report) {
            Ok(0) => {
                log::debug!("child {} launched", pid);
                let (stdin, stdout, stderr) = self.channels.finalize(self.request.bufsize);
                self.stdin = stdin;
                self.stdout = stdout;
                self.stderr = stderr;
                Ok(())
            }
            Ok(len) => {
                let message = String::from_utf8_lossy(&report[..len]).into_owned();
                log::debug!("child {} failed to launch: {}", pid, message);
                self.abandon(pid)?;
                Err(Error::Launch(message))
            }
            Err(err) => {
                // The report could not be read; the child may well have
                // failed, so treat it like a reported failure.
                self.abandon(pid).ok();
                Err(err)
            }
        }
    }

    /// Reap a child whose launch failed, releasing every remaining
    /// parent-side descriptor before the error travels up.
    fn abandon(&mut self, pid: libc::pid_t) -> Result<()> {
        self.channels.close_parent_side();
        self.pid = None;
        os::reap_polling(pid)?;
        Ok(())
    }
}

/// How a reaped child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Code(i32),
    Signal(i32),
}

impl ExitStatus {
    pub(crate) fn from_raw(status: libc::c_int) -> Self {
        if libc::WIFSIGNALED(status) {
            Self::Signal(libc::WTERMSIG(status))
        } else {
            Self::Code(libc::WEXITSTATUS(status))
        }
    }

    pub fn success(&self) -> bool {
        matches!(self, Self::Code(0))
    }
}

impl Display for ExitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Code(code) => write!(f, "exit with code {}", code),
            Self::Signal(signal) => write!(f, "killed by signal {}", signal),
        }
    }
}
