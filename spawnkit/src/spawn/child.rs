//! The stretch of the child process between fork and image replacement.
//!
//! Nothing here may hand control back to the caller's code: every failure
//! is written to the report pipe and the child exits.

use std::ffi::CString;
use std::io;
use std::os::fd::RawFd;
use std::os::unix::ffi::OsStrExt;
use std::ptr;

use crate::error::{Error, Result};
use crate::os;

use super::channel::ChannelSet;
use super::request::Launch;

/// Exec arguments rendered to C strings before the fork, so the child can
/// reach exec without touching the allocator.
pub(crate) struct ExecImage {
    exe: CString,
    argv: Vec<*const libc::c_char>,
    envp: Option<Vec<*const libc::c_char>>,
    cwd: Option<CString>,
    /// Backing storage the argv/envp pointers point into.
    _args: Vec<CString>,
    _vars: Vec<CString>,
}

impl ExecImage {
    pub(crate) fn prepare(request: &Launch, exe: &str) -> Result<Self> {
        let exe = cstring(exe.as_bytes(), "execvp")?;
        let args = request
            .args
            .iter()
            .map(|arg| cstring(arg.as_bytes(), "execvp"))
            .collect::<Result<Vec<_>>>()?;
        let mut argv: Vec<*const libc::c_char> = args.iter().map(|arg| arg.as_ptr()).collect();
        argv.push(ptr::null());

        let vars = request
            .env
            .iter()
            .map(|(key, value)| cstring(format!("{}={}", key, value).as_bytes(), "execvpe"))
            .collect::<Result<Vec<_>>>()?;
        let envp = match vars.is_empty() {
            true => None,
            false => {
                let mut envp: Vec<*const libc::c_char> =
                    vars.iter().map(|var| var.as_ptr()).collect();
                envp.push(ptr::null());
                Some(envp)
            }
        };

        let cwd = match &request.cwd {
            Some(dir) => Some(cstring(dir.as_os_str().as_bytes(), "chdir")?),
            None => None,
        };

        Ok(Self {
            exe,
            argv,
            envp,
            cwd,
            _args: args,
            _vars: vars,
        })
    }
}

/// The child-branch sequence: rewire descriptors, sweep, chdir, exec.
pub(crate) struct Bootstrap<'a> {
    image: &'a ExecImage,
    close_descriptors: bool,
    stdin: Option<RawFd>,
    stdout: Option<RawFd>,
    stderr: Option<RawFd>,
    /// Write end of the report pipe; spared by the descriptor sweep.
    report: RawFd,
}

impl<'a> Bootstrap<'a> {
    pub(crate) fn new(
        request: &Launch,
        image: &'a ExecImage,
        channels: &ChannelSet,
        report: RawFd,
    ) -> Self {
        Self {
            image,
            close_descriptors: request.close_descriptors,
            stdin: channels.read_from_parent.as_ref().map(|end| end.raw()),
            stdout: channels.write_to_parent.as_ref().map(|end| end.raw()),
            stderr: channels.write_error.as_ref().map(|end| end.raw()),
            report,
        }
    }

    /// Run the sequence. Never returns: either the image is replaced, or
    /// the failure is reported and the child exits.
    pub(crate) fn run(mut self) -> ! {
        if let Err(err) = self.setup() {
            // Best effort: if even the report cannot be written, there is
            // nobody left to tell.
            let _ = os::write_all(self.report, err.to_string().as_bytes());
        }
        unsafe { libc::_exit(libc::EXIT_FAILURE) }
    }

    fn setup(&mut self) -> Result<()> {
        self.rescue_collisions()?;
        self.wire_standard_streams()?;
        if self.close_descriptors {
            self.close_inherited()?;
        }
        if let Some(dir) = &self.image.cwd {
            if unsafe { libc::chdir(dir.as_ptr()) } == -1 {
                return Err(Error::os("chdir"));
            }
        }
        self.exec()
    }

    /// A stdout source sitting on fd 0 would be clobbered when stdin is
    /// placed; likewise a stderr source on fd 0 or 1.
    fn rescue_collisions(&mut self) -> Result<()> {
        if self.stdout == Some(0) {
            self.stdout = Some(os::dup(0)?);
        }
        if let Some(fd) = self.stderr {
            if fd == 0 || fd == 1 {
                self.stderr = Some(os::dup(fd)?);
            }
        }
        Ok(())
    }

    fn wire_standard_streams(&mut self) -> Result<()> {
        place(self.stdin, libc::STDIN_FILENO)?;
        place(self.stdout, libc::STDOUT_FILENO)?;
        place(self.stderr, libc::STDERR_FILENO)?;
        for fd in [self.stdin, self.stdout, self.stderr].into_iter().flatten() {
            if fd > libc::STDERR_FILENO {
                os::close_quietly(fd);
            }
        }
        Ok(())
    }

    /// Sweep every inherited descriptor above stderr, sparing only the
    /// report pipe.
    fn close_inherited(&self) -> Result<()> {
        let ceiling = os::open_file_limit()?;
        for fd in 3..ceiling as RawFd {
            if fd != self.report {
                os::close_quietly(fd);
            }
        }
        Ok(())
    }

    fn exec(&self) -> Result<()> {
        if let Some(envp) = &self.image.envp {
            unsafe {
                libc::execvpe(self.image.exe.as_ptr(), self.image.argv.as_ptr(), envp.as_ptr());
            }
        } else {
            unsafe {
                libc::execvp(self.image.exe.as_ptr(), self.image.argv.as_ptr());
            }
        }
        // exec only comes back on failure
        Err(Error::os("execvp"))
    }
}

/// Put `source` on the standard-stream slot `target`.
fn place(source: Option<RawFd>, target: RawFd) -> Result<()> {
    match source {
        // dup2 leaves the close-on-exec flag alone when both descriptors
        // are the same, so clear it by hand.
        Some(fd) if fd == target => os::set_cloexec(fd, false),
        Some(fd) => os::dup2(fd, target),
        None => Ok(()),
    }
}

fn cstring(bytes: &[u8], call: &'static str) -> Result<CString> {
    CString::new(bytes).map_err(|_| Error::Os {
        call,
        source: io::Error::from_raw_os_error(libc::EINVAL),
    })
}
