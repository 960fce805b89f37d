//! Thin safe wrappers over the libc calls the launch path needs.

use std::io;
use std::os::fd::{FromRawFd, OwnedFd, RawFd};

use crate::error::{Error, Result};

/// Upper bound for one report written down the status pipe.
pub const REPORT_LIMIT: usize = 1024;

/// Interrupted reads tolerated before the report read gives up.
const EINTR_RETRY_LIMIT: u32 = 50;

/// A pipe with close-on-exec set on both ends, as `(read, write)`.
pub fn pipe_cloexec() -> Result<(OwnedFd, OwnedFd)> {
    let mut ends = [0 as libc::c_int; 2];
    if unsafe { libc::pipe(ends.as_mut_ptr()) } == -1 {
        return Err(Error::os("pipe"));
    }
    let pair = unsafe { (OwnedFd::from_raw_fd(ends[0]), OwnedFd::from_raw_fd(ends[1])) };
    set_cloexec(ends[0], true)?;
    set_cloexec(ends[1], true)?;
    Ok(pair)
}

/// Set or clear the close-on-exec flag.
pub fn set_cloexec(fd: RawFd, on: bool) -> Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD, 0) };
    if flags == -1 {
        return Err(Error::os("fcntl"));
    }
    let flags = match on {
        true => flags | libc::FD_CLOEXEC,
        false => flags & !libc::FD_CLOEXEC,
    };
    match unsafe { libc::fcntl(fd, libc::F_SETFD, flags) } {
        -1 => Err(Error::os("fcntl")),
        _ => Ok(()),
    }
}

pub fn dup(fd: RawFd) -> Result<RawFd> {
    match unsafe { libc::dup(fd) } {
        -1 => Err(Error::os("dup")),
        copy => Ok(copy),
    }
}

pub fn dup2(source: RawFd, target: RawFd) -> Result<()> {
    match unsafe { libc::dup2(source, target) } {
        -1 => Err(Error::os("dup2")),
        _ => Ok(()),
    }
}

/// Close without surfacing the result, for descriptors whose table entry
/// is being abandoned wholesale.
pub fn close_quietly(fd: RawFd) {
    unsafe {
        libc::close(fd);
    }
}

/// Duplicate the calling process.
///
/// Returns the child's pid in the parent and zero in the child.
pub fn fork() -> Result<libc::pid_t> {
    match unsafe { libc::fork() } {
        -1 => Err(Error::os("fork")),
        pid => Ok(pid),
    }
}

/// Read until end-of-data or `buf` is full, tolerating a bounded number of
/// interrupted reads.
pub fn read_atmost(fd: RawFd, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    let mut interrupted = 0;
    while filled < buf.len() {
        let count = unsafe {
            libc::read(
                fd,
                buf[filled..].as_mut_ptr() as *mut libc::c_void,
                buf.len() - filled,
            )
        };
        match count {
            -1 => {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    interrupted += 1;
                    if interrupted < EINTR_RETRY_LIMIT {
                        continue;
                    }
                }
                return Err(Error::Os {
                    call: "read",
                    source: err,
                });
            }
            0 => break,
            count => filled += count as usize,
        }
    }
    Ok(filled)
}

/// Write all of `buf`, restarting after partial writes.
pub fn write_all(fd: RawFd, buf: &[u8]) -> Result<()> {
    let mut written = 0;
    while written < buf.len() {
        let count = unsafe {
            libc::write(
                fd,
                buf[written..].as_ptr() as *const libc::c_void,
                buf.len() - written,
            )
        };
        if count == -1 {
            return Err(Error::os("write"));
        }
        written += count as usize;
    }
    Ok(())
}

/// One past the highest descriptor number a process may hold.
pub fn open_file_limit() -> Result<libc::c_long> {
    match unsafe { libc::sysconf(libc::_SC_OPEN_MAX) } {
        -1 => Err(Error::os("sysconf")),
        ceiling => Ok(ceiling),
    }
}

/// Reap `pid` without ever parking in the kernel; spurious wake conditions
/// just spin the loop again.
pub fn reap_polling(pid: libc::pid_t) -> Result<libc::c_int> {
    let mut status: libc::c_int = 0;
    loop {
        match unsafe { libc::waitpid(pid, &mut status, libc::WNOHANG) } {
            -1 => return Err(Error::os("waitpid")),
            0 => std::hint::spin_loop(),
            _ => return Ok(status),
        }
    }
}

/// Block until `pid` exits and collect its raw status.
pub fn wait_blocking(pid: libc::pid_t) -> Result<libc::c_int> {
    let mut status: libc::c_int = 0;
    loop {
        match unsafe { libc::waitpid(pid, &mut status, 0) } {
            -1 => {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(Error::Os {
                    call: "waitpid",
                    source: err,
                });
            }
            _ => return Ok(status),
        }
    }
}
