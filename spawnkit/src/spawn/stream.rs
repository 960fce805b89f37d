//! Endpoint specifications for the child's standard streams, and the
//! buffered handles the parent gets back after a successful launch.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use crate::error::{Error, Result};
use crate::os;

/// Mode bits for file-backed output endpoints.
const OUTPUT_FILE_MODE: u32 = 0o640;

/// Child-side end of one standard-stream slot.
///
/// Borrowed descriptors belong to the caller and are never closed on the
/// parent side of the fork.
#[derive(Debug)]
pub(crate) enum ChildEnd {
    Owned(OwnedFd),
    Borrowed(RawFd),
}

impl ChildEnd {
    pub(crate) fn raw(&self) -> RawFd {
        match self {
            Self::Owned(fd) => fd.as_raw_fd(),
            Self::Borrowed(fd) => *fd,
        }
    }
}

/// Where the child's stdin comes from.
///
/// File- and pipe-backed endpoints open their descriptors right here, so a
/// bad path fails before any process exists.
#[derive(Debug, Default)]
pub struct Input {
    pub(crate) child: Option<ChildEnd>,
    pub(crate) parent: Option<OwnedFd>,
}

impl Input {
    /// Leave stdin alone; the child shares the parent's.
    pub fn inherit() -> Self {
        Self::default()
    }

    /// Read stdin from a descriptor the caller owns and keeps open.
    pub fn descriptor(fd: RawFd) -> Self {
        Self {
            child: Some(ChildEnd::Borrowed(fd)),
            parent: None,
        }
    }

    /// Read stdin from a file, opened read-only.
    pub fn file(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path).map_err(|source| Error::Os {
            call: "open",
            source,
        })?;
        Ok(Self {
            child: Some(ChildEnd::Owned(file.into())),
            parent: None,
        })
    }

    /// Connect stdin to a fresh pipe; the parent keeps the write end.
    pub fn pipe() -> Result<Self> {
        let (rd, wr) = os::pipe_cloexec()?;
        Ok(Self {
            child: Some(ChildEnd::Owned(rd)),
            parent: Some(wr),
        })
    }
}

/// Where the child's stdout or stderr goes.
#[derive(Debug, Default)]
pub struct Output {
    pub(crate) child: Option<ChildEnd>,
    pub(crate) parent: Option<OwnedFd>,
}

impl Output {
    /// Leave the stream alone; the child shares the parent's.
    pub fn inherit() -> Self {
        Self::default()
    }

    /// Write to a descriptor the caller owns and keeps open.
    pub fn descriptor(fd: RawFd) -> Self {
        Self {
            child: Some(ChildEnd::Borrowed(fd)),
            parent: None,
        }
    }

    /// Append to a file, created if missing.
    pub fn file(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .mode(OUTPUT_FILE_MODE)
            .open(path)
            .map_err(|source| Error::Os {
                call: "open",
                source,
            })?;
        Ok(Self {
            child: Some(ChildEnd::Owned(file.into())),
            parent: None,
        })
    }

    /// Connect the stream to a fresh pipe; the parent keeps the read end.
    pub fn pipe() -> Result<Self> {
        let (rd, wr) = os::pipe_cloexec()?;
        Ok(Self {
            child: Some(ChildEnd::Owned(wr)),
            parent: Some(rd),
        })
    }
}

#[derive(Debug)]
enum Sink {
    Plain(File),
    Block(BufWriter<File>),
}

#[derive(Debug)]
enum Source {
    Plain(File),
    Block(BufReader<File>),
}

impl Source {
    fn new(fd: OwnedFd, bufsize: usize) -> Self {
        let file = File::from(fd);
        match bufsize {
            0 | 1 => Self::Plain(file),
            block => Self::Block(BufReader::with_capacity(block, file)),
        }
    }

    fn block_size(&self) -> usize {
        match self {
            Self::Plain(_) => 0,
            Self::Block(reader) => reader.capacity(),
        }
    }
}

impl Read for Source {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Plain(file) => file.read(buf),
            Self::Block(reader) => reader.read(buf),
        }
    }
}

/// Write end of the pipe feeding the child's stdin.
///
/// Dropping the handle closes the descriptor (flushing first when block
/// buffered), which is how the child sees end-of-input.
#[derive(Debug)]
pub struct ChildStdin(Sink);

impl ChildStdin {
    pub(crate) fn new(fd: OwnedFd, bufsize: usize) -> Self {
        let file = File::from(fd);
        Self(match bufsize {
            0 | 1 => Sink::Plain(file),
            block => Sink::Block(BufWriter::with_capacity(block, file)),
        })
    }

    pub(crate) fn block_size(&self) -> usize {
        match &self.0 {
            Sink::Plain(_) => 0,
            Sink::Block(writer) => writer.capacity(),
        }
    }
}

impl Write for ChildStdin {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.0 {
            Sink::Plain(file) => file.write(buf),
            Sink::Block(writer) => writer.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.0 {
            Sink::Plain(file) => file.flush(),
            Sink::Block(writer) => writer.flush(),
        }
    }
}

/// Read end of the pipe carrying the child's stdout.
#[derive(Debug)]
pub struct ChildStdout(Source);

impl ChildStdout {
    pub(crate) fn new(fd: OwnedFd, bufsize: usize) -> Self {
        Self(Source::new(fd, bufsize))
    }

    pub(crate) fn block_size(&self) -> usize {
        self.0.block_size()
    }
}

impl Read for ChildStdout {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

/// Read end of the pipe carrying the child's stderr.
#[derive(Debug)]
pub struct ChildStderr(Source);

impl ChildStderr {
    pub(crate) fn new(fd: OwnedFd, bufsize: usize) -> Self {
        Self(Source::new(fd, bufsize))
    }

    pub(crate) fn block_size(&self) -> usize {
        self.0.block_size()
    }
}

impl Read for ChildStderr {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}
