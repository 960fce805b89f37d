//! Descriptor bookkeeping across the fork boundary.

use std::os::fd::OwnedFd;

use super::stream::{ChildEnd, ChildStderr, ChildStdin, ChildStdout, Input, Output};

/// The six standard-stream descriptor slots for one launch.
///
/// A parent slot and its child counterpart are the two ends of one pipe,
/// or one end plus a caller-supplied descriptor. Taking a slot marks it
/// unset, so each descriptor this set owns is closed at most once.
#[derive(Debug, Default)]
pub(crate) struct ChannelSet {
    /// Parent end feeding the child's stdin.
    pub(crate) write_to_child: Option<OwnedFd>,
    /// Parent end draining the child's stdout.
    pub(crate) read_from_child: Option<OwnedFd>,
    /// Parent end draining the child's stderr.
    pub(crate) read_error: Option<OwnedFd>,
    /// Child-side stdin source.
    pub(crate) read_from_parent: Option<ChildEnd>,
    /// Child-side stdout sink.
    pub(crate) write_to_parent: Option<ChildEnd>,
    /// Child-side stderr sink.
    pub(crate) write_error: Option<ChildEnd>,
}

impl ChannelSet {
    /// Partition the opened endpoints into their six slots.
    pub(crate) fn open(stdin: Input, stdout: Output, stderr: Output) -> Self {
        Self {
            write_to_child: stdin.parent,
            read_from_parent: stdin.child,
            read_from_child: stdout.parent,
            write_to_parent: stdout.child,
            read_error: stderr.parent,
            write_error: stderr.child,
        }
    }

    /// Drop every parent-owned descriptor; runs in the child branch, and
    /// again in the parent when a launch fails.
    pub(crate) fn close_parent_side(&mut self) {
        self.write_to_child.take();
        self.read_from_child.take();
        self.read_error.take();
    }

    /// Drop the child-side copies; runs in the parent branch. Borrowed
    /// descriptors stay open for their owner.
    pub(crate) fn close_child_side(&mut self) {
        self.read_from_parent.take();
        self.write_to_parent.take();
        self.write_error.take();
    }

    /// Hand the surviving parent ends over to buffered handles. Each
    /// handle is the sole closer of its descriptor from here on.
    pub(crate) fn finalize(
        &mut self,
        bufsize: usize,
    ) -> (Option<ChildStdin>, Option<ChildStdout>, Option<ChildStderr>) {
        (
            self.write_to_child
                .take()
                .map(|fd| ChildStdin::new(fd, bufsize)),
            self.read_from_child
                .take()
                .map(|fd| ChildStdout::new(fd, bufsize)),
            self.read_error
                .take()
                .map(|fd| ChildStderr::new(fd, bufsize)),
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::os;
    use std::os::fd::AsRawFd;

    fn alive(fd: i32) -> bool {
        unsafe { libc::fcntl(fd, libc::F_GETFD, 0) != -1 }
    }

    #[test]
    fn close_child_side_spares_borrowed_descriptors() {
        let (rd, _wr) = os::pipe_cloexec().unwrap();
        let raw = rd.as_raw_fd();
        let mut set = ChannelSet::open(
            Input::descriptor(raw),
            Output::inherit(),
            Output::inherit(),
        );
        set.close_child_side();
        assert!(set.read_from_parent.is_none());
        assert!(alive(raw));
    }

    #[test]
    fn closing_a_side_unsets_its_slots() {
        let mut set = ChannelSet::open(
            Input::pipe().unwrap(),
            Output::pipe().unwrap(),
            Output::inherit(),
        );
        assert!(set.read_from_parent.is_some());
        assert!(set.write_to_parent.is_some());

        set.close_child_side();
        assert!(set.read_from_parent.is_none());
        assert!(set.write_to_parent.is_none());
        // the parent ends survive for finalize
        assert!(set.write_to_child.is_some());
        assert!(set.read_from_child.is_some());

        let (stdin, stdout, stderr) = set.finalize(0);
        assert!(stdin.is_some());
        assert!(stdout.is_some());
        assert!(stderr.is_none());
        assert!(set.write_to_child.is_none());
        assert!(set.read_from_child.is_none());
    }
}
