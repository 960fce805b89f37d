//! Launch a child process with caller-chosen standard-stream wiring, and
//! surface failures that happen between fork and exec as ordinary errors
//! instead of an opaque non-zero exit status.
//!
//! Communication with the child is synchronous: the parent-side handles
//! finalized after a successful launch read and write one buffer at a time.

pub mod cmdline;
pub mod error;
mod os;
pub mod spawn;

#[cfg(test)]
mod test;

pub use error::Error;

pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::spawn::process::{ExitStatus, Process};
    pub use crate::spawn::request::{Launch, LaunchBuilder};
    pub use crate::spawn::stream::{ChildStderr, ChildStdin, ChildStdout, Input, Output};
}
