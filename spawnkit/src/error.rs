use thiserror::Error;

use crate::spawn::request::LaunchBuilderError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// A system call failed on the parent side or before the image swap.
    #[error("system call `{call}` failed: {source}")]
    Os {
        call: &'static str,
        source: std::io::Error,
    },
    /// The child reported a failure between fork and exec.
    #[error("launch failed: {0}")]
    Launch(String),
    /// The launch request was incomplete or inconsistent.
    #[error("invalid launch request: {0}")]
    Request(#[from] LaunchBuilderError),
}

impl Error {
    /// Capture `errno` for the system call that just failed.
    pub(crate) fn os(call: &'static str) -> Self {
        Self::Os {
            call,
            source: std::io::Error::last_os_error(),
        }
    }
}
