//! Process launching: request accumulation, descriptor plumbing, the
//! fork/exec report protocol, and the parent-side stream handles.

pub(crate) mod channel;
pub(crate) mod child;
pub mod process;
pub mod request;
pub mod stream;
