//! Accumulates typed launch options into a pending request.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::cmdline;
use crate::error::Result;

use super::process::Process;
use super::stream::{Input, Output};

/// Everything a launch needs, gathered before the fork.
///
/// Mutable only through [`LaunchBuilder`]; once the process is forked the
/// child reads its own copy of the request, so nothing here needs
/// synchronization.
#[derive(Debug, derive_builder::Builder)]
#[builder(pattern = "owned", build_fn(validate = "Self::validate"))]
pub struct Launch {
    /// Program to load; defaults to the first argument token.
    #[builder(default, setter(strip_option, into))]
    pub(crate) executable: Option<String>,
    /// Argument vector handed to the child, `argv[0]` included.
    #[builder(setter(custom))]
    pub(crate) args: Vec<String>,
    /// Directory the child changes into before exec.
    #[builder(default, setter(strip_option, into))]
    pub(crate) cwd: Option<PathBuf>,
    /// Replacement environment; an empty map means the child inherits ours.
    #[builder(default)]
    pub(crate) env: BTreeMap<String, String>,
    /// 0 and 1 select unbuffered handles, larger values a block size.
    #[builder(default)]
    pub(crate) bufsize: usize,
    /// Close every inherited descriptor above stderr before exec.
    #[builder(default)]
    pub(crate) close_descriptors: bool,
    /// Do not fork inside `spawn`; the caller triggers `start` itself.
    #[builder(default)]
    pub(crate) defer_start: bool,
    /// Child stdin wiring.
    #[builder(default)]
    pub(crate) stdin: Input,
    /// Child stdout wiring.
    #[builder(default)]
    pub(crate) stdout: Output,
    /// Child stderr wiring.
    #[builder(default)]
    pub(crate) stderr: Output,
}

impl Launch {
    /// Start collecting options.
    pub fn builder() -> LaunchBuilder {
        LaunchBuilder::default()
    }

    /// The program that will be loaded: the explicit override, or the
    /// first argument token (`build` guarantees one of the two exists).
    pub(crate) fn resolve_executable(&self) -> &str {
        match &self.executable {
            Some(exe) => exe,
            None => &self.args[0],
        }
    }
}

impl LaunchBuilder {
    /// Use a pre-tokenized argument vector.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = Some(args.into_iter().map(Into::into).collect());
        self
    }

    /// Split a whitespace-delimited command line into the argument vector.
    pub fn cmdline(mut self, line: impl AsRef<str>) -> Self {
        self.args = Some(cmdline::split(line.as_ref()));
        self
    }

    /// Build the request and hand it to the launcher.
    pub fn spawn(self) -> Result<Process> {
        Process::spawn(self.build()?)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        let no_executable = matches!(self.executable, None | Some(None));
        let empty_args = matches!(&self.args, Some(args) if args.is_empty());
        if no_executable && empty_args {
            return Err("argument vector is empty and no executable was named".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn later_setters_overwrite_earlier_ones() {
        let request = Launch::builder()
            .cmdline("echo first")
            .bufsize(4096)
            .bufsize(0)
            .cmdline("echo final")
            .build()
            .unwrap();
        assert_eq!(request.bufsize, 0);
        assert_eq!(request.args, vec!["echo", "final"]);
    }

    #[test]
    fn executable_defaults_to_the_first_token() {
        let request = Launch::builder().cmdline("cat -v").build().unwrap();
        assert_eq!(request.resolve_executable(), "cat");

        let request = Launch::builder()
            .cmdline("cat -v")
            .executable("busybox")
            .build()
            .unwrap();
        assert_eq!(request.resolve_executable(), "busybox");
    }

    #[test]
    fn an_empty_command_line_does_not_build() {
        assert!(Launch::builder().cmdline(" ").build().is_err());
    }

    #[test]
    fn missing_args_do_not_build() {
        assert!(Launch::builder().build().is_err());
    }
}
