use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::os::fd::AsRawFd;

use crate::os;
use crate::prelude::*;

use super::init;

fn read_stdout(process: &mut Process) -> String {
    let mut captured = String::new();
    process
        .stdout
        .take()
        .unwrap()
        .read_to_string(&mut captured)
        .unwrap();
    captured
}

#[test]
fn round_trip_through_a_stdout_pipe() {
    init();
    let mut process = Launch::builder()
        .cmdline("echo hello")
        .stdout(Output::pipe().unwrap())
        .spawn()
        .unwrap();

    assert!(process.pid().unwrap() > 0);
    assert_eq!(read_stdout(&mut process), "hello\n");
    assert!(process.wait().unwrap().success());
}

#[test]
fn stdin_pipe_feeds_the_child() {
    init();
    let mut process = Launch::builder()
        .cmdline("cat")
        .stdin(Input::pipe().unwrap())
        .stdout(Output::pipe().unwrap())
        .spawn()
        .unwrap();

    let mut stdin = process.stdin.take().unwrap();
    stdin.write_all(b"over the wall\n").unwrap();
    drop(stdin); // end-of-input for cat

    assert_eq!(read_stdout(&mut process), "over the wall\n");
    assert!(process.wait().unwrap().success());
}

#[test]
fn stderr_pipe_is_separate_from_stdout() {
    init();
    let mut process = Launch::builder()
        .args(["/bin/sh", "-c", "echo out; echo err >&2"])
        .stdout(Output::pipe().unwrap())
        .stderr(Output::pipe().unwrap())
        .spawn()
        .unwrap();

    let mut err = String::new();
    process
        .stderr
        .take()
        .unwrap()
        .read_to_string(&mut err)
        .unwrap();
    assert_eq!(read_stdout(&mut process), "out\n");
    assert_eq!(err, "err\n");
    process.wait().unwrap();
}

#[test]
fn missing_executable_is_reported() {
    init();
    let err = Launch::builder()
        .cmdline("surely-no-such-binary-here")
        .spawn()
        .unwrap_err();

    match err {
        Error::Launch(message) => assert!(
            message.contains("No such file"),
            "unexpected report: {}",
            message
        ),
        other => panic!("expected a launch error, got {}", other),
    }
}

#[test]
fn failed_launch_releases_parent_descriptors() {
    init();
    let mut process = Launch::builder()
        .cmdline("surely-no-such-binary-here")
        .stdin(Input::pipe().unwrap())
        .stdout(Output::pipe().unwrap())
        .defer_start(true)
        .spawn()
        .unwrap();

    let err = process.start().unwrap_err();
    assert!(matches!(err, Error::Launch(_)));
    assert!(process.pid().is_none());
    assert!(process.stdin.is_none());
    assert!(process.stdout.is_none());
}

#[test]
fn environment_replaces_instead_of_overlaying() {
    init();
    let mut env = BTreeMap::new();
    env.insert("X".to_owned(), "1".to_owned());

    let mut process = Launch::builder()
        .args(["/bin/sh", "-c", "echo ${X}:${HOME}"])
        .env(env)
        .stdout(Output::pipe().unwrap())
        .spawn()
        .unwrap();

    // X comes through, HOME does not: the mapping is the whole environment
    assert_eq!(read_stdout(&mut process), "1:\n");
    assert!(process.wait().unwrap().success());
}

#[test]
fn working_directory_applies_before_exec() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let expected = dir.path().canonicalize().unwrap();

    let mut process = Launch::builder()
        .cmdline("pwd")
        .cwd(&expected)
        .stdout(Output::pipe().unwrap())
        .spawn()
        .unwrap();

    assert_eq!(read_stdout(&mut process).trim_end(), expected.to_str().unwrap());
    assert!(process.wait().unwrap().success());
}

#[test]
fn bad_working_directory_fails_the_launch() {
    init();
    let err = Launch::builder()
        .cmdline("echo unreachable")
        .cwd("/definitely/not/a/directory")
        .spawn()
        .unwrap_err();

    match err {
        Error::Launch(message) => assert!(message.contains("chdir"), "{}", message),
        other => panic!("expected a launch error, got {}", other),
    }
}

#[test]
fn deferred_start_waits_for_the_trigger() {
    init();
    let mut process = Launch::builder()
        .cmdline("echo deferred")
        .stdout(Output::pipe().unwrap())
        .defer_start(true)
        .spawn()
        .unwrap();

    assert!(process.pid().is_none());
    assert!(process.stdout.is_none());

    process.start().unwrap();
    assert!(process.pid().is_some());
    assert_eq!(read_stdout(&mut process), "deferred\n");
    assert!(process.wait().unwrap().success());
}

#[test]
#[should_panic(expected = "already started")]
fn double_start_is_a_caller_bug() {
    let mut process = Launch::builder()
        .cmdline("true")
        .defer_start(true)
        .spawn()
        .unwrap();
    process.start().unwrap();
    process.wait().unwrap();
    process.start().unwrap();
}

#[test]
fn executable_overrides_the_first_token() {
    init();
    // argv[0] keeps the fake name, but /bin/echo is what runs
    let mut process = Launch::builder()
        .args(["not-a-real-name", "override works"])
        .executable("echo")
        .stdout(Output::pipe().unwrap())
        .spawn()
        .unwrap();

    assert_eq!(read_stdout(&mut process), "override works\n");
    process.wait().unwrap();
}

#[test]
fn buffering_selector_shapes_the_handles() {
    init();
    for bufsize in [0usize, 1] {
        let mut process = Launch::builder()
            .cmdline("echo unbuffered")
            .stdout(Output::pipe().unwrap())
            .bufsize(bufsize)
            .spawn()
            .unwrap();
        assert_eq!(process.stdout.as_ref().unwrap().block_size(), 0);
        assert_eq!(read_stdout(&mut process), "unbuffered\n");
        process.wait().unwrap();
    }

    let mut process = Launch::builder()
        .cmdline("cat")
        .stdin(Input::pipe().unwrap())
        .stdout(Output::pipe().unwrap())
        .stderr(Output::pipe().unwrap())
        .bufsize(4096)
        .spawn()
        .unwrap();
    assert_eq!(process.stdin.as_ref().unwrap().block_size(), 4096);
    assert_eq!(process.stdout.as_ref().unwrap().block_size(), 4096);
    assert_eq!(process.stderr.as_ref().unwrap().block_size(), 4096);

    let mut stdin = process.stdin.take().unwrap();
    stdin.write_all(b"buffered write\n").unwrap();
    drop(stdin); // flushes the block buffer before closing
    assert_eq!(read_stdout(&mut process), "buffered write\n");
    process.wait().unwrap();
}

#[test]
fn file_endpoints_wire_both_directions() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let input_path = dir.path().join("input");
    let output_path = dir.path().join("output");
    std::fs::write(&input_path, "from a file\n").unwrap();

    let mut process = Launch::builder()
        .cmdline("cat")
        .stdin(Input::file(&input_path).unwrap())
        .stdout(Output::file(&output_path).unwrap())
        .spawn()
        .unwrap();
    assert!(process.wait().unwrap().success());
    assert_eq!(
        std::fs::read_to_string(&output_path).unwrap(),
        "from a file\n"
    );
}

#[test]
fn output_files_append_across_launches() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("log");

    for word in ["one", "two"] {
        let mut process = Launch::builder()
            .args(["echo", word])
            .stdout(Output::file(&path).unwrap())
            .spawn()
            .unwrap();
        assert!(process.wait().unwrap().success());
    }
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "one\ntwo\n");
}

#[test]
fn bad_input_file_fails_before_any_fork() {
    let err = Input::file("/no/such/input").unwrap_err();
    match err {
        Error::Os { call, .. } => assert_eq!(call, "open"),
        other => panic!("expected an os error, got {}", other),
    }
}

#[test]
fn caller_descriptors_are_borrowed_not_closed() {
    init();
    let (rd, wr) = os::pipe_cloexec().unwrap();

    let mut process = Launch::builder()
        .cmdline("echo through a borrowed fd")
        .stdout(Output::descriptor(wr.as_raw_fd()))
        .spawn()
        .unwrap();
    assert!(process.wait().unwrap().success());

    // our end stayed open; close it ourselves to get end-of-data
    assert_ne!(unsafe { libc::fcntl(wr.as_raw_fd(), libc::F_GETFD, 0) }, -1);
    drop(wr);

    let mut captured = String::new();
    let mut reader = std::fs::File::from(rd);
    reader.read_to_string(&mut captured).unwrap();
    assert_eq!(captured, "through a borrowed fd\n");
}

#[test]
fn descriptor_sweep_spares_only_the_standard_streams() {
    init();
    // deliberately carry one descriptor across exec
    let (_keep_rd, keep_wr) = os::pipe_cloexec().unwrap();
    os::set_cloexec(keep_wr.as_raw_fd(), false).unwrap();
    let leaked = format!("/proc/self/fd/{}", keep_wr.as_raw_fd());

    let listing = |close: bool| {
        let mut process = Launch::builder()
            .args(["/bin/sh", "-c", "echo /proc/self/fd/*"])
            .stdout(Output::pipe().unwrap())
            .close_descriptors(close)
            .spawn()
            .unwrap();
        let captured = read_stdout(&mut process);
        process.wait().unwrap();
        captured
    };

    let swept = listing(true);
    assert!(
        !swept.split_whitespace().any(|entry| entry == leaked),
        "swept child still held {}: {}",
        leaked,
        swept
    );

    let inherited = listing(false);
    assert!(
        inherited.split_whitespace().any(|entry| entry == leaked),
        "control child lost {}: {}",
        leaked,
        inherited
    );
}

#[test]
fn wait_reports_the_exit_code() {
    init();
    let mut process = Launch::builder()
        .args(["/bin/sh", "-c", "exit 13"])
        .spawn()
        .unwrap();
    assert_eq!(process.wait().unwrap(), ExitStatus::Code(13));
    // a second wait returns the cached status
    assert_eq!(process.wait().unwrap(), ExitStatus::Code(13));
}

#[test]
fn empty_requests_are_rejected_up_front() {
    let err = Launch::builder().cmdline("").spawn().unwrap_err();
    match err {
        Error::Request(_) => {}
        other => panic!("expected a request error, got {}", other),
    }
}
