use std::fmt;
use std::io::Read;
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::CommandError;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// One external program invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Step {
    pub program: String,
    pub args: Vec<String>,
}

impl Step {
    pub fn new<P, I, S>(program: P, args: I) -> Self
    where
        P: Into<String>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Something able to run a [`Step`].
pub trait Exec: Send + Sync {
    /// Run `step`, returning its standard output.
    fn exec(&self, step: &Step, timeout: Duration) -> Result<String, CommandError>;
}

impl<E: Exec + ?Sized> Exec for &E {
    fn exec(&self, step: &Step, timeout: Duration) -> Result<String, CommandError> {
        (**self).exec(step, timeout)
    }
}

/// Runs steps as operating system processes.
#[derive(Copy, Clone, Debug, Default)]
pub struct System;

impl Exec for System {
    fn exec(&self, step: &Step, timeout: Duration) -> Result<String, CommandError> {
        run(step, timeout)
    }
}

/// Run `step` to completion, killing it once `timeout` elapses.
pub fn run(step: &Step, timeout: Duration) -> Result<String, CommandError> {
    let command = step.to_string();
    log::debug!("exec `{command}`");

    let mut cmd = Command::new(&step.program);
    cmd.args(&step.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        cmd.creation_flags(windows_sys::Win32::System::Threading::CREATE_NO_WINDOW);
    }

    let mut child = cmd.spawn().map_err(|e| CommandError::Spawn {
        command: command.clone(),
        reason: e.to_string(),
    })?;
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                // the reader threads are left to finish on their own; a
                // grandchild may still hold the pipes open
                return Err(CommandError::Timeout { command, timeout });
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                let _ = child.kill();
                return Err(CommandError::Spawn {
                    command,
                    reason: e.to_string(),
                });
            }
        }
    };

    let stdout = collect(stdout);
    if !status.success() {
        let stderr = collect(stderr);
        let stderr = if stderr.trim().is_empty() {
            stdout
        } else {
            stderr
        };
        return Err(CommandError::Status {
            command,
            status: status.to_string(),
            stderr: stderr.trim().to_string(),
        });
    }
    Ok(stdout)
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(reader: Option<JoinHandle<Vec<u8>>>) -> String {
    reader
        .and_then(|h| h.join().ok())
        .map(|buf| String::from_utf8_lossy(&buf).into_owned())
        .unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout() {
        let out = run(&Step::new("sh", ["-c", "echo 10.0.0.1"]), Duration::from_secs(5)).unwrap();
        assert_eq!(out.trim(), "10.0.0.1");
    }

    #[test]
    fn nonzero_exit_carries_stderr() {
        let err = run(
            &Step::new("sh", ["-c", "echo boom >&2; exit 3"]),
            Duration::from_secs(5),
        )
        .unwrap_err();
        match err {
            CommandError::Status { stderr, .. } => assert_eq!(stderr, "boom"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_program_fails_to_spawn() {
        let err = run(
            &Step::new("/nonexistent/tun-drive-helper", Vec::<String>::new()),
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }), "{err}");
    }

    #[test]
    fn slow_command_times_out() {
        let started = Instant::now();
        let err = run(&Step::new("sleep", ["5"]), Duration::from_millis(100)).unwrap_err();
        assert!(matches!(err, CommandError::Timeout { .. }), "{err}");
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn step_displays_as_command_line() {
        let step = Step::new("/sbin/ip", ["link", "set", "dev", "tun0", "up"]);
        assert_eq!(step.to_string(), "/sbin/ip link set dev tun0 up");
    }
}
