//! Spawning of external tools.

use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use crate::plan::Invocation;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// How long to wait for stderr after a killed child; grandchildren may still hold the pipe.
const STDERR_GRACE: Duration = Duration::from_millis(250);

/// How a finished (or abandoned) subprocess ended.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stderr: String,
    /// The deadline passed and the child was killed.
    pub timed_out: bool,
}

impl ProcessOutput {
    pub fn status_text(&self) -> String {
        match (self.timed_out, self.code) {
            (true, _) => "timed out".to_string(),
            (false, Some(code)) => format!("exit status: {code}"),
            (false, None) => "terminated by signal".to_string(),
        }
    }
}

/// Runs an [`Invocation`] to completion.
///
/// An `Err` means the process could not be started at all; an executable that does not exist is
/// reported as [`std::io::ErrorKind::NotFound`].
pub trait ProcessRunner: Send + Sync {
    fn run(
        &self,
        invocation: &Invocation,
        deadline: Option<Instant>,
    ) -> std::io::Result<ProcessOutput>;
}

/// Runs commands on the host with stdin closed and stderr captured.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(
        &self,
        invocation: &Invocation,
        deadline: Option<Instant>,
    ) -> std::io::Result<ProcessOutput> {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        tracing::debug!(command = %invocation, "spawning");
        let mut child = command.spawn()?;

        let (tx, stderr_rx) = mpsc::channel();
        if let Some(mut pipe) = child.stderr.take() {
            std::thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf);
                let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
            });
        } else {
            drop(tx);
        }

        let mut timed_out = false;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                tracing::warn!(command = %invocation, "deadline passed, killing child");
                let _ = child.kill();
                timed_out = true;
                break child.wait()?;
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        // Past the wait, the reader thread is abandoned along with whatever still holds the pipe.
        let wait = if timed_out {
            Some(STDERR_GRACE)
        } else {
            deadline.map(|d| d.saturating_duration_since(Instant::now()) + STDERR_GRACE)
        };
        let stderr = match wait {
            Some(wait) => stderr_rx.recv_timeout(wait).unwrap_or_default(),
            None => stderr_rx.recv().unwrap_or_default(),
        };
        Ok(ProcessOutput {
            success: status.success() && !timed_out,
            code: status.code(),
            stderr,
            timed_out,
        })
    }
}

/// The last `n` lines of `text`.
pub(crate) fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}

#[cfg(test)]
mod test_runner {
    use super::*;

    #[test]
    fn missing_program_is_not_found() {
        let err = SystemRunner
            .run(&Invocation::new("/nonexistent/fetch-asset-tool"), None)
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }

    #[cfg(unix)]
    #[test]
    fn stderr_and_exit_code_are_captured() {
        let out = SystemRunner
            .run(
                &Invocation::new("sh").args(["-c", "echo oops >&2; exit 3"]),
                None,
            )
            .unwrap();
        assert!(!out.success);
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stderr.trim(), "oops");
        assert_eq!(out.status_text(), "exit status: 3");
    }

    #[cfg(unix)]
    #[test]
    fn deadline_kills_the_child() {
        let start = Instant::now();
        let out = SystemRunner
            .run(
                &Invocation::new("sleep").arg("10"),
                Some(Instant::now() + Duration::from_millis(200)),
            )
            .unwrap();
        assert!(out.timed_out);
        assert!(!out.success);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn deadline_holds_when_grandchild_keeps_stderr_open() {
        let start = Instant::now();
        let out = SystemRunner
            .run(
                &Invocation::new("sh").args(["-c", "sleep 5 & sleep 10"]),
                Some(Instant::now() + Duration::from_millis(200)),
            )
            .unwrap();
        assert!(out.timed_out);
        assert!(start.elapsed() < Duration::from_secs(2), "{:?}", start.elapsed());
    }

    #[test]
    fn tail_keeps_last_lines() {
        assert_eq!(tail_lines("a\nb\nc\nd", 2), "c\nd");
        assert_eq!(tail_lines("only", 20), "only");
        assert_eq!(tail_lines("", 3), "");
    }
}
