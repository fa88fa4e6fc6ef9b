// SPDX-License-Identifier: MPL-2.0
//! External `ffmpeg`/`ffprobe` process management.
//!
//! Children are spawned with stdout piped for raw output. In-memory media is
//! written to stdin from a feeder thread so a full output pipe can never
//! deadlock against a full input pipe. Stderr is collected in the background
//! and attached to failure messages.

use crate::error::{Error, Result};
use std::io::{self, Read, Write};
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Longest stderr excerpt kept for error messages.
const STDERR_EXCERPT_LEN: usize = 512;

/// Returns true if `program -version` runs and exits successfully.
#[must_use]
pub fn binary_available(program: &str) -> bool {
    Command::new(program)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|status| status.success())
}

/// Fails with [`Error::BackendUnavailable`] if `program` cannot be run.
pub fn ensure_available(program: &str, backend: &'static str) -> Result<()> {
    if binary_available(program) {
        Ok(())
    } else {
        Err(Error::BackendUnavailable {
            backend,
            reason: format!("'{program}' is not installed or not runnable"),
        })
    }
}

/// Runs a short-lived command to completion and returns its stdout.
pub fn run_to_completion(program: &str, args: &[String]) -> Result<Vec<u8>> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| Error::Io(format!("Failed to run {program}: {e}")))?;

    if !output.status.success() {
        return Err(Error::Io(format!(
            "{program} exited with {}: {}",
            output.status,
            excerpt(&String::from_utf8_lossy(&output.stderr))
        )));
    }
    Ok(output.stdout)
}

/// A spawned decoder process whose stdout is read by the caller.
///
/// Dropping a `ManagedChild` kills and reaps the process.
pub struct ManagedChild {
    program: String,
    child: Child,
    stdout: Option<ChildStdout>,
    feeder: Option<JoinHandle<()>>,
    stderr: Option<JoinHandle<String>>,
}

impl ManagedChild {
    /// Spawns `program` with `args`, optionally feeding `stdin_bytes`.
    pub fn spawn(program: &str, args: &[String], stdin_bytes: Option<Arc<[u8]>>) -> Result<Self> {
        log::debug!("spawning {program} {}", args.join(" "));

        let mut child = Command::new(program)
            .args(args)
            .stdin(if stdin_bytes.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Io(format!("Failed to spawn {program}: {e}")))?;

        let feeder = match (stdin_bytes, child.stdin.take()) {
            (Some(bytes), Some(mut stdin)) => Some(thread::spawn(move || {
                // A broken pipe here only means the child stopped reading early.
                let _ = stdin.write_all(&bytes);
            })),
            _ => None,
        };

        let stderr = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut text = String::new();
                let _ = pipe.read_to_string(&mut text);
                text
            })
        });

        let stdout = child.stdout.take();

        Ok(Self {
            program: program.to_string(),
            child,
            stdout,
            feeder,
            stderr,
        })
    }

    /// Reads until `buf` is full or stdout hits EOF. Returns bytes read.
    pub fn read_full(&mut self, buf: &mut [u8]) -> Result<usize> {
        let stdout = self
            .stdout
            .as_mut()
            .ok_or_else(|| Error::Io(format!("{} stdout is closed", self.program)))?;
        read_full(stdout, buf).map_err(|e| Error::Io(format!("Failed to read {}: {e}", self.program)))
    }

    /// Kills the process without waiting for output.
    pub fn kill(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        self.join_helpers();
    }

    /// Waits for exit and reports a failure with the stderr excerpt.
    pub fn finish(mut self) -> Result<()> {
        self.stdout = None;
        let status = self
            .child
            .wait()
            .map_err(|e| Error::Io(format!("Failed to wait for {}: {e}", self.program)))?;
        let stderr = self.join_helpers();
        check_status(&self.program, status, &stderr)
    }

    fn join_helpers(&mut self) -> String {
        if let Some(feeder) = self.feeder.take() {
            let _ = feeder.join();
        }
        self.stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default()
    }
}

impl Drop for ManagedChild {
    fn drop(&mut self) {
        if matches!(self.child.try_wait(), Ok(None)) {
            self.kill();
        } else {
            self.join_helpers();
        }
    }
}

fn check_status(program: &str, status: ExitStatus, stderr: &str) -> Result<()> {
    if status.success() {
        Ok(())
    } else {
        Err(Error::Io(format!(
            "{program} exited with {status}: {}",
            excerpt(stderr)
        )))
    }
}

fn excerpt(text: &str) -> &str {
    let text = text.trim();
    match text.char_indices().nth(STDERR_EXCERPT_LEN) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}

/// Reads until `buf` is full or the reader hits EOF.
pub fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
