// Subprocess plumbing for ffmpeg / ffprobe
//
// Every call here blocks the calling thread until the tool exits; there is no
// timeout. A hung tool hangs the caller.

use crate::errors::{MediaError, INVALID_DATA_MARKER};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::io::Read;
use std::path::Path;
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};

/// A tool invocation prefix: program plus any leading arguments.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
        }
    }

    /// Splits on whitespace, e.g. `"nice -n 10 ffmpeg"`.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }

    /// Short name for log and error messages.
    pub fn name(&self) -> String {
        Path::new(&self.program)
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.program)
            .to_string()
    }

    fn command(&self, args: &[OsString]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).args(args).stdin(Stdio::null());
        cmd
    }
}

/// Everything a tool left behind once it is gone.
#[derive(Debug)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ToolOutput {
    /// stderr followed by stdout, lossily decoded. ffprobe reports on stderr.
    pub fn text(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stderr).into_owned();
        text.push_str(&String::from_utf8_lossy(&self.stdout));
        text
    }

    pub fn reports_invalid_data(&self) -> bool {
        self.text().contains(INVALID_DATA_MARKER)
    }
}

/// Runs a tool to completion and collects its output.
///
/// Blocks without a timeout.
pub fn run_blocking(tool: &ToolCommand, args: &[OsString]) -> Result<ToolOutput, MediaError> {
    tracing::debug!("Running {} {:?}", tool.name(), args);
    let output = tool
        .command(args)
        .output()
        .map_err(|source| MediaError::Spawn {
            tool: tool.name(),
            source,
        })?;
    Ok(ToolOutput {
        status: output.status,
        stdout: output.stdout,
        stderr: output.stderr,
    })
}

/// Owns a running tool whose stdout is streamed.
///
/// The child is killed, its pipes drained and the process reaped when the
/// guard is finished or dropped, whichever comes first.
pub struct ToolProcess {
    child: Option<Child>,
    tool: String,
}

impl ToolProcess {
    pub fn spawn(tool: &ToolCommand, args: &[OsString]) -> Result<Self, MediaError> {
        tracing::debug!("Spawning {} {:?}", tool.name(), args);
        let child = tool
            .command(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| MediaError::Spawn {
                tool: tool.name(),
                source,
            })?;
        Ok(Self {
            child: Some(child),
            tool: tool.name(),
        })
    }

    fn stdout(&mut self) -> Option<&mut ChildStdout> {
        self.child.as_mut().and_then(|c| c.stdout.as_mut())
    }

    /// Reads exactly `len` bytes from stdout, blocking until they arrive.
    ///
    /// A short read means the stream ended early and is reported as
    /// `OutOfFrames` with the byte counts.
    pub fn read_exact_or_short(&mut self, len: usize) -> Result<Vec<u8>, MediaError> {
        let mut buf = Vec::with_capacity(len);
        if let Some(stdout) = self.stdout() {
            stdout.take(len as u64).read_to_end(&mut buf)?;
        }
        if buf.len() < len {
            return Err(MediaError::OutOfFrames {
                expected: len,
                got: buf.len(),
            });
        }
        Ok(buf)
    }

    /// Terminates the tool and returns whatever it wrote.
    pub fn finish(mut self) -> Result<ToolOutput, MediaError> {
        match self.child.take() {
            Some(child) => Ok(terminate(child)?),
            None => Err(MediaError::InvalidRequest(format!(
                "{} already finished",
                self.tool
            ))),
        }
    }
}

impl Drop for ToolProcess {
    fn drop(&mut self) {
        if let Some(child) = self.child.take() {
            if let Err(e) = terminate(child) {
                tracing::warn!("Failed to clean up {}: {}", self.tool, e);
            }
        }
    }
}

fn terminate(mut child: Child) -> std::io::Result<ToolOutput> {
    // Already exited is fine; wait() below reaps either way.
    let _ = child.kill();

    let mut stdout = Vec::new();
    if let Some(mut out) = child.stdout.take() {
        out.read_to_end(&mut stdout)?;
    }
    let mut stderr = Vec::new();
    if let Some(mut err) = child.stderr.take() {
        err.read_to_end(&mut stderr)?;
    }
    let status = child.wait()?;

    Ok(ToolOutput {
        status,
        stdout,
        stderr,
    })
}
