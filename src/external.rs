//! External converter invocation
//!
//! Runs a native converter (by default pyulog's `ulog2kml`) as a child
//! process with captured output and a bounded wait.

use crate::error::{ConvertError, Result};
use log::debug;
use std::ffi::OsString;
use std::io::{ErrorKind, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Sender};
use std::thread;
use std::time::{Duration, Instant};

pub const DEFAULT_CONVERTER: &str = "ulog2kml";
/// Interpreter used for `-m pyulog.ulog2kml` when the script is not installed
pub const DEFAULT_PYTHON: &str = "python3";
pub const PYULOG_MODULE: &str = "pyulog.ulog2kml";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Placeholders substituted in converter arguments
pub const INPUT_PLACEHOLDER: &str = "{input}";
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Default `ulog2kml` argument template
pub fn default_converter_args() -> Vec<String> {
    vec![
        INPUT_PLACEHOLDER.to_string(),
        "-o".to_string(),
        OUTPUT_PLACEHOLDER.to_string(),
    ]
}

/// `python -m pyulog.ulog2kml` argument template
pub fn default_module_args() -> Vec<String> {
    let mut args = vec!["-m".to_string(), PYULOG_MODULE.to_string()];
    args.extend(default_converter_args());
    args
}

/// Captured result of a finished converter run
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// Trimmed stderr followed by stdout, for reports
    pub fn diagnostic(&self) -> String {
        [self.stderr.trim(), self.stdout.trim()]
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// An external command that converts `{input}` into `{output}`
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalConverter {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl Default for ExternalConverter {
    fn default() -> Self {
        Self::new(DEFAULT_CONVERTER, default_converter_args())
    }
}

impl ExternalConverter {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn command_args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        self.args
            .iter()
            .map(|arg| match arg.as_str() {
                INPUT_PLACEHOLDER => input.as_os_str().to_owned(),
                OUTPUT_PLACEHOLDER => output.as_os_str().to_owned(),
                other => OsString::from(
                    other
                        .replace(INPUT_PLACEHOLDER, &input.to_string_lossy())
                        .replace(OUTPUT_PLACEHOLDER, &output.to_string_lossy()),
                ),
            })
            .collect()
    }

    /// Run the converter and wait for it, at most `self.timeout`
    ///
    /// A missing executable or an expired timeout is an `ExternalTool`
    /// error; a nonzero exit is reported through [`ToolOutput::status`].
    /// Output still held open by a background process after the converter
    /// exits is abandoned once the timeout runs out.
    pub fn run(&self, input: &Path, output: &Path) -> Result<ToolOutput> {
        let args = self.command_args(input, output);
        debug!("Running {} {:?}", self.program, args);

        let deadline = Instant::now() + self.timeout;
        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => {
                    ConvertError::ExternalTool(format!("'{}' not found", self.program))
                }
                _ => ConvertError::ExternalTool(format!("cannot start '{}': {}", self.program, e)),
            })?;

        let (tx, rx) = mpsc::channel();
        let pipes = drain(child.stdout.take(), Pipe::Stdout, &tx)
            + drain(child.stderr.take(), Pipe::Stderr, &tx);
        drop(tx);

        let status = match wait_with_deadline(&mut child, deadline) {
            Ok(Some(status)) => status,
            Ok(None) => {
                abandon(&mut child);
                return Err(ConvertError::ExternalTool(format!(
                    "'{}' timed out after {:.1}s",
                    self.program,
                    self.timeout.as_secs_f64()
                )));
            }
            Err(e) => {
                abandon(&mut child);
                return Err(e);
            }
        };

        let mut result = ToolOutput {
            status,
            stdout: String::new(),
            stderr: String::new(),
        };
        for _ in 0..pipes {
            let wait = deadline
                .saturating_duration_since(Instant::now())
                .max(POLL_INTERVAL);
            match rx.recv_timeout(wait) {
                Ok((Pipe::Stdout, text)) => result.stdout = text,
                Ok((Pipe::Stderr, text)) => result.stderr = text,
                Err(_) => {
                    debug!(
                        "'{}' exited but its output is still held open, not waiting",
                        self.program
                    );
                    break;
                }
            }
        }
        Ok(result)
    }
}

#[derive(Debug, Clone, Copy)]
enum Pipe {
    Stdout,
    Stderr,
}

fn wait_with_deadline(child: &mut Child, deadline: Instant) -> Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

// Drain threads may outlive this call when a grandchild holds the pipes.
fn abandon(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Read `pipe` to the end on a helper thread; returns the number of threads started
fn drain<R: Read + Send + 'static>(
    pipe: Option<R>,
    which: Pipe,
    tx: &Sender<(Pipe, String)>,
) -> usize {
    let Some(mut pipe) = pipe else {
        return 0;
    };
    let tx = tx.clone();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        let _ = tx.send((which, String::from_utf8_lossy(&buf).into_owned()));
    });
    1
}
