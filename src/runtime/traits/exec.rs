// ABOUTME: Command execution request and result types.
// ABOUTME: Shared by both backends and the facade.

use std::time::Duration;

/// A command to run inside a running workload.
#[derive(Debug, Clone, Default)]
pub struct ExecRequest {
    pub command: Vec<String>,
    pub tty: bool,
    pub working_dir: Option<String>,
    pub stdin: Option<Vec<u8>>,
    /// `None` waits for the command indefinitely.
    pub timeout: Option<Duration>,
}

impl ExecRequest {
    pub fn new<I, S>(executable: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut command = vec![executable.into()];
        command.extend(args.into_iter().map(Into::into));
        Self {
            command,
            ..Default::default()
        }
    }

    /// Run `script` through `sh -c`.
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new("sh", ["-c".to_string(), script.into()])
    }

    pub fn tty(mut self, tty: bool) -> Self {
        self.tty = tty;
        self
    }

    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn executable(&self) -> &str {
        self.command.first().map(String::as_str).unwrap_or_default()
    }
}

/// Result of a finished command.
///
/// The local engine delivers stdout and stderr as one stream, so there
/// `stderr` is `None` and `stdout` holds both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i64,
    pub stdout: Vec<u8>,
    pub stderr: Option<Vec<u8>>,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> Option<String> {
        self.stderr
            .as_ref()
            .map(|e| String::from_utf8_lossy(e).into_owned())
    }
}
