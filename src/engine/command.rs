//! Timed execution of external programs

use super::error::{EngineError, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

const LOG_PREVIEW_CHARS: usize = 200;

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Render a command line for logs and error messages.
pub fn render_command(program: &str, args: &[String]) -> String {
    let mut words = Vec::with_capacity(args.len() + 1);
    words.push(program);
    words.extend(args.iter().map(String::as_str));
    shell_words::join(words)
}

/// Run `program` to completion, killing it if `timeout` elapses first.
///
/// A non-zero exit is not an error here; see [`run_checked`].
pub async fn run_command(program: &str, args: &[String], timeout: Duration) -> Result<CommandOutput> {
    let rendered = render_command(program, args);
    debug!("Running: {}", rendered);

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(source)) => {
            return Err(EngineError::Spawn {
                command: rendered,
                source,
            })
        }
        Err(_) => {
            debug!("Command timed out after {}s", timeout.as_secs());
            return Err(EngineError::Timeout {
                command: rendered,
                timeout_secs: timeout.as_secs(),
            });
        }
    };

    let result = CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        code: output.status.code(),
    };

    debug!("Exit code: {:?}", result.code);
    if !result.stdout.is_empty() {
        debug!("stdout: {}", preview(&result.stdout));
    }
    if !result.stderr.is_empty() {
        debug!("stderr: {}", preview(&result.stderr));
    }

    Ok(result)
}

/// Like [`run_command`] but a non-zero exit becomes [`EngineError::Failed`].
pub async fn run_checked(program: &str, args: &[String], timeout: Duration) -> Result<CommandOutput> {
    let output = run_command(program, args, timeout).await?;
    if output.success() {
        Ok(output)
    } else {
        Err(EngineError::Failed {
            command: render_command(program, args),
            code: output.code.unwrap_or(-1),
            stderr: output.stderr.trim().to_string(),
        })
    }
}

fn preview(text: &str) -> &str {
    match text.char_indices().nth(LOG_PREVIEW_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
