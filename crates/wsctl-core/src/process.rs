//! Process runner
//!
//! Three execution modes share one failure contract: captured (collect
//! stdout/stderr in memory), streaming (inherit stdio, used for interactive
//! invocations), and logged (capture while appending to a log file).

use crate::errors::{Result, WsctlError};
use std::collections::HashMap;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Default)]
pub struct CapturedOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CapturedOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

fn build_command(program: &str, args: &[impl AsRef<str>], env: &HashMap<String, String>) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args.iter().map(|a| a.as_ref()));
    for (key, value) in env {
        if value.is_empty() {
            continue;
        }
        cmd.env(key, value);
    }
    cmd.stdin(std::process::Stdio::null());
    cmd
}

/// Run `program` with `args`, capturing stdout/stderr. Fails with
/// `CommandFailure` on non-zero exit unless `ignore_failure` is set.
#[instrument(skip(args, env), fields(program = %program))]
pub async fn run_captured(
    program: &str,
    args: &[impl AsRef<str> + std::fmt::Debug],
    env: &HashMap<String, String>,
    ignore_failure: bool,
) -> Result<CapturedOutput> {
    let mut cmd = build_command(program, args, env);
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());

    let output = cmd.output().await.map_err(|source| WsctlError::Io {
        path: program.to_string(),
        source,
    })?;

    let result = CapturedOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };

    if !result.success() && !ignore_failure {
        return Err(WsctlError::CommandFailure {
            command: format!("{program} {:?}", args),
            code: result.code,
            stdout: result.stdout,
            stderr: result.stderr,
            log_path: None,
        });
    }

    debug!(code = ?result.code, "command completed");
    Ok(result)
}

/// Run `program` with inherited stdio (interactive: `docker exec -it`,
/// `ssh -L`). On failure, stderr was inherited so there is nothing to
/// report beyond the exit code.
#[instrument(skip(args, env), fields(program = %program))]
pub async fn run_streaming(
    program: &str,
    args: &[impl AsRef<str> + std::fmt::Debug],
    env: &HashMap<String, String>,
) -> Result<Option<i32>> {
    let mut cmd = build_command(program, args, env);
    cmd.stdout(std::process::Stdio::inherit());
    cmd.stderr(std::process::Stdio::inherit());

    let status = cmd.status().await.map_err(|source| WsctlError::Io {
        path: program.to_string(),
        source,
    })?;
    Ok(status.code())
}

/// Run `program`, appending combined stdout+stderr to `log_path` as it
/// arrives. On failure, the returned error carries `log_path` so callers
/// can point the user at it.
#[instrument(skip(args, env), fields(program = %program, log_path = %log_path.display()))]
pub async fn run_logged(
    program: &str,
    args: &[impl AsRef<str> + std::fmt::Debug],
    env: &HashMap<String, String>,
    log_path: &Path,
) -> Result<CapturedOutput> {
    if let Some(parent) = log_path.parent() {
        crate::fsutil::ensure_dir(parent)?;
    }
    let mut log_file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .await
        .map_err(|source| WsctlError::Io {
            path: log_path.display().to_string(),
            source,
        })?;

    let mut cmd = build_command(program, args, env);
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());

    let mut child = cmd.spawn().map_err(|source| WsctlError::Io {
        path: program.to_string(),
        source,
    })?;

    let stdout = child.stdout.take().expect("piped stdout");
    let stderr = child.stderr.take().expect("piped stderr");
    let mut stdout_lines = BufReader::new(stdout).lines();
    let mut stderr_lines = BufReader::new(stderr).lines();

    let mut captured_stdout = String::new();
    let mut captured_stderr = String::new();

    loop {
        tokio::select! {
            line = stdout_lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        log_file.write_all(line.as_bytes()).await.ok();
                        log_file.write_all(b"\n").await.ok();
                        captured_stdout.push_str(&line);
                        captured_stdout.push('\n');
                    }
                    Ok(None) => break,
                    Err(_) => break,
                }
            }
            line = stderr_lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        log_file.write_all(line.as_bytes()).await.ok();
                        log_file.write_all(b"\n").await.ok();
                        captured_stderr.push_str(&line);
                        captured_stderr.push('\n');
                    }
                    Ok(None) => {}
                    Err(_) => {}
                }
            }
        }
    }

    let status = child.wait().await.map_err(|source| WsctlError::Io {
        path: program.to_string(),
        source,
    })?;

    let result = CapturedOutput {
        code: status.code(),
        stdout: captured_stdout,
        stderr: captured_stderr,
    };

    if !result.success() {
        return Err(WsctlError::CommandFailure {
            command: format!("{program} {:?}", args),
            code: result.code,
            stdout: result.stdout,
            stderr: result.stderr,
            log_path: Some(log_path.display().to_string()),
        });
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_captured_collects_stdout() {
        let out = run_captured("echo", &["hello"], &HashMap::new(), false)
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "hello");
        assert!(out.success());
    }

    #[tokio::test]
    async fn run_captured_fails_on_nonzero_exit() {
        let err = run_captured("sh", &["-c", "exit 3"], &HashMap::new(), false)
            .await
            .unwrap_err();
        match err {
            WsctlError::CommandFailure { code, .. } => assert_eq!(code, Some(3)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn run_captured_ignores_failure_when_asked() {
        let out = run_captured("sh", &["-c", "exit 3"], &HashMap::new(), true)
            .await
            .unwrap();
        assert_eq!(out.code, Some(3));
    }

    #[tokio::test]
    async fn run_logged_appends_output_to_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let log_path = dir.path().join("init.log");
        run_logged("echo", &["line one"], &HashMap::new(), &log_path)
            .await
            .unwrap();
        let contents = std::fs::read_to_string(&log_path).unwrap();
        assert!(contents.contains("line one"));
    }
}
