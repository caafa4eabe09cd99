//! The single place in this crate that spawns a child process. Every tool
//! wrapper in `adapter/*` funnels through [`run`]: argv only (never a shell
//! string), a wall-clock deadline, and capped stdout/stderr buffers, mirroring
//! `text-extraction::run_pdftotext_full`'s `Command::new(...).arg(...);
//! timeout(DEADLINE, cmd.output()).await??` shape, generalized to any binary.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};

use crate::error::{AppError, ErrorCode};

pub struct ToolOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub status: std::process::ExitStatus,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// A short, already-redacted tail of stderr suitable for an error message.
    pub fn stderr_tail(&self, max_chars: usize) -> String {
        let text = String::from_utf8_lossy(&self.stderr);
        let tail: String = text.chars().rev().take(max_chars).collect::<Vec<_>>().into_iter().rev().collect();
        tail.trim().to_string()
    }
}

enum DriveOutcome {
    Exited(std::process::ExitStatus),
    Overflow,
}

/// Runs `bin` with `args`, killing it if it outlives `deadline` and failing
/// with [`ErrorCode::ToolOutputOverflow`] as soon as either stream exceeds
/// `max_output_bytes` (the child is killed immediately, not drained to EOF).
/// Temp outputs, if any, are the caller's responsibility to place under a
/// unique scratch subdirectory and clean up.
pub async fn run(bin: &str, args: &[String], deadline: Duration, max_output_bytes: usize) -> Result<ToolOutput, AppError> {
    let mut cmd = Command::new(bin);
    cmd.args(args);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            AppError::new(ErrorCode::ToolUnavailable, format!("{bin} is not installed"))
        } else {
            AppError::internal(format!("failed to spawn {bin}: {e}"))
        }
    })?;

    let mut stdout = child.stdout.take().expect("stdout piped");
    let mut stderr = child.stderr.take().expect("stderr piped");

    match tokio::time::timeout(
        deadline,
        drive(&mut child, &mut stdout, &mut stderr, max_output_bytes),
    )
    .await
    {
        Ok(Ok((DriveOutcome::Exited(status), stdout, stderr))) => Ok(ToolOutput { stdout, stderr, status }),
        Ok(Ok((DriveOutcome::Overflow, _, _))) => {
            kill(&mut child).await;
            Err(AppError::new(
                ErrorCode::ToolOutputOverflow,
                format!("{bin} output exceeded the {max_output_bytes} byte cap"),
            ))
        }
        Ok(Err(e)) => {
            kill(&mut child).await;
            Err(AppError::internal(e.to_string()))
        }
        Err(_) => {
            kill(&mut child).await;
            Err(AppError::new(ErrorCode::ToolTimeout, format!("{bin} exceeded its {deadline:?} deadline")))
        }
    }
}

async fn kill(child: &mut Child) {
    let _ = child.start_kill();
    let _ = child.wait().await;
}

async fn drive(
    child: &mut Child,
    stdout: &mut ChildStdout,
    stderr: &mut ChildStderr,
    cap: usize,
) -> std::io::Result<(DriveOutcome, Vec<u8>, Vec<u8>)> {
    let mut out_buf = Vec::new();
    let mut err_buf = Vec::new();
    let mut out_chunk = [0u8; 8192];
    let mut err_chunk = [0u8; 8192];
    let mut out_done = false;
    let mut err_done = false;

    loop {
        if out_done && err_done {
            let status = child.wait().await?;
            return Ok((DriveOutcome::Exited(status), out_buf, err_buf));
        }
        tokio::select! {
            res = stdout.read(&mut out_chunk), if !out_done => {
                let n = res?;
                if n == 0 {
                    out_done = true;
                } else if out_buf.len() + n > cap {
                    return Ok((DriveOutcome::Overflow, out_buf, err_buf));
                } else {
                    out_buf.extend_from_slice(&out_chunk[..n]);
                }
            }
            res = stderr.read(&mut err_chunk), if !err_done => {
                let n = res?;
                if n == 0 {
                    err_done = true;
                } else if err_buf.len() + n > cap {
                    return Ok((DriveOutcome::Overflow, out_buf, err_buf));
                } else {
                    err_buf.extend_from_slice(&err_chunk[..n]);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_tool_unavailable_for_missing_binary() {
        let err = run("definitely-not-a-real-binary-xyz", &[], Duration::from_secs(1), 4096)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ToolUnavailable);
    }

    #[tokio::test]
    async fn captures_stdout_of_a_successful_run() {
        let out = run("echo", &["hello".to_string()], Duration::from_secs(5), 4096)
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "hello");
    }

    #[tokio::test]
    async fn kills_process_exceeding_deadline() {
        let err = run("sleep", &["5".to_string()], Duration::from_millis(100), 4096)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ToolTimeout);
    }

    #[tokio::test]
    async fn overflowing_output_is_reported_before_the_deadline() {
        // `yes` prints forever; the cap must trip well before the 5s deadline.
        let started = tokio::time::Instant::now();
        let err = run("yes", &[], Duration::from_secs(5), 64).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ToolOutputOverflow);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported_in_status() {
        let out = run("false", &[], Duration::from_secs(5), 4096).await.unwrap();
        assert!(!out.success());
    }
}
