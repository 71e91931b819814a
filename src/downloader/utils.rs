// Subprocess helpers shared by engine implementations

use std::io;
use std::process::{ExitStatus, Output, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command as TokioCommand};
use tokio::time::timeout;
use tracing::warn;

use super::errors::EngineError;

fn spawn_piped(program: &str, args: &[String]) -> Result<Child, EngineError> {
    TokioCommand::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                EngineError::ToolNotFound(format!("{}: {}", program, e))
            }
            _ => EngineError::Io(e),
        })
}

async fn wait_or_kill(
    child: &mut Child,
    program: &str,
    timeout_secs: u64,
) -> Result<ExitStatus, EngineError> {
    match timeout(Duration::from_secs(timeout_secs), child.wait()).await {
        Ok(status) => Ok(status?),
        Err(_) => {
            warn!(program, timeout_secs, "subprocess timed out, killing");
            let _ = child.kill().await;
            Err(EngineError::Timeout { secs: timeout_secs })
        }
    }
}

fn pipe_missing(name: &str) -> EngineError {
    EngineError::Io(io::Error::new(
        io::ErrorKind::BrokenPipe,
        format!("failed to capture {}", name),
    ))
}

/// Run a command to completion and collect its output, killing it after
/// `timeout_secs`.
pub async fn run_output_with_timeout(
    program: &str,
    args: &[String],
    timeout_secs: u64,
) -> Result<Output, EngineError> {
    let mut child = spawn_piped(program, args)?;

    let mut stdout_pipe = child.stdout.take().ok_or_else(|| pipe_missing("stdout"))?;
    let mut stderr_pipe = child.stderr.take().ok_or_else(|| pipe_missing("stderr"))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe.read_to_end(&mut buf).await?;
        Ok::<Vec<u8>, io::Error>(buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe.read_to_end(&mut buf).await?;
        Ok::<Vec<u8>, io::Error>(buf)
    });

    let status = match wait_or_kill(&mut child, program, timeout_secs).await {
        Ok(status) => status,
        Err(e) => {
            stdout_task.abort();
            stderr_task.abort();
            return Err(e);
        }
    };

    let stdout = join_reader(stdout_task).await?;
    let stderr = join_reader(stderr_task).await?;
    Ok(Output { status, stdout, stderr })
}

/// Output of a line-streamed run.
#[derive(Debug)]
pub struct LineOutput {
    pub status: ExitStatus,
    pub stdout_lines: Vec<String>,
    /// Stderr lines the observer did not consume.
    pub stderr: Vec<u8>,
}

/// Run a command, handing each stderr line to `observe` as it arrives.
///
/// Lines for which `observe` returns true are dropped from the retained
/// stderr; everything else is kept for error reporting.
pub async fn run_lines_with_timeout<F>(
    program: &str,
    args: &[String],
    timeout_secs: u64,
    observe: F,
) -> Result<LineOutput, EngineError>
where
    F: Fn(&str) -> bool + Send + 'static,
{
    let mut child = spawn_piped(program, args)?;

    let stdout_pipe = child.stdout.take().ok_or_else(|| pipe_missing("stdout"))?;
    let stderr_pipe = child.stderr.take().ok_or_else(|| pipe_missing("stderr"))?;

    let stdout_task = tokio::spawn(async move {
        let mut lines = BufReader::new(stdout_pipe).lines();
        let mut collected = Vec::new();
        while let Some(line) = lines.next_line().await? {
            collected.push(line);
        }
        Ok::<Vec<String>, io::Error>(collected)
    });
    let stderr_task = tokio::spawn(async move {
        let mut lines = BufReader::new(stderr_pipe).lines();
        let mut kept = Vec::new();
        while let Some(line) = lines.next_line().await? {
            if !observe(&line) {
                kept.extend_from_slice(line.as_bytes());
                kept.push(b'\n');
            }
        }
        Ok::<Vec<u8>, io::Error>(kept)
    });

    let status = match wait_or_kill(&mut child, program, timeout_secs).await {
        Ok(status) => status,
        Err(e) => {
            stdout_task.abort();
            stderr_task.abort();
            return Err(e);
        }
    };

    let stdout_lines = join_reader(stdout_task).await?;
    let stderr = join_reader(stderr_task).await?;
    Ok(LineOutput {
        status,
        stdout_lines,
        stderr,
    })
}

async fn join_reader<T>(
    task: tokio::task::JoinHandle<Result<T, io::Error>>,
) -> Result<T, EngineError> {
    task.await
        .map_err(|e| EngineError::Io(io::Error::new(io::ErrorKind::Other, e.to_string())))?
        .map_err(EngineError::Io)
}
