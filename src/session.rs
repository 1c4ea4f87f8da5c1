/// Single crawl session lifecycle: spawn the crawler, pump stdout and stderr
/// into a shared tee sink, wait for exit, and hand back the captured text.
use crate::config::CrawlerConfig;
use crate::console;
use crate::signals::{self, Interrupts};
use crate::tee::TeeSink;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::{AbortHandle, JoinHandle};

/// Returned in place of captured output when the crawler could not be run.
pub const RUN_ERROR: &str = "Error running Scrapy spider!";

/// Result of a completed session.
#[derive(Debug)]
pub struct SessionResult {
    /// Process exit code (None if killed by signal).
    pub exit_code: Option<i32>,
    /// Lines forwarded to the sink from both streams (0 if abandoned).
    pub lines: u64,
    /// The drain was given up after repeated interrupts.
    pub abandoned: bool,
    /// Wall-clock duration of the session.
    pub duration: Duration,
    /// Child PID, which is also its process group id.
    pub pid: u32,
}

/// Errors that can occur during session execution.
#[derive(Debug)]
pub enum SessionError {
    /// Failed to spawn the crawler subprocess.
    Spawn {
        command: String,
        source: std::io::Error,
    },
    /// The child came up without one of its piped streams.
    MissingPipe { stream: &'static str },
    /// Failed while waiting on the child.
    Io { source: std::io::Error },
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Spawn { command, source } => {
                write!(f, "failed to spawn crawler `{}`: {}", command, source)
            }
            SessionError::MissingPipe { stream } => {
                write!(f, "crawler {} was not piped", stream)
            }
            SessionError::Io { source } => {
                write!(f, "I/O error during session: {}", source)
            }
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Spawn { source, .. } => Some(source),
            SessionError::MissingPipe { .. } => None,
            SessionError::Io { source } => Some(source),
        }
    }
}

/// Build the command arguments: `{job}` placeholders replaced, passthrough
/// arguments appended verbatim.
fn build_args(crawler: &CrawlerConfig, job: &str, extra: &[String]) -> Vec<String> {
    crawler
        .args
        .iter()
        .map(|arg| arg.replace("{job}", job))
        .chain(extra.iter().cloned())
        .collect()
}

/// Run the crawler and return its combined output, or [`RUN_ERROR`] if it
/// could not be run. Never fails.
pub async fn capture_output(
    crawler: &CrawlerConfig,
    job: &str,
    extra: &[String],
    interrupts: &mut Interrupts,
) -> String {
    let sink = Arc::new(TeeSink::stdout());
    match run_session(crawler, job, extra, Arc::clone(&sink), interrupts).await {
        Ok(result) => {
            tracing::info!(
                pid = result.pid,
                exit_code = ?result.exit_code,
                lines = result.lines,
                abandoned = result.abandoned,
                duration_secs = result.duration.as_secs(),
                "crawler session completed"
            );
            sink.close()
        }
        Err(e) => {
            tracing::error!(error = %e, "crawler session failed");
            console::print_error(&e.to_string());
            sink.close();
            RUN_ERROR.to_string()
        }
    }
}

/// Spawn the crawler, forward both of its streams into `sink` line by line,
/// and return once the child has exited and both streams are drained.
///
/// The subprocess gets its own process group so Ctrl-C can be forwarded to
/// the crawler and its helpers together. While draining, a first interrupt is
/// forwarded to the group and a second one stops the drain.
pub async fn run_session(
    crawler: &CrawlerConfig,
    job: &str,
    extra: &[String],
    sink: Arc<TeeSink>,
    interrupts: &mut Interrupts,
) -> Result<SessionResult, SessionError> {
    let args = build_args(crawler, job, extra);
    tracing::info!(command = %crawler.command, args = ?args, "spawning crawler");

    let start = Instant::now();

    let mut child = Command::new(&crawler.command)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .spawn()
        .map_err(|e| SessionError::Spawn {
            command: crawler.command.clone(),
            source: e,
        })?;

    let pid = child.id().unwrap_or(0);
    tracing::info!(pid, "crawler subprocess started");

    let stdout = child
        .stdout
        .take()
        .ok_or(SessionError::MissingPipe { stream: "stdout" })?;
    let stderr = child
        .stderr
        .take()
        .ok_or(SessionError::MissingPipe { stream: "stderr" })?;
    let pumps = vec![
        spawn_pump("stdout", stdout, Arc::clone(&sink)),
        spawn_pump("stderr", stderr, Arc::clone(&sink)),
    ];

    let status = wait_forwarding_interrupts(&mut child, pid, interrupts).await?;

    if signals::group_alive(pid) {
        let message = format!(
            "Process group {pid} is still running although the crawler exited, sending it SIGINT"
        );
        tracing::warn!(pid, "crawler left processes behind, interrupting group");
        println!("{}", console::red(&message));
        if let Err(e) = signals::interrupt_group(pid) {
            tracing::warn!(pid, error = %e, "failed to interrupt process group");
        }
    }

    let (lines, abandoned) = drain_pumps(pumps, pid, interrupts).await;

    Ok(SessionResult {
        exit_code: status.code(),
        lines,
        abandoned,
        duration: start.elapsed(),
        pid,
    })
}

/// Wait for the child; Ctrl-C on our side is passed on to its process group
/// instead of abandoning it.
async fn wait_forwarding_interrupts(
    child: &mut Child,
    pid: u32,
    interrupts: &mut Interrupts,
) -> Result<ExitStatus, SessionError> {
    loop {
        tokio::select! {
            status = child.wait() => {
                return status.map_err(|e| SessionError::Io { source: e });
            }
            Some(()) = interrupts.recv() => {
                tracing::info!(pid, "interrupt received, forwarding SIGINT to crawler");
                if let Err(e) = signals::interrupt_group(pid) {
                    tracing::warn!(pid, error = %e, "failed to forward SIGINT");
                }
            }
        }
    }
}

/// Join both pumps. Returns the line count and whether the drain was cut
/// short by a second interrupt.
async fn drain_pumps(
    pumps: Vec<JoinHandle<u64>>,
    pid: u32,
    interrupts: &mut Interrupts,
) -> (u64, bool) {
    let aborts: Vec<AbortHandle> = pumps.iter().map(JoinHandle::abort_handle).collect();
    let drain = async move {
        let mut lines = 0;
        for pump in pumps {
            lines += join_pump(pump).await;
        }
        lines
    };
    tokio::pin!(drain);

    let mut presses = 0;
    loop {
        tokio::select! {
            lines = &mut drain => return (lines, false),
            Some(()) = interrupts.recv() => {
                presses += 1;
                if presses == 1 {
                    tracing::warn!(pid, "interrupt received while draining output");
                    if let Err(e) = signals::interrupt_group(pid) {
                        tracing::warn!(pid, error = %e, "failed to forward SIGINT");
                    }
                    continue;
                }
                tracing::warn!(pid, "second interrupt, abandoning remaining output");
                console::print_warning("Interrupted again, keeping the output captured so far");
                for abort in &aborts {
                    abort.abort();
                }
                return (0, true);
            }
        }
    }
}

/// Read `stream` one line at a time (newline kept) and forward each line.
fn spawn_pump<R>(label: &'static str, stream: R, sink: Arc<TeeSink>) -> JoinHandle<u64>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut line = Vec::new();
        let mut count = 0;
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    sink.append(&String::from_utf8_lossy(&line));
                    count += 1;
                }
                Err(e) => {
                    tracing::warn!(stream = label, error = %e, "failed to read crawler output");
                    break;
                }
            }
        }
        tracing::debug!(stream = label, lines = count, "stream drained");
        count
    })
}

async fn join_pump(pump: JoinHandle<u64>) -> u64 {
    match pump.await {
        Ok(count) => count,
        Err(e) => {
            tracing::warn!(error = %e, "output pump did not finish cleanly");
            0
        }
    }
}
