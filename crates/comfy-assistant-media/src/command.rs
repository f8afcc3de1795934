//! Subprocess execution with streamed output.

use crate::MediaError;
use log::{debug, warn};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

/// A program invocation with an optional time budget.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Program path or name resolved through PATH.
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Kill the process once this elapses.
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: None,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Exit status and captured output of a finished process.
#[derive(Debug, Clone, Default)]
pub struct CommandResult {
    pub status_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    /// Whether the process exited with status 0.
    pub fn success(&self) -> bool {
        self.status_code == Some(0)
    }
}

/// Receives output line by line while a process runs.
///
/// A line keeps its terminator. Both `\n` and `\r` end a line, since FFmpeg
/// redraws its status line with a bare carriage return. The last line may
/// have no terminator.
pub trait CommandOutputSink: Send {
    fn stdout_line(&mut self, line: &str);
    fn stderr_line(&mut self, line: &str);
}

impl CommandOutputSink for () {
    fn stdout_line(&mut self, _line: &str) {}
    fn stderr_line(&mut self, _line: &str) {}
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Run a command, feeding its output to `sink` and capturing both streams.
pub async fn run_command(
    spec: CommandSpec,
    sink: &mut dyn CommandOutputSink,
) -> Result<CommandResult, MediaError> {
    debug!(
        "running process (program={}, args_len={})",
        spec.program.display(),
        spec.args.len()
    );
    let mut child = Command::new(&spec.program)
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let (lines_tx, mut lines) = mpsc::unbounded_channel();
    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(tokio::spawn(forward_lines(stdout, Stream::Stdout, lines_tx.clone())));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(forward_lines(stderr, Stream::Stderr, lines_tx)));
    }

    let run = async {
        let mut result = CommandResult::default();
        while let Some((stream, line)) = lines.recv().await {
            match stream {
                Stream::Stdout => {
                    sink.stdout_line(&line);
                    result.stdout.push_str(&line);
                }
                Stream::Stderr => {
                    sink.stderr_line(&line);
                    result.stderr.push_str(&line);
                }
            }
        }
        for reader in readers {
            reader.await.map_err(std::io::Error::other)??;
        }
        result.status_code = child.wait().await?.code();
        Ok::<_, MediaError>(result)
    };

    let Some(limit) = spec.timeout else {
        return run.await;
    };
    let outcome = tokio::time::timeout(limit, run).await;
    match outcome {
        Ok(result) => result,
        Err(_) => {
            warn!(
                "process timed out (program={}, timeout_secs={})",
                spec.program.display(),
                limit.as_secs()
            );
            let _ = child.start_kill();
            Err(MediaError::Timeout(limit.as_secs()))
        }
    }
}

/// Read `reader` to the end, sending each `\n`- or `\r`-terminated line.
async fn forward_lines<R>(
    reader: R,
    stream: Stream,
    lines: mpsc::UnboundedSender<(Stream, String)>,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        let buffered = reader.fill_buf().await?;
        if buffered.is_empty() {
            break;
        }
        let end = buffered
            .iter()
            .position(|&byte| byte == b'\n' || byte == b'\r');
        let taken = end.map_or(buffered.len(), |pos| pos + 1);
        line.extend_from_slice(&buffered[..taken]);
        reader.consume(taken);
        if end.is_some() {
            send_line(&lines, stream, &mut line);
        }
    }
    if !line.is_empty() {
        send_line(&lines, stream, &mut line);
    }
    Ok(())
}

fn send_line(lines: &mpsc::UnboundedSender<(Stream, String)>, stream: Stream, line: &mut Vec<u8>) {
    let text = String::from_utf8_lossy(line).into_owned();
    line.clear();
    let _ = lines.send((stream, text));
}
