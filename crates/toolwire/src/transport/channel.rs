//! Line-oriented duplex channel to a peer: a subordinate process or any stream pair.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::types::{JsonRpcMessage, McpError, McpResult};

use super::framing;

type BoxedReader = Box<dyn tokio::io::AsyncBufRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// How to launch a server process.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
}

impl ServerCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Split a whitespace-separated command line. No shell quoting is applied.
    pub fn parse(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace();
        let program = parts.next()?;
        Some(Self::new(program).args(parts))
    }

    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// An open channel, before it is split between the reader task and callers.
pub struct Channel {
    reader: FrameReader,
    writer: FrameWriter,
    process: Option<PeerProcess>,
}

impl Channel {
    /// Launch the peer with piped stdio and wire its streams.
    ///
    /// The peer's stderr is drained on a background task into `tracing`
    /// (target `toolwire::peer`) and never parsed.
    pub fn spawn(command: &ServerCommand) -> McpResult<Self> {
        let command_line = command.display();
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &command.cwd {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            tracing::error!(command = %command_line, error = %e, "Failed to spawn peer");
            McpError::SpawnFailure {
                command: command_line.clone(),
                reason: e.to_string(),
            }
        })?;

        let missing = |stream: &str| McpError::SpawnFailure {
            command: command_line.clone(),
            reason: format!("peer {stream} was not piped"),
        };
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;

        let pid = child.id();
        tracing::info!(command = %command_line, pid = ?pid, "Peer process started");

        let peer_name = command_line.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut count = 0usize;
            while let Ok(Some(line)) = lines.next_line().await {
                count += 1;
                tracing::info!(target: "toolwire::peer", peer = %peer_name, "{line}");
            }
            tracing::debug!(peer = %peer_name, lines = count, "Peer stderr closed");
        });

        let writer = FrameWriter::new(Box::new(stdin));
        let process = PeerProcess {
            child: Mutex::new(Some(child)),
            pid,
            command: command_line,
            writer: writer.clone(),
        };

        Ok(Self {
            reader: FrameReader::new(Box::new(BufReader::new(stdout))),
            writer,
            process: Some(process),
        })
    }

    /// Wrap an existing stream pair. There is no process to manage.
    pub fn from_streams<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            reader: FrameReader::new(Box::new(BufReader::new(reader))),
            writer: FrameWriter::new(Box::new(writer)),
            process: None,
        }
    }

    /// This process's own stdin/stdout, for the server role.
    pub fn stdio() -> Self {
        Self::from_streams(tokio::io::stdin(), tokio::io::stdout())
    }

    /// Fail `receive_line` with `ReadTimeout` when no frame arrives within `timeout`.
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.reader.read_timeout = timeout;
        self
    }

    pub fn split(self) -> (FrameReader, FrameWriter, Option<PeerProcess>) {
        (self.reader, self.writer, self.process)
    }
}

/// Write half. Cloneable; frames from concurrent senders never interleave.
#[derive(Clone)]
pub struct FrameWriter {
    inner: Arc<Mutex<Option<BoxedWriter>>>,
}

impl FrameWriter {
    fn new(writer: BoxedWriter) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(writer))),
        }
    }

    /// Write one frame followed by the newline delimiter and flush.
    pub async fn send_line(&self, frame: &str) -> McpResult<()> {
        if frame.contains('\n') {
            return Err(McpError::MalformedMessage(
                "Frame contains an embedded newline".to_string(),
            ));
        }

        let mut guard = self.inner.lock().await;
        let writer = guard.as_mut().ok_or(McpError::ChannelClosed)?;

        let result = async {
            writer.write_all(frame.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        }
        .await;

        if let Err(e) = result {
            tracing::debug!(error = %e, "Write to peer failed, closing channel");
            *guard = None;
            return Err(McpError::ChannelClosed);
        }
        Ok(())
    }

    pub async fn send(&self, message: &JsonRpcMessage) -> McpResult<()> {
        let frame = framing::encode(message)?;
        self.send_line(&frame).await
    }

    /// Shut the stream down. Later sends fail with `ChannelClosed`.
    pub async fn close(&self) {
        let mut guard = self.inner.lock().await;
        if let Some(mut writer) = guard.take() {
            if let Err(e) = writer.shutdown().await {
                tracing::debug!(error = %e, "Error shutting down peer input");
            }
        }
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.lock().await.is_none()
    }
}

/// Read half, owned by exactly one reader task.
pub struct FrameReader {
    inner: BoxedReader,
    read_timeout: Option<Duration>,
    buf: Vec<u8>,
    eof: bool,
}

impl FrameReader {
    fn new(inner: BoxedReader) -> Self {
        Self {
            inner,
            read_timeout: None,
            buf: Vec::new(),
            eof: false,
        }
    }

    /// Wait for the next complete non-blank frame, without its delimiter.
    ///
    /// Bytes of a line that was interrupted by a read timeout are kept and the
    /// next call continues the same line.
    pub async fn receive_line(&mut self) -> McpResult<String> {
        loop {
            if self.eof {
                return Err(McpError::ChannelClosed);
            }

            let read = self.inner.read_until(b'\n', &mut self.buf);
            let n = match self.read_timeout {
                Some(limit) => tokio::time::timeout(limit, read)
                    .await
                    .map_err(|_| McpError::ReadTimeout(limit))?,
                None => read.await,
            };

            let n = match n {
                Ok(n) => n,
                Err(e) => {
                    tracing::debug!(error = %e, "Read from peer failed");
                    self.eof = true;
                    return Err(McpError::ChannelClosed);
                }
            };

            if n == 0 {
                self.eof = true;
                if self.buf.is_empty() {
                    return Err(McpError::ChannelClosed);
                }
            } else if self.buf.last() != Some(&b'\n') {
                continue;
            }

            let line = String::from_utf8_lossy(&self.buf).trim().to_string();
            self.buf.clear();
            if line.is_empty() {
                continue;
            }
            return Ok(line);
        }
    }

    pub async fn receive(&mut self) -> McpResult<JsonRpcMessage> {
        let line = self.receive_line().await?;
        framing::decode(&line)
    }
}

/// Handle on a spawned peer process.
pub struct PeerProcess {
    child: Mutex<Option<Child>>,
    pid: Option<u32>,
    command: String,
    writer: FrameWriter,
}

impl PeerProcess {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Terminate the peer: close its stdin, give it `grace` to exit, then kill it.
    ///
    /// Idempotent; the second and later calls return immediately.
    pub async fn close(&self, grace: Duration) {
        self.writer.close().await;

        let mut guard = self.child.lock().await;
        let Some(mut child) = guard.take() else {
            return;
        };

        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::info!(peer = %self.command, status = %status, "Peer exited");
            }
            Ok(Err(e)) => {
                tracing::warn!(peer = %self.command, error = %e, "Failed to wait for peer");
            }
            Err(_) => {
                tracing::warn!(
                    peer = %self.command,
                    grace_ms = grace.as_millis() as u64,
                    "Peer did not exit after stdin closed, killing"
                );
                if let Err(e) = child.kill().await {
                    tracing::warn!(peer = %self.command, error = %e, "Failed to kill peer");
                }
            }
        }
    }

    /// Whether the process has already exited (or was closed).
    pub async fn has_exited(&self) -> bool {
        let mut guard = self.child.lock().await;
        match guard.as_mut() {
            Some(child) => !matches!(child.try_wait(), Ok(None)),
            None => true,
        }
    }
}
