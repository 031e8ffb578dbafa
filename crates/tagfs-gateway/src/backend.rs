//! The single shared backend process.
//!
//! One task reads backend stdout through a [`LineBuffer`] and emits each
//! completed line; another drains an unbounded queue into backend stdin. The
//! backend is spawned once and never restarted.

use crate::config::{BackendCommand, GatewayError};
use std::process::Stdio;
use tagfs_core::protocol::{LineBuffer, frame};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const READ_CHUNK: usize = 8 * 1024;

/// Output observed from the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    /// One complete, non-empty output line
    Line(String),
    /// Output ended; carries the exit code when the process status is known
    Exited(Option<i32>),
}

/// Handle to the running backend.
pub struct Backend {
    stdin_tx: mpsc::UnboundedSender<String>,
    events: mpsc::UnboundedReceiver<BackendEvent>,
    read_task: Option<JoinHandle<()>>,
    write_task: Option<JoinHandle<()>>,
}

impl Backend {
    /// Spawn the backend process with piped stdin/stdout.
    ///
    /// Fails fast when the program cannot be started.
    pub fn spawn(command: &BackendCommand) -> Result<Self, GatewayError> {
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| GatewayError::BackendUnavailable {
                program: command.program.clone(),
                source,
            })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let (Some(stdin), Some(stdout)) = (stdin, stdout) else {
            return Err(GatewayError::BackendStdio(command.program.clone()));
        };

        info!("Started backend: {} (pid {:?})", command, child.id());
        Ok(Self::start(stdin, stdout, Some(child)))
    }

    /// Attach to an already-running backend over arbitrary streams.
    pub fn from_io<W, R>(writer: W, reader: R) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
        R: AsyncRead + Unpin + Send + 'static,
    {
        Self::start(writer, reader, None)
    }

    fn start<W, R>(writer: W, reader: R, child: Option<Child>) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (stdin_tx, stdin_rx) = mpsc::unbounded_channel();
        let (event_tx, events) = mpsc::unbounded_channel();

        let write_task = tokio::spawn(Self::write_loop(writer, stdin_rx));
        let read_task = tokio::spawn(Self::read_loop(reader, child, event_tx));

        Self {
            stdin_tx,
            events,
            read_task: Some(read_task),
            write_task: Some(write_task),
        }
    }

    /// Queue one line for backend stdin. The newline terminator is added here.
    pub fn send(&self, line: String) {
        if self.stdin_tx.send(line).is_err() {
            debug!("Backend writer stopped, discarding request");
        }
    }

    /// Wait for the next backend event. Returns `None` once output has ended
    /// and the exit was reported.
    pub async fn recv(&mut self) -> Option<BackendEvent> {
        self.events.recv().await
    }

    /// Read loop that splits stdout into lines.
    async fn read_loop<R>(
        mut reader: R,
        child: Option<Child>,
        event_tx: mpsc::UnboundedSender<BackendEvent>,
    ) where
        R: AsyncRead + Unpin,
    {
        let mut buffer = LineBuffer::new();
        let mut chunk = vec![0u8; READ_CHUNK];

        loop {
            match reader.read(&mut chunk).await {
                Ok(0) => {
                    debug!("Backend stdout closed");
                    break;
                }
                Ok(n) => {
                    for line in buffer.push(&chunk[..n]) {
                        let _ = event_tx.send(BackendEvent::Line(line));
                    }
                }
                Err(e) => {
                    error!("Failed to read backend output: {}", e);
                    break;
                }
            }
        }

        if let Some(line) = buffer.finish() {
            warn!("Backend output ended without a trailing newline");
            let _ = event_tx.send(BackendEvent::Line(line));
        }

        let code = match child {
            Some(mut child) => match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    error!("Failed to collect backend exit status: {}", e);
                    None
                }
            },
            None => None,
        };
        let _ = event_tx.send(BackendEvent::Exited(code));
    }

    /// Write loop that frames queued lines onto stdin.
    ///
    /// The first failure is logged; every later line is dropped silently.
    async fn write_loop<W>(mut writer: W, mut stdin_rx: mpsc::UnboundedReceiver<String>)
    where
        W: AsyncWrite + Unpin,
    {
        let mut broken = false;
        while let Some(line) = stdin_rx.recv().await {
            if broken {
                continue;
            }
            let framed = frame(line.as_bytes());
            let result = match writer.write_all(&framed).await {
                Ok(()) => writer.flush().await,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                error!("Backend stdin closed ({}); further requests are discarded", e);
                broken = true;
            }
        }
    }
}

impl Drop for Backend {
    fn drop(&mut self) {
        if let Some(task) = self.read_task.take() {
            task.abort();
        }
        if let Some(task) = self.write_task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, BufReader, duplex};
    use tokio::time::timeout;

    async fn next(backend: &mut Backend) -> BackendEvent {
        timeout(Duration::from_secs(2), backend.recv())
            .await
            .expect("timed out waiting for backend")
            .expect("backend channel closed")
    }

    #[tokio::test]
    async fn test_lines_are_reassembled() {
        let (mut engine_out, gateway_in) = duplex(64);
        let (gateway_out, _engine_in) = duplex(64);
        let mut backend = Backend::from_io(gateway_out, gateway_in);

        engine_out.write_all(b"{\"a\":1}\n{\"b\"").await.unwrap();
        assert_eq!(next(&mut backend).await, BackendEvent::Line(r#"{"a":1}"#.into()));

        engine_out.write_all(b":2}\n\n").await.unwrap();
        assert_eq!(next(&mut backend).await, BackendEvent::Line(r#"{"b":2}"#.into()));

        drop(engine_out);
        assert_eq!(next(&mut backend).await, BackendEvent::Exited(None));
    }

    #[tokio::test]
    async fn test_send_appends_newline() {
        let (_engine_out, gateway_in) = duplex(64);
        let (gateway_out, engine_in) = duplex(64);
        let backend = Backend::from_io(gateway_out, gateway_in);

        backend.send(r#"{"action":"LIST"}"#.to_string());
        let mut lines = BufReader::new(engine_in).lines();
        let line = timeout(Duration::from_secs(2), lines.next_line())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(line.as_deref(), Some(r#"{"action":"LIST"}"#));
    }

    #[tokio::test]
    async fn test_send_after_reader_gone_does_not_panic() {
        let (_engine_out, gateway_in) = duplex(64);
        let (gateway_out, engine_in) = duplex(64);
        let backend = Backend::from_io(gateway_out, gateway_in);

        drop(engine_in);
        for _ in 0..3 {
            backend.send("{}".to_string());
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_spawn_missing_program_fails_fast() {
        let result = Backend::spawn(&BackendCommand::new("/nonexistent/tagfs-backend"));
        assert!(matches!(result, Err(GatewayError::BackendUnavailable { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawned_exit_is_reported() {
        let mut backend = Backend::spawn(&BackendCommand::new("sh").arg("-c").arg("echo '{}'; exit 3"))
            .unwrap();
        assert_eq!(next(&mut backend).await, BackendEvent::Line("{}".into()));
        assert_eq!(next(&mut backend).await, BackendEvent::Exited(Some(3)));
    }
}
