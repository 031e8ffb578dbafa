//! Individual client connection management.
//!
//! Each client connection wraps a WebSocket stream split into a read task,
//! which forwards frames to the gateway's event channel, and a write task,
//! which drains a bounded outbox.

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    WebSocketStream,
    tungstenite::{Error as WsError, Message},
};
use tracing::{debug, error, warn};

/// Event emitted by a connection.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// A frame from the client, as text
    Message { conn_id: String, text: String },
    /// Connection was closed
    Closed { conn_id: String },
}

/// A single WebSocket connection to a client.
pub struct ClientConnection {
    /// Connection ID assigned by the server (e.g., "conn-1")
    pub conn_id: String,
    /// Outbound queue drained by the write task
    outbox: mpsc::Sender<String>,
    /// Handle to the read task
    read_task: Option<JoinHandle<()>>,
    /// Handle to the write task
    write_task: Option<JoinHandle<()>>,
}

impl ClientConnection {
    /// Create a new client connection from a WebSocket stream.
    ///
    /// Spawns the read and write tasks.
    pub fn new(
        conn_id: String,
        ws_stream: WebSocketStream<TcpStream>,
        queue_capacity: usize,
        event_tx: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Self {
        let (write, read) = ws_stream.split();
        let (outbox, outbox_rx) = mpsc::channel(queue_capacity.max(1));

        let read_task = tokio::spawn(Self::read_loop(conn_id.clone(), read, event_tx));
        let write_task = tokio::spawn(Self::write_loop(conn_id.clone(), write, outbox_rx));

        Self {
            conn_id,
            outbox,
            read_task: Some(read_task),
            write_task: Some(write_task),
        }
    }

    /// Read loop that forwards frames to the event channel.
    async fn read_loop(
        conn_id: String,
        mut read: SplitStream<WebSocketStream<TcpStream>>,
        event_tx: mpsc::UnboundedSender<ConnectionEvent>,
    ) {
        loop {
            match read.next().await {
                Some(Ok(msg)) => {
                    let text = match msg {
                        Message::Text(text) => text,
                        Message::Binary(data) => String::from_utf8_lossy(&data).into_owned(),
                        Message::Ping(_) | Message::Pong(_) => continue,
                        Message::Close(_) => {
                            debug!("Received close frame from {}", conn_id);
                            break;
                        }
                        Message::Frame(_) => continue,
                    };

                    debug!("Message from {}: {} bytes", conn_id, text.len());
                    let _ = event_tx.send(ConnectionEvent::Message {
                        conn_id: conn_id.clone(),
                        text,
                    });
                }
                Some(Err(e)) => {
                    match e {
                        WsError::ConnectionClosed | WsError::AlreadyClosed => {
                            debug!("Connection {} closed", conn_id);
                        }
                        _ => {
                            error!("WebSocket error on {}: {}", conn_id, e);
                        }
                    }
                    break;
                }
                None => {
                    debug!("Connection {} stream ended", conn_id);
                    break;
                }
            }
        }

        // Notify that connection is closed
        let _ = event_tx.send(ConnectionEvent::Closed { conn_id });
    }

    /// Write loop that drains the outbox into the socket.
    async fn write_loop(
        conn_id: String,
        mut write: SplitSink<WebSocketStream<TcpStream>, Message>,
        mut outbox_rx: mpsc::Receiver<String>,
    ) {
        while let Some(text) = outbox_rx.recv().await {
            if let Err(e) = write.send(Message::Text(text)).await {
                warn!("Failed to send to {}: {}", conn_id, e);
                break;
            }
        }
        let _ = write.close().await;
    }

    /// Queue a message without waiting.
    ///
    /// Fails when the outbox is full or the write task has stopped.
    pub fn try_send(&self, text: String) -> Result<(), TrySendError<String>> {
        self.outbox.try_send(text)
    }

    /// Close the connection gracefully.
    ///
    /// Dropping the outbox ends the write task, which sends a close frame.
    pub fn close(mut self) {
        if let Some(task) = self.read_task.take() {
            task.abort();
        }
        // Write task keeps running until it has flushed and closed
        self.write_task.take();
    }
}

impl Drop for ClientConnection {
    fn drop(&mut self) {
        if let Some(task) = self.read_task.take() {
            task.abort();
        }
        if let Some(task) = self.write_task.take() {
            task.abort();
        }
    }
}
