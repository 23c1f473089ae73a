//! Listener stream connection with automatic reconnection

use super::backoff::{Backoff, ReconnectConfig};
use super::state::ConnectionState;
use super::{validate_listener, SessionError};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use whdbg_common::{decode_binary_frame, decode_frame, stream_path, ProtocolError, RequestRecord};

/// Events buffered per connection before the stream task waits
const EVENT_BUFFER: usize = 256;

/// How long a closing connection may take to finish the close handshake
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Something that happened on the current listener stream
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    StateChanged(ConnectionState),
    /// A decoded record, or `None` for a placeholder frame
    Record(Option<RequestRecord>),
    /// A frame, or the one line of a batched frame, that was not a valid record
    DecodeFailed { error: String, frame: String },
}

struct ActiveConnection {
    listener: String,
    events: mpsc::Receiver<ConnectionEvent>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

/// Owns the single stream connection of a session.
///
/// Each connection gets its own event channel. Replacing or stopping a
/// connection drops that channel, so nothing the old stream received can be
/// observed afterwards.
pub struct ConnectionManager {
    ws_base_url: String,
    reconnect: ReconnectConfig,
    state_tx: watch::Sender<ConnectionState>,
    active: Option<ActiveConnection>,
}

impl ConnectionManager {
    pub fn new(ws_base_url: impl Into<String>, reconnect: ReconnectConfig) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Uninstantiated);
        Self {
            ws_base_url: ws_base_url.into(),
            reconnect,
            state_tx,
            active: None,
        }
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Receive every state transition as it is applied
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Listener of the current connection
    #[cfg(test)]
    pub fn listener(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.listener.as_str())
    }

    /// Open the stream for `listener`, replacing any connection to another
    /// listener. Returns `false` if that listener is already being streamed.
    pub async fn start(&mut self, listener: &str) -> Result<bool, SessionError> {
        validate_listener(listener)?;

        if let Some(active) = &self.active {
            if active.listener == listener && !active.task.is_finished() {
                return Ok(false);
            }
        }

        self.stop().await;

        let url = format!(
            "{}{}",
            self.ws_base_url.trim_end_matches('/'),
            stream_path(listener)
        );
        tracing::info!("Opening listener stream {}", url);

        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run_connection(
            url,
            self.reconnect.clone(),
            events_tx,
            shutdown_rx,
        ));

        self.active = Some(ActiveConnection {
            listener: listener.to_string(),
            events: events_rx,
            shutdown: Some(shutdown_tx),
            task,
        });

        Ok(true)
    }

    /// Close the current connection, if any
    pub async fn stop(&mut self) {
        let Some(ActiveConnection {
            listener,
            mut events,
            shutdown,
            mut task,
        }) = self.active.take()
        else {
            return;
        };

        tracing::debug!("Closing listener stream for {}", listener);
        if !task.is_finished() {
            self.state_tx.send_replace(ConnectionState::Closing);
        }

        if let Some(shutdown) = shutdown {
            let _ = shutdown.send(());
        }

        // Keep receiving so a task blocked on a full channel can see the shutdown
        let finished = tokio::time::timeout(CLOSE_GRACE * 2, async {
            while events.recv().await.is_some() {}
            let _ = (&mut task).await;
        })
        .await;

        if finished.is_err() {
            tracing::debug!("Stream task did not finish in time, aborting");
            task.abort();
        }

        self.state_tx.send_replace(ConnectionState::Closed);
    }

    /// Wait for the next event of the current connection.
    ///
    /// Pends forever while no connection is active. Cancel safe.
    pub async fn next_event(&mut self) -> ConnectionEvent {
        let Some(active) = self.active.as_mut() else {
            return std::future::pending().await;
        };

        let received = active.events.recv().await;
        let event = match received {
            Some(event) => event,
            None => {
                // Stream task gave up
                self.active = None;
                ConnectionEvent::StateChanged(ConnectionState::Closed)
            }
        };

        if let ConnectionEvent::StateChanged(state) = &event {
            self.state_tx.send_replace(*state);
        }

        event
    }
}

/// Why a connected stream stopped
enum StreamEnd {
    /// Closed on request
    Shutdown,
    /// Dropped by the server or the network
    Lost,
    /// Nobody is listening for events anymore
    Abandoned,
}

async fn run_connection(
    url: String,
    reconnect: ReconnectConfig,
    events: mpsc::Sender<ConnectionEvent>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut backoff = Backoff::new(reconnect);

    loop {
        if !emit(&events, ConnectionEvent::StateChanged(ConnectionState::Connecting)).await {
            return;
        }

        let connected = tokio::select! {
            result = connect_async(url.as_str()) => result,
            _ = &mut shutdown => {
                let _ = emit(&events, ConnectionEvent::StateChanged(ConnectionState::Closed)).await;
                return;
            }
        };

        match connected {
            Ok((ws_stream, _)) => {
                backoff.reset();
                tracing::debug!("Listener stream open: {}", url);
                if !emit(&events, ConnectionEvent::StateChanged(ConnectionState::Open)).await {
                    return;
                }

                match pump(ws_stream, &events, &mut shutdown).await {
                    StreamEnd::Shutdown | StreamEnd::Abandoned => return,
                    StreamEnd::Lost => {
                        tracing::warn!(
                            "Listener stream closed unexpectedly: {}, reconnecting in {:?}",
                            url,
                            backoff.current()
                        );
                        if !emit(&events, ConnectionEvent::StateChanged(ConnectionState::Closed)).await {
                            return;
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to connect to {} (attempt {}): {}",
                    url,
                    backoff.attempt() + 1,
                    e
                );
                if !emit(&events, ConnectionEvent::StateChanged(ConnectionState::Closed)).await {
                    return;
                }
            }
        }

        let waited = tokio::select! {
            result = backoff.wait() => result,
            _ = &mut shutdown => return,
        };

        if let Err(e) = waited {
            tracing::warn!("{}", e);
            return;
        }
    }
}

/// Forward frames from an open stream until it ends
async fn pump(
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    events: &mpsc::Sender<ConnectionEvent>,
    shutdown: &mut oneshot::Receiver<()>,
) -> StreamEnd {
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            _ = &mut *shutdown => {
                if !emit(events, ConnectionEvent::StateChanged(ConnectionState::Closing)).await {
                    return StreamEnd::Abandoned;
                }
                let _ = write.send(Message::Close(None)).await;
                // Wait for the server to finish the close handshake
                let _ = tokio::time::timeout(CLOSE_GRACE, async {
                    while let Some(Ok(_)) = read.next().await {}
                })
                .await;
                let _ = emit(events, ConnectionEvent::StateChanged(ConnectionState::Closed)).await;
                return StreamEnd::Shutdown;
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if !forward(decode_frame(text.as_str()), text.as_str(), events).await {
                            return StreamEnd::Abandoned;
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        let frame = String::from_utf8_lossy(&data).into_owned();
                        if !forward(decode_binary_frame(&data), &frame, events).await {
                            return StreamEnd::Abandoned;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::debug!("Server closed listener stream: {:?}", frame);
                        return StreamEnd::Lost;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!("WebSocket error: {}", e);
                        return StreamEnd::Lost;
                    }
                    None => return StreamEnd::Lost,
                }
            }
        }
    }
}

async fn forward(
    results: Vec<Result<Option<RequestRecord>, ProtocolError>>,
    frame: &str,
    events: &mpsc::Sender<ConnectionEvent>,
) -> bool {
    for result in results {
        let event = match result {
            Ok(record) => ConnectionEvent::Record(record),
            Err(e) => {
                tracing::warn!("Dropping undecodable frame: {}", e);
                ConnectionEvent::DecodeFailed {
                    error: e.to_string(),
                    frame: e.line().unwrap_or(frame).to_string(),
                }
            }
        };
        if !emit(events, event).await {
            return false;
        }
    }
    true
}

/// Returns false once the receiving side is gone
async fn emit(events: &mpsc::Sender<ConnectionEvent>, event: ConnectionEvent) -> bool {
    events.send(event).await.is_ok()
}
