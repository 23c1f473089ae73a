//! Live listener session: stream, log and override kept together
//!
//! A [`Session`] owns the stream connection, the message log and the override
//! sync. Connection events and push outcomes are applied one at a time by
//! [`Session::step`], so the log and the override are only ever touched from
//! the task driving the session.

mod backoff;
mod connection;
mod log;
mod state;
mod sync;

pub use backoff::ReconnectConfig;
pub use connection::{ConnectionEvent, ConnectionManager};
pub use log::{LogEntry, MessageLog};
pub use state::ConnectionState;
pub use sync::{PushOutcome, ResponseConfigSync};

use crate::config::listener_url;
use std::time::Duration;
use thiserror::Error;
use whdbg_common::ResponseOverride;

/// Longest listener name usable as a subdomain label
const MAX_LISTENER_LEN: usize = 63;

/// Session errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid listener name '{0}': use letters, digits and '-' (at most 63 characters)")]
    InvalidListener(String),

    #[error("Unknown status code {0}")]
    InvalidStatusCode(u16),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Check that a listener name can be used in the stream path and as a subdomain
pub fn validate_listener(listener: &str) -> Result<(), SessionError> {
    let valid = !listener.is_empty()
        && listener.len() <= MAX_LISTENER_LEN
        && !listener.starts_with('-')
        && !listener.ends_with('-')
        && listener
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-');

    if valid {
        Ok(())
    } else {
        Err(SessionError::InvalidListener(listener.to_string()))
    }
}

/// Everything needed to open a session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub listener: String,
    /// HTTP(S) base of the backend, used for override pushes
    pub server_url: String,
    /// WS(S) base of the backend
    pub websocket_url: String,
    pub initial_override: ResponseOverride,
    pub push_timeout: Duration,
    pub reconnect: ReconnectConfig,
}

/// What a call to [`Session::step`] changed
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    State(ConnectionState),
    /// A record was appended at this log index
    Appended(usize),
    Placeholder,
    DecodeFailed(String),
    PushSucceeded,
    PushFailed(String),
}

/// Read-only snapshot for rendering
#[derive(Debug)]
pub struct SessionView<'a> {
    pub listener: &'a str,
    pub listener_url: String,
    pub state: ConnectionState,
    /// Newest first, placeholders removed
    pub entries: Vec<LogEntry<'a>>,
    pub unread: usize,
    pub response: &'a ResponseOverride,
    pub pending: bool,
    /// Pushes sent but not yet answered
    pub pushing: bool,
    pub last_error: Option<&'a str>,
    pub decode_errors: usize,
}

pub struct Session {
    listener: String,
    server_url: String,
    push_timeout: Duration,
    connection: ConnectionManager,
    log: MessageLog,
    sync: ResponseConfigSync,
    decode_errors: usize,
}

impl Session {
    /// Create the session and open the stream
    pub async fn start(options: SessionOptions) -> Result<Self, SessionError> {
        validate_listener(&options.listener)?;

        let mut connection = ConnectionManager::new(options.websocket_url, options.reconnect);
        let sync = ResponseConfigSync::new(
            &options.server_url,
            &options.listener,
            options.initial_override,
            connection.subscribe_state(),
            options.push_timeout,
        )?;
        tracing::debug!("Override pushes go to {}", sync.update_url());

        connection.start(&options.listener).await?;

        Ok(Self {
            listener: options.listener,
            server_url: options.server_url,
            push_timeout: options.push_timeout,
            connection,
            log: MessageLog::new(),
            sync,
            decode_errors: 0,
        })
    }

    #[cfg(test)]
    pub fn listener(&self) -> &str {
        &self.listener
    }

    #[cfg(test)]
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    pub fn response(&self) -> &ResponseOverride {
        self.sync.current()
    }

    /// Wait for the next stream event or push outcome and apply it
    pub async fn step(&mut self) -> SessionUpdate {
        tokio::select! {
            event = self.connection.next_event() => self.apply_connection_event(event),
            outcome = self.sync.next_outcome() => self.apply_push_outcome(outcome),
        }
    }

    fn apply_connection_event(&mut self, event: ConnectionEvent) -> SessionUpdate {
        match event {
            ConnectionEvent::StateChanged(state) => {
                if state.is_open() && self.sync.on_connection_open() {
                    tracing::debug!("Pushing pending override for {}", self.listener);
                }
                SessionUpdate::State(state)
            }
            ConnectionEvent::Record(record) => match self.log.append(record) {
                Some(index) => SessionUpdate::Appended(index),
                None => SessionUpdate::Placeholder,
            },
            ConnectionEvent::DecodeFailed { error, frame } => {
                self.decode_errors += 1;
                tracing::debug!("Undecodable frame: {}", frame);
                SessionUpdate::DecodeFailed(error)
            }
        }
    }

    fn apply_push_outcome(&mut self, outcome: PushOutcome) -> SessionUpdate {
        match self.sync.apply_outcome(outcome) {
            Ok(_) => SessionUpdate::PushSucceeded,
            Err(e) => SessionUpdate::PushFailed(e.to_string()),
        }
    }

    /// Select the status code future requests are answered with
    pub fn set_status_code(&mut self, code: u16) -> Result<bool, SessionError> {
        self.sync.set_status_code(code)
    }

    /// Set the body future requests are answered with (empty reflects)
    pub fn set_body(&mut self, body: impl Into<String>) -> bool {
        self.sync.set_body(body)
    }

    /// Expand or collapse a record, marking it read
    pub fn toggle_read(&mut self, index: usize) -> Option<bool> {
        self.log.toggle_read(index)
    }

    /// Move the session to another listener.
    ///
    /// The old stream is closed first; the new listener starts with an empty
    /// log and the default override.
    pub async fn switch_listener(&mut self, listener: &str) -> Result<bool, SessionError> {
        validate_listener(listener)?;

        if listener == self.listener {
            return self.connection.start(listener).await;
        }

        tracing::info!("Switching listener {} -> {}", self.listener, listener);
        self.connection.stop().await;

        self.sync = ResponseConfigSync::new(
            &self.server_url,
            listener,
            ResponseOverride::default(),
            self.connection.subscribe_state(),
            self.push_timeout,
        )?;
        self.log = MessageLog::new();
        self.decode_errors = 0;
        self.listener = listener.to_string();

        self.connection.start(listener).await
    }

    /// Close the stream
    pub async fn shutdown(&mut self) {
        self.connection.stop().await;
    }

    pub fn view(&self) -> SessionView<'_> {
        SessionView {
            listener: &self.listener,
            listener_url: listener_url(&self.server_url, &self.listener),
            state: self.connection.state(),
            entries: self.log.newest_first().collect(),
            unread: self.log.unread(),
            response: self.sync.current(),
            pending: self.sync.is_pending(),
            pushing: self.sync.in_flight() > 0,
            last_error: self.sync.last_error(),
            decode_errors: self.decode_errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{record_json, FakeBackend};
    use serde_json::json;

    fn options(backend: &FakeBackend, listener: &str) -> SessionOptions {
        SessionOptions {
            listener: listener.to_string(),
            server_url: backend.http_url(),
            websocket_url: backend.ws_url(),
            initial_override: ResponseOverride::default(),
            push_timeout: Duration::from_secs(5),
            reconnect: ReconnectConfig {
                initial_backoff: Duration::from_millis(10),
                max_backoff: Duration::from_millis(50),
                multiplier: 2.0,
                jitter: 0.0,
                max_attempts: None,
            },
        }
    }

    async fn step_until(session: &mut Session, wanted: SessionUpdate) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while session.step().await != wanted {}
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {:?}", wanted));
    }

    async fn appended(session: &mut Session) -> usize {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let SessionUpdate::Appended(index) = session.step().await {
                    return index;
                }
            }
        })
        .await
        .expect("timed out waiting for a record")
    }

    fn timestamps(session: &Session) -> Vec<String> {
        session
            .view()
            .entries
            .iter()
            .map(|e| e.record.timestamp.clone())
            .collect()
    }

    #[test]
    fn test_validate_listener() {
        assert!(validate_listener("abc123").is_ok());
        assert!(validate_listener("my-hook").is_ok());
        assert!(validate_listener("").is_err());
        assert!(validate_listener("a/b").is_err());
        assert!(validate_listener("a b").is_err());
        assert!(validate_listener("-edge").is_err());
        assert!(validate_listener(&"x".repeat(64)).is_err());
    }

    #[tokio::test]
    async fn test_listener_scenario() {
        let backend = FakeBackend::start().await;
        let mut session = Session::start(options(&backend, "abc123")).await.unwrap();
        step_until(&mut session, SessionUpdate::State(ConnectionState::Open)).await;

        backend.send(&record_json("t1", "GET", "/x"));
        backend.send(&record_json("t2", "POST", "/y"));
        appended(&mut session).await;
        appended(&mut session).await;

        let view = session.view();
        assert_eq!(view.listener_url, format!("http://abc123.{}", backend.addr));
        assert_eq!(view.entries[0].record.request.method, "POST");
        assert_eq!(timestamps(&session), vec!["t2", "t1"]);

        assert!(session.set_status_code(404).unwrap());
        step_until(&mut session, SessionUpdate::PushSucceeded).await;
        assert!(session.set_body("not here"));
        step_until(&mut session, SessionUpdate::PushSucceeded).await;

        assert_eq!(
            backend.pushes().last().cloned(),
            Some((
                "abc123".to_string(),
                json!({"statusCode": 404, "responseBody": "not here"})
            ))
        );
        assert!(!session.view().pending);
    }

    #[tokio::test]
    async fn test_edits_before_open_are_pushed_once_open() {
        let backend = FakeBackend::start().await;
        let mut session = Session::start(options(&backend, "abc123")).await.unwrap();

        assert!(!session.set_status_code(503).unwrap());
        assert!(!session.set_body("down"));
        assert!(session.view().pending);
        assert!(backend.pushes().is_empty());

        step_until(&mut session, SessionUpdate::PushSucceeded).await;
        assert_eq!(
            backend.pushes(),
            vec![(
                "abc123".to_string(),
                json!({"statusCode": 503, "responseBody": "down"})
            )]
        );
    }

    #[tokio::test]
    async fn test_seeded_override_is_pushed_on_open() {
        let backend = FakeBackend::start().await;
        let mut opts = options(&backend, "abc123");
        opts.initial_override = ResponseOverride::new(202, "");
        let mut session = Session::start(opts).await.unwrap();

        step_until(&mut session, SessionUpdate::PushSucceeded).await;
        assert_eq!(
            backend.pushes()[0].1,
            json!({"statusCode": 202, "responseBody": ""})
        );
    }

    #[tokio::test]
    async fn test_placeholders_and_bad_frames_stay_out_of_the_log() {
        let backend = FakeBackend::start().await;
        let mut session = Session::start(options(&backend, "abc123")).await.unwrap();
        step_until(&mut session, SessionUpdate::State(ConnectionState::Open)).await;

        backend.send("null");
        step_until(&mut session, SessionUpdate::Placeholder).await;
        backend.send("[1,2,3]");
        tokio::time::timeout(Duration::from_secs(5), async {
            while !matches!(session.step().await, SessionUpdate::DecodeFailed(_)) {}
        })
        .await
        .unwrap();
        backend.send(&record_json("t1", "GET", "/x"));
        assert_eq!(appended(&mut session).await, 1);

        let view = session.view();
        assert_eq!(view.entries.len(), 1);
        assert_eq!(view.decode_errors, 1);
        assert_eq!(view.unread, 1);
    }

    #[tokio::test]
    async fn test_toggle_read_through_session() {
        let backend = FakeBackend::start().await;
        let mut session = Session::start(options(&backend, "abc123")).await.unwrap();
        step_until(&mut session, SessionUpdate::State(ConnectionState::Open)).await;

        backend.send(&record_json("t1", "GET", "/x"));
        backend.send(&record_json("t2", "GET", "/y"));
        let first = appended(&mut session).await;
        appended(&mut session).await;

        assert_eq!(session.toggle_read(first), Some(true));
        let view = session.view();
        assert_eq!(view.unread, 1);
        assert!(view.entries[1].expanded);
        assert!(!view.entries[0].read);
    }

    #[tokio::test]
    async fn test_log_survives_reconnect() {
        let backend = FakeBackend::start().await;
        let mut session = Session::start(options(&backend, "abc123")).await.unwrap();
        step_until(&mut session, SessionUpdate::State(ConnectionState::Open)).await;

        backend.send(&record_json("t1", "GET", "/x"));
        appended(&mut session).await;

        backend.drop_connections();
        step_until(&mut session, SessionUpdate::State(ConnectionState::Closed)).await;
        step_until(&mut session, SessionUpdate::State(ConnectionState::Open)).await;

        backend.send(&record_json("t2", "GET", "/y"));
        appended(&mut session).await;

        assert_eq!(timestamps(&session), vec!["t2", "t1"]);
        assert_eq!(backend.connections().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_push_retried_after_reconnect() {
        let backend = FakeBackend::start().await;
        let mut session = Session::start(options(&backend, "abc123")).await.unwrap();
        step_until(&mut session, SessionUpdate::State(ConnectionState::Open)).await;

        backend.set_push_status(502);
        session.set_body("retry me");
        tokio::time::timeout(Duration::from_secs(5), async {
            while !matches!(session.step().await, SessionUpdate::PushFailed(_)) {}
        })
        .await
        .unwrap();
        assert!(session.view().pending);
        assert!(session.view().last_error.is_some());

        backend.set_push_status(200);
        backend.drop_connections();
        step_until(&mut session, SessionUpdate::PushSucceeded).await;

        assert!(!session.view().pending);
        assert_eq!(
            backend.pushes().last().map(|(_, p)| p.clone()),
            Some(json!({"statusCode": 200, "responseBody": "retry me"}))
        );
    }

    #[tokio::test]
    async fn test_switch_listener_starts_fresh() {
        let backend = FakeBackend::start().await;
        let mut session = Session::start(options(&backend, "alpha")).await.unwrap();
        step_until(&mut session, SessionUpdate::State(ConnectionState::Open)).await;

        backend.send(&record_json("a1", "GET", "/a"));
        appended(&mut session).await;
        session.set_status_code(418).unwrap();
        backend.send(&record_json("a2", "GET", "/a"));

        assert!(session.switch_listener("beta").await.unwrap());
        assert_eq!(session.listener(), "beta");
        assert!(session.log().is_empty());
        assert_eq!(session.response(), &ResponseOverride::default());

        step_until(&mut session, SessionUpdate::State(ConnectionState::Open)).await;
        backend.send(&record_json("b1", "GET", "/b"));
        assert_eq!(appended(&mut session).await, 0);

        assert_eq!(timestamps(&session), vec!["b1"]);
        assert_eq!(
            backend.connections(),
            vec!["alpha".to_string(), "beta".to_string()]
        );
        assert!(!session.switch_listener("beta").await.unwrap());
        assert!(session.switch_listener("no/slash").await.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_closes_stream() {
        let backend = FakeBackend::start().await;
        let mut session = Session::start(options(&backend, "abc123")).await.unwrap();
        step_until(&mut session, SessionUpdate::State(ConnectionState::Open)).await;

        session.shutdown().await;
        assert_eq!(session.state(), ConnectionState::Closed);
    }
}
