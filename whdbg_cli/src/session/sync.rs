//! Pushes the listener's response override to the backend

use super::state::ConnectionState;
use super::SessionError;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use whdbg_common::{status, update_path, ResponseOverride};

/// Errors from a single override push
#[derive(Debug, Error)]
pub enum PushError {
    #[error("Override push timed out")]
    Timeout,

    #[error("Override push failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("Backend rejected override: {0}")]
    Status(StatusCode),
}

impl From<reqwest::Error> for PushError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            PushError::Timeout
        } else {
            PushError::Request(e)
        }
    }
}

/// Result of one push, tagged with the edit it carried
#[derive(Debug)]
pub struct PushOutcome {
    pub revision: u64,
    pub result: Result<(), PushError>,
}

/// Keeps the backend's override in step with the latest local edit.
///
/// Every edit bumps a revision and, while the stream is open, sends the whole
/// override. Pushes are not serialized against each other. An edit stays
/// pending until a push carrying it succeeds.
pub struct ResponseConfigSync {
    client: Client,
    update_url: String,
    current: ResponseOverride,
    revision: u64,
    acked: u64,
    in_flight: usize,
    last_error: Option<String>,
    state: watch::Receiver<ConnectionState>,
    outcomes_tx: mpsc::Sender<PushOutcome>,
    outcomes_rx: mpsc::Receiver<PushOutcome>,
}

impl ResponseConfigSync {
    pub fn new(
        api_base_url: &str,
        listener: &str,
        initial: ResponseOverride,
        state: watch::Receiver<ConnectionState>,
        timeout: Duration,
    ) -> Result<Self, SessionError> {
        if !status::is_known(initial.status_code) {
            return Err(SessionError::InvalidStatusCode(initial.status_code));
        }

        let client = Client::builder().timeout(timeout).build()?;
        let (outcomes_tx, outcomes_rx) = mpsc::channel(32);

        // Only a non-default starting override needs to reach the backend
        let revision = u64::from(initial != ResponseOverride::default());

        Ok(Self {
            client,
            update_url: format!(
                "{}{}",
                api_base_url.trim_end_matches('/'),
                update_path(listener)
            ),
            current: initial,
            revision,
            acked: 0,
            in_flight: 0,
            last_error: None,
            state,
            outcomes_tx,
            outcomes_rx,
        })
    }

    pub fn current(&self) -> &ResponseOverride {
        &self.current
    }

    /// Whether the latest edit has not been confirmed by the backend
    pub fn is_pending(&self) -> bool {
        self.acked < self.revision
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn update_url(&self) -> &str {
        &self.update_url
    }

    /// Select a status code. Returns whether a push was sent.
    pub fn set_status_code(&mut self, code: u16) -> Result<bool, SessionError> {
        if !status::is_known(code) {
            return Err(SessionError::InvalidStatusCode(code));
        }
        self.current.status_code = code;
        Ok(self.edited())
    }

    /// Replace the response body. Returns whether a push was sent.
    pub fn set_body(&mut self, body: impl Into<String>) -> bool {
        self.current.response_body = body.into();
        self.edited()
    }

    /// Push the latest override if an edit is still unconfirmed
    pub fn on_connection_open(&mut self) -> bool {
        if self.is_pending() {
            self.push()
        } else {
            false
        }
    }

    /// Wait for the next push to finish. Cancel safe.
    pub async fn next_outcome(&mut self) -> PushOutcome {
        match self.outcomes_rx.recv().await {
            Some(outcome) => outcome,
            // The sender lives in self, so the channel never closes
            None => std::future::pending().await,
        }
    }

    /// Record a finished push. Returns the acknowledged revision on success.
    pub fn apply_outcome(&mut self, outcome: PushOutcome) -> Result<u64, PushError> {
        self.in_flight = self.in_flight.saturating_sub(1);

        match outcome.result {
            Ok(()) => {
                self.acked = self.acked.max(outcome.revision);
                if !self.is_pending() {
                    self.last_error = None;
                }
                tracing::debug!("Override revision {} applied", outcome.revision);
                Ok(outcome.revision)
            }
            Err(e) => {
                tracing::warn!("Override revision {} not applied: {}", outcome.revision, e);
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn edited(&mut self) -> bool {
        self.revision += 1;
        self.push()
    }

    fn push(&mut self) -> bool {
        let state = *self.state.borrow();
        if !state.is_open() {
            tracing::debug!("Connection is {}, keeping override pending", state);
            return false;
        }

        let client = self.client.clone();
        let url = self.update_url.clone();
        let snapshot = self.current.clone();
        let revision = self.revision;
        let outcomes = self.outcomes_tx.clone();

        self.in_flight += 1;
        tokio::spawn(async move {
            let result = send_override(&client, &url, &snapshot).await;
            let _ = outcomes.send(PushOutcome { revision, result }).await;
        });

        true
    }
}

async fn send_override(
    client: &Client,
    url: &str,
    payload: &ResponseOverride,
) -> Result<(), PushError> {
    tracing::debug!(
        "POST {} status={} body={}B",
        url,
        payload.status_code,
        payload.response_body.len()
    );

    let response = client.post(url).json(payload).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(PushError::Status(status));
    }

    match response.json::<serde_json::Value>().await {
        Ok(body) => tracing::debug!("Override accepted: {}", body),
        Err(e) => tracing::debug!("Override accepted, response body unreadable: {}", e),
    }

    Ok(())
}
