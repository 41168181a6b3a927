use echobridge_core::{
    AudioFeatures, BackendResponse, BridgeConfig, Command, EmotionInput, Error, Metadata, Result,
    SensoryPayload, TextInput,
};
use futures::FutureExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, warn};

use crate::dispatch::{panic_message, CallbackRegistry, CommandHandler, DispatchOutcome};
use crate::session::TransportSession;

pub const SENSORY_PATH: &str = "/api/sensory";
pub const COMMAND_POLL_PATH: &str = "/api/commands/poll";
pub const STATUS_PATH: &str = "/api/status";

/// HTTP bridge between the local sensory client and the decision backend.
///
/// Sensory sends retry transport failures up to `retry_attempts` times.
/// Polls and status reports never retry and never fail on backend trouble:
/// they log and degrade to "no command" / an empty map. Every operation
/// except `dispatch` needs an open session and returns
/// [`Error::NotConnected`] otherwise, without touching the network.
///
/// Operations take `&self`, so handlers may hold a (weak) reference to the
/// bridge and report status from inside dispatch. `connect`/`disconnect`
/// are expected to be called by a single driver.
pub struct ApiBridge {
    config: BridgeConfig,
    session: Mutex<TransportSession>,
    callbacks: RwLock<CallbackRegistry>,
}

impl ApiBridge {
    /// Fails with [`Error::Config`] when the configuration is unusable.
    pub fn new(config: BridgeConfig) -> Result<Self> {
        config.validate()?;
        let session = TransportSession::new(&config);
        Ok(Self {
            config,
            session: Mutex::new(session),
            callbacks: RwLock::new(CallbackRegistry::new()),
        })
    }

    /// `new` followed by `connect`.
    pub fn connected(config: BridgeConfig) -> Result<Self> {
        let bridge = Self::new(config)?;
        bridge.connect()?;
        Ok(bridge)
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn connect(&self) -> Result<()> {
        self.lock_session().connect()
    }

    pub fn disconnect(&self) {
        self.lock_session().disconnect()
    }

    pub fn is_connected(&self) -> bool {
        self.lock_session().is_connected()
    }

    pub fn sessions_opened(&self) -> u64 {
        self.lock_session().sessions_opened()
    }

    fn lock_session(&self) -> MutexGuard<'_, TransportSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn client(&self) -> Result<Client> {
        self.lock_session().client()
    }

    fn read_callbacks(&self) -> RwLockReadGuard<'_, CallbackRegistry> {
        self.callbacks.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_callbacks(&self) -> RwLockWriteGuard<'_, CallbackRegistry> {
        self.callbacks.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Routes commands whose `type` equals `category` to `handler`,
    /// replacing any earlier registration.
    pub fn register_callback<H>(&self, category: &str, handler: H)
    where
        H: CommandHandler + 'static,
    {
        self.write_callbacks().register(category, Arc::new(handler));
    }

    pub fn unregister_callback(&self, category: &str) -> bool {
        self.write_callbacks().remove(category).is_some()
    }

    pub fn has_callback(&self, category: &str) -> bool {
        self.read_callbacks().contains(category)
    }

    pub fn callback_categories(&self) -> Vec<String> {
        self.read_callbacks().categories()
    }

    /// POSTs `payload` to `/api/sensory/{category}` with bounded retry.
    ///
    /// Transport errors and non-2xx statuses are retried after
    /// `retry_delay`; the last attempt's error is returned. A 2xx body that
    /// is not JSON comes back as [`BackendResponse::InvalidJson`] after a
    /// single request.
    pub async fn send_sensory_input<T>(
        &self,
        category: &str,
        payload: &T,
    ) -> Result<BackendResponse>
    where
        T: Serialize + ?Sized,
    {
        let client = self.client()?;
        let url = self.config.endpoint(&format!("{}/{}", SENSORY_PATH, category));
        let body = serde_json::to_value(payload)?;
        let max_attempts = self.config.retry_attempts.max(1);
        let delay = self.config.retry_delay_duration();

        let mut attempt = 0;
        loop {
            attempt += 1;
            match post_json(&client, &url, &body).await {
                Ok(BackendResponse::InvalidJson { message }) => {
                    error!(category, error = %message, "Invalid JSON response for sensory input");
                    return Ok(BackendResponse::InvalidJson { message });
                }
                Ok(response) => {
                    debug!(category, attempt, "Sent sensory input to backend");
                    return Ok(response);
                }
                Err(e) => {
                    warn!(
                        category,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Sensory send attempt failed"
                    );
                    if !e.is_retryable() || attempt >= max_attempts {
                        return Err(e);
                    }
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Sends a typed payload to its own category.
    pub async fn send_payload(&self, payload: &SensoryPayload) -> Result<BackendResponse> {
        self.send_sensory_input(payload.category().as_str(), payload)
            .await
    }

    pub async fn send_text(
        &self,
        text: &str,
        metadata: Option<Metadata>,
    ) -> Result<BackendResponse> {
        self.send_payload(&SensoryPayload::Text(TextInput::new(text, metadata)))
            .await
    }

    pub async fn send_emotion(
        &self,
        arousal: f64,
        valence: f64,
        metadata: Option<Metadata>,
    ) -> Result<BackendResponse> {
        self.send_payload(&SensoryPayload::Emotion(EmotionInput::new(
            arousal, valence, metadata,
        )))
        .await
    }

    pub async fn send_audio_features(&self, features: AudioFeatures) -> Result<BackendResponse> {
        self.send_payload(&SensoryPayload::Audio(features)).await
    }

    /// Polls `/api/commands/poll` once.
    ///
    /// 200 decodes, dispatches and returns the command; 204 means nothing is
    /// queued. Anything else (other statuses, transport failures, bodies that
    /// are not a command object) is logged and reported as `None`.
    pub async fn get_command(&self) -> Result<Option<Command>> {
        let client = self.client()?;
        let url = self.config.endpoint(COMMAND_POLL_PATH);

        let response = match client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                error!(url = %url, error = %e, "Error polling for commands");
                return Ok(None);
            }
        };

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NO_CONTENT => {
                debug!("No commands available");
                return Ok(None);
            }
            status => {
                error!(
                    url = %url,
                    status = %status,
                    "Error polling for commands: unexpected status"
                );
                return Ok(None);
            }
        }

        let value = match read_backend_response(response).await {
            Ok(BackendResponse::Json(v)) => v,
            Ok(BackendResponse::InvalidJson { message }) => {
                error!(error = %message, "Invalid JSON in command response");
                return Ok(None);
            }
            Err(e) => {
                error!(error = %e, "Error reading command response");
                return Ok(None);
            }
        };

        let command: Command = match serde_json::from_value(value) {
            Ok(c) => c,
            Err(e) => {
                error!(error = %e, "Command response is not a command object");
                return Ok(None);
            }
        };

        self.dispatch(&command).await;
        Ok(Some(command))
    }

    /// Invokes the handler registered for the command's type.
    ///
    /// Handler errors and panics are logged here and never propagate.
    pub async fn dispatch(&self, command: &Command) -> DispatchOutcome {
        let Some(kind) = command.kind() else {
            debug!("Command has no type, nothing to dispatch");
            return DispatchOutcome::Untyped;
        };

        let handler = self.read_callbacks().get(kind);
        let Some(handler) = handler else {
            debug!(command_type = kind, "No callback registered for command");
            return DispatchOutcome::NoHandler;
        };

        match AssertUnwindSafe(handler.handle(command)).catch_unwind().await {
            Ok(Ok(())) => {
                debug!(command_type = kind, "Command handled");
                DispatchOutcome::Handled
            }
            Ok(Err(e)) => {
                error!(command_type = kind, error = %e, "Error processing command");
                DispatchOutcome::Failed(e.to_string())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(command_type = kind, panic = %message, "Command handler panicked");
                DispatchOutcome::Failed(message)
            }
        }
    }

    /// Best-effort POST to `/api/status`: one attempt, transport failures
    /// and non-2xx statuses yield an empty map.
    pub async fn send_status<T>(&self, status: &T) -> Result<BackendResponse>
    where
        T: Serialize + ?Sized,
    {
        let client = self.client()?;
        let url = self.config.endpoint(STATUS_PATH);
        let body = serde_json::to_value(status)?;

        match post_json(&client, &url, &body).await {
            Ok(BackendResponse::InvalidJson { message }) => {
                error!(error = %message, "Invalid JSON response from backend");
                Ok(BackendResponse::InvalidJson { message })
            }
            Ok(response) => Ok(response),
            Err(e) => {
                error!(error = %e, "Error sending status");
                Ok(BackendResponse::empty())
            }
        }
    }
}

async fn post_json(client: &Client, url: &str, body: &Value) -> Result<BackendResponse> {
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| Error::Transport(e.to_string()))?
        .error_for_status()
        .map_err(|e| Error::Transport(e.to_string()))?;
    read_backend_response(response).await
}

async fn read_backend_response(response: reqwest::Response) -> Result<BackendResponse> {
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response
        .bytes()
        .await
        .map_err(|e| Error::Transport(format!("failed to read response body: {}", e)))?;
    Ok(parse_json_body(content_type.as_deref(), &body))
}

fn is_json_content_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    mime == "application/json" || mime.ends_with("+json")
}

/// A declared non-JSON content type is rejected even if the body would parse.
/// Without a `Content-Type` header the body alone decides.
fn parse_json_body(content_type: Option<&str>, body: &[u8]) -> BackendResponse {
    if let Some(ct) = content_type {
        if !is_json_content_type(ct) {
            return BackendResponse::invalid_json(format!("unexpected content type '{}'", ct));
        }
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(v) => BackendResponse::Json(v),
        Err(e) => BackendResponse::invalid_json(e.to_string()),
    }
}
