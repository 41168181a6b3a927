//! Built-in consumers for the command categories the backend issues.
//!
//! The actual speech, behaviour-strategy and HID integrations live outside
//! this program; these handlers log the command and acknowledge it.

use async_trait::async_trait;
use echobridge_api::{ApiBridge, CommandHandler};
use echobridge_core::{AbaCommand, Command, Error, HidCommand, Result, SpeechCommand, StatusReport};
use serde::de::DeserializeOwned;
use std::sync::{Arc, Weak};
use tracing::{debug, info};

fn typed_view<T: DeserializeOwned>(command: &Command, category: &str) -> Result<T> {
    command
        .parse_as()
        .map_err(|e| Error::Handler(format!("malformed {} command: {}", category, e)))
}

async fn acknowledge(
    bridge: &Weak<ApiBridge>,
    enabled: bool,
    report: StatusReport,
) -> Result<()> {
    if !enabled {
        return Ok(());
    }
    let Some(bridge) = bridge.upgrade() else {
        debug!(status = %report.status_type, "Bridge gone, acknowledgement dropped");
        return Ok(());
    };
    let response = bridge.send_status(&report).await?;
    if let Some(body) = response.json() {
        debug!(status = %report.status_type, response = %body, "Status acknowledged");
    }
    Ok(())
}

pub struct SpeechHandler {
    bridge: Weak<ApiBridge>,
    acknowledge: bool,
}

#[async_trait]
impl CommandHandler for SpeechHandler {
    async fn handle(&self, command: &Command) -> Result<()> {
        let speech: SpeechCommand = typed_view(command, "speech")?;
        info!(text = %speech.text, prosody = %speech.prosody, "Speech command");
        let report = StatusReport::new("speech_complete").with("text", speech.text);
        acknowledge(&self.bridge, self.acknowledge, report).await
    }
}

pub struct AbaHandler {
    bridge: Weak<ApiBridge>,
    acknowledge: bool,
}

#[async_trait]
impl CommandHandler for AbaHandler {
    async fn handle(&self, command: &Command) -> Result<()> {
        let aba: AbaCommand = typed_view(command, "aba")?;
        info!(strategy = %aba.strategy, "ABA command");
        let report = StatusReport::new("aba_complete").with("strategy", aba.strategy);
        acknowledge(&self.bridge, self.acknowledge, report).await
    }
}

pub struct HidHandler {
    bridge: Weak<ApiBridge>,
    acknowledge: bool,
}

#[async_trait]
impl CommandHandler for HidHandler {
    async fn handle(&self, command: &Command) -> Result<()> {
        let hid: HidCommand = typed_view(command, "hid")?;
        info!(action = %hid.action, "HID command");
        let report = StatusReport::new("hid_complete").with("action", hid.action);
        acknowledge(&self.bridge, self.acknowledge, report).await
    }
}

/// Registers `speech`, `aba` and `hid`. Handlers keep only a weak reference,
/// so the registry never keeps the bridge alive.
pub fn register_builtin(bridge: &Arc<ApiBridge>, acknowledge: bool) {
    let weak = Arc::downgrade(bridge);
    bridge.register_callback(
        "speech",
        SpeechHandler {
            bridge: weak.clone(),
            acknowledge,
        },
    );
    bridge.register_callback(
        "aba",
        AbaHandler {
            bridge: weak.clone(),
            acknowledge,
        },
    );
    bridge.register_callback(
        "hid",
        HidHandler {
            bridge: weak,
            acknowledge,
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::spawn_backend;
    use echobridge_api::DispatchOutcome;
    use echobridge_core::BridgeConfig;
    use serde_json::json;

    #[tokio::test]
    async fn test_builtin_handlers_acknowledge() {
        let (url, backend) = spawn_backend(vec![]).await;
        let bridge = Arc::new(ApiBridge::connected(BridgeConfig::new(&url)).unwrap());
        register_builtin(&bridge, true);
        assert_eq!(bridge.callback_categories(), vec!["aba", "hid", "speech"]);

        let commands = [
            Command::new("speech")
                .with_field("text", "hello")
                .with_field("prosody", json!({"pitch": "high"})),
            Command::new("aba").with_field("strategy", "calming"),
            Command::new("hid").with_field("action", "press_space"),
        ];
        for command in &commands {
            assert_eq!(bridge.dispatch(command).await, DispatchOutcome::Handled);
        }

        assert_eq!(
            backend.posts(),
            vec![
                (
                    "/api/status".to_string(),
                    json!({"type": "speech_complete", "text": "hello"})
                ),
                (
                    "/api/status".to_string(),
                    json!({"type": "aba_complete", "strategy": "calming"})
                ),
                (
                    "/api/status".to_string(),
                    json!({"type": "hid_complete", "action": "press_space"})
                ),
            ]
        );
    }

    #[tokio::test]
    async fn test_acknowledgement_can_be_disabled() {
        let (url, backend) = spawn_backend(vec![]).await;
        let bridge = Arc::new(ApiBridge::connected(BridgeConfig::new(&url)).unwrap());
        register_builtin(&bridge, false);

        let command = Command::new("aba").with_field("strategy", "redirection");
        assert_eq!(bridge.dispatch(&command).await, DispatchOutcome::Handled);
        assert!(backend.posts().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_command_fields_fail_dispatch() {
        let bridge = Arc::new(ApiBridge::new(BridgeConfig::default()).unwrap());
        register_builtin(&bridge, true);

        let command = Command::new("hid").with_field("action", json!({"nested": true}));
        match bridge.dispatch(&command).await {
            DispatchOutcome::Failed(message) => {
                assert!(message.contains("malformed hid command"), "{}", message);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dropped_bridge_skips_acknowledgement() {
        let (url, backend) = spawn_backend(vec![]).await;
        let bridge = Arc::new(ApiBridge::connected(BridgeConfig::new(&url)).unwrap());
        let handler = SpeechHandler {
            bridge: Arc::downgrade(&bridge),
            acknowledge: true,
        };
        drop(bridge);

        let command = Command::new("speech").with_field("text", "late");
        handler.handle(&command).await.unwrap();
        assert!(backend.posts().is_empty());
    }
}
