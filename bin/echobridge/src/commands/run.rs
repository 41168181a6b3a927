use echobridge_api::ApiBridge;
use echobridge_core::Config;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::handlers;

/// Connects, registers the built-in handlers and polls until SIGINT/SIGTERM.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let bridge = Arc::new(ApiBridge::new(config.backend.clone())?);
    bridge.connect()?;
    handlers::register_builtin(&bridge, config.runtime.acknowledge_commands);

    info!(
        url = %config.backend.base_url(),
        poll_interval_ms = config.runtime.poll_interval_ms,
        handlers = ?bridge.callback_categories(),
        "Echo bridge started"
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let shutdown_rx = shutdown_tx.subscribe();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    let result = poll_loop(&bridge, config.runtime.poll_interval(), shutdown_rx).await;
    bridge.disconnect();

    let received = result?;
    info!(commands = received, "Echo bridge stopped");
    Ok(())
}

/// Polls once per `interval` until `shutdown` fires. An in-flight poll
/// (and the dispatch it triggers) always completes; only the pause between
/// polls is interrupted. Returns the number of commands received.
pub async fn poll_loop(
    bridge: &ApiBridge,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<u64> {
    let mut received = 0u64;
    loop {
        if let Some(command) = bridge.get_command().await? {
            received += 1;
            debug!(command_type = command.kind().unwrap_or("<none>"), "Command received");
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.recv() => {
                debug!("Poll loop shutting down");
                break;
            }
        }
    }
    Ok(received)
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        warn!(error = %e, "Failed to listen for Ctrl-C");
                    }
                }
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "Failed to install SIGTERM handler");
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl-C");
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::spawn_backend;
    use echobridge_core::BridgeConfig;
    use serde_json::json;

    async fn wait_until<F: Fn() -> bool>(check: F) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !check() {
            assert!(tokio::time::Instant::now() < deadline, "condition not met in time");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_poll_loop_dispatches_queued_commands() {
        let (url, backend) = spawn_backend(vec![
            json!({"type": "speech", "text": "good morning"}),
            json!({"type": "hid", "action": "scroll"}),
            json!({"type": "unknown"}),
        ])
        .await;
        let bridge = Arc::new(ApiBridge::connected(BridgeConfig::new(&url)).unwrap());
        handlers::register_builtin(&bridge, true);

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = {
            let bridge = bridge.clone();
            tokio::spawn(async move {
                poll_loop(&bridge, Duration::from_millis(5), shutdown_rx).await
            })
        };

        wait_until(|| backend.polls() > 3).await;
        shutdown_tx.send(()).unwrap();
        let received = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        assert_eq!(received, 3);
        assert_eq!(
            backend.posts(),
            vec![
                (
                    "/api/status".to_string(),
                    json!({"type": "speech_complete", "text": "good morning"})
                ),
                (
                    "/api/status".to_string(),
                    json!({"type": "hid_complete", "action": "scroll"})
                ),
            ]
        );
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_long_pause() {
        let (url, backend) = spawn_backend(vec![]).await;
        let bridge = ApiBridge::connected(BridgeConfig::new(&url)).unwrap();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        shutdown_tx.send(()).unwrap();

        let received = tokio::time::timeout(
            Duration::from_secs(5),
            poll_loop(&bridge, Duration::from_secs(3600), shutdown_rx),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(received, 0);
        assert_eq!(backend.polls(), 1);
    }

    #[tokio::test]
    async fn test_poll_loop_requires_connection() {
        let bridge = ApiBridge::new(BridgeConfig::default()).unwrap();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let err = poll_loop(&bridge, Duration::from_millis(1), shutdown_rx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not connected"));
    }
}
