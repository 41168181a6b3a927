use anyhow::Context;
use echobridge_api::ApiBridge;
use echobridge_core::{AudioFeatures, BackendResponse, Config, Metadata, SensoryCategory};
use serde_json::Value;

/// Parses a command-line JSON argument that must be an object.
fn parse_object(label: &str, raw: &str) -> anyhow::Result<Metadata> {
    let value: Value =
        serde_json::from_str(raw).with_context(|| format!("{} is not valid JSON", label))?;
    match value {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("{} must be a JSON object, got {}", label, other),
    }
}

fn parse_metadata(raw: Option<&str>) -> anyhow::Result<Option<Metadata>> {
    raw.map(|raw| parse_object("metadata", raw)).transpose()
}

fn print_response(response: BackendResponse) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&response.into_value())?);
    Ok(())
}

fn connect(config: &Config) -> anyhow::Result<ApiBridge> {
    Ok(ApiBridge::connected(config.backend.clone())?)
}

pub async fn text(config: &Config, text: &str, metadata: Option<&str>) -> anyhow::Result<()> {
    let metadata = parse_metadata(metadata)?;
    let bridge = connect(config)?;
    let result = bridge.send_text(text, metadata).await;
    bridge.disconnect();
    print_response(result?)
}

pub async fn emotion(
    config: &Config,
    arousal: f64,
    valence: f64,
    metadata: Option<&str>,
) -> anyhow::Result<()> {
    let metadata = parse_metadata(metadata)?;
    let bridge = connect(config)?;
    let result = bridge.send_emotion(arousal, valence, metadata).await;
    bridge.disconnect();
    print_response(result?)
}

pub async fn audio(config: &Config, features: &str) -> anyhow::Result<()> {
    let features = AudioFeatures::new(parse_object("audio features", features)?);
    let bridge = connect(config)?;
    let result = bridge.send_audio_features(features).await;
    bridge.disconnect();
    print_response(result?)
}

/// Raw payload to an explicit category, e.g. a prebuilt emotion object.
pub async fn sensory(config: &Config, category: &str, payload: &str) -> anyhow::Result<()> {
    let category: SensoryCategory = category.parse()?;
    let payload = parse_object("payload", payload)?;
    let bridge = connect(config)?;
    let result = bridge.send_sensory_input(category.as_str(), &payload).await;
    bridge.disconnect();
    print_response(result?)
}

pub async fn status(config: &Config, status: &str) -> anyhow::Result<()> {
    let status = parse_object("status", status)?;
    let bridge = connect(config)?;
    let result = bridge.send_status(&status).await;
    bridge.disconnect();
    print_response(result?)
}

/// One poll without handlers: the command is printed, not executed.
pub async fn poll(config: &Config) -> anyhow::Result<()> {
    let bridge = connect(config)?;
    let result = bridge.get_command().await;
    bridge.disconnect();
    match result? {
        Some(command) => println!("{}", serde_json::to_string_pretty(&command.to_value())?),
        None => println!("No command available"),
    }
    Ok(())
}
