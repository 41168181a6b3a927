pub mod config;
pub mod error;
pub mod types;

pub use config::{BridgeConfig, Config, RuntimeConfig};
pub use error::{Error, Result};
pub use types::{
    AbaCommand, AudioFeatures, BackendResponse, Command, EmotionInput, HidCommand, Metadata,
    SensoryCategory, SensoryPayload, SpeechCommand, StatusReport, TextInput,
};
