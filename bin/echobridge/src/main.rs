mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "echobridge")]
#[command(
    about = "HTTP bridge between the local sensory client and the decision backend",
    long_about = None
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to the configuration file (YAML, or JSON with a .json extension)
    #[arg(short, long, global = true, default_value = "config.yaml")]
    config: PathBuf,

    /// Logging level
    #[arg(long, global = true, value_enum, ignore_case = true, default_value = "info")]
    log_level: LogLevel,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Enable verbose logging (same as --log-level debug)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    #[value(alias = "warning")]
    Warn,
    #[value(alias = "critical")]
    Error,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Connect, poll for commands and dispatch them until interrupted (default)
    Run,

    /// Poll for a single command and print it
    Poll,

    /// Send one message to the backend and print its response
    Send {
        #[command(subcommand)]
        command: SendCommands,
    },

    /// Inspect or create the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum SendCommands {
    /// Send transcribed text
    Text {
        text: String,
        /// JSON object attached as metadata
        #[arg(long)]
        metadata: Option<String>,
    },
    /// Send an arousal/valence emotional state
    Emotion {
        #[arg(allow_negative_numbers = true)]
        arousal: f64,
        #[arg(allow_negative_numbers = true)]
        valence: f64,
        /// JSON object attached as metadata
        #[arg(long)]
        metadata: Option<String>,
    },
    /// Send audio features given as a JSON object
    Audio { features: String },
    /// Send a JSON object to a sensory category (text, emotion or audio)
    Sensory { category: String, payload: String },
    /// Send a status report given as a JSON object
    Status { status: String },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration (file + environment)
    Show,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn init_tracing(level: LogLevel, verbose: bool, log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::new(directives),
        _ if verbose => EnvFilter::new("debug"),
        _ => EnvFilter::new(level.as_str()),
    };

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(fmt::layer().with_ansi(false).with_writer(Arc::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(file_layer)
        .with(filter)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.log_level, cli.verbose, cli.log_file.as_deref())?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let config = commands::load_config(&cli.config)?;
            commands::run::run(config).await?;
        }
        Commands::Poll => {
            let config = commands::load_config(&cli.config)?;
            commands::send::poll(&config).await?;
        }
        Commands::Send { command } => {
            let config = commands::load_config(&cli.config)?;
            match command {
                SendCommands::Text { text, metadata } => {
                    commands::send::text(&config, &text, metadata.as_deref()).await?;
                }
                SendCommands::Emotion {
                    arousal,
                    valence,
                    metadata,
                } => {
                    commands::send::emotion(&config, arousal, valence, metadata.as_deref()).await?;
                }
                SendCommands::Audio { features } => {
                    commands::send::audio(&config, &features).await?;
                }
                SendCommands::Sensory { category, payload } => {
                    commands::send::sensory(&config, &category, &payload).await?;
                }
                SendCommands::Status { status } => {
                    commands::send::status(&config, &status).await?;
                }
            }
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                let config = commands::load_config(&cli.config)?;
                commands::config_cmd::show(&config)?;
            }
            ConfigCommands::Init { force } => {
                commands::config_cmd::init(&cli.config, force)?;
            }
        },
    }

    Ok(())
}
