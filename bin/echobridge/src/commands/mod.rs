pub mod config_cmd;
pub mod handlers;
pub mod run;
pub mod send;

#[cfg(test)]
pub(crate) mod testing;

use echobridge_core::Config;
use std::path::Path;

/// Config file (or defaults when missing) with `ECHOBRIDGE_*` overrides applied.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let mut config = Config::load_or_default(path)?;
    config.apply_env_overrides()?;
    Ok(config)
}
