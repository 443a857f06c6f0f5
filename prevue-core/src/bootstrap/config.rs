//! Configuration loading

use anyhow::Result;

use crate::Config;

/// Load configuration from environment variables and validate it.
/// Fails fast: a misconfigured process should not start.
pub fn load_config() -> Result<Config> {
    let config = Config::from_env()?;

    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("Config validation error: {error}");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s): {}",
            errors.len(),
            errors.join("; ")
        ));
    }

    Ok(config)
}
