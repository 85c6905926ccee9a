//! Configuration validation

use tracing::debug;

use crate::error::{ConfigError, Result};

use super::types::Config;

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    debug!("validating configuration");
    validate_run(config)?;
    debug!("configuration validation passed");
    Ok(())
}

fn validate_run(config: &Config) -> Result<()> {
    if config.run.output_grace_secs == 0 {
        return Err(ConfigError::InvalidValue {
            field: "run.output_grace_secs".to_string(),
            message: "must be greater than zero".to_string(),
        }
        .into());
    }

    if let Some(prefix) = config
        .run
        .env_deny_prefixes
        .iter()
        .find(|p| p.trim().is_empty())
    {
        return Err(ConfigError::InvalidValue {
            field: "run.env_deny_prefixes".to_string(),
            message: format!("prefix '{}' would drop every variable", prefix),
        }
        .into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_empty_prefix_rejected() {
        let mut config = Config::default();
        config.run.env_deny_prefixes.push(String::new());
        assert!(validate_config(&config).is_err());
    }
}
