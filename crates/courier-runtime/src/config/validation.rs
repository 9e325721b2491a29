//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{
    BotSettings, BridgeSettings, CourierConfig, IdentitySettings, LogOutput, LoggingConfig,
    RetryConfig,
};

/// Validates the entire configuration.
pub fn validate_config(config: &CourierConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_identity_config(&config.identity)?;
    validate_bot_config(&config.bot)?;
    validate_bridge_config(&config.bridge)?;
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }
    Ok(())
}

fn validate_identity_config(identity: &IdentitySettings) -> ConfigResult<()> {
    validate_nickname("identity.nickname", &identity.nickname)?;
    if let Some(backup) = &identity.backup_nickname {
        validate_nickname("identity.backup_nickname", backup)?;
    }

    if identity.username.is_empty() {
        return Err(ConfigError::missing_field("identity.username"));
    }
    if identity.username.contains(char::is_whitespace) {
        return Err(ConfigError::validation(format!(
            "identity.username must not contain whitespace: {:?}",
            identity.username
        )));
    }

    Ok(())
}

/// A nickname goes out as a middle argument, so it may not be empty, contain
/// spaces or start with `:`.
fn validate_nickname(field: &str, nick: &str) -> ConfigResult<()> {
    if nick.is_empty() {
        return Err(ConfigError::missing_field(field));
    }
    if nick.contains(char::is_whitespace) || nick.starts_with(':') {
        return Err(ConfigError::validation(format!(
            "{field} is not a valid nickname: {nick:?}"
        )));
    }
    Ok(())
}

fn validate_bot_config(bot: &BotSettings) -> ConfigResult<()> {
    if bot.max_buffer == 0 {
        return Err(ConfigError::validation(
            "bot.max_buffer must be greater than 0",
        ));
    }
    if bot.connect_timeout_ms == 0 {
        return Err(ConfigError::validation(
            "bot.connect_timeout_ms must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_bridge_config(bridge: &BridgeSettings) -> ConfigResult<()> {
    if bridge.channel_backlog == 0 {
        return Err(ConfigError::validation(
            "bridge.channel_backlog must be greater than 0",
        ));
    }
    if bridge.join_timeout_ms == 0 {
        return Err(ConfigError::validation(
            "bridge.join_timeout_ms must be greater than 0",
        ));
    }
    if bridge.lane_idle_timeout_ms == 0 {
        return Err(ConfigError::validation(
            "bridge.lane_idle_timeout_ms must be greater than 0",
        ));
    }
    validate_retry_config(&bridge.retry)
}

fn validate_retry_config(retry: &RetryConfig) -> ConfigResult<()> {
    if retry.initial_delay_ms == 0 {
        return Err(ConfigError::validation(
            "Initial retry delay must be greater than 0",
        ));
    }

    if retry.max_delay_ms < retry.initial_delay_ms {
        return Err(ConfigError::validation(
            "Max retry delay must be greater than or equal to initial delay",
        ));
    }

    if retry.backoff_multiplier.is_nan() || retry.backoff_multiplier < 1.0 {
        return Err(ConfigError::validation(
            "Backoff multiplier must be at least 1.0",
        ));
    }

    Ok(())
}
