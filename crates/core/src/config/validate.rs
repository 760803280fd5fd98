use super::{types::Config, ConfigError};

/// Largest accepted `retry.backoff` multiplier.
const MAX_BACKOFF: f64 = 10.0;

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }

    if config.server.shutdown_grace_secs == 0 {
        return Err(invalid("server.shutdown_grace_secs must be at least 1"));
    }

    if config.queue.topic.trim().is_empty() {
        return Err(invalid("queue.topic cannot be empty"));
    }

    if config.queue.group_id.trim().is_empty() {
        return Err(invalid("queue.group_id cannot be empty"));
    }

    if config.retry.attempts == 0 {
        return Err(invalid("retry.attempts must be at least 1"));
    }

    if !(1.0..=MAX_BACKOFF).contains(&config.retry.backoff) {
        return Err(invalid("retry.backoff must be between 1.0 and 10.0"));
    }

    if !(1..=100).contains(&config.transform.jpeg_quality) {
        return Err(invalid("transform.jpeg_quality must be between 1 and 100"));
    }

    if config.reconciler.enabled && config.reconciler.interval_secs == 0 {
        return Err(invalid("reconciler.interval_secs must be at least 1"));
    }

    Ok(())
}

fn invalid(msg: &str) -> ConfigError {
    ConfigError::ValidationError(msg.to_string())
}
