//! Configuration validation logic.

use url::Url;

use crate::config::loader::Config;
use crate::error::{Error, Result};

/// Minimum length for user agent.
const MIN_USER_AGENT_LENGTH: usize = 40;

/// Validate the entire configuration.
pub fn validate_config(config: &Config) -> Result<()> {
    validate_base_url(&config.origin.base_url)?;
    validate_user_agent(&config.origin.user_agent)?;
    validate_limits(config)?;
    validate_watermark(config)?;

    Ok(())
}

/// Validate the origin base URL.
pub fn validate_base_url(base_url: &str) -> Result<()> {
    if base_url.is_empty() {
        return Err(Error::MissingConfig("origin.base_url".to_string()));
    }

    let url = Url::parse(base_url).map_err(|e| Error::ConfigValidation {
        field: "origin.base_url".to_string(),
        message: format!("Not a valid URL: {}", e),
    })?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(Error::ConfigValidation {
            field: "origin.base_url".to_string(),
            message: format!("URL scheme must be http or https (got '{}')", url.scheme()),
        });
    }

    Ok(())
}

/// Validate the user agent string.
pub fn validate_user_agent(user_agent: &str) -> Result<()> {
    if user_agent.is_empty() {
        return Err(Error::MissingConfig("origin.user_agent".to_string()));
    }

    if user_agent.len() < MIN_USER_AGENT_LENGTH {
        return Err(Error::ConfigValidation {
            field: "origin.user_agent".to_string(),
            message: format!(
                "User agent must be at least {} characters (got {})",
                MIN_USER_AGENT_LENGTH,
                user_agent.len()
            ),
        });
    }

    Ok(())
}

/// Validate transfer limits for internal consistency.
pub fn validate_limits(config: &Config) -> Result<()> {
    let limits = &config.limits;

    if limits.min_file_size >= limits.max_file_size {
        return Err(Error::ConfigValidation {
            field: "limits.min_file_size".to_string(),
            message: format!(
                "Minimum file size ({}) must be below maximum ({})",
                limits.min_file_size, limits.max_file_size
            ),
        });
    }

    if limits.chunk_size == 0 {
        return Err(Error::ConfigValidation {
            field: "limits.chunk_size".to_string(),
            message: "Chunk size must be non-zero".to_string(),
        });
    }

    if limits.chunk_concurrency == 0 {
        return Err(Error::ConfigValidation {
            field: "limits.chunk_concurrency".to_string(),
            message: "At least one concurrent chunk is required".to_string(),
        });
    }

    if limits.upload_attempts == 0 {
        return Err(Error::ConfigValidation {
            field: "limits.upload_attempts".to_string(),
            message: "At least one upload attempt is required".to_string(),
        });
    }

    if limits.buffer_multiplier == 0 {
        return Err(Error::ConfigValidation {
            field: "limits.buffer_multiplier".to_string(),
            message: "Buffer multiplier must be at least 1".to_string(),
        });
    }

    Ok(())
}

/// Validate watermark settings.
pub fn validate_watermark(config: &Config) -> Result<()> {
    if config.watermark.enabled && config.watermark.text.trim().is_empty() {
        return Err(Error::ConfigValidation {
            field: "watermark.text".to_string(),
            message: "Watermark text is required when watermarking is enabled".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        toml::from_str(
            r#"
            [origin]
            base_url = "https://host.example"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate_config(&base_config()).is_ok());
    }

    #[test]
    fn test_bad_base_url_rejected() {
        assert!(validate_base_url("not a url").is_err());
        assert!(validate_base_url("ftp://host.example").is_err());
        assert!(validate_base_url("").is_err());
    }

    #[test]
    fn test_inverted_size_bounds_rejected() {
        let mut config = base_config();
        config.limits.min_file_size = 100;
        config.limits.max_file_size = 50;
        assert!(validate_limits(&config).is_err());
    }

    #[test]
    fn test_zero_chunk_settings_rejected() {
        let mut config = base_config();
        config.limits.chunk_size = 0;
        assert!(validate_limits(&config).is_err());

        let mut config = base_config();
        config.limits.chunk_concurrency = 0;
        assert!(validate_limits(&config).is_err());
    }

    #[test]
    fn test_watermark_requires_text() {
        let mut config = base_config();
        config.watermark.enabled = true;
        assert!(validate_watermark(&config).is_err());

        config.watermark.text = "mirrored".to_string();
        assert!(validate_watermark(&config).is_ok());
    }
}
