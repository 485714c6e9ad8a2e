use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StripeServiceError};
use crate::gateway::{LiveGatewayConfig, MAX_PAGE_SIZE};
use crate::gateway::live::validate_api_key;
use crate::pagination::{Paginator, StopRule};
use crate::utils::get_env_with_prefix;

/// Configuration for a [`StripeService`](crate::StripeService) talking to Stripe.
#[derive(Clone)]
pub struct StripeServiceConfig {
    pub api_key: SecretString,
    /// Items requested per page when walking listings (1 to 100).
    pub page_size: u8,
    pub stop_rule: StopRule,
    pub request_timeout_seconds: u64,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_json")]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: default_json(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_json() -> bool {
    false
}

fn default_page_size() -> u8 {
    MAX_PAGE_SIZE
}

fn default_request_timeout_seconds() -> u64 {
    30
}

impl StripeServiceConfig {
    /// The pagination walker described by this configuration.
    #[must_use]
    pub fn paginator(&self) -> Paginator {
        Paginator::new(self.page_size, self.stop_rule)
    }

    #[must_use]
    pub fn gateway_config(&self) -> LiveGatewayConfig {
        LiveGatewayConfig::new().timeout_seconds(self.request_timeout_seconds)
    }
}

impl fmt::Debug for StripeServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StripeServiceConfig")
            .field("api_key", &"[REDACTED]")
            .field("page_size", &self.page_size)
            .field("stop_rule", &self.stop_rule)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .field("logging", &self.logging)
            .finish()
    }
}

/// Builder for [`StripeServiceConfig`] with environment variable support.
#[must_use = "builder does nothing until you call build()"]
pub struct ConfigBuilder {
    api_key: Option<SecretString>,
    page_size: u8,
    stop_rule: StopRule,
    request_timeout_seconds: u64,
    logging: LoggingConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            api_key: None,
            page_size: default_page_size(),
            stop_rule: StopRule::default(),
            request_timeout_seconds: default_request_timeout_seconds(),
            logging: LoggingConfig::default(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(api_key.into()));
        self
    }

    pub fn with_page_size(mut self, page_size: u8) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_stop_rule(mut self, stop_rule: StopRule) -> Self {
        self.stop_rule = stop_rule;
        self
    }

    pub fn with_request_timeout_seconds(mut self, seconds: u64) -> Self {
        self.request_timeout_seconds = seconds;
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.logging.level = level.into();
        self
    }

    pub fn with_json_logging(mut self, enabled: bool) -> Self {
        self.logging.json = enabled;
        self
    }

    /// Load configuration from environment variables.
    ///
    /// Each key is read as `STRIPE_SERVICE_<KEY>` first, then `<KEY>`.
    /// Unparsable values are ignored and the previous setting is kept.
    pub fn from_env(mut self) -> Self {
        if let Some(key) = get_env_with_prefix("STRIPE_API_KEY") {
            self.api_key = Some(SecretString::from(key));
        }
        if let Some(size) = get_env_with_prefix("PAGE_SIZE") {
            if let Ok(s) = size.parse() {
                self.page_size = s;
            }
        }
        if let Some(rule) = get_env_with_prefix("PAGINATION_STOP_RULE") {
            match rule.parse() {
                Ok(r) => self.stop_rule = r,
                Err(_) => {
                    tracing::warn!(
                        target: "stripe_service::service",
                        value = %rule,
                        "Ignoring unknown pagination stop rule"
                    );
                }
            }
        }
        if let Some(timeout) = get_env_with_prefix("REQUEST_TIMEOUT_SECONDS") {
            if let Ok(t) = timeout.parse() {
                self.request_timeout_seconds = t;
            }
        }
        if let Some(level) = get_env_with_prefix("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = get_env_with_prefix("LOG_JSON") {
            self.logging.json = json.parse().unwrap_or(false);
        }

        self
    }

    /// Build the configuration, validating all settings
    ///
    /// # Errors
    ///
    /// Returns [`StripeServiceError::Configuration`] if:
    /// - the API key is missing or malformed
    /// - the log level is not one of trace, debug, info, warn, error
    /// - the page size is 0 or above 100
    /// - the request timeout is 0
    pub fn build(self) -> Result<StripeServiceConfig> {
        let api_key = self
            .api_key
            .ok_or_else(|| StripeServiceError::configuration("Stripe API key is required"))?;
        validate_api_key(api_key.expose_secret())?;

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(StripeServiceError::configuration(format!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            )));
        }

        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(StripeServiceError::configuration(format!(
                "Page size must be between 1 and {}, got: {}",
                MAX_PAGE_SIZE, self.page_size
            )));
        }

        if self.request_timeout_seconds == 0 {
            return Err(StripeServiceError::configuration(
                "Request timeout must be greater than 0",
            ));
        }

        Ok(StripeServiceConfig {
            api_key,
            page_size: self.page_size,
            stop_rule: self.stop_rule,
            request_timeout_seconds: self.request_timeout_seconds,
            logging: self.logging,
        })
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const KEY: &str = "sk_test_12345678901234567890";

    #[test]
    fn test_defaults() {
        let config = ConfigBuilder::new().with_api_key(KEY).build().unwrap();
        assert_eq!(config.page_size, 100);
        assert_eq!(config.stop_rule, StopRule::HasMore);
        assert_eq!(config.request_timeout_seconds, 30);
        assert_eq!(config.logging, LoggingConfig::default());
        assert_eq!(config.paginator(), Paginator::default());
        assert_eq!(config.gateway_config().timeout_seconds, 30);
    }

    #[test]
    fn test_missing_key_rejected() {
        let err = ConfigBuilder::new().build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let err = ConfigBuilder::new().with_api_key("pk_test_1234567890abcdef").build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let base = || ConfigBuilder::new().with_api_key(KEY);

        assert!(base().with_page_size(0).build().is_err());
        assert!(base().with_page_size(101).build().is_err());
        assert!(base().with_request_timeout_seconds(0).build().is_err());
        assert!(base().with_log_level("loud").build().is_err());
        assert!(base().with_log_level("DEBUG").build().is_ok());
    }

    #[test]
    fn test_builder_setters() {
        let config = ConfigBuilder::new()
            .with_api_key(KEY)
            .with_page_size(25)
            .with_stop_rule(StopRule::SingleItem)
            .with_request_timeout_seconds(5)
            .with_json_logging(true)
            .build()
            .unwrap();

        assert_eq!(config.paginator(), Paginator::new(25, StopRule::SingleItem));
        assert_eq!(config.gateway_config().timeout_seconds, 5);
        assert!(config.logging.json);
    }

    #[test]
    fn test_logging_config_serde_defaults() {
        let logging: LoggingConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(logging, LoggingConfig::default());

        let logging: LoggingConfig = serde_json::from_str(r#"{"level":"debug","json":true}"#).unwrap();
        assert_eq!(logging.level, "debug");
        assert!(logging.json);
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = ConfigBuilder::new().with_api_key(KEY).build().unwrap();
        let output = format!("{:?}", config);
        assert!(!output.contains(KEY));
        assert!(output.contains("[REDACTED]"));
    }

    #[test]
    fn test_from_env() {
        // Only this test touches these variables.
        unsafe {
            std::env::set_var("STRIPE_SERVICE_STRIPE_API_KEY", KEY);
            std::env::set_var("STRIPE_SERVICE_PAGE_SIZE", "50");
            std::env::set_var("STRIPE_SERVICE_PAGINATION_STOP_RULE", "full_page");
            std::env::set_var("STRIPE_SERVICE_REQUEST_TIMEOUT_SECONDS", "not-a-number");
        }

        let config = ConfigBuilder::new().from_env().build().unwrap();
        assert_eq!(config.page_size, 50);
        assert_eq!(config.stop_rule, StopRule::FullPage);
        assert_eq!(config.request_timeout_seconds, 30);

        unsafe {
            std::env::remove_var("STRIPE_SERVICE_STRIPE_API_KEY");
            std::env::remove_var("STRIPE_SERVICE_PAGE_SIZE");
            std::env::remove_var("STRIPE_SERVICE_PAGINATION_STOP_RULE");
            std::env::remove_var("STRIPE_SERVICE_REQUEST_TIMEOUT_SECONDS");
        }
    }
}
