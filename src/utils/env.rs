/// Get environment variable with STRIPE_SERVICE_ prefix, falling back to unprefixed version
///
/// Checks `STRIPE_SERVICE_{key}` first, then `{key}`, so the crate can share a
/// plain `STRIPE_API_KEY` with other tooling while still allowing overrides.
///
/// # Examples
///
/// ```rust
/// use stripe_service::utils::get_env_with_prefix;
///
/// // Checks STRIPE_SERVICE_STRIPE_API_KEY first, then STRIPE_API_KEY
/// let key = get_env_with_prefix("STRIPE_API_KEY");
/// ```
pub fn get_env_with_prefix(key: &str) -> Option<String> {
    std::env::var(format!("STRIPE_SERVICE_{}", key))
        .or_else(|_| std::env::var(key))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_env_with_prefix() {
        unsafe {
            std::env::set_var("STRIPE_SERVICE_ENV_TEST_VAR", "prefixed_value");
            std::env::set_var("ENV_TEST_VAR", "unprefixed_value");
        }
        assert_eq!(get_env_with_prefix("ENV_TEST_VAR"), Some("prefixed_value".to_string()));
        unsafe {
            std::env::remove_var("STRIPE_SERVICE_ENV_TEST_VAR");
        }
        assert_eq!(get_env_with_prefix("ENV_TEST_VAR"), Some("unprefixed_value".to_string()));
        unsafe {
            std::env::remove_var("ENV_TEST_VAR");
        }

        assert_eq!(get_env_with_prefix("ENV_TEST_NON_EXISTENT_VAR"), None);
    }
}
