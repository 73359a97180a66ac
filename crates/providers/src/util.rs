//! Shared helpers for provider adapters.

use asp_domain::error::{Error, Result};

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
///
/// Timeout errors map to [`Error::Timeout`]; everything else maps to
/// [`Error::Http`].
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

/// Read an API key from the named environment variable.
pub(crate) fn api_key_from_env(var: &str) -> Result<String> {
    match std::env::var(var) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::Auth(format!(
            "environment variable '{var}' not set or empty"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_read_from_env() {
        let var = "ASP_TEST_PROVIDER_KEY_4821";
        std::env::set_var(var, "sk-or-test");
        assert_eq!(api_key_from_env(var).unwrap(), "sk-or-test");
        std::env::remove_var(var);
    }

    #[test]
    fn missing_api_key_is_auth_error() {
        let err = api_key_from_env("ASP_TEST_NO_SUCH_VAR_9913").unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
        assert!(err.to_string().contains("ASP_TEST_NO_SUCH_VAR_9913"));
    }

    #[test]
    fn blank_api_key_rejected() {
        let var = "ASP_TEST_BLANK_KEY_1177";
        std::env::set_var(var, "   ");
        assert!(api_key_from_env(var).is_err());
        std::env::remove_var(var);
    }
}
