//! Client configuration.

use std::env;

use secrecy::SecretString;

use crate::error::ApiError;

/// Page size requested from paginated endpoints when the caller gives none.
pub const DEFAULT_PER_PAGE: u32 = 100;

/// Connection settings for a Canvas instance.
///
/// The bearer token is held as a `SecretString`, so `Debug` output shows
/// `[REDACTED]` in its place.
#[derive(Debug, Clone)]
pub struct CanvasConfig {
    /// Scheme and host, e.g. `https://canvas.example.edu`.
    pub base_url: String,
    /// OAuth bearer token sent on every request when set.
    pub token: Option<SecretString>,
    pub per_page: u32,
    /// Account used by create/update operations when none is passed per call.
    pub account_id: Option<String>,
}

impl CanvasConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            per_page: DEFAULT_PER_PAGE,
            account_id: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(SecretString::from(token.into()));
        self
    }

    /// Values below 1 are raised to 1.
    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page.max(1);
        self
    }

    pub fn with_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    /// Read settings from `CANVAS_HOST`, `CANVAS_OAUTH_BEARER`,
    /// `CANVAS_ACCOUNT_ID` and `CANVAS_PER_PAGE`.
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ApiError> {
        let host = lookup("CANVAS_HOST")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ApiError::Config("CANVAS_HOST is not set".to_string()))?;
        let mut config = Self::new(&host);
        config.token = lookup("CANVAS_OAUTH_BEARER")
            .filter(|v| !v.is_empty())
            .map(SecretString::from);
        config.account_id = lookup("CANVAS_ACCOUNT_ID").filter(|v| !v.is_empty());
        if let Some(raw) = lookup("CANVAS_PER_PAGE") {
            config.per_page = match raw.parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ApiError::Config(format!(
                        "CANVAS_PER_PAGE must be a positive integer, got {raw:?}"
                    )))
                }
            };
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn trailing_slash_is_stripped() {
        let config = CanvasConfig::new("https://canvas.test/");
        assert_eq!(config.base_url, "https://canvas.test");
        assert_eq!(config.per_page, DEFAULT_PER_PAGE);
    }

    #[test]
    fn env_lookup_reads_all_settings() {
        let config = CanvasConfig::from_lookup(lookup_from(&[
            ("CANVAS_HOST", "https://canvas.test"),
            ("CANVAS_OAUTH_BEARER", "secret"),
            ("CANVAS_ACCOUNT_ID", "12345"),
            ("CANVAS_PER_PAGE", "50"),
        ]))
        .unwrap();
        assert_eq!(config.base_url, "https://canvas.test");
        assert_eq!(config.token.as_ref().map(|t| t.expose_secret()), Some("secret"));
        assert_eq!(config.account_id.as_deref(), Some("12345"));
        assert_eq!(config.per_page, 50);
    }

    #[test]
    fn env_lookup_requires_host() {
        let err = CanvasConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, ApiError::Config(_)));
    }

    #[test]
    fn empty_account_id_counts_as_unset() {
        let config = CanvasConfig::from_lookup(lookup_from(&[
            ("CANVAS_HOST", "https://canvas.test"),
            ("CANVAS_ACCOUNT_ID", ""),
        ]))
        .unwrap();
        assert!(config.account_id.is_none());
        assert!(config.token.is_none());
    }

    #[test]
    fn env_lookup_rejects_bad_page_size() {
        for raw in ["zero", "0", "-1"] {
            let err = CanvasConfig::from_lookup(lookup_from(&[
                ("CANVAS_HOST", "https://canvas.test"),
                ("CANVAS_PER_PAGE", raw),
            ]))
            .unwrap_err();
            assert!(matches!(err, ApiError::Config(_)), "{raw}");
        }
    }

    #[test]
    fn debug_output_hides_token() {
        let config = CanvasConfig::new("https://canvas.test").with_token("s3cr3t-bearer");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("s3cr3t-bearer"), "{rendered}");
        assert!(rendered.contains("https://canvas.test"));
    }

    #[test]
    fn zero_page_size_is_raised_to_one() {
        let config = CanvasConfig::new("https://canvas.test").with_per_page(0);
        assert_eq!(config.per_page, 1);
        assert_eq!(config.with_per_page(25).per_page, 25);
    }
}
