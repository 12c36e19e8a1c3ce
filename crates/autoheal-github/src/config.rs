//! GitHub Actions client configuration.

use serde::{Deserialize, Serialize};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const ENV_API_URL: &str = "GITHUB_API_URL";
pub const ENV_TOKEN: &str = "GITHUB_TOKEN";

/// Connection settings for the GitHub REST API.
#[derive(Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// API base URL, e.g. `https://api.github.com` or a GHES `/api/v3` root
    pub api_url: String,
    /// Token sent as `Authorization: Bearer`
    pub token: Option<String>,
    pub user_agent: String,
    /// Per-request timeout
    pub request_timeout_secs: u64,
}

impl std::fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("api_url", &self.api_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("user_agent", &self.user_agent)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        GitHubConfig {
            api_url: std::env::var(ENV_API_URL).unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            token: std::env::var(ENV_TOKEN).ok().filter(|t| !t.is_empty()),
            user_agent: concat!("autoheal-github/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl GitHubConfig {
    /// Create a new config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Config for a specific API root, ignoring the environment
    pub fn new(api_url: &str) -> Self {
        GitHubConfig {
            api_url: api_url.trim_end_matches('/').to_string(),
            token: None,
            user_agent: concat!("autoheal-github/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout_secs: 30,
        }
    }

    /// Set authentication token
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.request_timeout_secs = seconds;
        self
    }

    pub(crate) fn base_url(&self) -> &str {
        self.api_url.trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_trims_trailing_slash() {
        let config = GitHubConfig::new("https://ghe.example/api/v3/");
        assert_eq!(config.api_url, "https://ghe.example/api/v3");
        assert!(config.token.is_none());
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = GitHubConfig::new(DEFAULT_API_URL).with_token("ghp_secret");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("ghp_secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
