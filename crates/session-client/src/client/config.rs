use super::consts;
use secrecy::SecretString;
use std::time::Duration;

pub struct Config {
    base_url: String,
    api_token: Option<SecretString>,
    timeout: Duration,
}

pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.config.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_token(mut self, api_token: &str) -> Self {
        self.config.api_token = Some(SecretString::from(api_token.to_string()));
        self
    }

    pub fn without_api_token(mut self) -> Self {
        self.config.api_token = None;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    // Defaults come from the environment when present.
    pub fn new() -> Self {
        let base_url = std::env::var(consts::API_BASE_URL_VAR)
            .unwrap_or_else(|_| consts::BASE_URL.to_string());
        let api_token = std::env::var(consts::API_TOKEN_VAR)
            .ok()
            .filter(|token| !token.is_empty())
            .map(SecretString::from);
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
            timeout: Duration::from_secs(consts::DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_token(&self) -> Option<&SecretString> {
        self.api_token.as_ref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
