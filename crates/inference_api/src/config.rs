use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::InferenceApiError;
use crate::payload::ImageWireFormat;
use crate::retry::RetryPolicy;
use crate::url::DEFAULT_BASE_URL;

/// Default completion budget per request.
pub const DEFAULT_MAX_TOKENS: u32 = 8192;
/// Backend identity reported in `Metadata` when none is configured.
pub const DEFAULT_BACKEND_ID: &str = "openai-compatible";

pub const ENV_BACKEND_ID: &str = "INFERENCE_BACKEND_ID";
pub const ENV_BASE_URL: &str = "INFERENCE_BASE_URL";
pub const ENV_MODEL: &str = "INFERENCE_MODEL";
pub const ENV_API_KEY: &str = "INFERENCE_API_KEY";
pub const ENV_MAX_TOKENS: &str = "INFERENCE_MAX_TOKENS";
pub const ENV_IMAGE_FORMAT: &str = "INFERENCE_IMAGE_FORMAT";
pub const ENV_SYSTEM_PROMPT: &str = "INFERENCE_SYSTEM_PROMPT";

/// Transport configuration for one inference backend.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Identity surfaced in the leading `Metadata` event.
    pub backend_id: String,
    /// Base URL; normalized to a chat completions endpoint.
    pub base_url: String,
    /// Model name sent with each request. May be empty for gateways that
    /// route on their own.
    pub model: String,
    /// Optional bearer token.
    pub api_key: Option<String>,
    pub max_tokens: u32,
    /// System prompt prepended to every request.
    pub system_prompt: Option<String>,
    /// How image parts are rendered on the wire.
    pub image_format: ImageWireFormat,
    /// Optional `User-Agent` override.
    pub user_agent: Option<String>,
    /// Additional headers merged into request headers.
    pub extra_headers: BTreeMap<String, String>,
    /// Optional request timeout.
    pub timeout: Option<Duration>,
    pub retry: RetryPolicy,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            backend_id: DEFAULT_BACKEND_ID.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: String::new(),
            api_key: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            system_prompt: None,
            image_format: ImageWireFormat::default(),
            user_agent: None,
            extra_headers: BTreeMap::new(),
            timeout: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl BackendConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    /// Build a config from `INFERENCE_*` environment variables, ignoring
    /// blank values.
    pub fn from_env() -> Result<Self, InferenceApiError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`BackendConfig::from_env`] with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, InferenceApiError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut config = Self::default();
        if let Some(backend_id) = read(ENV_BACKEND_ID) {
            config.backend_id = backend_id;
        }
        if let Some(base_url) = read(ENV_BASE_URL) {
            config.base_url = base_url;
        }
        if let Some(model) = read(ENV_MODEL) {
            config.model = model;
        }
        config.api_key = read(ENV_API_KEY);
        if let Some(max_tokens) = read(ENV_MAX_TOKENS) {
            config.max_tokens = max_tokens.parse().map_err(|_| {
                InferenceApiError::InvalidConfig(format!(
                    "{ENV_MAX_TOKENS} must be an unsigned integer, got '{max_tokens}'"
                ))
            })?;
        }
        if let Some(format) = read(ENV_IMAGE_FORMAT) {
            config.image_format = ImageWireFormat::parse(&format).ok_or_else(|| {
                InferenceApiError::InvalidConfig(format!(
                    "{ENV_IMAGE_FORMAT} must be 'openai' or 'qwen-vl', got '{format}'"
                ))
            })?;
        }
        config.system_prompt = read(ENV_SYSTEM_PROMPT);
        Ok(config)
    }

    pub fn with_backend_id(mut self, backend_id: impl Into<String>) -> Self {
        self.backend_id = backend_id.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_image_format(mut self, image_format: ImageWireFormat) -> Self {
        self.image_format = image_format;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn insert_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(key.into(), value.into());
        self
    }

    pub fn with_headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        self.extra_headers.extend(headers);
        self
    }
}
