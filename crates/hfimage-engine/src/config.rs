use std::env;
use std::time::Duration;

pub const DEFAULT_INFERENCE_BASE: &str = "https://api-inference.huggingface.co/models";
pub const DEFAULT_SEARCH_ENDPOINT: &str = "https://huggingface.co/api/models";

/// What `begin` does while another generation is still tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConcurrencyPolicy {
    /// Refuse with `GenerationError::Busy`.
    #[default]
    Reject,
    /// Track the new request instead. The earlier one keeps running but is
    /// only cancellable through a handle its caller kept.
    Replace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub inference_base: String,
    pub search_endpoint: String,
    pub request_timeout: Option<Duration>,
    pub concurrency: ConcurrencyPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            inference_base: DEFAULT_INFERENCE_BASE.to_string(),
            search_endpoint: DEFAULT_SEARCH_ENDPOINT.to_string(),
            request_timeout: None,
            concurrency: ConcurrencyPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            inference_base: env_url("HFIMAGE_INFERENCE_BASE").unwrap_or(defaults.inference_base),
            search_endpoint: env_url("HFIMAGE_SEARCH_ENDPOINT")
                .unwrap_or(defaults.search_endpoint),
            request_timeout: non_empty_env("HFIMAGE_TIMEOUT_SECS")
                .and_then(|value| value.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            concurrency: defaults.concurrency,
        }
    }

    pub fn with_inference_base(mut self, base: impl AsRef<str>) -> Self {
        self.inference_base = normalize_base(base.as_ref());
        self
    }

    pub fn with_search_endpoint(mut self, endpoint: impl AsRef<str>) -> Self {
        self.search_endpoint = normalize_base(endpoint.as_ref());
        self
    }

    pub fn with_concurrency(mut self, concurrency: ConcurrencyPolicy) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// The model identifier is appended exactly as given.
    pub fn model_url(&self, model_id: &str) -> String {
        format!("{}/{}", self.inference_base, model_id)
    }
}

fn normalize_base(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

fn env_url(key: &str) -> Option<String> {
    non_empty_env(key)
        .map(|value| normalize_base(&value))
        .filter(|value| !value.is_empty())
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
