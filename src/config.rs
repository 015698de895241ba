use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, SdError};

const DEFAULT_NEGATIVE_PROMPTS: &str = "lowres, bad anatomy, bad hands, text, error, missing fingers, \
extra digit, fewer digits, cropped, worst quality, low quality, normal quality, jpeg artifacts, \
signature, watermark, username, blurry";

fn default_api_prefix() -> String {
    "/api".to_string()
}

fn default_negative_prompts() -> String {
    DEFAULT_NEGATIVE_PROMPTS.to_string()
}

/// Connection and policy settings for a task backend.
///
/// Loadable from a JSON file with [`ClientConfig::from_file`]. Keys that
/// belong to other parts of an application (a bot token, for instance)
/// are ignored.
///
/// # Example
/// ```
/// use sd_task_client::ClientConfig;
///
/// let config: ClientConfig = serde_json::from_str(r#"{
///     "sd_api_base_url": "http://127.0.0.1:8080",
///     "sd_api_secret": "s3cret",
///     "available_modules": ["anything-v3"]
/// }"#).unwrap();
///
/// assert_eq!(config.api_prefix, "/api");
/// assert!(config.is_module_available("anything-v3"));
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Backend origin, e.g. `http://127.0.0.1:8080`.
    #[serde(alias = "sd_api_base_url")]
    pub api_base_url: String,
    /// Path prefix in front of `/{service}/{method}` (default: `/api`).
    #[serde(alias = "sd_api_prefix", default = "default_api_prefix")]
    pub api_prefix: String,
    /// Shared secret sent in the `X-API-SECRET` header.
    #[serde(alias = "sd_api_secret")]
    pub api_secret: String,
    /// Substituted for `$` in user supplied negative prompts.
    #[serde(default = "default_negative_prompts")]
    pub default_negative_prompts: String,
    /// Backend model variants callers may request by name.
    #[serde(default)]
    pub available_modules: Vec<String>,
    /// Poll loop timing. Not read from the config file.
    #[serde(skip)]
    pub poll: PollConfig,
}

impl ClientConfig {
    /// Create a config with default prefix, negative prompts and timing.
    pub fn new(api_base_url: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            api_prefix: default_api_prefix(),
            api_secret: api_secret.into(),
            default_negative_prompts: default_negative_prompts(),
            available_modules: Vec::new(),
            poll: PollConfig::default(),
        }
    }

    /// Load a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            SdError::Config(format!("Cannot read config {}: {}", path.display(), e))
        })?;
        let config: ClientConfig = serde_json::from_str(&text)?;
        config.check()?;
        Ok(config)
    }

    /// Set the path prefix.
    pub fn with_api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.api_prefix = prefix.into();
        self
    }

    /// Set the default negative prompts.
    pub fn with_default_negative_prompts(mut self, prompts: impl Into<String>) -> Self {
        self.default_negative_prompts = prompts.into();
        self
    }

    /// Set the module whitelist.
    pub fn with_available_modules<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.available_modules = modules.into_iter().map(Into::into).collect();
        self
    }

    /// Set the poll loop timing.
    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Whether `module` is in the whitelist.
    pub fn is_module_available(&self, module: &str) -> bool {
        self.available_modules.iter().any(|m| m == module)
    }

    fn check(&self) -> Result<()> {
        if self.api_base_url.trim().is_empty() {
            return Err(SdError::Config("api_base_url is empty".into()));
        }
        Ok(())
    }
}

/// Timing and size knobs for the submit/poll protocol.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay before re-querying a pending task.
    pub pending_interval: Duration,
    /// Delay before re-querying a running task.
    pub running_interval: Duration,
    /// Delay after a failed state query.
    pub retry_delay: Duration,
    /// Consecutive network failures tolerated before giving up.
    pub max_network_retries: u32,
    /// Timeout for submission requests.
    pub request_timeout: Duration,
    /// Timeout for state queries, which the backend may hold open.
    pub state_timeout: Duration,
    /// Request bodies longer than this are deflate-compressed.
    pub compress_threshold: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            pending_interval: Duration::from_secs(5),
            running_interval: Duration::from_secs(2),
            retry_delay: Duration::from_secs(1),
            max_network_retries: 5,
            request_timeout: Duration::from_secs(180),
            state_timeout: Duration::from_secs(300),
            compress_threshold: 4096,
        }
    }
}

impl PollConfig {
    /// Zero every delay. Handy for tests and for scripted transports.
    pub fn immediate() -> Self {
        Self {
            pending_interval: Duration::ZERO,
            running_interval: Duration::ZERO,
            retry_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    pub fn with_pending_interval(mut self, interval: Duration) -> Self {
        self.pending_interval = interval;
        self
    }

    pub fn with_running_interval(mut self, interval: Duration) -> Self {
        self.running_interval = interval;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_max_network_retries(mut self, retries: u32) -> Self {
        self.max_network_retries = retries;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_state_timeout(mut self, timeout: Duration) -> Self {
        self.state_timeout = timeout;
        self
    }

    pub fn with_compress_threshold(mut self, bytes: usize) -> Self {
        self.compress_threshold = bytes;
        self
    }
}
