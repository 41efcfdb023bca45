//! Pipeline configuration and credential loading.
//!
//! Every field has a serde default, so an empty JSON object is a valid
//! configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::credentials::CredentialPool;
use crate::errors::ConfigError;
use crate::observability::LoggingConfig;
use crate::retry::{JitterStrategy, RetryPolicy};

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Retry limits and backoff.
    #[serde(default)]
    pub retry: RetrySettings,
    /// Overall wall-clock limit for one run, in seconds.
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
    /// Inbound rate limits.
    #[serde(default)]
    pub rate_limits: RateLimitSettings,
    /// Prompt templates.
    #[serde(default)]
    pub prompts: PromptTemplates,
    /// HTTP adapter settings.
    #[serde(default)]
    pub openai: OpenAiSettings,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_deadline_secs() -> u64 {
    300
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retry: RetrySettings::default(),
            deadline_secs: default_deadline_secs(),
            rate_limits: RateLimitSettings::default(),
            prompts: PromptTemplates::default(),
            openai: OpenAiSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Parses and validates a JSON document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw).map_err(|e| ConfigError::Parse {
            path: "<inline>".to_string(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = read_file(path)?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the run deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline_secs = deadline.as_secs();
        self
    }

    /// Returns the run deadline.
    #[must_use]
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    /// Rejects values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.deadline_secs == 0 {
            return Err(invalid("deadline_secs", "must be positive"));
        }
        self.retry.validate()?;
        self.rate_limits.validate()?;
        self.prompts.validate()
    }
}

/// Retry limits for the two external calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Attempts for the text call.
    #[serde(default = "default_text_max_attempts")]
    pub text_max_attempts: u32,
    /// Attempts for the image call.
    #[serde(default = "default_image_max_attempts")]
    pub image_max_attempts: u32,
    /// Fixed backoff for capacity and server faults, in milliseconds.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    /// Jitter on top of the scaled backoff.
    #[serde(default)]
    pub jitter: JitterStrategy,
}

fn default_text_max_attempts() -> u32 {
    5
}

fn default_image_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    2000
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            text_max_attempts: default_text_max_attempts(),
            image_max_attempts: default_image_max_attempts(),
            backoff_ms: default_backoff_ms(),
            jitter: JitterStrategy::default(),
        }
    }
}

impl RetrySettings {
    /// Builds the retry policy.
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(Duration::from_millis(self.backoff_ms)).with_jitter(self.jitter)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.text_max_attempts == 0 {
            return Err(invalid("retry.text_max_attempts", "must be at least 1"));
        }
        if self.image_max_attempts == 0 {
            return Err(invalid("retry.image_max_attempts", "must be at least 1"));
        }
        Ok(())
    }
}

/// Refill rate and burst for one limiter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuotaSettings {
    /// Tokens per second.
    pub per_second: f64,
    /// Bucket capacity.
    pub burst: u32,
}

/// Inbound rate limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Per source address.
    #[serde(default = "default_per_address")]
    pub per_address: QuotaSettings,
    /// Shared across every request on the shared credential pool.
    #[serde(default = "default_shared_credential")]
    pub shared_credential: QuotaSettings,
    /// How often idle entries are swept, in seconds.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Idle time after which an entry is swept, in seconds.
    #[serde(default = "default_idle_expiration_secs")]
    pub idle_expiration_secs: u64,
}

fn default_per_address() -> QuotaSettings {
    QuotaSettings {
        per_second: 20.0,
        burst: 20,
    }
}

fn default_shared_credential() -> QuotaSettings {
    QuotaSettings {
        per_second: 1.0,
        burst: 5,
    }
}

fn default_sweep_interval_secs() -> u64 {
    600
}

fn default_idle_expiration_secs() -> u64 {
    3600
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            per_address: default_per_address(),
            shared_credential: default_shared_credential(),
            sweep_interval_secs: default_sweep_interval_secs(),
            idle_expiration_secs: default_idle_expiration_secs(),
        }
    }
}

impl RateLimitSettings {
    /// Returns the sweep interval.
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Returns the idle expiration window.
    #[must_use]
    pub fn idle_expiration(&self) -> Duration {
        Duration::from_secs(self.idle_expiration_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (field, quota) in [
            ("rate_limits.per_address", &self.per_address),
            ("rate_limits.shared_credential", &self.shared_credential),
        ] {
            if !(quota.per_second > 0.0) || quota.burst == 0 {
                return Err(invalid(field, "per_second and burst must be positive"));
            }
        }
        if self.sweep_interval_secs == 0 {
            return Err(invalid("rate_limits.sweep_interval_secs", "must be positive"));
        }
        Ok(())
    }
}

/// Prompt templates with `{placeholder}` substitution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplates {
    /// System instructions; `{unitSystem}` and `{requirements}`.
    #[serde(default = "default_system_template")]
    pub system: String,
    /// First user message; `{userPrompt}`.
    #[serde(default = "default_user_template")]
    pub user: String,
    /// Follow-up user message for refinement; `{followupPrompt}`.
    #[serde(default = "default_refinement_template")]
    pub refinement: String,
}

fn default_system_template() -> String {
    "You are a culinary assistant producing restaurant quality recipes. Prefer homemade \
     components over packaged ones and suggest wholesome ingredient options where they apply. \
     Ingredient names must not contain units or amounts; those have their own fields. \
     Temperatures and ingredient units must use the {unitSystem} system. Follow these user \
     requirements when relevant, and ignore them if empty or irrelevant: [{requirements}]. \
     Reply only with the recipe."
        .to_string()
}

fn default_user_template() -> String {
    "Consider the following recipe request: [{userPrompt}]. If it is empty or irrelevant, \
     choose something yourself. Do not violate any of the previously stated requirements."
        .to_string()
}

fn default_refinement_template() -> String {
    "Consider the following request, then modify the recipe accordingly: [{followupPrompt}]."
        .to_string()
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            system: default_system_template(),
            user: default_user_template(),
            refinement: default_refinement_template(),
        }
    }
}

impl PromptTemplates {
    fn validate(&self) -> Result<(), ConfigError> {
        if !self.user.contains("{userPrompt}") {
            return Err(invalid("prompts.user", "missing {userPrompt} placeholder"));
        }
        if !self.refinement.contains("{followupPrompt}") {
            return Err(invalid("prompts.refinement", "missing {followupPrompt} placeholder"));
        }
        Ok(())
    }
}

/// Settings for the HTTP generation adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenAiSettings {
    /// API base URL without a trailing slash.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Chat model name.
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    /// Requested image size.
    #[serde(default = "default_image_size")]
    pub image_size: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_chat_model() -> String {
    "gpt-4".to_string()
}

fn default_image_size() -> String {
    "512x512".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            chat_model: default_chat_model(),
            image_size: default_image_size(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl OpenAiSettings {
    /// Sets the base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Gets the request timeout as a Duration.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Deserialize)]
struct CredentialsFile {
    #[serde(default)]
    api_keys: Vec<String>,
}

/// Loads the shared credential pool from `{"api_keys": [...]}`.
pub fn load_credentials(path: impl AsRef<Path>) -> Result<CredentialPool, ConfigError> {
    let path = path.as_ref();
    let raw = read_file(path)?;
    let file: CredentialsFile = serde_json::from_str(&raw).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    CredentialPool::new(file.api_keys)
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}
