//! Scripted collaborators for testing runs.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

use crate::credentials::Credential;
use crate::errors::UpstreamError;
use crate::prompts::TextRequest;
use crate::providers::{GeneratedImage, ImageGenerator, TextCompletion, TextGenerator};
use crate::ratelimit::RateLimiter;

/// Replies handed out in order; an exhausted script fails with a network error.
#[derive(Debug)]
struct Script<T> {
    replies: Mutex<VecDeque<Result<T, UpstreamError>>>,
    credentials: Mutex<Vec<String>>,
    delay: Mutex<Option<Duration>>,
}

impl<T> Default for Script<T> {
    fn default() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            credentials: Mutex::new(Vec::new()),
            delay: Mutex::new(None),
        }
    }
}

impl<T> Script<T> {
    fn push(&self, reply: Result<T, UpstreamError>) {
        self.replies.lock().push_back(reply);
    }

    async fn next(&self, credential: &Credential) -> Result<T, UpstreamError> {
        self.credentials.lock().push(credential.expose().to_string());
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(UpstreamError::network("script exhausted")))
    }

    fn credentials(&self) -> Vec<String> {
        self.credentials.lock().clone()
    }
}

/// A text generator that replays queued replies.
#[derive(Debug, Default)]
pub struct ScriptedTextGenerator {
    script: Script<TextCompletion>,
    requests: Mutex<Vec<TextRequest>>,
}

impl ScriptedTextGenerator {
    /// Creates a generator with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a successful reply carrying `arguments`.
    pub fn push_ok(&self, arguments: impl Into<String>) {
        self.script.push(Ok(TextCompletion::new(arguments)));
    }

    /// Queues a failure.
    pub fn push_err(&self, error: UpstreamError) {
        self.script.push(Err(error));
    }

    /// Makes every call wait `delay` before replying.
    pub fn set_delay(&self, delay: Duration) {
        *self.script.delay.lock() = Some(delay);
    }

    /// Returns how many attempts were made.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.script.credentials().len()
    }

    /// Returns the raw credential used by each attempt, in order.
    #[must_use]
    pub fn credentials_seen(&self) -> Vec<String> {
        self.script.credentials()
    }

    /// Returns every request received, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<TextRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedTextGenerator {
    async fn generate_text(
        &self,
        credential: &Credential,
        request: &TextRequest,
    ) -> Result<TextCompletion, UpstreamError> {
        self.requests.lock().push(request.clone());
        self.script.next(credential).await
    }
}

/// An image generator that replays queued replies.
#[derive(Debug, Default)]
pub struct ScriptedImageGenerator {
    script: Script<GeneratedImage>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedImageGenerator {
    /// Creates a generator with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a successful reply.
    pub fn push_ok(&self, bytes: Vec<u8>) {
        self.script.push(Ok(GeneratedImage::new(bytes)));
    }

    /// Queues the same failure `times` times.
    pub fn push_err_times(&self, error: &UpstreamError, times: usize) {
        for _ in 0..times {
            self.script.push(Err(error.clone()));
        }
    }

    /// Makes every call wait `delay` before replying.
    pub fn set_delay(&self, delay: Duration) {
        *self.script.delay.lock() = Some(delay);
    }

    /// Returns how many attempts were made.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.script.credentials().len()
    }

    /// Returns the raw credential used by each attempt, in order.
    #[must_use]
    pub fn credentials_seen(&self) -> Vec<String> {
        self.script.credentials()
    }

    /// Returns every prompt received.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl ImageGenerator for ScriptedImageGenerator {
    async fn generate_image(&self, credential: &Credential, prompt: &str) -> Result<GeneratedImage, UpstreamError> {
        self.prompts.lock().push(prompt.to_string());
        self.script.next(credential).await
    }
}

/// A rate limiter with a fixed answer.
#[derive(Debug, Clone, Copy)]
pub struct FixedRateLimiter {
    allow: bool,
}

impl FixedRateLimiter {
    /// Admits everything.
    #[must_use]
    pub fn allow() -> Self {
        Self { allow: true }
    }

    /// Rejects everything.
    #[must_use]
    pub fn deny() -> Self {
        Self { allow: false }
    }
}

impl RateLimiter for FixedRateLimiter {
    fn check(&self, _key: &str) -> bool {
        self.allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_replays_in_order_then_fails() {
        let text = ScriptedTextGenerator::new();
        text.push_err(UpstreamError::status(401, "bad key"));
        text.push_ok("{}");
        let request = TextRequest {
            messages: Vec::new(),
            function_name: "f".into(),
            schema: serde_json::Value::Null,
        };

        assert!(text.generate_text(&"a".into(), &request).await.is_err());
        assert_eq!(text.generate_text(&"b".into(), &request).await.unwrap().arguments, "{}");
        let err = text.generate_text(&"c".into(), &request).await.unwrap_err();

        assert!(err.message.contains("exhausted"));
        assert_eq!(text.credentials_seen(), vec!["a", "b", "c"]);
        assert_eq!(text.requests().len(), 3);
    }

    #[test]
    fn test_fixed_limiter() {
        assert!(FixedRateLimiter::allow().check("x"));
        assert!(!FixedRateLimiter::deny().check("x"));
    }
}
