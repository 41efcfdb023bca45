//! HTTP adapter for OpenAI-compatible chat and image endpoints.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::config::OpenAiSettings;
use crate::credentials::Credential;
use crate::errors::{ConfigError, UpstreamError};
use crate::prompts::{ChatTurn, TextRequest};

use super::traits::{GeneratedImage, ImageGenerator, TextCompletion, TextGenerator};

/// Client for the chat-completions and image-generation endpoints.
///
/// Each call authenticates with the credential it is given, so one client
/// serves every credential in a pool.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    settings: OpenAiSettings,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall<'a>>,
}

#[derive(Serialize)]
struct FunctionCall<'a> {
    name: &'a str,
    arguments: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    function_call: Option<ResponseFunctionCall>,
}

#[derive(Deserialize)]
struct ResponseFunctionCall {
    #[serde(default)]
    arguments: String,
}

#[derive(Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Deserialize)]
struct ImageData {
    #[serde(default)]
    b64_json: String,
}

impl OpenAiClient {
    /// Creates a client from settings.
    pub fn new(settings: OpenAiSettings) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| ConfigError::Invalid {
                field: "openai",
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client, settings })
    }

    /// Returns the settings in use.
    #[must_use]
    pub fn settings(&self) -> &OpenAiSettings {
        &self.settings
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.settings.base_url.trim_end_matches('/'))
    }

    async fn post_json(
        &self,
        credential: &Credential,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<String, UpstreamError> {
        let response = self
            .client
            .post(self.endpoint(path))
            .bearer_auth(credential.expose())
            .json(body)
            .send()
            .await
            .map_err(|e| UpstreamError::network(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        debug!(status = %status, path, credential = %credential, "Response received");

        let text = response
            .text()
            .await
            .map_err(|e| UpstreamError::network(format!("failed to read response body: {e}")))?;

        if status.is_success() {
            Ok(text)
        } else {
            Err(UpstreamError::status(status.as_u16(), text))
        }
    }
}

fn chat_messages(request: &TextRequest) -> Vec<ChatMessage<'_>> {
    request
        .messages
        .iter()
        .map(|turn| match turn {
            ChatTurn::System { content } => ChatMessage {
                role: "system",
                content: Some(content),
                function_call: None,
            },
            ChatTurn::User { content } => ChatMessage {
                role: "user",
                content: Some(content),
                function_call: None,
            },
            ChatTurn::Assistant { name, arguments } => ChatMessage {
                role: "assistant",
                content: None,
                function_call: Some(FunctionCall { name, arguments }),
            },
        })
        .collect()
}

#[async_trait]
impl TextGenerator for OpenAiClient {
    async fn generate_text(
        &self,
        credential: &Credential,
        request: &TextRequest,
    ) -> Result<TextCompletion, UpstreamError> {
        let body = json!({
            "model": self.settings.chat_model,
            "messages": chat_messages(request),
            "functions": [{
                "name": request.function_name,
                "parameters": request.schema,
            }],
            "function_call": {"name": request.function_name},
        });

        let text = self.post_json(credential, "chat/completions", &body).await?;
        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| UpstreamError::malformed(format!("failed to parse chat response: {e}")))?;

        let arguments = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.function_call)
            .map(|call| call.arguments)
            .unwrap_or_default();

        if arguments.trim().is_empty() {
            return Err(UpstreamError::empty("chat response carried no function call"));
        }
        Ok(TextCompletion::new(arguments))
    }
}

#[async_trait]
impl ImageGenerator for OpenAiClient {
    async fn generate_image(
        &self,
        credential: &Credential,
        prompt: &str,
    ) -> Result<GeneratedImage, UpstreamError> {
        let body = json!({
            "prompt": prompt,
            "n": 1,
            "size": self.settings.image_size,
            "response_format": "b64_json",
        });

        let text = self.post_json(credential, "images/generations", &body).await?;
        let parsed: ImageResponse = serde_json::from_str(&text)
            .map_err(|e| UpstreamError::malformed(format!("failed to parse image response: {e}")))?;

        let encoded = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.b64_json)
            .unwrap_or_default();
        if encoded.is_empty() {
            return Err(UpstreamError::empty("image response carried no data"));
        }

        let bytes = BASE64
            .decode(encoded.as_bytes())
            .map_err(|e| UpstreamError::malformed(format!("invalid base64 image: {e}")))?;
        if bytes.is_empty() {
            return Err(UpstreamError::empty("decoded image is empty"));
        }
        Ok(GeneratedImage::new(bytes))
    }
}
