//! One-attempt interfaces to the external generation services.

use async_trait::async_trait;

use crate::credentials::Credential;
use crate::errors::UpstreamError;
use crate::prompts::TextRequest;
use crate::retry::CallOutput;

/// The structured reply of a text-generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextCompletion {
    /// Raw JSON arguments of the `create_recipe` call.
    pub arguments: String,
}

impl TextCompletion {
    /// Wraps raw arguments.
    #[must_use]
    pub fn new(arguments: impl Into<String>) -> Self {
        Self {
            arguments: arguments.into(),
        }
    }
}

impl CallOutput for TextCompletion {
    fn is_empty_output(&self) -> bool {
        self.arguments.trim().is_empty()
    }
}

/// Raw bytes of a generated image.
#[derive(Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    /// Encoded image data.
    pub bytes: Vec<u8>,
}

impl GeneratedImage {
    /// Wraps image bytes.
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

impl std::fmt::Debug for GeneratedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratedImage")
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl CallOutput for GeneratedImage {
    fn is_empty_output(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Makes one text-generation attempt with the given credential.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Sends the request and returns the structured reply.
    async fn generate_text(
        &self,
        credential: &Credential,
        request: &TextRequest,
    ) -> Result<TextCompletion, UpstreamError>;
}

/// Makes one image-generation attempt with the given credential.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Generates an image for `prompt`.
    async fn generate_image(
        &self,
        credential: &Credential,
        prompt: &str,
    ) -> Result<GeneratedImage, UpstreamError>;
}
