//! External generation services.
//!
//! [`TextGenerator`] and [`ImageGenerator`] make exactly one attempt each;
//! retry, rotation and backoff belong to [`crate::retry::RetryingClient`].

#[cfg(feature = "openai")]
mod openai;
mod traits;

#[cfg(feature = "openai")]
pub use openai::OpenAiClient;
pub use traits::{GeneratedImage, ImageGenerator, TextCompletion, TextGenerator};
