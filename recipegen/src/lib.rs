//! # Recipegen
//!
//! An asynchronous recipe generation pipeline.
//!
//! A request drafts a content record and returns at once; a detached,
//! deadline-bound run then fills the record in:
//!
//! - **Text generation**: a structured recipe from a prompt, unit system and requirements
//! - **Core persistence**: title, versioned body and a history entry in one transaction
//! - **Tagging**: normalized, deduplicated tags replacing the previous set
//! - **Image generation and upload**: an illustration stored under a deterministic key
//! - **Finalization**: the completion flag, written last and only after every stage committed
//!
//! External calls go through a bounded retry loop that rotates through a
//! credential pool on rejection and backs off on capacity errors. Inbound
//! requests pass a per-address limiter and, for the shared credential, a
//! global one.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use recipegen::prelude::*;
//!
//! let config = PipelineConfig::from_json_file("recipegen.json")?;
//! let pool = Arc::new(load_credentials("keys.json")?);
//! let client = Arc::new(OpenAiClient::new(config.openai.clone())?);
//!
//! let orchestrator = GenerationOrchestrator::new(store, objects, client.clone(), client, pool)
//!     .with_config(&config)
//!     .with_events(Arc::new(LoggingEventSink::default()));
//! let launcher = GenerationLauncher::new(Arc::new(orchestrator), config.deadline());
//! let limiters = Limiters::from_settings(&config.rate_limits);
//! let service = GenerationService::new(store, limiters.gate(), launcher);
//!
//! let record = service.submit(addr, owner, GenerationRequest::new("chicken soup")).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod core;
pub mod credentials;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod prompts;
pub mod providers;
pub mod ratelimit;
pub mod retry;
pub mod service;
pub mod store;
pub mod tagging;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{load_credentials, PipelineConfig, PromptTemplates, RetrySettings};
    pub use crate::core::{
        AccountId, ContentRecord, CredentialClass, GenerationMode, GenerationRequest,
        GenerationStage, RecipeDef, RecordId, UnitSystem,
    };
    pub use crate::credentials::{Credential, CredentialPool, CredentialSource};
    pub use crate::errors::{
        AdmissionError, ConfigError, GenerationError, StoreError, SubmitError, UpstreamError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::observability::{init_tracing, LoggingConfig};
    pub use crate::pipeline::{GenerationLauncher, GenerationOrchestrator, RunReport};
    #[cfg(feature = "openai")]
    pub use crate::providers::OpenAiClient;
    pub use crate::providers::{ImageGenerator, TextGenerator};
    pub use crate::ratelimit::{AdmissionGate, Limiters};
    pub use crate::retry::{RetryPolicy, RetryingClient};
    pub use crate::service::GenerationService;
    pub use crate::store::{
        InMemoryObjectStorage, InMemoryStore, LocalObjectStorage, ObjectStorage, PersistenceGateway,
    };
}
