//! Core domain types for recipe generation.
//!
//! This module contains:
//! - Generation stage enum
//! - Record, history and identifier types
//! - The structured recipe payload and its versioned stored form
//! - The per-run generation request

mod recipe;
mod record;
mod request;
mod status;

pub use recipe::{
    EncodedBody, Ingredient, RecipeBody, RecipeDef, RecipeSection, UnitSystem,
    BODY_FORMAT_VERSION,
};
pub use record::{AccountId, ContentRecord, HistoryEntry, HistoryId, RecordId, TagId};
pub use request::{CredentialClass, GenerationMode, GenerationRequest};
pub use status::GenerationStage;
