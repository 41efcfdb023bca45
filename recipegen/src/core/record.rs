//! Persisted record types and their identifiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::recipe::EncodedBody;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Returns the raw identifier.
            #[must_use]
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

id_type!(
    /// Identifier of a content record.
    RecordId
);
id_type!(
    /// Identifier of the requesting account.
    AccountId
);
id_type!(
    /// Identifier of a tag row.
    TagId
);
id_type!(
    /// Identifier of the history collection a record appends to.
    HistoryId
);

/// One prompt/response exchange. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// The prompt sent to the text service.
    pub prompt: String,
    /// The raw structured payload that came back.
    pub response: String,
    /// When the exchange was recorded.
    pub created_at: DateTime<Utc>,
}

impl HistoryEntry {
    /// Creates an entry stamped with the current time.
    #[must_use]
    pub fn new(prompt: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            response: response.into(),
            created_at: Utc::now(),
        }
    }
}

/// A generated item as held by the data store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    /// Record identifier.
    pub id: RecordId,
    /// The requesting account.
    pub owner: AccountId,
    /// The prompt the record was drafted from.
    pub prompt: String,
    /// Title, set by core persistence.
    pub title: Option<String>,
    /// Versioned body, set by core persistence.
    pub body: Option<EncodedBody>,
    /// Where the image lives, set after upload.
    pub image_location: Option<String>,
    /// Associated tags.
    pub tags: Vec<TagId>,
    /// True once every stage has committed.
    pub completed: bool,
    /// The record's history collection.
    pub history: HistoryId,
}

impl ContentRecord {
    /// Creates a draft with nothing generated yet.
    #[must_use]
    pub fn draft(id: RecordId, owner: AccountId, prompt: impl Into<String>, history: HistoryId) -> Self {
        Self {
            id,
            owner,
            prompt: prompt.into(),
            title: None,
            body: None,
            image_location: None,
            tags: Vec::new(),
            completed: false,
            history,
        }
    }

    /// Returns true if a non-empty body has been stored.
    #[must_use]
    pub fn has_body(&self) -> bool {
        self.body.as_ref().is_some_and(|b| !b.is_empty())
    }

    /// Returns true if a non-empty image location has been stored.
    #[must_use]
    pub fn has_image(&self) -> bool {
        self.image_location.as_ref().is_some_and(|l| !l.is_empty())
    }

    /// Returns true if the record may be marked complete.
    #[must_use]
    pub fn is_fully_populated(&self) -> bool {
        self.has_body() && self.has_image()
    }
}
