//! Canned payloads, errors and pools.

use serde_json::json;

use crate::credentials::{Credential, CredentialPool};
use crate::errors::UpstreamError;

/// Builds a pool from raw keys; an empty or all-blank list yields `sk-test`.
#[must_use]
pub fn pool(keys: &[&str]) -> CredentialPool {
    CredentialPool::new(keys.iter().copied())
        .unwrap_or_else(|_| CredentialPool::single(Credential::new("sk-test")))
}

/// A complete `create_recipe` payload.
#[must_use]
pub fn recipe_json(title: &str, hashtags: &[&str]) -> String {
    json!({
        "title": title,
        "main_recipe": {
            "recipe_name": title,
            "ingredients": [
                {"name": "chicken thighs", "unit": "lb", "amount": 1.5},
                {"name": "carrots", "unit": "pieces", "amount": 3},
                {"name": "salt", "unit": "tsp", "amount": 1}
            ],
            "instructions": [
                "Brown the chicken",
                "Add carrots and water",
                "Simmer for 40 minutes"
            ],
            "time_to_cook": 55
        },
        "sub_recipes": [],
        "image_prompt": format!("A steaming bowl of {title}"),
        "unit_system": "us customary",
        "hashtags": hashtags
    })
    .to_string()
}

/// A credential-rejected error.
#[must_use]
pub fn rejected() -> UpstreamError {
    UpstreamError::status(401, "invalid api key")
}

/// An upstream rate-limit error.
#[must_use]
pub fn overloaded() -> UpstreamError {
    UpstreamError::status(429, "rate limit reached")
}

/// An upstream server fault.
#[must_use]
pub fn server_fault() -> UpstreamError {
    UpstreamError::status(500, "internal error")
}
