//! Tag normalization and resolution.

use futures::future::try_join_all;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::core::TagId;
use crate::errors::StoreError;
use crate::store::PersistenceGateway;

#[allow(clippy::expect_used)]
static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s\-_.]+").expect("separator pattern is valid"));

/// Normalizes a raw tag name.
///
/// Lowercases, removes whitespace and separator characters, and strips
/// leading `#` markers. Returns `None` if nothing is left.
#[must_use]
pub fn normalize_tag(raw: &str) -> Option<String> {
    let lowered = raw.to_lowercase();
    let joined = SEPARATORS.replace_all(&lowered, "");
    let stripped = joined.trim_start_matches('#');
    if stripped.is_empty() {
        None
    } else {
        Some(stripped.to_string())
    }
}

/// Normalizes and deduplicates raw names, keeping first-seen order.
#[must_use]
pub fn normalize_all<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.iter()
        .filter_map(|name| normalize_tag(name.as_ref()))
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

/// Looks up or creates every tag, returning the resolved set.
///
/// Names are normalized and deduplicated first, so the concurrent lookups
/// never race to create the same tag.
pub async fn resolve_tags<S: AsRef<str>>(
    gateway: &dyn PersistenceGateway,
    raw: &[S],
) -> Result<Vec<TagId>, StoreError> {
    let names = normalize_all(raw);
    let resolved = try_join_all(names.iter().map(|name| gateway.find_or_create_tag(name))).await?;

    let mut ids = Vec::with_capacity(resolved.len());
    for id in resolved {
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_normalize_tag() {
        assert_eq!(normalize_tag("Soup").as_deref(), Some("soup"));
        assert_eq!(normalize_tag("#ComfortFood").as_deref(), Some("comfortfood"));
        assert_eq!(normalize_tag("  grass fed ").as_deref(), Some("grassfed"));
        assert_eq!(normalize_tag("gluten-free").as_deref(), Some("glutenfree"));
        assert_eq!(normalize_tag("one_pot").as_deref(), Some("onepot"));
        assert_eq!(normalize_tag("# Soup").as_deref(), Some("soup"));
        assert_eq!(normalize_tag("##"), None);
        assert_eq!(normalize_tag("   "), None);
    }

    #[test]
    fn test_normalize_all_dedups_variants() {
        let raw = ["Soup", "#soup", "SOUP", "chicken", "Chicken "];
        assert_eq!(normalize_all(&raw), vec!["soup", "chicken"]);
    }

    #[tokio::test]
    async fn test_resolve_reuses_existing_tags() {
        let store = InMemoryStore::new();
        let first = resolve_tags(&store, &["Soup", "chicken"]).await.unwrap();
        let second = resolve_tags(&store, &["#soup", "Chicken"]).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.tag_count(), 2);
    }
}
