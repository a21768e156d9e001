use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

static MENTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@([A-Za-z0-9_]+)").expect("mention pattern is valid"));

/// `@token` names in a body, deduplicated, in first-seen order.
pub fn extract_mention_tokens(body: &str) -> Vec<&str> {
    let mut tokens: Vec<&str> = Vec::new();
    for caps in MENTION_RE.captures_iter(body) {
        if let Some(m) = caps.get(1) {
            if !tokens.contains(&m.as_str()) {
                tokens.push(m.as_str());
            }
        }
    }
    tokens
}

/// Resolve mention tokens to user ids with `lookup`. Unknown names and
/// failed lookups are skipped.
pub fn resolve_mentions<F>(body: &str, mut lookup: F) -> Vec<i64>
where
    F: FnMut(&str) -> anyhow::Result<Option<i64>>,
{
    let mut ids = Vec::new();
    for token in extract_mention_tokens(body) {
        match lookup(token) {
            Ok(Some(id)) if !ids.contains(&id) => ids.push(id),
            Ok(_) => {}
            Err(e) => debug!("Mention lookup for @{} failed: {}", token, e),
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory(name: &str) -> anyhow::Result<Option<i64>> {
        Ok(match name {
            "alice" => Some(11),
            "bob" => Some(22),
            _ => None,
        })
    }

    #[test]
    fn resolves_known_users_in_order() {
        let ids = resolve_mentions("hello @alice and @bob, @unknownuser", directory);
        assert_eq!(ids, vec![11, 22]);
    }

    #[test]
    fn first_seen_order_and_dedup() {
        let ids = resolve_mentions("@bob @alice @bob @alice", directory);
        assert_eq!(ids, vec![22, 11]);
    }

    #[test]
    fn match_is_case_sensitive() {
        assert!(resolve_mentions("@Alice @BOB", directory).is_empty());
    }

    #[test]
    fn tokens_stop_at_non_word_characters() {
        assert_eq!(extract_mention_tokens("<p>@alice</p>@bob."), vec!["alice", "bob"]);
        assert!(extract_mention_tokens("@ alone").is_empty());
    }

    #[test]
    fn lookup_failures_are_skipped() {
        let ids = resolve_mentions("@alice @bob", |name| {
            if name == "alice" { anyhow::bail!("db offline") } else { directory(name) }
        });
        assert_eq!(ids, vec![22]);
    }
}
