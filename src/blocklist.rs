//! Request-intercept denial policy (spec.md §4.1).
//!
//! Generalizes the corpus's domain/substring `RequestInterceptor` into a
//! proper wildcard glob matcher, since the builtin pattern groups below use
//! `*`-delimited globs rather than bare substrings.

use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct Blocklist {
    patterns: Vec<String>,
    blocked_types: HashSet<String>,
}

const ANALYTICS_PATTERNS: &[&str] = &[
    "*google-analytics.com*",
    "*googletagmanager.com*",
    "*hotjar.com*",
    "*mixpanel.com*",
    "*segment.com*",
    "*segment.io*",
];

const ADS_PATTERNS: &[&str] = &[
    "*doubleclick.net*",
    "*googlesyndication.com*",
    "*googleadservices.com*",
    "*adnxs.com*",
    "*amazon-adsystem.com*",
];

const SOCIAL_PATTERNS: &[&str] = &[
    "*facebook.com/tr*",
    "*connect.facebook.net*",
    "*platform.twitter.com*",
    "*widgets.pinterest.com*",
];

impl Blocklist {
    pub fn new(
        block_analytics: bool,
        block_ads: bool,
        block_social: bool,
        blocked_types: HashSet<String>,
    ) -> Self {
        let mut patterns = Vec::new();
        if block_analytics {
            patterns.extend(ANALYTICS_PATTERNS.iter().map(|p| p.to_string()));
        }
        if block_ads {
            patterns.extend(ADS_PATTERNS.iter().map(|p| p.to_string()));
        }
        if block_social {
            patterns.extend(SOCIAL_PATTERNS.iter().map(|p| p.to_string()));
        }
        let blocked_types = blocked_types.into_iter().map(|t| t.to_lowercase()).collect();
        Self {
            patterns,
            blocked_types,
        }
    }

    /// `true` iff the lowercased `resource_type` is in the blocked-types set,
    /// else `true` iff any pattern matches the lowercased `url`, else
    /// `false`. A default (empty) blocklist never blocks.
    pub fn should_block(&self, url: &str, resource_type: &str) -> bool {
        if self.blocked_types.contains(&resource_type.to_lowercase()) {
            return true;
        }
        let url_lower = url.to_lowercase();
        self.patterns
            .iter()
            .any(|pattern| wildcard_match(pattern, &url_lower))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty() && self.blocked_types.is_empty()
    }
}

/// `*` matches any (possibly empty) substring; matching is case-insensitive
/// on both sides (callers are expected to already have lowercased both, but
/// this function lowercases again to stay total on its own).
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern = pattern.to_lowercase();
    let text = text.to_lowercase();

    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let mut cursor = 0usize;
    let leading = parts[0];
    if !leading.is_empty() {
        if !text[cursor..].starts_with(leading) {
            return false;
        }
        cursor += leading.len();
    }

    let trailing = parts[parts.len() - 1];
    let middle = &parts[1..parts.len() - 1];

    for part in middle {
        if part.is_empty() {
            continue;
        }
        match text[cursor..].find(part) {
            Some(pos) => cursor += pos + part.len(),
            None => return false,
        }
    }

    if !trailing.is_empty() {
        if !text[cursor..].ends_with(trailing) {
            return false;
        }
        // make sure the trailing match doesn't overlap consumed middle matches
        if text.len() - trailing.len() < cursor {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_blocklist_never_blocks() {
        let bl = Blocklist::default();
        assert!(bl.is_empty());
        assert!(!bl.should_block("https://google-analytics.com/collect", "script"));
    }

    #[test]
    fn blocks_by_resource_type() {
        let mut types = HashSet::new();
        types.insert("image".to_string());
        let bl = Blocklist::new(false, false, false, types);
        assert!(bl.should_block("https://example.com/logo.png", "Image"));
        assert!(!bl.should_block("https://example.com/app.js", "script"));
    }

    #[test]
    fn blocks_by_builtin_analytics_pattern() {
        let bl = Blocklist::new(true, false, false, HashSet::new());
        assert!(bl.should_block("https://www.google-analytics.com/collect", "script"));
        assert!(!bl.should_block("https://example.com/app.js", "script"));
    }

    #[test]
    fn wildcard_prefix_suffix_and_internal_order() {
        assert!(wildcard_match("foo*bar", "fooXXXbar"));
        assert!(!wildcard_match("foo*bar", "barXXXfoo"));
        assert!(wildcard_match("*bar*", "xxxbarxxx"));
        assert!(wildcard_match("foo*baz*bar", "foo123baz456bar"));
        assert!(!wildcard_match("foo*baz*bar", "foo123bar456baz"));
    }

    #[test]
    fn wildcard_match_is_case_insensitive() {
        assert!(wildcard_match("*GOOGLE*", "www.google.com"));
        assert_eq!(
            wildcard_match("*Foo*", "FOOBAR"),
            wildcard_match(&"*foo*".to_lowercase(), &"foobar".to_lowercase())
        );
    }

    #[test]
    fn round_trip_equal_inputs_produce_equal_behavior() {
        let mut types = HashSet::new();
        types.insert("image".to_string());
        let a = Blocklist::new(true, true, false, types.clone());
        let b = Blocklist::new(true, true, false, types);
        assert_eq!(a.should_block("https://doubleclick.net/x", "script"), true);
        assert_eq!(
            a.should_block("https://doubleclick.net/x", "script"),
            b.should_block("https://doubleclick.net/x", "script")
        );
    }
}
