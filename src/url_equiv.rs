//! URL equivalence helper (spec.md §4.9), used by the event collector to
//! decide whether a `redirectResponse` URL refers to "the same" resource as
//! the page URL for the purposes of redirect detection.

use url::Url;

fn strip_fragment(s: &str) -> &str {
    match s.find('#') {
        Some(idx) => &s[..idx],
        None => s,
    }
}

fn percent_decode(s: &str) -> String {
    percent_encoding::percent_decode_str(s)
        .decode_utf8_lossy()
        .into_owned()
}

/// Two URLs are "same for redirect purposes" iff, after stripping any
/// `#fragment`, they are byte-equal, OR they percent-decode to byte-equal
/// strings, OR their parsed forms have equal scheme, case-insensitive host,
/// equal query string, and equal path after normalizing empty path to `/`.
pub fn urls_equivalent(a: &str, b: &str) -> bool {
    let a_no_frag = strip_fragment(a);
    let b_no_frag = strip_fragment(b);

    if a_no_frag == b_no_frag {
        return true;
    }

    if percent_decode(a_no_frag) == percent_decode(b_no_frag) {
        return true;
    }

    match (Url::parse(a_no_frag), Url::parse(b_no_frag)) {
        (Ok(ua), Ok(ub)) => {
            let path_a = normalize_path(ua.path());
            let path_b = normalize_path(ub.path());
            ua.scheme() == ub.scheme()
                && ua.host_str().map(str::to_lowercase) == ub.host_str().map(str::to_lowercase)
                && ua.query() == ub.query()
                && path_a == path_b
        }
        _ => false,
    }
}

fn normalize_path(path: &str) -> &str {
    if path.is_empty() {
        "/"
    } else {
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_equal_after_fragment_strip() {
        assert!(urls_equivalent(
            "https://example.com/page#a",
            "https://example.com/page#b"
        ));
    }

    #[test]
    fn percent_decoded_equal() {
        assert!(urls_equivalent(
            "https://example.com/a%20b",
            "https://example.com/a b"
        ));
    }

    #[test]
    fn normalized_forms_equal_empty_path_is_slash() {
        assert!(urls_equivalent("https://Example.com", "https://example.com/"));
    }

    #[test]
    fn different_hosts_not_equivalent() {
        assert!(!urls_equivalent(
            "https://example.com/page",
            "https://other.com/page"
        ));
    }

    #[test]
    fn different_query_not_equivalent() {
        assert!(!urls_equivalent(
            "https://example.com/page?x=1",
            "https://example.com/page?x=2"
        ));
    }
}
