//! URL canonicalisation for result deduplication.
//!
//! Two providers rarely report the same page with the same bytes: casing,
//! default ports, trailing slashes, tracking parameters, and fragments
//! all vary. Canonicalising before comparison lets equivalent pages
//! compare equal.

use url::Url;

/// Tracking query parameters stripped during canonicalisation. Compared
/// case-insensitively against lowercased keys.
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "utm_id",
    "fbclid",
    "gclid",
    "msclkid",
    "igshid",
    "mc_cid",
    "mc_eid",
    "ref",
    "ref_src",
    "si",
    "feature",
];

/// Canonicalise a URL for comparison.
///
/// Transformations, in order:
///
/// 1. Drop the fragment.
/// 2. Drop default ports (`:80` for HTTP, `:443` for HTTPS).
/// 3. Strip known tracking parameters; sort the survivors by key then
///    value so parameter order is irrelevant.
/// 4. Drop a trailing slash unless the path is exactly `/`.
///
/// Scheme and host are lowercased by the parser itself. Unparseable
/// input is returned unchanged — a malformed URL still deduplicates
/// against byte-identical copies of itself.
pub fn canonical_url(raw: &str) -> String {
    let Ok(mut parsed) = Url::parse(raw) else {
        return raw.to_string();
    };

    parsed.set_fragment(None);

    if is_default_port(&parsed) {
        let _ = parsed.set_port(None);
    }

    let mut params: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| !TRACKING_PARAMS.contains(&key.to_lowercase().as_str()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    params.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    if params.is_empty() {
        parsed.set_query(None);
    } else {
        let query: String = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        parsed.set_query(Some(&query));
    }

    let path = parsed.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        parsed.set_path(&path[..path.len() - 1]);
    }

    parsed.to_string()
}

fn is_default_port(url: &Url) -> bool {
    matches!(
        (url.scheme(), url.port()),
        ("http", Some(80)) | ("https", Some(443))
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_scheme_and_host() {
        assert_eq!(
            canonical_url("HTTPS://Example.COM/Path"),
            "https://example.com/Path"
        );
    }

    #[test]
    fn path_case_is_preserved() {
        assert_eq!(
            canonical_url("https://example.com/CaseSensitive"),
            "https://example.com/CaseSensitive"
        );
    }

    #[test]
    fn strips_default_ports() {
        assert_eq!(
            canonical_url("http://example.com:80/a"),
            "http://example.com/a"
        );
        assert_eq!(
            canonical_url("https://example.com:443/a"),
            "https://example.com/a"
        );
        assert_eq!(
            canonical_url("https://example.com:8443/a"),
            "https://example.com:8443/a"
        );
    }

    #[test]
    fn strips_trailing_slash_but_keeps_root() {
        assert_eq!(
            canonical_url("https://example.com/docs/"),
            "https://example.com/docs"
        );
        assert_eq!(canonical_url("https://example.com/"), "https://example.com/");
    }

    #[test]
    fn drops_fragment() {
        assert_eq!(
            canonical_url("https://example.com/page#install"),
            "https://example.com/page"
        );
    }

    #[test]
    fn strips_tracking_params_keeps_real_ones() {
        assert_eq!(
            canonical_url("https://example.com/p?q=rust&utm_source=x&gclid=1&mc_cid=2"),
            "https://example.com/p?q=rust"
        );
    }

    #[test]
    fn tracking_param_match_is_case_insensitive() {
        assert_eq!(
            canonical_url("https://example.com/p?q=1&UTM_Source=x"),
            "https://example.com/p?q=1"
        );
    }

    #[test]
    fn sorts_query_params() {
        assert_eq!(
            canonical_url("https://example.com/s?z=1&a=2&m=3"),
            "https://example.com/s?a=2&m=3&z=1"
        );
    }

    #[test]
    fn equivalent_urls_collapse() {
        let a = canonical_url("https://Example.COM/path/?b=2&a=1&utm_medium=email#frag");
        let b = canonical_url("https://example.com/path?a=1&b=2");
        assert_eq!(a, b);
    }

    #[test]
    fn unparseable_input_unchanged() {
        assert_eq!(canonical_url("not a url"), "not a url");
        assert_eq!(canonical_url(""), "");
    }

    #[test]
    fn all_params_tracking_leaves_no_query() {
        assert_eq!(
            canonical_url("https://example.com/p?utm_source=a&fbclid=b&ref=c"),
            "https://example.com/p"
        );
    }
}
