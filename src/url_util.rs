//! Small URL helpers shared by the guard, the codec and the flow handlers.

use http::HeaderMap;
use url::Url;

/// Normalize a URL for comparison by removing its scheme and any trailing
/// slash. Comparison itself is done case-insensitively by the caller.
pub fn undress_url(url: &str) -> String {
    let trimmed = url.trim();
    let without_scheme = match trimmed.find("://") {
        Some(pos) => &trimmed[pos + 3..],
        None => trimmed,
    };
    without_scheme.trim_end_matches('/').to_string()
}

/// Anchor a root-relative path at the given base URL.
pub fn absolutize(url: &str, base: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), url.trim_start_matches('/'))
}

/// Remove a query parameter from a URL, leaving everything else intact.
/// Returns the input unchanged if it does not parse.
pub fn remove_query_arg(url: &str, key: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };

    let remaining: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| k != key)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if remaining.is_empty() {
        parsed.set_query(None);
    } else {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        serializer.extend_pairs(remaining);
        parsed.set_query(Some(&serializer.finish()));
    }

    parsed.to_string()
}

/// Reconstruct the URL the client actually requested.
///
/// The scheme comes from `X-Forwarded-Proto` when a proxy supplied it,
/// falling back to the scheme of the configured base URL. Returns `None`
/// when no host can be determined — the strict-mode guard treats that as an
/// unenforceable precondition.
pub fn current_url(headers: &HeaderMap, path_and_query: &str, base_url: &str) -> Option<String> {
    let host = headers
        .get(http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .filter(|h| !h.is_empty())?;

    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .filter(|s| *s == "http" || *s == "https")
        .map(str::to_string)
        .unwrap_or_else(|| {
            Url::parse(base_url)
                .map(|u| u.scheme().to_string())
                .unwrap_or_else(|_| "http".to_string())
        });

    Some(format!("{}://{}{}", scheme, host, path_and_query))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undress_strips_scheme_and_trailing_slash() {
        assert_eq!(undress_url("https://example.com/auth/"), "example.com/auth");
        assert_eq!(undress_url("http://example.com"), "example.com");
        assert_eq!(undress_url("example.com/auth"), "example.com/auth");
    }

    #[test]
    fn test_absolutize_joins_cleanly() {
        assert_eq!(
            absolutize("/landing", "https://example.com/"),
            "https://example.com/landing"
        );
        assert_eq!(
            absolutize("landing", "https://example.com"),
            "https://example.com/landing"
        );
    }

    #[test]
    fn test_remove_query_arg_keeps_other_params() {
        let url = remove_query_arg("https://example.com/p?mode=selfTest&foo=1", "mode");
        assert_eq!(url, "https://example.com/p?foo=1");
    }

    #[test]
    fn test_remove_query_arg_drops_empty_query() {
        let url = remove_query_arg("https://example.com/p?cb=123", "cb");
        assert_eq!(url, "https://example.com/p");
    }

    #[test]
    fn test_remove_query_arg_passes_through_invalid_input() {
        assert_eq!(remove_query_arg("not a url", "cb"), "not a url");
    }

    #[test]
    fn test_current_url_prefers_forwarded_proto() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::HOST, "example.com".parse().unwrap());
        headers.insert("x-forwarded-proto", "https".parse().unwrap());
        assert_eq!(
            current_url(&headers, "/auth?code=x", "http://internal:8080"),
            Some("https://example.com/auth?code=x".to_string())
        );
    }

    #[test]
    fn test_current_url_requires_host() {
        let headers = HeaderMap::new();
        assert_eq!(current_url(&headers, "/auth", "https://example.com"), None);
    }
}
