//! State-URL codec.
//!
//! The `state` (OIDC) / `RelayState` (SAML) parameter round-trips two things
//! through the identity provider: the caller's post-login redirect target and
//! a handful of internal routing parameters appended at initiation time
//! (`mode`, `tfp`, `idp_id`, `pkce_code_challenge_id`). Decoding extracts the
//! internal parameters into the request context and returns the cleaned
//! absolute URL; the cleaned URL never contains any of the internal keys.

use url::Url;

use crate::{error::RouterError, request::{AuthMode, RequestContext}, url_util};

/// Internal parameters embedded in the state URL at initiation time and
/// stripped again on the way back.
const INTERNAL_PARAMS: [&str; 4] = ["mode", "tfp", "idp_id", "pkce_code_challenge_id"];

/// Stand-in for `#` while the URL is being parsed. URL parsing truncates the
/// query at a fragment, but a relay target may legitimately carry one (SPA
/// hash routing), so the fragment is hidden during parsing and restored after.
const FRAGMENT_SENTINEL: &str = "__gh_frag__";

/// Decode and validate a raw state URL.
///
/// Returns the cleaned absolute http(s) URL with all internal parameters
/// removed, and writes any internal parameter values into `ctx`. Fails with
/// [`RouterError::InvalidStateUrl`] when the input does not resolve to a
/// well-formed absolute http(s) URL; callers must abort the flow and must
/// not redirect based on the rejected value.
pub fn decode_state(
    raw: &str,
    ctx: &mut RequestContext,
    base_url: &str,
) -> Result<String, RouterError> {
    let decoded = urlencoding::decode(raw).map_err(|_| RouterError::InvalidStateUrl)?;
    let sanitized = sanitize_redirect(&decoded);
    let mut url = sanitized.replace('#', FRAGMENT_SENTINEL);

    if url.starts_with('/') {
        url = url_util::absolutize(&url, base_url);
    }

    if !url.get(..4).is_some_and(|p| p.eq_ignore_ascii_case("http")) {
        return Err(RouterError::InvalidStateUrl);
    }

    let mut parsed = Url::parse(&url).map_err(|_| RouterError::InvalidStateUrl)?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(RouterError::InvalidStateUrl);
    }
    if parsed.host_str().is_none() {
        return Err(RouterError::InvalidStateUrl);
    }

    // A fragment that followed the query is hidden inside the last pair's
    // value at this point. Detach it so it neither pollutes an extracted
    // value nor gets stripped along with an internal parameter.
    let mut trailing = String::new();
    let detached = parsed.query().and_then(|query| {
        query
            .find(FRAGMENT_SENTINEL)
            .map(|pos| (query[..pos].to_string(), query[pos..].to_string()))
    });
    if let Some((head, tail)) = detached {
        trailing = tail;
        parsed.set_query(if head.is_empty() { None } else { Some(&head) });
    }

    for (key, value) in parsed.query_pairs() {
        match key.as_ref() {
            "mode" => ctx.mode = AuthMode::parse(&value),
            "tfp" => ctx.tfp = Some(value.into_owned()),
            "idp_id" => ctx.idp_id = Some(value.into_owned()),
            "pkce_code_challenge_id" => {
                ctx.pkce_code_challenge_id = Some(value.into_owned());
            }
            _ => {}
        }
    }

    strip_internal_params(&mut parsed);

    let mut cleaned = parsed.to_string();
    cleaned.push_str(&trailing);
    Ok(cleaned.replace(FRAGMENT_SENTINEL, "#"))
}

/// Append internal parameters to a state URL at initiation time.
/// The decode pass strips exactly these keys again.
pub fn append_params(url: &str, params: &[(&str, &str)]) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };
    {
        let mut pairs = parsed.query_pairs_mut();
        for (key, value) in params {
            pairs.append_pair(key, value);
        }
    }
    parsed.to_string()
}

fn strip_internal_params(url: &mut Url) {
    let remaining: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !INTERNAL_PARAMS.contains(&k.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if remaining.is_empty() {
        url.set_query(None);
    } else {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        serializer.extend_pairs(remaining);
        url.set_query(Some(&serializer.finish()));
    }
}

/// Strip control characters and whitespace from a redirect candidate.
/// CR/LF in particular must never survive into a Location header.
fn sanitize_redirect(url: &str) -> String {
    url.chars()
        .filter(|c| !c.is_control() && !c.is_whitespace())
        .collect()
}
