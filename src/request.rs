//! Per-request state: the parameter snapshot and the mutable request context.
//!
//! Every inbound request gets an immutable-at-the-edge [`RequestSnapshot`]
//! (merged query and form parameters) and a fresh [`RequestContext`]. The
//! context is populated by [`classify_response`] before the dispatcher runs
//! and is discarded with the request; it is never shared across requests.

use std::collections::HashMap;

use crate::{config::RouterConfig, error::RouterError, services::AuthenticatedUser, state_url};

/// Internal mode carried through the `state` URL.
///
/// The mode is only ever read from the decoded state parameter, never from a
/// raw request field, so a form post cannot spoof it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    SelfTest,
    MailAuthorize,
}

impl AuthMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "selfTest" => Some(AuthMode::SelfTest),
            "mailAuthorize" => Some(AuthMode::MailAuthorize),
            _ => None,
        }
    }
}

/// A snapshot of the request's query and form parameters.
///
/// Protocol artifacts are single-use: [`take`](Self::take) removes the value
/// so later reads observe absence. Empty values are treated as absent, the
/// same way the classification treats an empty `code=` as no code at all.
#[derive(Debug, Default, Clone)]
pub struct RequestSnapshot {
    params: HashMap<String, String>,
}

impl RequestSnapshot {
    pub fn new(params: HashMap<String, String>) -> Self {
        Self { params }
    }

    /// Merge query parameters and form fields; form fields win on conflict,
    /// matching how a POST binding delivers the authoritative payload.
    pub fn from_parts(
        query: impl IntoIterator<Item = (String, String)>,
        form: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        let mut params: HashMap<String, String> = query.into_iter().collect();
        params.extend(form);
        Self { params }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    /// Remove and return a parameter. Used for artifacts that must not be
    /// observable by downstream code after capture.
    pub fn take(&mut self, key: &str) -> Option<String> {
        self.params.remove(key).filter(|v| !v.is_empty())
    }
}

/// Mutable per-request classification state.
///
/// Created at dispatch start, mutated only by the classification pass, the
/// dispatcher and the flow handlers, discarded at request end.
#[derive(Debug, Default)]
pub struct RequestContext {
    /// An ID-token or authorization-code artifact is present.
    pub is_oidc_response: bool,
    /// A SAML POST-binding payload is present.
    pub is_saml_response: bool,
    /// Internal mode extracted from the decoded state URL.
    pub mode: Option<AuthMode>,

    /// Authorization code, captured single-use from the snapshot.
    pub code: Option<String>,
    /// Raw ID token, captured single-use from the snapshot.
    pub encoded_id_token: Option<String>,

    /// B2C trust-framework policy carried through state.
    pub tfp: Option<String>,
    /// Identity-provider selector for multi-IdP setups, carried through state.
    pub idp_id: Option<String>,
    /// PKCE challenge lookup key carried through state.
    pub pkce_code_challenge_id: Option<String>,
    /// PKCE verifier resolved from the challenge id before token exchange.
    pub pkce_code_verifier: Option<String>,

    /// The cleaned state URL: the post-authentication redirect target.
    pub state_redirect: Option<String>,

    /// The authenticated principal, once a handler has processed a response.
    pub user: Option<AuthenticatedUser>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Classify the response markers and decode the relay state.
///
/// Runs before the dispatcher: sets `is_oidc_response` / `is_saml_response`
/// from the presence of protocol artifacts and round-trips the `state` /
/// `RelayState` parameter through the codec, which populates `mode` and the
/// other internal fields on the context.
///
/// A malformed state URL aborts the whole flow: no redirect may ever be
/// issued based on an unvalidated relay target.
pub fn classify_response(
    snapshot: &RequestSnapshot,
    ctx: &mut RequestContext,
    config: &RouterConfig,
) -> Result<(), RouterError> {
    ctx.is_oidc_response =
        snapshot.get("id_token").is_some() || snapshot.get("code").is_some();
    ctx.is_saml_response = snapshot.get("SAMLResponse").is_some();

    if !ctx.is_oidc_response && !ctx.is_saml_response {
        return Ok(());
    }

    let state = snapshot.get("state").or_else(|| snapshot.get("RelayState"));

    if let Some(state) = state {
        let cleaned = state_url::decode_state(state, ctx, &config.server.base_url)?;
        ctx.state_redirect = Some(cleaned);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouterConfig;

    fn config() -> RouterConfig {
        RouterConfig::for_tests("https://example.com")
    }

    fn snapshot(pairs: &[(&str, &str)]) -> RequestSnapshot {
        RequestSnapshot::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_take_is_single_use() {
        let mut snap = snapshot(&[("code", "abc")]);
        assert_eq!(snap.take("code").as_deref(), Some("abc"));
        assert_eq!(snap.take("code"), None);
        assert_eq!(snap.get("code"), None);
    }

    #[test]
    fn test_empty_values_are_absent() {
        let snap = snapshot(&[("id_token", "")]);
        assert_eq!(snap.get("id_token"), None);
    }

    #[test]
    fn test_markers_from_artifacts() {
        let mut ctx = RequestContext::new();
        classify_response(&snapshot(&[("id_token", "t")]), &mut ctx, &config()).unwrap();
        assert!(ctx.is_oidc_response);
        assert!(!ctx.is_saml_response);

        let mut ctx = RequestContext::new();
        classify_response(&snapshot(&[("SAMLResponse", "b64")]), &mut ctx, &config()).unwrap();
        assert!(ctx.is_saml_response);
        assert!(!ctx.is_oidc_response);
    }

    #[test]
    fn test_mode_comes_from_state_not_form() {
        // A bare `mode` form field must not classify the request.
        let mut ctx = RequestContext::new();
        classify_response(
            &snapshot(&[("code", "abc"), ("mode", "selfTest")]),
            &mut ctx,
            &config(),
        )
        .unwrap();
        assert_eq!(ctx.mode, None);

        let mut ctx = RequestContext::new();
        classify_response(
            &snapshot(&[
                ("code", "abc"),
                ("state", "https://example.com/landing?mode=selfTest"),
            ]),
            &mut ctx,
            &config(),
        )
        .unwrap();
        assert_eq!(ctx.mode, Some(AuthMode::SelfTest));
        assert_eq!(
            ctx.state_redirect.as_deref(),
            Some("https://example.com/landing")
        );
    }

    #[test]
    fn test_malformed_state_aborts() {
        let mut ctx = RequestContext::new();
        let result = classify_response(
            &snapshot(&[("code", "abc"), ("state", "javascript:alert(1)")]),
            &mut ctx,
            &config(),
        );
        assert!(matches!(result, Err(RouterError::InvalidStateUrl)));
        assert_eq!(ctx.state_redirect, None);
    }

    #[test]
    fn test_state_ignored_without_response_markers() {
        let mut ctx = RequestContext::new();
        classify_response(
            &snapshot(&[("state", "not-a-url")]),
            &mut ctx,
            &config(),
        )
        .unwrap();
        assert!(!ctx.is_oidc_response);
        assert_eq!(ctx.state_redirect, None);
    }
}
