//! Redirect-URI integrity guard.
//!
//! Decides whether the current request should be treated as an
//! authentication response at all. In strict mode the request URL must match
//! the registered callback URI exactly (modulo scheme, trailing slash and
//! case); outside strict mode any request carrying a response marker is
//! processed. Several strict-mode preconditions deliberately fail open with
//! a warning — an incompletely configured deployment keeps working, and the
//! log tells the operator which precondition could not be evaluated.

use std::sync::Arc;

use crate::{
    config::RouterConfig,
    request::{AuthMode, RequestContext},
    url_util::undress_url,
};

/// Extension point for overriding the expected redirect URI before the
/// strict-mode comparison (multi-site deployments front one router with
/// several registered callback URIs).
pub type RedirectUriFilter = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Returns `true` when the request must NOT be treated as an authentication
/// response ("skip"), `false` when processing should proceed.
pub fn skip_authentication_response(
    ctx: &RequestContext,
    config: &RouterConfig,
    current_url: Option<&str>,
    redirect_uri_filter: Option<&RedirectUriFilter>,
) -> bool {
    let no_auth_response = !ctx.is_oidc_response && !ctx.is_saml_response;
    let no_sso = config.sso.no_sso;
    let use_mailer = config.mailer.enabled;

    // Nothing to do: no response present, or SSO is off and the only flow
    // still allowed through (mail consent) does not apply.
    if no_auth_response
        || (no_sso && !use_mailer)
        || (no_sso && use_mailer && ctx.mode != Some(AuthMode::MailAuthorize))
    {
        return true;
    }

    if !config.sso.redirect_url_strict {
        return false;
    }

    let home_url = config.server.home_url.as_str();

    let mut redirect_url = if ctx.is_oidc_response {
        config.sso.oidc.redirect_url.clone()
    } else {
        config.sso.saml.sp_acs_url.clone()
    };

    if let Some(filter) = redirect_uri_filter {
        redirect_url = filter(&redirect_url);
    }

    if home_url.is_empty() || redirect_url.is_empty() {
        tracing::warn!(
            home_url = %home_url,
            redirect_url = %redirect_url,
            "Redirect URI strict mode is enabled but the home URL or the registered \
             redirect URI is empty; strict mode cannot be enforced"
        );
        return false;
    }

    let home_url = undress_url(home_url);
    let redirect_url = undress_url(&redirect_url);

    if home_url.eq_ignore_ascii_case(&redirect_url) {
        tracing::warn!(
            home_url = %home_url,
            redirect_url = %redirect_url,
            "Redirect URI strict mode is enabled but the home URL and the registered \
             redirect URI are equal; strict mode cannot be enforced. The redirect URI \
             must end with a dedicated path, e.g. {}/sso-callback/",
            home_url
        );
        return false;
    }

    let Some(current_url) = current_url.filter(|u| !u.is_empty()) else {
        tracing::warn!(
            "Redirect URI strict mode is enabled but the current request URL cannot \
             be determined; strict mode cannot be enforced"
        );
        return false;
    };

    let current_url = undress_url(current_url);

    if current_url.eq_ignore_ascii_case(&redirect_url) {
        tracing::debug!(
            current_url = %current_url,
            redirect_url = %redirect_url,
            "Current URL matches the registered redirect URI; processing the payload"
        );
        return false;
    }

    tracing::debug!(
        current_url = %current_url,
        redirect_url = %redirect_url,
        "Current URL does not match the registered redirect URI; skipping the payload"
    );
    true
}
