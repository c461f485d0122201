//! Request classification.
//!
//! `classify` inspects the parameter snapshot, the pre-classified request
//! context and the configuration, and selects at most one [`Route`]. It does
//! not execute anything: the HTTP layer runs the selected route exactly once
//! afterwards ("classify now, execute later, at most once"). First match
//! wins; the ordering below is load-bearing — an IdP error must beat the
//! artifact branches, and a SAML payload must never reach the OIDC handlers.

use crate::{
    config::RouterConfig,
    guard,
    request::{AuthMode, RequestContext, RequestSnapshot},
    services::Services,
};

/// The selected flow handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Entry point into SSO: redirect the user to the IdP.
    InitiateAuthentication,
    /// The IdP reported an error; terminate via the error landing page.
    ProtocolError,
    /// Process a SAML assertion response.
    SamlResponse,
    /// Run the self-test and redirect back.
    SelfTest,
    /// Process an inbound ID token.
    OidcToken,
    /// Process an inbound authorization code.
    OidcCode,
    /// Complete the delegated mail-consent flow.
    MailAuthorize,
    /// Trigger an external user-synchronization job and halt.
    SyncRun {
        job_id: String,
        backend: SyncBackend,
    },
}

/// Which synchronization backend a trigger addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncBackend {
    /// Push local users to the directory (`type=push`).
    Push,
    /// Drain a prepared queue job.
    Queue,
}

/// Classify the request. Returns `None` when nothing matched and the host's
/// normal behavior should take over.
pub fn classify(
    snapshot: &mut RequestSnapshot,
    ctx: &mut RequestContext,
    config: &RouterConfig,
    services: &Services,
    current_url: Option<&str>,
) -> Option<Route> {
    // The entry point *into* SSO is matched unconditionally: it is not an
    // authentication response and the redirect-URI guard does not apply.
    if snapshot.get("action") == Some("openidredirect") {
        return Some(Route::InitiateAuthentication);
    }

    let skip = guard::skip_authentication_response(
        ctx,
        config,
        current_url,
        services.redirect_uri_filter.as_ref(),
    );

    if !skip {
        if let Some(error) = snapshot.get("error") {
            let description = snapshot.get("error_description").unwrap_or_default();
            tracing::error!(error = %error, description = %description, "IdP reported an error");
            return Some(Route::ProtocolError);
        }

        if ctx.is_saml_response {
            if ctx.mode == Some(AuthMode::SelfTest) {
                return Some(Route::SelfTest);
            }
            return Some(Route::SamlResponse);
        }

        // Side effect only: resolve the PKCE verifier parked at initiation
        // time so the token exchange can present it. Does not route.
        if config.sso.oidc.use_pkce
            && let Some(store) = &services.pkce
            && let Some(challenge_id) = &ctx.pkce_code_challenge_id
        {
            ctx.pkce_code_verifier = store.take_verifier(challenge_id);
        }

        if let Some(id_token) = snapshot.get("id_token").map(str::to_string) {
            if !services.identity.check_audience(&id_token) {
                // Silent by design: a token addressed to another client
                // leaves the request unmatched, with no error oracle.
                tracing::debug!(
                    error = %crate::error::RouterError::AudienceMismatch,
                    "Request left unmatched"
                );
                return None;
            }

            // Captured single-use: removed from the ambient snapshot so
            // nothing downstream can replay it.
            snapshot.take("id_token");
            ctx.encoded_id_token = Some(id_token);
            ctx.code = snapshot.take("code");

            if ctx.mode == Some(AuthMode::SelfTest) {
                return Some(Route::SelfTest);
            }
            return Some(Route::OidcToken);
        }

        if snapshot.get("code").is_some() {
            ctx.code = snapshot.take("code");

            if ctx.mode == Some(AuthMode::SelfTest) {
                return Some(Route::SelfTest);
            }
            if ctx.mode == Some(AuthMode::MailAuthorize) {
                return Some(Route::MailAuthorize);
            }
            return Some(Route::OidcCode);
        }
    }

    // Sync triggers are matched even when the guard skipped the request:
    // they are not authentication responses.
    if snapshot.get("sync_run") == Some("start")
        && let Some(job_id) = snapshot.get("job_id")
    {
        if snapshot.get("type") == Some("push") {
            return Some(Route::SyncRun {
                job_id: job_id.to_string(),
                backend: SyncBackend::Push,
            });
        }

        if services.sync_queue.is_some() {
            return Some(Route::SyncRun {
                job_id: job_id.to_string(),
                backend: SyncBackend::Queue,
            });
        }
    }

    None
}
