//! Flow handlers.
//!
//! Each handler is terminal: it ends the request in an HTTP redirect or an
//! empty-bodied halt. The dispatcher guarantees at most one handler runs per
//! request; `execute` converts every handler failure into a redirect to the
//! error landing page, so no protocol or security error ever surfaces as a
//! response body.

use axum::response::{IntoResponse, Redirect, Response};
use http::StatusCode;
use url::Url;

use crate::{
    config::{RouterConfig, SsoProviderType},
    dispatcher::{Route, SyncBackend},
    error::{ErrorCode, RouterError},
    request::{RequestContext, RequestSnapshot},
    services::{AuthorizeRequest, PkceChallenge, Services, send_scope},
    state_url, url_util,
};

/// Execute the selected route. Invoked exactly once per request.
pub async fn execute(
    route: Route,
    snapshot: &RequestSnapshot,
    ctx: &mut RequestContext,
    config: &RouterConfig,
    services: &Services,
    current_url: Option<&str>,
) -> Response {
    let result = match route {
        Route::InitiateAuthentication => initiate_authentication(snapshot, config, services),
        Route::ProtocolError => Err(RouterError::Protocol {
            error: snapshot.get("error").unwrap_or_default().to_string(),
            description: snapshot.get("error_description").map(str::to_string),
        }),
        Route::SamlResponse => saml_response(snapshot, ctx, config, services).await,
        Route::OidcToken => oidc_token(snapshot, ctx, config, services).await,
        Route::OidcCode => oidc_code(snapshot, ctx, config, services).await,
        Route::SelfTest => self_test(snapshot, ctx, config, services, current_url).await,
        Route::MailAuthorize => mail_authorize(snapshot, ctx, config, services).await,
        Route::SyncRun { job_id, backend } => {
            return sync_run(&job_id, backend, services).await;
        }
    };

    match result {
        Ok(response) => response,
        Err(error) => {
            tracing::error!(error = %error, "Authentication flow failed");
            goodbye(config, error.error_code())
        }
    }
}

/// Terminate an authentication attempt: redirect to the error landing page
/// with a coarse error code. Never renders a body.
pub fn goodbye(config: &RouterConfig, code: ErrorCode) -> Response {
    let base = if !config.sso.error_url.is_empty() {
        config.sso.error_url.clone()
    } else if !config.server.home_url.is_empty() {
        config.server.home_url.clone()
    } else {
        config.server.base_url.clone()
    };

    let target = match Url::parse(&base) {
        Ok(mut url) => {
            url.query_pairs_mut().append_pair("login_error", code.as_str());
            url.to_string()
        }
        Err(_) => base,
    };

    Redirect::to(&target).into_response()
}

/// Compute the post-authentication redirect target and go there.
///
/// Precedence: the cleaned state URL, then a root-relative `redirect_to`
/// request parameter, then the configured default. A raw absolute
/// `redirect_to` is ignored — only the validated state URL may send the
/// user off-site.
fn goto_after(snapshot: &RequestSnapshot, ctx: &RequestContext, config: &RouterConfig) -> Response {
    let target = ctx
        .state_redirect
        .clone()
        .or_else(|| relative_redirect_to(snapshot, config))
        .unwrap_or_else(|| default_redirect(config));

    Redirect::to(&target).into_response()
}

fn relative_redirect_to(snapshot: &RequestSnapshot, config: &RouterConfig) -> Option<String> {
    snapshot
        .get("redirect_to")
        .filter(|url| url.starts_with('/') && !url.starts_with("//"))
        .map(|url| url_util::absolutize(url, &config.server.base_url))
}

fn default_redirect(config: &RouterConfig) -> String {
    if !config.sso.default_redirect.is_empty() {
        config.sso.default_redirect.clone()
    } else {
        config.server.base_url.clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Initiation
// ─────────────────────────────────────────────────────────────────────────────

fn initiate_authentication(
    snapshot: &RequestSnapshot,
    config: &RouterConfig,
    services: &Services,
) -> Result<Response, RouterError> {
    tracing::debug!(provider = ?config.sso.provider, "Initiating user authentication");

    match config.sso.provider {
        SsoProviderType::Saml => saml_initiate(snapshot, config, services),
        SsoProviderType::Oidc => oidc_initiate(snapshot, config, services),
    }
}

fn oidc_initiate(
    snapshot: &RequestSnapshot,
    config: &RouterConfig,
    services: &Services,
) -> Result<Response, RouterError> {
    if !config.sso.is_configured() {
        return Ok(unconfigured_bounce(snapshot, config));
    }

    let login_hint = snapshot.get("login_hint");
    let b2c_policy = snapshot.get("b2c_policy");

    let mut state = initiation_state(snapshot, config);

    // PKCE: park the verifier and let its id ride through the state URL so
    // the response side can resolve it before the token exchange.
    let mut code_challenge = None;
    if config.sso.oidc.use_pkce
        && let Some(store) = &services.pkce
    {
        let challenge = PkceChallenge::new();
        let challenge_id = store.put(&challenge);
        state = state_url::append_params(&state, &[("pkce_code_challenge_id", &challenge_id)]);
        code_challenge = Some(challenge.code_challenge);
    }

    let auth_url = services.identity.authorize_url(AuthorizeRequest {
        login_hint,
        state: &state,
        policy: b2c_policy,
        code_challenge: code_challenge.as_deref(),
    })?;

    Ok(Redirect::to(auth_url.as_str()).into_response())
}

fn saml_initiate(
    snapshot: &RequestSnapshot,
    config: &RouterConfig,
    services: &Services,
) -> Result<Response, RouterError> {
    if !config.sso.is_configured() {
        return Ok(unconfigured_bounce(snapshot, config));
    }

    let mut params = Vec::new();
    if let Some(domain_hint) = snapshot.get("domain_hint") {
        params.push(("whr".to_string(), domain_hint.trim().to_lowercase()));
    }

    let relay_state = initiation_state(snapshot, config);
    let url = services.saml.initiate_url(&relay_state, &params)?;

    Ok(Redirect::to(url.as_str()).into_response())
}

/// The state URL sent to the IdP: the caller's redirect target, anchored at
/// the site base when root-relative.
fn initiation_state(snapshot: &RequestSnapshot, config: &RouterConfig) -> String {
    match snapshot.get("redirect_to") {
        Some(url) if url.starts_with('/') && !url.starts_with("//") => {
            url_util::absolutize(url, &config.server.base_url)
        }
        Some(url) if url.starts_with("http") => url.to_string(),
        _ => default_redirect(config),
    }
}

/// SSO initiation attempted against an unconfigured deployment: warn and
/// bounce the user back to where they came from, minus the cache-buster.
fn unconfigured_bounce(snapshot: &RequestSnapshot, config: &RouterConfig) -> Response {
    tracing::warn!("Attempt to initiate SSO failed because SSO is not configured");
    let target = initiation_state(snapshot, config);
    Redirect::to(&url_util::remove_query_arg(&target, "cb")).into_response()
}

// ─────────────────────────────────────────────────────────────────────────────
// Response processing
// ─────────────────────────────────────────────────────────────────────────────

async fn saml_response(
    snapshot: &RequestSnapshot,
    ctx: &mut RequestContext,
    config: &RouterConfig,
    services: &Services,
) -> Result<Response, RouterError> {
    tracing::debug!("Processing SAML 2.0 response");

    let payload = snapshot
        .get("SAMLResponse")
        .ok_or_else(|| RouterError::Saml("no SAMLResponse payload".into()))?;

    let user = services
        .saml
        .authenticate(ctx, payload)
        .await
        .map_err(|e| RouterError::Saml(e.to_string()))?;

    tracing::info!(subject = %user.subject, "SAML user authenticated");
    Ok(goto_after(snapshot, ctx, config))
}

async fn oidc_token(
    snapshot: &RequestSnapshot,
    ctx: &mut RequestContext,
    config: &RouterConfig,
    services: &Services,
) -> Result<Response, RouterError> {
    tracing::debug!("Processing inbound ID token");

    let user = services.identity.process_token(ctx).await?;

    tracing::info!(subject = %user.subject, "OIDC user authenticated");
    Ok(goto_after(snapshot, ctx, config))
}

async fn oidc_code(
    snapshot: &RequestSnapshot,
    ctx: &mut RequestContext,
    config: &RouterConfig,
    services: &Services,
) -> Result<Response, RouterError> {
    tracing::debug!("Processing inbound authorization code");

    if config.sso.oidc.flow != crate::config::OidcFlow::Code {
        tracing::error!(
            "An authorization code was received but the authorization code flow is not configured"
        );
        return Err(RouterError::UnsupportedFlow);
    }

    let user = services
        .identity
        .process_code(ctx, None, true)
        .await?
        .ok_or_else(|| RouterError::Internal("code exchange produced no principal".into()))?;

    tracing::info!(subject = %user.subject, "OIDC user authenticated");
    Ok(goto_after(snapshot, ctx, config))
}

async fn self_test(
    snapshot: &RequestSnapshot,
    ctx: &mut RequestContext,
    config: &RouterConfig,
    services: &Services,
    current_url: Option<&str>,
) -> Result<Response, RouterError> {
    tracing::debug!("Running self-test");

    let reports = services.self_test.run(config).await;
    let failed = reports.iter().filter(|r| !r.passed).count();
    tracing::info!(
        checks = reports.len(),
        failed,
        "Self-test finished"
    );

    let mut target = ctx
        .state_redirect
        .clone()
        .or_else(|| relative_redirect_to(snapshot, config))
        .or_else(|| current_url.map(str::to_string))
        .unwrap_or_else(|| default_redirect(config));

    // The results page must not re-trigger the test on refresh.
    target = url_util::remove_query_arg(&target, "flushPermaLinks");
    target = url_util::remove_query_arg(&target, "mode");

    Ok(Redirect::to(&target).into_response())
}

async fn mail_authorize(
    snapshot: &RequestSnapshot,
    ctx: &mut RequestContext,
    config: &RouterConfig,
    services: &Services,
) -> Result<Response, RouterError> {
    tracing::debug!("Processing mail-authorization consent");

    let target = ctx
        .state_redirect
        .clone()
        .or_else(|| relative_redirect_to(snapshot, config))
        .unwrap_or_else(|| default_redirect(config));

    let Some(mail) = &services.mail else {
        tracing::warn!("Mail-authorization response received but no mail service is wired");
        return Ok(Redirect::to(&target).into_response());
    };

    // Consent is pointless while the host's mail pipeline bypasses the
    // delegated mailer.
    if !mail.is_plugged() {
        return Ok(Redirect::to(&target).into_response());
    }

    // Exchange the consent code for send permissions; no sign-in happens.
    let scope = send_scope(config.mailer.send_shared);
    services.identity.process_code(ctx, Some(scope), false).await?;

    if let Err(error) = mail.authorize_mail_user().await {
        tracing::error!(error = %error, "Mail authorization failed");
    }

    Ok(Redirect::to(&target).into_response())
}

// ─────────────────────────────────────────────────────────────────────────────
// Synchronization triggers
// ─────────────────────────────────────────────────────────────────────────────

/// Fire-and-forget a sync run and halt with an empty response. The queue
/// backend validates the job first; an unknown job aborts with a log entry
/// and nothing else.
async fn sync_run(job_id: &str, backend: SyncBackend, services: &Services) -> Response {
    match backend {
        SyncBackend::Push => {
            let Some(push) = services.sync_push.clone() else {
                tracing::warn!(
                    "Could not start a push synchronization job because no push backend is installed"
                );
                return StatusCode::NO_CONTENT.into_response();
            };
            let job_id = job_id.to_string();
            tokio::spawn(async move { push.run(&job_id).await });
        }
        SyncBackend::Queue => {
            let Some(queue) = services.sync_queue.clone() else {
                return StatusCode::NO_CONTENT.into_response();
            };
            if queue.get_job(job_id).await.is_none() {
                let error = RouterError::SyncJobNotFound {
                    job_id: job_id.to_string(),
                };
                tracing::error!(error = %error, "External sync trigger rejected");
                return StatusCode::NO_CONTENT.into_response();
            }
            let job_id = job_id.to_string();
            tokio::spawn(async move { queue.run(&job_id).await });
        }
    }

    StatusCode::NO_CONTENT.into_response()
}
