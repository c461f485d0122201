//! OpenID Connect identity-provider strategies.
//!
//! One strategy per identity-platform variant (Entra ID, Azure AD B2C,
//! Entra External ID). All three share the same contract: build the
//! authorization URL at initiation time, and turn a returned artifact
//! (ID token or authorization code) into an authenticated principal.
//!
//! Cryptographic validation of tokens is out of scope here; the only check
//! the router itself performs is the audience pre-check that gates whether
//! an inbound `id_token` is addressed to this client at all.

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::sync::Arc;
use url::Url;
use uuid::Uuid;

use crate::{
    config::{OidcConfig, OidcFlow, OidcVariant, SsoConfig},
    error::RouterError,
    request::RequestContext,
};

/// The principal extracted from a processed ID token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub subject: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub tenant_id: Option<String>,
}

/// Parameters for building an authorization URL.
#[derive(Debug, Default)]
pub struct AuthorizeRequest<'a> {
    pub login_hint: Option<&'a str>,
    /// The fully assembled state URL (redirect target + internal params).
    pub state: &'a str,
    /// B2C policy named by the request, overriding the configured default.
    pub policy: Option<&'a str>,
    /// PKCE code challenge (S256) to bind the authorization code to.
    pub code_challenge: Option<&'a str>,
}

/// Contract shared by all identity-provider strategies.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Whether the token's `aud` claim names this client. Signature
    /// verification is deliberately not part of this check.
    fn check_audience(&self, id_token: &str) -> bool;

    /// Build the URL the user is redirected to for authentication.
    fn authorize_url(&self, request: AuthorizeRequest<'_>) -> Result<Url, RouterError>;

    /// Process the ID token captured in the request context.
    async fn process_token(
        &self,
        ctx: &mut RequestContext,
    ) -> Result<AuthenticatedUser, RouterError>;

    /// Exchange the authorization code captured in the request context.
    ///
    /// `scope` overrides the configured scope (the mail-consent flow asks
    /// for a Graph send scope); with `authenticate` false the exchange is
    /// performed for its side effect only and no principal is returned.
    async fn process_code(
        &self,
        ctx: &mut RequestContext,
        scope: Option<&str>,
        authenticate: bool,
    ) -> Result<Option<AuthenticatedUser>, RouterError>;
}

/// Select and construct the strategy for a configuration.
pub fn identity_provider_from_config(
    sso: &SsoConfig,
    http: reqwest::Client,
) -> Arc<dyn IdentityProvider> {
    let core = ProviderCore {
        config: sso.oidc.clone(),
        http,
    };
    match sso.oidc.variant {
        OidcVariant::Standard => Arc::new(StandardProvider { core }),
        OidcVariant::B2c => Arc::new(B2cProvider { core }),
        OidcVariant::Ciam => Arc::new(CiamProvider { core }),
    }
}

/// Token endpoint response. Only the ID token matters to the router; the
/// remaining fields are deserialized for logging and future use.
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
}

/// Shared machinery for the three variants.
struct ProviderCore {
    config: OidcConfig,
    http: reqwest::Client,
}

impl ProviderCore {
    fn check_audience(&self, id_token: &str) -> bool {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["aud"]);
        validation.set_audience(&[&self.config.client_id]);
        validation.algorithms = vec![
            Algorithm::RS256,
            Algorithm::RS384,
            Algorithm::RS512,
            Algorithm::ES256,
            Algorithm::ES384,
        ];

        match jsonwebtoken::decode::<serde_json::Value>(
            id_token,
            &DecodingKey::from_secret(&[]),
            &validation,
        ) {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(error = %e, "ID token failed the audience pre-check");
                false
            }
        }
    }

    fn authorize_url_at(
        &self,
        endpoint: &str,
        request: &AuthorizeRequest<'_>,
    ) -> Result<Url, RouterError> {
        let mut url = Url::parse(endpoint)
            .map_err(|e| RouterError::Internal(format!("authorize endpoint: {e}")))?;

        let response_type = match self.config.flow {
            OidcFlow::Implicit => "id_token",
            OidcFlow::Code => "code",
        };
        let response_mode = match self.config.flow {
            OidcFlow::Implicit => "form_post",
            OidcFlow::Code => "query",
        };

        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("client_id", &self.config.client_id)
                .append_pair("response_type", response_type)
                .append_pair("response_mode", response_mode)
                .append_pair("redirect_uri", &self.config.redirect_url)
                .append_pair("scope", &self.config.scope)
                .append_pair("nonce", &Uuid::new_v4().to_string())
                .append_pair("state", request.state);

            if let Some(hint) = request.login_hint {
                pairs.append_pair("login_hint", hint);
            }
            if let Some(challenge) = request.code_challenge {
                pairs
                    .append_pair("code_challenge", challenge)
                    .append_pair("code_challenge_method", "S256");
            }
        }

        Ok(url)
    }

    async fn exchange_code_at(
        &self,
        endpoint: &str,
        ctx: &mut RequestContext,
        scope: Option<&str>,
    ) -> Result<TokenResponse, RouterError> {
        let code = ctx
            .code
            .take()
            .ok_or_else(|| RouterError::Internal("no authorization code captured".into()))?;

        let scope = scope.unwrap_or(&self.config.scope);
        let mut form: Vec<(&str, String)> = vec![
            ("grant_type", "authorization_code".into()),
            ("client_id", self.config.client_id.clone()),
            ("code", code),
            ("redirect_uri", self.config.redirect_url.clone()),
            ("scope", scope.to_string()),
        ];
        if let Some(secret) = &self.config.client_secret {
            form.push(("client_secret", secret.clone()));
        }
        if let Some(verifier) = ctx.pkce_code_verifier.take() {
            form.push(("code_verifier", verifier));
        }

        let response = self
            .http
            .post(endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| RouterError::Internal(format!("token endpoint request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::error!(status = %status, endpoint = %endpoint, "Token endpoint returned an error");
            return Err(RouterError::Internal(format!(
                "token endpoint returned {status}"
            )));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| RouterError::Internal(format!("token endpoint response: {e}")))
    }

    /// Extract the principal from an ID token's claims.
    ///
    /// v2.0 tokens carry `preferred_username`; v1.0 tokens (legacy parser)
    /// carry `upn` / `unique_name` instead.
    fn user_from_token(&self, id_token: &str) -> Result<AuthenticatedUser, RouterError> {
        let claims = decode_claims(id_token)?;

        let subject = claims
            .get("sub")
            .and_then(|v| v.as_str())
            .ok_or_else(|| RouterError::Internal("ID token has no sub claim".into()))?
            .to_string();

        let username = if self.config.legacy_token_parser {
            claims
                .get("upn")
                .or_else(|| claims.get("unique_name"))
                .and_then(|v| v.as_str())
        } else {
            claims.get("preferred_username").and_then(|v| v.as_str())
        };

        let email = claims
            .get("email")
            .and_then(|v| v.as_str())
            .or(username)
            .map(str::to_string);

        Ok(AuthenticatedUser {
            subject,
            email,
            name: claims
                .get("name")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            tenant_id: claims
                .get("tid")
                .and_then(|v| v.as_str())
                .map(str::to_string),
        })
    }

    async fn process_token(
        &self,
        ctx: &mut RequestContext,
    ) -> Result<AuthenticatedUser, RouterError> {
        let id_token = ctx
            .encoded_id_token
            .take()
            .ok_or_else(|| RouterError::Internal("no ID token captured".into()))?;
        let user = self.user_from_token(&id_token)?;
        ctx.user = Some(user.clone());
        Ok(user)
    }

    async fn process_code_at(
        &self,
        endpoint: &str,
        ctx: &mut RequestContext,
        scope: Option<&str>,
        authenticate: bool,
    ) -> Result<Option<AuthenticatedUser>, RouterError> {
        let tokens = self.exchange_code_at(endpoint, ctx, scope).await?;

        if !authenticate {
            return Ok(None);
        }

        let id_token = tokens
            .id_token
            .ok_or_else(|| RouterError::Internal("token endpoint returned no ID token".into()))?;
        let user = self.user_from_token(&id_token)?;
        ctx.user = Some(user.clone());
        Ok(Some(user))
    }
}

/// Parse a JWT payload without verifying the signature.
fn decode_claims(token: &str) -> Result<serde_json::Value, RouterError> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| RouterError::Internal("malformed JWT".into()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| RouterError::Internal(format!("JWT payload: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| RouterError::Internal(format!("JWT claims: {e}")))
}

// ─────────────────────────────────────────────────────────────────────────────
// Entra ID (standard)
// ─────────────────────────────────────────────────────────────────────────────

pub struct StandardProvider {
    core: ProviderCore,
}

impl StandardProvider {
    fn authorize_endpoint(&self) -> String {
        self.core.config.authorize_endpoint.clone().unwrap_or_else(|| {
            format!(
                "https://login.microsoftonline.com/{}/oauth2/v2.0/authorize",
                self.core.config.tenant_id
            )
        })
    }

    fn token_endpoint(&self) -> String {
        self.core.config.token_endpoint.clone().unwrap_or_else(|| {
            format!(
                "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
                self.core.config.tenant_id
            )
        })
    }
}

#[async_trait]
impl IdentityProvider for StandardProvider {
    fn check_audience(&self, id_token: &str) -> bool {
        self.core.check_audience(id_token)
    }

    fn authorize_url(&self, request: AuthorizeRequest<'_>) -> Result<Url, RouterError> {
        self.core.authorize_url_at(&self.authorize_endpoint(), &request)
    }

    async fn process_token(
        &self,
        ctx: &mut RequestContext,
    ) -> Result<AuthenticatedUser, RouterError> {
        self.core.process_token(ctx).await
    }

    async fn process_code(
        &self,
        ctx: &mut RequestContext,
        scope: Option<&str>,
        authenticate: bool,
    ) -> Result<Option<AuthenticatedUser>, RouterError> {
        self.core
            .process_code_at(&self.token_endpoint(), ctx, scope, authenticate)
            .await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Azure AD B2C
// ─────────────────────────────────────────────────────────────────────────────

/// B2C endpoints are per-policy; the policy comes from the request, the relay
/// state (`tfp`), or the configured default, in that order.
pub struct B2cProvider {
    core: ProviderCore,
}

impl B2cProvider {
    fn endpoint(&self, kind: &str, policy: Option<&str>) -> Result<String, RouterError> {
        let domain = self
            .core
            .config
            .b2c_domain
            .as_deref()
            .ok_or_else(|| RouterError::Internal("b2c_domain is not configured".into()))?;
        let policy = policy
            .or(self.core.config.b2c_default_policy.as_deref())
            .ok_or_else(|| RouterError::Internal("no B2C policy available".into()))?;
        Ok(format!(
            "https://{domain}.b2clogin.com/{domain}.onmicrosoft.com/{policy}/oauth2/v2.0/{kind}"
        ))
    }
}

#[async_trait]
impl IdentityProvider for B2cProvider {
    fn check_audience(&self, id_token: &str) -> bool {
        self.core.check_audience(id_token)
    }

    fn authorize_url(&self, request: AuthorizeRequest<'_>) -> Result<Url, RouterError> {
        let endpoint = self.endpoint("authorize", request.policy)?;
        self.core.authorize_url_at(&endpoint, &request)
    }

    async fn process_token(
        &self,
        ctx: &mut RequestContext,
    ) -> Result<AuthenticatedUser, RouterError> {
        self.core.process_token(ctx).await
    }

    async fn process_code(
        &self,
        ctx: &mut RequestContext,
        scope: Option<&str>,
        authenticate: bool,
    ) -> Result<Option<AuthenticatedUser>, RouterError> {
        let policy = ctx.tfp.clone();
        let endpoint = self.endpoint("token", policy.as_deref())?;
        self.core
            .process_code_at(&endpoint, ctx, scope, authenticate)
            .await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Entra External ID (CIAM)
// ─────────────────────────────────────────────────────────────────────────────

pub struct CiamProvider {
    core: ProviderCore,
}

impl CiamProvider {
    fn endpoint(&self, kind: &str) -> String {
        let tenant = &self.core.config.tenant_id;
        format!("https://{tenant}.ciamlogin.com/{tenant}.onmicrosoft.com/oauth2/v2.0/{kind}")
    }
}

#[async_trait]
impl IdentityProvider for CiamProvider {
    fn check_audience(&self, id_token: &str) -> bool {
        self.core.check_audience(id_token)
    }

    fn authorize_url(&self, request: AuthorizeRequest<'_>) -> Result<Url, RouterError> {
        let endpoint = self
            .core
            .config
            .authorize_endpoint
            .clone()
            .unwrap_or_else(|| self.endpoint("authorize"));
        self.core.authorize_url_at(&endpoint, &request)
    }

    async fn process_token(
        &self,
        ctx: &mut RequestContext,
    ) -> Result<AuthenticatedUser, RouterError> {
        self.core.process_token(ctx).await
    }

    async fn process_code(
        &self,
        ctx: &mut RequestContext,
        scope: Option<&str>,
        authenticate: bool,
    ) -> Result<Option<AuthenticatedUser>, RouterError> {
        let endpoint = self
            .core
            .config
            .token_endpoint
            .clone()
            .unwrap_or_else(|| self.endpoint("token"));
        self.core
            .process_code_at(&endpoint, ctx, scope, authenticate)
            .await
    }
}
