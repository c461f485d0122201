use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Single-sign-on configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SsoConfig {
    /// Disable interactive single sign-on. Mailer-only deployments set this
    /// to keep the delegated mail-consent callback working while no user
    /// ever signs in through the router.
    #[serde(default)]
    pub no_sso: bool,

    /// Which protocol initiates authentication.
    #[serde(default)]
    pub provider: SsoProviderType,

    /// Require the current request URL to match the registered callback URI
    /// exactly before an authentication response is processed.
    #[serde(default = "default_true")]
    pub redirect_url_strict: bool,

    /// Landing page for failed authentication attempts. Falls back to the
    /// site base URL when empty. Failures always redirect; no error body is
    /// ever rendered.
    #[serde(default)]
    pub error_url: String,

    /// Post-login redirect target when the relay state carries none.
    /// Falls back to the site base URL when empty.
    #[serde(default)]
    pub default_redirect: String,

    /// OpenID Connect settings.
    #[serde(default)]
    pub oidc: OidcConfig,

    /// SAML 2.0 service-provider settings.
    #[serde(default)]
    pub saml: SamlConfig,
}

impl Default for SsoConfig {
    fn default() -> Self {
        Self {
            no_sso: false,
            provider: SsoProviderType::default(),
            redirect_url_strict: default_true(),
            error_url: String::new(),
            default_redirect: String::new(),
            oidc: OidcConfig::default(),
            saml: SamlConfig::default(),
        }
    }
}

impl SsoConfig {
    /// Whether enough is configured to initiate an authentication flow.
    pub fn is_configured(&self) -> bool {
        match self.provider {
            SsoProviderType::Oidc => !self.oidc.client_id.is_empty(),
            SsoProviderType::Saml => {
                !self.saml.idp_sso_url.is_empty() && !self.saml.sp_acs_url.is_empty()
            }
        }
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.oidc.variant == OidcVariant::B2c
            && (self.oidc.b2c_domain.is_none() || self.oidc.b2c_default_policy.is_none())
        {
            return Err(ConfigError::Validation(
                "sso.oidc.variant = \"b2c\" requires sso.oidc.b2c_domain and \
                 sso.oidc.b2c_default_policy"
                    .into(),
            ));
        }
        if self.oidc.flow == OidcFlow::Code
            && !self.oidc.client_id.is_empty()
            && self.oidc.client_secret.is_none()
            && !self.oidc.use_pkce
        {
            return Err(ConfigError::Validation(
                "sso.oidc.flow = \"code\" requires a client_secret or use_pkce = true".into(),
            ));
        }
        Ok(())
    }
}

/// Which protocol the initiate-authentication entry point uses.
/// Responses are classified by their payload, not by this setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SsoProviderType {
    #[default]
    Oidc,
    Saml,
}

/// OpenID Connect configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OidcConfig {
    /// Application (client) ID registered with the identity provider.
    #[serde(default)]
    pub client_id: String,

    /// Client secret, required for the code flow unless PKCE is used.
    #[serde(default)]
    pub client_secret: Option<String>,

    /// Directory tenant: a GUID, a verified domain, or "common".
    #[serde(default = "default_tenant")]
    pub tenant_id: String,

    /// Which OIDC response the IdP is asked for.
    #[serde(default)]
    pub flow: OidcFlow,

    /// Identity-platform variant. Selects the endpoint family and the
    /// code-processing strategy; absence of a variant's subsystem is a
    /// configuration choice, not a runtime probe.
    #[serde(default)]
    pub variant: OidcVariant,

    /// The redirect URI registered with the IdP. Strict mode compares the
    /// current request URL against this value for OIDC responses.
    #[serde(default)]
    pub redirect_url: String,

    /// Scopes requested at authorization time.
    #[serde(default = "default_scope")]
    pub scope: String,

    /// Bind authorization codes to a client-held verifier (PKCE).
    #[serde(default)]
    pub use_pkce: bool,

    /// Read identity claims the way v1.0 tokens deliver them (`upn` /
    /// `unique_name`) instead of the v2.0 `preferred_username`.
    #[serde(default)]
    pub legacy_token_parser: bool,

    /// Authorization endpoint override. When unset, derived from the
    /// variant and tenant.
    #[serde(default)]
    pub authorize_endpoint: Option<String>,

    /// Token endpoint override. When unset, derived from the variant and
    /// tenant.
    #[serde(default)]
    pub token_endpoint: Option<String>,

    /// B2C tenant domain, e.g. "contoso" for contoso.b2clogin.com.
    #[serde(default)]
    pub b2c_domain: Option<String>,

    /// B2C user-flow policy used when the request names none.
    #[serde(default)]
    pub b2c_default_policy: Option<String>,
}

impl Default for OidcConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: None,
            tenant_id: default_tenant(),
            flow: OidcFlow::default(),
            variant: OidcVariant::default(),
            redirect_url: String::new(),
            scope: default_scope(),
            use_pkce: false,
            legacy_token_parser: false,
            authorize_endpoint: None,
            token_endpoint: None,
            b2c_domain: None,
            b2c_default_policy: None,
        }
    }
}

/// OIDC response type requested at initiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OidcFlow {
    /// Hybrid/implicit: the IdP posts an `id_token` back directly.
    #[default]
    Implicit,
    /// Authorization-code: the IdP returns a `code` to exchange.
    Code,
}

/// Identity-platform variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OidcVariant {
    /// Entra ID (login.microsoftonline.com).
    #[default]
    Standard,
    /// Azure AD B2C user flows (b2clogin.com, per-policy endpoints).
    B2c,
    /// Entra External ID / CIAM (ciamlogin.com).
    Ciam,
}

/// SAML 2.0 service-provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SamlConfig {
    /// SP entity ID presented to the IdP.
    #[serde(default)]
    pub sp_entity_id: String,

    /// Assertion Consumer Service URL. Strict mode compares the current
    /// request URL against this value for SAML responses.
    #[serde(default)]
    pub sp_acs_url: String,

    /// IdP single-sign-on service URL (HTTP-Redirect binding).
    #[serde(default)]
    pub idp_sso_url: String,

    /// NameID format requested in the AuthnRequest.
    #[serde(default = "default_name_id_format")]
    pub name_id_format: String,
}

impl Default for SamlConfig {
    fn default() -> Self {
        Self {
            sp_entity_id: String::new(),
            sp_acs_url: String::new(),
            idp_sso_url: String::new(),
            name_id_format: default_name_id_format(),
        }
    }
}

/// Delegated mail-authorization configuration.
///
/// When enabled, a consent callback carrying `mode=mailAuthorize` in its
/// relay state is accepted even while `sso.no_sso` is set.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct MailerConfig {
    /// Accept mail-authorization consent callbacks.
    #[serde(default)]
    pub enabled: bool,

    /// Request the shared-mailbox send scope instead of the personal one.
    #[serde(default)]
    pub send_shared: bool,
}

/// External user-synchronization trigger configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Accept push-to-directory sync triggers (`type=push`).
    #[serde(default)]
    pub push_enabled: bool,

    /// Accept queue-based sync triggers.
    #[serde(default)]
    pub queue_enabled: bool,
}

fn default_true() -> bool {
    true
}

fn default_tenant() -> String {
    "common".to_string()
}

fn default_scope() -> String {
    "openid profile email".to_string()
}

fn default_name_id_format() -> String {
    "urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress".to_string()
}
