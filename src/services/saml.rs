//! SAML 2.0 service-provider seam.
//!
//! The router initiates SP-initiated SSO (AuthnRequest + redirect) itself;
//! assertion validation is delegated to an [`AssertionValidator`], since
//! XML signature verification is a separate subsystem. A deployment without
//! a validator rejects every SAML response with a processing error.

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::Utc;
use std::sync::Arc;
use url::Url;
use uuid::Uuid;

use super::AuthenticatedUser;
use crate::{config::SamlConfig, error::RouterError, request::RequestContext};

/// Validates a base64-encoded SAML response and extracts the principal.
#[async_trait]
pub trait AssertionValidator: Send + Sync {
    async fn validate(&self, saml_response: &str) -> Result<AuthenticatedUser, RouterError>;
}

/// SAML collaborator contract used by the flow handlers.
#[async_trait]
pub trait SamlService: Send + Sync {
    /// Build the IdP redirect that carries the AuthnRequest.
    ///
    /// `relay_state` is the assembled state URL; `params` are extra query
    /// parameters forwarded to the IdP (e.g. `whr` from a domain hint).
    fn initiate_url(
        &self,
        relay_state: &str,
        params: &[(String, String)],
    ) -> Result<Url, RouterError>;

    /// Authenticate a POST-bound SAML response.
    async fn authenticate(
        &self,
        ctx: &mut RequestContext,
        saml_response: &str,
    ) -> Result<AuthenticatedUser, RouterError>;
}

/// Default SP implementation: redirect-binding AuthnRequest, pluggable
/// assertion validation.
pub struct SamlSpService {
    config: SamlConfig,
    validator: Option<Arc<dyn AssertionValidator>>,
}

impl SamlSpService {
    pub fn new(config: SamlConfig) -> Self {
        Self {
            config,
            validator: None,
        }
    }

    pub fn with_validator(config: SamlConfig, validator: Arc<dyn AssertionValidator>) -> Self {
        Self {
            config,
            validator: Some(validator),
        }
    }

    fn build_authn_request(&self) -> String {
        let request_id = format!("_{}", Uuid::new_v4());
        let issue_instant = Utc::now().format("%Y-%m-%dT%H:%M:%SZ");

        format!(
            r#"<samlp:AuthnRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol"
    xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion"
    ID="{request_id}"
    Version="2.0"
    IssueInstant="{issue_instant}"
    Destination="{destination}"
    AssertionConsumerServiceURL="{acs_url}"
    ProtocolBinding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST">
    <saml:Issuer>{issuer}</saml:Issuer>
    <samlp:NameIDPolicy Format="{name_id_format}" AllowCreate="true"/>
</samlp:AuthnRequest>"#,
            destination = self.config.idp_sso_url,
            acs_url = self.config.sp_acs_url,
            issuer = self.config.sp_entity_id,
            name_id_format = self.config.name_id_format,
        )
    }
}

#[async_trait]
impl SamlService for SamlSpService {
    fn initiate_url(
        &self,
        relay_state: &str,
        params: &[(String, String)],
    ) -> Result<Url, RouterError> {
        if self.config.idp_sso_url.is_empty() {
            return Err(RouterError::Internal("idp_sso_url is not configured".into()));
        }

        let mut url = Url::parse(&self.config.idp_sso_url)
            .map_err(|e| RouterError::Internal(format!("idp_sso_url: {e}")))?;

        let encoded_request = STANDARD.encode(self.build_authn_request());
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("SAMLRequest", &encoded_request)
                .append_pair("RelayState", relay_state);
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }

    async fn authenticate(
        &self,
        ctx: &mut RequestContext,
        saml_response: &str,
    ) -> Result<AuthenticatedUser, RouterError> {
        let validator = self
            .validator
            .as_ref()
            .ok_or_else(|| RouterError::Saml("no assertion validator configured".into()))?;

        let user = validator.validate(saml_response).await?;
        ctx.user = Some(user.clone());
        Ok(user)
    }
}
