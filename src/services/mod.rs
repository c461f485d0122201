//! External collaborator seams.
//!
//! The dispatcher and flow handlers talk to identity, mail and
//! synchronization subsystems exclusively through the traits in this module.
//! Which implementations are wired up is a configuration-time choice; an
//! absent subsystem is an absent `Option`, never a runtime probe.

mod id_token;
mod mail;
mod pkce;
mod saml;
mod selftest;
mod sync;

use std::sync::Arc;

pub use id_token::{
    AuthenticatedUser, AuthorizeRequest, B2cProvider, CiamProvider, IdentityProvider,
    StandardProvider, identity_provider_from_config,
};
pub use mail::{
    MAIL_SEND_SCOPE, MAIL_SEND_SHARED_SCOPE, MailAuthorizationService, NullMailService, send_scope,
};
pub use pkce::{PkceChallenge, PkceStore};
pub use saml::{AssertionValidator, SamlService, SamlSpService};
pub use selftest::{DiagnosticsRunner, SelfTestReport, SelfTestRunner};
pub use sync::{SyncJob, UserSyncService};

use crate::{config::RouterConfig, guard::RedirectUriFilter};

/// Everything the dispatcher and flow handlers can call out to.
///
/// Subsystems that are not configured are `None`; the dispatcher treats
/// absence as "not installed" and routes accordingly.
#[derive(Clone)]
pub struct Services {
    pub identity: Arc<dyn IdentityProvider>,
    pub saml: Arc<dyn SamlService>,
    pub mail: Option<Arc<dyn MailAuthorizationService>>,
    pub pkce: Option<Arc<PkceStore>>,
    pub sync_push: Option<Arc<dyn UserSyncService>>,
    pub sync_queue: Option<Arc<dyn UserSyncService>>,
    pub self_test: Arc<dyn SelfTestRunner>,
    /// Optional override for the strict-mode expected redirect URI.
    pub redirect_uri_filter: Option<RedirectUriFilter>,
}

impl Services {
    /// Wire up the default implementations for a configuration.
    ///
    /// Mail and sync backends stay `None` unless their sections enable them;
    /// callers embedding the router replace individual seams as needed.
    pub fn from_config(config: &RouterConfig, http: reqwest::Client) -> Self {
        let identity = identity_provider_from_config(&config.sso, http);
        let saml: Arc<dyn SamlService> = Arc::new(SamlSpService::new(config.sso.saml.clone()));

        let mail: Option<Arc<dyn MailAuthorizationService>> = if config.mailer.enabled {
            Some(Arc::new(NullMailService::default()))
        } else {
            None
        };

        let pkce = config.sso.oidc.use_pkce.then(|| Arc::new(PkceStore::new()));

        Self {
            identity,
            saml,
            mail,
            pkce,
            sync_push: None,
            sync_queue: None,
            self_test: Arc::new(DiagnosticsRunner::default()),
            redirect_uri_filter: None,
        }
    }
}
