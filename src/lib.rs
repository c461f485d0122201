//! gatehouse — an authentication-response router for federated SSO.
//!
//! The router owns a host application's OIDC / SAML 2.0 callback traffic:
//! it classifies every inbound request as one of the supported protocol
//! messages, enforces the redirect-URI integrity check ("strict mode"), and
//! dispatches each request to exactly one flow handler. Token validation,
//! assertion crypto, session issuance and mail delivery live behind the
//! trait seams in [`services`].

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod guard;
pub mod handlers;
pub mod request;
pub mod routes;
pub mod services;
pub mod state_url;
pub mod url_util;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use config::RouterConfig;
use services::Services;

/// Shared application state: configuration plus the wired collaborators.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RouterConfig>,
    pub services: Services,
}

impl AppState {
    /// Wire up the default services for a configuration.
    pub fn new(config: RouterConfig) -> Self {
        let services = Services::from_config(&config, reqwest::Client::new());
        Self {
            config: Arc::new(config),
            services,
        }
    }

    /// Use custom services — embedders replace individual seams (assertion
    /// validator, mail subsystem, sync backends) this way.
    pub fn with_services(config: RouterConfig, services: Services) -> Self {
        Self {
            config: Arc::new(config),
            services,
        }
    }
}

/// Build the axum application.
pub fn build_app(state: AppState) -> axum::Router {
    routes::build_router(state)
}
