use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use url::Url;

use super::ConfigError;

/// HTTP server and site URL configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Absolute base URL of the site the router fronts. Root-relative
    /// redirect targets are anchored here.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// The site's public home URL, as registered with the identity provider.
    /// Strict-mode enforcement needs this to be distinct from the redirect
    /// URI; when empty, strict mode degrades to processing with a warning.
    #[serde(default)]
    pub home_url: String,
}

impl ServerConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        let parsed = Url::parse(&self.base_url)
            .map_err(|e| ConfigError::Validation(format!("server.base_url: {e}")))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "server.base_url must be an http(s) URL, got scheme '{}'",
                parsed.scheme()
            )));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_url: default_base_url(),
            home_url: String::new(),
        }
    }
}

fn default_host() -> IpAddr {
    "0.0.0.0".parse().unwrap()
}

fn default_port() -> u16 {
    8080
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}
