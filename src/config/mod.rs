//! Configuration module for the authentication-response router.
//!
//! The router is configured via a TOML file, with support for environment
//! variable interpolation using `${VAR_NAME}` syntax.
//!
//! # Example
//!
//! ```toml
//! [server]
//! base_url = "https://www.example.com"
//! home_url = "https://www.example.com"
//!
//! [sso]
//! provider = "oidc"
//! redirect_url_strict = true
//!
//! [sso.oidc]
//! client_id = "${SSO_CLIENT_ID}"
//! tenant_id = "contoso.onmicrosoft.com"
//! redirect_url = "https://www.example.com/sso-callback"
//! ```

mod observability;
mod server;
mod sso;

use std::path::Path;

pub use observability::*;
use serde::{Deserialize, Serialize};
pub use server::*;
pub use sso::*;

/// Root configuration for the router.
///
/// All sections are optional with defaults, allowing a minimal file for
/// simple deployments. Strict-mode enforcement degrades gracefully (with
/// warnings) while the configuration is incomplete.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RouterConfig {
    /// HTTP server and site URL configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Single-sign-on configuration: provider selection, strict mode,
    /// OIDC and SAML settings.
    #[serde(default)]
    pub sso: SsoConfig,

    /// Delegated mail-authorization configuration.
    #[serde(default)]
    pub mailer: MailerConfig,

    /// External user-synchronization trigger configuration.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Logging configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl RouterConfig {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables in the format `${VAR_NAME}` are expanded.
    /// Missing required variables cause an error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;
        let config: RouterConfig = toml::from_str(&expanded).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for consistency and completeness.
    fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.sso.validate()?;
        Ok(())
    }

    /// A minimal, internally consistent configuration for unit tests.
    #[doc(hidden)]
    pub fn for_tests(base_url: &str) -> Self {
        let mut config = Self::default();
        config.server.base_url = base_url.to_string();
        config.server.home_url = base_url.to_string();
        config.sso.oidc.client_id = "test-client".to_string();
        config.sso.oidc.redirect_url = format!("{base_url}/sso-callback");
        config.sso.saml.sp_acs_url = format!("{base_url}/saml/acs");
        config.sso.saml.idp_sso_url = "https://idp.example.net/sso".to_string();
        config.sso.error_url = format!("{base_url}/login-error");
        config
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Expand environment variables in the format `${VAR_NAME}`.
/// Skips commented lines (variables appearing after a `#` are left alone).
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").unwrap();
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');

        let mut line_result = String::with_capacity(line.len());
        let mut last_end = 0;

        for cap in re.captures_iter(line) {
            let match_start = cap.get(0).unwrap().start();

            if let Some(pos) = comment_pos
                && match_start >= pos
            {
                continue;
            }

            line_result.push_str(&line[last_end..match_start]);

            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            line_result.push_str(&value);

            last_end = cap.get(0).unwrap().end();
        }

        line_result.push_str(&line[last_end..]);
        result.push_str(&line_result);
        result.push('\n');
    }

    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config() {
        let config = RouterConfig::from_str(
            r#"
            [server]
            base_url = "https://www.example.com"
        "#,
        )
        .unwrap();

        assert_eq!(config.server.base_url, "https://www.example.com");
        assert!(config.sso.redirect_url_strict);
        assert!(!config.sso.no_sso);
    }

    #[test]
    fn test_full_config() {
        let config = RouterConfig::from_str(
            r#"
            [server]
            host = "127.0.0.1"
            port = 9090
            base_url = "https://www.example.com"
            home_url = "https://www.example.com"

            [sso]
            provider = "saml"
            redirect_url_strict = false
            error_url = "https://www.example.com/denied"

            [sso.oidc]
            client_id = "client-1"
            tenant_id = "contoso.onmicrosoft.com"
            flow = "code"
            redirect_url = "https://www.example.com/sso-callback"
            use_pkce = true

            [sso.saml]
            sp_entity_id = "https://www.example.com"
            sp_acs_url = "https://www.example.com/saml/acs"
            idp_sso_url = "https://idp.example.net/sso"

            [mailer]
            enabled = true
            send_shared = true

            [sync]
            queue_enabled = true
        "#,
        )
        .unwrap();

        assert_eq!(config.sso.provider, SsoProviderType::Saml);
        assert_eq!(config.sso.oidc.flow, OidcFlow::Code);
        assert!(config.sso.oidc.use_pkce);
        assert!(config.mailer.enabled);
        assert!(config.sync.queue_enabled);
        assert!(!config.sync.push_enabled);
    }

    #[test]
    fn test_env_var_expansion() {
        temp_env::with_var("TEST_SSO_CLIENT", Some("client-from-env"), || {
            let result = expand_env_vars("client_id = \"${TEST_SSO_CLIENT}\"").unwrap();
            assert_eq!(result, "client_id = \"client-from-env\"");
        });
    }

    #[test]
    fn test_env_var_in_comment_ignored() {
        let result = expand_env_vars("# client_id = \"${NONEXISTENT_VAR}\"").unwrap();
        assert_eq!(result, "# client_id = \"${NONEXISTENT_VAR}\"");
    }

    #[test]
    fn test_missing_env_var_is_an_error() {
        let result = expand_env_vars("client_id = \"${DEFINITELY_NOT_SET_ANYWHERE}\"");
        assert!(matches!(result, Err(ConfigError::EnvVarNotFound(_))));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = RouterConfig::from_str("[serverr]\nbase_url = \"https://x\"");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let result = RouterConfig::from_str(
            r#"
            [server]
            base_url = "not a url"
        "#,
        );
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_b2c_requires_domain() {
        let result = RouterConfig::from_str(
            r#"
            [server]
            base_url = "https://www.example.com"

            [sso.oidc]
            client_id = "client-1"
            variant = "b2c"
        "#,
        );
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }
}
