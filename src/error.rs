use std::fmt;

/// Errors raised while classifying or processing an authentication response.
///
/// None of these escape to the HTTP framework: the dispatch layer converts
/// every user-visible failure into a redirect to the configured error landing
/// page. The error code carried on that redirect is deliberately coarse so a
/// failed login never reveals why it failed.
#[derive(Debug)]
pub enum RouterError {
    /// The `state` / relay parameter did not decode to a safe absolute URL.
    /// The flow is aborted; no redirect is ever issued based on the value.
    InvalidStateUrl,

    /// The inbound ID token's `aud` claim does not match the configured
    /// client. Handled silently: the request is treated as unmatched.
    AudienceMismatch,

    /// An authorization code arrived but the code flow is not configured.
    UnsupportedFlow,

    /// The IdP reported an error via the `error` callback parameter.
    Protocol {
        error: String,
        description: Option<String>,
    },

    /// A SAML response could not be authenticated.
    Saml(String),

    /// An external sync trigger referenced a job that does not exist.
    SyncJobNotFound { job_id: String },

    /// A collaborator (token endpoint, mail service) failed.
    Internal(String),
}

/// Coarse error codes appended to the error-landing redirect
/// (`?login_error=<code>`). Kept generic so the redirect leaks nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Generic "something went wrong, check the server log".
    CheckLog,
    /// SAML 2.0 response processing failed.
    Saml,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::CheckLog => "check_log",
            ErrorCode::Saml => "saml2_error",
        }
    }
}

impl RouterError {
    /// The error code shown to the user for this failure.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            RouterError::Saml(_) => ErrorCode::Saml,
            _ => ErrorCode::CheckLog,
        }
    }
}

impl fmt::Display for RouterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouterError::InvalidStateUrl => {
                write!(f, "State parameter is not a valid absolute http(s) URL")
            }
            RouterError::AudienceMismatch => {
                write!(f, "ID token audience does not match the configured client")
            }
            RouterError::UnsupportedFlow => write!(
                f,
                "An authorization code was received but the authorization code flow is not configured"
            ),
            RouterError::Protocol { error, description } => match description {
                Some(d) => write!(f, "IdP reported an error: {} ({})", error, d),
                None => write!(f, "IdP reported an error: {}", error),
            },
            RouterError::Saml(msg) => write!(f, "Could not process SAML 2.0 response: {}", msg),
            RouterError::SyncJobNotFound { job_id } => {
                write!(f, "No user-synchronization job found for ID {}", job_id)
            }
            RouterError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for RouterError {}
