//! Delegated mail-authorization seam.
//!
//! The mail-consent flow exchanges an authorization code for Graph send
//! permissions and hands the resulting tokens to the mail subsystem, which
//! lives outside this crate. The router only needs to know whether the
//! mailer is plugged in and whether authorization succeeded.

use async_trait::async_trait;

use crate::error::RouterError;

/// Graph scope for sending as the signed-in user.
pub const MAIL_SEND_SCOPE: &str = "https://graph.microsoft.com/Mail.Send";
/// Graph scope for sending from a shared mailbox.
pub const MAIL_SEND_SHARED_SCOPE: &str = "https://graph.microsoft.com/Mail.Send.Shared";

#[async_trait]
pub trait MailAuthorizationService: Send + Sync {
    /// Whether the host's mail pipeline is actually routed through the
    /// delegated mailer. When it is not, consent would be pointless and the
    /// flow redirects without exchanging anything.
    fn is_plugged(&self) -> bool;

    /// Turn the freshly exchanged tokens into an authorized mail user.
    async fn authorize_mail_user(&self) -> Result<(), RouterError>;
}

/// Placeholder wiring for deployments that enable the mailer section but
/// have not connected a mail subsystem yet: consent completes, authorization
/// reports failure.
#[derive(Debug, Default)]
pub struct NullMailService;

#[async_trait]
impl MailAuthorizationService for NullMailService {
    fn is_plugged(&self) -> bool {
        true
    }

    async fn authorize_mail_user(&self) -> Result<(), RouterError> {
        Err(RouterError::Internal(
            "no mail subsystem connected".into(),
        ))
    }
}

/// Select the Graph send scope for a consent exchange.
pub fn send_scope(send_shared: bool) -> &'static str {
    if send_shared {
        MAIL_SEND_SHARED_SCOPE
    } else {
        MAIL_SEND_SCOPE
    }
}
