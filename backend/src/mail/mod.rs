//! Mail composition and SMTP delivery.
//!
//! [`MailSender`] validates a queued [`MailMessage`](crate::queue::MailMessage),
//! renders its body and hands the result to a [`MailTransport`]. The
//! production transport opens one authenticated SMTP session per message.

pub mod credentials;
pub mod sender;
pub mod template;
pub mod transport;

pub use credentials::{CredentialsError, SmtpCredentials, ALLOWED_PORTS};
pub use sender::{Mailer, MailSender};
pub use template::{TemplateRenderer, TemplateRootError};
pub use transport::{MailTransport, SmtpTransport};

use thiserror::Error;

/// Per-message failure, tagged with the stage that rejected it.
#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("at least one recipient required")]
    NoRecipients,

    #[error("invalid recipient address: {0:?}")]
    InvalidRecipient(String),

    #[error("invalid sender address: {0:?}")]
    InvalidSender(String),

    #[error("subject cannot be empty")]
    EmptySubject,

    #[error("invalid type")]
    InvalidType,

    #[error("template error: {0}")]
    Template(String),

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("SMTP error: {0}")]
    Transport(String),
}

impl MailError {
    /// Whether retrying the same message can never succeed.
    ///
    /// Only transport failures are worth another attempt.
    pub fn is_permanent(&self) -> bool {
        !matches!(self, MailError::Transport(_))
    }
}

/// Render an error with its whole source chain.
pub(crate) fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_errors_are_transient() {
        assert!(!MailError::Transport("connection refused".into()).is_permanent());
        assert!(MailError::InvalidType.is_permanent());
        assert!(MailError::NoRecipients.is_permanent());
        assert!(MailError::Template("missing".into()).is_permanent());
        assert!(MailError::InvalidCredentials.is_permanent());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(MailError::InvalidType.to_string(), "invalid type");
        assert_eq!(MailError::InvalidCredentials.to_string(), "invalid credentials");
        assert_eq!(
            MailError::InvalidRecipient("nope".into()).to_string(),
            "invalid recipient address: \"nope\""
        );
    }
}
