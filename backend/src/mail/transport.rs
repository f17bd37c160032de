//! SMTP delivery using lettre.

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::{error_chain, MailError, SmtpCredentials};

/// Port that speaks TLS from the first byte.
const IMPLICIT_TLS_PORT: u16 = 465;

/// Delivers a composed message.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn deliver(&self, credentials: &SmtpCredentials, message: Message) -> Result<(), MailError>;
}

/// Authenticated SMTP submission.
///
/// Builds a fresh transport per message, so every send dials its own
/// session and nothing is pooled between messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmtpTransport;

impl SmtpTransport {
    fn build(credentials: &SmtpCredentials) -> Result<AsyncSmtpTransport<Tokio1Executor>, MailError> {
        let parameters = TlsParameters::new(credentials.host().to_string())
            .map_err(|e| MailError::Transport(error_chain(&e)))?;

        let tls = if credentials.port() == IMPLICIT_TLS_PORT {
            Tls::Wrapper(parameters)
        } else {
            Tls::Opportunistic(parameters)
        };

        Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(credentials.host())
            .port(credentials.port())
            .tls(tls)
            .credentials(Credentials::new(
                credentials.username().to_string(),
                credentials.password().to_string(),
            ))
            .build())
    }
}

#[async_trait]
impl MailTransport for SmtpTransport {
    async fn deliver(&self, credentials: &SmtpCredentials, message: Message) -> Result<(), MailError> {
        let transport = Self::build(credentials)?;

        transport
            .send(message)
            .await
            .map_err(|e| MailError::Transport(error_chain(&e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_builds_for_every_allowed_port() {
        for port in super::super::ALLOWED_PORTS {
            let creds = SmtpCredentials::new("user", "secret", "smtp.example.com", port).unwrap();
            assert!(SmtpTransport::build(&creds).is_ok());
        }
    }

    #[test]
    fn test_transport_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SmtpTransport>();
    }
}
