//! User signup: enqueue the confirmation mail.
//!
//! The signup call publishes one text message to the `mail` queue and
//! returns as soon as the broker accepts it. Whether the mail is actually
//! delivered is decided later by the mailer, invisibly to the caller.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, info_span, Instrument, Span};

use crate::queue::{BrokerError, MailMessage, MessagePublisher, DEFAULT_EXCHANGE, MAIL_ROUTING_KEY};

/// Subject of the signup confirmation mail.
pub const SIGNUP_SUBJECT: &str = "Signup successful";

/// Body of the signup confirmation mail.
pub const SIGNUP_BODY: &str = "Please check your email for the verification link.";

/// Message returned to the client.
pub const SIGNUP_RESPONSE: &str = "Signup successful. Please check your email for the verification link.";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignupRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignupResponse {
    pub message: String,
}

#[derive(Debug, Error)]
pub enum SignupError {
    #[error("email is required")]
    MissingEmail,

    #[error("failed to encode mail message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to enqueue signup mail: {0}")]
    Publish(#[from] BrokerError),
}

/// Producer side of the mail pipeline.
#[derive(Clone)]
pub struct SignupService {
    publisher: Arc<dyn MessagePublisher>,
    from: String,
    span: Span,
}

impl SignupService {
    pub fn new(publisher: Arc<dyn MessagePublisher>, from: impl Into<String>, parent: &Span) -> Self {
        Self {
            publisher,
            from: from.into(),
            span: info_span!(parent: parent, "signup"),
        }
    }

    /// The confirmation mail for `email`.
    pub fn signup_message(&self, email: &str) -> MailMessage {
        MailMessage::text(
            self.from.clone(),
            vec![email.to_string()],
            SIGNUP_SUBJECT,
            SIGNUP_BODY,
        )
    }

    /// Enqueue the confirmation mail and acknowledge the signup.
    ///
    /// Fails only if the message cannot be published.
    pub async fn sign_up(&self, request: SignupRequest) -> Result<SignupResponse, SignupError> {
        let email = request
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or(SignupError::MissingEmail)?;

        let body = serde_json::to_vec(&self.signup_message(email))?;

        if let Err(e) = self
            .publisher
            .publish(DEFAULT_EXCHANGE, MAIL_ROUTING_KEY, &body)
            .instrument(self.span.clone())
            .await
        {
            error!(parent: &self.span, email = %email, error = %e, "signup_publish_failed");
            return Err(e.into());
        }

        info!(
            parent: &self.span,
            email = %email,
            routing_key = MAIL_ROUTING_KEY,
            body_length = body.len(),
            "signup_mail_enqueued"
        );

        Ok(SignupResponse {
            message: SIGNUP_RESPONSE.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::queue::MailKind;

    #[derive(Default)]
    struct RecordingPublisher {
        published: Mutex<Vec<(String, String, Vec<u8>)>>,
        closed: bool,
    }

    #[async_trait]
    impl MessagePublisher for RecordingPublisher {
        async fn publish(&self, exchange: &str, routing_key: &str, body: &[u8]) -> Result<(), BrokerError> {
            if self.closed {
                return Err(BrokerError::NotConnected);
            }
            self.published
                .lock()
                .unwrap()
                .push((exchange.to_string(), routing_key.to_string(), body.to_vec()));
            Ok(())
        }
    }

    fn request(email: Option<&str>) -> SignupRequest {
        SignupRequest {
            email: email.map(str::to_string),
            password: Some("hunter2".to_string()),
        }
    }

    #[tokio::test]
    async fn test_signup_publishes_one_text_message() {
        let publisher = Arc::new(RecordingPublisher::default());
        let service = SignupService::new(publisher.clone(), "noreply@example.com", &Span::none());

        let response = service.sign_up(request(Some("user@example.com"))).await.unwrap();
        assert_eq!(response.message, SIGNUP_RESPONSE);

        let published = publisher.published.lock().unwrap();
        assert_eq!(published.len(), 1);

        let (exchange, routing_key, body) = &published[0];
        assert_eq!(exchange, "");
        assert_eq!(routing_key, "mail");

        let message: MailMessage = serde_json::from_slice(body).unwrap();
        assert_eq!(message.to, vec!["user@example.com".to_string()]);
        assert_eq!(message.kind, MailKind::Text);
        assert_eq!(message.subject, "Signup successful");
        assert_eq!(message.from, "noreply@example.com");
        assert!(!String::from_utf8_lossy(body).contains("hunter2"));
    }

    #[tokio::test]
    async fn test_publish_failure_fails_signup() {
        let publisher = Arc::new(RecordingPublisher {
            closed: true,
            ..Default::default()
        });
        let service = SignupService::new(publisher, "noreply@example.com", &Span::none());

        let err = service.sign_up(request(Some("user@example.com"))).await.unwrap_err();
        assert!(matches!(err, SignupError::Publish(BrokerError::NotConnected)));
    }

    #[tokio::test]
    async fn test_missing_email_publishes_nothing() {
        let publisher = Arc::new(RecordingPublisher::default());
        let service = SignupService::new(publisher.clone(), "noreply@example.com", &Span::none());

        for email in [None, Some(""), Some("   ")] {
            let err = service.sign_up(request(email)).await.unwrap_err();
            assert!(matches!(err, SignupError::MissingEmail));
        }
        assert!(publisher.published.lock().unwrap().is_empty());
    }
}
