//! Validating mail sender.

use async_trait::async_trait;
use email_address::{EmailAddress, Options};
use lettre::message::{header::ContentType, Mailbox};
use lettre::Message;
use tracing::{error, info, info_span, Instrument, Span};

use super::{MailError, MailTransport, SmtpCredentials, SmtpTransport, TemplateRenderer};
use crate::queue::{MailKind, MailMessage};

/// Shortest address accepted as a recipient.
const MIN_RECIPIENT_LENGTH: usize = 4;

/// Something that can send a queued mail message.
#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    async fn send_email(&self, message: &MailMessage) -> Result<(), MailError>;
}

/// Validates, renders and delivers [`MailMessage`]s.
///
/// Configuration is fixed at construction and only read afterwards, so one
/// sender is shared by every worker.
pub struct MailSender<T = SmtpTransport> {
    credentials: SmtpCredentials,
    default_from: String,
    templates: TemplateRenderer,
    transport: T,
    span: Span,
}

impl<T: MailTransport> MailSender<T> {
    pub fn new(
        credentials: SmtpCredentials,
        default_from: impl Into<String>,
        templates: TemplateRenderer,
        transport: T,
        parent: &Span,
    ) -> Self {
        Self {
            credentials,
            default_from: default_from.into(),
            templates,
            transport,
            span: info_span!(parent: parent, "mailer"),
        }
    }

    pub fn credentials(&self) -> &SmtpCredentials {
        &self.credentials
    }

    /// Validate and compose `message` without sending it.
    pub fn compose(&self, message: &MailMessage) -> Result<Message, MailError> {
        let _entered = self.span.enter();

        if let Err(e) = self.credentials.validate() {
            error!(error = %e, "mail_credentials_invalid");
            return Err(MailError::InvalidCredentials);
        }

        validate_recipients(&message.to)?;

        let subject = message.subject.trim();
        if subject.is_empty() {
            return Err(MailError::EmptySubject);
        }

        let (content_type, body) = match message.kind {
            MailKind::Template => (
                ContentType::TEXT_HTML,
                self.templates
                    .render(&message.template_name, &message.template_data)?,
            ),
            MailKind::Text => (ContentType::TEXT_PLAIN, message.body.clone()),
            MailKind::Html => (ContentType::TEXT_HTML, message.body.clone()),
            MailKind::Unrecognized => return Err(MailError::InvalidType),
        };

        let from = if message.from.trim().is_empty() {
            self.default_from.as_str()
        } else {
            message.from.trim()
        };
        let from: Mailbox = from
            .parse()
            .map_err(|_| MailError::InvalidSender(from.to_string()))?;

        let mut builder = Message::builder().from(from).subject(subject);
        for recipient in &message.to {
            let mailbox: Mailbox = recipient
                .parse()
                .map_err(|_| MailError::InvalidRecipient(recipient.clone()))?;
            builder = builder.to(mailbox);
        }

        builder
            .header(content_type)
            .body(body)
            .map_err(|e| MailError::Build(e.to_string()))
    }

    /// Validate, render and deliver `message`.
    ///
    /// Nothing reaches the transport unless every check passes. Delivery is
    /// attempted once.
    pub async fn send_email(&self, message: &MailMessage) -> Result<(), MailError> {
        let composed = self.compose(message)?;

        info!(
            parent: &self.span,
            recipients = ?message.to,
            kind = ?message.kind,
            "mail_sending"
        );

        if let Err(e) = self
            .transport
            .deliver(&self.credentials, composed)
            .instrument(self.span.clone())
            .await
        {
            error!(parent: &self.span, error = %e, "mail_delivery_failed");
            return Err(e);
        }

        info!(parent: &self.span, recipients = ?message.to, "mail_sent");
        Ok(())
    }
}

#[async_trait]
impl<T: MailTransport + 'static> Mailer for MailSender<T> {
    async fn send_email(&self, message: &MailMessage) -> Result<(), MailError> {
        MailSender::send_email(self, message).await
    }
}

/// Every recipient must be present, well-formed and at least four bytes.
///
/// Only bare `local@domain` addresses count as well-formed: display names
/// and domain literals are rejected.
fn validate_recipients(to: &[String]) -> Result<(), MailError> {
    if to.is_empty() {
        return Err(MailError::NoRecipients);
    }

    for recipient in to {
        let valid = !recipient.is_empty()
            && recipient.len() >= MIN_RECIPIENT_LENGTH
            && EmailAddress::parse_with_options(recipient, bare_address_options()).is_ok();
        if !valid {
            error!(recipient = %recipient, "mail_recipient_invalid");
            return Err(MailError::InvalidRecipient(recipient.clone()));
        }
    }

    Ok(())
}

fn bare_address_options() -> Options {
    Options::default()
        .without_display_text()
        .without_domain_literal()
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::*;

    /// Transport that records what it was asked to deliver.
    #[derive(Clone, Default)]
    struct RecordingTransport {
        sent: Arc<Mutex<Vec<Message>>>,
        fail: bool,
    }

    impl RecordingTransport {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        fn count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl MailTransport for RecordingTransport {
        async fn deliver(&self, _credentials: &SmtpCredentials, message: Message) -> Result<(), MailError> {
            self.sent.lock().unwrap().push(message);
            if self.fail {
                Err(MailError::Transport("connection refused".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn template_root() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("og-backend-sender-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("welcome.html"), "<h1>Welcome {{ name }}</h1>").unwrap();
        dir
    }

    fn sender(transport: RecordingTransport) -> MailSender<RecordingTransport> {
        let credentials = SmtpCredentials::new("user", "secret", "smtp.example.com", 2525).unwrap();
        let templates = TemplateRenderer::new(template_root()).unwrap();
        MailSender::new(
            credentials,
            "noreply@example.com",
            templates,
            transport,
            &Span::none(),
        )
    }

    fn text_message(to: &[&str]) -> MailMessage {
        MailMessage::text(
            "sender@example.com",
            to.iter().map(|s| s.to_string()).collect(),
            "Hi",
            "hello",
        )
    }

    fn formatted(message: &Message) -> String {
        String::from_utf8(message.formatted()).unwrap()
    }

    #[tokio::test]
    async fn test_text_message_is_delivered() {
        let transport = RecordingTransport::default();
        let sender = sender(transport.clone());

        sender.send_email(&text_message(&["a@example.com"])).await.unwrap();

        assert_eq!(transport.count(), 1);
        let raw = formatted(&transport.sent.lock().unwrap()[0]);
        assert!(raw.contains("To: a@example.com"));
        assert!(raw.contains("Subject: Hi"));
        assert!(raw.contains("text/plain"));
        assert!(raw.contains("hello"));
    }

    #[tokio::test]
    async fn test_empty_recipients_never_reach_transport() {
        let transport = RecordingTransport::default();
        let sender = sender(transport.clone());

        let err = sender.send_email(&text_message(&[])).await.unwrap_err();

        assert!(matches!(err, MailError::NoRecipients));
        assert_eq!(transport.count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_recipients_never_reach_transport() {
        let transport = RecordingTransport::default();
        let sender = sender(transport.clone());

        for bad in ["not-an-email", "", "a@", "@example.com"] {
            let err = sender.send_email(&text_message(&[bad])).await.unwrap_err();
            assert!(matches!(err, MailError::InvalidRecipient(_)), "{bad:?}");
        }

        // One bad address poisons the whole message.
        let err = sender
            .send_email(&text_message(&["a@example.com", "broken"]))
            .await
            .unwrap_err();
        assert!(matches!(err, MailError::InvalidRecipient(ref r) if r == "broken"));
        assert_eq!(transport.count(), 0);
    }

    #[tokio::test]
    async fn test_display_name_recipient_never_reaches_transport() {
        let transport = RecordingTransport::default();
        let sender = sender(transport.clone());

        let err = sender
            .send_email(&text_message(&["Mallory <a@example.com>"]))
            .await
            .unwrap_err();

        assert!(matches!(err, MailError::InvalidRecipient(ref r) if r == "Mallory <a@example.com>"));
        assert_eq!(transport.count(), 0);
    }

    #[test]
    fn test_validate_recipients_rejects_domain_literal() {
        assert!(validate_recipients(&["a@[127.0.0.1]".to_string()]).is_err());
        assert!(validate_recipients(&["user@example.com".to_string()]).is_ok());
    }

    #[tokio::test]
    async fn test_blank_subject_rejected() {
        let transport = RecordingTransport::default();
        let sender = sender(transport.clone());

        let mut message = text_message(&["a@example.com"]);
        message.subject = "   \t".to_string();

        let err = sender.send_email(&message).await.unwrap_err();
        assert!(matches!(err, MailError::EmptySubject));
        assert_eq!(transport.count(), 0);
    }

    #[tokio::test]
    async fn test_subject_is_trimmed() {
        let transport = RecordingTransport::default();
        let sender = sender(transport.clone());

        let mut message = text_message(&["a@example.com"]);
        message.subject = "  Hi there  ".to_string();
        sender.send_email(&message).await.unwrap();

        let raw = formatted(&transport.sent.lock().unwrap()[0]);
        assert!(raw.contains("Subject: Hi there\r\n"));
    }

    #[tokio::test]
    async fn test_unrecognized_kind_is_invalid_type() {
        let transport = RecordingTransport::default();
        let sender = sender(transport.clone());

        let mut message = text_message(&["a@example.com"]);
        message.kind = MailKind::Unrecognized;

        let err = sender.send_email(&message).await.unwrap_err();
        assert!(matches!(err, MailError::InvalidType));
        assert_eq!(transport.count(), 0);
    }

    #[tokio::test]
    async fn test_html_message() {
        let transport = RecordingTransport::default();
        let sender = sender(transport.clone());

        let message = MailMessage::html(
            "sender@example.com",
            vec!["a@example.com".to_string()],
            "Hi",
            "<b>hello</b>",
        );
        sender.send_email(&message).await.unwrap();

        let raw = formatted(&transport.sent.lock().unwrap()[0]);
        assert!(raw.contains("text/html"));
        assert!(raw.contains("<b>hello</b>"));
    }

    #[tokio::test]
    async fn test_template_message_is_rendered() {
        let transport = RecordingTransport::default();
        let sender = sender(transport.clone());

        let message = MailMessage::template(
            "sender@example.com",
            vec!["a@example.com".to_string()],
            "Welcome",
            "welcome.html",
            json!({"name": "Ada"}),
        );
        sender.send_email(&message).await.unwrap();

        let raw = formatted(&transport.sent.lock().unwrap()[0]);
        assert!(raw.contains("text/html"));
        assert!(raw.contains("<h1>Welcome Ada</h1>"));
    }

    #[tokio::test]
    async fn test_missing_template_is_an_error() {
        let transport = RecordingTransport::default();
        let sender = sender(transport.clone());

        let message = MailMessage::template(
            "sender@example.com",
            vec!["a@example.com".to_string()],
            "Welcome",
            "missing.html",
            json!({}),
        );

        let err = sender.send_email(&message).await.unwrap_err();
        assert!(matches!(err, MailError::Template(_)));
        assert_eq!(transport.count(), 0);
    }

    #[tokio::test]
    async fn test_empty_from_uses_default_sender() {
        let transport = RecordingTransport::default();
        let sender = sender(transport.clone());

        let mut message = text_message(&["a@example.com"]);
        message.from = String::new();
        sender.send_email(&message).await.unwrap();

        let raw = formatted(&transport.sent.lock().unwrap()[0]);
        assert!(raw.contains("From: noreply@example.com"));
    }

    #[tokio::test]
    async fn test_invalid_sender_rejected() {
        let transport = RecordingTransport::default();
        let sender = sender(transport.clone());

        let mut message = text_message(&["a@example.com"]);
        message.from = "not a mailbox".to_string();

        let err = sender.send_email(&message).await.unwrap_err();
        assert!(matches!(err, MailError::InvalidSender(_)));
        assert_eq!(transport.count(), 0);
    }

    #[tokio::test]
    async fn test_transport_failure_propagates() {
        let transport = RecordingTransport::failing();
        let sender = sender(transport.clone());

        let err = sender.send_email(&text_message(&["a@example.com"])).await.unwrap_err();

        assert!(matches!(err, MailError::Transport(_)));
        assert!(!err.is_permanent());
        assert_eq!(transport.count(), 1);
    }

    #[test]
    fn test_validate_recipients_minimum_length() {
        assert!(validate_recipients(&["a@b".to_string()]).is_err());
        assert!(validate_recipients(&["a@bc".to_string()]).is_ok());
    }
}
