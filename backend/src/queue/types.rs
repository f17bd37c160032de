//! Queue message types.
//!
//! The `mail` queue carries JSON-encoded [`MailMessage`] values. Producers
//! publish them on the default exchange with the queue name as routing key.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Queue name for outgoing mail.
pub const MAIL_QUEUE: &str = "mail";

/// Routing key used with the default exchange to reach [`MAIL_QUEUE`].
pub const MAIL_ROUTING_KEY: &str = "mail";

/// The default (direct) exchange.
pub const DEFAULT_EXCHANGE: &str = "";

/// How the body of a [`MailMessage`] is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailKind {
    /// `body` is sent verbatim as `text/plain`.
    Text,
    /// `body` is sent verbatim as `text/html`.
    Html,
    /// `template_name` is rendered with `template_data` and sent as `text/html`.
    Template,
    /// Any other value on the wire. Sending rejects it.
    #[serde(other)]
    Unrecognized,
}

/// A unit of mail work carried through the queue.
///
/// Snake-case keys are canonical. The PascalCase aliases accept payloads from
/// publishers that serialize field names as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailMessage {
    /// Sender address. Empty means the mailer's configured default sender.
    #[serde(default, alias = "From")]
    pub from: String,
    /// Recipients, in order
    #[serde(default, alias = "To")]
    pub to: Vec<String>,
    /// Subject line
    #[serde(default, alias = "Subject")]
    pub subject: String,
    /// Raw body for `text` and `html` messages
    #[serde(default, alias = "Body")]
    pub body: String,
    /// Template path relative to the template root, for `template` messages
    #[serde(default, alias = "TemplateName")]
    pub template_name: String,
    /// Data handed to the template
    #[serde(default, alias = "Data")]
    pub template_data: Value,
    /// Body kind
    #[serde(rename = "type", alias = "Type")]
    pub kind: MailKind,
}

impl MailMessage {
    /// Create a plain-text message.
    pub fn text(
        from: impl Into<String>,
        to: Vec<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to,
            subject: subject.into(),
            body: body.into(),
            template_name: String::new(),
            template_data: Value::Null,
            kind: MailKind::Text,
        }
    }

    /// Create an HTML message.
    pub fn html(
        from: impl Into<String>,
        to: Vec<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            kind: MailKind::Html,
            ..Self::text(from, to, subject, body)
        }
    }

    /// Create a message rendered from a template.
    pub fn template(
        from: impl Into<String>,
        to: Vec<String>,
        subject: impl Into<String>,
        template_name: impl Into<String>,
        template_data: Value,
    ) -> Self {
        Self {
            template_name: template_name.into(),
            template_data,
            kind: MailKind::Template,
            ..Self::text(from, to, subject, "")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mail_message_wire_format() {
        let msg = MailMessage::text(
            "noreply@example.com",
            vec!["a@example.com".to_string()],
            "Hi",
            "hello",
        );

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["to"][0], "a@example.com");
        assert_eq!(json["subject"], "Hi");
        assert_eq!(json["template_data"], Value::Null);
    }

    #[test]
    fn test_mail_message_minimal_payload() {
        let json = r#"{"to":["a@example.com"],"subject":"Hi","body":"hello","type":"text"}"#;

        let msg: MailMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.from, "");
        assert_eq!(msg.to, vec!["a@example.com".to_string()]);
        assert_eq!(msg.kind, MailKind::Text);
        assert!(msg.template_name.is_empty());
    }

    #[test]
    fn test_mail_message_pascal_case_aliases() {
        let json = r#"{
            "From": "sender@example.com",
            "To": ["user@example.com"],
            "Subject": "Welcome",
            "Body": "",
            "TemplateName": "signup.html",
            "Data": {"name": "Ada"},
            "Type": "template"
        }"#;

        let msg: MailMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.from, "sender@example.com");
        assert_eq!(msg.kind, MailKind::Template);
        assert_eq!(msg.template_name, "signup.html");
        assert_eq!(msg.template_data["name"], "Ada");
    }

    #[test]
    fn test_unknown_kind_is_preserved_for_the_sender() {
        let json = r#"{"to":["a@example.com"],"subject":"Hi","type":"markdown"}"#;

        let msg: MailMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.kind, MailKind::Unrecognized);
    }

    #[test]
    fn test_missing_kind_is_rejected() {
        let json = r#"{"to":["a@example.com"],"subject":"Hi"}"#;
        assert!(serde_json::from_str::<MailMessage>(json).is_err());
    }
}
