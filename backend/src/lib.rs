//! OpenGraph backend - Open Graph previews and a queue-backed signup mailer.
//!
//! This library provides shared modules for the two binaries:
//! - `og-api`: HTTP API for previews, metadata and signup
//! - `og-mailer`: Worker pool that delivers queued mail over SMTP
//!
//! ## Architecture
//!
//! ```text
//! POST /user/signup → SignupService → mail queue → WorkerPool → MailSender → SMTP
//! ```

pub mod config;
pub mod consumer;
pub mod mail;
pub mod opengraph;
pub mod queue;
pub mod signup;
pub mod telemetry;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use consumer::{WorkerPool, WorkerPoolConfig};
pub use mail::{MailError, MailSender, Mailer, SmtpCredentials, SmtpTransport, TemplateRenderer};
pub use opengraph::{Metadata, OpenGraphClient};
pub use queue::{BrokerClient, BrokerError, MailKind, MailMessage, MessagePublisher, Publisher, MAIL_QUEUE};
pub use signup::SignupService;
pub use web::AppState;
