//! Queue module for RabbitMQ operations.
//!
//! This module provides:
//! - The mail message type carried on the `mail` queue
//! - The broker client owning the connection and channel
//! - A publisher handle for producers
//!
//! ## Architecture
//!
//! ```text
//! API signup → Publisher → mail queue → WorkerPool → MailSender → SMTP
//! ```

pub mod broker;
pub mod publisher;
pub mod types;

pub use broker::BrokerClient;
pub use publisher::{BrokerError, MessagePublisher, Publisher};
pub use types::{MailKind, MailMessage, DEFAULT_EXCHANGE, MAIL_QUEUE, MAIL_ROUTING_KEY};
