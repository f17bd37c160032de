//! SMTP transport credentials and their validation.

use std::fmt;
use std::net::IpAddr;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Ports the mailer is allowed to submit on.
pub const ALLOWED_PORTS: [u16; 4] = [25, 465, 587, 2525];

/// RFC 952 hostname.
static HOSTNAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z]([a-zA-Z0-9\-]+\.?)*[a-zA-Z0-9]$").expect("Invalid hostname pattern")
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialsError {
    #[error("SMTP username is required")]
    MissingUsername,

    #[error("SMTP password is required")]
    MissingPassword,

    #[error("SMTP host {0:?} is neither an IP address nor a hostname")]
    InvalidHost(String),

    #[error("SMTP port {0} is not one of 25, 465, 587, 2525")]
    InvalidPort(u16),
}

/// Username, password, host and port for the SMTP relay.
///
/// Only constructible through [`SmtpCredentials::new`], so a value in hand
/// has passed validation once. Immutable afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct SmtpCredentials {
    username: String,
    password: String,
    host: String,
    port: u16,
}

impl SmtpCredentials {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> Result<Self, CredentialsError> {
        let credentials = Self {
            username: username.into(),
            password: password.into(),
            host: host.into().trim().to_string(),
            port,
        };
        credentials.validate()?;
        Ok(credentials)
    }

    /// Check every field.
    pub fn validate(&self) -> Result<(), CredentialsError> {
        if self.username.is_empty() {
            return Err(CredentialsError::MissingUsername);
        }
        if self.password.is_empty() {
            return Err(CredentialsError::MissingPassword);
        }
        if !is_ip_or_hostname(&self.host) {
            return Err(CredentialsError::InvalidHost(self.host.clone()));
        }
        if !ALLOWED_PORTS.contains(&self.port) {
            return Err(CredentialsError::InvalidPort(self.port));
        }
        Ok(())
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Debug for SmtpCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

fn is_ip_or_hostname(host: &str) -> bool {
    !host.is_empty() && (host.parse::<IpAddr>().is_ok() || HOSTNAME.is_match(host))
}
