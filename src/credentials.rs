//! Server endpoints and account secrets for each protocol role.

use std::fmt;

use crate::error::{Error, Result};

/// The role a set of [`Credentials`] is used for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Outgoing mail, upgraded with `STARTTLS`.
    Smtp,
    /// POP3 over implicit TLS.
    Pop3,
    /// IMAP over implicit TLS.
    Imap,
}

impl Protocol {
    /// The port used when the credentials do not name one.
    pub fn default_port(self) -> u16 {
        match self {
            Protocol::Smtp => 25,
            Protocol::Pop3 => 995,
            Protocol::Imap => 993,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Protocol::Smtp => "SMTP",
            Protocol::Pop3 => "POP3",
            Protocol::Imap => "IMAP",
        })
    }
}

/// Where to connect and how to log in.
///
/// This is a plain value. Required fields are checked by the client that consumes it, see
/// [`Credentials::validate`].
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Host name of the server. Also used for TLS hostname verification.
    pub server: String,
    /// Port to connect to. `None` means the protocol's default port.
    pub port: Option<u16>,
    /// Account (user) name.
    pub account: String,
    /// Password or application secret.
    pub secret: String,
}

impl Credentials {
    /// Make new credentials that connect to the protocol's default port.
    pub fn new(
        server: impl Into<String>,
        account: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Credentials {
            server: server.into(),
            port: None,
            account: account.into(),
            secret: secret.into(),
        }
    }

    /// Connect to `port` instead of the protocol's default.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// The port to use for `protocol`.
    pub fn port_for(&self, protocol: Protocol) -> u16 {
        self.port.unwrap_or_else(|| protocol.default_port())
    }

    /// Check that server, account and secret are all present.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("server", &self.server),
            ("account", &self.account),
            ("secret", &self.secret),
        ] {
            if value.trim().is_empty() {
                return Err(Error::MissingField(field));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("account", &self.account)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// The credentials one user holds, one optional set per role.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Profile {
    /// Credentials for sending.
    pub smtp: Option<Credentials>,
    /// Credentials for POP3 retrieval.
    pub pop3: Option<Credentials>,
    /// Credentials for IMAP retrieval.
    pub imap: Option<Credentials>,
}

impl Profile {
    /// The credentials held for `protocol`, if any.
    pub fn get(&self, protocol: Protocol) -> Option<&Credentials> {
        match protocol {
            Protocol::Smtp => self.smtp.as_ref(),
            Protocol::Pop3 => self.pop3.as_ref(),
            Protocol::Imap => self.imap.as_ref(),
        }
    }

    /// Store `credentials` for `protocol`, replacing what was there.
    pub fn set(&mut self, protocol: Protocol, credentials: Credentials) {
        let slot = match protocol {
            Protocol::Smtp => &mut self.smtp,
            Protocol::Pop3 => &mut self.pop3,
            Protocol::Imap => &mut self.imap,
        };
        *slot = Some(credentials);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ports() {
        let creds = Credentials::new("mail.example.com", "me", "pw");
        assert_eq!(creds.port_for(Protocol::Smtp), 25);
        assert_eq!(creds.port_for(Protocol::Pop3), 995);
        assert_eq!(creds.port_for(Protocol::Imap), 993);
        assert_eq!(creds.with_port(2525).port_for(Protocol::Smtp), 2525);
    }

    #[test]
    fn validate_reports_first_missing_field() {
        let err = Credentials::new("", "me", "pw").validate().unwrap_err();
        assert!(matches!(err, Error::MissingField("server")));
        let err = Credentials::new("host", " ", "pw").validate().unwrap_err();
        assert!(matches!(err, Error::MissingField("account")));
        let err = Credentials::new("host", "me", "").validate().unwrap_err();
        assert!(matches!(err, Error::MissingField("secret")));
        assert!(Credentials::new("host", "me", "pw").validate().is_ok());
    }

    #[test]
    fn debug_hides_secret() {
        let shown = format!("{:?}", Credentials::new("host", "me", "hunter2"));
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains("<redacted>"));
    }

    #[test]
    fn profile_holds_roles_independently() {
        let mut profile = Profile::default();
        assert!(profile.get(Protocol::Imap).is_none());
        profile.set(Protocol::Imap, Credentials::new("imap.example.com", "me", "pw"));
        assert_eq!(profile.get(Protocol::Imap).unwrap().server, "imap.example.com");
        assert!(profile.get(Protocol::Smtp).is_none());
    }
}
