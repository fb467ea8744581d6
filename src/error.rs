//! Error types used throughout the crate.

use std::error::Error as StdError;
use std::fmt;
use std::io::Error as IoError;
use std::net::TcpStream;
use std::result;
use std::str::Utf8Error;

use lettre::error::Error as EmailError;
use lettre::transport::smtp::Error as SmtpError;
use native_tls::Error as TlsError;
use native_tls::HandshakeError as TlsHandshakeError;

/// A convenience wrapper around `Result` for `smtpemail::Error`.
pub type Result<T> = result::Result<T, Error>;

/// A set of errors that can occur while composing, sending or retrieving mail.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// A required configuration or message field was absent or empty.
    MissingField(&'static str),
    /// An address lacks a domain part or could not be parsed.
    MalformedAddress(String),
    /// A custom header has an invalid name or collides with a protected header.
    InvalidHeader(String),
    /// The message could not be assembled by the MIME builder.
    Email(EmailError),
    /// A retrieval request carried more than one selector, or a bad id set.
    InvalidSelector(String),
    /// The server answered a command with a non-OK status. Carries its diagnostic verbatim.
    Protocol(String),
    /// The server rejected the supplied account or secret.
    Auth(String),
    /// A search query matched no messages.
    NotFound(String),
    /// A mailbox had to be chosen but no resolver was supplied, or the resolver declined.
    SelectionRequired,
    /// A session was acquired while another one from the same descriptor was still open.
    AlreadyConnected,
    /// An `io::Error` that occurred while trying to read or write to a network stream.
    Io(IoError),
    /// An error from the `native_tls` library during the TLS handshake.
    TlsHandshake(TlsHandshakeError<TcpStream>),
    /// An error from the `native_tls` library while managing the socket.
    Tls(TlsError),
    /// An error from the SMTP transport.
    Smtp(SmtpError),
    /// The connection was terminated unexpectedly.
    ConnectionLost,
    /// Error parsing a server response.
    Parse(ParseError),
    /// Error validating input data.
    Validate(ValidateError),
}

impl Error {
    /// Whether this error came from the network or TLS layer rather than from a server reply.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::TlsHandshake(_)
                | Error::Tls(_)
                | Error::Smtp(_)
                | Error::ConnectionLost
        )
    }
}

impl From<IoError> for Error {
    fn from(err: IoError) -> Error {
        Error::Io(err)
    }
}

impl From<TlsHandshakeError<TcpStream>> for Error {
    fn from(err: TlsHandshakeError<TcpStream>) -> Error {
        Error::TlsHandshake(err)
    }
}

impl From<TlsError> for Error {
    fn from(err: TlsError) -> Error {
        Error::Tls(err)
    }
}

impl From<SmtpError> for Error {
    fn from(err: SmtpError) -> Error {
        Error::Smtp(err)
    }
}

impl From<EmailError> for Error {
    fn from(err: EmailError) -> Error {
        Error::Email(err)
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Error {
        Error::Parse(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::MissingField(field) => write!(f, "{} is missing", field),
            Error::MalformedAddress(ref addr) => write!(f, "Malformed address: {}", addr),
            Error::InvalidHeader(ref name) => write!(f, "Invalid custom header: {}", name),
            Error::Email(ref e) => fmt::Display::fmt(e, f),
            Error::InvalidSelector(ref why) => write!(f, "Invalid message selector: {}", why),
            Error::Protocol(ref data) => write!(f, "Protocol error: {}", data),
            Error::Auth(ref data) => write!(f, "Authentication failed: {}", data),
            Error::NotFound(ref query) => write!(f, "No messages match {}", query),
            Error::SelectionRequired => f.write_str("A selection is required but no resolver was given"),
            Error::AlreadyConnected => f.write_str("Session is already connected"),
            Error::Io(ref e) => fmt::Display::fmt(e, f),
            Error::TlsHandshake(ref e) => fmt::Display::fmt(e, f),
            Error::Tls(ref e) => fmt::Display::fmt(e, f),
            Error::Smtp(ref e) => fmt::Display::fmt(e, f),
            Error::ConnectionLost => f.write_str("Connection Lost"),
            Error::Parse(ref e) => fmt::Display::fmt(e, f),
            Error::Validate(ref e) => fmt::Display::fmt(e, f),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match *self {
            Error::Io(ref e) => Some(e),
            Error::Tls(ref e) => Some(e),
            Error::TlsHandshake(ref e) => Some(e),
            Error::Smtp(ref e) => Some(e),
            Error::Email(ref e) => Some(e),
            Error::Parse(ParseError::DataNotUtf8(_, ref e)) => Some(e),
            _ => None,
        }
    }
}

/// An error occured while trying to parse a server response or caller input.
#[derive(Debug)]
pub enum ParseError {
    /// The server response could not be understood.
    Invalid(Vec<u8>),
    /// A POP3 status line did not have the expected shape.
    Status(String),
    /// A message id range string could not be parsed.
    IdRange(String),
    /// The server response contained text that was not valid UTF-8.
    DataNotUtf8(Vec<u8>, Utf8Error),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ParseError::Invalid(_) => f.write_str("Unable to parse server response"),
            ParseError::Status(ref line) => write!(f, "Unable to parse status line: {}", line),
            ParseError::IdRange(ref input) => write!(f, "Unable to parse id range {:?}", input),
            ParseError::DataNotUtf8(_, _) => f.write_str("Unable to parse data as UTF-8 text"),
        }
    }
}

impl StdError for ParseError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match *self {
            ParseError::DataNotUtf8(_, ref e) => Some(e),
            _ => None,
        }
    }
}

/// An invalid character was found in a command argument.
#[derive(Debug)]
pub struct ValidateError(pub char);

impl fmt::Display for ValidateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // print character in debug form because invalid ones are often whitespaces
        write!(f, "Invalid character in input: {:?}", self.0)
    }
}

impl StdError for ValidateError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_field_names_the_field() {
        assert_eq!(
            Error::MissingField("sender_address").to_string(),
            "sender_address is missing"
        );
    }

    #[test]
    fn transport_kinds() {
        assert!(Error::ConnectionLost.is_transport());
        assert!(Error::Io(IoError::new(std::io::ErrorKind::TimedOut, "slow")).is_transport());
        assert!(!Error::Protocol("NO nope".into()).is_transport());
        assert!(!Error::Auth("bad password".into()).is_transport());
    }

    #[test]
    fn validate_error_shows_escaped_char() {
        assert_eq!(
            Error::Validate(ValidateError('\n')).to_string(),
            "Invalid character in input: '\\n'"
        );
    }
}
