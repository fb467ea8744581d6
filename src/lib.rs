//! Send mail over SMTP and retrieve it over POP3 and IMAP.
//!
//! Every network operation runs inside a scoped session: it connects, logs in, does its work
//! and logs out again on every path out, including errors and early abandonment of a lazy
//! message sequence. Nothing is pooled or kept open between calls.
//!
//! # Usage
//!
//! Composing and sending a message:
//!
//! ```no_run
//! use smtpemail::{Credentials, MessageBuilder, MessageSpec, SmtpSender};
//!
//! fn main() -> smtpemail::Result<()> {
//!     let message = MessageBuilder::new().build(
//!         &MessageSpec::new("me@example.com", "you@example.org")
//!             .subject("Lunch")
//!             .text("Noon at the usual place?")
//!             .html("<p>Noon at <b>the usual place</b>?</p>"),
//!     )?;
//!
//!     let credentials = Credentials::new("smtp.example.com", "me@example.com", "secret");
//!     let sender = SmtpSender::new(credentials)?;
//!     println!("{}", sender.send(&message)?);
//!     Ok(())
//! }
//! ```
//!
//! Retrieving and deleting every message from one sender:
//!
//! ```no_run
//! use smtpemail::imap::{ImapRetriever, RetrieveRequest, SearchSection};
//! use smtpemail::Credentials;
//!
//! fn main() -> smtpemail::Result<()> {
//!     let retriever = ImapRetriever::new(Credentials::new("imap.example.com", "me", "secret"))?;
//!     let request = RetrieveRequest::new()
//!         .mailbox("INBOX")
//!         .search(SearchSection::From, "boss@example.com")
//!         .delete(true);
//!     for message in retriever.retrieve(request)? {
//!         println!("{}", String::from_utf8_lossy(&message?));
//!     }
//!     Ok(())
//! }
//! ```

mod conn;
mod utils;

pub mod credentials;
pub mod error;
pub mod imap;
pub mod message;
pub mod pop3;
pub mod session;
pub mod smtp;

pub use crate::conn::{TlsOptions, DEFAULT_TIMEOUT};
pub use crate::credentials::{Credentials, Profile, Protocol};
pub use crate::error::{Error, Result};
pub use crate::imap::ImapRetriever;
pub use crate::message::{Body, ComposedMessage, MessageBuilder, MessageSpec};
pub use crate::pop3::Pop3Retriever;
pub use crate::session::{ScopedSession, SessionExit};
pub use crate::smtp::SmtpSender;

#[cfg(test)]
mod mock_stream;
