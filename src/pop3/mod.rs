//! Retrieving messages over POP3.

mod client;
mod retriever;
mod types;

pub use self::client::Client;
pub use self::retriever::{Pop3Connector, Pop3Messages, Pop3Retriever};
pub use self::types::{MailboxStats, MessageInfo};
