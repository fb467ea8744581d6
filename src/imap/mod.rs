//! Retrieving messages over IMAP.
//!
//! [`ImapRetriever`] lists mailboxes and message ids, and hands out the raw content of the
//! messages a [`RetrieveRequest`] selects as a lazy [`Retrieval`].

mod client;
mod parse;
mod retriever;
mod selector;
mod types;

pub use self::client::Client;
pub use self::retriever::{ImapConnector, ImapRetriever, Retrieval};
pub use self::selector::{
    check_ids, expand_id_ranges, expand_ids, parse_id_ranges, IdResolver, IdSpec, MailboxResolver,
    MessageIdSelector, RetrieveRequest, SearchQuery, SearchSection,
};
pub use self::types::{MailboxLabel, Seq};
