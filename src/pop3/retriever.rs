use std::cmp::min;
use std::collections::VecDeque;
use std::fmt;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use native_tls::TlsStream;

use super::client::Client;
use super::types::{MailboxStats, MessageInfo};
use crate::conn::TlsOptions;
use crate::credentials::{Credentials, Protocol};
use crate::error::{Error, ParseError, Result};
use crate::session::{Connector, ScopedSession, Session, SessionExit};

/// Connects to a POP3 server over implicit TLS and logs in with `USER`/`PASS`.
#[derive(Clone, Debug, Default)]
pub struct Pop3Connector {
    pub options: TlsOptions,
}

impl Connector for Pop3Connector {
    type Handle = Client<TlsStream<TcpStream>>;

    fn connect(&self, credentials: &Credentials) -> Result<Self::Handle> {
        let port = credentials.port_for(Protocol::Pop3);
        let tls = self.options.connect(&credentials.server, port)?;
        let mut client = Client::new(tls);
        client.read_greeting()?;
        client.login(&credentials.account, &credentials.secret)?;
        Ok(client)
    }
}

/// Retrieves messages from a POP3 maildrop.
///
/// Like [`ImapRetriever`](crate::imap::ImapRetriever), every call opens its own session and
/// ends it with `QUIT`.
pub struct Pop3Retriever<C = Pop3Connector> {
    session: ScopedSession<C>,
}

impl Pop3Retriever<Pop3Connector> {
    /// A retriever using implicit TLS on the credentials' port (995 by default).
    ///
    /// Fails with [`Error::MissingField`] if server, account or secret is empty.
    pub fn new(credentials: Credentials) -> Result<Self> {
        Self::with_connector(credentials, Pop3Connector::default())
    }

    /// Like [`new`](Self::new) with custom transport options.
    pub fn with_options(credentials: Credentials, options: TlsOptions) -> Result<Self> {
        Self::with_connector(credentials, Pop3Connector { options })
    }
}

impl<C, T> Pop3Retriever<C>
where
    C: Connector<Handle = Client<T>>,
    T: Read + Write,
{
    /// A retriever whose sessions are made by `connector`.
    pub fn with_connector(credentials: Credentials, connector: C) -> Result<Self> {
        credentials.validate()?;
        Ok(Pop3Retriever {
            session: ScopedSession::new(credentials, connector),
        })
    }

    /// Run `hook` after every `QUIT`.
    pub fn on_exit<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&SessionExit<'_>) + Send + Sync + 'static,
    {
        self.session.on_exit(hook);
        self
    }

    /// Pause for `pause` after every `QUIT`.
    pub fn cooldown(&mut self, pause: Duration) -> &mut Self {
        self.session.cooldown(pause);
        self
    }

    /// Message count and total size of the maildrop.
    pub fn mailbox_size(&self) -> Result<MailboxStats> {
        self.session.with_session(|client| client.stat())
    }

    /// Number and size of every message in the maildrop.
    pub fn list(&self) -> Result<Vec<MessageInfo>> {
        self.session.with_session(|client| client.list())
    }

    /// Every message in the maildrop, in ascending order, as raw bytes.
    pub fn retrieve_all(&self) -> Result<Pop3Messages<T, Vec<u8>>> {
        let mut session = self.session.open()?;
        let ids: VecDeque<u32> = session
            .handle()
            .list()?
            .into_iter()
            .map(|info| info.id)
            .collect();
        log::debug!("retrieving {} message(s)", ids.len());
        Ok(Pop3Messages::new(session, ids, Ok))
    }

    /// Messages `start` through `end` inclusive, as text.
    ///
    /// `end` of `None` or `Some(0)` means the last message; a larger `end` than the maildrop
    /// holds is clamped to it. A `start` past the end yields nothing.
    pub fn retrieve_range(&self, start: u32, end: Option<u32>) -> Result<Pop3Messages<T, String>> {
        if start < 1 {
            return Err(Error::InvalidSelector(
                "message numbers start at 1".to_string(),
            ));
        }
        let mut session = self.session.open()?;
        let count = session.handle().stat()?.message_count;
        let end = match end {
            None | Some(0) => count,
            Some(end) => min(end, count),
        };
        log::debug!("retrieving messages {} through {}", start, end);
        Ok(Pop3Messages::new(session, (start..=end).collect(), into_text))
    }
}

fn into_text(raw: Vec<u8>) -> Result<String> {
    String::from_utf8(raw).map_err(|e| {
        let cause = e.utf8_error();
        Error::Parse(ParseError::DataNotUtf8(e.into_bytes(), cause))
    })
}

impl<C: fmt::Debug> fmt::Debug for Pop3Retriever<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pop3Retriever")
            .field("session", &self.session)
            .finish()
    }
}

/// A lazy, single-pass sequence of messages fetched with `RETR`.
///
/// The session ends with `QUIT` when the ids run out, after the first error, or when the
/// sequence is dropped.
pub struct Pop3Messages<T: Read + Write, M> {
    session: Option<Session<Client<T>>>,
    ids: VecDeque<u32>,
    convert: fn(Vec<u8>) -> Result<M>,
}

impl<T: Read + Write, M> Pop3Messages<T, M> {
    fn new(
        session: Session<Client<T>>,
        ids: VecDeque<u32>,
        convert: fn(Vec<u8>) -> Result<M>,
    ) -> Self {
        Pop3Messages {
            session: Some(session),
            ids,
            convert,
        }
    }

    /// How many messages have not been fetched yet.
    pub fn remaining(&self) -> usize {
        self.ids.len()
    }

    fn finish(&mut self) {
        if let Some(session) = self.session.take() {
            // teardown failures go to the exit hook
            let _ = session.close();
        }
    }
}

impl<T: Read + Write, M> Iterator for Pop3Messages<T, M> {
    type Item = Result<M>;

    fn next(&mut self) -> Option<Self::Item> {
        let session = self.session.as_mut()?;
        let id = match self.ids.pop_front() {
            Some(id) => id,
            None => {
                self.finish();
                return None;
            }
        };
        let message = session.handle().retr(id).and_then(self.convert);
        if message.is_err() {
            self.ids.clear();
            self.finish();
        }
        Some(message)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.session {
            Some(_) => (0, Some(self.ids.len())),
            None => (0, Some(0)),
        }
    }
}

impl<T: Read + Write, M> fmt::Debug for Pop3Messages<T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pop3Messages")
            .field("remaining", &self.ids)
            .field("open", &self.session.is_some())
            .finish()
    }
}
