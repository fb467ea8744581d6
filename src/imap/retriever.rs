use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use native_tls::TlsStream;

use super::client::Client;
use super::selector::{IdSpec, MailboxResolver, MessageIdSelector, RetrieveRequest};
use super::types::{MailboxLabel, Seq};
use crate::conn::TlsOptions;
use crate::credentials::{Credentials, Protocol};
use crate::error::{Error, Result};
use crate::session::{Connector, ScopedSession, Session, SessionExit};
use crate::utils::iter_join;

/// Connects to an IMAP server over implicit TLS and logs in.
#[derive(Clone, Debug, Default)]
pub struct ImapConnector {
    pub options: TlsOptions,
}

impl Connector for ImapConnector {
    type Handle = Client<TlsStream<TcpStream>>;

    fn connect(&self, credentials: &Credentials) -> Result<Self::Handle> {
        let port = credentials.port_for(Protocol::Imap);
        let tls = self.options.connect(&credentials.server, port)?;
        let mut client = Client::new(tls);
        client.read_greeting()?;
        client.login(&credentials.account, &credentials.secret)?;
        Ok(client)
    }
}

/// Retrieves messages from an IMAP server.
///
/// No connection is held between calls: every operation logs in, does its work and logs out
/// again, even when it fails.
pub struct ImapRetriever<C = ImapConnector> {
    session: ScopedSession<C>,
}

impl ImapRetriever<ImapConnector> {
    /// A retriever using implicit TLS on the credentials' port (993 by default).
    ///
    /// Fails with [`Error::MissingField`] if server, account or secret is empty.
    pub fn new(credentials: Credentials) -> Result<Self> {
        Self::with_connector(credentials, ImapConnector::default())
    }

    /// Like [`new`](Self::new) with custom transport options.
    pub fn with_options(credentials: Credentials, options: TlsOptions) -> Result<Self> {
        Self::with_connector(credentials, ImapConnector { options })
    }
}

impl<C, T> ImapRetriever<C>
where
    C: Connector<Handle = Client<T>>,
    T: Read + Write,
{
    /// A retriever whose sessions are made by `connector`.
    pub fn with_connector(credentials: Credentials, connector: C) -> Result<Self> {
        credentials.validate()?;
        Ok(ImapRetriever {
            session: ScopedSession::new(credentials, connector),
        })
    }

    /// Run `hook` after every logout.
    pub fn on_exit<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&SessionExit<'_>) + Send + Sync + 'static,
    {
        self.session.on_exit(hook);
        self
    }

    /// Pause for `pause` after every logout.
    pub fn cooldown(&mut self, pause: Duration) -> &mut Self {
        self.session.cooldown(pause);
        self
    }

    /// Every mailbox on the server.
    pub fn mailbox_labels(&self) -> Result<Vec<MailboxLabel>> {
        self.session.with_session(|client| client.list("", "*"))
    }

    /// Every mailbox on the server, keyed by its position in the listing.
    pub fn list_mailboxes(&self) -> Result<BTreeMap<usize, String>> {
        Ok(self
            .mailbox_labels()?
            .into_iter()
            .map(|label| (label.index, label.name))
            .collect())
    }

    /// The ids of every message in `mailbox`.
    pub fn list_message_ids(&self, mailbox: &str) -> Result<Vec<Seq>> {
        self.session.with_session(|client| {
            client.select(mailbox)?;
            client.search("ALL")
        })
    }

    /// Retrieve the raw messages `request` selects.
    ///
    /// Mailbox resolution, selection and id resolution happen before this returns. The messages
    /// themselves are fetched one at a time as the returned [`Retrieval`] is iterated, and the
    /// session stays open until it is exhausted or dropped.
    pub fn retrieve(&self, request: RetrieveRequest) -> Result<Retrieval<T>> {
        let request = request.validate()?;
        let mut session = self.session.open()?;
        let client = session.handle();

        let mailbox = if request.mailbox.is_empty() {
            let labels = client.list("", "*")?;
            resolve_mailbox(labels, request.mailbox_resolver)?
        } else {
            request.mailbox
        };
        client.select(&mailbox)?;

        let ids: VecDeque<IdSpec> = match request.selector {
            MessageIdSelector::AllMessages => singles(client.search("ALL")?),
            MessageIdSelector::ExplicitIds(specs) => specs.into(),
            MessageIdSelector::SearchQuery(query) => {
                let found = client.search(&query.to_command()?)?;
                if found.is_empty() {
                    return Err(Error::NotFound(query.to_string()));
                }
                singles(found)
            }
            MessageIdSelector::ExternalSelection(resolver) => {
                let all = client.search("ALL")?;
                singles(check_listed(resolver(&all), &all)?)
            }
        };

        let retrieval = Retrieval {
            session: Some(session),
            mailbox,
            ids,
            delete: request.delete,
            pending_flag: None,
            deleted: 0,
            done: false,
        };
        log::debug!(
            "retrieving {} message(s) from {:?}{}",
            retrieval.remaining(),
            retrieval.mailbox,
            if retrieval.delete { " with delete" } else { "" }
        );
        Ok(retrieval)
    }
}

fn singles(ids: Vec<Seq>) -> VecDeque<IdSpec> {
    ids.into_iter().map(IdSpec::Id).collect()
}

/// Every id a resolver picks must come from the listing it was shown.
fn check_listed(picked: Vec<Seq>, listed: &[Seq]) -> Result<Vec<Seq>> {
    let listed: BTreeSet<Seq> = listed.iter().copied().collect();
    let unknown: Vec<Seq> = picked
        .iter()
        .copied()
        .filter(|id| !listed.contains(id))
        .collect();
    if unknown.is_empty() {
        Ok(picked)
    } else {
        Err(Error::InvalidSelector(format!(
            "selected ids not in mailbox: {}",
            iter_join(unknown, ", ")
        )))
    }
}

fn resolve_mailbox(
    mut labels: Vec<MailboxLabel>,
    resolver: Option<MailboxResolver>,
) -> Result<String> {
    match resolver {
        Some(resolver) => resolver(&labels).ok_or(Error::SelectionRequired),
        None if labels.len() == 1 => labels
            .pop()
            .map(|label| label.name)
            .ok_or(Error::SelectionRequired),
        None => Err(Error::SelectionRequired),
    }
}

impl<C: fmt::Debug> fmt::Debug for ImapRetriever<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImapRetriever")
            .field("session", &self.session)
            .finish()
    }
}

/// A lazy, single-pass sequence of raw messages.
///
/// Each message is fetched when asked for. With deletion enabled, a message is flagged
/// `\Deleted` right after it has been handed out (on the next call to `next`, or when the
/// sequence ends), and one `EXPUNGE` is issued at the very end if anything was flagged. The end
/// comes when the ids run out, after the first error, or when the sequence is dropped early;
/// the session is logged out in every case.
pub struct Retrieval<T: Read + Write> {
    session: Option<Session<Client<T>>>,
    mailbox: String,
    ids: VecDeque<IdSpec>,
    delete: bool,
    pending_flag: Option<Seq>,
    deleted: usize,
    done: bool,
}

impl<T: Read + Write> Retrieval<T> {
    /// The mailbox being retrieved from.
    pub fn mailbox(&self) -> &str {
        &self.mailbox
    }

    /// How many messages have not been fetched yet.
    pub fn remaining(&self) -> u64 {
        self.ids.iter().map(IdSpec::width).sum()
    }

    /// How many messages have been flagged `\Deleted` so far.
    pub fn deleted(&self) -> usize {
        self.deleted
    }

    fn flag_pending(&mut self) -> Result<()> {
        if let (Some(seq), Some(session)) = (self.pending_flag.take(), self.session.as_mut()) {
            session.handle().flag_deleted(seq)?;
            self.deleted += 1;
        }
        Ok(())
    }

    /// Flag the last message, expunge if anything was flagged, and log out.
    fn finish(&mut self) -> Result<()> {
        self.done = true;
        let flagged = self.flag_pending();
        let mut session = match self.session.take() {
            Some(session) => session,
            None => return flagged,
        };
        let expunged = if self.deleted > 0 {
            session.handle().expunge().map(|_| ())
        } else {
            Ok(())
        };
        // teardown failures go to the exit hook
        let _ = session.close();
        flagged.and(expunged)
    }

    fn fetch_next(&mut self) -> Option<Result<Vec<u8>>> {
        if let Err(e) = self.flag_pending() {
            return Some(Err(e));
        }
        let (seq, rest) = self.ids.pop_front()?.split_first();
        if let Some(rest) = rest {
            self.ids.push_front(rest);
        }
        let session = self.session.as_mut()?;
        match session.handle().fetch_rfc822(seq) {
            Ok(body) => {
                if self.delete {
                    self.pending_flag = Some(seq);
                }
                Some(Ok(body))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

impl<T: Read + Write> Iterator for Retrieval<T> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.fetch_next() {
            Some(Ok(body)) => Some(Ok(body)),
            Some(Err(e)) => {
                if let Err(cleanup) = self.finish() {
                    log::warn!("cleanup after failed retrieval: {}", cleanup);
                }
                Some(Err(e))
            }
            None => match self.finish() {
                Ok(()) => None,
                Err(e) => Some(Err(e)),
            },
        }
    }
}

impl<T: Read + Write> Drop for Retrieval<T> {
    fn drop(&mut self) {
        if !self.done {
            if let Err(e) = self.finish() {
                log::warn!("cleanup of abandoned retrieval failed: {}", e);
            }
        }
    }
}

impl<T: Read + Write> fmt::Debug for Retrieval<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retrieval")
            .field("mailbox", &self.mailbox)
            .field("remaining", &self.remaining())
            .field("delete", &self.delete)
            .field("deleted", &self.deleted)
            .field("done", &self.done)
            .finish()
    }
}
