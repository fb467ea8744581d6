//! Scoped, authenticated connections.
//!
//! A [`ScopedSession`] is a descriptor: it knows where to connect and how to log in, but holds no
//! connection. [`ScopedSession::open`] yields a [`Session`] guard that owns the live handle and
//! always runs the protocol's teardown (`QUIT`, `LOGOUT`) exactly once, whether it is closed
//! explicitly, dropped early, or dropped while an error unwinds through the caller.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::credentials::Credentials;
use crate::error::{Error, Result};

/// Establishes a live, authenticated protocol handle.
pub trait Connector {
    /// The authenticated handle this connector produces.
    type Handle: Teardown;

    /// Connect to the server named in `credentials` and log in.
    fn connect(&self, credentials: &Credentials) -> Result<Self::Handle>;
}

/// The counterpart of [`Connector::connect`]: ends the protocol session politely.
pub trait Teardown {
    /// Log out and release the connection.
    fn teardown(&mut self) -> Result<()>;
}

/// What a [`ScopedSession`] reports to its exit hook after each teardown.
#[derive(Debug)]
pub struct SessionExit<'a> {
    /// The server the session was connected to.
    pub server: &'a str,
    /// The teardown error, if logging out failed.
    pub error: Option<&'a Error>,
}

/// A hook run after every teardown.
pub type ExitHook = Arc<dyn Fn(&SessionExit<'_>) + Send + Sync>;

/// A reusable description of how to open a session against one server.
pub struct ScopedSession<C> {
    credentials: Credentials,
    connector: C,
    on_exit: Option<ExitHook>,
    cooldown: Option<Duration>,
    active: Arc<AtomicBool>,
}

impl<C: Connector> ScopedSession<C> {
    /// Describe sessions made by `connector` using `credentials`.
    pub fn new(credentials: Credentials, connector: C) -> Self {
        ScopedSession {
            credentials,
            connector,
            on_exit: None,
            cooldown: None,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Run `hook` after every teardown, with the teardown's outcome.
    pub fn on_exit<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&SessionExit<'_>) + Send + Sync + 'static,
    {
        self.on_exit = Some(Arc::new(hook));
        self
    }

    /// Sleep for `pause` after every teardown before handing control back.
    pub fn cooldown(&mut self, pause: Duration) -> &mut Self {
        self.cooldown = Some(pause);
        self
    }

    /// The credentials sessions are opened with.
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Whether a session from this descriptor is currently open.
    pub fn is_open(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Connect and log in.
    ///
    /// Fails with [`Error::AlreadyConnected`] while a previous [`Session`] from this descriptor is
    /// still alive.
    pub fn open(&self) -> Result<Session<C::Handle>> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::AlreadyConnected);
        }

        log::debug!("opening session to {}", self.credentials.server);
        match self.connector.connect(&self.credentials) {
            Ok(handle) => Ok(Session {
                handle,
                closed: false,
                server: self.credentials.server.clone(),
                on_exit: self.on_exit.clone(),
                cooldown: self.cooldown,
                active: Arc::clone(&self.active),
            }),
            Err(e) => {
                self.active.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Open a session, run `body` with the handle, then tear the session down.
    ///
    /// Teardown happens on every path out of `body`. The body's result is returned unchanged;
    /// a failed teardown is reported through the exit hook and the log, never in place of it.
    pub fn with_session<T, F>(&self, body: F) -> Result<T>
    where
        F: FnOnce(&mut C::Handle) -> Result<T>,
    {
        let mut session = self.open()?;
        let result = body(session.handle());
        // teardown failures go to the exit hook
        let _ = session.close();
        result
    }
}

impl<C: fmt::Debug> fmt::Debug for ScopedSession<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedSession")
            .field("credentials", &self.credentials)
            .field("connector", &self.connector)
            .field("cooldown", &self.cooldown)
            .field("active", &self.active.load(Ordering::SeqCst))
            .finish()
    }
}

/// A live, authenticated connection that is torn down when closed or dropped.
pub struct Session<H: Teardown> {
    handle: H,
    closed: bool,
    server: String,
    on_exit: Option<ExitHook>,
    cooldown: Option<Duration>,
    active: Arc<AtomicBool>,
}

impl<H: Teardown> Session<H> {
    /// The protocol handle.
    pub fn handle(&mut self) -> &mut H {
        &mut self.handle
    }

    /// Tear the session down now and report the teardown result.
    pub fn close(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let result = self.handle.teardown();
        self.active.store(false, Ordering::SeqCst);
        match result {
            Ok(()) => log::debug!("closed session to {}", self.server),
            Err(ref e) => log::warn!("teardown of session to {} failed: {}", self.server, e),
        }

        if let Some(ref hook) = self.on_exit {
            hook(&SessionExit {
                server: &self.server,
                error: result.as_ref().err(),
            });
        }
        if let Some(pause) = self.cooldown {
            thread::sleep(pause);
        }
        result
    }
}

impl<H: Teardown> Drop for Session<H> {
    fn drop(&mut self) {
        // the failure was already logged and passed to the exit hook
        let _ = self.release();
    }
}

impl<H: Teardown + fmt::Debug> fmt::Debug for Session<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("server", &self.server)
            .field("handle", &self.handle)
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    #[derive(Debug)]
    struct Counting {
        teardowns: Arc<AtomicUsize>,
        fail: bool,
    }

    impl Teardown for Counting {
        fn teardown(&mut self) -> Result<()> {
            self.teardowns.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(Error::ConnectionLost)
            } else {
                Ok(())
            }
        }
    }

    #[derive(Debug, Default)]
    struct CountingConnector {
        connects: Arc<AtomicUsize>,
        teardowns: Arc<AtomicUsize>,
        fail_teardown: bool,
        refuse: bool,
    }

    impl Connector for CountingConnector {
        type Handle = Counting;

        fn connect(&self, _: &Credentials) -> Result<Counting> {
            if self.refuse {
                return Err(Error::Auth("bad password".into()));
            }
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(Counting {
                teardowns: Arc::clone(&self.teardowns),
                fail: self.fail_teardown,
            })
        }
    }

    fn creds() -> Credentials {
        Credentials::new("mail.example.com", "me", "pw")
    }

    #[test]
    fn failing_body_still_tears_down_once() {
        let connector = CountingConnector::default();
        let teardowns = Arc::clone(&connector.teardowns);
        let scoped = ScopedSession::new(creds(), connector);

        let result: Result<()> = scoped.with_session(|_| {
            assert_eq!(teardowns.load(Ordering::SeqCst), 0);
            Err(Error::Protocol("NO boom".into()))
        });

        assert!(matches!(result, Err(Error::Protocol(ref s)) if s == "NO boom"));
        assert_eq!(teardowns.load(Ordering::SeqCst), 1);
        assert!(!scoped.is_open());
    }

    #[test]
    fn drop_tears_down() {
        let connector = CountingConnector::default();
        let teardowns = Arc::clone(&connector.teardowns);
        let scoped = ScopedSession::new(creds(), connector);
        {
            let _session = scoped.open().unwrap();
            assert!(scoped.is_open());
        }
        assert_eq!(teardowns.load(Ordering::SeqCst), 1);
        assert!(!scoped.is_open());
    }

    #[test]
    fn explicit_close_is_not_repeated_on_drop() {
        let connector = CountingConnector::default();
        let teardowns = Arc::clone(&connector.teardowns);
        let scoped = ScopedSession::new(creds(), connector);
        scoped.open().unwrap().close().unwrap();
        assert_eq!(teardowns.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reentrant_open_fails() {
        let scoped = ScopedSession::new(creds(), CountingConnector::default());
        let session = scoped.open().unwrap();
        assert!(matches!(scoped.open(), Err(Error::AlreadyConnected)));
        drop(session);
        assert!(scoped.open().is_ok());
    }

    #[test]
    fn failed_connect_does_not_hold_the_slot() {
        let connector = CountingConnector {
            refuse: true,
            ..Default::default()
        };
        let scoped = ScopedSession::new(creds(), connector);
        assert!(matches!(scoped.open(), Err(Error::Auth(_))));
        assert!(!scoped.is_open());
    }

    #[test]
    fn teardown_failure_goes_to_hook_not_result() {
        let connector = CountingConnector {
            fail_teardown: true,
            ..Default::default()
        };
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut scoped = ScopedSession::new(creds(), connector);
        let sink = Arc::clone(&seen);
        scoped.on_exit(move |exit| {
            sink.lock()
                .unwrap()
                .push((exit.server.to_string(), exit.error.map(|e| e.to_string())));
        });

        let value = scoped.with_session(|_| Ok(42)).unwrap();
        assert_eq!(value, 42);

        let err: Result<()> = scoped.with_session(|_| Err(Error::NotFound("FROM x".into())));
        assert!(matches!(err, Err(Error::NotFound(_))));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, "mail.example.com");
        assert_eq!(seen[0].1.as_deref(), Some("Connection Lost"));
    }

    #[test]
    fn clean_exit_reported() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut scoped = ScopedSession::new(creds(), CountingConnector::default());
        let counter = Arc::clone(&calls);
        scoped
            .on_exit(move |exit| {
                assert!(exit.error.is_none());
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .cooldown(Duration::from_millis(1));
        scoped.with_session(|_| Ok(())).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
