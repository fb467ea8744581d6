//! Submitting composed messages over SMTP.
//!
//! Every [`SmtpSender::send`] opens a fresh connection, upgrades it with `STARTTLS`,
//! authenticates, submits one message and says `QUIT`, whether or not the submission worked.

use std::time::Duration;

use lettre::address::Envelope;
use lettre::transport::smtp::authentication::{self, Mechanism};
use lettre::transport::smtp::client::{SmtpConnection, TlsParameters};
use lettre::transport::smtp::extension::ClientId;
use lettre::transport::smtp::response::Response;

use crate::conn::TlsOptions;
use crate::credentials::{Credentials, Protocol};
use crate::error::{Error, Result};
use crate::message::ComposedMessage;
use crate::session::{Connector, ScopedSession, SessionExit, Teardown};

const MECHANISMS: &[Mechanism] = &[Mechanism::Login, Mechanism::Plain];

/// A handle that can submit one serialized message.
pub trait Submit {
    /// Submit `message` for the addresses in `envelope`, returning the server's reply text.
    fn submit(&mut self, envelope: &Envelope, message: &[u8]) -> Result<String>;
}

/// Connects in plain text, upgrades with `STARTTLS` and authenticates.
#[derive(Clone, Debug, Default)]
pub struct SmtpConnector {
    pub options: TlsOptions,
    /// The name announced in `EHLO`. Defaults to the local host name.
    pub hello_name: ClientId,
}

impl SmtpConnector {
    fn tls_parameters(&self, domain: &str) -> Result<TlsParameters> {
        let skip = self.options.danger_skip_tls_verify;
        Ok(TlsParameters::builder(domain.to_string())
            .dangerous_accept_invalid_certs(skip)
            .dangerous_accept_invalid_hostnames(skip)
            .build()?)
    }
}

impl Connector for SmtpConnector {
    type Handle = SmtpConnection;

    fn connect(&self, credentials: &Credentials) -> Result<Self::Handle> {
        let port = credentials.port_for(Protocol::Smtp);
        let mut conn = SmtpConnection::connect(
            (credentials.server.as_str(), port),
            self.options.timeout,
            &self.hello_name,
            None,
            None,
        )?;

        if !conn.can_starttls() {
            conn.abort();
            return Err(Error::Protocol(format!(
                "{} does not offer STARTTLS",
                credentials.server
            )));
        }
        let tls = self.tls_parameters(&credentials.server)?;
        conn.starttls(&tls, &self.hello_name)?;
        log::trace!("C: STARTTLS negotiated with {}", credentials.server);

        let login = authentication::Credentials::new(
            credentials.account.clone(),
            credentials.secret.clone(),
        );
        if let Err(e) = authenticate(&mut conn, &login) {
            conn.abort();
            return Err(e);
        }
        Ok(conn)
    }
}

/// A negative reply to `AUTH` is [`Error::Auth`]; anything else stays [`Error::Smtp`].
fn authenticate(conn: &mut SmtpConnection, login: &authentication::Credentials) -> Result<()> {
    match conn.auth(MECHANISMS, login) {
        Ok(_) => Ok(()),
        Err(e) if e.is_permanent() || e.is_transient() => Err(Error::Auth(e.to_string())),
        Err(e) => Err(Error::Smtp(e)),
    }
}

impl Teardown for SmtpConnection {
    fn teardown(&mut self) -> Result<()> {
        self.quit()?;
        Ok(())
    }
}

impl Submit for SmtpConnection {
    fn submit(&mut self, envelope: &Envelope, message: &[u8]) -> Result<String> {
        let response = self.send(envelope, message)?;
        Ok(reply_text(&response))
    }
}

fn reply_text(response: &Response) -> String {
    response.message().collect::<Vec<_>>().join(" ")
}

/// Sends [`ComposedMessage`]s through one SMTP server.
pub struct SmtpSender<C = SmtpConnector> {
    session: ScopedSession<C>,
}

impl SmtpSender<SmtpConnector> {
    /// A sender for the credentials' server on port 25 unless another is set.
    ///
    /// Fails with [`Error::MissingField`] if server, account or secret is empty.
    pub fn new(credentials: Credentials) -> Result<Self> {
        Self::with_connector(credentials, SmtpConnector::default())
    }

    /// Like [`new`](Self::new) with custom transport options.
    pub fn with_options(credentials: Credentials, options: TlsOptions) -> Result<Self> {
        Self::with_connector(
            credentials,
            SmtpConnector {
                options,
                ..Default::default()
            },
        )
    }
}

impl<C> SmtpSender<C>
where
    C: Connector,
    C::Handle: Submit,
{
    /// A sender whose connections are made by `connector`.
    pub fn with_connector(credentials: Credentials, connector: C) -> Result<Self> {
        credentials.validate()?;
        Ok(SmtpSender {
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

    /// Submit `message` once, returning the server's reply to the end of data.
    ///
    /// Nothing is retried; the first failure is returned.
    pub fn send(&self, message: &ComposedMessage) -> Result<String> {
        let formatted = message.formatted();
        let reply = self
            .session
            .with_session(|conn| conn.submit(message.envelope(), &formatted))?;
        log::debug!("submitted {}: {}", message.message_id(), reply);
        Ok(reply)
    }
}

impl<C: std::fmt::Debug> std::fmt::Debug for SmtpSender<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpSender")
            .field("session", &self.session)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MessageBuilder, MessageSpec};
    use std::io::{BufRead, BufReader, Write};
    use std::net::{SocketAddr, TcpListener};
    use std::sync::{Arc, Mutex};
    use std::thread;

    #[derive(Debug, Default)]
    struct Outbox {
        submitted: Vec<(Vec<String>, Vec<u8>)>,
        quits: usize,
    }

    #[derive(Debug)]
    struct Recorder {
        outbox: Arc<Mutex<Outbox>>,
        reject: Option<&'static str>,
    }

    impl Submit for Recorder {
        fn submit(&mut self, envelope: &Envelope, message: &[u8]) -> Result<String> {
            if let Some(why) = self.reject {
                return Err(Error::Protocol(why.to_string()));
            }
            let to = envelope.to().iter().map(|a| a.to_string()).collect();
            self.outbox
                .lock()
                .unwrap()
                .submitted
                .push((to, message.to_vec()));
            Ok("2.0.0 Ok: queued as 12345".to_string())
        }
    }

    impl Teardown for Recorder {
        fn teardown(&mut self) -> Result<()> {
            self.outbox.lock().unwrap().quits += 1;
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    struct Recording {
        outbox: Arc<Mutex<Outbox>>,
        reject: Option<&'static str>,
        refuse_login: bool,
    }

    impl Connector for Recording {
        type Handle = Recorder;

        fn connect(&self, _: &Credentials) -> Result<Recorder> {
            if self.refuse_login {
                return Err(Error::Auth("535 5.7.8 authentication failed".to_string()));
            }
            Ok(Recorder {
                outbox: Arc::clone(&self.outbox),
                reject: self.reject,
            })
        }
    }

    fn credentials() -> Credentials {
        Credentials::new("smtp.example.com", "me@example.com", "pw")
    }

    fn message() -> ComposedMessage {
        MessageBuilder::new()
            .build(
                &MessageSpec::new("me@example.com", "you@example.org")
                    .subject("hello")
                    .text("hi"),
            )
            .unwrap()
    }

    #[test]
    fn construction_requires_fields() {
        let err = SmtpSender::new(Credentials::new("smtp.example.com", "me", " ")).err();
        assert!(matches!(err, Some(Error::MissingField("secret"))));
    }

    #[test]
    fn default_port() {
        let sender = SmtpSender::new(credentials()).unwrap();
        assert_eq!(sender.session.credentials().port_for(Protocol::Smtp), 25);
    }

    #[test]
    fn send_submits_and_quits() {
        let connector = Recording::default();
        let outbox = Arc::clone(&connector.outbox);
        let sender = SmtpSender::with_connector(credentials(), connector).unwrap();
        let message = message();

        let reply = sender.send(&message).unwrap();
        assert_eq!(reply, "2.0.0 Ok: queued as 12345");

        let outbox = outbox.lock().unwrap();
        assert_eq!(outbox.quits, 1);
        assert_eq!(outbox.submitted.len(), 1);
        assert_eq!(outbox.submitted[0].0, vec!["you@example.org".to_string()]);
        assert_eq!(outbox.submitted[0].1, message.formatted());
    }

    #[test]
    fn message_can_be_sent_twice() {
        let connector = Recording::default();
        let outbox = Arc::clone(&connector.outbox);
        let sender = SmtpSender::with_connector(credentials(), connector).unwrap();
        let message = message();
        sender.send(&message).unwrap();
        sender.send(&message).unwrap();
        let outbox = outbox.lock().unwrap();
        assert_eq!(outbox.submitted.len(), 2);
        assert_eq!(outbox.quits, 2);
    }

    #[test]
    fn rejected_submission_still_quits() {
        let connector = Recording {
            reject: Some("550 mailbox unavailable"),
            ..Default::default()
        };
        let outbox = Arc::clone(&connector.outbox);
        let sender = SmtpSender::with_connector(credentials(), connector).unwrap();
        match sender.send(&message()) {
            Err(Error::Protocol(why)) => assert_eq!(why, "550 mailbox unavailable"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(outbox.lock().unwrap().quits, 1);
    }

    /// Serves one connection offering `AUTH PLAIN`, then answers the `AUTH` line with `reply`
    /// or hangs up when there is none.
    fn auth_server(reply: Option<&'static str>) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            stream.write_all(b"220 mx.example.com ESMTP\r\n").unwrap();
            reader.read_line(&mut line).unwrap();
            stream
                .write_all(b"250-mx.example.com\r\n250 AUTH PLAIN\r\n")
                .unwrap();
            line.clear();
            reader.read_line(&mut line).unwrap();
            assert!(line.starts_with("AUTH PLAIN"), "{}", line);
            if let Some(reply) = reply {
                stream.write_all(reply.as_bytes()).unwrap();
                line.clear();
                let _ = reader.read_line(&mut line);
            }
        });
        addr
    }

    fn connect_to(addr: SocketAddr) -> SmtpConnection {
        SmtpConnection::connect(
            addr,
            Some(Duration::from_secs(5)),
            &ClientId::Domain("client.example.com".to_string()),
            None,
            None,
        )
        .unwrap()
    }

    fn login() -> authentication::Credentials {
        authentication::Credentials::new("me@example.com".to_string(), "pw".to_string())
    }

    #[test]
    fn refused_credentials_are_auth_errors() {
        let mut conn = connect_to(auth_server(Some("535 5.7.8 Authentication failed\r\n")));
        match authenticate(&mut conn, &login()) {
            Err(Error::Auth(why)) => assert!(why.contains("535"), "{}", why),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn dropped_connection_during_auth_is_transport_error() {
        let mut conn = connect_to(auth_server(None));
        let err = authenticate(&mut conn, &login()).unwrap_err();
        assert!(matches!(err, Error::Smtp(_)), "{:?}", err);
        assert!(err.is_transport());
    }

    #[test]
    fn accepted_credentials() {
        let mut conn = connect_to(auth_server(Some("235 2.7.0 Authentication successful\r\n")));
        assert!(authenticate(&mut conn, &login()).is_ok());
    }

    #[test]
    fn login_failure_is_auth_error() {
        let connector = Recording {
            refuse_login: true,
            ..Default::default()
        };
        let outbox = Arc::clone(&connector.outbox);
        let sender = SmtpSender::with_connector(credentials(), connector).unwrap();
        assert!(matches!(sender.send(&message()), Err(Error::Auth(_))));
        let outbox = outbox.lock().unwrap();
        assert_eq!(outbox.quits, 0);
        assert!(outbox.submitted.is_empty());
    }
}
