use std::net::TcpStream;
use std::time::Duration;

use native_tls::{TlsConnector, TlsStream};

use crate::error::Result;

/// How long a socket read or write may stall before it fails with `io::ErrorKind::TimedOut`.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Transport settings shared by the POP3 and IMAP connectors.
#[derive(Clone, Debug)]
pub struct TlsOptions {
    /// Read and write timeout applied to the socket. `None` blocks indefinitely.
    pub timeout: Option<Duration>,
    /// Accept invalid certificates and host names. Only for testing against local servers.
    pub danger_skip_tls_verify: bool,
}

impl Default for TlsOptions {
    fn default() -> Self {
        TlsOptions {
            timeout: Some(DEFAULT_TIMEOUT),
            danger_skip_tls_verify: false,
        }
    }
}

impl TlsOptions {
    pub(crate) fn tls_connector(&self) -> Result<TlsConnector> {
        let mut builder = TlsConnector::builder();
        if self.danger_skip_tls_verify {
            builder
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true);
        }
        Ok(builder.build()?)
    }

    /// Open a TCP connection to `domain:port` and wrap it in TLS from the first byte.
    pub(crate) fn connect(&self, domain: &str, port: u16) -> Result<TlsStream<TcpStream>> {
        let tcp = TcpStream::connect((domain, port))?;
        tcp.set_read_timeout(self.timeout)?;
        tcp.set_write_timeout(self.timeout)?;
        let tls = self.tls_connector()?;
        Ok(TlsConnector::connect(&tls, domain, tcp)?)
    }
}
