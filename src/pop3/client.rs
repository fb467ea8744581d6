use std::io::{BufRead, Read, Write};

use bufstream::BufStream;
use lazy_static::lazy_static;
use regex::Regex;

use super::types::{MailboxStats, MessageInfo};
use crate::error::{Error, ParseError, Result, ValidateError};
use crate::session::Teardown;
use crate::utils::redact_command;

const CR: u8 = 0x0d;
const LF: u8 = 0x0a;

lazy_static! {
    static ref STAT_RE: Regex = Regex::new(r"^(\d+) (\d+)").unwrap();
    static ref LIST_RE: Regex = Regex::new(r"^(\d+) (\d+)\r?\n?$").unwrap();
}

/// The POP3 commands retrieval needs, spoken over any `Read + Write` stream.
///
/// A `-ERR` status becomes [`Error::Protocol`] carrying the server's text, except while logging
/// in, where it becomes [`Error::Auth`].
#[derive(Debug)]
pub struct Client<T: Read + Write> {
    stream: BufStream<T>,
}

impl<T: Read + Write> Client<T> {
    /// Creates a new client with the underlying stream.
    pub fn new(stream: T) -> Client<T> {
        Client {
            stream: BufStream::new(stream),
        }
    }

    /// Read the `+OK` greeting the server sends on connect.
    pub fn read_greeting(&mut self) -> Result<String> {
        self.read_status()
    }

    /// Authenticate with `USER` and `PASS`.
    ///
    /// A username or password holding CR or LF is rejected before anything is sent.
    pub fn login(&mut self, username: &str, password: &str) -> Result<()> {
        single_line(username)?;
        single_line(password)?;
        let auth = |e: Error| match e {
            Error::Protocol(why) => Error::Auth(why),
            e => e,
        };
        self.run_command(&format!("USER {}", username)).map_err(auth)?;
        self.run_command(&format!("PASS {}", password)).map_err(auth)?;
        Ok(())
    }

    /// How many messages the maildrop holds and their combined size.
    pub fn stat(&mut self) -> Result<MailboxStats> {
        let status = self.run_command("STAT")?;
        let caps = STAT_RE
            .captures(&status)
            .ok_or_else(|| Error::Parse(ParseError::Status(status.clone())))?;
        Ok(MailboxStats {
            message_count: number(&caps[1], &status)?,
            total_size_bytes: number(&caps[2], &status)?,
        })
    }

    /// The number and size of every message in the maildrop.
    pub fn list(&mut self) -> Result<Vec<MessageInfo>> {
        self.run_command("LIST")?;
        self.read_multiline()?
            .iter()
            .map(|line| -> Result<MessageInfo> {
                let line = String::from_utf8_lossy(line);
                let caps = LIST_RE
                    .captures(&line)
                    .ok_or_else(|| Error::Parse(ParseError::Status(line.to_string())))?;
                Ok(MessageInfo {
                    id: number(&caps[1], &line)?,
                    size_bytes: number(&caps[2], &line)?,
                })
            })
            .collect()
    }

    /// The full content of message `id`, its lines joined with CRLF.
    pub fn retr(&mut self, id: u32) -> Result<Vec<u8>> {
        self.run_command(&format!("RETR {}", id))?;
        Ok(self.read_multiline()?.join(&b"\r\n"[..]))
    }

    /// End the session. Messages marked for deletion are removed by the server now.
    pub fn quit(&mut self) -> Result<()> {
        self.run_command("QUIT").map(|_| ())
    }

    /// Send `command` and read its status line, returning the text after `+OK`.
    pub fn run_command(&mut self, command: &str) -> Result<String> {
        self.write_line(command.as_bytes())?;
        self.read_status()
    }

    fn read_status(&mut self) -> Result<String> {
        let mut v = Vec::new();
        self.readline(&mut v)?;
        let line = String::from_utf8_lossy(&v);
        let line = line.trim_end();
        if let Some(rest) = line.strip_prefix("+OK") {
            Ok(rest.trim_start().to_string())
        } else if let Some(rest) = line.strip_prefix("-ERR") {
            let why = rest.trim_start();
            Err(Error::Protocol(if why.is_empty() {
                "no explanation given".to_string()
            } else {
                why.to_string()
            }))
        } else {
            Err(Error::Parse(ParseError::Status(line.to_string())))
        }
    }

    /// The lines of a multi-line response up to the terminating `.`, without line endings and
    /// with byte-stuffing removed.
    fn read_multiline(&mut self) -> Result<Vec<Vec<u8>>> {
        let mut lines = Vec::new();
        loop {
            let mut line = Vec::new();
            self.readline(&mut line)?;
            while matches!(line.last(), Some(&LF) | Some(&CR)) {
                line.pop();
            }
            if line == b"." {
                break Ok(lines);
            }
            if line.starts_with(b"..") {
                line.remove(0);
            }
            lines.push(line);
        }
    }

    fn readline(&mut self, into: &mut Vec<u8>) -> Result<usize> {
        let read = self.stream.read_until(LF, into)?;
        if read == 0 {
            return Err(Error::ConnectionLost);
        }

        if log::log_enabled!(log::Level::Trace) {
            let line = &into[into.len() - read..];
            log::trace!("S: {}", String::from_utf8_lossy(line).trim_end());
        }

        Ok(read)
    }

    fn write_line(&mut self, buf: &[u8]) -> Result<()> {
        self.stream.write_all(buf)?;
        self.stream.write_all(&[CR, LF])?;
        self.stream.flush()?;
        if log::log_enabled!(log::Level::Trace) {
            log::trace!("C: {}", redact_command(&String::from_utf8_lossy(buf)));
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn get_ref(&self) -> &T {
        self.stream.get_ref()
    }
}

fn single_line(value: &str) -> Result<()> {
    match value.chars().find(|&c| c == '\r' || c == '\n') {
        Some(c) => Err(Error::Validate(ValidateError(c))),
        None => Ok(()),
    }
}

fn number<N: std::str::FromStr>(digits: &str, line: &str) -> Result<N> {
    digits
        .parse()
        .map_err(|_| Error::Parse(ParseError::Status(line.to_string())))
}

impl<T: Read + Write> Teardown for Client<T> {
    fn teardown(&mut self) -> Result<()> {
        self.quit()
    }
}
