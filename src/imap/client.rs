use std::io::{BufRead, Read, Write};

use bufstream::BufStream;
use imap_proto::{Response, Status};

use super::parse::{parse_exists, parse_expunge, parse_fetches, parse_ids, parse_names};
use super::types::{MailboxLabel, Seq};
use crate::error::{Error, ParseError, Result, ValidateError};
use crate::session::Teardown;
use crate::utils::redact_command;

static TAG_PREFIX: &str = "a";
const INITIAL_TAG: u32 = 0;
const CR: u8 = 0x0d;
const LF: u8 = 0x0a;

macro_rules! quote {
    ($x:expr) => {
        format!("\"{}\"", $x.replace(r"\", r"\\").replace("\"", "\\\""))
    };
}

pub(crate) use quote;

pub(crate) fn validate_str(value: &str) -> Result<String> {
    let quoted = quote!(value);
    if quoted.contains('\n') {
        return Err(Error::Validate(ValidateError('\n')));
    }
    if quoted.contains('\r') {
        return Err(Error::Validate(ValidateError('\r')));
    }
    Ok(quoted)
}

/// The handful of IMAP commands retrieval needs, spoken over any `Read + Write` stream.
///
/// Every command is tagged; a tagged `NO` or `BAD` becomes [`Error::Protocol`] carrying the
/// server's text.
#[derive(Debug)]
pub struct Client<T: Read + Write> {
    stream: BufStream<T>,
    tag: u32,
}

impl<T: Read + Write> Client<T> {
    /// Creates a new client with the underlying stream.
    pub fn new(stream: T) -> Client<T> {
        Client {
            stream: BufStream::new(stream),
            tag: INITIAL_TAG,
        }
    }

    /// Read the untagged greeting the server sends on connect.
    pub fn read_greeting(&mut self) -> Result<Vec<u8>> {
        let mut v = Vec::new();
        self.readline(&mut v)?;
        Ok(v)
    }

    /// Log in to the IMAP server. A rejection becomes [`Error::Auth`].
    pub fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let command = format!(
            "LOGIN {} {}",
            validate_str(username)?,
            validate_str(password)?
        );
        self.run_command_and_check_ok(&command).map_err(|e| match e {
            Error::Protocol(why) => Error::Auth(why),
            e => e,
        })
    }

    /// List the names matching `pattern` under `reference`.
    pub fn list(&mut self, reference: &str, pattern: &str) -> Result<Vec<MailboxLabel>> {
        let command = format!("LIST {} {}", quote!(reference), validate_str(pattern)?);
        self.run_command_and_read_response(&command)
            .and_then(|lines| parse_names(&lines))
    }

    /// Select a mailbox, returning how many messages it holds.
    pub fn select(&mut self, mailbox_name: &str) -> Result<u32> {
        let command = format!("SELECT {}", validate_str(mailbox_name)?);
        self.run_command_and_read_response(&command)
            .and_then(|lines| parse_exists(&lines))
    }

    /// Search the selected mailbox. `query` is passed through unchanged.
    pub fn search(&mut self, query: &str) -> Result<Vec<Seq>> {
        self.run_command_and_read_response(&format!("SEARCH {}", query))
            .and_then(|lines| parse_ids(&lines))
    }

    /// Fetch the full `RFC822` content of one message.
    pub fn fetch_rfc822(&mut self, message: Seq) -> Result<Vec<u8>> {
        let lines = self.run_command_and_read_response(&format!("FETCH {} RFC822", message))?;
        parse_fetches(&lines)?
            .into_iter()
            .find(|(seq, _)| *seq == message)
            .map(|(_, body)| body)
            .ok_or_else(|| Error::Protocol(format!("no RFC822 data returned for message {}", message)))
    }

    /// Alter the flags of the messages in `sequence_set`.
    pub fn store(&mut self, sequence_set: &str, query: &str) -> Result<()> {
        self.run_command_and_check_ok(&format!("STORE {} {}", sequence_set, query))
    }

    /// Mark one message `\Deleted`.
    pub fn flag_deleted(&mut self, message: Seq) -> Result<()> {
        self.store(&message.to_string(), "+FLAGS (\\Deleted)")
    }

    /// Permanently remove every `\Deleted` message in the selected mailbox.
    pub fn expunge(&mut self) -> Result<Vec<Seq>> {
        self.run_command_and_read_response("EXPUNGE")
            .and_then(|lines| parse_expunge(&lines))
    }

    /// Logout informs the server that the client is done with the connection.
    pub fn logout(&mut self) -> Result<()> {
        self.run_command_and_check_ok("LOGOUT")
    }

    /// Runs a command and checks if it returns OK.
    pub fn run_command_and_check_ok(&mut self, command: &str) -> Result<()> {
        self.run_command_and_read_response(command).map(|_| ())
    }

    /// Runs any command passed to it.
    pub fn run_command(&mut self, untagged_command: &str) -> Result<()> {
        let command = self.create_command(untagged_command);
        self.write_line(command.as_bytes())
    }

    /// Runs a command and returns the untagged lines the server sent before completing it.
    pub fn run_command_and_read_response(&mut self, untagged_command: &str) -> Result<Vec<u8>> {
        self.run_command(untagged_command)?;
        self.read_response()
    }

    fn read_response(&mut self) -> Result<Vec<u8>> {
        let mut v = Vec::new();
        self.read_response_onto(&mut v)?;
        Ok(v)
    }

    fn read_response_onto(&mut self, data: &mut Vec<u8>) -> Result<()> {
        let mut continue_from = None;
        let match_tag = format!("{}{} ", TAG_PREFIX, self.tag);
        loop {
            let start_new = data.len();
            self.readline(data)?;
            let line_start = continue_from.take().unwrap_or(start_new);

            let break_with = {
                let line = &data[line_start..];
                match imap_proto::parser::parse_response(line) {
                    Ok((_, Response::Done { status, information, .. })) => {
                        if !line.starts_with(match_tag.as_bytes()) {
                            return Err(Error::Parse(ParseError::Invalid(line.to_vec())));
                        }
                        Some(match status {
                            Status::Ok => Ok(()),
                            status => Err((status, information.map(|s| s.to_string()))),
                        })
                    }
                    Ok(_) => None,
                    Err(nom::Err::Incomplete(_)) => {
                        continue_from = Some(line_start);
                        None
                    }
                    Err(_) => Some(Err((Status::Bye, None))),
                }
            };

            match break_with {
                Some(Ok(())) => {
                    data.truncate(line_start);
                    break Ok(());
                }
                Some(Err((Status::Bad, expl))) | Some(Err((Status::No, expl))) => {
                    break Err(Error::Protocol(
                        expl.unwrap_or_else(|| "no explanation given".to_string()),
                    ));
                }
                Some(Err(_)) => {
                    break Err(Error::Parse(ParseError::Invalid(data.split_off(line_start))));
                }
                None => {}
            }
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

    fn create_command(&mut self, command: &str) -> String {
        self.tag += 1;
        format!("{}{} {}", TAG_PREFIX, self.tag, command)
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

impl<T: Read + Write> Teardown for Client<T> {
    fn teardown(&mut self) -> Result<()> {
        self.logout()
    }
}
