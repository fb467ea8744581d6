use imap_proto::{AttributeValue, MailboxDatum, NameAttribute, Response};

use super::types::{MailboxLabel, Seq};
use crate::error::{Error, ParseError, Result};

/// Walk every response in `lines`, handing each to `each`. Responses `each` does not care about
/// (unilateral `EXISTS`, `RECENT`, status updates) are simply skipped.
fn for_each_response<'a, F>(mut lines: &'a [u8], mut each: F) -> Result<()>
where
    F: FnMut(Response<'a>),
{
    while !lines.is_empty() {
        match imap_proto::parser::parse_response(lines) {
            Ok((rest, resp)) => {
                lines = rest;
                each(resp);
            }
            _ => return Err(Error::Parse(ParseError::Invalid(lines.to_vec()))),
        }
    }
    Ok(())
}

pub fn parse_names(lines: &[u8]) -> Result<Vec<MailboxLabel>> {
    let mut names = Vec::new();
    for_each_response(lines, |resp| {
        if let Response::MailboxData(MailboxDatum::List {
            name_attributes,
            delimiter,
            name,
        }) = resp
        {
            names.push(MailboxLabel {
                index: names.len(),
                name: name.to_string(),
                flags: name_attributes.iter().map(attribute_text).collect(),
                delimiter: delimiter.map(|d| d.to_string()).unwrap_or_default(),
            });
        }
    })?;
    Ok(names)
}

/// The attribute as the server wrote it.
fn attribute_text(attribute: &NameAttribute<'_>) -> String {
    match attribute {
        NameAttribute::NoInferiors => "\\Noinferiors".to_string(),
        NameAttribute::NoSelect => "\\Noselect".to_string(),
        NameAttribute::Marked => "\\Marked".to_string(),
        NameAttribute::Unmarked => "\\Unmarked".to_string(),
        NameAttribute::All => "\\All".to_string(),
        NameAttribute::Archive => "\\Archive".to_string(),
        NameAttribute::Drafts => "\\Drafts".to_string(),
        NameAttribute::Flagged => "\\Flagged".to_string(),
        NameAttribute::Junk => "\\Junk".to_string(),
        NameAttribute::Sent => "\\Sent".to_string(),
        NameAttribute::Trash => "\\Trash".to_string(),
        NameAttribute::Extension(s) => s.to_string(),
        other => format!("{:?}", other),
    }
}

/// Message ids from one or more `SEARCH` responses, in the order the server sent them.
pub fn parse_ids(lines: &[u8]) -> Result<Vec<Seq>> {
    let mut ids = Vec::new();
    for_each_response(lines, |resp| {
        if let Response::MailboxData(MailboxDatum::Search(found)) = resp {
            ids.extend(found);
        }
    })?;
    Ok(ids)
}

/// The `EXISTS` count from a `SELECT` response.
pub fn parse_exists(lines: &[u8]) -> Result<u32> {
    let mut exists = 0;
    for_each_response(lines, |resp| {
        if let Response::MailboxData(MailboxDatum::Exists(n)) = resp {
            exists = n;
        }
    })?;
    Ok(exists)
}

/// `(sequence number, RFC822 content)` for every `FETCH` response that carried content.
pub fn parse_fetches(lines: &[u8]) -> Result<Vec<(Seq, Vec<u8>)>> {
    let mut fetches = Vec::new();
    for_each_response(lines, |resp| {
        if let Response::Fetch(num, attrs) = resp {
            for attr in attrs {
                if let AttributeValue::Rfc822(Some(body)) = attr {
                    fetches.push((num, body.to_vec()));
                }
            }
        }
    })?;
    Ok(fetches)
}

pub fn parse_expunge(lines: &[u8]) -> Result<Vec<Seq>> {
    let mut expunged = Vec::new();
    for_each_response(lines, |resp| {
        if let Response::Expunge(n) = resp {
            expunged.push(n);
        }
    })?;
    Ok(expunged)
}
