//! Composing outgoing messages.
//!
//! A [`MessageSpec`] is a flat set of fields. [`MessageBuilder::build`] validates it and renders
//! an immutable [`ComposedMessage`] that can be handed to [`SmtpSender::send`] any number of
//! times.
//!
//! [`SmtpSender::send`]: crate::smtp::SmtpSender::send

use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

use chrono::{DateTime, Local};
use lettre::address::{Address, Envelope};
use lettre::message::header::{ContentType, HeaderName, HeaderValue};
use lettre::message::{Mailbox, MultiPart};

use crate::error::{Error, Result};

/// Header names that custom headers may not override (compared case-insensitively).
pub const PROTECTED_HEADERS: [&str; 5] = ["Subject", "From", "To", "Date", "Message-ID"];

/// The fields a message is built from.
///
/// Only `recipient_address` and `sender_address` are required; everything else defaults to
/// empty.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageSpec {
    pub recipient_address: String,
    pub sender_address: String,
    pub subject: String,
    pub sender_display_name: String,
    pub recipient_display_name: String,
    pub content_text: String,
    pub content_html: String,
    pub custom_headers: BTreeMap<String, String>,
}

impl MessageSpec {
    /// A spec with just the two required addresses filled in.
    pub fn new(sender_address: impl Into<String>, recipient_address: impl Into<String>) -> Self {
        MessageSpec {
            sender_address: sender_address.into(),
            recipient_address: recipient_address.into(),
            ..Default::default()
        }
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn sender_display_name(mut self, name: impl Into<String>) -> Self {
        self.sender_display_name = name.into();
        self
    }

    pub fn recipient_display_name(mut self, name: impl Into<String>) -> Self {
        self.recipient_display_name = name.into();
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.content_text = text.into();
        self
    }

    pub fn html(mut self, html: impl Into<String>) -> Self {
        self.content_html = html.into();
        self
    }

    /// Add a custom header. Setting the same name twice keeps the last value.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_headers.insert(name.into(), value.into());
        self
    }
}

/// The body of a composed message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Body {
    /// A single `text/plain` part.
    Text(String),
    /// A single `text/html` part. May be empty.
    Html(String),
    /// `multipart/alternative` with the plain text first and the HTML second.
    Alternative { text: String, html: String },
}

/// One part of a [`Body`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Part<'a> {
    /// The part's MIME type, without parameters.
    pub content_type: &'static str,
    /// The part's content.
    pub content: &'a str,
}

impl Body {
    /// The parts of this body, in the order they appear on the wire.
    pub fn parts(&self) -> Vec<Part<'_>> {
        match self {
            Body::Text(text) => vec![Part {
                content_type: "text/plain",
                content: text,
            }],
            Body::Html(html) => vec![Part {
                content_type: "text/html",
                content: html,
            }],
            Body::Alternative { text, html } => vec![
                Part {
                    content_type: "text/plain",
                    content: text,
                },
                Part {
                    content_type: "text/html",
                    content: html,
                },
            ],
        }
    }

    /// Whether this body has more than one part.
    pub fn is_multipart(&self) -> bool {
        matches!(self, Body::Alternative { .. })
    }
}

/// A fully rendered message, ready to be serialized and submitted.
#[derive(Clone, Debug)]
pub struct ComposedMessage {
    message: lettre::Message,
    body: Body,
    subject: String,
    message_id: String,
    date: DateTime<Local>,
}

impl ComposedMessage {
    /// The wire-ready RFC 5322 bytes.
    pub fn formatted(&self) -> Vec<u8> {
        self.message.formatted()
    }

    /// The SMTP envelope (sender and recipients).
    pub fn envelope(&self) -> &Envelope {
        self.message.envelope()
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// The `Message-ID` header value, including the angle brackets.
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// The local time the message was built at, as written in its `Date` header.
    pub fn date(&self) -> DateTime<Local> {
        self.date
    }
}

impl fmt::Display for ComposedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.formatted()))
    }
}

/// Turns a [`MessageSpec`] into a [`ComposedMessage`].
#[derive(Clone, Copy, Debug, Default)]
pub struct MessageBuilder;

impl MessageBuilder {
    pub fn new() -> Self {
        MessageBuilder
    }

    /// Validate `spec` and render it.
    ///
    /// The body is plain text when `content_text` is set, plain text with an HTML alternative
    /// when `content_html` is set as well, and HTML otherwise, even if the HTML is empty.
    pub fn build(&self, spec: &MessageSpec) -> Result<ComposedMessage> {
        if spec.recipient_address.trim().is_empty() {
            return Err(Error::MissingField("recipient_address"));
        }
        if spec.sender_address.trim().is_empty() {
            return Err(Error::MissingField("sender_address"));
        }

        let domain = sender_domain(&spec.sender_address)?;
        let message_id = format!("<{}@{}>", uuid::Uuid::new_v4().simple(), domain);
        let date = Local::now();

        let mut builder = lettre::Message::builder()
            .from(mailbox(&spec.sender_display_name, &spec.sender_address)?)
            .to(mailbox(&spec.recipient_display_name, &spec.recipient_address)?)
            .subject(spec.subject.as_str())
            .date(SystemTime::from(date))
            .message_id(Some(message_id.clone()));

        for (name, value) in &spec.custom_headers {
            builder = builder.raw_header(custom_header(name, value)?);
        }

        let body = if spec.content_text.is_empty() {
            Body::Html(spec.content_html.clone())
        } else if spec.content_html.is_empty() {
            Body::Text(spec.content_text.clone())
        } else {
            Body::Alternative {
                text: spec.content_text.clone(),
                html: spec.content_html.clone(),
            }
        };

        let mut message = match body {
            Body::Text(ref text) => builder.header(ContentType::TEXT_PLAIN).body(text.clone())?,
            Body::Html(ref html) => builder.header(ContentType::TEXT_HTML).body(html.clone())?,
            Body::Alternative { ref text, ref html } => builder.multipart(
                MultiPart::alternative_plain_html(text.clone(), html.clone()),
            )?,
        };

        // lettre renders a SystemTime in UTC; keep the local offset instead
        message.headers_mut().insert_raw(HeaderValue::new(
            HeaderName::new_from_ascii_str("Date"),
            date.to_rfc2822(),
        ));

        Ok(ComposedMessage {
            message,
            body,
            subject: spec.subject.clone(),
            message_id,
            date,
        })
    }
}

/// The part of `address` after the `@`.
fn sender_domain(address: &str) -> Result<&str> {
    match address.split_once('@') {
        Some((_, domain)) if !domain.is_empty() => Ok(domain),
        _ => Err(Error::MalformedAddress(address.to_string())),
    }
}

fn mailbox(display_name: &str, address: &str) -> Result<Mailbox> {
    let addr: Address = address
        .trim()
        .parse()
        .map_err(|_| Error::MalformedAddress(address.to_string()))?;
    let name = Some(display_name.trim())
        .filter(|n| !n.is_empty())
        .map(String::from);
    Ok(Mailbox::new(name, addr))
}

fn custom_header(name: &str, value: &str) -> Result<HeaderValue> {
    if PROTECTED_HEADERS
        .iter()
        .any(|p| p.eq_ignore_ascii_case(name))
    {
        return Err(Error::InvalidHeader(name.to_string()));
    }
    if value.contains(['\r', '\n']) {
        return Err(Error::InvalidHeader(name.to_string()));
    }
    let name = HeaderName::new_from_ascii(name.to_string())
        .map_err(|_| Error::InvalidHeader(name.to_string()))?;
    Ok(HeaderValue::new(name, value.to_string()))
}
