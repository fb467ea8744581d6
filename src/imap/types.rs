use std::collections::BTreeSet;
use std::fmt;

/// From section [2.3.1.2 of RFC 3501](https://tools.ietf.org/html/rfc3501#section-2.3.1.2).
///
/// A relative position from 1 to the number of messages in the mailbox. Message sequence numbers
/// are reassigned when messages are expunged, so they are only meaningful within one session.
pub type Seq = u32;

/// A mailbox as reported by one `LIST` call.
///
/// Labels are not cached; `index` is the ordinal position in the listing that produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MailboxLabel {
    /// Position of this name in the server's listing, starting at 0.
    pub index: usize,
    /// The mailbox name, usable with `SELECT`.
    pub name: String,
    /// Name attributes such as `\HasNoChildren` or `\Noselect`.
    pub flags: BTreeSet<String>,
    /// The hierarchy delimiter, empty for flat names.
    pub delimiter: String,
}

impl MailboxLabel {
    /// Whether the server says this name cannot be selected.
    pub fn is_selectable(&self) -> bool {
        !self.flags.iter().any(|f| f.eq_ignore_ascii_case("\\Noselect"))
    }
}

impl fmt::Display for MailboxLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.index, self.name)
    }
}
