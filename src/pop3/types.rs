use std::fmt;

/// What `STAT` reports about a maildrop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MailboxStats {
    pub message_count: u32,
    pub total_size_bytes: u64,
}

impl fmt::Display for MailboxStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} message(s), {} bytes",
            self.message_count, self.total_size_bytes
        )
    }
}

/// One line of a `LIST` response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageInfo {
    /// The message number, valid for the session that listed it.
    pub id: u32,
    pub size_bytes: u64,
}
