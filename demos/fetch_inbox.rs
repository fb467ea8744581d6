use std::env;
use std::error::Error;
use std::time::Duration;

use smtpemail::imap::{ImapRetriever, RetrieveRequest};
use smtpemail::{Credentials, Pop3Retriever};

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let server = env::var("MAIL_SERVER")?;
    let username = env::var("MAIL_USER")?;
    let password = env::var("MAIL_PASSWORD")?;
    let ranges = env::var("MAIL_IDS").ok();

    let mut imap = ImapRetriever::new(Credentials::new(&server, &username, &password))?;
    imap.cooldown(Duration::from_millis(200)).on_exit(|exit| {
        if let Some(e) = exit.error {
            eprintln!("logout from {} failed: {}", exit.server, e);
        }
    });

    for (index, name) in imap.list_mailboxes()? {
        println!("{:>3}  {}", index, name);
    }

    let mut request = RetrieveRequest::new().select_mailbox_with(|labels| {
        labels
            .iter()
            .find(|label| label.name.eq_ignore_ascii_case("INBOX"))
            .map(|label| label.name.clone())
    });
    if let Some(ranges) = ranges {
        request = request.id_ranges(ranges);
    }

    for message in imap.retrieve(request)? {
        let message = message?;
        let text = String::from_utf8_lossy(&message);
        let subject = text
            .lines()
            .find(|line| line.starts_with("Subject:"))
            .unwrap_or("Subject: (none)");
        println!("{} ({} bytes)", subject, message.len());
    }

    if let Ok(pop3_server) = env::var("POP3_SERVER") {
        let pop3 = Pop3Retriever::new(Credentials::new(pop3_server, &username, &password))?;
        println!("POP3: {}", pop3.mailbox_size()?);
    }

    Ok(())
}
