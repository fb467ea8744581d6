use std::env;
use std::error::Error;

use smtpemail::{Credentials, MessageBuilder, MessageSpec, SmtpSender};

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let server = env::var("SMTP_SERVER")?;
    let port = env::var("SMTP_PORT").unwrap_or_else(|_| String::from("25"));
    let port = port.parse()?;
    let username = env::var("SMTP_USER")?;
    let password = env::var("SMTP_PASSWORD")?;
    let to = env::var("MAIL_TO")?;

    let message = MessageBuilder::new().build(
        &MessageSpec::new(&username, &to)
            .sender_display_name("smtpemail demo")
            .subject("Hello from smtpemail")
            .text("This message has a plain text part.")
            .html("<p>This message has an <b>HTML</b> part too.</p>")
            .header("X-Mailer", "smtpemail"),
    )?;
    println!("{}", message);

    let sender = SmtpSender::new(Credentials::new(server, &username, password).with_port(port))?;
    let reply = sender.send(&message)?;
    println!("server said: {}", reply);

    Ok(())
}
