use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<()>;
}

/// Delivers through an SMTP relay using STARTTLS.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(
        host: &str,
        port: u16,
        credentials: Option<(String, String)>,
        from: &str,
    ) -> Result<Self> {
        let from: Mailbox = from.parse()?;
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?.port(port);
        if let Some((username, password)) = credentials {
            builder = builder.credentials(Credentials::new(username, password));
        }
        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(email.to.parse()?)
            .subject(email.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(email.body)?;
        self.transport.send(message).await?;
        info!("Sent mail to {}", email.to);
        Ok(())
    }
}

/// Writes messages to the log instead of sending them. For development.
pub struct ConsoleMailer;

#[async_trait]
impl Mailer for ConsoleMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<()> {
        info!(
            "Mail to {}\nSubject: {}\n\n{}",
            email.to, email.subject, email.body
        );
        Ok(())
    }
}

/// Keeps every message in memory.
#[derive(Default)]
pub struct MemoryMailer {
    outbox: Mutex<Vec<OutgoingEmail>>,
}

impl MemoryMailer {
    pub fn outbox(&self) -> Vec<OutgoingEmail> {
        self.outbox.lock().map(|o| o.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<()> {
        self.outbox
            .lock()
            .map_err(|e| anyhow::anyhow!("Outbox lock poisoned: {}", e))?
            .push(email);
        Ok(())
    }
}
