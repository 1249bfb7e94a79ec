use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use gazette_web::mail::{ConsoleMailer, Mailer, SmtpMailer};

/// Secrets that ship in example files and must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "secret",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailBackend {
    Console,
    Smtp {
        host: String,
        port: u16,
        credentials: Option<(String, String)>,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub secret_key: String,
    pub site_url: String,
    pub media_root: PathBuf,
    pub token_timeout: Duration,
    pub mail: MailBackend,
    pub mail_from: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let secret_key = var("GAZETTE_SECRET_KEY").unwrap_or_default();
        if secret_key.is_empty() || PLACEHOLDER_SECRETS.contains(&secret_key.as_str()) {
            bail!("GAZETTE_SECRET_KEY is unset or still a placeholder");
        }

        let port: u16 = or("GAZETTE_PORT", "8000")
            .parse()
            .context("GAZETTE_PORT must be a port number")?;
        let token_secs: u64 = or("GAZETTE_TOKEN_TIMEOUT_SECS", "259200")
            .parse()
            .context("GAZETTE_TOKEN_TIMEOUT_SECS must be a whole number of seconds")?;

        let mail = match or("GAZETTE_MAIL_BACKEND", "console").to_lowercase().as_str() {
            "console" => MailBackend::Console,
            "smtp" => {
                let host = var("GAZETTE_SMTP_HOST")
                    .context("GAZETTE_SMTP_HOST is required for the smtp mail backend")?;
                let port: u16 = or("GAZETTE_SMTP_PORT", "587")
                    .parse()
                    .context("GAZETTE_SMTP_PORT must be a port number")?;
                let credentials = match (var("GAZETTE_SMTP_USERNAME"), var("GAZETTE_SMTP_PASSWORD")) {
                    (Some(user), Some(pass)) => Some((user, pass)),
                    (None, None) => None,
                    _ => bail!("Set both GAZETTE_SMTP_USERNAME and GAZETTE_SMTP_PASSWORD, or neither"),
                };
                MailBackend::Smtp { host, port, credentials }
            }
            other => bail!("Unknown GAZETTE_MAIL_BACKEND {:?} (expected console or smtp)", other),
        };

        Ok(Self {
            host: or("GAZETTE_HOST", "0.0.0.0"),
            port,
            db_path: or("GAZETTE_DB_PATH", "gazette.db").into(),
            secret_key,
            site_url: or("GAZETTE_SITE_URL", "http://localhost:8000"),
            media_root: or("GAZETTE_MEDIA_ROOT", "./media").into(),
            token_timeout: Duration::from_secs(token_secs),
            mail,
            mail_from: or("GAZETTE_MAIL_FROM", "webmaster@localhost"),
        })
    }

    pub fn mailer(&self) -> Result<Arc<dyn Mailer>> {
        Ok(match &self.mail {
            MailBackend::Console => Arc::new(ConsoleMailer),
            MailBackend::Smtp { host, port, credentials } => Arc::new(SmtpMailer::new(
                host,
                *port,
                credentials.clone(),
                &self.mail_from,
            )?),
        })
    }
}
