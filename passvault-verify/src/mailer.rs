use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, warn};

/// Delivers verification codes to users.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_code(&self, email: &str, code: &str, valid_minutes: i64) -> Result<()>;
}

/// SMTP relay settings. Without a host, codes are only logged.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct SmtpArgs {
    /// SMTP relay host (STARTTLS)
    #[arg(long, env = "SMTP_HOST")]
    pub smtp_host: Option<String>,

    /// SMTP relay port
    #[arg(long, env = "SMTP_PORT", default_value = "587")]
    pub smtp_port: u16,

    /// SMTP login user
    #[arg(long, env = "SMTP_USER")]
    pub smtp_user: Option<String>,

    /// SMTP login password
    #[arg(long, env = "SMTP_PASSWORD", hide_env_values = true)]
    pub smtp_password: Option<String>,

    /// Sender address; defaults to the SMTP user
    #[arg(long, env = "SMTP_FROM")]
    pub smtp_from: Option<String>,
}

/// Pick the mailer for the given settings.
pub fn build_mailer(args: &SmtpArgs) -> Result<Arc<dyn Mailer>> {
    let Some(host) = args.smtp_host.as_deref() else {
        warn!("No SMTP host configured, verification codes will only be logged");
        return Ok(Arc::new(LogMailer));
    };

    let from = args
        .smtp_from
        .as_deref()
        .or(args.smtp_user.as_deref())
        .context("--smtp-from or --smtp-user is required with --smtp-host")?;
    let from: Mailbox = from
        .parse()
        .with_context(|| format!("Invalid sender address {}", from))?;

    let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
        .with_context(|| format!("Invalid SMTP host {}", host))?
        .port(args.smtp_port);
    if let (Some(user), Some(password)) = (&args.smtp_user, &args.smtp_password) {
        builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
    }

    info!("Sending codes through {}:{} as {}", host, args.smtp_port, from);
    Ok(Arc::new(SmtpMailer {
        transport: builder.build(),
        from,
    }))
}

/// Sends codes through an SMTP relay.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_code(&self, email: &str, code: &str, valid_minutes: i64) -> Result<()> {
        let message = compose(&self.from, email, code, valid_minutes)?;
        self.transport
            .send(message)
            .await
            .with_context(|| format!("SMTP delivery to {} failed", email))?;
        Ok(())
    }
}

fn compose(from: &Mailbox, email: &str, code: &str, valid_minutes: i64) -> Result<Message> {
    let to: Mailbox = email
        .parse()
        .with_context(|| format!("Invalid recipient address {}", email))?;

    Message::builder()
        .from(from.clone())
        .to(to)
        .subject("Your PassVault verification code")
        .header(ContentType::TEXT_PLAIN)
        .body(format!(
            "Your PassVault verification code is {}.\n\nIt expires in {} minutes.\n",
            code, valid_minutes
        ))
        .context("Failed to build verification e-mail")
}

/// Development mailer: writes the code to the log instead of sending mail.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_code(&self, email: &str, code: &str, valid_minutes: i64) -> Result<()> {
        info!(
            "Verification code for {}: {} (expires in {} minutes)",
            email, code, valid_minutes
        );
        Ok(())
    }
}
