//! Best-effort notification email.
//!
//! Every notice is spawned fire-and-forget: a build or send failure is
//! logged and never reaches the operation that triggered it.

use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use tracing::{debug, warn};

use crate::config::ServerConfig;

#[derive(Clone)]
pub struct Notifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl Notifier {
    /// Build a notifier from config; `None` when SMTP is unconfigured or
    /// the configuration is unusable (the server runs fine without it).
    pub fn from_config(config: &ServerConfig) -> Option<Self> {
        let smtp = config.smtp.as_ref()?;

        let from: Mailbox = match smtp.from.parse() {
            Ok(mailbox) => mailbox,
            Err(e) => {
                warn!(error = %e, "invalid SMTP_FROM, notifications disabled");
                return None;
            }
        };

        let transport = match AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host) {
            Ok(builder) => builder
                .credentials(Credentials::new(smtp.user.clone(), smtp.pass.clone()))
                .build(),
            Err(e) => {
                warn!(error = %e, "invalid SMTP_HOST, notifications disabled");
                return None;
            }
        };

        Some(Self { transport, from })
    }

    /// Queue one notice and return immediately.
    pub fn spawn_notice(&self, to: String, subject: String, body: String) {
        let transport = self.transport.clone();
        let from = self.from.clone();

        tokio::spawn(async move {
            let to: Mailbox = match to.parse() {
                Ok(mailbox) => mailbox,
                Err(e) => {
                    debug!(error = %e, "unparseable notification address");
                    return;
                }
            };

            let email = match lettre::Message::builder()
                .from(from)
                .to(to)
                .subject(subject)
                .body(body)
            {
                Ok(email) => email,
                Err(e) => {
                    debug!(error = %e, "failed to build notification email");
                    return;
                }
            };

            if let Err(e) = transport.send(email).await {
                warn!(error = %e, "notification email failed");
            }
        });
    }
}
