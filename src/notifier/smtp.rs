use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::info;

use super::{render_digest, DigestEmail, Notifier, NotifierError};
use crate::{directory::ContactAddress, models::Submission};

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

/// Sends digests through an SMTP relay using STARTTLS.
pub struct SmtpNotifier {
    from: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpNotifier {
    pub fn new(config: SmtpConfig) -> Result<SmtpNotifier, NotifierError> {
        let from = parse_mailbox(&config.from)?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
            .port(config.port)
            .credentials(Credentials::new(config.username, config.password))
            .build();

        Ok(SmtpNotifier { from, transport })
    }

    fn build_message(
        &self,
        to: &[ContactAddress],
        email: DigestEmail,
    ) -> Result<Message, NotifierError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(email.subject);

        for address in to {
            builder = builder.to(parse_mailbox(&address.0)?);
        }

        let message = builder.multipart(
            MultiPart::alternative()
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_PLAIN)
                        .body(email.text_body),
                )
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_HTML)
                        .body(email.html_body),
                ),
        )?;

        Ok(message)
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotifierError> {
    address.parse().map_err(|source| NotifierError::Address {
        address: address.to_string(),
        source,
    })
}

#[async_trait]
impl Notifier for SmtpNotifier {
    #[tracing::instrument(skip(self, to, submissions), fields(recipients = to.len()))]
    async fn send_digest(
        &self,
        to: &[ContactAddress],
        partner_display_name: &str,
        submissions: &[Submission],
    ) -> Result<(), NotifierError> {
        let email = render_digest(partner_display_name, submissions);
        let subject = email.subject.clone();

        let message = self.build_message(to, email)?;
        self.transport.send(message).await?;

        info!("Sent digest `{subject}` with {} submissions", submissions.len());

        Ok(())
    }
}
