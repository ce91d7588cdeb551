use std::{path::Path, sync::Arc, time::Duration};

use futures::future::BoxFuture;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Attachment, Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use log::debug;

use crate::error::AlertError;
use crate::report::Report;

/// MIME type every attachment is sent with, whatever the actual upload format.
const ATTACHMENT_MIME: &str = "image/jpeg";

const SMTP_TIMEOUT_SECONDS: u64 = 30;

/// Something that can deliver a built e-mail.
pub trait MailTransport: Send + Sync {
    fn send(&self, message: Message) -> BoxFuture<'_, Result<(), AlertError>>;
}

/// Authenticated SMTP submission upgraded with STARTTLS.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    /// Create a mailer for `host:port` using the given credentials.
    ///
    /// No connection is opened until the first message is sent.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS parameters for `host` cannot be built.
    pub fn new(
        host: &str,
        port: u16,
        username: String,
        password: String,
    ) -> Result<Self, AlertError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| AlertError::SendFailed {
                reason: e.to_string(),
            })?
            .port(port)
            .credentials(Credentials::new(username, password))
            .timeout(Some(Duration::from_secs(SMTP_TIMEOUT_SECONDS)))
            .build();

        Ok(Self { transport })
    }
}

impl MailTransport for SmtpMailer {
    fn send(&self, message: Message) -> BoxFuture<'_, Result<(), AlertError>> {
        Box::pin(async move {
            self.transport
                .send(message)
                .await
                .map(|_| ())
                .map_err(|e| AlertError::SendFailed {
                    reason: e.to_string(),
                })
        })
    }
}

/// E-mail alert service for detection reports.
///
/// Every report goes to one fixed recipient. Delivery is best-effort: callers
/// get a `Result` back and decide what to do with a failure, nothing is retried.
#[derive(Clone)]
pub struct AlertService {
    transport: Arc<dyn MailTransport>,
    sender: String,
    recipient: String,
}

impl AlertService {
    /// Create a new AlertService.
    ///
    /// # Arguments
    ///
    /// * `transport` - Delivery backend, usually an [`SmtpMailer`]
    /// * `sender` - Mailbox placed in `From`
    /// * `recipient` - Mailbox placed in `To`
    ///
    pub fn new(transport: Arc<dyn MailTransport>, sender: String, recipient: String) -> Self {
        Self {
            transport,
            sender,
            recipient,
        }
    }

    /// Send `report`, attaching the uploaded image when it has one.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The attachment cannot be read
    /// - Sender or recipient is not a valid mailbox
    /// - The SMTP server rejects the login or the message, or is unreachable
    ///
    pub async fn notify(&self, report: &Report) -> Result<(), AlertError> {
        let attachment = match &report.attachment_path {
            Some(path) => Some(read_attachment(path).await?),
            None => None,
        };

        let message = self.build_message(report, attachment)?;
        self.transport.send(message).await?;

        debug!("Report e-mail '{}' sent to {}", report.subject, self.recipient);
        Ok(())
    }

    /// Assemble the e-mail for `report`.
    ///
    /// With an attachment the message is `multipart/mixed` holding the plain
    /// text body followed by the image; otherwise it is plain text only.
    pub fn build_message(
        &self,
        report: &Report,
        attachment: Option<(String, Vec<u8>)>,
    ) -> Result<Message, AlertError> {
        let builder = Message::builder()
            .from(parse_mailbox(&self.sender)?)
            .to(parse_mailbox(&self.recipient)?)
            .subject(report.subject.clone());

        let built = match attachment {
            Some((filename, bytes)) => {
                let content_type = ContentType::parse(ATTACHMENT_MIME).map_err(|e| {
                    AlertError::MessageBuildFailed {
                        reason: e.to_string(),
                    }
                })?;
                builder.multipart(
                    MultiPart::mixed()
                        .singlepart(SinglePart::plain(report.body.clone()))
                        .singlepart(Attachment::new(filename).body(bytes, content_type)),
                )
            }
            None => builder
                .header(ContentType::TEXT_PLAIN)
                .body(report.body.clone()),
        };

        built.map_err(|e| AlertError::MessageBuildFailed {
            reason: e.to_string(),
        })
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, AlertError> {
    address
        .parse::<Mailbox>()
        .map_err(|e| AlertError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

/// Read an attachment and derive its filename from the path.
async fn read_attachment(path: &Path) -> Result<(String, Vec<u8>), AlertError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| AlertError::AttachmentReadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image.jpg".to_string());

    Ok((filename, bytes))
}
