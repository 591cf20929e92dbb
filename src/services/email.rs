use anyhow::Context;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use uuid::Uuid;

use crate::config::Config;

pub struct EmailService {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    receiver: Mailbox,
}

/// A message submitted through a site's contact form.
#[derive(Debug, Clone)]
pub struct ContactMessage<'a> {
    pub tenant: &'a str,
    pub client_email: &'a str,
    pub subject: &'a str,
    pub message: &'a str,
}

impl EmailService {
    /// Returns None if SMTP is not fully configured.
    pub fn new(config: &Config) -> Option<Self> {
        let host = config.smtp_host.as_deref()?;
        let username = config.smtp_username.clone()?;
        let password = config.smtp_password.clone()?;

        let port = config.smtp_port.unwrap_or(465);
        let from_addr = config.smtp_from.clone().unwrap_or_else(|| username.clone());
        let receiver_addr = config.receiver_email.clone().unwrap_or_else(|| username.clone());
        let creds = Credentials::new(username, password);

        let transport = if port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .ok()?
                .port(port)
                .credentials(creds)
                .build()
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .ok()?
                .port(port)
                .credentials(creds)
                .build()
        };

        let from = Mailbox::new(Some(config.from_name.clone()), from_addr.parse().ok()?);
        let receiver: Mailbox = receiver_addr.parse().ok()?;

        Some(Self { transport, from, receiver })
    }

    fn new_message_id(&self) -> String {
        format!("<{}@{}>", Uuid::new_v4(), self.from.email.domain())
    }

    /// Forward a contact-form submission to the site owner. Replies go to the
    /// visitor's address.
    pub async fn send_contact_message(&self, msg: &ContactMessage<'_>) -> anyhow::Result<()> {
        let reply_to: Mailbox = msg
            .client_email
            .parse()
            .with_context(|| format!("Invalid reply-to address: {}", msg.client_email))?;
        let subject = format!("Formulario de contacto: {}", msg.subject);
        let (text, html) = contact_bodies(msg);

        let email = Message::builder()
            .message_id(Some(self.new_message_id()))
            .from(self.from.clone())
            .reply_to(reply_to)
            .to(self.receiver.clone())
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html),
                    ),
            )
            .context("Failed to build email message")?;

        self.transport
            .send(email)
            .await
            .context("Failed to send email")?;

        tracing::info!(tenant = msg.tenant, "Contact message forwarded");
        Ok(())
    }
}

fn contact_bodies(msg: &ContactMessage<'_>) -> (String, String) {
    let text = format!(
        "Nuevo mensaje de contacto:\n\n\
         Sitio: {}\n\
         De: {}\n\
         Asunto: {}\n\n\
         Mensaje:\n{}",
        msg.tenant, msg.client_email, msg.subject, msg.message
    );

    let html = format!(
        r#"<h1 style="margin:0 0 20px 0;font-size:20px;font-weight:700;color:#0f172a">Nuevo mensaje de contacto</h1>
<table role="presentation" width="100%" cellpadding="0" cellspacing="0">
  <tr><td style="padding:10px 12px;font-size:14px;color:#64748b;width:120px">Sitio</td><td style="padding:10px 12px;font-size:14px;color:#0f172a">{}</td></tr>
  <tr><td style="padding:10px 12px;font-size:14px;color:#64748b">De</td><td style="padding:10px 12px;font-size:14px;color:#0f172a">{}</td></tr>
  <tr><td style="padding:10px 12px;font-size:14px;color:#64748b">Asunto</td><td style="padding:10px 12px;font-size:14px;color:#0f172a">{}</td></tr>
</table>
<p style="margin:20px 0 0 0;font-size:15px;color:#334155;white-space:pre-wrap">{}</p>"#,
        escape_html(msg.tenant),
        escape_html(msg.client_email),
        escape_html(msg.subject),
        escape_html(msg.message)
    );
    (text, html)
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_body_escapes_visitor_input() {
        let msg = ContactMessage {
            tenant: "acme",
            client_email: "visitor@example.com",
            subject: "Hola",
            message: "<script>alert(1)</script>",
        };
        let (text, html) = contact_bodies(&msg);
        assert!(text.contains("<script>"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }
}
