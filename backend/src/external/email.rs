//! SMTP email delivery
//!
//! Settings come from the active `email_configs` row, so a transport is
//! built per send rather than once at startup.

use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use shared::template::escape_html;

use crate::error::{AppError, AppResult};

/// SMTP connection and sender settings
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_tls: bool,
    pub from_email: String,
    pub from_name: String,
}

/// Outgoing mail sender
pub struct EmailService {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailService {
    pub fn new(settings: &SmtpSettings) -> AppResult<Self> {
        if !settings.use_tls {
            tracing::warn!(host = %settings.host, "SMTP TLS is disabled");
        }

        let builder = if settings.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
                .map_err(|e| AppError::EmailError(format!("create SMTP transport: {}", e)))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host)
        };

        let mut builder = builder.port(settings.port);
        if let Some(username) = settings.username.as_ref().filter(|u| !u.is_empty()) {
            builder = builder.credentials(Credentials::new(
                username.clone(),
                settings.password.clone().unwrap_or_default(),
            ));
        }

        let from = format!("{} <{}>", settings.from_name, settings.from_email)
            .parse::<Mailbox>()
            .map_err(|e| AppError::validation("from_email", format!("Invalid sender: {}", e)))?;

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    /// Send a driver the link to review and sign an agreement
    pub async fn send_signing_link(
        &self,
        to_email: &str,
        to_name: &str,
        agreement_number: &str,
        link: &str,
    ) -> AppResult<()> {
        let subject = format!("Please sign rental agreement {}", agreement_number);
        let body = signing_link_body(to_name, agreement_number, link);
        self.send(to_email, Some(to_name), &subject, body).await
    }

    /// Send a short message confirming the SMTP settings work
    pub async fn send_test(&self, to_email: &str) -> AppResult<()> {
        let body = "<p>This is a test message from the Fleet Management Platform. \
                    Your email settings are working.</p>"
            .to_string();
        self.send(to_email, None, "Fleet Management test email", body)
            .await
    }

    async fn send(
        &self,
        to_email: &str,
        to_name: Option<&str>,
        subject: &str,
        body: String,
    ) -> AppResult<()> {
        let to = match to_name {
            Some(name) => format!("{} <{}>", name, to_email),
            None => to_email.to_string(),
        }
        .parse::<Mailbox>()
        .map_err(|e| AppError::validation("email", format!("Invalid recipient: {}", e)))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(body)
            .map_err(|e| AppError::EmailError(format!("build message: {}", e)))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| AppError::EmailError(e.to_string()))?;

        tracing::info!(to = %to_email, subject = %subject, "Email sent");
        Ok(())
    }
}

fn signing_link_body(to_name: &str, agreement_number: &str, link: &str) -> String {
    let name = escape_html(to_name);
    let number = escape_html(agreement_number);
    let link = escape_html(link);

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Rental agreement {number}</title>
</head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
    <p>Hello {name},</p>
    <p>Your rental agreement <strong>{number}</strong> is ready for your signature.</p>
    <p><a href="{link}">Review and sign the agreement</a></p>
    <p>Or copy this link into your browser:<br>{link}</p>
    <p>The link can be used once and expires after a limited time.</p>
</body>
</html>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> SmtpSettings {
        SmtpSettings {
            host: "smtp.example.com".to_string(),
            port: 587,
            username: Some("user".to_string()),
            password: Some("secret".to_string()),
            use_tls: true,
            from_email: "fleet@example.com".to_string(),
            from_name: "Fleet Office".to_string(),
        }
    }

    #[tokio::test]
    async fn test_email_service_creation() {
        assert!(EmailService::new(&settings()).is_ok());

        let plain = SmtpSettings {
            use_tls: false,
            username: None,
            ..settings()
        };
        assert!(EmailService::new(&plain).is_ok());
    }

    #[tokio::test]
    async fn test_invalid_sender_is_rejected() {
        let bad = SmtpSettings {
            from_email: "not an address".to_string(),
            ..settings()
        };
        assert!(matches!(
            EmailService::new(&bad),
            Err(AppError::Validation { .. })
        ));
    }

    #[test]
    fn test_signing_body_escapes_input() {
        let body = signing_link_body(
            "<script>",
            "AGR-2026-00001",
            "https://fleet.example.com/sign/abc",
        );
        assert!(body.contains("&lt;script&gt;"));
        assert!(body.contains("https://fleet.example.com/sign/abc"));
        assert!(body.contains("AGR-2026-00001"));
    }
}
