//! New-chat email notifications
//!
//! The site owner gets an email whenever a visitor starts or reopens a
//! conversation. Delivery goes through a pluggable sender (SendGrid, SMTP, or
//! none) and always runs in a spawned task so a mail failure never fails the
//! chat request that triggered it.

use crate::config::{NotificationConfig, NotificationProvider, SiteConfig};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tera::Tera;
use tokio::task::JoinHandle;

const TEMPLATE_NAME: &str = "chat_notification.html";

const CHAT_NOTIFICATION_TEMPLATE: &str = r#"<div style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Arial, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
  <h2 style="color: #1a1a1a; margin-bottom: 20px;">{{ heading }}</h2>
  <p style="color: #4a4a4a; font-size: 16px; line-height: 1.5;">{{ body }}</p>
  <div style="background-color: #f5f5f5; border-radius: 8px; padding: 16px; margin: 20px 0;">
    <p style="margin: 0 0 8px 0; color: #4a4a4a;"><strong>Visitor ID:</strong> {{ visitor_id }}...</p>
    {% if post_title %}<p style="margin: 0 0 8px 0; color: #4a4a4a;"><strong>From article:</strong> {{ post_title }}</p>{% endif %}
    {% if source_url %}<p style="margin: 0; color: #4a4a4a;"><strong>Source URL:</strong> <a href="{{ source_url }}" style="color: #0070f3;">{{ source_url }}</a></p>{% endif %}
  </div>
  <p style="margin-top: 24px;">
    <a href="{{ admin_url }}" style="background-color: #0070f3; color: white; padding: 12px 24px; text-decoration: none; border-radius: 6px; display: inline-block;">Open Conversation</a>
  </p>
  <p style="color: #888; font-size: 12px; margin-top: 32px;">This notification was sent from your website's live chat system.</p>
</div>
"#;

/// What happened in the chat
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatNotification {
    pub conversation_id: String,
    pub visitor_id: String,
    pub post_title: Option<String>,
    pub source_url: Option<String>,
    pub is_reopen: bool,
}

/// Rendered email ready for a sender
#[derive(Debug, Clone, PartialEq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Mail transport
#[async_trait]
pub trait NotificationSender: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// SendGrid v3 mail API
pub struct SendGridSender {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    from_email: String,
    from_name: String,
}

impl SendGridSender {
    pub fn new(config: &NotificationConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_url: config.sendgrid_api_url.trim_end_matches('/').to_string(),
            api_key,
            from_email: config.from_email.clone(),
            from_name: config.from_name.clone(),
        })
    }

    fn payload(&self, message: &EmailMessage) -> serde_json::Value {
        json!({
            "personalizations": [{ "to": [{ "email": message.to }] }],
            "from": { "email": self.from_email, "name": self.from_name },
            "subject": message.subject,
            "content": [{ "type": "text/html", "value": message.html }],
        })
    }
}

#[async_trait]
impl NotificationSender for SendGridSender {
    fn name(&self) -> &'static str {
        "sendgrid"
    }

    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/v3/mail/send", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&self.payload(message))
            .send()
            .await
            .context("SendGrid request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("SendGrid API error: {} - {}", status, body));
        }
        Ok(())
    }
}

/// SMTP relay via lettre
pub struct SmtpSender {
    host: String,
    port: u16,
    credentials: Option<(String, String)>,
    from: String,
}

impl SmtpSender {
    pub fn new(config: &NotificationConfig, host: String) -> Self {
        let credentials = match (&config.smtp_username, &config.smtp_password) {
            (Some(user), Some(pass)) => Some((user.clone(), pass.clone())),
            _ => None,
        };
        Self {
            host,
            port: config.smtp_port,
            credentials,
            from: format!("{} <{}>", config.from_name, config.from_email),
        }
    }
}

#[async_trait]
impl NotificationSender for SmtpSender {
    fn name(&self) -> &'static str {
        "smtp"
    }

    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let from: Mailbox = self
            .from
            .parse()
            .map_err(|e| anyhow!("Invalid from address: {}", e))?;
        let to: Mailbox = message
            .to
            .parse()
            .map_err(|e| anyhow!("Invalid to address: {}", e))?;

        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(message.subject.clone())
            .header(ContentType::TEXT_HTML)
            .body(message.html.clone())
            .map_err(|e| anyhow!("Failed to build email: {}", e))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&self.host)
            .map_err(|e| anyhow!("Failed to create SMTP transport: {}", e))?
            .port(self.port);
        if let Some((user, pass)) = &self.credentials {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }
        let mailer: AsyncSmtpTransport<Tokio1Executor> = builder.build();

        mailer
            .send(email)
            .await
            .map_err(|e| anyhow!("Failed to send email: {}", e))?;
        Ok(())
    }
}

/// Drops every message
pub struct NoopSender;

#[async_trait]
impl NotificationSender for NoopSender {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn send(&self, _message: &EmailMessage) -> Result<()> {
        Ok(())
    }
}

/// Renders and delivers chat notifications
pub struct ChatNotifier {
    sender: Arc<dyn NotificationSender>,
    to_email: Option<String>,
    site_url: String,
    tera: Tera,
}

impl ChatNotifier {
    pub fn new(sender: Arc<dyn NotificationSender>, to_email: Option<String>, site_url: &str) -> Result<Self> {
        let mut tera = Tera::default();
        // Values are escaped by `escape_html` before rendering.
        tera.autoescape_on(vec![]);
        tera.add_raw_template(TEMPLATE_NAME, CHAT_NOTIFICATION_TEMPLATE)
            .context("Failed to parse notification template")?;

        Ok(Self {
            sender,
            to_email: to_email.filter(|e| !e.trim().is_empty()),
            site_url: site_url.trim_end_matches('/').to_string(),
            tera,
        })
    }

    /// Pick the sender for the configured provider.
    ///
    /// A provider missing its credentials falls back to no delivery.
    pub fn from_config(config: &NotificationConfig, site: &SiteConfig) -> Result<Self> {
        let sender: Arc<dyn NotificationSender> = match config.provider {
            NotificationProvider::Sendgrid => match &config.sendgrid_api_key {
                Some(key) if !key.is_empty() => Arc::new(SendGridSender::new(config, key.clone())?),
                _ => {
                    tracing::warn!("SendGrid selected but no API key configured, chat emails disabled");
                    Arc::new(NoopSender)
                }
            },
            NotificationProvider::Smtp => match &config.smtp_host {
                Some(host) if !host.is_empty() => Arc::new(SmtpSender::new(config, host.clone())),
                _ => {
                    tracing::warn!("SMTP selected but no host configured, chat emails disabled");
                    Arc::new(NoopSender)
                }
            },
            NotificationProvider::None => Arc::new(NoopSender),
        };

        Self::new(sender, config.to_email.clone(), site.base_url())
    }

    pub fn sender_name(&self) -> &'static str {
        self.sender.name()
    }

    pub fn admin_url(&self, conversation_id: &str) -> String {
        format!(
            "{}/admin/live-chat?conversation={}",
            self.site_url,
            urlencoding::encode(conversation_id)
        )
    }

    pub fn subject(notification: &ChatNotification) -> String {
        let prefix = if notification.is_reopen {
            "Chat Reopened"
        } else {
            "New Live Chat"
        };
        let title = notification
            .post_title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .map(escape_html)
            .unwrap_or_else(|| "Direct conversation".to_string());
        format!("{}: {}", prefix, title)
    }

    /// Render the email for a recipient
    pub fn render(&self, to: &str, notification: &ChatNotification) -> Result<EmailMessage> {
        let (heading, body) = if notification.is_reopen {
            (
                "Live Chat Reopened",
                "A visitor has reopened a previously closed chat conversation.",
            )
        } else {
            ("New Live Chat Started", "A visitor has started a new chat conversation.")
        };

        let visitor_prefix: String = notification.visitor_id.chars().take(8).collect();

        let mut context = tera::Context::new();
        context.insert("heading", heading);
        context.insert("body", body);
        context.insert("visitor_id", &escape_html(&visitor_prefix));
        context.insert(
            "post_title",
            &notification.post_title.as_deref().map(escape_html),
        );
        context.insert(
            "source_url",
            &notification.source_url.as_deref().map(escape_html),
        );
        context.insert("admin_url", &escape_html(&self.admin_url(&notification.conversation_id)));

        let html = self
            .tera
            .render(TEMPLATE_NAME, &context)
            .context("Failed to render notification email")?;

        Ok(EmailMessage {
            to: to.to_string(),
            subject: Self::subject(notification),
            html,
        })
    }

    /// Deliver a notification. Returns false when it was skipped.
    pub async fn notify(&self, notification: &ChatNotification) -> Result<bool> {
        let Some(to) = self.to_email.as_deref() else {
            tracing::warn!(
                conversation_id = %notification.conversation_id,
                "No notification recipient configured, skipping chat email"
            );
            return Ok(false);
        };

        let message = self.render(to, notification)?;
        self.sender.send(&message).await?;
        Ok(true)
    }

    /// Deliver in the background, logging the outcome
    pub fn dispatch(self: &Arc<Self>, notification: ChatNotification) -> JoinHandle<()> {
        let notifier = Arc::clone(self);
        tokio::spawn(async move {
            match notifier.notify(&notification).await {
                Ok(true) => tracing::info!(
                    conversation_id = %notification.conversation_id,
                    sender = notifier.sender_name(),
                    "Chat notification sent"
                ),
                Ok(false) => {}
                Err(e) => tracing::error!(
                    conversation_id = %notification.conversation_id,
                    sender = notifier.sender_name(),
                    "Chat notification failed: {:#}",
                    e
                ),
            }
        })
    }
}

/// Escape text for interpolation into HTML
pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#039;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
