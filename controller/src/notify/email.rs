use async_trait::async_trait;
use handlebars::Handlebars;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde_json::json;
use tracing::warn;

use crate::config::SmtpConfig;

use super::{Notification, NotificationKind, NotificationSink};

const TEMPLATE_NAME: &str = "notification";

const TEMPLATE_HTML: &str = r#"
<html>
<body>
<h2>{{subject}}</h2>
<table>
  <tr><td>Container App</td><td>{{containerApp}}</td></tr>
  <tr><td>Resource Group</td><td>{{resourceGroup}}</td></tr>
  <tr><td>Action</td><td>{{action}}</td></tr>
  <tr><td>Desired Replicas</td><td>{{desiredReplicas}}</td></tr>
  <tr><td>Timestamp (UTC)</td><td>{{timestamp}}</td></tr>
  {{#if detail}}<tr><td>Detail</td><td>{{detail}}</td></tr>{{/if}}
  {{#if isRestart}}<tr><td>Restart Attempt</td><td>{{restartAttemptCount}}</td></tr>{{/if}}
</table>
{{#if restartHistory}}
<h3>Recent restart attempts</h3>
<ul>
{{#each restartHistory}}
  <li>{{this.timestamp}} — {{this.reason}} (attempt {{this.attempt_number}}, success={{this.success}})</li>
{{/each}}
</ul>
{{/if}}
</body>
</html>
"#;

/// `lettre` + `handlebars` notification sink. Mirrors the teacher's ecosystem's
/// email service: templates registered once, transport built once, send
/// failures logged and swallowed rather than propagated.
pub struct EmailNotificationSink {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    templates: Handlebars<'static>,
    from_address: String,
}

impl EmailNotificationSink {
    pub fn new(config: &SmtpConfig) -> anyhow::Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?.port(config.port);
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }
        let transport = builder.build();

        let mut templates = Handlebars::new();
        templates.set_strict_mode(false);
        templates.register_template_string(TEMPLATE_NAME, TEMPLATE_HTML)?;

        Ok(Self {
            transport,
            templates,
            from_address: config.from_address.clone(),
        })
    }

    fn render(&self, notification: &Notification) -> anyhow::Result<String> {
        let recent_history: Vec<_> = notification
            .recent_restart_history
            .iter()
            .rev()
            .take(5)
            .collect();
        let data = json!({
            "subject": notification.subject(),
            "containerApp": notification.container_app,
            "resourceGroup": notification.resource_group,
            "action": notification.action.as_str(),
            "desiredReplicas": notification.desired_replicas,
            "timestamp": notification.timestamp.to_rfc3339(),
            "detail": notification.detail,
            "isRestart": matches!(notification.action, autoscaler_types::Action::Restart),
            "restartAttemptCount": notification.restart_attempt_count,
            "restartHistory": recent_history,
        });
        Ok(self.templates.render(TEMPLATE_NAME, &data)?)
    }
}

#[async_trait]
impl NotificationSink for EmailNotificationSink {
    async fn send(&self, notification: Notification) {
        if notification.recipients.is_empty() {
            return;
        }
        let subject = notification.subject();
        let body = match self.render(&notification) {
            Ok(body) => body,
            Err(err) => {
                warn!(%err, "failed to render notification template");
                return;
            }
        };

        for recipient in &notification.recipients {
            let message = match Message::builder()
                .from(self.from_address.parse().unwrap_or_else(|_| {
                    "noreply@localhost".parse().expect("static fallback address parses")
                }))
                .to(match recipient.parse() {
                    Ok(mailbox) => mailbox,
                    Err(err) => {
                        warn!(%err, %recipient, "skipping malformed notification recipient");
                        continue;
                    }
                })
                .subject(subject.clone())
                .header(ContentType::TEXT_HTML)
                .body(body.clone())
            {
                Ok(message) => message,
                Err(err) => {
                    warn!(%err, "failed to build notification message");
                    continue;
                }
            };

            if let Err(err) = self.transport.send(message).await {
                warn!(%err, %recipient, kind = ?notification.kind_label(), "notification send failed");
            }
        }
    }
}

impl Notification {
    fn kind_label(&self) -> &'static str {
        match self.kind {
            NotificationKind::Success => "success",
            NotificationKind::Failure => "failure",
            NotificationKind::ConflictSkipped => "conflict",
            NotificationKind::ProcessingAlert => "processing_alert",
        }
    }
}
