//! Reminder dispatch: what happens when a deadline's timer fires.
//!
//! The default dispatcher e-mails the administrator a summary of the deadline
//! with two WhatsApp click-to-chat links: one addressed to the client, one to
//! the consultancy's internal number. Delivery is best effort and never
//! retried.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use visadesk_core::config::VisaDeskConfig;
use visadesk_core::deadline::Deadline;
use visadesk_core::error::Result;

use crate::email::EmailSender;
use crate::notify::{DeliveryStatus, ReminderLog, ReminderRecord};
use crate::whatsapp::{LinkBuilder, MessageTemplate};

/// Invoked once per fired reminder with the deadline snapshot taken when the
/// reminder was scheduled.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, deadline: &Deadline) -> Result<DispatchReport>;
}

/// What a successful dispatch produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    pub recipient: String,
    pub client_link: Option<String>,
    pub internal_link: Option<String>,
}

/// E-mail + WhatsApp-link reminder dispatcher.
pub struct ReminderNotifier {
    mailer: Arc<dyn EmailSender>,
    links: LinkBuilder,
    admin_email: String,
    internal_phone: Option<String>,
    organization: String,
    log: ReminderLog,
}

impl ReminderNotifier {
    pub fn new(mailer: Arc<dyn EmailSender>, admin_email: &str) -> Self {
        Self {
            mailer,
            links: LinkBuilder::default(),
            admin_email: admin_email.to_string(),
            internal_phone: None,
            organization: "VisaDesk".into(),
            log: ReminderLog::new(),
        }
    }

    pub fn from_config(config: &VisaDeskConfig, mailer: Arc<dyn EmailSender>) -> Self {
        let org = &config.organization;
        Self {
            mailer,
            links: LinkBuilder::from_config(&config.whatsapp),
            admin_email: org.admin_email.clone(),
            internal_phone: Some(org.internal_phone.clone()).filter(|p| !p.trim().is_empty()),
            organization: org.name.clone(),
            log: ReminderLog::new(),
        }
    }

    pub fn with_internal_phone(mut self, phone: &str) -> Self {
        self.internal_phone = Some(phone.to_string());
        self
    }

    pub fn with_links(mut self, links: LinkBuilder) -> Self {
        self.links = links;
        self
    }

    pub fn with_log(mut self, log: ReminderLog) -> Self {
        self.log = log;
        self
    }

    /// History of fired reminders, shared with anyone holding a clone.
    pub fn log(&self) -> ReminderLog {
        self.log.clone()
    }

    fn build_link(
        &self,
        deadline: &Deadline,
        phone: Option<&str>,
        template: MessageTemplate,
        vars: &[(&str, &str)],
    ) -> Option<String> {
        match self.links.build_link(phone, template, vars) {
            Ok(link) => Some(link),
            Err(e) => {
                tracing::warn!(
                    "⚠️ No {} link for deadline {}: {e}",
                    template.name(),
                    deadline.id
                );
                None
            }
        }
    }
}

#[async_trait]
impl NotificationDispatcher for ReminderNotifier {
    async fn dispatch(&self, deadline: &Deadline) -> Result<DispatchReport> {
        let vars = template_vars(deadline, &self.organization);
        let pairs: Vec<(&str, &str)> = vars.iter().map(|(k, v)| (*k, v.as_str())).collect();

        let client_link = self.build_link(
            deadline,
            deadline.client_phone.as_deref(),
            MessageTemplate::ClientReminder,
            &pairs,
        );
        let internal_link = self.build_link(
            deadline,
            self.internal_phone.as_deref(),
            MessageTemplate::InternalReminder,
            &pairs,
        );

        let subject = format!(
            "Reminder: {} for {} on {}",
            deadline.deadline_type.label(),
            deadline.client_name,
            deadline.due_date.format("%Y-%m-%d")
        );
        let html = render_email(
            deadline,
            &self.organization,
            client_link.as_deref(),
            internal_link.as_deref(),
        );

        let sent = self
            .mailer
            .send_email(&self.admin_email, &subject, &html)
            .await;

        self.log.record(ReminderRecord {
            deadline_id: deadline.id.clone(),
            client_name: deadline.client_name.clone(),
            due_date: deadline.due_date,
            recipient: self.admin_email.clone(),
            mailer: self.mailer.name().to_string(),
            status: match &sent {
                Ok(()) => DeliveryStatus::Sent,
                Err(e) => DeliveryStatus::Failed(e.to_string()),
            },
            links: usize::from(client_link.is_some()) + usize::from(internal_link.is_some()),
            fired_at: Utc::now(),
        });

        sent?;
        Ok(DispatchReport {
            recipient: self.admin_email.clone(),
            client_link,
            internal_link,
        })
    }
}

fn template_vars(deadline: &Deadline, organization: &str) -> Vec<(&'static str, String)> {
    let or_na = |v: &Option<String>| {
        v.as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or("N/A")
            .to_string()
    };
    vec![
        ("client_name", deadline.client_name.clone()),
        ("organization", organization.to_string()),
        ("deadline_type", deadline.deadline_type.label().to_string()),
        ("due_date", deadline.due_date.format("%Y-%m-%d").to_string()),
        (
            "reminder_time",
            deadline
                .reminder_time
                .map(|t| t.to_string())
                .unwrap_or_else(|| "N/A".into()),
        ),
        ("visa_type", or_na(&deadline.visa_type)),
        ("client_phone", or_na(&deadline.client_phone)),
        ("client_email", or_na(&deadline.client_email)),
    ]
}

fn render_email(
    deadline: &Deadline,
    organization: &str,
    client_link: Option<&str>,
    internal_link: Option<&str>,
) -> String {
    let row = |label: &str, value: &str| {
        format!(
            "<tr><td><strong>{}</strong></td><td>{}</td></tr>",
            escape_html(label),
            escape_html(value)
        )
    };
    let link = |label: &str, href: Option<&str>| match href {
        Some(href) => format!(
            "<p><a href=\"{}\">{}</a></p>",
            escape_html(href),
            escape_html(label)
        ),
        None => format!("<p><em>{} unavailable (no valid phone number)</em></p>", escape_html(label)),
    };

    let mut rows = vec![
        row("Type", deadline.deadline_type.label()),
        row("Client", &deadline.client_name),
        row("Due date", &deadline.due_date.format("%Y-%m-%d").to_string()),
    ];
    if let Some(time) = deadline.reminder_time {
        rows.push(row("Reminder time", &time.to_string()));
    }
    for (label, value) in [
        ("Visa type", &deadline.visa_type),
        ("Email", &deadline.client_email),
        ("Phone", &deadline.client_phone),
        ("Source", &deadline.source),
    ] {
        if let Some(v) = value.as_deref().filter(|v| !v.trim().is_empty()) {
            rows.push(row(label, v));
        }
    }

    format!(
        "<html><body>\
         <h2>{} reminder</h2>\
         <table>{}</table>\
         {}{}\
         <p style=\"color:#888\">Sent by {} · deadline {}</p>\
         </body></html>",
        escape_html(deadline.deadline_type.label()),
        rows.join(""),
        link("Send WhatsApp message to client", client_link),
        link("Send WhatsApp message to office", internal_link),
        escape_html(organization),
        escape_html(&deadline.id),
    )
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
