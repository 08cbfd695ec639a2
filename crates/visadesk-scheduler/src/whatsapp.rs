//! WhatsApp click-to-chat links.
//!
//! Reminders are not pushed through the WhatsApp API. Instead the
//! administrator gets pre-filled `wa.me` links in the reminder e-mail and
//! sends them by hand.

use visadesk_core::config::WhatsAppConfig;
use visadesk_core::error::{Result, VisaDeskError};

/// Message templates available for outbound links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageTemplate {
    /// Addressed to the client.
    ClientReminder,
    /// Addressed to the consultancy's own number.
    InternalReminder,
}

impl MessageTemplate {
    pub fn body(&self) -> &'static str {
        match self {
            MessageTemplate::ClientReminder => {
                "Dear {{client_name}}, this is a reminder from {{organization}}: your {{deadline_type}} is due on {{due_date}} at {{reminder_time}}. Please contact us if you have any questions."
            }
            MessageTemplate::InternalReminder => {
                "Reminder: {{deadline_type}} for {{client_name}} ({{visa_type}}) is due on {{due_date}} at {{reminder_time}}. Client phone: {{client_phone}}."
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MessageTemplate::ClientReminder => "client_reminder",
            MessageTemplate::InternalReminder => "internal_reminder",
        }
    }
}

/// Replace `{{key}}` placeholders. Unknown placeholders are left as-is.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{{{key}}}}}"), value);
    }
    out
}

/// Builds `wa.me` links from loosely formatted phone numbers.
#[derive(Debug, Clone)]
pub struct LinkBuilder {
    base_url: String,
    default_country_code: String,
}

impl LinkBuilder {
    pub fn new(base_url: &str, default_country_code: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            default_country_code: default_country_code
                .trim()
                .trim_start_matches('+')
                .to_string(),
        }
    }

    pub fn from_config(config: &WhatsAppConfig) -> Self {
        Self::new(&config.base_url, &config.default_country_code)
    }

    /// Build a click-to-chat link for `phone` with the rendered template.
    pub fn build_link(
        &self,
        phone: Option<&str>,
        template: MessageTemplate,
        vars: &[(&str, &str)],
    ) -> Result<String> {
        let phone = phone
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                VisaDeskError::Notify(format!("no phone number for {} link", template.name()))
            })?;
        let digits = normalize_phone(phone, &self.default_country_code)?;
        let text = render(template.body(), vars);
        Ok(format!(
            "{}/{}?text={}",
            self.base_url,
            digits,
            urlencoding::encode(&text)
        ))
    }
}

impl Default for LinkBuilder {
    fn default() -> Self {
        Self::from_config(&WhatsAppConfig::default())
    }
}

/// Reduce a phone number to the international digits `wa.me` expects.
///
/// `+` or `00` prefixes mark an international number. A leading `0`, or a
/// number of ten digits or fewer, is treated as local and gets the default
/// country code.
pub fn normalize_phone(raw: &str, default_country_code: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed
        .chars()
        .any(|c| !(c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '(' | ')' | '.')))
    {
        return Err(VisaDeskError::Notify(format!("invalid phone number '{raw}'")));
    }
    let international = trimmed.starts_with('+') || trimmed.starts_with("00");
    let mut digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();

    if international {
        if let Some(rest) = digits.strip_prefix("00")
            && !trimmed.starts_with('+')
        {
            digits = rest.to_string();
        }
    } else if let Some(local) = digits.strip_prefix('0') {
        digits = format!("{default_country_code}{local}");
    } else if digits.len() <= 10 {
        digits = format!("{default_country_code}{digits}");
    }

    if !(8..=15).contains(&digits.len()) {
        return Err(VisaDeskError::Notify(format!("invalid phone number '{raw}'")));
    }
    Ok(digits)
}
