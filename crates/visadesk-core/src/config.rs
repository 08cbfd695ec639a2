//! VisaDesk configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, VisaDeskError};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VisaDeskConfig {
    #[serde(default)]
    pub organization: OrganizationConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
    #[serde(default)]
    pub email_api: Option<EmailApiConfig>,
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,
}

impl VisaDeskConfig {
    /// Load config from the default path (~/.visadesk/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| VisaDeskError::Config(format!("Failed to read config: {e}")))?;
        let mut config: Self = toml::from_str(&content)
            .map_err(|e| VisaDeskError::Config(format!("Failed to parse config: {e}")))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Secrets may be kept out of the TOML file.
    pub fn apply_env_overrides(&mut self) {
        if let Some(smtp) = self.smtp.as_mut()
            && let Ok(password) = std::env::var("VISADESK_SMTP_PASSWORD")
            && !password.is_empty()
        {
            smtp.password = password;
        }
        if let Some(api) = self.email_api.as_mut()
            && let Ok(key) = std::env::var("VISADESK_EMAIL_API_KEY")
            && !key.is_empty()
        {
            api.api_key = key;
        }
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the VisaDesk home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".visadesk")
    }

    /// Organization time zone, validated.
    pub fn timezone(&self) -> Result<chrono_tz::Tz> {
        self.organization
            .timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| VisaDeskError::Timezone(self.organization.timezone.clone()))
    }
}

/// The consultancy itself: where reminders are timed and who receives them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationConfig {
    #[serde(default = "default_org_name")]
    pub name: String,
    /// IANA zone every reminder time is interpreted in.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Administrator mailbox that receives reminder e-mails.
    #[serde(default = "default_admin_email")]
    pub admin_email: String,
    /// Internal WhatsApp number the second reminder link is addressed to.
    #[serde(default)]
    pub internal_phone: String,
}

fn default_org_name() -> String { "VisaDesk".into() }
fn default_timezone() -> String { "Asia/Kathmandu".into() }
fn default_admin_email() -> String { "admin@visadesk.local".into() }

impl Default for OrganizationConfig {
    fn default() -> Self {
        Self {
            name: default_org_name(),
            timezone: default_timezone(),
            admin_email: default_admin_email(),
            internal_phone: String::new(),
        }
    }
}

/// Gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 { 3000 }
fn default_host() -> String { "127.0.0.1".into() }

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

/// Deadline store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String { "~/.visadesk/visadesk.db".into() }

impl DatabaseConfig {
    /// Path with `~` expanded.
    pub fn resolved_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.path).to_string())
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

/// Outgoing mail server. Without it reminders are only logged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub from_email: String,
    #[serde(default)]
    pub from_name: Option<String>,
}

fn bool_true() -> bool { true }
fn default_smtp_port() -> u16 { 587 }

/// HTTP e-mail relay, used when SMTP is not configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailApiConfig {
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_from_alias")]
    pub from_alias: String,
}

fn default_from_alias() -> String { "default".into() }

/// Click-to-chat link settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    /// Prefix for local numbers written with a leading `0`.
    #[serde(default = "default_country_code")]
    pub default_country_code: String,
    #[serde(default = "default_wa_base")]
    pub base_url: String,
}

fn default_country_code() -> String { "977".into() }
fn default_wa_base() -> String { "https://wa.me".into() }

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            default_country_code: default_country_code(),
            base_url: default_wa_base(),
        }
    }
}
