//! Deadline and client records, the data the reminder scheduler works on.

use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::VisaDeskError;

/// What kind of deadline this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeadlineType {
    Appointment,
    HotelCancellation,
    FlightCancellation,
}

impl DeadlineType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeadlineType::Appointment => "appointment",
            DeadlineType::HotelCancellation => "hotel-cancellation",
            DeadlineType::FlightCancellation => "flight-cancellation",
        }
    }

    /// Human label used in reminder messages.
    pub fn label(&self) -> &'static str {
        match self {
            DeadlineType::Appointment => "Appointment",
            DeadlineType::HotelCancellation => "Hotel cancellation",
            DeadlineType::FlightCancellation => "Flight cancellation",
        }
    }
}

impl fmt::Display for DeadlineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeadlineType {
    type Err = VisaDeskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "appointment" => Ok(DeadlineType::Appointment),
            "hotel-cancellation" | "hotel" => Ok(DeadlineType::HotelCancellation),
            "flight-cancellation" | "flight" => Ok(DeadlineType::FlightCancellation),
            other => Err(VisaDeskError::Validation(format!("unknown deadline type '{other}'"))),
        }
    }
}

/// Wall-clock time of day (minute precision) a reminder should go out at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReminderTime(NaiveTime);

impl ReminderTime {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(Self)
    }

    pub fn hour(&self) -> u32 {
        self.0.hour()
    }

    pub fn minute(&self) -> u32 {
        self.0.minute()
    }

    pub fn as_naive(&self) -> NaiveTime {
        self.0
    }

    /// Parse an optional form value. Blank or unparsable input means
    /// "no reminder" and is reported back as `None`.
    pub fn parse_optional(raw: Option<&str>) -> Option<Self> {
        let raw = raw?.trim();
        if raw.is_empty() {
            return None;
        }
        raw.parse().ok()
    }
}

impl FromStr for ReminderTime {
    type Err = VisaDeskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut parts = s.split(':');
        let (Some(h), Some(m)) = (parts.next(), parts.next()) else {
            return Err(VisaDeskError::ReminderTime(format!("expected HH:MM, got '{s}'")));
        };
        // Optional seconds are accepted and dropped.
        if let Some(sec) = parts.next()
            && (!is_digits(sec, 2..=2) || sec.parse::<u32>().map_or(true, |v| v > 59))
        {
            return Err(VisaDeskError::ReminderTime(format!("bad seconds in '{s}'")));
        }
        if parts.next().is_some() {
            return Err(VisaDeskError::ReminderTime(format!("expected HH:MM, got '{s}'")));
        }
        if !is_digits(h, 1..=2) {
            return Err(VisaDeskError::ReminderTime(format!("bad hour in '{s}'")));
        }
        if !is_digits(m, 2..=2) {
            return Err(VisaDeskError::ReminderTime(format!("bad minute in '{s}'")));
        }
        let hour: u32 = h
            .parse()
            .map_err(|_| VisaDeskError::ReminderTime(format!("bad hour in '{s}'")))?;
        let minute: u32 = m
            .parse()
            .map_err(|_| VisaDeskError::ReminderTime(format!("bad minute in '{s}'")))?;
        Self::new(hour, minute)
            .ok_or_else(|| VisaDeskError::ReminderTime(format!("out of range: '{s}'")))
    }
}

fn is_digits(part: &str, len: std::ops::RangeInclusive<usize>) -> bool {
    len.contains(&part.len()) && part.bytes().all(|b| b.is_ascii_digit())
}

impl TryFrom<String> for ReminderTime {
    type Error = VisaDeskError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ReminderTime> for String {
    fn from(value: ReminderTime) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ReminderTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

/// A dated obligation for a client (visa appointment, booking cancellation window).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deadline {
    pub id: String,
    #[serde(rename = "type")]
    pub deadline_type: DeadlineType,
    /// Client record the contact snapshot was taken from, if any.
    #[serde(default)]
    pub client_id: Option<String>,
    pub client_name: String,
    #[serde(default)]
    pub client_email: Option<String>,
    #[serde(default)]
    pub client_phone: Option<String>,
    #[serde(default)]
    pub visa_type: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub reminder_time: Option<ReminderTime>,
    #[serde(default)]
    pub branch_id: Option<String>,
    /// Archived.
    #[serde(default)]
    pub history: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deadline {
    /// Create a fresh deadline with a new id.
    pub fn new(
        deadline_type: DeadlineType,
        client_name: &str,
        due_date: NaiveDate,
        reminder_time: Option<ReminderTime>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            deadline_type,
            client_id: None,
            client_name: client_name.to_string(),
            client_email: None,
            client_phone: None,
            visa_type: None,
            source: None,
            due_date,
            reminder_time,
            branch_id: None,
            history: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_archived(&self) -> bool {
        self.history
    }

    /// Fill missing contact fields from the client record.
    pub fn enrich_from(&mut self, client: &Client) {
        if self.client_email.as_deref().is_none_or(str::is_empty) {
            self.client_email = client.email.clone();
        }
        if self.client_phone.as_deref().is_none_or(str::is_empty) {
            self.client_phone = client.phone.clone();
        }
        if self.client_name.trim().is_empty() {
            self.client_name = client.name.clone();
        }
    }
}

/// A consultancy client. Deadlines copy contact details from here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub branch_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Client {
    pub fn new(name: &str, email: Option<String>, phone: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            email,
            phone,
            branch_id: None,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reminder_time_parse() {
        let t: ReminderTime = "09:30".parse().unwrap();
        assert_eq!((t.hour(), t.minute()), (9, 30));
        assert_eq!(t.to_string(), "09:30");

        let t: ReminderTime = "7:05".parse().unwrap();
        assert_eq!(t.to_string(), "07:05");

        let t: ReminderTime = "14:00:45".parse().unwrap();
        assert_eq!(t.to_string(), "14:00");
    }

    #[test]
    fn test_reminder_time_rejects_garbage() {
        for bad in ["", "9", "24:00", "12:60", "ab:cd", "12:5", "1:02:03:04", "10:00:99"] {
            assert!(bad.parse::<ReminderTime>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_reminder_time_rejects_signs_and_padding() {
        for bad in ["+9:30", "009:30", "09:+30", "9:30:+5", " 9 :30", "٩:30", "09:30:5"] {
            assert!(bad.parse::<ReminderTime>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_parse_optional_treats_invalid_as_absent() {
        assert_eq!(ReminderTime::parse_optional(None), None);
        assert_eq!(ReminderTime::parse_optional(Some("  ")), None);
        assert_eq!(ReminderTime::parse_optional(Some("25:00")), None);
        assert_eq!(
            ReminderTime::parse_optional(Some("10:00")),
            ReminderTime::new(10, 0)
        );
    }

    #[test]
    fn test_deadline_json_shape() {
        let date = NaiveDate::from_ymd_opt(2099, 1, 1).unwrap();
        let d = Deadline::new(DeadlineType::HotelCancellation, "Asha", date, ReminderTime::new(9, 30));
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["type"], "hotel-cancellation");
        assert_eq!(json["reminder_time"], "09:30");
        assert_eq!(json["due_date"], "2099-01-01");

        let back: Deadline = serde_json::from_value(json).unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn test_deadline_type_from_str() {
        assert_eq!("Flight_Cancellation".parse::<DeadlineType>().unwrap(), DeadlineType::FlightCancellation);
        assert!("visa".parse::<DeadlineType>().is_err());
    }

    #[test]
    fn test_enrich_from_client_keeps_existing_values() {
        let date = NaiveDate::from_ymd_opt(2099, 1, 1).unwrap();
        let mut d = Deadline::new(DeadlineType::Appointment, "Asha", date, None);
        d.client_email = Some("asha@example.com".into());
        let client = Client::new(
            "Asha Gurung",
            Some("other@example.com".into()),
            Some("9800000000".into()),
        );
        d.enrich_from(&client);
        assert_eq!(d.client_email.as_deref(), Some("asha@example.com"));
        assert_eq!(d.client_phone.as_deref(), Some("9800000000"));
        assert_eq!(d.client_name, "Asha");
    }
}
