//! Fired-reminder history: in-memory ring buffer, last 100 entries.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

const HISTORY_LIMIT: usize = 100;

/// How a fired reminder's e-mail went.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Failed(String),
}

/// One fired reminder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderRecord {
    pub deadline_id: String,
    pub client_name: String,
    pub due_date: NaiveDate,
    pub recipient: String,
    pub mailer: String,
    pub status: DeliveryStatus,
    /// Number of WhatsApp links that could be built (0–2).
    pub links: usize,
    pub fired_at: DateTime<Utc>,
}

/// Shared, cloneable history of fired reminders.
#[derive(Debug, Clone, Default)]
pub struct ReminderLog {
    entries: Arc<Mutex<VecDeque<ReminderRecord>>>,
}

impl ReminderLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, record: ReminderRecord) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.push_back(record);
        while entries.len() > HISTORY_LIMIT {
            entries.pop_front();
        }
    }

    /// Most recent first.
    pub fn recent(&self, limit: usize) -> Vec<ReminderRecord> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
