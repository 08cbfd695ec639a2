//! # VisaDesk Scheduler
//!
//! Deadline reminders for the VisaDesk CRM.
//!
//! ## Design Principles
//! - One single-shot Tokio timer per deadline, keyed by deadline id
//! - At most one live reminder per deadline; reschedule replaces, never adds
//! - Fire times are absolute instants computed in the organization's zone
//! - A failed reminder never fails the deadline write that scheduled it
//!
//! ## Architecture
//! ```text
//! DeadlineService (create / update / archive / restore / delete)
//!   └── ReminderScheduler
//!         ├── fire_instant(due_date, reminder_time, tz)
//!         ├── registry: deadline id → (timer task, snapshot)
//!         └── on fire → NotificationDispatcher
//!                         └── ReminderNotifier
//!                               ├── EmailSender (SMTP / HTTP relay / log)
//!                               ├── WhatsApp click-to-chat links
//!                               └── ReminderLog (last 100)
//! ```

pub mod clock;
pub mod dispatch;
pub mod email;
pub mod fire;
pub mod notify;
pub mod reminder;
pub mod whatsapp;

pub use clock::{Clock, ManualClock, SystemClock};
pub use dispatch::{DispatchReport, NotificationDispatcher, ReminderNotifier};
pub use email::{EmailSender, HttpMailer, LogMailer, SmtpMailer, sender_from_config};
pub use fire::{fire_instant, parse_timezone};
pub use notify::{DeliveryStatus, ReminderLog, ReminderRecord};
pub use reminder::{ReconcileReport, ReminderScheduler, ScheduleOutcome, ScheduledReminder};
pub use whatsapp::{LinkBuilder, MessageTemplate};
