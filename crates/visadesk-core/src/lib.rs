//! # VisaDesk Core
//!
//! Shared building blocks for the VisaDesk reminder service:
//! configuration, the error type, and the deadline/client domain model.

pub mod config;
pub mod deadline;
pub mod error;

pub use config::VisaDeskConfig;
pub use deadline::{Client, Deadline, DeadlineType, ReminderTime};
pub use error::{Result, VisaDeskError};
