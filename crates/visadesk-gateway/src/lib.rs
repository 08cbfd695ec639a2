//! # VisaDesk Gateway
//!
//! SQLite deadline store, the deadline service that keeps reminders in step
//! with every write, and the Axum HTTP API in front of them.

pub mod db;
pub mod routes;
pub mod server;
pub mod service;

pub use db::DeadlineDb;
pub use server::{AppState, build_router, start};
pub use service::{DeadlinePatch, DeadlineService, NewClient, NewDeadline};
