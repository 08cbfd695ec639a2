//! Deadline CRUD with reminder bookkeeping.
//!
//! Every write goes to the store first; the scheduler is told afterwards.
//! Both steps run under the deadline's write lock so concurrent requests for
//! one id cannot interleave between them. Scheduling outcomes are reported
//! back but never turn a successful write into an error.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Deserializer};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use visadesk_core::deadline::{Client, Deadline, DeadlineType, ReminderTime};
use visadesk_core::error::{Result, VisaDeskError};
use visadesk_scheduler::{ReconcileReport, ReminderScheduler, ScheduleOutcome};

use crate::db::DeadlineDb;

/// Body of a client create request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewClient {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default, alias = "branchId")]
    pub branch_id: Option<String>,
}

/// Body of a deadline create request. Accepts snake_case or camelCase keys.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewDeadline {
    #[serde(rename = "type", alias = "deadline_type")]
    pub deadline_type: String,
    #[serde(default, alias = "clientId")]
    pub client_id: Option<String>,
    #[serde(default, alias = "clientName")]
    pub client_name: Option<String>,
    #[serde(default, alias = "clientEmail")]
    pub client_email: Option<String>,
    #[serde(default, alias = "clientPhone")]
    pub client_phone: Option<String>,
    #[serde(default, alias = "visaType")]
    pub visa_type: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(alias = "dueDate")]
    pub due_date: String,
    #[serde(default, alias = "reminderTime")]
    pub reminder_time: Option<String>,
    #[serde(default, alias = "branchId")]
    pub branch_id: Option<String>,
}

/// Partial update. Absent keys are left alone; `null` clears a nullable field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeadlinePatch {
    #[serde(default, rename = "type", alias = "deadline_type")]
    pub deadline_type: Option<String>,
    #[serde(default, alias = "clientId", deserialize_with = "nullable")]
    pub client_id: Option<Option<String>>,
    #[serde(default, alias = "clientName")]
    pub client_name: Option<String>,
    #[serde(default, alias = "clientEmail", deserialize_with = "nullable")]
    pub client_email: Option<Option<String>>,
    #[serde(default, alias = "clientPhone", deserialize_with = "nullable")]
    pub client_phone: Option<Option<String>>,
    #[serde(default, alias = "visaType", deserialize_with = "nullable")]
    pub visa_type: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub source: Option<Option<String>>,
    #[serde(default, alias = "dueDate")]
    pub due_date: Option<String>,
    #[serde(default, alias = "reminderTime", deserialize_with = "nullable")]
    pub reminder_time: Option<Option<String>>,
    #[serde(default, alias = "branchId", deserialize_with = "nullable")]
    pub branch_id: Option<Option<String>>,
}

fn nullable<'de, D, T>(de: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

const WRITE_LOCK_STRIPES: usize = 64;

/// Store + scheduler, wired the way every deadline route needs them.
#[derive(Clone)]
pub struct DeadlineService {
    db: Arc<DeadlineDb>,
    scheduler: ReminderScheduler,
    /// Striped by deadline id. Ids that share a stripe just queue behind
    /// each other.
    write_locks: Arc<[Mutex<()>]>,
}

impl DeadlineService {
    pub fn new(db: Arc<DeadlineDb>, scheduler: ReminderScheduler) -> Self {
        let write_locks = (0..WRITE_LOCK_STRIPES).map(|_| Mutex::new(())).collect();
        Self {
            db,
            scheduler,
            write_locks,
        }
    }

    /// Held across the store write and the scheduler call for one id.
    fn lock_id(&self, id: &str) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        let stripe = (hasher.finish() % self.write_locks.len() as u64) as usize;
        self.write_locks[stripe]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn db(&self) -> &DeadlineDb {
        &self.db
    }

    pub fn scheduler(&self) -> &ReminderScheduler {
        &self.scheduler
    }

    // ── Clients ─────────────────────────────────

    pub fn create_client(&self, input: NewClient) -> Result<Client> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(VisaDeskError::Validation("client name is required".into()));
        }
        let mut client = Client::new(name, non_blank(input.email), non_blank(input.phone));
        client.branch_id = non_blank(input.branch_id);
        self.db.insert_client(&client)?;
        tracing::info!("👤 Client created: {} ({})", client.name, client.id);
        Ok(client)
    }

    // ── Deadlines ───────────────────────────────

    pub fn get(&self, id: &str) -> Result<Deadline> {
        self.db.get_deadline(id)
    }

    pub fn list(&self, include_history: bool) -> Result<Vec<Deadline>> {
        self.db.list_deadlines(include_history)
    }

    /// Enrich from the client record, persist, then schedule.
    pub fn create(&self, input: NewDeadline) -> Result<(Deadline, ScheduleOutcome)> {
        let deadline_type: DeadlineType = input.deadline_type.parse()?;
        let due_date = parse_due_date(&input.due_date)?;
        let reminder_time = parse_reminder_time(input.reminder_time.as_deref());

        let mut deadline = Deadline::new(
            deadline_type,
            input.client_name.as_deref().unwrap_or("").trim(),
            due_date,
            reminder_time,
        );
        deadline.client_id = non_blank(input.client_id);
        deadline.client_email = non_blank(input.client_email);
        deadline.client_phone = non_blank(input.client_phone);
        deadline.visa_type = non_blank(input.visa_type);
        deadline.source = non_blank(input.source);
        deadline.branch_id = non_blank(input.branch_id);

        self.enrich(&mut deadline)?;
        let _guard = self.lock_id(&deadline.id);
        self.db.insert_deadline(&deadline)?;
        tracing::info!(
            "🗓️ Deadline created: {} {} for {} on {}",
            deadline.id,
            deadline.deadline_type,
            deadline.client_name,
            deadline.due_date
        );

        let outcome = self.scheduler.schedule(&deadline);
        Ok((deadline, outcome))
    }

    /// Merge the patch, enrich, persist, then reschedule unconditionally.
    pub fn update(&self, id: &str, patch: DeadlinePatch) -> Result<(Deadline, ScheduleOutcome)> {
        let _guard = self.lock_id(id);
        let mut deadline = self.db.get_deadline(id)?;

        if let Some(raw) = patch.deadline_type {
            deadline.deadline_type = raw.parse()?;
        }
        if let Some(raw) = patch.due_date {
            deadline.due_date = parse_due_date(&raw)?;
        }
        if let Some(raw) = patch.reminder_time {
            deadline.reminder_time = parse_reminder_time(raw.as_deref());
        }
        if let Some(name) = patch.client_name {
            deadline.client_name = name.trim().to_string();
        }
        for (field, value) in [
            (&mut deadline.client_id, patch.client_id),
            (&mut deadline.client_email, patch.client_email),
            (&mut deadline.client_phone, patch.client_phone),
            (&mut deadline.visa_type, patch.visa_type),
            (&mut deadline.source, patch.source),
            (&mut deadline.branch_id, patch.branch_id),
        ] {
            if let Some(value) = value {
                *field = non_blank(value);
            }
        }
        deadline.updated_at = Utc::now();

        self.enrich(&mut deadline)?;
        self.db.update_deadline(&deadline)?;
        tracing::info!("✏️ Deadline updated: {}", deadline.id);

        let outcome = self.scheduler.reschedule(&deadline);
        Ok((deadline, outcome))
    }

    /// Move to history and drop the reminder.
    pub fn archive(&self, id: &str) -> Result<Deadline> {
        let _guard = self.lock_id(id);
        let deadline = self.db.set_history(id, true)?;
        tracing::info!("📦 Deadline archived: {id}");
        self.scheduler.cancel(id);
        Ok(deadline)
    }

    /// Bring back from history and schedule again.
    pub fn restore(&self, id: &str) -> Result<(Deadline, ScheduleOutcome)> {
        let _guard = self.lock_id(id);
        let deadline = self.db.set_history(id, false)?;
        tracing::info!("♻️ Deadline restored: {id}");
        let outcome = self.scheduler.schedule(&deadline);
        Ok((deadline, outcome))
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        let _guard = self.lock_id(id);
        self.db.delete_deadline(id)?;
        tracing::info!("🗑️ Deadline deleted: {id}");
        self.scheduler.cancel(id);
        Ok(())
    }

    /// Rebuild in-memory reminders from the store.
    pub fn rehydrate(&self) -> Result<ReconcileReport> {
        let active = self.db.active_deadlines()?;
        Ok(self.scheduler.reconcile(&active))
    }

    fn enrich(&self, deadline: &mut Deadline) -> Result<()> {
        if let Some(client_id) = deadline.client_id.clone() {
            let client = self.db.get_client(&client_id).map_err(|e| match e {
                VisaDeskError::NotFound(_) => {
                    VisaDeskError::Validation(format!("unknown client '{client_id}'"))
                }
                other => other,
            })?;
            deadline.enrich_from(&client);
        }
        if deadline.client_name.trim().is_empty() {
            return Err(VisaDeskError::Validation(
                "client_name or a known client_id is required".into(),
            ));
        }
        Ok(())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// `YYYY-MM-DD`, or the date part of an ISO timestamp.
fn parse_due_date(raw: &str) -> Result<NaiveDate> {
    let raw = raw.trim();
    let date_part = raw.split_once('T').map_or(raw, |(date, _)| date);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map_err(|e| VisaDeskError::Validation(format!("invalid due_date '{raw}': {e}")))
}

/// Unparseable times mean "no reminder", not a failed write.
fn parse_reminder_time(raw: Option<&str>) -> Option<ReminderTime> {
    let parsed = ReminderTime::parse_optional(raw);
    if parsed.is_none()
        && let Some(raw) = raw.filter(|r| !r.trim().is_empty())
    {
        tracing::warn!("⚠️ Ignoring unparseable reminder time '{raw}'");
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use visadesk_scheduler::{DispatchReport, NotificationDispatcher};

    struct NoopDispatcher;

    #[async_trait]
    impl NotificationDispatcher for NoopDispatcher {
        async fn dispatch(&self, _deadline: &Deadline) -> Result<DispatchReport> {
            Ok(DispatchReport::default())
        }
    }

    fn service() -> DeadlineService {
        let db = Arc::new(DeadlineDb::in_memory().unwrap());
        let tz = visadesk_scheduler::parse_timezone("Asia/Kathmandu").unwrap();
        let scheduler = ReminderScheduler::new(tz, Arc::new(NoopDispatcher));
        DeadlineService::new(db, scheduler)
    }

    fn new_deadline(time: Option<&str>) -> NewDeadline {
        NewDeadline {
            deadline_type: "appointment".into(),
            client_name: Some("Asha".into()),
            due_date: "2099-01-01".into(),
            reminder_time: time.map(String::from),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_schedules_reminder() {
        let svc = service();
        let (d, outcome) = svc.create(new_deadline(Some("09:30"))).unwrap();
        assert!(outcome.is_scheduled());
        assert!(svc.scheduler().is_scheduled(&d.id));
        assert_eq!(svc.get(&d.id).unwrap().reminder_time, ReminderTime::new(9, 30));
    }

    #[tokio::test]
    async fn test_create_with_bad_time_still_succeeds() {
        let svc = service();
        let (d, outcome) = svc.create(new_deadline(Some("half past nine"))).unwrap();
        assert_eq!(outcome, ScheduleOutcome::NoReminder);
        assert!(d.reminder_time.is_none());
        assert!(!svc.scheduler().is_scheduled(&d.id));
    }

    #[tokio::test]
    async fn test_create_in_past_is_stored_without_job() {
        let svc = service();
        let mut input = new_deadline(Some("09:30"));
        input.due_date = "2001-01-01".into();
        let (d, outcome) = svc.create(input).unwrap();
        assert!(matches!(outcome, ScheduleOutcome::InPast { .. }));
        assert!(svc.get(&d.id).is_ok());
        assert_eq!(svc.scheduler().job_count(), 0);
    }

    #[tokio::test]
    async fn test_create_enriches_from_client() {
        let svc = service();
        let client = svc
            .create_client(NewClient {
                name: "Asha Gurung".into(),
                email: Some("asha@example.com".into()),
                phone: Some("9800000000".into()),
                branch_id: None,
            })
            .unwrap();

        let mut input = new_deadline(None);
        input.client_name = None;
        input.client_id = Some(client.id.clone());
        input.client_email = Some("override@example.com".into());
        let (d, _) = svc.create(input).unwrap();

        assert_eq!(d.client_name, "Asha Gurung");
        assert_eq!(d.client_email.as_deref(), Some("override@example.com"));
        assert_eq!(d.client_phone.as_deref(), Some("9800000000"));
    }

    #[tokio::test]
    async fn test_create_validation() {
        let svc = service();
        let mut input = new_deadline(None);
        input.client_name = Some("  ".into());
        assert!(matches!(svc.create(input), Err(VisaDeskError::Validation(_))));

        let mut input = new_deadline(None);
        input.client_id = Some("ghost".into());
        assert!(matches!(svc.create(input), Err(VisaDeskError::Validation(_))));

        let mut input = new_deadline(None);
        input.deadline_type = "visa-party".into();
        assert!(svc.create(input).is_err());

        let mut input = new_deadline(None);
        input.due_date = "01/02/2099".into();
        assert!(matches!(svc.create(input), Err(VisaDeskError::Validation(_))));
    }

    #[tokio::test]
    async fn test_update_reschedules() {
        let svc = service();
        let (d, _) = svc.create(new_deadline(Some("09:30"))).unwrap();
        let before = svc.scheduler().next_fire(&d.id).unwrap();

        let patch: DeadlinePatch =
            serde_json::from_value(serde_json::json!({"reminderTime": "14:00"})).unwrap();
        let (updated, outcome) = svc.update(&d.id, patch).unwrap();
        assert!(outcome.is_scheduled());
        assert_eq!(updated.reminder_time, ReminderTime::new(14, 0));
        assert_eq!(svc.scheduler().job_count(), 1);
        assert!(svc.scheduler().next_fire(&d.id).unwrap() > before);
    }

    #[tokio::test]
    async fn test_update_null_time_cancels() {
        let svc = service();
        let (d, _) = svc.create(new_deadline(Some("09:30"))).unwrap();
        let patch: DeadlinePatch =
            serde_json::from_value(serde_json::json!({"reminder_time": null})).unwrap();
        let (updated, outcome) = svc.update(&d.id, patch).unwrap();
        assert_eq!(outcome, ScheduleOutcome::NoReminder);
        assert!(updated.reminder_time.is_none());
        assert!(!svc.scheduler().is_scheduled(&d.id));
    }

    #[tokio::test]
    async fn test_update_leaves_absent_fields() {
        let svc = service();
        let mut input = new_deadline(Some("09:30"));
        input.visa_type = Some("Student".into());
        let (d, _) = svc.create(input).unwrap();

        let patch: DeadlinePatch =
            serde_json::from_value(serde_json::json!({"dueDate": "2099-02-01"})).unwrap();
        let (updated, _) = svc.update(&d.id, patch).unwrap();
        assert_eq!(updated.visa_type.as_deref(), Some("Student"));
        assert_eq!(updated.reminder_time, ReminderTime::new(9, 30));
        assert_eq!(updated.due_date, NaiveDate::from_ymd_opt(2099, 2, 1).unwrap());
    }

    #[tokio::test]
    async fn test_archive_restore_delete() {
        let svc = service();
        let (d, _) = svc.create(new_deadline(Some("09:30"))).unwrap();

        assert!(svc.archive(&d.id).unwrap().history);
        assert!(!svc.scheduler().is_scheduled(&d.id));

        let (restored, outcome) = svc.restore(&d.id).unwrap();
        assert!(!restored.history);
        assert!(outcome.is_scheduled());

        svc.delete(&d.id).unwrap();
        assert!(!svc.scheduler().is_scheduled(&d.id));
        assert!(matches!(svc.delete(&d.id), Err(VisaDeskError::NotFound(_))));
    }

    /// Update racing delete must never leave a job behind for a row that
    /// is gone.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_update_racing_delete_leaves_no_orphan_job() {
        let svc = service();
        let mut orphans = 0;
        for _ in 0..300 {
            let (d, _) = svc.create(new_deadline(Some("09:30"))).unwrap();
            let patch: DeadlinePatch =
                serde_json::from_value(serde_json::json!({"reminderTime": "10:00"})).unwrap();

            let (a, b) = (svc.clone(), svc.clone());
            let (id_a, id_b) = (d.id.clone(), d.id.clone());
            let update = tokio::task::spawn_blocking(move || a.update(&id_a, patch).map(|_| ()));
            let delete = tokio::task::spawn_blocking(move || b.delete(&id_b));
            let _ = update.await.unwrap();
            delete.await.unwrap().unwrap();

            assert!(matches!(svc.get(&d.id), Err(VisaDeskError::NotFound(_))));
            if svc.scheduler().is_scheduled(&d.id) {
                orphans += 1;
            }
        }
        assert_eq!(orphans, 0);
        assert_eq!(svc.scheduler().job_count(), 0);
    }

    /// Update racing archive must not revert the archive or leave a job.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_update_racing_archive_keeps_history() {
        let svc = service();
        let mut lost = 0;
        for _ in 0..300 {
            let (d, _) = svc.create(new_deadline(Some("09:30"))).unwrap();
            let patch: DeadlinePatch =
                serde_json::from_value(serde_json::json!({"reminderTime": "10:00"})).unwrap();

            let (a, b) = (svc.clone(), svc.clone());
            let (id_a, id_b) = (d.id.clone(), d.id.clone());
            let update = tokio::task::spawn_blocking(move || a.update(&id_a, patch).map(|_| ()));
            let archive = tokio::task::spawn_blocking(move || b.archive(&id_b).map(|_| ()));
            update.await.unwrap().unwrap();
            archive.await.unwrap().unwrap();

            let stored = svc.get(&d.id).unwrap();
            if !stored.history || svc.scheduler().is_scheduled(&d.id) {
                lost += 1;
            }
        }
        assert_eq!(lost, 0);
        assert_eq!(svc.scheduler().job_count(), 0);
    }

    #[tokio::test]
    async fn test_rehydrate_from_store() {
        let svc = service();
        svc.create(new_deadline(Some("09:30"))).unwrap();
        svc.create(new_deadline(None)).unwrap();
        let (archived, _) = svc.create(new_deadline(Some("10:30"))).unwrap();
        svc.archive(&archived.id).unwrap();
        svc.scheduler().shutdown();

        let report = svc.rehydrate().unwrap();
        assert_eq!(report.scheduled, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(svc.scheduler().job_count(), 1);
    }

    #[test]
    fn test_parse_due_date_accepts_timestamp() {
        assert_eq!(
            parse_due_date("2099-01-01T00:00:00.000Z").unwrap(),
            NaiveDate::from_ymd_opt(2099, 1, 1).unwrap()
        );
    }
}
