//! Reminder scheduler with one single-shot timer per deadline.
//!
//! The registry maps deadline id → live job. Every job is a Tokio task that
//! sleeps until the deadline's fire instant, removes its own registry entry
//! and hands the deadline snapshot to the [`NotificationDispatcher`].
//! Nothing here ever returns an error to the caller: a broken reminder must
//! not fail the deadline write that triggered it.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use futures::FutureExt;
use serde::Serialize;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::task::AbortHandle;
use visadesk_core::deadline::{Deadline, DeadlineType};

use crate::clock::{Clock, SystemClock};
use crate::dispatch::NotificationDispatcher;
use crate::fire::fire_instant;

/// Timers wake at least this often to re-read the wall clock.
const MAX_SLEEP: Duration = Duration::from_secs(3600);

/// Result of a `schedule`/`reschedule` call. Informational only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Scheduled { fire_at: DateTime<Utc> },
    /// No reminder time set.
    NoReminder,
    /// Archived deadlines never get a reminder.
    Archived,
    /// Fire time is at or before now.
    InPast { fire_at: DateTime<Utc> },
    Failed(String),
}

impl ScheduleOutcome {
    pub fn is_scheduled(&self) -> bool {
        matches!(self, ScheduleOutcome::Scheduled { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleOutcome::Scheduled { .. } => "scheduled",
            ScheduleOutcome::NoReminder => "no_reminder",
            ScheduleOutcome::Archived => "archived",
            ScheduleOutcome::InPast { .. } => "in_past",
            ScheduleOutcome::Failed(_) => "failed",
        }
    }
}

/// A live job, as shown to callers.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduledReminder {
    pub deadline_id: String,
    pub client_name: String,
    pub deadline_type: DeadlineType,
    pub fire_at: DateTime<Utc>,
}

/// Counts from a startup reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub scheduled: usize,
    pub skipped: usize,
    pub failed: usize,
}

struct ReminderJob {
    generation: u64,
    fire_at: DateTime<Utc>,
    snapshot: Deadline,
    handle: AbortHandle,
}

struct Inner {
    tz: Tz,
    clock: Arc<dyn Clock>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    jobs: Mutex<HashMap<String, ReminderJob>>,
    next_generation: AtomicU64,
}

impl Inner {
    fn lock_jobs(&self) -> MutexGuard<'_, HashMap<String, ReminderJob>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove the job and run the dispatcher. With `generation` set, only a
    /// job from that exact registration is taken, so a timer that lost a race
    /// with `reschedule` cannot remove its replacement.
    async fn fire(&self, id: &str, generation: Option<u64>) -> bool {
        let job = {
            let mut jobs = self.lock_jobs();
            let current = jobs
                .get(id)
                .is_some_and(|job| generation.is_none_or(|g| g == job.generation));
            if current { jobs.remove(id) } else { None }
        };
        let Some(job) = job else {
            tracing::debug!("⏭️ Reminder for deadline {id} no longer registered");
            return false;
        };
        if generation.is_none() {
            job.handle.abort();
        }

        tracing::info!(
            "🔔 Reminder firing for deadline {} ({}, due {}) scheduled at {}",
            job.snapshot.id,
            job.snapshot.client_name,
            job.snapshot.due_date,
            job.fire_at.to_rfc3339()
        );

        match AssertUnwindSafe(self.dispatcher.dispatch(&job.snapshot))
            .catch_unwind()
            .await
        {
            Ok(Ok(report)) => tracing::info!(
                "✅ Reminder for deadline {} sent to {}",
                job.snapshot.id,
                report.recipient
            ),
            Ok(Err(e)) => tracing::warn!(
                "⚠️ Reminder dispatch failed for deadline {} (fire time {}): {e}",
                job.snapshot.id,
                job.fire_at.to_rfc3339()
            ),
            Err(_) => tracing::error!(
                "❌ Reminder dispatcher panicked for deadline {} (fire time {})",
                job.snapshot.id,
                job.fire_at.to_rfc3339()
            ),
        }
        true
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let jobs = self.jobs.get_mut().unwrap_or_else(PoisonError::into_inner);
        for (_, job) in jobs.drain() {
            job.handle.abort();
        }
    }
}

/// Per-deadline reminder scheduler. Clones share one registry.
#[derive(Clone)]
pub struct ReminderScheduler {
    inner: Arc<Inner>,
}

impl ReminderScheduler {
    /// Scheduler on the system clock, timing reminders in `tz`.
    pub fn new(tz: Tz, dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        Self::with_clock(tz, dispatcher, Arc::new(SystemClock))
    }

    pub fn with_clock(
        tz: Tz,
        dispatcher: Arc<dyn NotificationDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                tz,
                clock,
                dispatcher,
                jobs: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    pub fn timezone(&self) -> Tz {
        self.inner.tz
    }

    /// Register a reminder for `deadline`, replacing any existing one. Any
    /// outcome other than `Scheduled` leaves no job for the id.
    ///
    /// Must run inside a Tokio runtime; otherwise the outcome is `Failed`.
    pub fn schedule(&self, deadline: &Deadline) -> ScheduleOutcome {
        let mut jobs = self.inner.lock_jobs();
        self.schedule_locked(&mut jobs, deadline)
    }

    /// Stop and forget the reminder for `deadline_id`. Unknown ids are a no-op.
    pub fn cancel(&self, deadline_id: &str) -> bool {
        let removed = self.inner.lock_jobs().remove(deadline_id);
        match removed {
            Some(job) => {
                job.handle.abort();
                tracing::info!(
                    "🛑 Reminder cancelled for deadline {deadline_id} (was {})",
                    job.fire_at.to_rfc3339()
                );
                true
            }
            None => {
                tracing::debug!("No reminder to cancel for deadline {deadline_id}");
                false
            }
        }
    }

    /// `cancel` then `schedule`, under one lock. Called on every update.
    pub fn reschedule(&self, deadline: &Deadline) -> ScheduleOutcome {
        self.schedule(deadline)
    }

    /// Fire the reminder for `deadline_id` right away. Returns false if none
    /// is registered.
    pub async fn fire_now(&self, deadline_id: &str) -> bool {
        self.inner.fire(deadline_id, None).await
    }

    /// Schedule every deadline that should have a reminder. Run once at
    /// startup, since timers do not survive a restart.
    pub fn reconcile<'a, I>(&self, deadlines: I) -> ReconcileReport
    where
        I: IntoIterator<Item = &'a Deadline>,
    {
        let mut report = ReconcileReport::default();
        for deadline in deadlines {
            match self.schedule(deadline) {
                ScheduleOutcome::Scheduled { .. } => report.scheduled += 1,
                ScheduleOutcome::Failed(_) => report.failed += 1,
                _ => report.skipped += 1,
            }
        }
        tracing::info!(
            "🔄 Reminder reconciliation: {} scheduled, {} skipped, {} failed",
            report.scheduled,
            report.skipped,
            report.failed
        );
        report
    }

    pub fn is_scheduled(&self, deadline_id: &str) -> bool {
        self.inner.lock_jobs().contains_key(deadline_id)
    }

    pub fn next_fire(&self, deadline_id: &str) -> Option<DateTime<Utc>> {
        self.inner.lock_jobs().get(deadline_id).map(|job| job.fire_at)
    }

    pub fn job_count(&self) -> usize {
        self.inner.lock_jobs().len()
    }

    /// Live jobs, soonest first.
    pub fn jobs(&self) -> Vec<ScheduledReminder> {
        let mut list: Vec<_> = self
            .inner
            .lock_jobs()
            .values()
            .map(|job| ScheduledReminder {
                deadline_id: job.snapshot.id.clone(),
                client_name: job.snapshot.client_name.clone(),
                deadline_type: job.snapshot.deadline_type,
                fire_at: job.fire_at,
            })
            .collect();
        list.sort_by_key(|r| r.fire_at);
        list
    }

    /// Abort every pending reminder.
    pub fn shutdown(&self) {
        let mut jobs = self.inner.lock_jobs();
        let count = jobs.len();
        for (_, job) in jobs.drain() {
            job.handle.abort();
        }
        tracing::info!("⏹️ Reminder scheduler stopped ({count} pending reminders dropped)");
    }

    fn schedule_locked(
        &self,
        jobs: &mut HashMap<String, ReminderJob>,
        deadline: &Deadline,
    ) -> ScheduleOutcome {
        if let Some(old) = jobs.remove(&deadline.id) {
            old.handle.abort();
            tracing::debug!(
                "Dropped reminder for deadline {} at {}",
                deadline.id,
                old.fire_at.to_rfc3339()
            );
        }

        let Some(time) = deadline.reminder_time else {
            tracing::debug!("No reminder time for deadline {}, not scheduling", deadline.id);
            return ScheduleOutcome::NoReminder;
        };
        if deadline.is_archived() {
            tracing::debug!("Deadline {} is archived, not scheduling", deadline.id);
            return ScheduleOutcome::Archived;
        }

        let fire_at = match fire_instant(deadline.due_date, time, self.inner.tz) {
            Ok(at) => at,
            Err(e) => {
                tracing::warn!(
                    "⚠️ Cannot schedule reminder for deadline {} ({} {time}): {e}",
                    deadline.id,
                    deadline.due_date
                );
                return ScheduleOutcome::Failed(e.to_string());
            }
        };

        if fire_at <= self.inner.clock.now() {
            tracing::info!(
                "⏭️ Reminder time {} for deadline {} already passed, not scheduling",
                fire_at.to_rfc3339(),
                deadline.id
            );
            return ScheduleOutcome::InPast { fire_at };
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(
                    "❌ Cannot schedule reminder for deadline {} at {}: {e}",
                    deadline.id,
                    fire_at.to_rfc3339()
                );
                return ScheduleOutcome::Failed(e.to_string());
            }
        };

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let task = runtime.spawn(run_timer(
            Arc::downgrade(&self.inner),
            deadline.id.clone(),
            generation,
            fire_at,
        ));
        jobs.insert(
            deadline.id.clone(),
            ReminderJob {
                generation,
                fire_at,
                snapshot: deadline.clone(),
                handle: task.abort_handle(),
            },
        );

        tracing::info!(
            "📅 Reminder scheduled for deadline {} ({}) at {}",
            deadline.id,
            deadline.client_name,
            fire_at.with_timezone(&self.inner.tz).to_rfc3339()
        );
        ScheduleOutcome::Scheduled { fire_at }
    }
}

/// Sleep until `fire_at` by the scheduler's clock, then fire.
async fn run_timer(inner: Weak<Inner>, id: String, generation: u64, fire_at: DateTime<Utc>) {
    loop {
        let remaining = match inner.upgrade() {
            Some(inner) => fire_at - inner.clock.now(),
            None => return,
        };
        match remaining.to_std() {
            Ok(wait) if !wait.is_zero() => tokio::time::sleep(wait.min(MAX_SLEEP)).await,
            _ => break,
        }
    }
    if let Some(inner) = inner.upgrade() {
        inner.fire(&id, Some(generation)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::dispatch::DispatchReport;
    use async_trait::async_trait;
    use chrono::{NaiveDate, TimeZone};
    use tokio::sync::Notify;
    use visadesk_core::deadline::ReminderTime;
    use visadesk_core::error::{Result, VisaDeskError};

    #[derive(Default)]
    struct RecordingDispatcher {
        calls: Mutex<Vec<Deadline>>,
        fired: Notify,
        fail: bool,
        panic: bool,
    }

    #[async_trait]
    impl NotificationDispatcher for RecordingDispatcher {
        async fn dispatch(&self, deadline: &Deadline) -> Result<DispatchReport> {
            self.calls.lock().unwrap().push(deadline.clone());
            self.fired.notify_one();
            if self.panic {
                panic!("dispatcher exploded");
            }
            if self.fail {
                return Err(VisaDeskError::Email("smtp down".into()));
            }
            Ok(DispatchReport {
                recipient: "admin@example.com".into(),
                ..Default::default()
            })
        }
    }

    fn tz() -> Tz {
        "Asia/Kathmandu".parse().unwrap()
    }

    fn deadline(id: &str, date: &str, time: Option<&str>) -> Deadline {
        let mut d = Deadline::new(
            DeadlineType::Appointment,
            "Asha",
            NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            time.map(|t| t.parse::<ReminderTime>().unwrap()),
        );
        d.id = id.to_string();
        d
    }

    fn scheduler() -> (ReminderScheduler, Arc<RecordingDispatcher>) {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        (ReminderScheduler::new(tz(), dispatcher.clone()), dispatcher)
    }

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        tz().with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap().with_timezone(&Utc)
    }

    #[tokio::test]
    async fn test_schedule_future_deadline() {
        let (sched, _) = scheduler();
        let outcome = sched.schedule(&deadline("d1", "2099-01-01", Some("09:30")));
        assert_eq!(outcome, ScheduleOutcome::Scheduled { fire_at: local(2099, 1, 1, 9, 30) });
        assert!(sched.is_scheduled("d1"));
        assert_eq!(sched.job_count(), 1);
    }

    #[tokio::test]
    async fn test_no_reminder_time_means_no_job() {
        let (sched, _) = scheduler();
        assert_eq!(sched.schedule(&deadline("d1", "2099-01-01", None)), ScheduleOutcome::NoReminder);
        assert!(!sched.is_scheduled("d1"));
    }

    #[tokio::test]
    async fn test_past_fire_time_means_no_job() {
        let (sched, _) = scheduler();
        let outcome = sched.schedule(&deadline("d1", "2001-01-01", Some("09:30")));
        assert!(matches!(outcome, ScheduleOutcome::InPast { .. }));
        assert_eq!(sched.job_count(), 0);
    }

    #[tokio::test]
    async fn test_fire_time_equal_to_now_is_not_scheduled() {
        let now = local(2030, 6, 1, 8, 0);
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let sched =
            ReminderScheduler::with_clock(tz(), dispatcher, Arc::new(ManualClock::new(now)));
        let outcome = sched.schedule(&deadline("d1", "2030-06-01", Some("08:00")));
        assert_eq!(outcome, ScheduleOutcome::InPast { fire_at: now });
        assert!(sched.schedule(&deadline("d2", "2030-06-01", Some("08:01"))).is_scheduled());
    }

    #[tokio::test]
    async fn test_archived_deadline_is_skipped() {
        let (sched, _) = scheduler();
        let mut d = deadline("d1", "2099-01-01", Some("09:30"));
        d.history = true;
        assert_eq!(sched.schedule(&d), ScheduleOutcome::Archived);
        assert!(!sched.is_scheduled("d1"));
    }

    #[tokio::test]
    async fn test_repeated_schedule_keeps_single_job() {
        let (sched, _) = scheduler();
        for time in ["09:30", "10:00", "11:15", "10:00"] {
            sched.schedule(&deadline("d1", "2099-01-01", Some(time)));
            sched.reschedule(&deadline("d1", "2099-01-02", Some(time)));
            assert_eq!(sched.job_count(), 1);
        }
        assert_eq!(sched.next_fire("d1"), Some(local(2099, 1, 2, 10, 0)));
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let (sched, _) = scheduler();
        sched.schedule(&deadline("d1", "2099-01-01", Some("09:30")));
        assert!(sched.cancel("d1"));
        assert!(!sched.cancel("d1"));
        assert!(!sched.cancel("never-scheduled"));
        assert!(!sched.is_scheduled("d1"));
    }

    #[tokio::test]
    async fn test_reschedule_replaces_not_duplicates() {
        let (sched, _) = scheduler();
        sched.schedule(&deadline("d1", "2099-01-01", Some("09:30")));
        let outcome = sched.reschedule(&deadline("d1", "2099-03-15", Some("09:30")));
        assert_eq!(outcome, ScheduleOutcome::Scheduled { fire_at: local(2099, 3, 15, 9, 30) });
        assert_eq!(sched.job_count(), 1);
        assert_eq!(sched.next_fire("d1"), Some(local(2099, 3, 15, 9, 30)));
    }

    #[tokio::test]
    async fn test_reschedule_to_no_reminder_drops_job() {
        let (sched, _) = scheduler();
        sched.schedule(&deadline("d1", "2099-01-01", Some("09:30")));
        assert_eq!(sched.reschedule(&deadline("d1", "2099-01-01", None)), ScheduleOutcome::NoReminder);
        assert!(!sched.is_scheduled("d1"));
    }

    #[tokio::test]
    async fn test_plain_schedule_without_reminder_drops_existing_job() {
        let (sched, _) = scheduler();
        sched.schedule(&deadline("d1", "2099-01-01", Some("09:30")));
        assert_eq!(sched.schedule(&deadline("d1", "2099-01-01", None)), ScheduleOutcome::NoReminder);
        assert!(!sched.is_scheduled("d1"));

        sched.schedule(&deadline("d1", "2099-01-01", Some("09:30")));
        let mut archived = deadline("d1", "2099-01-01", Some("09:30"));
        archived.history = true;
        assert_eq!(sched.schedule(&archived), ScheduleOutcome::Archived);
        assert_eq!(sched.job_count(), 0);
    }

    #[tokio::test]
    async fn test_schedule_after_clock_passes_fire_time_drops_job() {
        let fire_at = local(2030, 6, 1, 8, 0);
        let clock = Arc::new(ManualClock::new(fire_at - chrono::Duration::hours(1)));
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let sched = ReminderScheduler::with_clock(tz(), dispatcher, clock.clone());

        let d = deadline("d1", "2030-06-01", Some("08:00"));
        assert!(sched.schedule(&d).is_scheduled());

        clock.set(fire_at + chrono::Duration::minutes(1));
        assert_eq!(sched.schedule(&d), ScheduleOutcome::InPast { fire_at });
        assert!(!sched.is_scheduled("d1"));
    }

    #[tokio::test]
    async fn test_create_update_delete_scenario() {
        let (sched, _) = scheduler();
        sched.schedule(&deadline("d1", "2099-01-01", Some("09:30")));
        assert_eq!(sched.next_fire("d1"), Some(local(2099, 1, 1, 9, 30)));

        sched.reschedule(&deadline("d1", "2099-01-01", Some("14:00")));
        let jobs = sched.jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].fire_at, local(2099, 1, 1, 14, 0));

        assert!(sched.cancel("d1"));
        assert!(!sched.cancel("d1"));
        assert_eq!(sched.job_count(), 0);
    }

    #[tokio::test]
    async fn test_fire_now_removes_entry_and_dispatches_snapshot() {
        let (sched, dispatcher) = scheduler();
        sched.schedule(&deadline("d1", "2099-01-01", Some("09:30")));
        assert!(sched.fire_now("d1").await);
        assert!(!sched.is_scheduled("d1"));

        let calls = dispatcher.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "d1");
        drop(calls);
        assert!(!sched.fire_now("d1").await);
    }

    #[tokio::test]
    async fn test_fire_removes_entry_when_dispatch_fails() {
        let dispatcher = Arc::new(RecordingDispatcher {
            fail: true,
            ..Default::default()
        });
        let sched = ReminderScheduler::new(tz(), dispatcher.clone());
        sched.schedule(&deadline("d1", "2099-01-01", Some("09:30")));
        assert!(sched.fire_now("d1").await);
        assert!(!sched.is_scheduled("d1"));
        assert_eq!(dispatcher.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fire_removes_entry_when_dispatcher_panics() {
        let dispatcher = Arc::new(RecordingDispatcher {
            panic: true,
            ..Default::default()
        });
        let sched = ReminderScheduler::new(tz(), dispatcher);
        sched.schedule(&deadline("d1", "2099-01-01", Some("09:30")));
        assert!(sched.fire_now("d1").await);
        assert!(!sched.is_scheduled("d1"));
    }

    #[tokio::test]
    async fn test_snapshot_is_taken_at_schedule_time() {
        let (sched, dispatcher) = scheduler();
        let mut d = deadline("d1", "2099-01-01", Some("09:30"));
        d.client_phone = Some("9800000000".into());
        sched.schedule(&d);
        d.client_phone = Some("9811111111".into());

        sched.fire_now("d1").await;
        let calls = dispatcher.calls.lock().unwrap();
        assert_eq!(calls[0].client_phone.as_deref(), Some("9800000000"));
    }

    #[tokio::test]
    async fn test_stale_timer_does_not_remove_replacement() {
        let (sched, dispatcher) = scheduler();
        sched.schedule(&deadline("d1", "2099-01-01", Some("09:30")));
        let stale = sched.inner.lock_jobs()["d1"].generation;
        sched.reschedule(&deadline("d1", "2099-01-01", Some("10:00")));

        assert!(!sched.inner.fire("d1", Some(stale)).await);
        assert!(sched.is_scheduled("d1"));
        assert!(dispatcher.calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_and_removes_itself() {
        let fire_at = local(2030, 6, 1, 8, 0);
        let clock = Arc::new(ManualClock::new(fire_at - chrono::Duration::seconds(30)));
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let sched = ReminderScheduler::with_clock(tz(), dispatcher.clone(), clock.clone());

        sched.schedule(&deadline("d1", "2030-06-01", Some("08:00")));
        tokio::task::yield_now().await;
        assert!(sched.is_scheduled("d1"));
        assert!(dispatcher.calls.lock().unwrap().is_empty());

        clock.advance(chrono::Duration::seconds(30));
        tokio::time::advance(Duration::from_secs(30)).await;
        tokio::time::timeout(Duration::from_secs(5), dispatcher.fired.notified())
            .await
            .expect("reminder did not fire");
        tokio::task::yield_now().await;

        assert!(!sched.is_scheduled("d1"));
        assert_eq!(dispatcher.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let fire_at = local(2030, 6, 1, 8, 0);
        let clock = Arc::new(ManualClock::new(fire_at - chrono::Duration::seconds(30)));
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let sched = ReminderScheduler::with_clock(tz(), dispatcher.clone(), clock.clone());

        sched.schedule(&deadline("d1", "2030-06-01", Some("08:00")));
        tokio::task::yield_now().await;
        sched.cancel("d1");

        clock.advance(chrono::Duration::minutes(5));
        tokio::time::advance(Duration::from_secs(300)).await;
        tokio::task::yield_now().await;
        assert!(dispatcher.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_counts() {
        let (sched, _) = scheduler();
        let mut archived = deadline("d4", "2099-01-01", Some("09:30"));
        archived.history = true;
        let deadlines = vec![
            deadline("d1", "2099-01-01", Some("09:30")),
            deadline("d2", "2001-01-01", Some("09:30")),
            deadline("d3", "2099-01-01", None),
            archived,
            deadline("d5", "2099-02-01", Some("18:45")),
        ];

        let report = sched.reconcile(&deadlines);
        assert_eq!(report, ReconcileReport { scheduled: 2, skipped: 3, failed: 0 });
        let ids: Vec<_> = sched.jobs().into_iter().map(|j| j.deadline_id).collect();
        assert_eq!(ids, vec!["d1", "d5"]);
    }

    #[test]
    fn test_schedule_outside_runtime_fails_quietly() {
        let (sched, _) = scheduler();
        let outcome = sched.schedule(&deadline("d1", "2099-01-01", Some("09:30")));
        assert!(matches!(outcome, ScheduleOutcome::Failed(_)));
        assert!(!sched.is_scheduled("d1"));
    }

    #[tokio::test]
    async fn test_shutdown_drops_everything() {
        let (sched, _) = scheduler();
        sched.schedule(&deadline("d1", "2099-01-01", Some("09:30")));
        sched.schedule(&deadline("d2", "2099-01-01", Some("10:30")));
        sched.shutdown();
        assert_eq!(sched.job_count(), 0);
    }
}
