//! [`Scheduler`] – countdown timers and wall-clock reminders.
//!
//! Every job is a tokio task that sleeps and then pushes a [`Notification`]
//! onto a channel; the front end drains the channel and shows the message.
//! Each scheduled job hands back an explicit [`ScheduledTask`] so callers
//! can cancel it before it fires.
//!
//! Reminder times are `HH:MM` wall-clock strings. A time that has already
//! passed today is scheduled for the same time tomorrow; a string that is
//! not a valid time of day (`99:99`) is rejected up front and nothing is
//! scheduled.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use joi_runtime::scheduler::Scheduler;
//!
//! # #[tokio::main(flavor = "current_thread")] async fn main() {
//! let (scheduler, mut notifications) = Scheduler::new();
//! let task = scheduler.after(Duration::from_millis(1), "Es hora de descansar");
//! let fired = notifications.recv().await.unwrap();
//! assert_eq!(fired.message, "Es hora de descansar");
//! # let _ = task;
//! # }
//! ```

use chrono::{Local, NaiveDateTime};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────────────────
// Notification
// ─────────────────────────────────────────────────────────────────────────────

/// A fired timer or reminder, ready to be shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub message: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// ScheduledTask
// ─────────────────────────────────────────────────────────────────────────────

/// Handle to a pending timer or reminder.
///
/// Dropping the handle does **not** cancel the job (it keeps running in the
/// background, as the assistant's fire-and-forget semantics require); call
/// [`ScheduledTask::cancel`] to stop it before it fires.
pub struct ScheduledTask {
    id: Uuid,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Stop the job; no notification will be delivered.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// `true` once the job has fired or been cancelled.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scheduler
// ─────────────────────────────────────────────────────────────────────────────

/// Spawns timer/reminder jobs onto the current tokio runtime.
pub struct Scheduler {
    tx: mpsc::UnboundedSender<Notification>,
}

impl Scheduler {
    /// Create a scheduler and the notification channel its jobs feed.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Fire `message` after `delay`. Must be called within a tokio runtime.
    pub fn after(&self, delay: Duration, message: impl Into<String>) -> ScheduledTask {
        let id = Uuid::new_v4();
        let message = message.into();
        let tx = self.tx.clone();
        debug!(%id, ?delay, "scheduling timer");
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // A closed channel just means nobody is listening anymore.
            let _ = tx.send(Notification { message });
        });
        ScheduledTask { id, handle }
    }

    /// Fire `message` at the next occurrence of `time_of_day` (`"HH:MM"`).
    ///
    /// Returns `None` – and schedules nothing – when the string is not a
    /// valid time of day. A time already elapsed today fires tomorrow.
    pub fn at(&self, time_of_day: &str, message: impl Into<String>) -> Option<ScheduledTask> {
        let (hour, minute) = parse_time_of_day(time_of_day)?;
        let delay = delay_from(Local::now().naive_local(), hour, minute);
        Some(self.after(delay, message))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Time helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Parse `"HH:MM"` into `(hour, minute)`, rejecting out-of-range values.
pub fn parse_time_of_day(s: &str) -> Option<(u32, u32)> {
    let (hour, minute) = s.split_once(':')?;
    let hour: u32 = hour.parse().ok()?;
    let minute: u32 = minute.parse().ok()?;
    if hour > 23 || minute > 59 {
        return None;
    }
    Some((hour, minute))
}

/// Delay from `now` until the next wall-clock occurrence of `hour:minute`.
///
/// When the target time is not strictly in the future it rolls over to the
/// same time tomorrow.
fn delay_from(now: NaiveDateTime, hour: u32, minute: u32) -> Duration {
    let today_target = now
        .date()
        .and_hms_opt(hour, minute, 0)
        .expect("hour and minute validated by parse_time_of_day");
    let target = if today_target > now {
        today_target
    } else {
        today_target + chrono::Duration::days(1)
    };
    (target - now).to_std().unwrap_or(Duration::ZERO)
}
