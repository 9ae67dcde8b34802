use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};

use anyhow::Context;
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::datastore::{load_jsonl, save_jsonl_atomic};
use crate::error::TaskError;
use crate::task::Task;

const SPOOL_FILE: &str = "reminders.data";

/// Calendar fields a one-shot trigger matches on. Seconds are never kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerComponents {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
}

impl TriggerComponents {
    pub fn from_instant(at: DateTime<Utc>, tz: Tz) -> Self {
        let local = at.with_timezone(&tz);
        Self {
            year: local.year(),
            month: local.month(),
            day: local.day(),
            hour: local.hour(),
            minute: local.minute(),
        }
    }

    /// The instant the trigger fires in `tz`, if that local time exists.
    pub fn fire_time(&self, tz: Tz) -> Option<DateTime<Utc>> {
        let date = NaiveDate::from_ymd_opt(self.year, self.month, self.day)?;
        let time = NaiveTime::from_hms_opt(self.hour, self.minute, 0)?;
        tz.from_local_datetime(&date.and_time(time))
            .earliest()
            .map(|local| local.with_timezone(&Utc))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub identifier: String,
    pub title: String,
    pub body: String,
    pub trigger: TriggerComponents,
    pub repeats: bool,
}

impl NotificationRequest {
    pub fn for_task(task: &Task, tz: Tz) -> Self {
        Self {
            identifier: notification_id(task.id),
            title: task.title.clone(),
            body: task.reminder_text.clone(),
            trigger: TriggerComponents::from_instant(task.reminder_date, tz),
            repeats: false,
        }
    }
}

/// Notification requests are keyed by the task's identity.
pub fn notification_id(id: Uuid) -> String {
    id.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Authorization {
    #[default]
    NotDetermined,
    Granted,
    Denied,
}

/// Completions a notification service reports back to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationEvent {
    Authorization { granted: bool, error: Option<String> },
    Failed { identifier: String, error: String },
}

/// The notification service boundary.
///
/// `request_authorization` may answer from any thread; the answer travels
/// over `events` and is applied by [`ReminderScheduler::pump_events`] on the
/// owning thread. Services that finish scheduling asynchronously report late
/// failures on the same channel.
pub trait NotificationCenter {
    fn request_authorization(&mut self, events: Sender<NotificationEvent>);

    /// Registers `request`, replacing any pending one with the same identifier.
    fn add(&mut self, request: NotificationRequest) -> Result<(), TaskError>;

    fn remove_pending(&mut self, identifiers: &[String]) -> Result<(), TaskError>;

    fn pending(&self) -> Vec<NotificationRequest>;
}

/// Keeps at most one pending notification per task.
///
/// Failures are logged and never returned: a reminder that cannot be
/// scheduled must not undo the save that asked for it.
pub struct ReminderScheduler<C> {
    center: C,
    tz: Tz,
    access: Authorization,
    events_tx: Sender<NotificationEvent>,
    events_rx: Receiver<NotificationEvent>,
}

impl<C: NotificationCenter> ReminderScheduler<C> {
    pub fn new(center: C, tz: Tz) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        Self {
            center,
            tz,
            access: Authorization::NotDetermined,
            events_tx,
            events_rx,
        }
    }

    pub fn center(&self) -> &C {
        &self.center
    }

    pub fn center_mut(&mut self) -> &mut C {
        &mut self.center
    }

    pub fn access(&self) -> Authorization {
        self.access
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Asks once for permission. The answer is applied by the next
    /// [`pump_events`](Self::pump_events).
    #[instrument(skip(self))]
    pub fn request_access(&mut self) {
        debug!("requesting notification authorization");
        self.center.request_authorization(self.events_tx.clone());
    }

    /// Drains completions reported by the notification service.
    #[instrument(skip(self))]
    pub fn pump_events(&mut self) -> Authorization {
        while let Ok(event) = self.events_rx.try_recv() {
            match event {
                NotificationEvent::Authorization { granted, error } => {
                    if let Some(error) = error {
                        warn!(%error, "notification permission error");
                    }
                    self.access = if granted {
                        Authorization::Granted
                    } else {
                        Authorization::Denied
                    };
                    info!(access = ?self.access, "notification access updated");
                }
                NotificationEvent::Failed { identifier, error } => {
                    warn!(%identifier, %error, "notification scheduling error");
                }
            }
        }
        self.access
    }

    /// Registers the task's one-shot reminder, or cancels it when the
    /// reminder is off or its trigger time is not after `now`.
    #[instrument(skip(self, task, now), fields(id = %task.id, reminder = task.is_reminder_on))]
    pub fn schedule(&mut self, task: &Task, now: DateTime<Utc>) {
        if !task.is_reminder_on {
            self.cancel(task.id);
            return;
        }

        if self.access == Authorization::Denied {
            debug!("notifications denied; not scheduling");
            return;
        }

        let request = NotificationRequest::for_task(task, self.tz);
        if request.trigger.fire_time(self.tz).is_none_or(|at| at <= now) {
            debug!(trigger = ?request.trigger, "trigger time has passed; not scheduling");
            self.cancel(task.id);
            return;
        }

        debug!(trigger = ?request.trigger, "scheduling notification");
        if let Err(err) = self.center.add(request) {
            warn!(error = %err, "notification scheduling error");
        }
    }

    #[instrument(skip(self))]
    pub fn cancel(&mut self, id: Uuid) {
        if let Err(err) = self.center.remove_pending(&[notification_id(id)]) {
            warn!(error = %err, "notification cancellation error");
        }
    }

    pub fn pending_for(&self, id: Uuid) -> Vec<NotificationRequest> {
        let key = notification_id(id);
        self.center
            .pending()
            .into_iter()
            .filter(|request| request.identifier == key)
            .collect()
    }
}

/// File-backed local notification service: pending requests live in
/// `<data_dir>/reminders.data` until they are delivered.
#[derive(Debug)]
pub struct SpoolCenter {
    pub spool_path: PathBuf,
    enabled: bool,
    requests: Vec<NotificationRequest>,
}

impl SpoolCenter {
    #[instrument(skip(data_dir))]
    pub fn open(data_dir: &Path, enabled: bool) -> anyhow::Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;
        let spool_path = data_dir.join(SPOOL_FILE);
        if !spool_path.exists() {
            std::fs::write(&spool_path, "")?;
        }
        let requests = load_jsonl(&spool_path).context("failed to load reminders.data")?;
        debug!(spool = %spool_path.display(), count = requests.len(), "opened notification spool");
        Ok(Self {
            spool_path,
            enabled,
            requests,
        })
    }

    /// Removes and returns every request whose trigger time is at or before
    /// `now`. Triggers whose local time does not exist are dropped.
    #[instrument(skip(self, now, tz))]
    pub fn take_due(
        &mut self,
        now: DateTime<Utc>,
        tz: Tz,
    ) -> Result<Vec<NotificationRequest>, TaskError> {
        let mut due = Vec::new();
        let mut kept = Vec::new();
        let mut dropped = 0usize;
        for request in &self.requests {
            match request.trigger.fire_time(tz) {
                Some(at) if at <= now => due.push(request.clone()),
                Some(_) => kept.push(request.clone()),
                None => dropped += 1,
            }
        }
        if due.is_empty() && dropped == 0 {
            return Ok(due);
        }

        if dropped > 0 {
            warn!(count = dropped, "dropping notifications whose local time does not exist");
        }
        self.commit(kept)?;
        if !due.is_empty() {
            info!(count = due.len(), "delivered due notifications");
        }
        Ok(due)
    }

    fn commit(&mut self, next: Vec<NotificationRequest>) -> Result<(), TaskError> {
        save_jsonl_atomic(&self.spool_path, &next)
            .map_err(|err| TaskError::notification(format!("{err:#}")))?;
        self.requests = next;
        Ok(())
    }
}

impl NotificationCenter for SpoolCenter {
    fn request_authorization(&mut self, events: Sender<NotificationEvent>) {
        let event = NotificationEvent::Authorization {
            granted: self.enabled,
            error: None,
        };
        if events.send(event).is_err() {
            warn!("notification event receiver dropped");
        }
    }

    fn add(&mut self, request: NotificationRequest) -> Result<(), TaskError> {
        let mut next: Vec<NotificationRequest> = self
            .requests
            .iter()
            .filter(|pending| pending.identifier != request.identifier)
            .cloned()
            .collect();
        next.push(request);
        self.commit(next)
    }

    fn remove_pending(&mut self, identifiers: &[String]) -> Result<(), TaskError> {
        if !self
            .requests
            .iter()
            .any(|pending| identifiers.contains(&pending.identifier))
        {
            return Ok(());
        }
        let next = self
            .requests
            .iter()
            .filter(|pending| !identifiers.contains(&pending.identifier))
            .cloned()
            .collect();
        self.commit(next)
    }

    fn pending(&self) -> Vec<NotificationRequest> {
        self.requests.clone()
    }
}
