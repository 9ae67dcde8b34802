use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::datastore::DataStore;
use crate::error::TaskError;
use crate::filter::Tab;
use crate::reminder::{Authorization, NotificationCenter, ReminderScheduler};
use crate::task::{Task, TaskColor, TaskFields, TaskType};

/// Every change the edit form and the tab bar can make.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewAction {
    SetTitle(String),
    SetColor(TaskColor),
    SetType(TaskType),
    SetDeadline(DateTime<Utc>),
    SetReminderOn(bool),
    SetReminderDate(DateTime<Utc>),
    SetReminderText(String),
    SelectTab(Tab),
    ToggleDatePicker,
    ToggleTimePicker,
    DismissPickers,
    /// Opens the editor on an existing task. Follow with `setup_task`.
    BeginEdit(Uuid),
    BeginNew,
    /// Leaves the editor and clears the draft.
    CloseEditor,
}

pub type Observer = Box<dyn FnMut(&TaskViewState)>;

/// Edit-form mediator between the UI and the task store.
///
/// All mutation goes through [`dispatch`](Self::dispatch) or one of the
/// store-facing operations; observers are told after each one.
pub struct TaskViewState {
    current_tab: Tab,
    open_edit_task: bool,
    draft: TaskFields,
    edit_task: Option<Uuid>,
    show_date_picker: bool,
    show_time_picker: bool,
    notification_access: bool,
    observers: Vec<Observer>,
}

impl TaskViewState {
    pub fn new(current_tab: Tab, now: DateTime<Utc>) -> Self {
        Self {
            current_tab,
            open_edit_task: false,
            draft: TaskFields::new(now),
            edit_task: None,
            show_date_picker: false,
            show_time_picker: false,
            notification_access: false,
            observers: Vec::new(),
        }
    }

    pub fn current_tab(&self) -> Tab {
        self.current_tab
    }

    pub fn open_edit_task(&self) -> bool {
        self.open_edit_task
    }

    pub fn draft(&self) -> &TaskFields {
        &self.draft
    }

    pub fn edit_task(&self) -> Option<Uuid> {
        self.edit_task
    }

    pub fn show_date_picker(&self) -> bool {
        self.show_date_picker
    }

    pub fn show_time_picker(&self) -> bool {
        self.show_time_picker
    }

    pub fn notification_access(&self) -> bool {
        self.notification_access
    }

    /// Whether the save affordance should be enabled.
    pub fn can_save(&self) -> bool {
        self.draft.has_title()
    }

    pub fn observe(&mut self, observer: Observer) {
        self.observers.push(observer);
    }

    #[instrument(skip(self, now))]
    pub fn dispatch(&mut self, action: ViewAction, now: DateTime<Utc>) {
        match action {
            ViewAction::SetTitle(title) => self.draft.title = title,
            ViewAction::SetColor(color) => self.draft.color = color,
            ViewAction::SetType(kind) => self.draft.kind = kind,
            // The deadline picker only offers now and later.
            ViewAction::SetDeadline(deadline) => self.draft.deadline = deadline.max(now),
            ViewAction::SetReminderOn(on) => self.draft.is_reminder_on = on,
            ViewAction::SetReminderDate(at) => self.draft.reminder_date = at,
            ViewAction::SetReminderText(text) => self.draft.reminder_text = text,
            ViewAction::SelectTab(tab) => self.current_tab = tab,
            ViewAction::ToggleDatePicker => {
                self.show_date_picker = !self.show_date_picker;
                if self.show_date_picker {
                    self.show_time_picker = false;
                }
            }
            ViewAction::ToggleTimePicker => {
                self.show_time_picker = !self.show_time_picker;
                if self.show_time_picker {
                    self.show_date_picker = false;
                }
            }
            ViewAction::DismissPickers => {
                self.show_date_picker = false;
                self.show_time_picker = false;
            }
            ViewAction::BeginEdit(id) => {
                self.edit_task = Some(id);
                self.open_edit_task = true;
            }
            ViewAction::BeginNew => {
                self.edit_task = None;
                self.open_edit_task = true;
            }
            ViewAction::CloseEditor => {
                self.open_edit_task = false;
                self.show_date_picker = false;
                self.show_time_picker = false;
                self.clear_draft(now);
            }
        }
        self.notify();
    }

    /// Loads the edited task into the draft, or resets the reminder fields
    /// when composing a new task.
    #[instrument(skip(self, store))]
    pub fn setup_task(&mut self, store: &DataStore) -> Result<(), TaskError> {
        match self.edit_task {
            Some(id) => {
                let task = store.get(id).ok_or_else(|| TaskError::not_found(id))?;
                self.draft = task.fields();
                debug!(%id, "loaded task into draft");
            }
            None => {
                self.draft.is_reminder_on = false;
                self.draft.reminder_text.clear();
            }
        }
        self.notify();
        Ok(())
    }

    pub fn reset_task_data(&mut self, now: DateTime<Utc>) {
        self.clear_draft(now);
        self.notify();
    }

    /// Applies completions reported by the notification service.
    pub fn pump_notifications<C: NotificationCenter>(&mut self, scheduler: &mut ReminderScheduler<C>) {
        let access = scheduler.pump_events() == Authorization::Granted;
        if access != self.notification_access {
            self.notification_access = access;
            self.notify();
        }
    }

    /// Saves the draft (update in edit mode, create otherwise) and then
    /// schedules its reminder. Reminder failures do not fail the save.
    #[instrument(skip(self, store, scheduler, now), fields(edit = ?self.edit_task))]
    pub fn try_add_task<C: NotificationCenter>(
        &mut self,
        store: &mut DataStore,
        scheduler: &mut ReminderScheduler<C>,
        now: DateTime<Utc>,
    ) -> Result<Task, TaskError> {
        self.pump_notifications(scheduler);
        self.draft.validate()?;

        let saved = match self.edit_task {
            Some(id) => store.update(id, self.draft.clone(), now)?,
            None => store.create(self.draft.clone(), now)?,
        };

        scheduler.schedule(&saved, now);
        Ok(saved)
    }

    /// Returns whether the save succeeded, so the caller can decide to
    /// dismiss the editor.
    pub fn add_task<C: NotificationCenter>(
        &mut self,
        store: &mut DataStore,
        scheduler: &mut ReminderScheduler<C>,
        now: DateTime<Utc>,
    ) -> bool {
        match self.try_add_task(store, scheduler, now) {
            Ok(_) => true,
            Err(err) => {
                warn!(error = %err, "failed to save task");
                false
            }
        }
    }

    /// Deletes the task being edited, cancels its reminder and leaves edit
    /// mode.
    #[instrument(skip(self, store, scheduler))]
    pub fn delete_edit_task<C: NotificationCenter>(
        &mut self,
        store: &mut DataStore,
        scheduler: &mut ReminderScheduler<C>,
    ) -> Result<Task, TaskError> {
        let id = self
            .edit_task
            .ok_or_else(|| TaskError::NotFound("no task is being edited".to_string()))?;

        let removed = store.delete(id)?;
        scheduler.cancel(id);

        self.edit_task = None;
        self.open_edit_task = false;
        self.notify();
        Ok(removed)
    }

    fn clear_draft(&mut self, now: DateTime<Utc>) {
        self.draft = TaskFields::new(now);
        self.edit_task = None;
    }

    fn notify(&mut self) {
        let mut observers = std::mem::take(&mut self.observers);
        for observer in &mut observers {
            observer(self);
        }
        observers.append(&mut self.observers);
        self.observers = observers;
    }
}
