use anyhow::Context;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::cli::{Command, FieldArgs};
use crate::config::Config;
use crate::datastore::DataStore;
use crate::datetime::parse_date_expr;
use crate::filter::{Tab, bucket_of};
use crate::list;
use crate::reminder::{ReminderScheduler, SpoolCenter};
use crate::render::Renderer;
use crate::view_state::{TaskViewState, ViewAction};

/// Everything one command invocation works against.
pub struct Session {
    pub store: DataStore,
    pub scheduler: ReminderScheduler<SpoolCenter>,
    pub view: TaskViewState,
    pub tz: Tz,
}

impl Session {
    #[instrument(skip(cfg, store, spool, now))]
    pub fn new(cfg: &Config, store: DataStore, spool: SpoolCenter, tz: Tz, now: DateTime<Utc>) -> Self {
        let default_tab = cfg.default_tab();

        let mut scheduler = ReminderScheduler::new(spool, tz);
        scheduler.request_access();

        let mut view = TaskViewState::new(default_tab, now);
        view.pump_notifications(&mut scheduler);
        debug!(
            tab = %default_tab,
            notifications = view.notification_access(),
            "session ready"
        );

        Self {
            store,
            scheduler,
            view,
            tz,
        }
    }

    fn resolve(&self, token: &str) -> anyhow::Result<Uuid> {
        Ok(self.store.resolve(token)?)
    }
}

#[instrument(skip(session, renderer, command, now))]
pub fn dispatch(
    session: &mut Session,
    renderer: &mut Renderer,
    command: Option<Command>,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let command = command.unwrap_or(Command::List { tab: None });
    debug!(?command, "dispatching command");

    match command {
        Command::Add { title, fields } => {
            session.view.dispatch(ViewAction::BeginNew, now);
            session.view.setup_task(&session.store)?;
            session
                .view
                .dispatch(ViewAction::SetTitle(title.join(" ")), now);
            apply_field_args(session, &fields, now)?;
            save_and_close(session, renderer, now, "Created")
        }
        Command::Edit { id, title, fields } => {
            let id = session.resolve(&id)?;
            session.view.dispatch(ViewAction::BeginEdit(id), now);
            session.view.setup_task(&session.store)?;
            if let Some(title) = title {
                session.view.dispatch(ViewAction::SetTitle(title), now);
            }
            apply_field_args(session, &fields, now)?;
            save_and_close(session, renderer, now, "Modified")
        }
        Command::Delete { id } => {
            let id = session.resolve(&id)?;
            session.view.dispatch(ViewAction::BeginEdit(id), now);
            let removed = session
                .view
                .delete_edit_task(&mut session.store, &mut session.scheduler)?;
            session.view.dispatch(ViewAction::CloseEditor, now);
            renderer.print_message(&format!("Deleted task {} '{}'.", removed.short_id(), removed.title))
        }
        Command::Done { id } => set_completed(session, renderer, &id, true, now),
        Command::Undone { id } => set_completed(session, renderer, &id, false, now),
        Command::List { tab } => {
            if let Some(name) = tab {
                session
                    .view
                    .dispatch(ViewAction::SelectTab(Tab::from_name(&name)), now);
            }
            let tab = session.view.current_tab();
            let listing = list::render(&session.store, tab, now, session.tz, |task| {
                renderer.task_row(task)
            });
            renderer.print_listing(tab, listing)
        }
        Command::Info { id } => {
            let id = session.resolve(&id)?;
            let task = session
                .store
                .get(id)
                .with_context(|| format!("task {id} vanished"))?
                .clone();
            let pending = session.scheduler.pending_for(id);
            renderer.print_task_info(&task, bucket_of(&task, now, session.tz), &pending)
        }
        Command::Remind => {
            let due = session.scheduler.center_mut().take_due(now, session.tz)?;
            if due.is_empty() {
                return renderer.print_message("No reminders due.");
            }
            for request in &due {
                renderer.print_notification(request)?;
            }
            Ok(())
        }
    }
}

fn apply_field_args(session: &mut Session, fields: &FieldArgs, now: DateTime<Utc>) -> anyhow::Result<()> {
    let view = &mut session.view;

    if let Some(color) = fields.color {
        view.dispatch(ViewAction::SetColor(color), now);
    }
    if let Some(kind) = fields.kind {
        view.dispatch(ViewAction::SetType(kind), now);
    }
    if let Some(due) = fields.due.as_deref() {
        let deadline = parse_date_expr(due, now, session.tz)
            .with_context(|| format!("invalid deadline: {due}"))?;
        if deadline < now {
            warn!(%deadline, "deadline is in the past; using now");
        }
        view.dispatch(ViewAction::SetDeadline(deadline), now);
    }
    if let Some(remind) = fields.remind.as_deref() {
        let at = parse_date_expr(remind, now, session.tz)
            .with_context(|| format!("invalid reminder time: {remind}"))?;
        view.dispatch(ViewAction::SetReminderOn(true), now);
        view.dispatch(ViewAction::SetReminderDate(at), now);
    }
    if fields.no_remind {
        view.dispatch(ViewAction::SetReminderOn(false), now);
    }
    if let Some(note) = fields.note.as_ref() {
        view.dispatch(ViewAction::SetReminderText(note.clone()), now);
    }

    Ok(())
}

fn save_and_close(
    session: &mut Session,
    renderer: &mut Renderer,
    now: DateTime<Utc>,
    verb: &str,
) -> anyhow::Result<()> {
    let saved = session
        .view
        .try_add_task(&mut session.store, &mut session.scheduler, now);
    session.view.dispatch(ViewAction::CloseEditor, now);
    let saved = saved?;

    info!(id = %saved.id, "saved task");
    renderer.print_message(&format!(
        "{verb} task {} '{}' ({}).",
        saved.short_id(),
        saved.title,
        bucket_of(&saved, now, session.tz)
    ))
}

fn set_completed(
    session: &mut Session,
    renderer: &mut Renderer,
    token: &str,
    completed: bool,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let id = session.resolve(token)?;
    let task = session.store.set_completed(id, completed, now)?;
    let state = if completed { "Completed" } else { "Re-opened" };
    renderer.print_message(&format!("{state} task {} '{}'.", task.short_id(), task.title))
}
