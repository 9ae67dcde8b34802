use chrono::{DateTime, Duration, TimeZone, Utc};
use chrono_tz::Tz;
use tasklane_core::datastore::DataStore;
use tasklane_core::datetime::start_of_day;
use tasklane_core::filter::{Filter, Tab};
use tasklane_core::list::{self, Listing};
use tasklane_core::reminder::{Authorization, ReminderScheduler, SpoolCenter, TriggerComponents};
use tasklane_core::task::{TaskColor, TaskType};
use tasklane_core::view_state::{TaskViewState, ViewAction};
use tempfile::{TempDir, tempdir};

fn paris() -> Tz {
    "Europe/Paris".parse().expect("valid tz")
}

fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    paris()
        .with_ymd_and_hms(y, m, d, h, min, 0)
        .single()
        .expect("valid local time")
        .with_timezone(&Utc)
}

struct Harness {
    _temp: TempDir,
    store: DataStore,
    scheduler: ReminderScheduler<SpoolCenter>,
    view: TaskViewState,
}

fn harness(now: DateTime<Utc>) -> Harness {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");
    let spool = SpoolCenter::open(temp.path(), true).expect("open spool");
    let mut scheduler = ReminderScheduler::new(spool, paris());
    scheduler.request_access();

    let mut view = TaskViewState::new(Tab::Today, now);
    view.pump_notifications(&mut scheduler);
    assert_eq!(scheduler.access(), Authorization::Granted);

    Harness {
        _temp: temp,
        store,
        scheduler,
        view,
    }
}

impl Harness {
    fn new_task(&mut self, title: &str, now: DateTime<Utc>) -> bool {
        self.view.dispatch(ViewAction::BeginNew, now);
        self.view.setup_task(&self.store).expect("setup");
        self.view.dispatch(ViewAction::SetTitle(title.to_string()), now);
        let ok = self.view.add_task(&mut self.store, &mut self.scheduler, now);
        self.view.dispatch(ViewAction::CloseEditor, now);
        ok
    }
}

#[test]
fn empty_title_saves_nothing() {
    let now = local(2024, 6, 20, 7, 0);
    let mut h = harness(now);

    assert!(!h.new_task("", now));
    assert!(!h.new_task("   ", now));
    assert!(h.store.all().is_empty());

    assert!(h.new_task("Real", now));
    let id = h.store.all()[0].id;
    h.view.dispatch(ViewAction::BeginEdit(id), now);
    h.view.setup_task(&h.store).expect("setup");
    h.view.dispatch(ViewAction::SetTitle(String::new()), now);
    assert!(!h.view.can_save());
    assert!(!h.view.add_task(&mut h.store, &mut h.scheduler, now));
    assert_eq!(h.store.get(id).expect("still there").title, "Real");
}

#[test]
fn new_mode_creates_and_edit_mode_updates_in_place() {
    let now = local(2024, 6, 20, 7, 0);
    let mut h = harness(now);

    assert!(h.new_task("First", now));
    assert!(h.new_task("Second", now));
    let ids: Vec<_> = h.store.all().iter().map(|t| t.id).collect();
    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1]);

    h.view.dispatch(ViewAction::BeginEdit(ids[0]), now);
    h.view.setup_task(&h.store).expect("setup");
    h.view.dispatch(ViewAction::SetTitle("First, renamed".to_string()), now);
    assert!(h.view.add_task(&mut h.store, &mut h.scheduler, now));

    assert_eq!(h.store.all().len(), 2);
    assert_eq!(h.store.get(ids[0]).expect("edited").title, "First, renamed");
    assert_eq!(h.store.get(ids[1]).expect("untouched").title, "Second");
}

#[test]
fn task_due_at_local_midnight_is_today_all_day() {
    let morning = local(2024, 6, 20, 0, 0);
    let mut h = harness(morning);
    let midnight = start_of_day(morning, paris());
    assert_eq!(midnight, morning);

    h.view.dispatch(ViewAction::BeginNew, morning);
    h.view.dispatch(ViewAction::SetTitle("Midnight".to_string()), morning);
    h.view.dispatch(ViewAction::SetDeadline(midnight), morning);
    assert!(h.view.add_task(&mut h.store, &mut h.scheduler, morning));

    for hour in [0, 8, 15, 23] {
        let now = local(2024, 6, 20, hour, 59);
        let today = h.store.query(&Filter::for_tab(Tab::Today, now, paris()));
        let failed = h.store.query(&Filter::for_tab(Tab::Failed, now, paris()));
        assert_eq!(today.len(), 1, "hour {hour}");
        assert!(failed.is_empty(), "hour {hour}");
    }

    let next_day = local(2024, 6, 21, 0, 0);
    let failed = h.store.query(&Filter::for_tab(Tab::Failed, next_day, paris()));
    assert_eq!(failed.len(), 1);
}

#[test]
fn reminder_toggle_keeps_at_most_one_notification() {
    let now = local(2024, 6, 20, 7, 0);
    let mut h = harness(now);

    h.view.dispatch(ViewAction::BeginNew, now);
    h.view.dispatch(ViewAction::SetTitle("Call mum".to_string()), now);
    h.view.dispatch(ViewAction::SetReminderOn(true), now);
    h.view.dispatch(ViewAction::SetReminderDate(local(2024, 6, 20, 18, 0)), now);
    let saved = h
        .view
        .try_add_task(&mut h.store, &mut h.scheduler, now)
        .expect("save");
    assert_eq!(h.scheduler.pending_for(saved.id).len(), 1);

    h.view.dispatch(ViewAction::BeginEdit(saved.id), now);
    h.view.setup_task(&h.store).expect("setup");
    h.view.dispatch(ViewAction::SetReminderDate(local(2024, 6, 20, 19, 0)), now);
    assert!(h.view.add_task(&mut h.store, &mut h.scheduler, now));
    let pending = h.scheduler.pending_for(saved.id);
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].trigger.hour, 19);

    h.view.dispatch(ViewAction::SetReminderOn(false), now);
    assert!(h.view.add_task(&mut h.store, &mut h.scheduler, now));
    assert!(h.scheduler.pending_for(saved.id).is_empty());

    h.view.dispatch(ViewAction::SetReminderOn(true), now);
    assert!(h.view.add_task(&mut h.store, &mut h.scheduler, now));
    assert_eq!(h.scheduler.pending_for(saved.id).len(), 1);
}

#[test]
fn deleting_edited_task_clears_queries_and_reminder() {
    let now = local(2024, 6, 20, 7, 0);
    let mut h = harness(now);

    h.view.dispatch(ViewAction::BeginNew, now);
    h.view.dispatch(ViewAction::SetTitle("Old chore".to_string()), now);
    h.view.dispatch(ViewAction::SetReminderOn(true), now);
    h.view.dispatch(ViewAction::SetReminderDate(now + Duration::hours(2)), now);
    let saved = h
        .view
        .try_add_task(&mut h.store, &mut h.scheduler, now)
        .expect("save");
    h.store.set_completed(saved.id, true, now).expect("complete");
    assert_eq!(
        h.store.query(&Filter::for_tab(Tab::Completed, now, paris())).len(),
        1
    );

    h.view.dispatch(ViewAction::BeginEdit(saved.id), now);
    h.view.setup_task(&h.store).expect("setup");
    h.view
        .delete_edit_task(&mut h.store, &mut h.scheduler)
        .expect("delete");

    assert_eq!(h.view.edit_task(), None);
    assert!(!h.view.open_edit_task());
    for tab in Tab::ALL {
        assert!(h.store.query(&Filter::for_tab(tab, now, paris())).is_empty());
    }
    assert!(h.scheduler.pending_for(saved.id).is_empty());
}

#[test]
fn saved_fields_round_trip_through_setup() {
    let now = local(2024, 6, 20, 7, 0);
    let mut h = harness(now);

    h.view.dispatch(ViewAction::BeginNew, now);
    h.view.dispatch(ViewAction::SetTitle("Dentist".to_string()), now);
    h.view.dispatch(ViewAction::SetColor(TaskColor::Purple), now);
    h.view.dispatch(ViewAction::SetType(TaskType::Important), now);
    h.view.dispatch(ViewAction::SetDeadline(local(2024, 7, 2, 14, 15)), now);
    h.view.dispatch(ViewAction::SetReminderOn(true), now);
    h.view.dispatch(ViewAction::SetReminderDate(local(2024, 7, 2, 13, 0)), now);
    h.view.dispatch(ViewAction::SetReminderText("Bring the card".to_string()), now);
    let draft = h.view.draft().clone();
    let saved = h
        .view
        .try_add_task(&mut h.store, &mut h.scheduler, now)
        .expect("save");
    h.view.dispatch(ViewAction::CloseEditor, now);

    let reopened = DataStore::open(&h.store.data_dir).expect("reopen");
    h.view.dispatch(ViewAction::BeginEdit(saved.id), now);
    h.view.setup_task(&reopened).expect("setup");

    assert_eq!(h.view.draft(), &draft);
}

#[test]
fn pay_rent_example_lands_in_today_with_one_trigger() {
    let now = local(2024, 6, 20, 7, 0);
    let mut h = harness(now);

    h.view.dispatch(ViewAction::BeginNew, now);
    h.view.setup_task(&h.store).expect("setup");
    for action in [
        ViewAction::SetTitle("Pay rent".to_string()),
        ViewAction::SetColor(TaskColor::Red),
        ViewAction::SetType(TaskType::Urgent),
        ViewAction::SetDeadline(local(2024, 6, 20, 9, 0)),
        ViewAction::SetReminderOn(true),
        ViewAction::SetReminderDate(local(2024, 6, 20, 8, 30)),
        ViewAction::SetReminderText("Rent due".to_string()),
    ] {
        h.view.dispatch(action, now);
    }
    let saved = h
        .view
        .try_add_task(&mut h.store, &mut h.scheduler, now)
        .expect("save");

    let listing = list::render(&h.store, h.view.current_tab(), now, paris(), |t| t.title.clone());
    assert_eq!(listing, Listing::Items(vec!["Pay rent".to_string()]));

    let pending = h.scheduler.pending_for(saved.id);
    assert_eq!(pending.len(), 1);
    assert_eq!(
        pending[0].trigger,
        TriggerComponents {
            year: 2024,
            month: 6,
            day: 20,
            hour: 8,
            minute: 30,
        }
    );
    assert_eq!(pending[0].body, "Rent due");
    assert_eq!(pending[0].title, "Pay rent");
}

#[test]
fn denied_notifications_still_save() {
    let now = local(2024, 6, 20, 7, 0);
    let temp = tempdir().expect("tempdir");
    let mut store = DataStore::open(temp.path()).expect("open");
    let mut scheduler =
        ReminderScheduler::new(SpoolCenter::open(temp.path(), false).expect("spool"), paris());
    scheduler.request_access();

    let mut view = TaskViewState::new(Tab::Today, now);
    view.pump_notifications(&mut scheduler);
    assert!(!view.notification_access());

    view.dispatch(ViewAction::SetTitle("Quiet task".to_string()), now);
    view.dispatch(ViewAction::SetReminderOn(true), now);
    let saved = view
        .try_add_task(&mut store, &mut scheduler, now)
        .expect("save despite denied notifications");

    assert!(store.get(saved.id).is_some());
    assert!(scheduler.pending_for(saved.id).is_empty());
}
