use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::instrument;

use crate::datastore::{DataStore, SubscriptionId};
use crate::filter::{Filter, Tab};
use crate::task::Task;

pub const EMPTY_PLACEHOLDER: &str = "No tasks found!!!";

/// What a tab shows: the rendered items, or the placeholder when nothing
/// matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listing<T> {
    Empty,
    Items(Vec<T>),
}

impl<T> Listing<T> {
    pub fn from_tasks<F>(tasks: &[Task], mut item_renderer: F) -> Self
    where
        F: FnMut(&Task) -> T,
    {
        if tasks.is_empty() {
            Listing::Empty
        } else {
            Listing::Items(tasks.iter().map(&mut item_renderer).collect())
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Listing::Empty)
    }

    pub fn items(&self) -> &[T] {
        match self {
            Listing::Empty => &[],
            Listing::Items(items) => items,
        }
    }
}

/// One-off projection of `tab` at `now`.
#[instrument(skip(store, now, tz, item_renderer))]
pub fn render<T, F>(store: &DataStore, tab: Tab, now: DateTime<Utc>, tz: Tz, item_renderer: F) -> Listing<T>
where
    F: FnMut(&Task) -> T,
{
    let filter = Filter::for_tab(tab, now, tz);
    Listing::from_tasks(&store.query(&filter), item_renderer)
}

/// Live projection of `tab`: `sink` receives a fresh listing now and after
/// every committed change to the tab's result. Day bounds are fixed at
/// `now`.
#[instrument(skip(store, now, tz, item_renderer, sink))]
pub fn watch<T, F, S>(
    store: &mut DataStore,
    tab: Tab,
    now: DateTime<Utc>,
    tz: Tz,
    mut item_renderer: F,
    mut sink: S,
) -> SubscriptionId
where
    T: 'static,
    F: FnMut(&Task) -> T + 'static,
    S: FnMut(Listing<T>) + 'static,
{
    let filter = Filter::for_tab(tab, now, tz);
    store.subscribe(
        filter,
        Box::new(move |tasks| sink(Listing::from_tasks(tasks, &mut item_renderer))),
    )
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use chrono::{Duration, TimeZone};
    use tempfile::tempdir;

    use super::*;
    use crate::task::TaskFields;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 20, 9, 0, 0).unwrap()
    }

    fn fields(title: &str, deadline: DateTime<Utc>) -> TaskFields {
        let mut fields = TaskFields::new(deadline);
        fields.title = title.to_string();
        fields
    }

    #[test]
    fn empty_tab_shows_placeholder_without_rendering() {
        let temp = tempdir().expect("tempdir");
        let store = DataStore::open(temp.path()).expect("open");
        let mut calls = 0;
        let listing = render(&store, Tab::Today, now(), chrono_tz::UTC, |t| {
            calls += 1;
            t.title.clone()
        });
        assert!(listing.is_empty());
        assert_eq!(calls, 0);
    }

    #[test]
    fn renders_matches_latest_first() {
        let temp = tempdir().expect("tempdir");
        let mut store = DataStore::open(temp.path()).expect("open");
        store.create(fields("morning", now()), now()).expect("create");
        store
            .create(fields("evening", now() + Duration::hours(10)), now())
            .expect("create");
        store
            .create(fields("next week", now() + Duration::days(7)), now())
            .expect("create");

        let listing = render(&store, Tab::Today, now(), chrono_tz::UTC, |t| t.title.clone());
        assert_eq!(listing.items(), &["evening".to_string(), "morning".to_string()]);
    }

    #[test]
    fn watch_pushes_listings_after_commits() {
        let temp = tempdir().expect("tempdir");
        let mut store = DataStore::open(temp.path()).expect("open");
        let seen: Rc<RefCell<Vec<Listing<String>>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);

        watch(
            &mut store,
            Tab::Failed,
            now(),
            chrono_tz::UTC,
            |t| t.title.clone(),
            move |listing| sink.borrow_mut().push(listing),
        );
        store
            .create(fields("missed", now() - Duration::days(2)), now())
            .expect("create");

        assert_eq!(
            *seen.borrow(),
            vec![Listing::Empty, Listing::Items(vec!["missed".to_string()])]
        );
    }
}
