use std::fmt;

use chrono::{
  DateTime,
  Utc
};
use chrono_tz::Tz;
use tracing::trace;

use crate::datetime::{
  start_of_day,
  start_of_next_day
};
use crate::task::Task;

/// The four mutually exclusive buckets
/// a task list can be viewed through.
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Hash
)]
pub enum Tab {
  #[default]
  Today,
  Upcoming,
  Failed,
  Completed
}

impl Tab {
  pub const ALL: [Tab; 4] = [
    Tab::Today,
    Tab::Upcoming,
    Tab::Failed,
    Tab::Completed
  ];

  /// Unknown names fall through to
  /// `Completed`.
  pub fn from_name(name: &str) -> Self {
    match name
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "today" => Tab::Today,
      | "upcoming" => Tab::Upcoming,
      | "failed" => Tab::Failed,
      | _ => Tab::Completed
    }
  }

  pub fn name(self) -> &'static str {
    match self {
      | Tab::Today => "Today",
      | Tab::Upcoming => "Upcoming",
      | Tab::Failed => "Failed",
      | Tab::Completed => "Completed"
    }
  }
}

impl fmt::Display for Tab {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.name())
  }
}

/// Deadline window plus completion
/// state. `from` is inclusive,
/// `before` exclusive.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub struct Filter {
  pub deadline_from:   Option<DateTime<Utc>>,
  pub deadline_before: Option<DateTime<Utc>>,
  pub completed:       bool
}

impl Filter {
  /// Everything, done or not. Used for
  /// id lookups.
  pub fn completed(
    completed: bool
  ) -> Self {
    Self {
      deadline_from: None,
      deadline_before: None,
      completed
    }
  }

  #[tracing::instrument(skip(now, tz))]
  pub fn for_tab(
    tab: Tab,
    now: DateTime<Utc>,
    tz: Tz
  ) -> Self {
    let today = start_of_day(now, tz);
    let tomorrow =
      start_of_next_day(now, tz);
    trace!(%today, %tomorrow, "derived day bounds");

    match tab {
      | Tab::Today => Self {
        deadline_from:   Some(today),
        deadline_before: Some(
          tomorrow
        ),
        completed:       false
      },
      | Tab::Upcoming => Self {
        deadline_from:   Some(
          tomorrow
        ),
        deadline_before: None,
        completed:       false
      },
      | Tab::Failed => Self {
        deadline_from:   None,
        deadline_before: Some(today),
        completed:       false
      },
      | Tab::Completed => {
        Self::completed(true)
      }
    }
  }

  pub fn matches(
    &self,
    task: &Task
  ) -> bool {
    if task.is_completed
      != self.completed
    {
      return false;
    }

    if let Some(from) =
      self.deadline_from
      && task.deadline < from
    {
      return false;
    }

    if let Some(before) =
      self.deadline_before
      && task.deadline >= before
    {
      return false;
    }

    true
  }
}

/// The single bucket `task` falls in
/// at `now`.
pub fn bucket_of(
  task: &Task,
  now: DateTime<Utc>,
  tz: Tz
) -> Tab {
  if task.is_completed {
    return Tab::Completed;
  }

  if task.deadline
    < start_of_day(now, tz)
  {
    Tab::Failed
  } else if task.deadline
    < start_of_next_day(now, tz)
  {
    Tab::Today
  } else {
    Tab::Upcoming
  }
}

/// Latest deadline first.
pub fn sort_by_deadline_desc(
  tasks: &mut [Task]
) {
  tasks.sort_by(|a, b| {
    b.deadline
      .cmp(&a.deadline)
      .then_with(|| {
        b.created.cmp(&a.created)
      })
  });
}

#[cfg(test)]
mod tests {
  use chrono::{
    Duration,
    TimeZone,
    Utc
  };
  use chrono_tz::Tz;

  use super::{
    Filter,
    Tab,
    bucket_of,
    sort_by_deadline_desc
  };
  use crate::datetime::start_of_day;
  use crate::task::{
    Task,
    TaskFields
  };

  fn tz() -> Tz {
    "Asia/Tokyo"
      .parse()
      .expect("valid tz")
  }

  fn task_due(
    title: &str,
    deadline: chrono::DateTime<Utc>
  ) -> Task {
    let mut fields =
      TaskFields::new(deadline);
    fields.title = title.to_string();
    Task::from_fields(fields, deadline)
  }

  #[test]
  fn unknown_tab_names_mean_completed()
  {
    assert_eq!(
      Tab::from_name("today"),
      Tab::Today
    );
    assert_eq!(
      Tab::from_name("Upcoming"),
      Tab::Upcoming
    );
    assert_eq!(
      Tab::from_name("Failed"),
      Tab::Failed
    );
    assert_eq!(
      Tab::from_name("Completed"),
      Tab::Completed
    );
    assert_eq!(
      Tab::from_name("archive"),
      Tab::Completed
    );
  }

  #[test]
  fn midnight_belongs_to_today() {
    let midday = Utc
      .with_ymd_and_hms(
        2024, 6, 20, 3, 0, 0
      )
      .unwrap();
    let midnight =
      start_of_day(midday, tz());
    let task =
      task_due("boundary", midnight);

    for offset in [0, 1, 6, 12, 23] {
      let now = midnight
        + Duration::hours(offset)
        + Duration::minutes(59);
      let today = Filter::for_tab(
        Tab::Today,
        now,
        tz()
      );
      let failed = Filter::for_tab(
        Tab::Failed,
        now,
        tz()
      );
      assert!(today.matches(&task));
      assert!(!failed.matches(&task));
      assert_eq!(
        bucket_of(&task, now, tz()),
        Tab::Today
      );
    }
  }

  #[test]
  fn each_task_matches_exactly_one_tab()
  {
    let now = Utc
      .with_ymd_and_hms(
        2024, 6, 20, 3, 0, 0
      )
      .unwrap();
    let sod = start_of_day(now, tz());
    let mut done = task_due(
      "done",
      sod - Duration::days(3)
    );
    done.is_completed = true;

    let tasks = [
      task_due(
        "overdue",
        sod - Duration::seconds(1)
      ),
      task_due("today", sod),
      task_due(
        "late today",
        sod + Duration::hours(23)
          + Duration::minutes(59)
      ),
      task_due(
        "tomorrow",
        sod + Duration::days(1)
      ),
      done
    ];

    for task in &tasks {
      let hits: Vec<Tab> = Tab::ALL
        .into_iter()
        .filter(|tab| {
          Filter::for_tab(*tab, now, tz())
            .matches(task)
        })
        .collect();
      assert_eq!(
        hits,
        vec![bucket_of(task, now, tz())],
        "task {}",
        task.title
      );
    }
  }

  #[test]
  fn sorts_latest_deadline_first() {
    let base = Utc
      .with_ymd_and_hms(
        2024, 6, 20, 3, 0, 0
      )
      .unwrap();
    let mut tasks = vec![
      task_due("a", base),
      task_due(
        "c",
        base + Duration::days(2)
      ),
      task_due(
        "b",
        base + Duration::days(1)
      ),
    ];
    sort_by_deadline_desc(&mut tasks);
    let titles: Vec<&str> = tasks
      .iter()
      .map(|t| t.title.as_str())
      .collect();
    assert_eq!(
      titles,
      vec!["c", "b", "a"]
    );
  }
}
