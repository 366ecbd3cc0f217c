use std::fmt;
use std::sync::OnceLock;

use anyhow::anyhow;
use chrono::{
  Duration,
  NaiveDate,
  NaiveDateTime
};
use regex::Regex;
use tracing::trace;

use crate::dates::{
  format_date_to_input,
  parse_local_date,
  start_of_day
};
use crate::task::{
  Difficulty,
  Status,
  Task
};

pub const UPCOMING_WINDOW_DAYS: i64 = 7;

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default,
)]
pub enum StatusFilter {
  #[default]
  All,
  Only(Status)
}

impl StatusFilter {
  pub fn parse(
    raw: &str
  ) -> anyhow::Result<Self> {
    if raw.trim().eq_ignore_ascii_case("all")
    {
      return Ok(Self::All);
    }
    Ok(Self::Only(
      Status::from_str_loose(raw)?
    ))
  }

  fn accepts(
    &self,
    task: &Task
  ) -> bool {
    match self {
      | Self::All => true,
      | Self::Only(status) => {
        task.status == *status
      }
    }
  }
}

impl fmt::Display for StatusFilter {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    match self {
      | Self::All => f.write_str("all"),
      | Self::Only(status) => {
        write!(f, "{status}")
      }
    }
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default,
)]
pub enum DifficultyFilter {
  #[default]
  All,
  Only(Difficulty)
}

impl DifficultyFilter {
  pub fn parse(
    raw: &str
  ) -> anyhow::Result<Self> {
    if raw.trim().eq_ignore_ascii_case("all")
    {
      return Ok(Self::All);
    }
    Ok(Self::Only(
      Difficulty::from_str_loose(raw)?
    ))
  }

  fn accepts(
    &self,
    task: &Task
  ) -> bool {
    match self {
      | Self::All => true,
      | Self::Only(difficulty) => {
        task.difficulty
          == Some(*difficulty)
      }
    }
  }
}

impl fmt::Display for DifficultyFilter {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    match self {
      | Self::All => f.write_str("all"),
      | Self::Only(difficulty) => {
        write!(f, "{difficulty}")
      }
    }
  }
}

/// Date dimension. The modes are
/// mutually exclusive; `Day` is what a
/// calendar click selects.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default,
)]
pub enum DateFilter {
  #[default]
  All,
  Overdue,
  Upcoming,
  NotStarted,
  Day(NaiveDate)
}

fn literal_day_pattern()
-> anyhow::Result<&'static Regex> {
  static PATTERN: OnceLock<
    Result<Regex, regex::Error>
  > = OnceLock::new();
  PATTERN
    .get_or_init(|| {
      Regex::new(r"^\d{4}-\d{2}-\d{2}$")
    })
    .as_ref()
    .map_err(|e| {
      anyhow!(
        "internal regex compile \
         failure: {e}"
      )
    })
}

impl DateFilter {
  pub fn parse(
    raw: &str
  ) -> anyhow::Result<Self> {
    let trimmed = raw.trim();
    if literal_day_pattern()?
      .is_match(trimmed)
    {
      return Ok(Self::Day(
        parse_local_date(trimmed)?
      ));
    }

    match trimmed
      .to_ascii_lowercase()
      .as_str()
    {
      | "all" => Ok(Self::All),
      | "overdue" => Ok(Self::Overdue),
      | "upcoming" => Ok(Self::Upcoming),
      | "not-started"
      | "not_started"
      | "notstarted" => {
        Ok(Self::NotStarted)
      }
      | other => {
        Err(anyhow!(
          "unknown date filter: \
           {other} (expected all, \
           overdue, upcoming, \
           not-started or \
           YYYY-MM-DD)"
        ))
      }
    }
  }

  fn accepts(
    &self,
    task: &Task,
    now: NaiveDateTime
  ) -> bool {
    match self {
      | Self::All => true,
      | Self::Day(day) => {
        task.start_date == Some(*day)
          || task.due_date == Some(*day)
      }
      | Self::Overdue => {
        is_overdue(task, now)
      }
      | Self::Upcoming => {
        is_upcoming(task, now)
      }
      | Self::NotStarted => {
        is_not_started(task, now)
      }
    }
  }
}

impl fmt::Display for DateFilter {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    match self {
      | Self::All => f.write_str("all"),
      | Self::Overdue => {
        f.write_str("overdue")
      }
      | Self::Upcoming => {
        f.write_str("upcoming")
      }
      | Self::NotStarted => {
        f.write_str("not-started")
      }
      | Self::Day(day) => {
        f.write_str(
          &format_date_to_input(*day)
        )
      }
    }
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default,
)]
pub struct FilterState {
  pub status:     StatusFilter,
  pub difficulty: DifficultyFilter,
  pub date:       DateFilter
}

impl FilterState {
  pub fn has_active_filters(
    &self
  ) -> bool {
    self.difficulty
      != DifficultyFilter::All
      || self.date != DateFilter::All
  }

  /// Clears difficulty and date; the
  /// status selection is kept.
  pub fn reset_advanced(&mut self) {
    self.difficulty =
      DifficultyFilter::All;
    self.date = DateFilter::All;
  }

  pub fn matches(
    &self,
    task: &Task,
    now: NaiveDateTime
  ) -> bool {
    let ok = self.status.accepts(task)
      && self.difficulty.accepts(task)
      && self.date.accepts(task, now);

    trace!(id = %task.id, status = %self.status, difficulty = %self.difficulty, date = %self.date, ok, "filter evaluation");
    ok
  }
}

/// Due date has passed and the task is
/// still open.
pub fn is_overdue(
  task: &Task,
  now: NaiveDateTime
) -> bool {
  if task.is_completed() {
    return false;
  }
  task
    .due_date
    .map(|due| start_of_day(due) < now)
    .unwrap_or(false)
}

pub fn is_upcoming(
  task: &Task,
  now: NaiveDateTime
) -> bool {
  if task.is_completed() {
    return false;
  }
  let horizon = now
    + Duration::days(
      UPCOMING_WINDOW_DAYS
    );
  task
    .due_date
    .map(|due| {
      let due = start_of_day(due);
      now <= due && due <= horizon
    })
    .unwrap_or(false)
}

pub fn is_not_started(
  task: &Task,
  now: NaiveDateTime
) -> bool {
  task
    .start_date
    .map(|start| {
      start_of_day(start) > now
    })
    .unwrap_or(false)
}

/// Stable filter: keeps the input order.
#[tracing::instrument(skip(
  tasks, state, now
), fields(count = tasks.len(), status = %state.status, difficulty = %state.difficulty, date = %state.date))]
pub fn filter_tasks(
  tasks: &[Task],
  state: &FilterState,
  now: NaiveDateTime
) -> Vec<Task> {
  tasks
    .iter()
    .filter(|task| {
      state.matches(task, now)
    })
    .cloned()
    .collect()
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    TimeZone,
    Utc
  };

  use super::*;
  use crate::task::NewTask;

  fn date(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  fn at(
    y: i32,
    m: u32,
    d: u32,
    h: u32
  ) -> NaiveDateTime {
    date(y, m, d)
      .and_hms_opt(h, 0, 0)
      .expect("valid time")
  }

  fn task(
    id: &str,
    start: Option<NaiveDate>,
    due: Option<NaiveDate>
  ) -> Task {
    let created = Utc
      .with_ymd_and_hms(
        2024, 1, 1, 0, 0, 0
      )
      .unwrap();
    let mut new = NewTask::titled(
      format!("task {id}")
    );
    new.start_date = start;
    new.due_date = due;
    Task::from_new(
      id.to_string(),
      new,
      created
    )
  }

  fn ids(tasks: &[Task]) -> Vec<&str> {
    tasks
      .iter()
      .map(|t| t.id.as_str())
      .collect()
  }

  fn sample_tasks() -> Vec<Task> {
    let mut a = task(
      "a",
      Some(date(2024, 1, 1)),
      Some(date(2024, 1, 5))
    );
    a.difficulty = Some(Difficulty::High);
    let mut b = task(
      "b",
      None,
      Some(date(2024, 1, 14))
    );
    b.status = Status::InProgress;
    b.difficulty = Some(Difficulty::Low);
    let mut c = task(
      "c",
      Some(date(2024, 1, 20)),
      None
    );
    c.status = Status::Completed;
    let d = task("d", None, None);
    vec![a, b, c, d]
  }

  #[test]
  fn all_dimensions_all_returns_input() {
    let tasks = sample_tasks();
    let out = filter_tasks(
      &tasks,
      &FilterState::default(),
      at(2024, 1, 10, 12)
    );
    assert_eq!(out, tasks);
  }

  #[test]
  fn overdue_scenario_respects_completion()
   {
    let now = at(2024, 1, 10, 0);
    let mut tasks = vec![task(
      "1",
      None,
      Some(date(2024, 1, 5))
    )];
    let state = FilterState {
      date: DateFilter::Overdue,
      ..FilterState::default()
    };

    assert_eq!(
      ids(&filter_tasks(
        &tasks, &state, now
      )),
      vec!["1"]
    );

    tasks[0].status = Status::Completed;
    assert!(
      filter_tasks(&tasks, &state, now)
        .is_empty()
    );
  }

  #[test]
  fn upcoming_window_is_seven_days() {
    let now = at(2024, 1, 10, 0);
    let tasks = vec![
      task(
        "today",
        None,
        Some(date(2024, 1, 10))
      ),
      task(
        "edge",
        None,
        Some(date(2024, 1, 17))
      ),
      task(
        "beyond",
        None,
        Some(date(2024, 1, 18))
      ),
      task(
        "past",
        None,
        Some(date(2024, 1, 9))
      ),
      task("none", None, None),
    ];
    let state = FilterState {
      date: DateFilter::Upcoming,
      ..FilterState::default()
    };
    assert_eq!(
      ids(&filter_tasks(
        &tasks, &state, now
      )),
      vec!["today", "edge"]
    );
  }

  #[test]
  fn completed_never_overdue_or_upcoming()
   {
    let now = at(2024, 1, 10, 8);
    let mut past = task(
      "past",
      None,
      Some(date(2024, 1, 1))
    );
    past.status = Status::Completed;
    let mut soon = task(
      "soon",
      None,
      Some(date(2024, 1, 12))
    );
    soon.status = Status::Completed;

    assert!(!is_overdue(&past, now));
    assert!(!is_upcoming(&soon, now));
  }

  #[test]
  fn not_started_uses_start_date() {
    let now = at(2024, 1, 10, 9);
    let tasks = vec![
      task(
        "future",
        Some(date(2024, 1, 11)),
        None
      ),
      task(
        "today",
        Some(date(2024, 1, 10)),
        None
      ),
      task(
        "due-only",
        None,
        Some(date(2024, 2, 1))
      ),
    ];
    let state = FilterState {
      date: DateFilter::NotStarted,
      ..FilterState::default()
    };
    assert_eq!(
      ids(&filter_tasks(
        &tasks, &state, now
      )),
      vec!["future"]
    );
  }

  #[test]
  fn literal_day_matches_start_or_due()
  {
    let tasks = vec![
      task(
        "starts",
        Some(date(2024, 6, 15)),
        None
      ),
      task(
        "ends",
        Some(date(2024, 6, 1)),
        Some(date(2024, 6, 15))
      ),
      task(
        "other",
        Some(date(2024, 6, 14)),
        Some(date(2024, 6, 16))
      ),
    ];
    let state = FilterState {
      date: DateFilter::Day(date(
        2024, 6, 15
      )),
      ..FilterState::default()
    };
    assert_eq!(
      ids(&filter_tasks(
        &tasks,
        &state,
        at(2030, 1, 1, 0)
      )),
      vec!["starts", "ends"]
    );
  }

  #[test]
  fn dimensions_combine_with_and() {
    let tasks = sample_tasks();
    let now = at(2024, 1, 10, 12);
    let state = FilterState {
      status:     StatusFilter::Only(
        Status::InProgress
      ),
      difficulty:
        DifficultyFilter::Only(
          Difficulty::Low
        ),
      date:       DateFilter::Upcoming
    };
    assert_eq!(
      ids(&filter_tasks(
        &tasks, &state, now
      )),
      vec!["b"]
    );

    let no_match = FilterState {
      difficulty:
        DifficultyFilter::Only(
          Difficulty::Medium
        ),
      ..FilterState::default()
    };
    assert!(
      filter_tasks(
        &tasks, &no_match, now
      )
      .is_empty()
    );
  }

  #[test]
  fn filtering_is_idempotent() {
    let tasks = sample_tasks();
    let now = at(2024, 1, 10, 12);
    for state in [
      FilterState::default(),
      FilterState {
        date: DateFilter::Overdue,
        ..FilterState::default()
      },
      FilterState {
        status: StatusFilter::Only(
          Status::Completed
        ),
        date: DateFilter::NotStarted,
        ..FilterState::default()
      },
    ] {
      let once =
        filter_tasks(&tasks, &state, now);
      let twice =
        filter_tasks(&once, &state, now);
      assert_eq!(once, twice);
    }
  }

  #[test]
  fn parses_filter_keywords() {
    assert_eq!(
      DateFilter::parse("2024-06-15")
        .unwrap(),
      DateFilter::Day(date(2024, 6, 15))
    );
    assert_eq!(
      DateFilter::parse("Not-Started")
        .unwrap(),
      DateFilter::NotStarted
    );
    assert!(
      DateFilter::parse("2024-6-15")
        .is_err()
    );
    assert!(
      DateFilter::parse("2024-02-30")
        .is_err()
    );
    assert_eq!(
      StatusFilter::parse("all")
        .unwrap(),
      StatusFilter::All
    );
    assert_eq!(
      DifficultyFilter::parse("high")
        .unwrap(),
      DifficultyFilter::Only(
        Difficulty::High
      )
    );
    assert_eq!(
      DateFilter::Day(date(2024, 6, 5))
        .to_string(),
      "2024-06-05"
    );
  }

  #[test]
  fn literal_day_pattern_is_shared() {
    let first = literal_day_pattern()
      .expect("pattern compiles");
    let second = literal_day_pattern()
      .expect("pattern compiles");
    assert!(std::ptr::eq(first, second));
    assert!(first.is_match("2024-06-15"));
    assert!(
      !first.is_match(" 2024-06-15x")
    );
  }

  #[test]
  fn reset_keeps_status() {
    let mut state = FilterState {
      status:     StatusFilter::Only(
        Status::Todo
      ),
      difficulty:
        DifficultyFilter::Only(
          Difficulty::High
        ),
      date:       DateFilter::Overdue
    };
    assert!(state.has_active_filters());
    state.reset_advanced();
    assert!(!state.has_active_filters());
    assert_eq!(
      state.status,
      StatusFilter::Only(Status::Todo)
    );
  }
}
