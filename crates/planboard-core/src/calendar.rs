use anyhow::anyhow;
use chrono::{
  Datelike,
  NaiveDate,
  NaiveDateTime
};
use tracing::debug;

use crate::dates::{
  days_in_month,
  first_day_of_month,
  is_same_day,
  last_day_of_month,
  shift_months
};
use crate::task::Task;

pub const WEEKDAY_LABELS: [&str; 7] = [
  "Mon", "Tue", "Wed", "Thu", "Fri",
  "Sat", "Sun"
];

const MONTH_NAMES: [&str; 12] = [
  "January",
  "February",
  "March",
  "April",
  "May",
  "June",
  "July",
  "August",
  "September",
  "October",
  "November",
  "December"
];

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum CalendarCell {
  Empty,
  Day(NaiveDate)
}

impl CalendarCell {
  pub fn date(&self) -> Option<NaiveDate> {
    match self {
      | Self::Empty => None,
      | Self::Day(day) => Some(*day)
    }
  }
}

/// Monday-first month grid. Leading
/// `Empty` cells align day 1 under its
/// weekday; trailing ones complete the
/// last week.
#[tracing::instrument]
pub fn build_month_grid(
  year: i32,
  month: u32
) -> anyhow::Result<Vec<CalendarCell>> {
  let first =
    first_day_of_month(year, month)?;
  let lead = first
    .weekday()
    .num_days_from_monday()
    as usize;
  let day_count =
    days_in_month(year, month)? as usize;
  let total =
    (lead + day_count).div_ceil(7) * 7;

  let cells: Vec<CalendarCell> = (0
    ..total)
    .map(|idx| {
      if idx < lead
        || idx >= lead + day_count
      {
        return CalendarCell::Empty;
      }
      first
        .with_day((idx - lead + 1) as u32)
        .map(CalendarCell::Day)
        .unwrap_or(CalendarCell::Empty)
    })
    .collect();

  debug!(
    lead,
    day_count,
    cells = cells.len(),
    "built month grid"
  );
  Ok(cells)
}

#[derive(
  Debug, Clone, Default, PartialEq,
)]
pub struct DayBucket {
  pub starting: Vec<Task>,
  pub ending:   Vec<Task>
}

impl DayBucket {
  pub fn is_empty(&self) -> bool {
    self.starting.is_empty()
      && self.ending.is_empty()
  }
}

/// A task with `startDate == dueDate`
/// lands in both lists.
pub fn tasks_for_day(
  tasks: &[Task],
  day: NaiveDate
) -> DayBucket {
  DayBucket {
    starting: tasks
      .iter()
      .filter(|task| {
        task.start_date == Some(day)
      })
      .cloned()
      .collect(),
    ending:   tasks
      .iter()
      .filter(|task| {
        task.due_date == Some(day)
      })
      .cloned()
      .collect()
  }
}

pub fn is_today(
  day: NaiveDate,
  now: NaiveDateTime
) -> bool {
  is_same_day(&day, &now)
}

/// Displayed month of a calendar or
/// report view.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub struct CalendarCursor {
  year:  i32,
  month: u32
}

impl CalendarCursor {
  /// Fails for months outside 1..=12
  /// and for years chrono cannot
  /// represent.
  pub fn new(
    year: i32,
    month: u32
  ) -> anyhow::Result<Self> {
    if !(1..=12).contains(&month) {
      return Err(anyhow!(
        "month must be 1..=12, got \
         {month}"
      ));
    }
    first_day_of_month(year, month)?;
    Ok(Self {
      year,
      month
    })
  }

  pub fn containing(
    date: NaiveDate
  ) -> Self {
    Self {
      year:  date.year(),
      month: date.month()
    }
  }

  pub fn year(&self) -> i32 {
    self.year
  }

  pub fn month(&self) -> u32 {
    self.month
  }

  /// Leaves the cursor unchanged when
  /// the target month is out of range.
  pub fn shift(
    &mut self,
    step: i32
  ) -> anyhow::Result<()> {
    let (year, month) = shift_months(
      self.year, self.month, step
    )?;
    self.year = year;
    self.month = month;
    Ok(())
  }

  pub fn previous_month(
    &mut self
  ) -> anyhow::Result<()> {
    self.shift(-1)
  }

  pub fn next_month(
    &mut self
  ) -> anyhow::Result<()> {
    self.shift(1)
  }

  pub fn jump_to(
    &mut self,
    today: NaiveDate
  ) {
    *self = Self::containing(today);
  }

  pub fn set_month(
    &mut self,
    month: u32
  ) -> anyhow::Result<()> {
    *self = Self::new(self.year, month)?;
    Ok(())
  }

  pub fn set_year(
    &mut self,
    year: i32
  ) -> anyhow::Result<()> {
    *self = Self::new(year, self.month)?;
    Ok(())
  }

  pub fn first_day(
    &self
  ) -> anyhow::Result<NaiveDate> {
    first_day_of_month(
      self.year, self.month
    )
  }

  pub fn last_day(
    &self
  ) -> anyhow::Result<NaiveDate> {
    last_day_of_month(
      self.year, self.month
    )
  }

  pub fn grid(
    &self
  ) -> anyhow::Result<Vec<CalendarCell>>
  {
    build_month_grid(
      self.year, self.month
    )
  }

  pub fn title(&self) -> String {
    let name = MONTH_NAMES
      .get(self.month as usize - 1)
      .copied()
      .unwrap_or("?");
    format!("{name} {}", self.year)
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
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

  fn task(
    id: &str,
    start: Option<NaiveDate>,
    due: Option<NaiveDate>
  ) -> Task {
    let mut new = NewTask::titled(id);
    new.start_date = start;
    new.due_date = due;
    Task::from_new(
      id.to_string(),
      new,
      Utc
        .with_ymd_and_hms(
          2024, 1, 1, 0, 0, 0
        )
        .unwrap()
    )
  }

  #[test]
  fn february_2024_grid() {
    let grid =
      build_month_grid(2024, 2).unwrap();
    assert_eq!(grid.len(), 35);
    assert_eq!(
      grid[..3],
      [CalendarCell::Empty; 3]
    );
    assert_eq!(
      grid[3],
      CalendarCell::Day(date(2024, 2, 1))
    );
    assert_eq!(
      grid[31],
      CalendarCell::Day(date(
        2024, 2, 29
      ))
    );
    assert!(grid[32..].iter().all(
      |cell| *cell == CalendarCell::Empty
    ));
  }

  #[test]
  fn grid_sizes_round_to_full_weeks() {
    // Monday start, 28 days: exactly
    // four weeks.
    assert_eq!(
      build_month_grid(2021, 2)
        .unwrap()
        .len(),
      28
    );
    // Sunday start, 31 days: six weeks.
    let march_2020 =
      build_month_grid(2020, 3).unwrap();
    assert_eq!(march_2020.len(), 42);
    assert_eq!(
      march_2020[6],
      CalendarCell::Day(date(2020, 3, 1))
    );

    for month in 1..=12 {
      let grid =
        build_month_grid(2025, month)
          .unwrap();
      assert_eq!(grid.len() % 7, 0);
      let days = grid
        .iter()
        .filter_map(CalendarCell::date)
        .count() as u32;
      assert_eq!(
        days,
        days_in_month(2025, month)
          .unwrap()
      );
    }
  }

  #[test]
  fn invalid_month_is_an_error() {
    assert!(
      build_month_grid(2024, 0).is_err()
    );
    assert!(
      CalendarCursor::new(2024, 13)
        .is_err()
    );
  }

  #[test]
  fn same_day_task_lands_in_both_buckets()
   {
    let d = date(2024, 5, 7);
    let tasks = vec![
      task("both", Some(d), Some(d)),
      task(
        "other",
        Some(date(2024, 5, 6)),
        Some(date(2024, 5, 8))
      ),
      task("undated", None, None),
    ];

    let bucket = tasks_for_day(&tasks, d);
    assert_eq!(bucket.starting.len(), 1);
    assert_eq!(bucket.ending.len(), 1);
    assert_eq!(bucket.starting[0].id, "both");
    assert_eq!(bucket.ending[0].id, "both");

    let grid =
      build_month_grid(2024, 5).unwrap();
    for day in grid
      .iter()
      .filter_map(CalendarCell::date)
      .filter(|day| {
        *day != d
          && *day != date(2024, 5, 6)
          && *day != date(2024, 5, 8)
      })
    {
      assert!(
        tasks_for_day(&tasks, day)
          .is_empty()
      );
    }
  }

  #[test]
  fn today_detection() {
    let now = date(2024, 5, 7)
      .and_hms_opt(18, 30, 0)
      .unwrap();
    assert!(is_today(
      date(2024, 5, 7),
      now
    ));
    assert!(!is_today(
      date(2024, 5, 8),
      now
    ));
  }

  #[test]
  fn cursor_navigation_wraps_years() {
    let mut cursor =
      CalendarCursor::new(2024, 1)
        .unwrap();
    cursor.previous_month().unwrap();
    assert_eq!(
      (cursor.year(), cursor.month()),
      (2023, 12)
    );
    cursor.next_month().unwrap();
    cursor.next_month().unwrap();
    assert_eq!(
      (cursor.year(), cursor.month()),
      (2024, 2)
    );
    assert_eq!(
      cursor.title(),
      "February 2024"
    );

    cursor.set_month(11).unwrap();
    cursor.set_year(2030).unwrap();
    assert_eq!(
      cursor,
      CalendarCursor::new(2030, 11)
        .unwrap()
    );
    assert!(cursor.set_month(0).is_err());

    cursor.jump_to(date(2026, 10, 18));
    assert_eq!(
      (cursor.year(), cursor.month()),
      (2026, 10)
    );
    assert_eq!(
      cursor.last_day().unwrap(),
      date(2026, 10, 31)
    );
  }

  #[test]
  fn cursor_rejects_unrepresentable_years()
   {
    assert!(
      CalendarCursor::new(i32::MAX, 12)
        .is_err()
    );

    let max_year = NaiveDate::MAX.year();
    let mut cursor =
      CalendarCursor::new(max_year, 12)
        .unwrap();
    assert!(cursor.next_month().is_err());
    assert_eq!(
      (cursor.year(), cursor.month()),
      (max_year, 12)
    );
    assert!(
      cursor.set_year(i32::MIN).is_err()
    );
    assert_eq!(cursor.year(), max_year);

    cursor.previous_month().unwrap();
    assert_eq!(cursor.month(), 11);
  }
}
