use std::fmt;

use anyhow::anyhow;
use chrono::{NaiveDate, NaiveDateTime};
use tracing::debug;

use crate::calendar::CalendarCursor;
use crate::filter::{is_not_started, is_overdue};
use crate::task::{Difficulty, Status, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportScope {
    #[default]
    Monthly,
    All,
}

impl ReportScope {
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "monthly" | "month" => Ok(Self::Monthly),
            "all" => Ok(Self::All),
            other => Err(anyhow!("unknown report scope: {other} (expected monthly or all)")),
        }
    }
}

impl fmt::Display for ReportScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Monthly => f.write_str("monthly"),
            Self::All => f.write_str("all"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DifficultyBreakdown {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DifficultyShare {
    pub difficulty: Difficulty,
    pub count: usize,
    pub percent: f64,
}

impl DifficultyBreakdown {
    pub fn total(&self) -> usize {
        self.low + self.medium + self.high
    }

    /// Non-empty buckets with their share of the breakdown, for the
    /// distribution chart.
    pub fn shares(&self) -> Vec<DifficultyShare> {
        let total = self.total();
        if total == 0 {
            return Vec::new();
        }
        [
            (Difficulty::Low, self.low),
            (Difficulty::Medium, self.medium),
            (Difficulty::High, self.high),
        ]
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .map(|(difficulty, count)| DifficultyShare {
            difficulty,
            count,
            percent: count as f64 * 100.0 / total as f64,
        })
        .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stats {
    pub total: usize,
    pub completed: usize,
    pub todo: usize,
    pub in_progress: usize,
    pub overdue: usize,
    /// Mean `dueDate - startDate` in days, one decimal. Zero when no task in
    /// scope has both dates.
    pub avg_duration_days: f64,
    pub by_difficulty: DifficultyBreakdown,
}

impl Stats {
    pub fn completion_ratio(&self) -> Option<f64> {
        if self.total == 0 {
            return None;
        }
        Some(self.completed as f64 / self.total as f64)
    }

    pub fn completion_percent_label(&self) -> String {
        self.completion_ratio()
            .map(|ratio| format!("{}%", (ratio * 100.0).round() as i64))
            .unwrap_or_else(|| "N/A".to_string())
    }

    pub fn avg_duration_label(&self) -> String {
        if self.avg_duration_days <= 0.0 {
            "N/A".to_string()
        } else {
            format!("{:.1} days", self.avg_duration_days)
        }
    }
}

fn in_range(date: Option<NaiveDate>, first: NaiveDate, last: NaiveDate) -> bool {
    date.map(|d| first <= d && d <= last).unwrap_or(false)
}

/// Tasks a report covers. `All` passes the collection through; `Monthly`
/// keeps tasks whose start or due date falls inside the cursor's month.
pub fn scope_tasks<'a>(
    tasks: &'a [Task],
    scope: ReportScope,
    month: CalendarCursor,
) -> anyhow::Result<Vec<&'a Task>> {
    match scope {
        ReportScope::All => Ok(tasks.iter().collect()),
        ReportScope::Monthly => {
            let first = month.first_day()?;
            let last = month.last_day()?;
            Ok(tasks
                .iter()
                .filter(|task| {
                    in_range(task.start_date, first, last) || in_range(task.due_date, first, last)
                })
                .collect())
        }
    }
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[tracing::instrument(skip(tasks, now), fields(count = tasks.len()))]
pub fn compute_stats(
    tasks: &[Task],
    scope: ReportScope,
    year: i32,
    month: u32,
    now: NaiveDateTime,
) -> anyhow::Result<Stats> {
    let cursor = CalendarCursor::new(year, month)?;
    let scoped = scope_tasks(tasks, scope, cursor)?;

    let mut stats = Stats {
        total: scoped.len(),
        ..Stats::default()
    };

    let mut duration_sum = 0_i64;
    let mut duration_count = 0_usize;

    for task in &scoped {
        match task.status {
            Status::Completed => stats.completed += 1,
            Status::Todo => stats.todo += 1,
            Status::InProgress => stats.in_progress += 1,
        }

        if is_overdue(task, now) {
            stats.overdue += 1;
        }

        // Inverted dates from older records count as negative durations.
        if let (Some(start), Some(due)) = (task.start_date, task.due_date) {
            duration_sum += (due - start).num_days();
            duration_count += 1;
        }

        match task.difficulty {
            Some(Difficulty::Low) => stats.by_difficulty.low += 1,
            Some(Difficulty::Medium) => stats.by_difficulty.medium += 1,
            Some(Difficulty::High) => stats.by_difficulty.high += 1,
            None => {}
        }
    }

    if duration_count > 0 {
        stats.avg_duration_days = round_one_decimal(duration_sum as f64 / duration_count as f64);
    }

    debug!(
        %scope,
        year,
        month,
        total = stats.total,
        overdue = stats.overdue,
        avg_duration = stats.avg_duration_days,
        "computed report stats"
    );
    Ok(stats)
}

/// Counts shown on the stat cards beside the grid. Always computed over the
/// whole collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PanelStats {
    pub total: usize,
    pub completed: usize,
    pub overdue: usize,
    pub todo: usize,
    pub in_progress: usize,
    pub not_started: usize,
}

pub fn panel_stats(tasks: &[Task], now: NaiveDateTime) -> PanelStats {
    tasks.iter().fold(
        PanelStats {
            total: tasks.len(),
            ..PanelStats::default()
        },
        |mut acc, task| {
            match task.status {
                Status::Completed => acc.completed += 1,
                Status::Todo => acc.todo += 1,
                Status::InProgress => acc.in_progress += 1,
            }
            if is_overdue(task, now) {
                acc.overdue += 1;
            }
            if is_not_started(task, now) {
                acc.not_started += 1;
            }
            acc
        },
    )
}
