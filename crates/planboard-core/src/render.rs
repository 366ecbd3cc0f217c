use std::io::{self, IsTerminal, Write};

use chrono::{Datelike, NaiveDateTime};
use unicode_width::UnicodeWidthStr;

use crate::calendar::{CalendarCell, CalendarCursor, WEEKDAY_LABELS, is_today, tasks_for_day};
use crate::config::Config;
use crate::dates::format_date_readable;
use crate::filter::{FilterState, StatusFilter, is_overdue};
use crate::report::{PanelStats, ReportScope, Stats};
use crate::task::Task;

const SHORT_ID_LEN: usize = 8;
const CALENDAR_CELL_WIDTH: usize = 9;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    /// Colors only when the config allows it and stdout is a terminal.
    pub fn new(cfg: &Config) -> Self {
        Self {
            color: cfg.color() && io::stdout().is_terminal(),
        }
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip(self, out, tasks, filter, now), fields(count = tasks.len()))]
    pub fn print_task_grid<W: Write>(
        &self,
        mut out: W,
        tasks: &[Task],
        filter: &FilterState,
        now: NaiveDateTime,
    ) -> anyhow::Result<()> {
        if filter.has_active_filters() || filter.status != StatusFilter::All {
            writeln!(
                out,
                "Filters: status={} difficulty={} date={}",
                filter.status, filter.difficulty, filter.date
            )?;
        }

        if tasks.is_empty() {
            writeln!(out, "No tasks found.")?;
            return Ok(());
        }

        let headers = ["ID", "Title", "Status", "Difficulty", "Start", "Due"]
            .map(String::from)
            .to_vec();

        let rows = tasks
            .iter()
            .map(|task| {
                let due = task.due_date.map(format_date_readable).unwrap_or_default();
                let due = if is_overdue(task, now) {
                    self.paint(&due, "31")
                } else {
                    due
                };

                vec![
                    self.paint(short_id(&task.id), "33"),
                    task.title.clone(),
                    task.status.to_string(),
                    task.difficulty.map(|d| d.to_string()).unwrap_or_default(),
                    task.start_date.map(format_date_readable).unwrap_or_default(),
                    due,
                ]
            })
            .collect();

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, out, task))]
    pub fn print_task_detail<W: Write>(&self, mut out: W, task: &Task) -> anyhow::Result<()> {
        writeln!(out, "id          {}", task.id)?;
        writeln!(out, "title       {}", task.title)?;
        if !task.description.is_empty() {
            writeln!(out, "description {}", task.description)?;
        }
        writeln!(out, "status      {}", task.status)?;
        if let Some(difficulty) = task.difficulty {
            writeln!(out, "difficulty  {difficulty}")?;
        }
        if let Some(start) = task.start_date {
            writeln!(out, "start       {}", format_date_readable(start))?;
        }
        if let Some(due) = task.due_date {
            writeln!(out, "due         {}", format_date_readable(due))?;
        }
        writeln!(out, "created     {}", task.created_at.format("%Y-%m-%dT%H:%M:%SZ"))?;
        Ok(())
    }

    /// Month grid with `+n` (starting) and `-n` (ending) counts per day,
    /// followed by the agenda of non-empty days.
    #[tracing::instrument(skip(self, out, tasks, now))]
    pub fn print_calendar<W: Write>(
        &self,
        mut out: W,
        cursor: CalendarCursor,
        tasks: &[Task],
        now: NaiveDateTime,
    ) -> anyhow::Result<()> {
        let grid = cursor.grid()?;

        writeln!(out, "{}", cursor.title())?;
        for label in WEEKDAY_LABELS {
            write!(out, "{label:<CALENDAR_CELL_WIDTH$}")?;
        }
        writeln!(out)?;

        let mut agenda = Vec::new();
        for week in grid.chunks(7) {
            let mut days_line = String::new();
            let mut counts_line = String::new();

            for cell in week {
                let CalendarCell::Day(day) = cell else {
                    days_line.push_str(&" ".repeat(CALENDAR_CELL_WIDTH));
                    counts_line.push_str(&" ".repeat(CALENDAR_CELL_WIDTH));
                    continue;
                };

                let bucket = tasks_for_day(tasks, *day);
                let marker = if is_today(*day, now) { "*" } else { "" };
                let label = format!("{}{marker}", day.day());
                let counts = match (bucket.starting.len(), bucket.ending.len()) {
                    (0, 0) => String::new(),
                    (s, 0) => format!("+{s}"),
                    (0, e) => format!("-{e}"),
                    (s, e) => format!("+{s} -{e}"),
                };

                let label = if marker.is_empty() {
                    label
                } else {
                    self.paint(&label, "1;36")
                };
                days_line.push_str(&pad_visible(&label, CALENDAR_CELL_WIDTH));
                counts_line.push_str(&pad_visible(&counts, CALENDAR_CELL_WIDTH));

                if !bucket.is_empty() {
                    agenda.push((*day, bucket));
                }
            }

            writeln!(out, "{}", days_line.trim_end())?;
            writeln!(out, "{}", counts_line.trim_end())?;
        }

        for (day, bucket) in agenda {
            writeln!(out)?;
            let weekday = WEEKDAY_LABELS[day.weekday().num_days_from_monday() as usize];
            writeln!(out, "{weekday} {}", format_date_readable(day))?;
            for task in &bucket.starting {
                writeln!(out, "  starts  {}  {}", short_id(&task.id), task.title)?;
            }
            for task in &bucket.ending {
                writeln!(out, "  due     {}  {}", short_id(&task.id), task.title)?;
            }
        }

        Ok(())
    }

    #[tracing::instrument(skip(self, out, stats))]
    pub fn print_report<W: Write>(
        &self,
        mut out: W,
        scope: ReportScope,
        cursor: CalendarCursor,
        stats: &Stats,
    ) -> anyhow::Result<()> {
        match scope {
            ReportScope::Monthly => writeln!(out, "Report: {}", cursor.title())?,
            ReportScope::All => writeln!(out, "Report: all tasks")?,
        }

        let rows = vec![
            vec!["Total".to_string(), stats.total.to_string()],
            vec!["Completed".to_string(), stats.completed.to_string()],
            vec!["To do".to_string(), stats.todo.to_string()],
            vec!["In progress".to_string(), stats.in_progress.to_string()],
            vec!["Overdue".to_string(), stats.overdue.to_string()],
            vec!["Completion".to_string(), stats.completion_percent_label()],
            vec!["Avg duration".to_string(), stats.avg_duration_label()],
        ];
        write_table(&mut out, vec!["Metric".to_string(), "Value".to_string()], rows)?;

        let shares = stats.by_difficulty.shares();
        writeln!(out)?;
        writeln!(out, "Difficulty")?;
        if shares.is_empty() {
            writeln!(out, "  N/A")?;
        }
        for share in shares {
            writeln!(
                out,
                "  {:<7} {:>3}  {:>5.1}%",
                share.difficulty.to_string(),
                share.count,
                share.percent
            )?;
        }

        Ok(())
    }

    #[tracing::instrument(skip(self, out))]
    pub fn print_panel_stats<W: Write>(&self, mut out: W, panel: &PanelStats) -> anyhow::Result<()> {
        let rows = vec![
            vec!["all".to_string(), panel.total.to_string()],
            vec!["completed".to_string(), panel.completed.to_string()],
            vec!["overdue".to_string(), self.paint(&panel.overdue.to_string(), "31")],
            vec!["todo".to_string(), panel.todo.to_string()],
            vec!["in-progress".to_string(), panel.in_progress.to_string()],
            vec!["not-started".to_string(), panel.not_started.to_string()],
        ];
        write_table(&mut out, vec!["Card".to_string(), "Tasks".to_string()], rows)?;
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn short_id(id: &str) -> &str {
    id.char_indices()
        .nth(SHORT_ID_LEN)
        .map(|(idx, _)| &id[..idx])
        .unwrap_or(id)
}

fn pad_visible(cell: &str, width: usize) -> String {
    let visible = UnicodeWidthStr::width(strip_ansi(cell).as_str());
    format!("{cell}{}", " ".repeat(width.saturating_sub(visible)))
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    let header_line: Vec<String> = headers
        .iter()
        .zip(&widths)
        .map(|(header, width)| pad_visible(header, *width))
        .collect();
    writeln!(writer, "{}", header_line.join(" ").trim_end())?;

    let rule: Vec<String> = widths.iter().map(|width| "-".repeat(*width)).collect();
    writeln!(writer, "{}", rule.join(" "))?;

    for row in rows {
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, width)| pad_visible(cell, *width))
            .collect();
        writeln!(writer, "{}", line.join(" ").trim_end())?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
