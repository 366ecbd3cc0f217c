use std::io::{BufRead, Write};

use anyhow::{Context, anyhow};
use chrono::NaiveDateTime;
use tracing::{debug, info, instrument};

use crate::calendar::CalendarCursor;
use crate::cli::{AddArgs, CalendarArgs, Command, ListArgs, ModifyArgs};
use crate::config::Config;
use crate::datastore::TaskStore;
use crate::dates::{parse_local_date, parse_year_month};
use crate::filter::{DateFilter, DifficultyFilter, StatusFilter};
use crate::render::Renderer;
use crate::report::ReportScope;
use crate::task::{Difficulty, NewTask, Status, TaskPatch};
use crate::view::{ActiveView, Board, Intent, StatCard};

#[instrument(skip(board, cfg, renderer, command, out, input))]
pub fn dispatch<S, W, R>(
    board: &mut Board<S>,
    cfg: &Config,
    renderer: &Renderer,
    command: Command,
    now: NaiveDateTime,
    out: &mut W,
    input: &mut R,
) -> anyhow::Result<()>
where
    S: TaskStore,
    W: Write,
    R: BufRead,
{
    debug!(?command, %now, "dispatching command");

    match command {
        Command::List(args) => cmd_list(board, renderer, args, now, out),
        Command::Add(args) => cmd_add(board, renderer, args, out),
        Command::Modify(args) => cmd_modify(board, renderer, args, out),
        Command::Delete { id, yes } => cmd_delete(board, &id, yes, out, input),
        Command::Calendar(args) => cmd_calendar(board, renderer, args, now, out),
        Command::Report { scope, month } => {
            cmd_report(board, cfg, renderer, scope.as_deref(), month.as_deref(), now, out)
        }
        Command::Stats { card } => cmd_stats(board, renderer, card.as_deref(), now, out),
        Command::Version => {
            writeln!(out, "{}", env!("CARGO_PKG_VERSION"))?;
            Ok(())
        }
    }
}

#[instrument(skip(board, renderer, args, now, out))]
fn cmd_list<S: TaskStore, W: Write>(
    board: &mut Board<S>,
    renderer: &Renderer,
    args: ListArgs,
    now: NaiveDateTime,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command list");

    if let Some(raw) = args.status {
        board.dispatch(Intent::SetStatusFilter(StatusFilter::parse(&raw)?));
    }
    if let Some(raw) = args.difficulty {
        board.dispatch(Intent::SetDifficultyFilter(DifficultyFilter::parse(&raw)?));
    }
    if let Some(raw) = args.date {
        board.dispatch(Intent::SetDateFilter(DateFilter::parse(&raw)?));
    }
    board.dispatch(Intent::ShowView(ActiveView::Grid));

    print_grid(board, renderer, now, out)
}

#[instrument(skip(board, renderer, args, out))]
fn cmd_add<S: TaskStore, W: Write>(
    board: &mut Board<S>,
    renderer: &Renderer,
    args: AddArgs,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command add");

    let new = NewTask {
        title: args.title,
        description: args.description.unwrap_or_default(),
        status: args
            .status
            .as_deref()
            .map(Status::from_str_loose)
            .transpose()?
            .unwrap_or(Status::Todo),
        start_date: parse_optional_date(args.start.as_deref(), "--start")?,
        due_date: parse_optional_date(args.due.as_deref(), "--due")?,
        difficulty: args
            .difficulty
            .as_deref()
            .map(Difficulty::from_str_loose)
            .transpose()?,
    };

    let task = board.create(new)?;
    writeln!(out, "Created task {}.", task.id)?;
    renderer.print_task_detail(&mut *out, &task)?;
    Ok(())
}

#[instrument(skip(board, renderer, args, out))]
fn cmd_modify<S: TaskStore, W: Write>(
    board: &mut Board<S>,
    renderer: &Renderer,
    args: ModifyArgs,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command modify");

    let id = resolve_task_id(board, &args.id)?;
    let patch = TaskPatch {
        title: args.title,
        description: args.description,
        status: args
            .status
            .as_deref()
            .map(Status::from_str_loose)
            .transpose()?,
        start_date: date_change(args.start.as_deref(), args.clear_start, "--start")?,
        due_date: date_change(args.due.as_deref(), args.clear_due, "--due")?,
        difficulty: if args.clear_difficulty {
            Some(None)
        } else {
            args.difficulty
                .as_deref()
                .map(|raw| Difficulty::from_str_loose(raw).map(Some))
                .transpose()?
        },
    };

    if patch.is_empty() {
        return Err(anyhow!("nothing to modify; pass at least one field flag"));
    }

    let task = board.update(&id, patch)?;
    writeln!(out, "Modified task {}.", task.id)?;
    renderer.print_task_detail(&mut *out, &task)?;
    Ok(())
}

#[instrument(skip(board, out, input))]
fn cmd_delete<S: TaskStore, W: Write, R: BufRead>(
    board: &mut Board<S>,
    raw_id: &str,
    yes: bool,
    out: &mut W,
    input: &mut R,
) -> anyhow::Result<()> {
    info!("command delete");

    let id = resolve_task_id(board, raw_id)?;
    let title = board
        .find(&id)
        .map(|task| task.title.clone())
        .unwrap_or_default();

    if !yes && !confirm(&format!("Delete task '{title}' ({id})?"), out, input)? {
        writeln!(out, "Not deleted.")?;
        return Ok(());
    }

    board.delete(&id)?;
    writeln!(out, "Deleted task {id}.")?;
    Ok(())
}

#[instrument(skip(board, renderer, args, now, out))]
fn cmd_calendar<S: TaskStore, W: Write>(
    board: &mut Board<S>,
    renderer: &Renderer,
    args: CalendarArgs,
    now: NaiveDateTime,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command calendar");

    board.dispatch(Intent::ShowView(ActiveView::Calendar));
    if let Some(raw) = args.month.as_deref() {
        let (year, month) = parse_year_month(raw)?;
        board.dispatch(Intent::CalendarShowMonth(CalendarCursor::new(year, month)?));
    }
    for _ in 0..args.prev {
        board.dispatch(Intent::CalendarPrevious);
    }
    for _ in 0..args.next {
        board.dispatch(Intent::CalendarNext);
    }

    if let Some(raw) = args.day.as_deref() {
        let day = parse_local_date(raw).context("invalid --day")?;
        board.dispatch(Intent::SelectDay(day));
        return print_grid(board, renderer, now, out);
    }

    renderer.print_calendar(&mut *out, board.view().calendar(), board.tasks(), now)
}

#[instrument(skip(board, cfg, renderer, now, out))]
fn cmd_report<S: TaskStore, W: Write>(
    board: &mut Board<S>,
    cfg: &Config,
    renderer: &Renderer,
    scope: Option<&str>,
    month: Option<&str>,
    now: NaiveDateTime,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command report");

    let scope = match scope {
        Some(raw) => ReportScope::parse(raw)?,
        None => cfg.report_scope(),
    };
    board.dispatch(Intent::ShowView(ActiveView::Report));
    board.dispatch(Intent::SetReportScope(scope));
    if let Some(raw) = month {
        let (year, month) = parse_year_month(raw)?;
        board.dispatch(Intent::ReportShowMonth(CalendarCursor::new(year, month)?));
    }

    let stats = board.report(now)?;
    let view = board.view();
    renderer.print_report(&mut *out, view.report_scope(), view.report_cursor(), &stats)
}

#[instrument(skip(board, renderer, now, out))]
fn cmd_stats<S: TaskStore, W: Write>(
    board: &mut Board<S>,
    renderer: &Renderer,
    card: Option<&str>,
    now: NaiveDateTime,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command stats");

    let Some(raw) = card else {
        return renderer.print_panel_stats(&mut *out, &board.panel_stats(now));
    };

    board.dispatch(Intent::ClickStatCard(StatCard::parse(raw)?));
    print_grid(board, renderer, now, out)
}

fn print_grid<S: TaskStore, W: Write>(
    board: &Board<S>,
    renderer: &Renderer,
    now: NaiveDateTime,
    out: &mut W,
) -> anyhow::Result<()> {
    let visible = board.visible_tasks(now);
    debug!(visible = visible.len(), total = board.tasks().len(), "rendering grid");
    renderer.print_task_grid(&mut *out, &visible, board.view().filter(), now)
}

/// Accepts a full id or a unique prefix such as the short id shown in the
/// grid.
fn resolve_task_id<S: TaskStore>(board: &Board<S>, raw: &str) -> anyhow::Result<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(anyhow!("task id cannot be empty"));
    }
    if board.find(raw).is_some() {
        return Ok(raw.to_string());
    }

    let mut matches = board.tasks().iter().filter(|task| task.id.starts_with(raw));
    match (matches.next(), matches.next()) {
        (Some(task), None) => Ok(task.id.clone()),
        (Some(_), Some(_)) => Err(anyhow!("task id prefix is ambiguous: {raw}")),
        (None, _) => Err(anyhow!("task not found: {raw}")),
    }
}

fn parse_optional_date(
    raw: Option<&str>,
    flag: &str,
) -> anyhow::Result<Option<chrono::NaiveDate>> {
    raw.map(|value| parse_local_date(value).with_context(|| format!("invalid {flag}")))
        .transpose()
}

fn date_change(
    raw: Option<&str>,
    clear: bool,
    flag: &str,
) -> anyhow::Result<Option<Option<chrono::NaiveDate>>> {
    if clear {
        return Ok(Some(None));
    }
    Ok(parse_optional_date(raw, flag)?.map(Some))
}

fn confirm<W: Write, R: BufRead>(prompt: &str, out: &mut W, input: &mut R) -> anyhow::Result<bool> {
    write!(out, "{prompt} [y/N] ")?;
    out.flush()?;

    let mut answer = String::new();
    input
        .read_line(&mut answer)
        .context("failed reading confirmation")?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
