use std::fmt;

use anyhow::anyhow;
use chrono::{NaiveDate, NaiveDateTime};
use tracing::{debug, error, info, instrument, warn};

use crate::calendar::{CalendarCell, CalendarCursor};
use crate::datastore::TaskStore;
use crate::filter::{DateFilter, DifficultyFilter, FilterState, StatusFilter, filter_tasks};
use crate::report::{PanelStats, ReportScope, Stats, compute_stats, panel_stats};
use crate::task::{NewTask, Status, Task, TaskPatch, validate_new_task, validate_patched};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActiveView {
    #[default]
    Grid,
    Calendar,
    Report,
}

impl ActiveView {
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "grid" => Ok(Self::Grid),
            "calendar" => Ok(Self::Calendar),
            "report" => Ok(Self::Report),
            other => Err(anyhow!("unknown view: {other}")),
        }
    }
}

impl fmt::Display for ActiveView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Grid => f.write_str("grid"),
            Self::Calendar => f.write_str("calendar"),
            Self::Report => f.write_str("report"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatCard {
    All,
    Completed,
    Overdue,
    Todo,
    InProgress,
    NotStarted,
}

impl StatCard {
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "all" | "total" => Ok(Self::All),
            "completed" => Ok(Self::Completed),
            "overdue" => Ok(Self::Overdue),
            "todo" => Ok(Self::Todo),
            "in-progress" | "in_progress" => Ok(Self::InProgress),
            "not-started" | "not_started" => Ok(Self::NotStarted),
            other => Err(anyhow!("unknown stat card: {other}")),
        }
    }

    /// Status and date filters selected by clicking this card.
    fn filters(self) -> (StatusFilter, DateFilter) {
        match self {
            Self::All => (StatusFilter::All, DateFilter::All),
            Self::Completed => (StatusFilter::Only(Status::Completed), DateFilter::All),
            Self::Overdue => (StatusFilter::All, DateFilter::Overdue),
            Self::Todo => (StatusFilter::Only(Status::Todo), DateFilter::All),
            Self::InProgress => (StatusFilter::Only(Status::InProgress), DateFilter::All),
            Self::NotStarted => (StatusFilter::All, DateFilter::NotStarted),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    ShowView(ActiveView),
    SetStatusFilter(StatusFilter),
    SetDifficultyFilter(DifficultyFilter),
    SetDateFilter(DateFilter),
    ResetAdvancedFilters,
    /// A calendar day was clicked.
    SelectDay(NaiveDate),
    ClickStatCard(StatCard),
    CalendarPrevious,
    CalendarNext,
    CalendarToday(NaiveDate),
    /// Month/year selectors.
    CalendarShowMonth(CalendarCursor),
    ReportPrevious,
    ReportNext,
    ReportToday(NaiveDate),
    ReportShowMonth(CalendarCursor),
    SetReportScope(ReportScope),
}

/// UI-session state. Not persisted. Changed only through [`ViewState::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewState {
    filter: FilterState,
    active_view: ActiveView,
    calendar: CalendarCursor,
    report_cursor: CalendarCursor,
    report_scope: ReportScope,
}

impl ViewState {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            filter: FilterState::default(),
            active_view: ActiveView::Grid,
            calendar: CalendarCursor::containing(today),
            report_cursor: CalendarCursor::containing(today),
            report_scope: ReportScope::Monthly,
        }
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn active_view(&self) -> ActiveView {
        self.active_view
    }

    pub fn calendar(&self) -> CalendarCursor {
        self.calendar
    }

    pub fn report_cursor(&self) -> CalendarCursor {
        self.report_cursor
    }

    pub fn report_scope(&self) -> ReportScope {
        self.report_scope
    }

    pub fn apply(&mut self, intent: Intent) {
        debug!(?intent, "applying view intent");
        match intent {
            Intent::ShowView(view) => self.active_view = view,
            Intent::SetStatusFilter(status) => self.filter.status = status,
            Intent::SetDifficultyFilter(difficulty) => self.filter.difficulty = difficulty,
            Intent::SetDateFilter(date) => self.filter.date = date,
            Intent::ResetAdvancedFilters => self.filter.reset_advanced(),
            Intent::SelectDay(day) => {
                self.filter = FilterState {
                    status: StatusFilter::All,
                    difficulty: DifficultyFilter::All,
                    date: DateFilter::Day(day),
                };
                self.active_view = ActiveView::Grid;
            }
            Intent::ClickStatCard(card) => {
                let (status, date) = card.filters();
                self.filter = FilterState {
                    status,
                    difficulty: DifficultyFilter::All,
                    date,
                };
            }
            Intent::CalendarPrevious => keep_in_range(self.calendar.previous_month()),
            Intent::CalendarNext => keep_in_range(self.calendar.next_month()),
            Intent::CalendarToday(today) => self.calendar.jump_to(today),
            Intent::CalendarShowMonth(cursor) => self.calendar = cursor,
            Intent::ReportPrevious => keep_in_range(self.report_cursor.previous_month()),
            Intent::ReportNext => keep_in_range(self.report_cursor.next_month()),
            Intent::ReportToday(today) => self.report_cursor.jump_to(today),
            Intent::ReportShowMonth(cursor) => self.report_cursor = cursor,
            Intent::SetReportScope(scope) => self.report_scope = scope,
        }
    }
}

fn keep_in_range(moved: anyhow::Result<()>) {
    if let Err(err) = moved {
        warn!(error = %err, "month navigation out of range; staying put");
    }
}

/// Owns the local copy of the task collection and the view state.
///
/// Store calls are awaited before the local collection changes, so a failed
/// call leaves what is displayed untouched.
pub struct Board<S: TaskStore> {
    store: S,
    tasks: Vec<Task>,
    view: ViewState,
}

impl<S: TaskStore> Board<S> {
    #[instrument(skip(store))]
    pub fn load(store: S, today: NaiveDate) -> anyhow::Result<Self> {
        let tasks = store.list()?;
        info!(count = tasks.len(), "loaded board");
        Ok(Self {
            store,
            tasks,
            view: ViewState::new(today),
        })
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn dispatch(&mut self, intent: Intent) {
        self.view.apply(intent);
    }

    pub fn visible_tasks(&self, now: NaiveDateTime) -> Vec<Task> {
        filter_tasks(&self.tasks, &self.view.filter, now)
    }

    pub fn calendar_grid(&self) -> anyhow::Result<Vec<CalendarCell>> {
        self.view.calendar.grid()
    }

    pub fn report(&self, now: NaiveDateTime) -> anyhow::Result<Stats> {
        let cursor = self.view.report_cursor;
        compute_stats(
            &self.tasks,
            self.view.report_scope,
            cursor.year(),
            cursor.month(),
            now,
        )
    }

    pub fn panel_stats(&self, now: NaiveDateTime) -> PanelStats {
        panel_stats(&self.tasks, now)
    }

    pub fn find(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    #[instrument(skip(self))]
    pub fn reload(&mut self) -> anyhow::Result<()> {
        match self.store.list() {
            Ok(tasks) => {
                self.tasks = tasks;
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "reloading tasks failed; keeping current list");
                Err(err)
            }
        }
    }

    #[instrument(skip(self, new), fields(title = %new.title))]
    pub fn create(&mut self, new: NewTask) -> anyhow::Result<Task> {
        validate_new_task(&new)?;
        match self.store.create(new) {
            Ok(task) => {
                self.tasks.push(task.clone());
                Ok(task)
            }
            Err(err) => {
                error!(error = %err, "creating task failed");
                Err(err)
            }
        }
    }

    #[instrument(skip(self, patch))]
    pub fn update(&mut self, id: &str, patch: TaskPatch) -> anyhow::Result<Task> {
        let current = self
            .find(id)
            .ok_or_else(|| anyhow!("task not found: {id}"))?;
        validate_patched(current, &patch)?;

        match self.store.update(id, &patch) {
            Ok(updated) => {
                if let Some(slot) = self.tasks.iter_mut().find(|t| t.id == updated.id) {
                    *slot = updated.clone();
                }
                Ok(updated)
            }
            Err(err) => {
                error!(error = %err, "updating task failed");
                Err(err)
            }
        }
    }

    #[instrument(skip(self))]
    pub fn delete(&mut self, id: &str) -> anyhow::Result<()> {
        match self.store.delete(id) {
            Ok(()) => {
                self.tasks.retain(|t| t.id != id);
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "deleting task failed");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, TimeZone, Utc};

    use super::*;
    use crate::task::{Difficulty, ValidationError};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[derive(Default)]
    struct MemoryStore {
        tasks: Vec<Task>,
        next_id: u32,
        fail: bool,
    }

    impl TaskStore for MemoryStore {
        fn list(&self) -> anyhow::Result<Vec<Task>> {
            if self.fail {
                return Err(anyhow!("store offline"));
            }
            Ok(self.tasks.clone())
        }

        fn create(&mut self, new: NewTask) -> anyhow::Result<Task> {
            if self.fail {
                return Err(anyhow!("store offline"));
            }
            self.next_id += 1;
            let task = Task::from_new(
                self.next_id.to_string(),
                new,
                Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap(),
            );
            self.tasks.push(task.clone());
            Ok(task)
        }

        fn update(&mut self, id: &str, patch: &TaskPatch) -> anyhow::Result<Task> {
            if self.fail {
                return Err(anyhow!("store offline"));
            }
            let task = self
                .tasks
                .iter_mut()
                .find(|t| t.id == id)
                .ok_or_else(|| anyhow!("task not found: {id}"))?;
            patch.apply(task);
            Ok(task.clone())
        }

        fn delete(&mut self, id: &str) -> anyhow::Result<()> {
            if self.fail {
                return Err(anyhow!("store offline"));
            }
            self.tasks.retain(|t| t.id != id);
            Ok(())
        }
    }

    fn dated(title: &str, start: Option<NaiveDate>, due: Option<NaiveDate>) -> NewTask {
        let mut new = NewTask::titled(title);
        new.start_date = start;
        new.due_date = due;
        new
    }

    #[test]
    fn day_click_resets_filters_and_shows_grid() {
        let mut view = ViewState::new(date(2024, 6, 1));
        view.apply(Intent::SetStatusFilter(StatusFilter::Only(Status::Todo)));
        view.apply(Intent::SetDifficultyFilter(DifficultyFilter::Only(Difficulty::High)));
        view.apply(Intent::ShowView(ActiveView::Calendar));

        view.apply(Intent::SelectDay(date(2024, 6, 15)));

        assert_eq!(view.filter().status, StatusFilter::All);
        assert_eq!(view.filter().difficulty, DifficultyFilter::All);
        assert_eq!(view.filter().date.to_string(), "2024-06-15");
        assert_eq!(view.active_view(), ActiveView::Grid);
    }

    #[test]
    fn stat_cards_set_status_and_date() {
        let mut view = ViewState::new(date(2024, 6, 1));
        view.apply(Intent::ShowView(ActiveView::Report));
        view.apply(Intent::SetDifficultyFilter(DifficultyFilter::Only(Difficulty::Low)));

        view.apply(Intent::ClickStatCard(StatCard::Overdue));
        assert_eq!(
            *view.filter(),
            FilterState {
                status: StatusFilter::All,
                difficulty: DifficultyFilter::All,
                date: DateFilter::Overdue,
            }
        );
        assert_eq!(view.active_view(), ActiveView::Report);

        view.apply(Intent::ClickStatCard(StatCard::InProgress));
        assert_eq!(view.filter().status, StatusFilter::Only(Status::InProgress));
        assert_eq!(view.filter().date, DateFilter::All);

        view.apply(Intent::ClickStatCard(StatCard::NotStarted));
        assert_eq!(view.filter().status, StatusFilter::All);
        assert_eq!(view.filter().date, DateFilter::NotStarted);
    }

    #[test]
    fn calendar_today_keeps_filters() {
        let mut view = ViewState::new(date(2024, 6, 1));
        view.apply(Intent::SetDateFilter(DateFilter::Upcoming));
        view.apply(Intent::CalendarPrevious);
        view.apply(Intent::CalendarPrevious);
        assert_eq!(view.calendar(), CalendarCursor::new(2024, 4).unwrap());

        view.apply(Intent::CalendarToday(date(2024, 6, 20)));
        assert_eq!(view.calendar(), CalendarCursor::new(2024, 6).unwrap());
        assert_eq!(view.filter().date, DateFilter::Upcoming);
        assert_eq!(view.report_cursor(), CalendarCursor::new(2024, 6).unwrap());

        view.apply(Intent::CalendarShowMonth(CalendarCursor::new(2023, 11).unwrap()));
        assert_eq!(view.calendar().title(), "November 2023");
        assert_eq!(view.report_cursor(), CalendarCursor::new(2024, 6).unwrap());
    }

    #[test]
    fn navigation_stops_at_the_last_representable_month() {
        let mut view = ViewState::new(date(2024, 6, 1));
        let last = CalendarCursor::new(NaiveDate::MAX.year(), 12).unwrap();
        view.apply(Intent::CalendarShowMonth(last));
        view.apply(Intent::ReportShowMonth(last));

        view.apply(Intent::CalendarNext);
        view.apply(Intent::ReportNext);
        assert_eq!(view.calendar(), last);
        assert_eq!(view.report_cursor(), last);

        view.apply(Intent::CalendarPrevious);
        assert_eq!(view.calendar().month(), 11);
    }

    #[test]
    fn selected_day_drives_visible_tasks() {
        let mut board = Board::load(MemoryStore::default(), date(2024, 6, 1)).unwrap();
        board
            .create(dated("starts", Some(date(2024, 6, 15)), None))
            .unwrap();
        board
            .create(dated("ends", Some(date(2024, 6, 10)), Some(date(2024, 6, 15))))
            .unwrap();
        board.create(dated("elsewhere", None, Some(date(2024, 6, 16)))).unwrap();

        board.dispatch(Intent::SelectDay(date(2024, 6, 15)));
        let now = date(2024, 6, 1).and_hms_opt(9, 0, 0).unwrap();
        let titles: Vec<String> = board
            .visible_tasks(now)
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(titles, vec!["starts", "ends"]);
    }

    #[test]
    fn successful_update_patches_by_id() {
        let mut board = Board::load(MemoryStore::default(), date(2024, 6, 1)).unwrap();
        let a = board.create(NewTask::titled("a")).unwrap();
        let b = board.create(NewTask::titled("b")).unwrap();

        let patch = TaskPatch {
            status: Some(Status::Completed),
            ..TaskPatch::default()
        };
        board.update(&b.id, patch).unwrap();

        assert_eq!(board.tasks()[0], a);
        assert_eq!(board.tasks()[1].status, Status::Completed);

        board.delete(&a.id).unwrap();
        assert_eq!(board.tasks().len(), 1);
        assert_eq!(board.tasks()[0].id, b.id);
    }

    #[test]
    fn failed_store_calls_leave_collection_unchanged() {
        let mut board = Board::load(MemoryStore::default(), date(2024, 6, 1)).unwrap();
        let task = board.create(NewTask::titled("keep me")).unwrap();
        let before = board.tasks().to_vec();

        board.store.fail = true;
        assert!(board.create(NewTask::titled("new")).is_err());
        assert!(
            board
                .update(
                    &task.id,
                    TaskPatch {
                        title: Some("renamed".to_string()),
                        ..TaskPatch::default()
                    }
                )
                .is_err()
        );
        assert!(board.delete(&task.id).is_err());
        assert!(board.reload().is_err());

        assert_eq!(board.tasks(), before.as_slice());
    }

    #[test]
    fn validation_errors_never_reach_the_store() {
        let mut board = Board::load(MemoryStore::default(), date(2024, 6, 1)).unwrap();
        let err = board
            .create(dated("x", Some(date(2024, 6, 10)), Some(date(2024, 6, 1))))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ValidationError>(),
            Some(ValidationError::DueBeforeStart { .. })
        ));
        assert!(board.store().tasks.is_empty());

        let task = board.create(NewTask::titled("ok")).unwrap();
        let blank = TaskPatch {
            title: Some("  ".to_string()),
            ..TaskPatch::default()
        };
        assert!(board.update(&task.id, blank).is_err());
        assert_eq!(board.store().tasks[0].title, "ok");
    }

    #[test]
    fn report_follows_view_cursor() {
        let mut board = Board::load(MemoryStore::default(), date(2024, 3, 5)).unwrap();
        board
            .create(dated("march", Some(date(2024, 3, 1)), Some(date(2024, 3, 10))))
            .unwrap();
        board
            .create(dated("april", Some(date(2024, 4, 2)), Some(date(2024, 4, 4))))
            .unwrap();
        let now = date(2024, 3, 5).and_hms_opt(12, 0, 0).unwrap();

        assert_eq!(board.report(now).unwrap().total, 1);
        board.dispatch(Intent::ReportNext);
        assert_eq!(board.report(now).unwrap().avg_duration_days, 2.0);
        board.dispatch(Intent::SetReportScope(ReportScope::All));
        assert_eq!(board.report(now).unwrap().total, 2);
        assert_eq!(board.panel_stats(now).total, 2);
        assert_eq!(board.calendar_grid().unwrap().len() % 7, 0);
    }
}
