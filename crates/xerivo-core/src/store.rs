use std::fmt;

use tracing::{debug, info, instrument, warn};

use crate::datetime::Moment;
use crate::state::{AppState, palette_color};
use crate::task::{
    Category, CategoryId, DueOption, Priority, RepeatRule, Task, TaskId, TaskView,
};
use crate::view::Selection;

/// Quick-add draft. Lives beside the state but is never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Composer {
    pub title: String,
    pub details: String,
    pub due: DueOption,
    pub priority: Priority,
    pub repeat: RepeatRule,
    pub category_id: Option<CategoryId>,
}

/// Replacement values for the editable fields of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskEdit {
    pub title: String,
    pub details: String,
    pub due_day: Option<i64>,
    pub category_id: Option<CategoryId>,
    pub priority: Priority,
    pub repeat: RepeatRule,
}

impl TaskEdit {
    pub fn from_task(task: &Task) -> Self {
        Self {
            title: task.title.clone(),
            details: task.details.clone(),
            due_day: task.due_day,
            category_id: task.category_id,
            priority: task.priority,
            repeat: task.repeat,
        }
    }
}

/// Reverses a destructive command. Carries the full record, not a flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Undo {
    RestoreSnapshot(Task),
    Reinsert(Task),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    AddTask,
    ToggleCompletion(TaskId),
    ToggleArchive(TaskId),
    DeleteTask(TaskId),
    EditTask(TaskId, TaskEdit),
    AddCategory(String),
    DeleteCategory(CategoryId),
    Undo(Undo),
}

/// Transient user-facing message produced by a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    TaskAdded,
    EmptyTitle,
    NextOccurrence(RepeatRule),
    TaskArchived,
    TaskRestored,
    TaskDeleted,
    TaskUpdated,
    EmptyCategoryName,
    CategoryExists,
    CategoryAdded(String),
    CategoryDeleted(String),
    TaskNotFound(TaskId),
    CategoryNotFound(CategoryId),
    TaskAlreadyExists(TaskId),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::TaskAdded => write!(f, "Task added"),
            Notice::EmptyTitle => write!(f, "Task title is empty"),
            Notice::NextOccurrence(rule) => write!(
                f,
                "Created next {} task",
                rule.meta().label.to_lowercase()
            ),
            Notice::TaskArchived => write!(f, "Task archived"),
            Notice::TaskRestored => write!(f, "Task restored"),
            Notice::TaskDeleted => write!(f, "Task deleted"),
            Notice::TaskUpdated => write!(f, "Task updated"),
            Notice::EmptyCategoryName => write!(f, "Category name is empty"),
            Notice::CategoryExists => write!(f, "Category already exists"),
            Notice::CategoryAdded(name) => write!(f, "Category {name} added"),
            Notice::CategoryDeleted(name) => write!(f, "Category {name} deleted"),
            Notice::TaskNotFound(id) => write!(f, "Task {id} not found"),
            Notice::CategoryNotFound(id) => write!(f, "Category {id} not found"),
            Notice::TaskAlreadyExists(id) => write!(f, "Task {id} already exists"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Outcome {
    pub changed: bool,
    pub notice: Option<Notice>,
    pub undo: Option<Undo>,
}

impl Outcome {
    fn unchanged(notice: Notice) -> Self {
        Self {
            changed: false,
            notice: Some(notice),
            undo: None,
        }
    }

    fn changed(notice: Option<Notice>) -> Self {
        Self {
            changed: true,
            notice,
            undo: None,
        }
    }

    fn with_undo(mut self, undo: Undo) -> Self {
        self.undo = Some(undo);
        self
    }
}

/// Owns the application state. Presentation reads it and sends `Command`s.
#[derive(Debug, Clone)]
pub struct TodoStore {
    state: AppState,
    composer: Composer,
    selection: Selection,
    dirty: bool,
}

impl TodoStore {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            composer: Composer::default(),
            selection: Selection::default(),
            dirty: false,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    /// Draft edits never mark the store dirty.
    pub fn composer_mut(&mut self) -> &mut Composer {
        &mut self.composer
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.selection = selection;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    #[instrument(skip(self))]
    pub fn apply(&mut self, command: Command, moment: Moment) -> Outcome {
        let outcome = match command {
            Command::AddTask => self.add_task(moment),
            Command::ToggleCompletion(id) => self.toggle_completion(id, moment),
            Command::ToggleArchive(id) => self.toggle_archive(id),
            Command::DeleteTask(id) => self.delete_task(id),
            Command::EditTask(id, edit) => self.edit_task(id, edit),
            Command::AddCategory(name) => self.add_category(&name),
            Command::DeleteCategory(id) => self.delete_category(id),
            Command::Undo(undo) => self.undo(undo),
        };

        if outcome.changed {
            self.dirty = true;
        }
        debug!(
            changed = outcome.changed,
            notice = ?outcome.notice,
            tasks = self.state.tasks.len(),
            "command applied"
        );
        outcome
    }

    fn position(&self, id: TaskId) -> Option<usize> {
        self.state.tasks.iter().position(|t| t.id == id)
    }

    fn add_task(&mut self, moment: Moment) -> Outcome {
        let title = self.composer.title.trim().to_string();
        if title.is_empty() {
            return Outcome::unchanged(Notice::EmptyTitle);
        }

        let id = self.state.allocate_task_id();
        let mut task = Task::new(id, title, moment.epoch_millis);
        task.details = self.composer.details.trim().to_string();
        task.due_day = self.composer.due.resolve(moment.today);
        task.category_id = self.composer.category_id;
        task.priority = self.composer.priority;
        task.repeat = self.composer.repeat;

        info!(id, due = ?task.due_day, "task added");
        self.state.tasks.insert(0, task);

        self.composer.title.clear();
        self.composer.details.clear();
        self.selection.view = TaskView::All;
        Outcome::changed(Some(Notice::TaskAdded))
    }

    fn toggle_completion(&mut self, id: TaskId, moment: Moment) -> Outcome {
        let Some(idx) = self.position(id) else {
            return Outcome::unchanged(Notice::TaskNotFound(id));
        };

        let task = &mut self.state.tasks[idx];
        let was_completed = task.completed;
        task.completed = !was_completed;
        let original = task.clone();

        if was_completed || original.archived || original.repeat == RepeatRule::None {
            return Outcome::changed(None);
        }

        let base = original.due_day.unwrap_or(moment.today);
        let mut next = original.clone();
        next.id = self.state.allocate_task_id();
        next.completed = false;
        next.due_day = Some(base.saturating_add(original.repeat.interval_days()));
        next.created_at_millis = moment.epoch_millis;

        info!(
            from = original.id,
            to = next.id,
            due = ?next.due_day,
            "scheduled next occurrence"
        );
        self.state.tasks.push(next);
        Outcome::changed(Some(Notice::NextOccurrence(original.repeat)))
    }

    fn toggle_archive(&mut self, id: TaskId) -> Outcome {
        let Some(idx) = self.position(id) else {
            return Outcome::unchanged(Notice::TaskNotFound(id));
        };

        let previous = self.state.tasks[idx].clone();
        self.state.tasks[idx].archived = !previous.archived;
        let notice = if previous.archived {
            Notice::TaskRestored
        } else {
            Notice::TaskArchived
        };
        Outcome::changed(Some(notice)).with_undo(Undo::RestoreSnapshot(previous))
    }

    fn delete_task(&mut self, id: TaskId) -> Outcome {
        let Some(idx) = self.position(id) else {
            return Outcome::unchanged(Notice::TaskNotFound(id));
        };

        let removed = self.state.tasks.remove(idx);
        info!(id, "task deleted");
        Outcome::changed(Some(Notice::TaskDeleted)).with_undo(Undo::Reinsert(removed))
    }

    fn edit_task(&mut self, id: TaskId, edit: TaskEdit) -> Outcome {
        let title = edit.title.trim().to_string();
        if title.is_empty() {
            return Outcome::unchanged(Notice::EmptyTitle);
        }
        let Some(idx) = self.position(id) else {
            return Outcome::unchanged(Notice::TaskNotFound(id));
        };

        let task = &mut self.state.tasks[idx];
        task.title = title;
        task.details = edit.details.trim().to_string();
        task.due_day = edit.due_day;
        task.category_id = edit.category_id;
        task.priority = edit.priority;
        task.repeat = edit.repeat;
        Outcome::changed(Some(Notice::TaskUpdated))
    }

    fn add_category(&mut self, name: &str) -> Outcome {
        let name = name.trim();
        if name.is_empty() {
            return Outcome::unchanged(Notice::EmptyCategoryName);
        }
        let lowered = name.to_lowercase();
        if self
            .state
            .categories
            .iter()
            .any(|c| c.name.to_lowercase() == lowered)
        {
            debug!(name, "rejected duplicate category");
            return Outcome::unchanged(Notice::CategoryExists);
        }

        let id = self.state.allocate_category_id();
        let color_hex = palette_color(id);
        self.state.categories.push(Category {
            id,
            name: name.to_string(),
            color_hex,
        });
        info!(id, name, "category added");
        Outcome::changed(Some(Notice::CategoryAdded(name.to_string())))
    }

    fn delete_category(&mut self, id: CategoryId) -> Outcome {
        let Some(idx) = self.state.categories.iter().position(|c| c.id == id) else {
            return Outcome::unchanged(Notice::CategoryNotFound(id));
        };

        let removed = self.state.categories.remove(idx);
        let mut detached = 0_usize;
        for task in &mut self.state.tasks {
            if task.category_id == Some(id) {
                task.category_id = None;
                detached += 1;
            }
        }
        if self.composer.category_id == Some(id) {
            self.composer.category_id = None;
        }

        info!(id, detached, "category deleted");
        Outcome::changed(Some(Notice::CategoryDeleted(removed.name)))
    }

    fn undo(&mut self, undo: Undo) -> Outcome {
        match undo {
            Undo::RestoreSnapshot(snapshot) => {
                let Some(idx) = self.position(snapshot.id) else {
                    warn!(id = snapshot.id, "undo target no longer exists");
                    return Outcome::unchanged(Notice::TaskNotFound(snapshot.id));
                };
                self.state.tasks[idx] = snapshot;
                Outcome::changed(None)
            }
            Undo::Reinsert(task) => {
                if self.position(task.id).is_some() {
                    warn!(id = task.id, "undo would duplicate an existing task");
                    return Outcome::unchanged(Notice::TaskAlreadyExists(task.id));
                }
                self.state.tasks.insert(0, task);
                self.state.normalize_counters();
                Outcome::changed(None)
            }
        }
    }
}
