use std::cmp::Ordering;

use tracing::trace;

use crate::state::AppState;
use crate::task::{
  Category,
  SortMode,
  Task,
  TaskView
};

/// The current view/sort pair chosen by
/// the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Selection {
  pub view: TaskView,
  pub sort: SortMode
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Stats {
  pub total:            usize,
  pub active:           usize,
  pub done:             usize,
  pub overdue:          usize,
  pub completion_ratio: f64
}

#[derive(Debug, Clone)]
pub struct TaskRow<'a> {
  pub task:      &'a Task,
  pub category:  Option<&'a Category>,
  pub overdue:   bool,
  pub due_label: String
}

#[derive(Debug, Clone)]
pub struct Board<'a> {
  pub today: i64,
  pub rows:  Vec<TaskRow<'a>>,
  pub stats: Stats
}

pub fn matches_view(
  task: &Task,
  view: TaskView,
  today: i64
) -> bool {
  let open = !task.archived
    && !task.completed;
  match view {
    | TaskView::All => !task.archived,
    | TaskView::Active => open,
    | TaskView::Completed => {
      !task.archived && task.completed
    }
    | TaskView::Today => {
      open && task.due_day == Some(today)
    }
    | TaskView::Upcoming => {
      open
        && task
          .due_day
          .is_some_and(|d| d > today)
    }
    | TaskView::Overdue => {
      task.is_overdue(today)
    }
    | TaskView::Archived => task.archived
  }
}

fn due_key(task: &Task) -> i64 {
  task.due_day.unwrap_or(i64::MAX)
}

fn compare(
  a: &Task,
  b: &Task,
  mode: SortMode
) -> Ordering {
  let primary = match mode {
    | SortMode::DueSoon => {
      due_key(a)
        .cmp(&due_key(b))
        .then_with(|| {
          b.priority
            .weight()
            .cmp(&a.priority.weight())
        })
        .then_with(|| {
          b.created_at_millis
            .cmp(&a.created_at_millis)
        })
    }
    | SortMode::PriorityHigh => {
      b.priority
        .weight()
        .cmp(&a.priority.weight())
        .then_with(|| {
          due_key(a).cmp(&due_key(b))
        })
        .then_with(|| {
          b.created_at_millis
            .cmp(&a.created_at_millis)
        })
    }
    | SortMode::Newest => {
      b.created_at_millis
        .cmp(&a.created_at_millis)
    }
  };
  // ids are unique, so this makes the
  // order total.
  primary.then_with(|| {
    b.id.cmp(&a.id)
  })
}

pub fn sort_tasks(
  tasks: &mut [&Task],
  mode: SortMode
) {
  tasks.sort_by(|a, b| {
    compare(a, b, mode)
  });
}

#[tracing::instrument(skip(tasks))]
pub fn visible_tasks(
  tasks: &[Task],
  selection: Selection,
  today: i64
) -> Vec<&Task> {
  let mut out: Vec<&Task> = tasks
    .iter()
    .filter(|t| {
      matches_view(
        t,
        selection.view,
        today
      )
    })
    .collect();
  sort_tasks(&mut out, selection.sort);
  trace!(
    count = out.len(),
    "computed visible tasks"
  );
  out
}

pub fn stats(
  tasks: &[Task],
  today: i64
) -> Stats {
  let mut stats = Stats::default();
  for task in
    tasks.iter().filter(|t| !t.archived)
  {
    stats.total += 1;
    if task.completed {
      stats.done += 1;
    } else {
      stats.active += 1;
    }
    if task.is_overdue(today) {
      stats.overdue += 1;
    }
  }
  stats.completion_ratio =
    if stats.total == 0 {
      0.0
    } else {
      stats.done as f64
        / stats.total as f64
    };
  stats
}

pub fn view_counts(
  tasks: &[Task],
  today: i64
) -> Vec<(TaskView, usize)> {
  TaskView::ALL
    .iter()
    .map(|&view| {
      let count = tasks
        .iter()
        .filter(|t| {
          matches_view(t, view, today)
        })
        .count();
      (view, count)
    })
    .collect()
}

pub fn due_label(
  due_day: Option<i64>,
  today: i64
) -> String {
  let Some(due) = due_day else {
    return "No due".to_string();
  };
  match due.saturating_sub(today) {
    | 0 => "Today".to_string(),
    | 1 => "Tomorrow".to_string(),
    | diff if diff > 1 => {
      format!("In {diff}d")
    }
    | -1 => "1d overdue".to_string(),
    | diff => {
      format!(
        "{}d overdue",
        diff.unsigned_abs()
      )
    }
  }
}

pub fn board(
  state: &AppState,
  selection: Selection,
  today: i64
) -> Board<'_> {
  let rows = visible_tasks(
    &state.tasks,
    selection,
    today
  )
  .into_iter()
  .map(|task| TaskRow {
    task,
    category: task
      .category_id
      .and_then(|id| state.category(id)),
    overdue: task.is_overdue(today),
    due_label: due_label(
      task.due_day,
      today
    )
  })
  .collect();

  Board {
    today,
    rows,
    stats: stats(&state.tasks, today)
  }
}
