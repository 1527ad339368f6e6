use std::collections::BTreeSet;

use tracing::{
  debug,
  warn
};

use crate::datetime::Moment;
use crate::task::{
  Category,
  CategoryId,
  Priority,
  RepeatRule,
  Task,
  TaskId
};

pub const SCHEMA_VERSION: u32 = 2;

pub const CATEGORY_PALETTE: [u32; 6] = [
  0xFF4F_86F7,
  0xFFF0_6C5C,
  0xFF2A_9D8F,
  0xFF9A_6DFF,
  0xFFE9_C46A,
  0xFF45_7B9D
];

/// The persisted root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppState {
  pub schema_version:   u32,
  pub next_task_id:     TaskId,
  pub next_category_id: CategoryId,
  pub categories:       Vec<Category>,
  pub tasks:            Vec<Task>
}

impl AppState {
  /// Builds a state from loaded parts,
  /// substituting default categories when
  /// none survived and lifting counters
  /// past every existing id. Stored
  /// counters below 1 are treated as 1.
  pub fn from_parts(
    stored_next_task_id: TaskId,
    stored_next_category_id: CategoryId,
    categories: Vec<Category>,
    tasks: Vec<Task>
  ) -> Self {
    let categories = if categories
      .is_empty()
    {
      default_categories()
    } else {
      categories
    };
    let mut state = Self {
      schema_version: SCHEMA_VERSION,
      next_task_id: stored_next_task_id
        .max(1),
      next_category_id:
        stored_next_category_id.max(1),
      categories,
      tasks
    };
    state.reassign_duplicate_task_ids();
    state.normalize_counters();
    state
  }

  /// Default categories plus, when
  /// `with_samples`, the demo tasks.
  pub fn seeded(
    moment: Moment,
    with_samples: bool
  ) -> Self {
    let tasks = if with_samples {
      sample_tasks(moment)
    } else {
      vec![]
    };
    debug!(
      tasks = tasks.len(),
      "seeding default state"
    );
    Self::from_parts(
      1,
      1,
      default_categories(),
      tasks
    )
  }

  /// Later duplicates get fresh ids past
  /// the current maximum.
  fn reassign_duplicate_task_ids(
    &mut self
  ) {
    let mut taken: BTreeSet<TaskId> = self
      .tasks
      .iter()
      .map(|t| t.id)
      .collect();
    let mut next = taken
      .last()
      .copied()
      .unwrap_or(0)
      .max(
        self.next_task_id.saturating_sub(1)
      )
      .saturating_add(1);
    let mut seen = BTreeSet::new();
    for task in &mut self.tasks {
      if !seen.insert(task.id) {
        let fresh = free_id(&taken, next);
        warn!(
          from = task.id,
          to = fresh,
          "reassigning duplicate task id"
        );
        task.id = fresh;
        taken.insert(fresh);
        seen.insert(fresh);
        next = fresh.saturating_add(1);
      }
    }
  }

  pub fn normalize_counters(&mut self) {
    let task_floor = self
      .tasks
      .iter()
      .map(|t| t.id)
      .max()
      .unwrap_or(0)
      .saturating_add(1);
    let category_floor = self
      .categories
      .iter()
      .map(|c| c.id)
      .max()
      .unwrap_or(0)
      .saturating_add(1);
    self.next_task_id =
      self.next_task_id.max(task_floor);
    self.next_category_id = self
      .next_category_id
      .max(category_floor);
  }

  /// Hands out `next_task_id`, or the
  /// lowest free id once the counter has
  /// saturated.
  pub fn allocate_task_id(
    &mut self
  ) -> TaskId {
    let taken: BTreeSet<TaskId> = self
      .tasks
      .iter()
      .map(|t| t.id)
      .collect();
    let id =
      free_id(&taken, self.next_task_id);
    self.next_task_id = self
      .next_task_id
      .max(id.saturating_add(1));
    id
  }

  pub fn allocate_category_id(
    &mut self
  ) -> CategoryId {
    let taken: BTreeSet<CategoryId> = self
      .categories
      .iter()
      .map(|c| c.id)
      .collect();
    let id = free_id(
      &taken,
      self.next_category_id
    );
    self.next_category_id = self
      .next_category_id
      .max(id.saturating_add(1));
    id
  }

  pub fn task(
    &self,
    id: TaskId
  ) -> Option<&Task> {
    self.tasks.iter().find(|t| t.id == id)
  }

  pub fn category(
    &self,
    id: CategoryId
  ) -> Option<&Category> {
    self
      .categories
      .iter()
      .find(|c| c.id == id)
  }
}

/// First id at or after `from` missing
/// from `taken`, wrapping to 1 when every
/// id above is used.
fn free_id(
  taken: &BTreeSet<i64>,
  from: i64
) -> i64 {
  let from = from.max(1);
  (from..=i64::MAX)
    .chain(1..from)
    .find(|id| !taken.contains(id))
    .unwrap_or(from)
}

pub fn palette_color(
  next_category_id: CategoryId
) -> u32 {
  let len = CATEGORY_PALETTE.len() as i64;
  let index =
    next_category_id
      .saturating_sub(1)
      .rem_euclid(len);
  CATEGORY_PALETTE[index as usize]
}

pub fn default_categories()
-> Vec<Category> {
  [
    (1, "Deep Work"),
    (2, "Design"),
    (3, "Health"),
    (4, "Planning")
  ]
  .into_iter()
  .enumerate()
  .map(|(idx, (id, name))| Category {
    id,
    name: name.to_string(),
    color_hex: CATEGORY_PALETTE[idx]
  })
  .collect()
}

fn sample_tasks(
  moment: Moment
) -> Vec<Task> {
  let Moment {
    today,
    epoch_millis: now
  } = moment;

  let mut ship = Task::new(
    1,
    "Ship onboarding motion pass"
      .to_string(),
    now - 4_000
  );
  ship.details =
    "Staggered reveal + CTA timing polish"
      .to_string();
  ship.due_day = Some(today);
  ship.category_id = Some(2);
  ship.priority = Priority::High;

  let mut sprint = Task::new(
    2,
    "45-minute deep work sprint"
      .to_string(),
    now - 3_000
  );
  sprint.details =
    "Architecture write-up and risk list"
      .to_string();
  sprint.due_day = Some(today);
  sprint.category_id = Some(1);
  sprint.repeat = RepeatRule::Daily;

  let mut walk = Task::new(
    3,
    "Hydration + short walk".to_string(),
    now - 2_000
  );
  walk.details =
    "Reset before next block".to_string();
  walk.due_day = Some(today - 1);
  walk.category_id = Some(3);
  walk.priority = Priority::Low;
  walk.completed = true;

  let mut prep = Task::new(
    4,
    "Prep tomorrow top 3".to_string(),
    now - 1_000
  );
  prep.details =
    "Decide non-negotiables".to_string();
  prep.due_day = Some(today + 1);
  prep.category_id = Some(4);
  prep.repeat = RepeatRule::Weekly;

  vec![ship, sprint, walk, prep]
}

#[cfg(test)]
mod tests {
  use super::{
    AppState,
    CATEGORY_PALETTE,
    default_categories,
    palette_color
  };
  use crate::datetime::Moment;
  use crate::task::Task;

  #[test]
  fn seeded_state_has_samples_and_counters()
  {
    let state = AppState::seeded(
      Moment::fixed(100, 1_000_000),
      true
    );
    assert_eq!(state.categories.len(), 4);
    assert_eq!(state.tasks.len(), 4);
    assert_eq!(state.next_task_id, 5);
    assert_eq!(state.next_category_id, 5);
    assert_eq!(
      state.task(3).map(|t| t.completed),
      Some(true)
    );

    let bare = AppState::seeded(
      Moment::fixed(100, 1_000_000),
      false
    );
    assert!(bare.tasks.is_empty());
    assert_eq!(bare.next_task_id, 1);
  }

  #[test]
  fn stale_counters_are_lifted() {
    let tasks = vec![
      Task::new(7, "a".to_string(), 0),
      Task::new(3, "b".to_string(), 0),
    ];
    let state = AppState::from_parts(
      2,
      1,
      vec![],
      tasks
    );
    assert_eq!(state.next_task_id, 8);
    assert_eq!(
      state.categories,
      default_categories()
    );
    assert_eq!(state.next_category_id, 5);

    let ahead = AppState::from_parts(
      40,
      12,
      default_categories(),
      vec![]
    );
    assert_eq!(ahead.next_task_id, 40);
    assert_eq!(
      ahead.next_category_id,
      12
    );
  }

  #[test]
  fn duplicate_task_ids_are_reassigned() {
    let tasks = vec![
      Task::new(2, "a".to_string(), 0),
      Task::new(2, "b".to_string(), 0),
      Task::new(5, "c".to_string(), 0),
    ];
    let state = AppState::from_parts(
      1,
      1,
      default_categories(),
      tasks
    );
    let ids: Vec<i64> =
      state.tasks.iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![2, 6, 5]);
    assert_eq!(state.next_task_id, 7);
  }

  #[test]
  fn extreme_counters_and_ids_do_not_overflow()
  {
    let low = AppState::from_parts(
      i64::MIN,
      i64::MIN,
      default_categories(),
      vec![]
    );
    assert_eq!(low.next_task_id, 1);
    assert_eq!(low.next_category_id, 5);

    let tasks = vec![
      Task::new(i64::MAX, "a".to_string(), 0),
      Task::new(i64::MAX, "b".to_string(), 0),
    ];
    let mut high = AppState::from_parts(
      1,
      1,
      default_categories(),
      tasks
    );
    let ids: Vec<i64> =
      high.tasks.iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![i64::MAX, 1]);
    assert_eq!(high.next_task_id, i64::MAX);

    let fresh = high.allocate_task_id();
    assert_eq!(fresh, 2);
    assert_eq!(high.next_task_id, i64::MAX);
  }

  #[test]
  fn allocation_follows_the_counter() {
    let mut state = AppState::seeded(
      Moment::fixed(100, 1_000_000),
      true
    );
    assert_eq!(state.allocate_task_id(), 5);
    assert_eq!(state.allocate_task_id(), 6);
    assert_eq!(state.next_task_id, 7);
    assert_eq!(
      state.allocate_category_id(),
      5
    );
    assert_eq!(state.next_category_id, 6);
  }

  #[test]
  fn palette_wraps_by_next_id() {
    assert_eq!(
      palette_color(1),
      CATEGORY_PALETTE[0]
    );
    assert_eq!(
      palette_color(7),
      CATEGORY_PALETTE[0]
    );
    assert_eq!(
      palette_color(5),
      CATEGORY_PALETTE[4]
    );
  }
}
