use tracing::{
  debug,
  info,
  warn
};

use crate::datetime::Moment;
use crate::persist::StateAdapter;
use crate::prefs::Preferences;
use crate::state::AppState;
use crate::store::{
  Command,
  Composer,
  Outcome,
  TodoStore
};
use crate::task::TaskView;
use crate::view::{
  self,
  Board,
  Selection
};

/// Application root: the store plus the
/// adapter that flushes it after every
/// changed batch.
#[derive(Debug)]
pub struct TodoApp<P> {
  store:   TodoStore,
  adapter: StateAdapter<P>
}

impl<P: Preferences> TodoApp<P> {
  #[tracing::instrument(skip(prefs))]
  pub fn open(
    prefs: P,
    moment: Moment,
    seed_samples: bool
  ) -> Self {
    let adapter = StateAdapter::new(prefs);
    let state = match adapter.load(moment) {
      | Some(state) => {
        info!(
          tasks = state.tasks.len(),
          categories = state.categories.len(),
          "loaded saved state"
        );
        state
      }
      | None => {
        info!(
          seed_samples,
          "no usable saved state; seeding \
           defaults"
        );
        AppState::seeded(
          moment,
          seed_samples
        )
      }
    };

    let mut app = Self {
      store: TodoStore::new(state),
      adapter
    };
    // Writes the current format even when
    // the legacy key was the source.
    app.flush_now();
    app
  }

  pub fn state(&self) -> &AppState {
    self.store.state()
  }

  pub fn composer(&self) -> &Composer {
    self.store.composer()
  }

  pub fn composer_mut(
    &mut self
  ) -> &mut Composer {
    self.store.composer_mut()
  }

  pub fn selection(&self) -> Selection {
    self.store.selection()
  }

  pub fn set_selection(
    &mut self,
    selection: Selection
  ) {
    self.store.set_selection(selection);
  }

  pub fn adapter(
    &self
  ) -> &StateAdapter<P> {
    &self.adapter
  }

  pub fn apply(
    &mut self,
    command: Command
  ) -> Outcome {
    self.apply_at(command, Moment::now())
  }

  pub fn apply_at(
    &mut self,
    command: Command,
    moment: Moment
  ) -> Outcome {
    let outcome =
      self.store.apply(command, moment);
    self.flush();
    outcome
  }

  /// Applies every command, then flushes
  /// once.
  pub fn apply_batch<I>(
    &mut self,
    commands: I,
    moment: Moment
  ) -> Vec<Outcome>
  where
    I: IntoIterator<Item = Command>
  {
    let outcomes: Vec<Outcome> = commands
      .into_iter()
      .map(|command| {
        self.store.apply(command, moment)
      })
      .collect();
    self.flush();
    outcomes
  }

  /// Saves if anything changed since the
  /// last successful save. A failed save is
  /// logged and otherwise ignored.
  pub fn flush(&mut self) -> bool {
    if !self.store.is_dirty() {
      debug!("nothing to flush");
      return true;
    }
    self.flush_now()
  }

  fn flush_now(&mut self) -> bool {
    match self
      .adapter
      .save(self.store.state())
    {
      | Ok(()) => {
        self.store.mark_clean();
        true
      }
      | Err(err) => {
        warn!(
          error = ?err,
          "failed to save state; keeping \
           in-memory copy"
        );
        false
      }
    }
  }

  pub fn board(
    &self,
    today: i64
  ) -> Board<'_> {
    view::board(
      self.store.state(),
      self.store.selection(),
      today
    )
  }

  pub fn view_counts(
    &self,
    today: i64
  ) -> Vec<(TaskView, usize)> {
    view::view_counts(
      &self.store.state().tasks,
      today
    )
  }
}
