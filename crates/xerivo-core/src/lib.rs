pub mod app;
pub mod config;
pub mod datetime;
pub mod logging;
pub mod persist;
pub mod prefs;
pub mod state;
pub mod store;
pub mod task;
pub mod view;

use std::path::Path;

use anyhow::Context;
use tracing::info;

pub use app::TodoApp;
pub use prefs::FilePreferences;

/// Opens the app the way an embedding shell
/// does at startup: config, logging, data
/// directory, then load-or-seed.
///
/// `overrides` are `key`/`rc.key` pairs
/// applied on top of the rc file.
#[tracing::instrument(skip_all)]
pub fn open_default<I>(
  rc_override: Option<&Path>,
  data_override: Option<&Path>,
  overrides: I
) -> anyhow::Result<TodoApp<FilePreferences>>
where
  I: IntoIterator<Item = (String, String)>
{
  let mut cfg = config::Config::load(
    rc_override
  )?;
  cfg.apply_overrides(overrides)?;
  logging::init_tracing(&cfg.log_level)?;

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      data_override
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let prefs = FilePreferences::open(
    &data_dir,
    &cfg.prefs_namespace
  )
  .with_context(|| {
    format!(
      "failed to open preferences at \
       {}",
      data_dir.display()
    )
  })?;

  info!(
    data_dir = %data_dir.display(),
    "starting xerivo"
  );
  Ok(TodoApp::open(
    prefs,
    datetime::Moment::now(),
    cfg.seed_samples
  ))
}
