use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow,
  bail,
  ensure
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

pub const DEFAULT_PREFS_NAMESPACE: &str =
  "xerivo_todo_prefs";

const RC_ENV_VAR: &str = "XERIVORC";
const RC_FILE_NAME: &str = ".xerivorc";
const DEFAULT_DATA_DIR: &str = ".xerivo";
const MAX_INCLUDE_DEPTH: usize = 8;

/// Settings read from `~/.xerivorc`.
///
/// The file is `key = value` lines with
/// `#` comments and `include <path>`
/// directives resolved against the
/// including file's directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
  pub data_location:   Option<PathBuf>,
  pub prefs_namespace: String,
  pub log_level:       String,
  pub seed_samples:    bool,
  pub loaded_files:    Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    Self {
      data_location:   None,
      prefs_namespace:
        DEFAULT_PREFS_NAMESPACE.to_string(),
      log_level:       "warn".to_string(),
      seed_samples:    true,
      loaded_files:    vec![]
    }
  }
}

impl Config {
  /// Defaults, then the rc file named by
  /// `rc_override`, `$XERIVORC` or
  /// `~/.xerivorc`. `XERIVORC=/dev/null`
  /// skips the file entirely.
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();
    match rc_path(rc_override) {
      | Some(path) => {
        info!(rc = %path.display(), "loading xerivorc");
        RcReader {
          cfg:    &mut cfg,
          active: vec![]
        }
        .read(&path)?;
      }
      | None => {
        debug!(
          "no xerivorc found; using \
           defaults"
        );
      }
    }
    Ok(cfg)
  }

  /// Sets one key. An `rc.` prefix is
  /// accepted so command-line style
  /// overrides can be passed through as
  /// given. Unknown keys are ignored.
  pub fn set(
    &mut self,
    key: &str,
    value: &str
  ) -> anyhow::Result<()> {
    let name =
      key.strip_prefix("rc.").unwrap_or(key);
    match name {
      | "data.location" => {
        ensure!(
          !value.is_empty(),
          "data.location cannot be empty"
        );
        self.data_location = Some(
          expand_home(Path::new(value))
        );
      }
      | "prefs.namespace" => {
        ensure!(
          !value.is_empty(),
          "prefs.namespace cannot be empty"
        );
        self.prefs_namespace =
          value.to_string();
      }
      | "log.level" => {
        ensure!(
          !value.is_empty(),
          "log.level cannot be empty"
        );
        self.log_level = value.to_string();
      }
      | "seed.samples" => {
        self.seed_samples =
          parse_switch(name, value)?;
      }
      | other => {
        warn!(
          key = other,
          "ignoring unknown config key"
        );
        return Ok(());
      }
    }
    trace!(key = name, value, "config key set");
    Ok(())
  }

  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) -> anyhow::Result<()>
  where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (key, value) in overrides {
      debug!(key = %key, value = %value, "applying override");
      self
        .set(key.trim(), value.trim())
        .with_context(|| {
          format!("bad override {key}")
        })?;
    }
    Ok(())
  }
}

/// Walks one rc file and its includes.
/// `active` holds the canonical paths
/// currently being read, outermost first.
struct RcReader<'a> {
  cfg:    &'a mut Config,
  active: Vec<PathBuf>
}

impl RcReader<'_> {
  fn read(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_home(path);
    let canonical = fs::canonicalize(&path)
      .with_context(|| {
        format!(
          "failed to resolve {}",
          path.display()
        )
      })?;
    if self.active.contains(&canonical) {
      bail!(
        "include cycle: {} is already \
         being read",
        canonical.display()
      );
    }
    if self.active.len() >= MAX_INCLUDE_DEPTH
    {
      bail!(
        "includes nested deeper than {} \
         at {}",
        MAX_INCLUDE_DEPTH,
        canonical.display()
      );
    }

    let text = fs::read_to_string(
      &canonical
    )
    .with_context(|| {
      format!(
        "failed to read {}",
        canonical.display()
      )
    })?;
    let base_dir = canonical
      .parent()
      .map_or_else(
        || PathBuf::from("."),
        Path::to_path_buf
      );

    self
      .cfg
      .loaded_files
      .push(canonical.clone());
    self.active.push(canonical);
    for (idx, raw) in
      text.lines().enumerate()
    {
      self
        .line(&base_dir, raw)
        .with_context(|| {
          format!(
            "{}:{}",
            path.display(),
            idx + 1
          )
        })?;
    }
    self.active.pop();
    Ok(())
  }

  fn line(
    &mut self,
    base_dir: &Path,
    raw: &str
  ) -> anyhow::Result<()> {
    let line = raw
      .split_once('#')
      .map_or(raw, |(before, _)| before)
      .trim();
    if line.is_empty() {
      return Ok(());
    }

    if let Some(target) =
      line.strip_prefix("include ")
    {
      let target = target.trim();
      ensure!(
        !target.is_empty(),
        "include needs a path"
      );
      let include = base_dir
        .join(expand_home(Path::new(target)));
      if !include.exists() {
        warn!(include = %include.display(), "include file does not exist; skipping");
        return Ok(());
      }
      return self.read(&include);
    }

    let (key, value) =
      line.split_once('=').ok_or_else(
        || {
          anyhow!(
            "expected `key = value`, got \
             `{line}`"
          )
        }
      )?;
    self.cfg.set(key.trim(), value.trim())
  }
}

/// Data directory: explicit override,
/// then `data.location`, then
/// `~/.xerivo`. Created when missing.
#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = match (
    override_dir,
    &cfg.data_location
  ) {
    | (Some(path), _) => path.to_path_buf(),
    | (None, Some(path)) => path.clone(),
    | (None, None) => {
      dirs::home_dir()
        .map(|home| {
          home.join(DEFAULT_DATA_DIR)
        })
        .ok_or_else(|| {
          anyhow!(
            "cannot determine home \
             directory; set data.location"
          )
        })?
    }
  };

  if !dir.is_dir() {
    info!(dir = %dir.display(), "creating data directory");
  }
  fs::create_dir_all(&dir).with_context(
    || {
      format!(
        "failed to create {}",
        dir.display()
      )
    }
  )?;
  Ok(dir)
}

fn rc_path(
  rc_override: Option<&Path>
) -> Option<PathBuf> {
  if let Some(path) = rc_override {
    return Some(path.to_path_buf());
  }
  match std::env::var(RC_ENV_VAR) {
    | Ok(raw) if raw == "/dev/null" => None,
    | Ok(raw) => Some(PathBuf::from(raw)),
    | Err(_) => {
      let home = dirs::home_dir()?;
      Some(home.join(RC_FILE_NAME))
        .filter(|path| path.is_file())
    }
  }
}

fn expand_home(path: &Path) -> PathBuf {
  match path.strip_prefix("~") {
    | Ok(rest) => {
      dirs::home_dir().map_or_else(
        || path.to_path_buf(),
        |home| home.join(rest)
      )
    }
    | Err(_) => path.to_path_buf()
  }
}

fn parse_switch(
  key: &str,
  value: &str
) -> anyhow::Result<bool> {
  match value
    .to_ascii_lowercase()
    .as_str()
  {
    | "on" | "yes" | "true" | "1" => {
      Ok(true)
    }
    | "off" | "no" | "false" | "0" => {
      Ok(false)
    }
    | other => {
      bail!(
        "{key} expects on or off, got \
         `{other}`"
      )
    }
  }
}

#[cfg(test)]
mod tests {
  use std::fs;

  use tempfile::tempdir;

  use super::{
    Config,
    DEFAULT_PREFS_NAMESPACE,
    resolve_data_dir
  };

  #[test]
  fn rc_file_with_include_and_overrides()
  {
    let temp =
      tempdir().expect("tempdir");
    let extra = temp.path().join("extra.rc");
    fs::write(
      &extra,
      "seed.samples = off # no demo data\n\
       color = always\n"
    )
    .expect("write include");
    let rc = temp.path().join("xerivorc");
    fs::write(
      &rc,
      "# main file\nprefs.namespace = \
       custom_prefs\ninclude extra.rc\n"
    )
    .expect("write rc");

    let mut cfg =
      Config::load(Some(rc.as_path()))
        .expect("load config");
    assert_eq!(
      cfg.prefs_namespace,
      "custom_prefs"
    );
    assert!(!cfg.seed_samples);
    assert_eq!(cfg.loaded_files.len(), 2);

    cfg
      .apply_overrides(vec![(
        "rc.log.level".to_string(),
        "debug".to_string()
      )])
      .expect("override");
    assert_eq!(cfg.log_level, "debug");
  }

  #[test]
  fn malformed_lines_are_errors() {
    let temp =
      tempdir().expect("tempdir");
    let rc = temp.path().join("xerivorc");
    fs::write(&rc, "just words\n")
      .expect("write rc");
    let err =
      Config::load(Some(rc.as_path()))
        .expect_err("malformed line");
    assert!(
      format!("{err:#}").contains(":1")
    );

    fs::write(&rc, "seed.samples = maybe\n")
      .expect("write rc");
    assert!(
      Config::load(Some(rc.as_path()))
        .is_err()
    );
  }

  #[test]
  fn include_cycles_are_rejected() {
    let temp =
      tempdir().expect("tempdir");
    let rc = temp.path().join("xerivorc");
    fs::write(&rc, "include xerivorc\n")
      .expect("write rc");
    let err =
      Config::load(Some(rc.as_path()))
        .expect_err("self include");
    assert!(
      format!("{err:#}")
        .contains("include cycle")
    );

    let a = temp.path().join("a.rc");
    let b = temp.path().join("b.rc");
    fs::write(&a, "include b.rc\n")
      .expect("write a");
    fs::write(
      &b,
      "log.level = info\ninclude a.rc\n"
    )
    .expect("write b");
    let err =
      Config::load(Some(a.as_path()))
        .expect_err("mutual include");
    assert!(
      format!("{err:#}")
        .contains("include cycle")
    );
  }

  #[test]
  fn same_file_may_be_included_twice() {
    let temp =
      tempdir().expect("tempdir");
    let shared =
      temp.path().join("shared.rc");
    fs::write(&shared, "log.level = info\n")
      .expect("write shared");
    let rc = temp.path().join("xerivorc");
    fs::write(
      &rc,
      "include shared.rc\ninclude \
       shared.rc\ninclude missing.rc\n"
    )
    .expect("write rc");
    let cfg =
      Config::load(Some(rc.as_path()))
        .expect("load config");
    assert_eq!(cfg.log_level, "info");
    assert_eq!(cfg.loaded_files.len(), 3);
    assert_eq!(
      cfg.prefs_namespace,
      DEFAULT_PREFS_NAMESPACE
    );
  }

  #[test]
  fn data_dir_prefers_override_then_config()
  {
    let temp =
      tempdir().expect("tempdir");
    let target =
      temp.path().join("nested/data");
    let dir = resolve_data_dir(
      &Config::default(),
      Some(target.as_path())
    )
    .expect("resolve data dir");
    assert_eq!(dir, target);
    assert!(target.is_dir());

    let mut cfg = Config::default();
    let configured =
      temp.path().join("configured");
    cfg
      .set(
        "data.location",
        &configured.to_string_lossy()
      )
      .expect("set");
    let dir = resolve_data_dir(&cfg, None)
      .expect("resolve data dir");
    assert_eq!(dir, configured);
    assert!(configured.is_dir());
  }
}
