use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// A string key-value namespace. Each `put_string` replaces the whole value.
pub trait Preferences {
    fn get_string(&self, key: &str) -> anyhow::Result<Option<String>>;

    fn put_string(&self, key: &str, value: &str) -> anyhow::Result<()>;
}

#[derive(Debug)]
pub struct FilePreferences {
    pub dir: PathBuf,
}

impl FilePreferences {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path, namespace: &str) -> anyhow::Result<Self> {
        validate_name(namespace).context("invalid preferences namespace")?;
        let dir = data_dir.join(namespace);
        fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

        info!(dir = %dir.display(), "opened preferences namespace");
        Ok(Self { dir })
    }

    fn key_path(&self, key: &str) -> anyhow::Result<PathBuf> {
        validate_name(key)?;
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl Preferences for FilePreferences {
    #[tracing::instrument(skip(self))]
    fn get_string(&self, key: &str) -> anyhow::Result<Option<String>> {
        let path = self.key_path(key)?;
        if !path.exists() {
            debug!(file = %path.display(), "preference key absent");
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed reading {}", path.display()))?;
        Ok(Some(raw))
    }

    #[tracing::instrument(skip(self, value), fields(bytes = value.len()))]
    fn put_string(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let path = self.key_path(key)?;
        debug!(file = %path.display(), "writing preference atomically");

        let mut temp = NamedTempFile::new_in(&self.dir)?;
        temp.write_all(value.as_bytes())?;
        temp.flush()?;
        temp.persist(&path)
            .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;
        Ok(())
    }
}

/// In-process preferences, for tests and embedders that own storage themselves.
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    values: RefCell<BTreeMap<String, String>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(key: &str, value: &str) -> Self {
        let prefs = Self::default();
        prefs
            .values
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        prefs
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.values.borrow_mut().remove(key)
    }
}

impl Preferences for MemoryPreferences {
    fn get_string(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.values.borrow().get(key).cloned())
    }

    fn put_string(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.values
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

fn validate_name(name: &str) -> anyhow::Result<()> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        && !name.starts_with('.');
    if ok {
        Ok(())
    } else {
        Err(anyhow!("unsupported preference name: {name:?}"))
    }
}
