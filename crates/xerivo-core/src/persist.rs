use std::sync::OnceLock;

use anyhow::{Context, anyhow};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::datetime::Moment;
use crate::prefs::Preferences;
use crate::state::{AppState, CATEGORY_PALETTE, SCHEMA_VERSION, default_categories};
use crate::task::{Category, CategoryId, Priority, RepeatRule, Task};

pub const STATE_KEY: &str = "state_v2";
pub const LEGACY_TASKS_KEY: &str = "tasks";

const LEGACY_STEP_MILLIS: i64 = 1_000;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredState {
    #[serde(default, deserialize_with = "lenient::int")]
    version: i64,
    #[serde(default, deserialize_with = "lenient::opt_int")]
    next_task_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_int")]
    next_category_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient::records")]
    categories: Vec<StoredCategory>,
    #[serde(default, deserialize_with = "lenient::records")]
    tasks: Vec<StoredTask>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredCategory {
    #[serde(default, deserialize_with = "lenient::int")]
    id: i64,
    #[serde(default, deserialize_with = "lenient::string")]
    name: String,
    #[serde(default, deserialize_with = "lenient::opt_int")]
    color_hex: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredTask {
    #[serde(default, deserialize_with = "lenient::int")]
    id: i64,
    #[serde(default, deserialize_with = "lenient::string")]
    title: String,
    #[serde(default, deserialize_with = "lenient::string")]
    details: String,
    #[serde(default, deserialize_with = "lenient::opt_int")]
    due_epoch_day: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_int")]
    category_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient::priority")]
    priority: Priority,
    #[serde(default, deserialize_with = "lenient::boolean")]
    completed: bool,
    #[serde(default, deserialize_with = "lenient::boolean")]
    archived: bool,
    #[serde(default, deserialize_with = "lenient::repeat")]
    repeat: RepeatRule,
    #[serde(default, deserialize_with = "lenient::opt_int")]
    created_at: Option<i64>,
}

/// Record shape of the flat task array written before categories existed.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyTask {
    #[serde(default, deserialize_with = "lenient::opt_int")]
    id: Option<i64>,
    #[serde(default, deserialize_with = "lenient::string")]
    title: String,
    #[serde(default, deserialize_with = "lenient::string")]
    details: String,
    #[serde(default, deserialize_with = "lenient::string")]
    due_label: String,
    #[serde(default, deserialize_with = "lenient::string")]
    category: String,
    #[serde(default, deserialize_with = "lenient::priority")]
    priority: Priority,
    #[serde(default, deserialize_with = "lenient::boolean")]
    completed: bool,
}

impl StoredTask {
    fn from_task(task: &Task) -> Self {
        Self {
            id: task.id,
            title: task.title.clone(),
            details: task.details.clone(),
            due_epoch_day: task.due_day,
            category_id: task.category_id,
            priority: task.priority,
            completed: task.completed,
            archived: task.archived,
            repeat: task.repeat,
            created_at: Some(task.created_at_millis),
        }
    }

    fn into_task(self, now_millis: i64) -> Task {
        Task {
            id: self.id,
            title: self.title,
            details: self.details,
            due_day: self.due_epoch_day,
            category_id: self.category_id,
            priority: self.priority,
            completed: self.completed,
            archived: self.archived,
            repeat: self.repeat,
            created_at_millis: self.created_at.unwrap_or(now_millis),
        }
    }
}

pub fn encode_state(state: &AppState) -> anyhow::Result<String> {
    let stored = StoredState {
        version: i64::from(SCHEMA_VERSION),
        next_task_id: Some(state.next_task_id),
        next_category_id: Some(state.next_category_id),
        categories: state
            .categories
            .iter()
            .map(|c| StoredCategory {
                id: c.id,
                name: c.name.clone(),
                color_hex: Some(i64::from(c.color_hex)),
            })
            .collect(),
        tasks: state.tasks.iter().map(StoredTask::from_task).collect(),
    };
    serde_json::to_string(&stored).context("failed to serialize state")
}

#[instrument(skip(raw), fields(bytes = raw.len()))]
pub fn parse_current(raw: &str, moment: Moment) -> anyhow::Result<AppState> {
    let root: Value = serde_json::from_str(raw).context("state is not valid json")?;
    if !root.is_object() {
        return Err(anyhow!("state root is not a json object"));
    }
    let stored: StoredState = serde_json::from_value(root).context("state has the wrong shape")?;
    if stored.version != i64::from(SCHEMA_VERSION) {
        debug!(version = stored.version, "state carries an unexpected version tag");
    }

    let categories: Vec<Category> = stored
        .categories
        .into_iter()
        .enumerate()
        .map(|(idx, c)| Category {
            id: c.id,
            name: c.name,
            color_hex: c
                .color_hex
                .map(argb)
                .unwrap_or(CATEGORY_PALETTE[idx % CATEGORY_PALETTE.len()]),
        })
        .collect();
    let tasks: Vec<Task> = stored
        .tasks
        .into_iter()
        .map(|t| t.into_task(moment.epoch_millis))
        .collect();

    debug!(
        categories = categories.len(),
        tasks = tasks.len(),
        "parsed current state"
    );
    Ok(AppState::from_parts(
        stored.next_task_id.unwrap_or(1),
        stored.next_category_id.unwrap_or(1),
        categories,
        tasks,
    ))
}

#[instrument(skip(raw), fields(bytes = raw.len()))]
pub fn parse_legacy(raw: &str, moment: Moment) -> anyhow::Result<AppState> {
    let root: Value = serde_json::from_str(raw).context("legacy tasks are not valid json")?;
    let Value::Array(items) = root else {
        return Err(anyhow!("legacy tasks root is not a json array"));
    };
    let count = items.len() as i64;
    let mut tasks = Vec::with_capacity(items.len());
    for (idx, item) in items.into_iter().enumerate() {
        if !item.is_object() {
            return Err(anyhow!("legacy record {idx} is not a json object"));
        }
        let legacy: LegacyTask = serde_json::from_value(item)
            .with_context(|| format!("failed parsing legacy record {idx}"))?;
        let index = idx as i64;

        let due_day = due_label_re()
            .captures(&legacy.due_label)
            .and_then(|caps| caps.name("word"))
            .map(|word| {
                if word.as_str().eq_ignore_ascii_case("today") {
                    moment.today
                } else {
                    moment.today.saturating_add(1)
                }
            });

        tasks.push(Task {
            id: legacy.id.unwrap_or(index + 1),
            title: legacy.title,
            details: legacy.details,
            due_day,
            category_id: legacy_category_id(&legacy.category),
            priority: legacy.priority,
            completed: legacy.completed,
            archived: false,
            repeat: RepeatRule::None,
            created_at_millis: moment.epoch_millis - (count - index) * LEGACY_STEP_MILLIS,
        });
    }

    info!(tasks = tasks.len(), "migrated legacy task list");
    Ok(AppState::from_parts(1, 1, default_categories(), tasks))
}

fn due_label_re() -> &'static Regex {
    static DUE_LABEL_RE: OnceLock<Regex> = OnceLock::new();
    DUE_LABEL_RE.get_or_init(|| {
        Regex::new(r"(?i)^(?P<word>today|tomorrow)").expect("valid legacy due label regex")
    })
}

fn legacy_category_id(raw: &str) -> Option<CategoryId> {
    match raw {
        "DeepWork" | "Deep Work" => Some(1),
        "Design" => Some(2),
        "Health" => Some(3),
        "Planning" => Some(4),
        _ => None,
    }
}

fn argb(raw: i64) -> u32 {
    (raw & 0xFFFF_FFFF) as u32
}

/// Reads and writes `AppState` through a preference namespace.
#[derive(Debug)]
pub struct StateAdapter<P> {
    prefs: P,
}

impl<P: Preferences> StateAdapter<P> {
    pub fn new(prefs: P) -> Self {
        Self { prefs }
    }

    pub fn prefs(&self) -> &P {
        &self.prefs
    }

    /// Current key first, then the legacy key. Any failure reads as "nothing saved".
    #[instrument(skip(self))]
    pub fn load(&self, moment: Moment) -> Option<AppState> {
        match self.try_load(moment) {
            Ok(state) => state,
            Err(err) => {
                warn!(error = ?err, "discarding unreadable saved state");
                None
            }
        }
    }

    fn try_load(&self, moment: Moment) -> anyhow::Result<Option<AppState>> {
        if let Some(raw) = self.prefs.get_string(STATE_KEY)? {
            return parse_current(&raw, moment)
                .map(Some)
                .with_context(|| format!("failed to load {STATE_KEY}"));
        }
        if let Some(raw) = self.prefs.get_string(LEGACY_TASKS_KEY)? {
            info!("found legacy task list; migrating");
            return parse_legacy(&raw, moment)
                .map(Some)
                .with_context(|| format!("failed to load {LEGACY_TASKS_KEY}"));
        }
        debug!("no saved state");
        Ok(None)
    }

    /// Overwrites the whole saved blob in the current format.
    #[instrument(skip(self, state), fields(tasks = state.tasks.len()))]
    pub fn save(&self, state: &AppState) -> anyhow::Result<()> {
        let raw = encode_state(state)?;
        self.prefs
            .put_string(STATE_KEY, &raw)
            .with_context(|| format!("failed to write {STATE_KEY}"))
    }
}

/// Field decoders that fall back to a default instead of failing.
mod lenient {
    use serde::de::{DeserializeOwned, Error};
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    use crate::task::{Priority, RepeatRule};

    fn as_i64(value: &Value) -> Option<i64> {
        match value {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn int<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        Ok(as_i64(&Value::deserialize(d)?).unwrap_or(0))
    }

    pub fn opt_int<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        Ok(as_i64(&Value::deserialize(d)?))
    }

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::String(s) => s,
            Value::Null => String::new(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => String::new(),
        })
    }

    pub fn boolean<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Bool(b) => b,
            Value::String(s) => s.eq_ignore_ascii_case("true"),
            _ => false,
        })
    }

    pub fn priority<'de, D: Deserializer<'de>>(d: D) -> Result<Priority, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::String(s) => match s.as_str() {
                "High" => Priority::High,
                "Low" => Priority::Low,
                _ => Priority::Medium,
            },
            _ => Priority::Medium,
        })
    }

    pub fn repeat<'de, D: Deserializer<'de>>(d: D) -> Result<RepeatRule, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::String(s) => match s.as_str() {
                "Daily" => RepeatRule::Daily,
                "Weekly" => RepeatRule::Weekly,
                _ => RepeatRule::None,
            },
            _ => RepeatRule::None,
        })
    }

    /// A non-array reads as empty; a non-object element is an error.
    pub fn records<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        let Value::Array(items) = Value::deserialize(d)? else {
            return Ok(Vec::new());
        };
        items
            .into_iter()
            .enumerate()
            .map(|(idx, item)| {
                if !item.is_object() {
                    return Err(D::Error::custom(format!("record {idx} is not an object")));
                }
                serde_json::from_value(item).map_err(D::Error::custom)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{LEGACY_TASKS_KEY, STATE_KEY, StateAdapter, encode_state, parse_current, parse_legacy};
    use crate::datetime::Moment;
    use crate::prefs::{MemoryPreferences, Preferences};
    use crate::state::{AppState, CATEGORY_PALETTE, default_categories};
    use crate::task::{Priority, RepeatRule};
    use crate::view;

    const NOW: i64 = 1_700_000_000_000;

    fn moment() -> Moment {
        Moment::fixed(100, NOW)
    }

    #[test]
    fn encoded_state_uses_documented_field_names() {
        let state = AppState::seeded(moment(), true);
        let raw = encode_state(&state).expect("encode");
        let json: serde_json::Value = serde_json::from_str(&raw).expect("json");

        assert_eq!(json["version"], 2);
        assert_eq!(json["nextTaskId"], 5);
        assert_eq!(json["categories"][1]["name"], "Design");
        assert_eq!(json["categories"][0]["colorHex"], i64::from(CATEGORY_PALETTE[0]));
        let first = &json["tasks"][0];
        assert_eq!(first["dueEpochDay"], 100);
        assert_eq!(first["priority"], "High");
        assert_eq!(first["repeat"], "None");
        assert_eq!(first["createdAt"], NOW - 4_000);
        assert!(json["tasks"][0].get("categoryId").is_some());
    }

    #[test]
    fn tolerant_fields_fall_back_to_defaults() {
        let raw = r#"{
            "version": 2,
            "nextTaskId": 2,
            "categories": [{"id": 9, "name": "Errands"}],
            "tasks": [
                {"id": 7, "title": "odd", "priority": "Urgent", "repeat": 3,
                 "dueEpochDay": null, "categoryId": "9", "completed": "true"},
                {"id": 3, "title": "plain", "createdAt": 55}
            ]
        }"#;
        let state = parse_current(raw, moment()).expect("parse");

        let odd = state.task(7).expect("task 7");
        assert_eq!(odd.priority, Priority::Medium);
        assert_eq!(odd.repeat, RepeatRule::None);
        assert_eq!(odd.due_day, None);
        assert_eq!(odd.category_id, Some(9));
        assert!(odd.completed);
        assert!(!odd.archived);
        assert_eq!(odd.details, "");
        assert_eq!(odd.created_at_millis, NOW);
        assert_eq!(state.task(3).map(|t| t.created_at_millis), Some(55));

        assert_eq!(state.categories[0].color_hex, CATEGORY_PALETTE[0]);
        assert_eq!(state.next_task_id, 8);
        assert_eq!(state.next_category_id, 10);
    }

    #[test]
    fn empty_categories_become_defaults() {
        let state = parse_current(r#"{"categories": "nope", "tasks": []}"#, moment())
            .expect("parse");
        assert_eq!(state.categories, default_categories());
        assert_eq!(state.next_category_id, 5);
        assert_eq!(state.next_task_id, 1);
    }

    #[test]
    fn wrong_shapes_are_errors() {
        assert!(parse_current("not json", moment()).is_err());
        assert!(parse_current("[1, 2]", moment()).is_err());
        assert!(parse_current(r#"{"tasks": [1]}"#, moment()).is_err());
        assert!(parse_legacy(r#"{"id": 1}"#, moment()).is_err());
        assert!(parse_legacy("[\"x\"]", moment()).is_err());
    }

    #[test]
    fn legacy_records_are_mapped() {
        let raw = r#"[
            {"id": 4, "title": "a", "dueLabel": "Today 9am", "category": "Design", "priority": "High"},
            {"title": "b", "dueLabel": "tomorrow", "category": "Chores", "completed": true},
            {"id": 3, "title": "c", "dueLabel": "Fri", "category": "Deep Work"}
        ]"#;
        let state = parse_legacy(raw, moment()).expect("parse legacy");
        let tasks = &state.tasks;
        assert_eq!(tasks.len(), 3);

        assert_eq!(tasks[0].id, 4);
        assert_eq!(tasks[0].due_day, Some(100));
        assert_eq!(tasks[0].category_id, Some(2));
        assert_eq!(tasks[0].priority, Priority::High);

        assert_eq!(tasks[1].id, 2);
        assert_eq!(tasks[1].due_day, Some(101));
        assert_eq!(tasks[1].category_id, None);
        assert!(tasks[1].completed);

        assert_eq!(tasks[2].due_day, None);
        assert_eq!(tasks[2].category_id, Some(1));

        assert!(tasks[0].created_at_millis < tasks[1].created_at_millis);
        assert!(tasks[1].created_at_millis < tasks[2].created_at_millis);
        assert_eq!(tasks[2].created_at_millis, NOW - 1_000);
        assert!(tasks.iter().all(|t| !t.archived && t.repeat == RepeatRule::None));
        assert_eq!(state.categories, default_categories());
        assert_eq!(state.next_task_id, 5);
    }

    #[test]
    fn current_key_wins_and_bad_current_is_absent() {
        let prefs = MemoryPreferences::with_value(LEGACY_TASKS_KEY, r#"[{"title": "old"}]"#);
        prefs.put_string(STATE_KEY, "{broken").expect("put");
        let adapter = StateAdapter::new(prefs);
        assert_eq!(adapter.load(moment()), None);

        adapter.prefs().remove(STATE_KEY);
        let migrated = adapter.load(moment()).expect("legacy state");
        assert_eq!(migrated.tasks[0].title, "old");

        adapter.save(&migrated).expect("save");
        let raw = adapter.prefs().get_string(STATE_KEY).expect("get").expect("saved");
        assert!(raw.contains("\"version\":2"));
        assert_eq!(adapter.load(moment()), Some(migrated));
    }

    #[test]
    fn extreme_numbers_load_without_overflow() {
        let adapter = StateAdapter::new(MemoryPreferences::with_value(
            STATE_KEY,
            r#"{"nextTaskId": -9223372036854775808, "tasks": []}"#,
        ));
        let state = adapter.load(moment()).expect("state loads");
        assert_eq!(state.next_task_id, 1);

        let state = parse_current(
            r#"{"tasks": [{"id": 9223372036854775807, "title": "x", "dueEpochDay": -1e300}]}"#,
            moment(),
        )
        .expect("parse");
        let task = &state.tasks[0];
        assert_eq!(task.id, i64::MAX);
        assert_eq!(state.next_task_id, i64::MAX);
        assert_eq!(task.due_day, Some(i64::MIN));
        assert!(view::due_label(task.due_day, 100).ends_with("d overdue"));
        assert_eq!(view::stats(&state.tasks, 100).overdue, 1);
    }

    #[test]
    fn nothing_saved_is_absent() {
        let adapter = StateAdapter::new(MemoryPreferences::new());
        assert_eq!(adapter.load(moment()), None);
    }
}
