use serde::{Deserialize, Serialize};

pub type TaskId = i64;
pub type CategoryId = i64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum RepeatRule {
    #[default]
    None,
    Daily,
    Weekly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DueOption {
    NoDate,
    #[default]
    Today,
    Tomorrow,
    NextWeek,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TaskView {
    #[default]
    All,
    Active,
    Completed,
    Today,
    Upcoming,
    Overdue,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortMode {
    #[default]
    DueSoon,
    PriorityHigh,
    Newest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub details: String,
    pub due_day: Option<i64>,
    pub category_id: Option<CategoryId>,
    pub priority: Priority,
    pub completed: bool,
    pub archived: bool,
    pub repeat: RepeatRule,
    pub created_at_millis: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub color_hex: u32,
}

impl Task {
    pub fn new(id: TaskId, title: String, created_at_millis: i64) -> Self {
        Self {
            id,
            title,
            details: String::new(),
            due_day: None,
            category_id: None,
            priority: Priority::Medium,
            completed: false,
            archived: false,
            repeat: RepeatRule::None,
            created_at_millis,
        }
    }

    pub fn is_overdue(&self, today: i64) -> bool {
        !self.archived && !self.completed && self.due_day.is_some_and(|d| d < today)
    }
}

pub struct PriorityMeta {
    pub label: &'static str,
    pub weight: u8,
    pub color_hex: u32,
}

pub struct RepeatMeta {
    pub label: &'static str,
    pub interval_days: i64,
}

pub struct DueMeta {
    pub label: &'static str,
    pub offset_days: Option<i64>,
}

static PRIORITY_TABLE: [(Priority, PriorityMeta); 3] = [
    (
        Priority::High,
        PriorityMeta {
            label: "High",
            weight: 3,
            color_hex: 0xFFE7_6F51,
        },
    ),
    (
        Priority::Medium,
        PriorityMeta {
            label: "Medium",
            weight: 2,
            color_hex: 0xFFE9_C46A,
        },
    ),
    (
        Priority::Low,
        PriorityMeta {
            label: "Low",
            weight: 1,
            color_hex: 0xFF2A_9D8F,
        },
    ),
];

static REPEAT_TABLE: [(RepeatRule, RepeatMeta); 3] = [
    (
        RepeatRule::None,
        RepeatMeta {
            label: "No Repeat",
            interval_days: 0,
        },
    ),
    (
        RepeatRule::Daily,
        RepeatMeta {
            label: "Daily",
            interval_days: 1,
        },
    ),
    (
        RepeatRule::Weekly,
        RepeatMeta {
            label: "Weekly",
            interval_days: 7,
        },
    ),
];

static DUE_TABLE: [(DueOption, DueMeta); 4] = [
    (
        DueOption::NoDate,
        DueMeta {
            label: "No Date",
            offset_days: None,
        },
    ),
    (
        DueOption::Today,
        DueMeta {
            label: "Today",
            offset_days: Some(0),
        },
    ),
    (
        DueOption::Tomorrow,
        DueMeta {
            label: "Tomorrow",
            offset_days: Some(1),
        },
    ),
    (
        DueOption::NextWeek,
        DueMeta {
            label: "+7d",
            offset_days: Some(7),
        },
    ),
];

static VIEW_TABLE: [(TaskView, &str); 7] = [
    (TaskView::All, "All"),
    (TaskView::Active, "Active"),
    (TaskView::Completed, "Completed"),
    (TaskView::Today, "Today"),
    (TaskView::Upcoming, "Upcoming"),
    (TaskView::Overdue, "Overdue"),
    (TaskView::Archived, "Archived"),
];

static SORT_TABLE: [(SortMode, &str); 3] = [
    (SortMode::DueSoon, "Due Soon"),
    (SortMode::PriorityHigh, "Priority"),
    (SortMode::Newest, "Newest"),
];

// Rows are kept in declaration order so a variant's discriminant is its index.
fn row<K: Copy + PartialEq, V>(table: &'static [(K, V)], key: K, index: usize) -> &'static V {
    let (k, v) = &table[index];
    debug_assert!(*k == key, "metadata table out of declaration order");
    v
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    pub fn meta(self) -> &'static PriorityMeta {
        row(&PRIORITY_TABLE, self, self as usize)
    }

    pub fn weight(self) -> u8 {
        self.meta().weight
    }
}

impl RepeatRule {
    pub const ALL: [RepeatRule; 3] = [RepeatRule::None, RepeatRule::Daily, RepeatRule::Weekly];

    pub fn meta(self) -> &'static RepeatMeta {
        row(&REPEAT_TABLE, self, self as usize)
    }

    pub fn interval_days(self) -> i64 {
        self.meta().interval_days
    }
}

impl DueOption {
    pub const ALL: [DueOption; 4] = [
        DueOption::NoDate,
        DueOption::Today,
        DueOption::Tomorrow,
        DueOption::NextWeek,
    ];

    pub fn meta(self) -> &'static DueMeta {
        row(&DUE_TABLE, self, self as usize)
    }

    pub fn resolve(self, today: i64) -> Option<i64> {
        self.meta().offset_days.map(|offset| today.saturating_add(offset))
    }
}

impl TaskView {
    pub const ALL: [TaskView; 7] = [
        TaskView::All,
        TaskView::Active,
        TaskView::Completed,
        TaskView::Today,
        TaskView::Upcoming,
        TaskView::Overdue,
        TaskView::Archived,
    ];

    pub fn label(self) -> &'static str {
        *row(&VIEW_TABLE, self, self as usize)
    }
}

impl SortMode {
    pub fn label(self) -> &'static str {
        *row(&SORT_TABLE, self, self as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::{DueOption, Priority, RepeatRule, SortMode, Task, TaskView};

    #[test]
    fn metadata_tables_cover_every_variant() {
        for p in Priority::ALL {
            assert!(!p.meta().label.is_empty());
        }
        for r in RepeatRule::ALL {
            assert!(!r.meta().label.is_empty());
        }
        for v in TaskView::ALL {
            assert!(!v.label().is_empty());
        }
        assert_eq!(Priority::High.weight(), 3);
        assert_eq!(Priority::Low.weight(), 1);
        assert_eq!(RepeatRule::Weekly.interval_days(), 7);
    }

    #[test]
    fn view_and_sort_labels() {
        let labels: Vec<&'static str> = TaskView::ALL.iter().map(|v| v.label()).collect();
        assert_eq!(
            labels,
            vec!["All", "Active", "Completed", "Today", "Upcoming", "Overdue", "Archived"]
        );
        assert_eq!(SortMode::DueSoon.label(), "Due Soon");
        assert_eq!(SortMode::PriorityHigh.label(), "Priority");
        assert_eq!(SortMode::Newest.label(), "Newest");
    }

    #[test]
    fn due_option_resolves_against_today() {
        assert_eq!(DueOption::NoDate.resolve(100), None);
        assert_eq!(DueOption::Today.resolve(100), Some(100));
        assert_eq!(DueOption::Tomorrow.resolve(100), Some(101));
        assert_eq!(DueOption::NextWeek.resolve(100), Some(107));
        assert_eq!(DueOption::Tomorrow.resolve(i64::MAX), Some(i64::MAX));
    }

    #[test]
    fn overdue_ignores_archived_and_completed() {
        let mut task = Task::new(1, "x".to_string(), 0);
        task.due_day = Some(99);
        assert!(task.is_overdue(100));

        task.archived = true;
        assert!(!task.is_overdue(100));

        task.archived = false;
        task.completed = true;
        assert!(!task.is_overdue(100));
    }
}
