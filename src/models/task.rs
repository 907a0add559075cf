use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A task as returned by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    pub due_date: DateTime<Utc>,
}

/// Body for creating a task. The backend expects `createdTime` here even
/// though it echoes the field back as `createdAt`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub category: String,
    pub created_time: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
}

impl NewTask {
    pub fn new(
        title: String,
        description: String,
        category: String,
        due_date: DateTime<Utc>,
    ) -> Self {
        Self {
            title,
            description,
            category,
            created_time: Utc::now(),
            due_date,
        }
    }
}

/// Sort order for the task list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskSort {
    CreatedAt,
    DueDate,
}

impl TaskSort {
    /// Parse a CLI sort argument.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" | "createdAt" => Some(TaskSort::CreatedAt),
            "due" | "dueDate" => Some(TaskSort::DueDate),
            _ => None,
        }
    }
}

/// Filter by exact category (when given), then sort. Tasks without a created
/// date sort first under `CreatedAt`.
pub fn filter_and_sort(
    tasks: Vec<Task>,
    category: Option<&str>,
    sort: Option<TaskSort>,
) -> Vec<Task> {
    let mut tasks: Vec<Task> = match category {
        Some(category) => tasks.into_iter().filter(|t| t.category == category).collect(),
        None => tasks,
    };

    match sort {
        Some(TaskSort::CreatedAt) => {
            tasks.sort_by_key(|t| t.created_at.map(|dt| dt.timestamp_millis()).unwrap_or(i64::MIN));
        }
        Some(TaskSort::DueDate) => {
            tasks.sort_by_key(|t| t.due_date.timestamp_millis());
        }
        None => {}
    }

    tasks
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn task(id: &str, category: &str, created_s: i64, due_s: i64) -> Task {
        Task {
            id: id.to_string(),
            title: format!("task {id}"),
            description: String::new(),
            category: category.to_string(),
            created_at: Some(Utc.timestamp_opt(created_s, 0).unwrap()),
            due_date: Utc.timestamp_opt(due_s, 0).unwrap(),
        }
    }

    #[test]
    fn test_sort_by_due_date() {
        let tasks = vec![
            task("a", "Home", 100, 3000),
            task("b", "Home", 200, 1000),
            task("c", "Home", 300, 2000),
        ];
        let sorted = filter_and_sort(tasks, None, Some(TaskSort::DueDate));
        let ids: Vec<&str> = sorted.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_sort_by_created_date_handles_missing() {
        let mut tasks = vec![
            task("a", "Home", 300, 1000),
            task("b", "Home", 100, 1000),
        ];
        tasks.push(Task {
            created_at: None,
            ..task("c", "Home", 0, 1000)
        });
        let sorted = filter_and_sort(tasks, None, Some(TaskSort::CreatedAt));
        let ids: Vec<&str> = sorted.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_filter_by_category() {
        let tasks = vec![
            task("a", "Home", 1, 1),
            task("b", "Office", 2, 2),
            task("c", "Home", 3, 3),
        ];
        let filtered = filter_and_sort(tasks, Some("Home"), None);
        assert_eq!(filtered.len(), 2);
        assert!(filtered.iter().all(|t| t.category == "Home"));
    }

    #[test]
    fn test_task_parses_backend_shape() {
        let json = r#"{
            "id": "64b1",
            "title": "Renew lease",
            "description": "Sign and send back",
            "category": "Lease",
            "createdAt": "2026-08-01T09:30:00.000Z",
            "dueDate": "2026-09-01T00:00:00.000Z"
        }"#;
        let parsed: Task = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.id, "64b1");
        assert_eq!(parsed.category, "Lease");
        assert!(parsed.created_at.is_some());
    }

    #[test]
    fn test_new_task_serializes_created_time() {
        let draft = NewTask::new(
            "Title".into(),
            "Desc".into(),
            "Other".into(),
            Utc.timestamp_opt(1_900_000_000, 0).unwrap(),
        );
        let json = serde_json::to_value(&draft).unwrap();
        assert!(json.get("createdTime").is_some());
        assert!(json.get("dueDate").is_some());
        assert!(json.get("created_time").is_none());
    }
}
