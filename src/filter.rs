// Status and search filtering for the visible task list

use crate::models::Task;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which tasks to show by completion state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Active,
    Completed,
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusFilter::All => write!(f, "all"),
            StatusFilter::Active => write!(f, "active"),
            StatusFilter::Completed => write!(f, "completed"),
        }
    }
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(StatusFilter::All),
            "active" => Ok(StatusFilter::Active),
            "completed" | "done" => Ok(StatusFilter::Completed),
            other => Err(format!("unknown filter: {} (expected all, active or completed)", other)),
        }
    }
}

/// Status filter plus free-text search, as selected in the UI
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewFilter {
    pub status: StatusFilter,
    pub query: String,
}

impl ViewFilter {
    pub fn new(status: StatusFilter, query: impl Into<String>) -> Self {
        Self {
            status,
            query: query.into(),
        }
    }

    /// Status filters take precedence: the search query is only consulted
    /// when the status filter is `All`.
    pub fn matches(&self, task: &Task) -> bool {
        match self.status {
            StatusFilter::Active => !task.completed,
            StatusFilter::Completed => task.completed,
            StatusFilter::All if !self.query.is_empty() => {
                task.text.to_lowercase().contains(&self.query.to_lowercase())
            }
            StatusFilter::All => true,
        }
    }
}

/// Tasks matching `status` and `query`, in display order
pub fn filtered<'a>(tasks: &'a [Task], status: StatusFilter, query: &str) -> Vec<&'a Task> {
    let filter = ViewFilter::new(status, query);
    tasks.iter().filter(|task| filter.matches(task)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Priority, now};

    fn task(text: &str, completed: bool) -> Task {
        let mut task = Task::new(text, Priority::Medium, None, now()).unwrap();
        task.completed = completed;
        task
    }

    fn texts(tasks: Vec<&Task>) -> Vec<&str> {
        tasks.into_iter().map(|t| t.text.as_str()).collect()
    }

    fn sample() -> Vec<Task> {
        vec![
            task("Buy Milk", false),
            task("Call mom", true),
            task("milk the cow", true),
            task("File taxes", false),
        ]
    }

    #[test]
    fn test_all_without_query_returns_everything() {
        let tasks = sample();
        assert_eq!(filtered(&tasks, StatusFilter::All, "").len(), 4);
    }

    #[test]
    fn test_active_preserves_order() {
        let tasks = sample();
        assert_eq!(texts(filtered(&tasks, StatusFilter::Active, "")), vec!["Buy Milk", "File taxes"]);
    }

    #[test]
    fn test_completed() {
        let tasks = sample();
        assert_eq!(texts(filtered(&tasks, StatusFilter::Completed, "")), vec!["Call mom", "milk the cow"]);
    }

    #[test]
    fn test_query_is_case_insensitive_substring() {
        let tasks = sample();
        assert_eq!(texts(filtered(&tasks, StatusFilter::All, "MILK")), vec!["Buy Milk", "milk the cow"]);
        assert!(filtered(&tasks, StatusFilter::All, "groceries").is_empty());
    }

    #[test]
    fn test_status_filter_ignores_query() {
        let tasks = sample();
        // "milk" would exclude "File taxes" if the two were combined
        assert_eq!(
            texts(filtered(&tasks, StatusFilter::Active, "milk")),
            vec!["Buy Milk", "File taxes"]
        );
        assert_eq!(
            texts(filtered(&tasks, StatusFilter::Completed, "taxes")),
            vec!["Call mom", "milk the cow"]
        );
    }

    #[test]
    fn test_status_filter_parse() {
        assert_eq!("Active".parse::<StatusFilter>().unwrap(), StatusFilter::Active);
        assert_eq!("done".parse::<StatusFilter>().unwrap(), StatusFilter::Completed);
        assert!("someday".parse::<StatusFilter>().is_err());
        assert_eq!(StatusFilter::Completed.to_string(), "completed");
    }
}
