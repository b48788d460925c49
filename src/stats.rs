// Derived counts over the task list

use crate::models::{Priority, Task};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub total: usize,
    pub active: usize,
    pub completed: usize,
    /// High priority and not completed
    pub high_priority: usize,
    /// Due strictly before `now` and not completed
    pub overdue: usize,
}

impl Counts {
    pub fn from_tasks(tasks: &[Task], now: DateTime<Utc>) -> Self {
        let mut counts = Counts {
            total: tasks.len(),
            ..Default::default()
        };

        for task in tasks {
            if task.completed {
                counts.completed += 1;
                continue;
            }
            counts.active += 1;
            if task.priority == Priority::High {
                counts.high_priority += 1;
            }
            if task.is_overdue(now) {
                counts.overdue += 1;
            }
        }

        counts
    }

    /// Rounded percentage of completed tasks; 0 for an empty list
    pub fn completion_percentage(&self) -> u32 {
        if self.total == 0 {
            return 0;
        }
        (self.completed as f64 / self.total as f64 * 100.0).round() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::now;
    use chrono::Duration;

    fn task(priority: Priority, completed: bool, due_in: Option<Duration>, now: DateTime<Utc>) -> Task {
        let mut task = Task::new("t", priority, None, now).unwrap();
        task.completed = completed;
        task.due_date = due_in.map(|d| now + d);
        task
    }

    #[test]
    fn test_counts() {
        let now = now();
        let tasks = vec![
            task(Priority::High, false, Some(Duration::hours(-1)), now),
            task(Priority::High, true, Some(Duration::hours(-1)), now),
            task(Priority::Low, false, Some(Duration::hours(3)), now),
            task(Priority::Medium, false, None, now),
        ];

        let counts = Counts::from_tasks(&tasks, now);
        assert_eq!(
            counts,
            Counts {
                total: 4,
                active: 3,
                completed: 1,
                high_priority: 1,
                overdue: 1,
            }
        );
    }

    #[test]
    fn test_due_exactly_now_is_not_overdue() {
        let now = now();
        let tasks = vec![task(Priority::Medium, false, Some(Duration::zero()), now)];
        assert_eq!(Counts::from_tasks(&tasks, now).overdue, 0);
    }

    #[test]
    fn test_completion_percentage_empty_is_zero() {
        assert_eq!(Counts::default().completion_percentage(), 0);
    }

    #[test]
    fn test_completion_percentage_rounds() {
        let now = now();
        let tasks = vec![
            task(Priority::Medium, true, None, now),
            task(Priority::Medium, false, None, now),
            task(Priority::Medium, false, None, now),
        ];
        // 33.33 -> 33
        assert_eq!(Counts::from_tasks(&tasks, now).completion_percentage(), 33);

        let tasks = vec![
            task(Priority::Medium, true, None, now),
            task(Priority::Medium, true, None, now),
            task(Priority::Medium, false, None, now),
        ];
        // 66.67 -> 67
        assert_eq!(Counts::from_tasks(&tasks, now).completion_percentage(), 67);
    }
}
