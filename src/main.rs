use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use colored::Colorize;
use eyre::{Result, eyre};
use std::path::PathBuf;
use tasklist::config::{self, BackendKind, Config};
use tasklist::{Priority, StatusFilter, StoreEvent, Task, TaskStore, Theme};
use tokio::sync::broadcast;

#[derive(Parser)]
#[command(name = "tasklist")]
#[command(about = "tasklist CLI - To-do list with priorities, due dates and search")]
#[command(version)]
struct Cli {
    /// Path to the store directory (default: platform data dir)
    #[arg(short, long)]
    store_path: Option<PathBuf>,

    /// Storage backend (overrides config.yaml)
    #[arg(short, long, value_enum)]
    backend: Option<BackendKind>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a task at the top of the list
    Add {
        text: String,
        #[arg(short, long)]
        priority: Option<Priority>,
        /// Due date (RFC 3339); ignored unless in the future
        #[arg(short, long)]
        due: Option<DateTime<Utc>>,
    },

    /// List tasks
    List {
        #[arg(short, long, default_value = "all")]
        filter: StatusFilter,
        /// Case-insensitive search, only applied with --filter all
        #[arg(short, long, default_value = "")]
        query: String,
    },

    /// Toggle completion
    Toggle { id: String },

    /// Replace the text of a task
    Edit { id: String, text: String },

    /// Set priority; without a value, cycle to the next one
    Priority { id: String, priority: Option<Priority> },

    /// Set or clear the due date
    Due { id: String, date: Option<DateTime<Utc>> },

    /// Delete a task
    Rm { id: String },

    /// Move the task at FROM so it ends up at TO (0-based)
    Move { from: usize, to: usize },

    /// Delete all completed tasks
    ClearCompleted,

    /// Delete every task
    ClearAll,

    /// Show counts and completion
    Stats,

    /// Show or set the theme
    Theme { theme: Option<Theme> },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Setup tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let store_path = cli.store_path.unwrap_or_else(config::default_store_path);
    let config = Config::load(&store_path)?;
    let backend = config::open_backend(cli.backend.unwrap_or(config.backend), &store_path)?;

    let mut store = TaskStore::new(backend);
    if let Err(e) = store.load().await {
        eprintln!("{} {}", "warning:".yellow().bold(), e);
    }

    match cli.command {
        Commands::Add { text, priority, due } => {
            let priority = priority.unwrap_or(config.default_priority);
            match store.add(&text, priority, due) {
                Some(id) => println!("Added {}", short_id(&id).cyan()),
                None => return Err(eyre!("Task text cannot be empty")),
            }
        }
        Commands::List { filter, query } => {
            let tasks = store.filtered(filter, &query);
            if tasks.is_empty() {
                println!("No tasks");
            }
            let now = Utc::now();
            for (index, task) in tasks.into_iter().enumerate() {
                print_task(index, task, now);
            }
        }
        Commands::Toggle { id } => {
            let id = resolve_id(&store, &id)?;
            let mut events = store.subscribe();
            let completed = store.toggle(&id).ok_or_else(|| eyre!("Task not found: {}", id))?;
            println!("{} {}", if completed { "Completed" } else { "Reopened" }, short_id(&id).cyan());
            if all_completed(&mut events) {
                println!("{}", "All tasks completed!".green().bold());
            }
        }
        Commands::Edit { id, text } => {
            let id = resolve_id(&store, &id)?;
            if !store.edit(&id, &text) {
                return Err(eyre!("Task text cannot be empty"));
            }
            println!("Updated {}", short_id(&id).cyan());
        }
        Commands::Priority { id, priority } => {
            let id = resolve_id(&store, &id)?;
            let current = store.get(&id).map(|t| t.priority).unwrap_or_default();
            let priority = priority.unwrap_or_else(|| current.next());
            store.set_priority(&id, priority);
            println!("{} is now {}", short_id(&id).cyan(), priority);
        }
        Commands::Due { id, date } => {
            let id = resolve_id(&store, &id)?;
            store.set_due_date(&id, date);
            match date {
                Some(date) => println!("{} due {}", short_id(&id).cyan(), format_date(date)),
                None => println!("{} has no due date", short_id(&id).cyan()),
            }
        }
        Commands::Rm { id } => {
            let id = resolve_id(&store, &id)?;
            store.remove(&id);
            println!("Deleted {}", short_id(&id).cyan());
        }
        Commands::Move { from, to } => {
            store.reorder(from, to)?;
            println!("Moved task {} to {}", from, to);
        }
        Commands::ClearCompleted => {
            let removed = store.clear_completed();
            println!("Removed {} completed task(s)", removed);
        }
        Commands::ClearAll => {
            let count = store.len();
            store.clear_all();
            println!("Removed {} task(s)", count);
        }
        Commands::Stats => {
            let counts = store.counts();
            println!("Total:      {}", counts.total);
            println!("Active:     {}", counts.active);
            println!("Completed:  {}", counts.completed);
            println!("High:       {}", counts.high_priority.to_string().red());
            println!("Overdue:    {}", counts.overdue.to_string().yellow());
            println!("Progress:   {}%", counts.completion_percentage());
        }
        Commands::Theme { theme } => {
            if let Some(theme) = theme {
                store.set_theme(theme);
            }
            println!("Theme: {}", store.theme());
        }
    }

    store.flush().await;
    Ok(())
}

/// Resolve a full id, or a unique prefix or suffix of one
fn resolve_id(store: &TaskStore, query: &str) -> Result<String> {
    let query = query.trim();
    if query.is_empty() {
        return Err(eyre!("Task id cannot be empty"));
    }

    let matches: Vec<&Task> = store
        .tasks()
        .iter()
        .filter(|t| t.id.starts_with(query) || t.id.ends_with(query))
        .collect();
    match matches.as_slice() {
        [task] => Ok(task.id.clone()),
        [] => Err(eyre!("Task not found: {}", query)),
        _ => Err(eyre!("Ambiguous id: {} ({} matches)", query, matches.len())),
    }
}

// UUID v7 ids share a timestamp prefix, so show the random tail
/// Drain pending store events; true if the store announced that every task is done
fn all_completed(events: &mut broadcast::Receiver<StoreEvent>) -> bool {
    let mut celebrated = false;
    while let Ok(event) = events.try_recv() {
        celebrated |= event == StoreEvent::AllCompleted;
    }
    celebrated
}

fn short_id(id: &str) -> &str {
    id.rsplit('-').next().unwrap_or(id)
}

fn format_date(date: DateTime<Utc>) -> String {
    date.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

fn print_task(index: usize, task: &Task, now: DateTime<Utc>) {
    let check = if task.completed { "[x]" } else { "[ ]" };
    let priority = match task.priority {
        Priority::High => "high".red(),
        Priority::Medium => "med".yellow(),
        Priority::Low => "low".dimmed(),
    };
    let text = if task.completed {
        task.text.strikethrough().dimmed()
    } else {
        task.text.normal()
    };

    let mut line = format!("{:>3}. {} {:<4} {} {}", index, check, priority, text, short_id(&task.id).dimmed());
    if let Some(due) = task.due_date {
        let due_text = format!("(due {})", format_date(due));
        if task.is_overdue(now) {
            line.push_str(&format!(" {}", due_text.red().bold()));
        } else {
            line.push_str(&format!(" {}", due_text));
        }
    }
    println!("{}", line);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tasklist::MemoryBackend;

    fn store() -> TaskStore {
        TaskStore::new(Arc::new(MemoryBackend::new()))
    }

    #[tokio::test]
    async fn test_toggle_reports_all_completed_from_store_event() {
        let mut store = store();
        let a = store.add("a", Priority::Medium, None).unwrap();
        let b = store.add("b", Priority::Medium, None).unwrap();

        let mut events = store.subscribe();
        store.toggle(&a);
        assert!(!all_completed(&mut events));

        let mut events = store.subscribe();
        store.toggle(&b);
        assert!(all_completed(&mut events));

        let mut events = store.subscribe();
        store.toggle(&b);
        assert!(!all_completed(&mut events));
    }

    #[tokio::test]
    async fn test_resolve_id_accepts_prefix_and_shown_suffix() {
        let mut store = store();
        let id = store.add("a", Priority::Medium, None).unwrap();

        assert_eq!(resolve_id(&store, &id).unwrap(), id);
        assert_eq!(resolve_id(&store, &id[..8]).unwrap(), id);
        assert_eq!(resolve_id(&store, short_id(&id)).unwrap(), id);
        assert!(resolve_id(&store, "zzzz").is_err());
        assert!(resolve_id(&store, "  ").is_err());
    }
}
