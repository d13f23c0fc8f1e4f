//! `taskboard`: task lists with realtime sync, from the terminal.
//!
//! Talks to a PostgREST-style backend plus the privileged `taskboard-api`,
//! or runs against seeded in-memory data with `--demo` (also the fallback
//! when no backend is configured).
//!
//! ```bash
//! # Offline demo mode
//! cargo run --bin taskboard -- --demo tasks
//!
//! # Against a backend
//! TASKBOARD_BACKEND_URL=https://proj.example.co TASKBOARD_API_KEY=anon \
//! TASKBOARD_USER_ID=... TASKBOARD_ACCESS_TOKEN=... \
//!     cargo run --bin taskboard -- complete <task-id> <task-id>
//! ```

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_appender::non_blocking::WorkerGuard;

use taskboard::account;
use taskboard::board::store::{BoardSnapshot, ViewMode};
use taskboard::board::{Board, BoardError};
use taskboard::config::{CliArgs, ClientConfig, Command};
use taskboard::demo;
use taskboard::forms::{NewListForm, NewTaskForm, TaskEditForm};
use taskboard::gateway::Gateway;
use taskboard::gateway::rest::RestGateway;
use taskboard::session::Session;
use taskboard_proto::{List, ListId, Task, TaskId};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            ClientConfig::default()
        }
    };

    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());
    tracing::info!("taskboard starting");

    let command = cli.command.clone().unwrap_or(Command::Tasks { completed: false });

    let remote = if cli.demo {
        None
    } else {
        config.to_rest_settings().zip(config.to_session())
    };

    let result = match remote {
        Some((settings, session)) => match RestGateway::new(&settings) {
            Ok(gateway) => run(Arc::new(gateway), session, &config, command).await,
            Err(e) => Err(e.into()),
        },
        None => {
            if !cli.demo {
                eprintln!("No backend configured; running in demo mode.");
            }
            let gateway = Arc::new(demo::seeded_gateway(Utc::now()));
            run(gateway, demo::session(), &config, command).await
        }
    };

    tracing::info!("taskboard exiting");
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize file-based logging; stdout carries the command output.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("taskboard.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

async fn run<G: Gateway + 'static>(
    gateway: Arc<G>,
    session: Session,
    config: &ClientConfig,
    command: Command,
) -> Result<(), BoardError> {
    let mode = match command {
        Command::Tasks { completed: true } => ViewMode::Completed,
        _ => ViewMode::Open,
    };

    if command == Command::RegisterProfile {
        if account::sync_profile(&*gateway, &session).await {
            println!("Profile saved for {}", session.user_id);
        } else {
            println!("Profile could not be saved; see the log for details.");
        }
        return Ok(());
    }

    let board = Board::new(gateway, session, mode, config.event_queue_capacity);
    board.load_initial().await?;
    let result = execute(&board, config, command).await;
    board.teardown().await;
    result
}

#[allow(clippy::too_many_lines)]
async fn execute<G: Gateway + 'static>(
    board: &Board<G>,
    config: &ClientConfig,
    command: Command,
) -> Result<(), BoardError> {
    match command {
        Command::Lists => {
            for list in board.snapshot().lists {
                println!("{}  {}", list.id, list.name);
            }
        }
        Command::Tasks { .. } | Command::RegisterProfile => print_board(&board.snapshot()),
        Command::Complete { ids } => {
            let bulk = board.bulk();
            for id in &ids {
                if !bulk.select(&TaskId::new(id.as_str())) {
                    println!("skipping {id}: not an open task");
                }
            }
            let removed = bulk.complete_selected().await?;
            println!("Completed {removed} of {} task(s)", bulk_requested(&ids));
        }
        Command::Show { id } => match board.fetch_task(&TaskId::new(id.as_str())).await? {
            Some(task) => print_task(&task, &board.snapshot().lists),
            None => println!("No task {id}"),
        },
        Command::Done { id } => {
            let task = board.complete_task(&TaskId::new(id)).await?;
            println!("Completed {}", task.name);
        }
        Command::Delete { ids, yes } => {
            let bulk = board.bulk();
            for id in &ids {
                bulk.select(&TaskId::new(id.as_str()));
            }
            let Some(pending) = bulk.request_delete() else {
                println!("Nothing to delete");
                return Ok(());
            };
            if !yes && !confirm(&format!("Delete {} task(s)?", pending.len())).await {
                println!("Cancelled");
                return Ok(());
            }
            let removed = bulk.confirm_delete(pending).await?;
            println!("Deleted {removed} task(s)");
        }
        Command::AddTask {
            name,
            description,
            due,
            list,
        } => {
            let form = NewTaskForm {
                name,
                description,
                due_date: due,
                list_id: list.map(ListId::new),
            };
            let task = board.create_task(&form).await?;
            println!("Added {}  {}", task.id, task.name);
        }
        Command::Edit {
            id,
            name,
            description,
            due,
        } => {
            let form = TaskEditForm {
                name,
                description,
                due_date: due,
            };
            let task = board.edit_task(&TaskId::new(id), &form).await?;
            println!("Saved {}  {}", task.id, task.name);
        }
        Command::AddList { name } => {
            let list = board.create_list(&NewListForm { name }).await?;
            println!("Created list {}  {}", list.id, list.name);
        }
        Command::Watch => {
            board.start_realtime().await?;
            print_board(&board.snapshot());
            let mut last = board.snapshot();
            let mut ticker = tokio::time::interval(Duration::from_millis(250));
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    _ = ticker.tick() => {
                        let current = board.snapshot();
                        if current != last {
                            println!();
                            print_board(&current);
                            last = current;
                        }
                    }
                }
            }
        }
        Command::Dashboard { days } => {
            let days = days.unwrap_or(config.trend_days);
            let trend = board.dashboard(Utc::now(), days).await?;
            println!(
                "{} tasks: {} open, {} completed, {} overdue ({:.0}% done)",
                trend.total,
                trend.open,
                trend.completed,
                trend.overdue,
                trend.completion_rate() * 100.0
            );
            for day in &trend.days {
                println!("{}  {}", day.date, "#".repeat(day.completed));
            }
        }
    }
    Ok(())
}

fn print_board(snapshot: &BoardSnapshot) {
    if let Some(err) = &snapshot.last_error {
        println!("! {err}");
    }
    for bucket in &snapshot.buckets {
        let title = bucket
            .name
            .clone()
            .unwrap_or_else(|| bucket.key.to_string());
        println!("[{title}]");
        if bucket.tasks.is_empty() {
            println!("  (no tasks in this list yet)");
        }
        for task in &bucket.tasks {
            let due = task
                .due_date
                .map(|d| format!("  due {}", d.format("%Y-%m-%d %H:%M")))
                .unwrap_or_default();
            println!("  {}  {}{due}", task.id, task.name);
        }
    }
}

/// Distinct ids on the command line.
fn bulk_requested(ids: &[String]) -> usize {
    ids.iter().collect::<std::collections::HashSet<_>>().len()
}

fn print_task(task: &Task, lists: &[List]) {
    let status = if task.completed { "done" } else { "open" };
    println!("{}  {}  [{status}]", task.id, task.name);
    if let Some(description) = &task.description {
        println!("  {description}");
    }
    let list = task.list_id.as_ref().map_or_else(
        || "no list".to_string(),
        |id| {
            lists
                .iter()
                .find(|l| &l.id == id)
                .map_or_else(|| id.to_string(), |l| l.name.clone())
        },
    );
    println!("  list: {list}");
    if let Some(due) = task.due_date {
        println!("  due: {}", due.format("%Y-%m-%d %H:%M"));
    }
    if let Some(at) = task.completed_at {
        println!("  completed: {}", at.format("%Y-%m-%d %H:%M"));
    }
    println!("  created: {}", task.created_at.format("%Y-%m-%d %H:%M"));
}

async fn confirm(question: &str) -> bool {
    println!("{question} [y/N]");
    let mut line = String::new();
    let mut stdin = BufReader::new(tokio::io::stdin());
    match stdin.read_line(&mut line).await {
        Ok(_) => matches!(line.trim(), "y" | "Y" | "yes"),
        Err(e) => {
            tracing::warn!(err = %e, "failed to read confirmation");
            false
        }
    }
}
