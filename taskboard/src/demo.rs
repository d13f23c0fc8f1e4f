//! Seed data for offline demo mode.

use chrono::{DateTime, Duration, Utc};

use taskboard_proto::{List, ListId, Task, TaskId, UserId};

use crate::gateway::memory::InMemoryGateway;
use crate::session::Session;

/// User id of the demo session.
pub const DEMO_USER: &str = "demo-user";

/// Session used in demo mode.
#[must_use]
pub fn session() -> Session {
    Session::new(
        UserId::new(DEMO_USER),
        "demo-token",
        Some("demo@example.com".to_string()),
    )
}

/// An in-memory gateway holding two lists and a handful of tasks relative
/// to `now`, one of them overdue and two completed.
#[must_use]
pub fn seeded_gateway(now: DateTime<Utc>) -> InMemoryGateway {
    let gw = InMemoryGateway::new();
    let owner = UserId::new(DEMO_USER);

    let lists = [("list-work", "Work", 3), ("list-home", "Home", 2)];
    for (id, name, days_ago) in lists {
        gw.seed_list(List {
            id: ListId::new(id),
            name: name.to_string(),
            user_id: owner.clone(),
            created_at: now - Duration::days(days_ago),
        });
    }

    let tasks: [(&str, &str, Option<&str>, i64, Option<i64>, bool); 6] = [
        ("task-1", "Draft quarterly report", Some("list-work"), 72, Some(-24), false),
        ("task-2", "Review pull requests", Some("list-work"), 48, Some(24), false),
        ("task-3", "Book dentist", Some("list-home"), 40, None, false),
        ("task-4", "Water the plants", None, 20, None, false),
        ("task-5", "Pay electricity bill", Some("list-home"), 60, None, true),
        ("task-6", "Send invoice", Some("list-work"), 30, None, true),
    ];
    for (id, name, list, hours_ago, due_in_hours, completed) in tasks {
        gw.seed_task(Task {
            id: TaskId::new(id),
            name: name.to_string(),
            description: None,
            user_id: owner.clone(),
            list_id: list.map(ListId::new),
            completed,
            due_date: due_in_hours.map(|h| now + Duration::hours(h)),
            completed_at: completed.then(|| now - Duration::hours(hours_ago / 2)),
            created_at: now - Duration::hours(hours_ago),
        });
    }
    gw
}
