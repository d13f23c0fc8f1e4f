//! Completion statistics for the dashboard view.

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Serialize;

use taskboard_proto::Task;

/// Tasks completed on one calendar day (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DailyCount {
    /// The day.
    pub date: NaiveDate,
    /// Tasks whose `completed_at` falls on it.
    pub completed: usize,
}

/// Totals and a per-day completion series ending today.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionTrend {
    /// One entry per day, oldest first, the last one being today.
    pub days: Vec<DailyCount>,
    /// All tasks.
    pub total: usize,
    /// Completed tasks.
    pub completed: usize,
    /// Incomplete tasks.
    pub open: usize,
    /// Incomplete tasks past their due time.
    pub overdue: usize,
}

impl CompletionTrend {
    /// Computes the trend over the last `days` days, today included.
    ///
    /// Completed tasks without a `completed_at` count towards the totals but
    /// not towards any day.
    #[must_use]
    pub fn compute(tasks: &[Task], now: DateTime<Utc>, days: u32) -> Self {
        let today = now.date_naive();
        let span = u64::from(days.max(1));
        let first = today
            .checked_sub_days(Days::new(span - 1))
            .unwrap_or(NaiveDate::MIN);

        let mut series: Vec<DailyCount> = first
            .iter_days()
            .take_while(|d| *d <= today)
            .map(|date| DailyCount { date, completed: 0 })
            .collect();

        for task in tasks.iter().filter(|t| t.completed) {
            let Some(done) = task.completed_at.map(|ts| ts.date_naive()) else {
                continue;
            };
            if let Some(slot) = series.iter_mut().find(|d| d.date == done) {
                slot.completed += 1;
            }
        }

        let completed = tasks.iter().filter(|t| t.completed).count();
        Self {
            days: series,
            total: tasks.len(),
            completed,
            open: tasks.len() - completed,
            overdue: tasks.iter().filter(|t| t.is_overdue(now)).count(),
        }
    }

    /// Share of tasks completed, `0.0` when there are none.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn completion_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}
