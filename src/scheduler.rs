// scheduler.rs
// Daily background sweeps: budget renewal, recurrence processing and the two
// recurring-transaction notices.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime as ChronoDateTime, Days, NaiveTime, TimeZone, Utc};
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::{config::Schedule, error::CoreResult, state::AppState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sweep {
    BudgetRenewal,
    RecurringProcess,
    UpcomingNotify,
    MissedNotify,
}

impl Sweep {
    pub const ALL: [Sweep; 4] = [
        Sweep::BudgetRenewal,
        Sweep::RecurringProcess,
        Sweep::UpcomingNotify,
        Sweep::MissedNotify,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Sweep::BudgetRenewal => "budget_renewal",
            Sweep::RecurringProcess => "recurring_process",
            Sweep::UpcomingNotify => "upcoming_notify",
            Sweep::MissedNotify => "missed_notify",
        }
    }

    pub fn clock_time(&self, schedule: &Schedule) -> NaiveTime {
        match self {
            Sweep::BudgetRenewal => schedule.budget_renewal,
            Sweep::RecurringProcess => schedule.recurring_process,
            Sweep::UpcomingNotify => schedule.upcoming_notify,
            Sweep::MissedNotify => schedule.missed_notify,
        }
    }

    /// Runs the sweep once. Per-item failures are handled inside the sweep.
    pub async fn run(&self, state: &AppState) -> CoreResult<()> {
        match self {
            Sweep::BudgetRenewal => crate::state::renew_budgets(state).await.map(|_| ()),
            Sweep::RecurringProcess => crate::state::process_due(state).await.map(|_| ()),
            Sweep::UpcomingNotify => crate::state::notify_upcoming(state).await.map(|_| ()),
            Sweep::MissedNotify => crate::state::notify_missed(state).await.map(|_| ()),
        }
    }
}

/// Time left until the next `at` (UTC) strictly after `now`.
pub fn duration_until(now: ChronoDateTime<Utc>, at: NaiveTime) -> Duration {
    let today = Utc.from_utc_datetime(&now.date_naive().and_time(at));
    let next = if today > now {
        today
    } else {
        today.checked_add_days(Days::new(1)).unwrap_or(today)
    };
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

/// Spawns one looping task per sweep. Each task sleeps until its daily clock
/// time, runs the sweep and starts over; a failed run is logged and the
/// task keeps going.
pub fn spawn_sweeps(state: Arc<AppState>, schedule: Schedule) -> JoinSet<()> {
    let mut tasks = JoinSet::new();
    for sweep in Sweep::ALL {
        let state = state.clone();
        let at = sweep.clock_time(&schedule);
        tasks.spawn(async move {
            info!(sweep = sweep.name(), at = %at, "sweep scheduled");
            loop {
                tokio::time::sleep(duration_until(Utc::now(), at)).await;
                info!(sweep = sweep.name(), "sweep started");
                if let Err(err) = sweep.run(&state).await {
                    error!(sweep = sweep.name(), error = %err, "sweep failed");
                }
            }
        });
    }
    tasks
}
