use chrono::{DateTime as ChronoDateTime, Utc};
use futures::stream::TryStreamExt;
use mongodb::bson::{DateTime, doc, oid::ObjectId};
use serde::Serialize;
use tracing::info;

use crate::{
    currency::round2,
    error::{CoreError, CoreResult},
    models::{FlowType, Goal, GoalStatus},
    notify::notify,
    validation::NewGoal,
};

use super::AppState;

pub async fn create_goal(state: &AppState, user_id: &ObjectId, input: NewGoal) -> CoreResult<Goal> {
    let (target_amount, current_amount) = goal_amounts(state, &input).await?;

    let now = DateTime::now();
    let mut goal = Goal {
        id: None,
        user_id: *user_id,
        name: input.name,
        target_amount,
        current_amount,
        deadline: input.deadline.map(DateTime::from_chrono),
        status: GoalStatus::InProgress,
        created_at: Some(now),
        updated_at: None,
    };
    goal.settle();

    let res = state.goals.insert_one(&goal).await?;
    goal.id = res.inserted_id.as_object_id();
    Ok(goal)
}

pub async fn get_goal(state: &AppState, user_id: &ObjectId, id: &ObjectId) -> CoreResult<Goal> {
    state
        .goals
        .find_one(doc! { "_id": id, "user_id": user_id })
        .await?
        .ok_or_else(|| CoreError::not_found("goal"))
}

pub async fn list_goals(state: &AppState, user_id: &ObjectId) -> CoreResult<Vec<Goal>> {
    let mut cursor = state
        .goals
        .find(doc! { "user_id": user_id })
        .sort(doc! { "created_at": -1 })
        .await?;
    let mut goals = Vec::new();
    while let Some(goal) = cursor.try_next().await? {
        goals.push(goal);
    }
    Ok(goals)
}

/// Replaces name, target and deadline. `current_amount` is only replaced when
/// the input carries one; either way it is re-clamped to the new target.
pub async fn update_goal(
    state: &AppState,
    user_id: &ObjectId,
    id: &ObjectId,
    input: NewGoal,
) -> CoreResult<Goal> {
    let mut goal = get_goal(state, user_id, id).await?;
    let (target_amount, current_amount) = goal_amounts(state, &input).await?;

    goal.name = input.name;
    goal.target_amount = target_amount;
    if input.current_amount.is_some() {
        goal.current_amount = current_amount;
    }
    goal.deadline = input.deadline.map(DateTime::from_chrono);
    goal.settle();
    goal.updated_at = Some(DateTime::now());

    save_goal(state, id, &goal).await?;
    Ok(goal)
}

pub async fn delete_goal(state: &AppState, user_id: &ObjectId, id: &ObjectId) -> CoreResult<Goal> {
    state
        .goals
        .find_one_and_delete(doc! { "_id": id, "user_id": user_id })
        .await?
        .ok_or_else(|| CoreError::not_found("goal"))
}

/// Lifetime income of the user, in the base currency. Expenses are not
/// deducted.
pub async fn available_funds(state: &AppState, user_id: &ObjectId) -> CoreResult<f64> {
    super::transactions::sum_amounts(
        state,
        doc! { "user_id": user_id, "flow_type": FlowType::Income.as_str() },
    )
    .await
}

pub async fn add_fund(
    state: &AppState,
    user_id: &ObjectId,
    goal_id: &ObjectId,
    amount: f64,
    currency: Option<&str>,
) -> CoreResult<Goal> {
    add_fund_at(state, user_id, goal_id, amount, currency, Utc::now()).await
}

/// Moves `amount` (in `currency`, base when absent) into a goal.
///
/// Rejected with `InsufficientFunds` when the converted amount exceeds the
/// user's lifetime income. The goal is clamped at its target; reaching it
/// sends a completion notice once. Every funding past the deadline of a goal
/// that is still short sends a deadline notice.
pub async fn add_fund_at(
    state: &AppState,
    user_id: &ObjectId,
    goal_id: &ObjectId,
    amount: f64,
    currency: Option<&str>,
    now: ChronoDateTime<Utc>,
) -> CoreResult<Goal> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(CoreError::validation("amount must be greater than 0"));
    }
    let mut goal = get_goal(state, user_id, goal_id).await?;

    let available = available_funds(state, user_id).await?;
    let requested = to_base_opt(state, amount, currency).await?;
    if available <= 0.0 {
        return Err(CoreError::InsufficientFunds {
            available: 0.0,
            requested,
        });
    }
    if requested > available {
        return Err(CoreError::InsufficientFunds {
            available: round2(available),
            requested,
        });
    }

    let completed = goal.credit(requested);
    goal.updated_at = Some(DateTime::now());
    save_goal(state, goal_id, &goal).await?;
    info!(goal_id = %goal_id, amount = requested, status = goal.status.as_str(), "goal funded");

    if completed {
        let message = format!(
            "Congratulations! You have successfully completed your goal: <strong>{}</strong>.",
            goal.name
        );
        notify(state, user_id, "Goal Completed!", &message).await;
    }
    if goal.status != GoalStatus::Completed && goal.is_past_deadline(now) {
        let message = format!(
            "Your goal <strong>{}</strong> was not fulfilled before the deadline. \
             Consider reviewing your budget and savings plan.",
            goal.name
        );
        notify(state, user_id, "Goal Not Fulfilled Before Deadline", &message).await;
    }

    Ok(goal)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct GoalStats {
    pub total_goals: usize,
    pub total_target_amount: f64,
    pub total_current_amount: f64,
    pub completed_goals: usize,
    /// Percentage of goals completed.
    pub completion_rate: f64,
}

impl GoalStats {
    pub fn from_goals(goals: &[Goal]) -> Self {
        let total_goals = goals.len();
        let completed_goals = goals
            .iter()
            .filter(|g| g.status == GoalStatus::Completed)
            .count();
        GoalStats {
            total_goals,
            total_target_amount: goals.iter().map(|g| g.target_amount).sum(),
            total_current_amount: goals.iter().map(|g| g.current_amount).sum(),
            completed_goals,
            completion_rate: if total_goals > 0 {
                completed_goals as f64 / total_goals as f64 * 100.0
            } else {
                0.0
            },
        }
    }
}

pub async fn goal_stats(state: &AppState, user_id: &ObjectId) -> CoreResult<GoalStats> {
    let goals = list_goals(state, user_id).await?;
    Ok(GoalStats::from_goals(&goals))
}

/// Target and starting amount of `input`, in the base currency.
async fn goal_amounts(state: &AppState, input: &NewGoal) -> CoreResult<(f64, f64)> {
    let currency = input.currency.as_deref();
    let target = to_base_opt(state, input.target_amount, currency).await?;
    let current = match input.current_amount {
        Some(amount) if amount > 0.0 => to_base_opt(state, amount, currency).await?,
        _ => 0.0,
    };
    Ok((target, current))
}

async fn to_base_opt(state: &AppState, amount: f64, currency: Option<&str>) -> CoreResult<f64> {
    match currency {
        Some(code) => state.currency.to_base(amount, code).await,
        None => Ok(amount),
    }
}

async fn save_goal(state: &AppState, id: &ObjectId, goal: &Goal) -> CoreResult<()> {
    state
        .goals
        .update_one(
            doc! { "_id": id, "user_id": goal.user_id },
            doc! { "$set": {
                "name": &goal.name,
                "target_amount": goal.target_amount,
                "current_amount": goal.current_amount,
                "deadline": goal.deadline,
                "status": goal.status.as_str(),
                "updated_at": goal.updated_at,
            } },
        )
        .await?;
    Ok(())
}
