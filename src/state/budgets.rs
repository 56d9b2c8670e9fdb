use chrono::{DateTime as ChronoDateTime, Datelike, TimeZone, Utc};
use futures::stream::TryStreamExt;
use mongodb::{
    bson::{DateTime, Document, doc, oid::ObjectId},
    options::ReturnDocument,
};
use serde::Serialize;
use tracing::{error, info};

use crate::{
    error::{CoreError, CoreResult},
    models::{Budget, BudgetDuration, FlowType},
    notify::notify,
    validation::NewBudget,
};

use super::{AppState, Page, PageRequest, resolve_category};

/// First instant of the period `now` falls in, in UTC.
pub fn period_start(duration: BudgetDuration, now: ChronoDateTime<Utc>) -> ChronoDateTime<Utc> {
    let month = match duration {
        BudgetDuration::Monthly => now.month(),
        BudgetDuration::Yearly => 1,
    };
    Utc.with_ymd_and_hms(now.year(), month, 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// Adds an expense to the user's budget for `category`, if one exists, and
/// sends a threshold alert when usage reaches the budget's threshold.
///
/// The increment is a single atomic `$inc`, so concurrent expenses against
/// the same budget do not lose updates.
pub async fn apply_expense(
    state: &AppState,
    user_id: &ObjectId,
    category: &str,
    amount: f64,
) -> CoreResult<Option<Budget>> {
    let updated = state
        .budgets
        .find_one_and_update(
            doc! { "user_id": user_id, "category": category },
            doc! {
                "$inc": { "current_amount": amount },
                "$set": { "updated_at": DateTime::now() },
            },
        )
        .return_document(ReturnDocument::After)
        .await?;

    let Some(budget) = updated else {
        return Ok(None);
    };

    if budget.threshold_reached() {
        let subject = format!("Budget Alert: {} Spending", budget.category);
        let message = format!(
            "<p>Your spending in <b>{category}</b> is nearing or has exceeded your budget.</p>\
             <p><b>Current Spending:</b> {current:.2} {base}</p>\
             <p><b>Budget Limit:</b> {limit:.2} {base}</p>\
             <p><b>Usage:</b> {usage:.0}%</p>\
             <p>Please review your expenses.</p>",
            category = budget.category,
            current = budget.current_amount,
            limit = budget.amount,
            usage = budget.usage_percent(),
            base = state.currency.base(),
        );
        notify(state, user_id, &subject, &message).await;
    }

    Ok(Some(budget))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RenewalReport {
    pub renewed: usize,
    pub failed: usize,
}

/// Resets every budget whose period started after its `created_at`.
///
/// Each reset is conditional on `created_at` still predating the period
/// start, so a second run in the same period renews nothing.
pub async fn renew_budgets(state: &AppState) -> CoreResult<RenewalReport> {
    renew_budgets_at(state, Utc::now()).await
}

pub async fn renew_budgets_at(
    state: &AppState,
    now: ChronoDateTime<Utc>,
) -> CoreResult<RenewalReport> {
    let monthly_start = DateTime::from_chrono(period_start(BudgetDuration::Monthly, now));
    let yearly_start = DateTime::from_chrono(period_start(BudgetDuration::Yearly, now));

    let mut cursor = state
        .budgets
        .find(doc! { "$or": [
            { "duration": BudgetDuration::Monthly.as_str(), "created_at": { "$lt": monthly_start } },
            { "duration": BudgetDuration::Yearly.as_str(), "created_at": { "$lt": yearly_start } },
        ]})
        .await?;
    let mut due = Vec::new();
    while let Some(budget) = cursor.try_next().await? {
        due.push(budget);
    }

    let mut report = RenewalReport::default();
    for budget in due {
        match renew_one(state, &budget, now).await {
            Ok(true) => report.renewed += 1,
            Ok(false) => {}
            Err(err) => {
                report.failed += 1;
                error!(budget_id = ?budget.id, error = %err, "budget renewal failed");
            }
        }
    }

    info!(renewed = report.renewed, failed = report.failed, "budget renewal finished");
    Ok(report)
}

async fn renew_one(state: &AppState, budget: &Budget, now: ChronoDateTime<Utc>) -> CoreResult<bool> {
    let id = budget.id.as_ref().ok_or_else(|| CoreError::not_found("budget id"))?;
    let start = DateTime::from_chrono(period_start(budget.duration, now));
    let stamp = DateTime::from_chrono(now);

    let res = state
        .budgets
        .update_one(
            doc! { "_id": id, "created_at": { "$lt": start } },
            doc! { "$set": {
                "current_amount": 0.0,
                "created_at": stamp,
                "updated_at": stamp,
            } },
        )
        .await?;
    if res.modified_count == 0 {
        return Ok(false);
    }

    let period = match budget.duration {
        BudgetDuration::Monthly => "month",
        BudgetDuration::Yearly => "year",
    };
    let message = format!(
        "<p>Hello, your budget for <strong>{}</strong> has been renewed for the next {period}.</p>",
        budget.category
    );
    notify(state, &budget.user_id, "Your Budget Has Been Renewed!", &message).await;
    Ok(true)
}

pub async fn set_budget(state: &AppState, user_id: &ObjectId, input: NewBudget) -> CoreResult<Budget> {
    resolve_category(state, &input.category, FlowType::Expense).await?;
    let amount = convert_to_base(state, input.amount, input.currency.as_deref()).await?;

    if state
        .budgets
        .find_one(doc! { "user_id": user_id, "category": &input.category })
        .await?
        .is_some()
    {
        return Err(CoreError::Conflict(format!(
            "budget for category '{}'",
            input.category
        )));
    }

    let mut budget = Budget {
        id: None,
        user_id: *user_id,
        category: input.category,
        amount,
        current_amount: 0.0,
        duration: input.duration,
        notify_threshold: input.notify_threshold,
        created_at: DateTime::now(),
        updated_at: None,
    };
    let res = state.budgets.insert_one(&budget).await.map_err(|err| {
        let err = CoreError::from(err);
        if err.is_duplicate_key() {
            CoreError::Conflict(format!("budget for category '{}'", budget.category))
        } else {
            err
        }
    })?;
    budget.id = res.inserted_id.as_object_id();
    Ok(budget)
}

pub async fn get_budget(state: &AppState, user_id: &ObjectId, id: &ObjectId) -> CoreResult<Budget> {
    state
        .budgets
        .find_one(doc! { "_id": id, "user_id": user_id })
        .await?
        .ok_or_else(|| CoreError::not_found("budget"))
}

/// Replaces category, ceiling, duration and threshold. The running total is kept.
pub async fn update_budget(
    state: &AppState,
    user_id: &ObjectId,
    id: &ObjectId,
    input: NewBudget,
) -> CoreResult<Budget> {
    resolve_category(state, &input.category, FlowType::Expense).await?;
    let amount = convert_to_base(state, input.amount, input.currency.as_deref()).await?;

    let updated = state
        .budgets
        .find_one_and_update(
            doc! { "_id": id, "user_id": user_id },
            doc! { "$set": {
                "category": &input.category,
                "amount": amount,
                "duration": input.duration.as_str(),
                "notify_threshold": input.notify_threshold,
                "updated_at": DateTime::now(),
            } },
        )
        .return_document(ReturnDocument::After)
        .await
        .map_err(|err| {
            let err = CoreError::from(err);
            if err.is_duplicate_key() {
                CoreError::Conflict(format!("budget for category '{}'", input.category))
            } else {
                err
            }
        })?;
    updated.ok_or_else(|| CoreError::not_found("budget"))
}

pub async fn delete_budget(state: &AppState, user_id: &ObjectId, id: &ObjectId) -> CoreResult<Budget> {
    state
        .budgets
        .find_one_and_delete(doc! { "_id": id, "user_id": user_id })
        .await?
        .ok_or_else(|| CoreError::not_found("budget"))
}

#[derive(Debug, Clone, Default)]
pub struct BudgetFilter {
    pub category: Option<String>,
    pub duration: Option<BudgetDuration>,
}

/// Lists a user's budgets. With `currency`, ceilings and running totals are
/// converted one budget at a time.
pub async fn list_budgets(
    state: &AppState,
    user_id: &ObjectId,
    filter: &BudgetFilter,
    page: PageRequest,
    currency: Option<&str>,
) -> CoreResult<Page<Budget>> {
    let mut query: Document = doc! { "user_id": user_id };
    if let Some(category) = filter.category.as_deref().map(str::trim) {
        query.insert("category", category);
    }
    if let Some(duration) = filter.duration {
        query.insert("duration", duration.as_str());
    }

    let total = state.budgets.count_documents(query.clone()).await?;
    let mut cursor = state
        .budgets
        .find(query)
        .sort(doc! { "created_at": -1 })
        .skip(page.skip())
        .limit(page.limit as i64)
        .await?;
    let mut items = Vec::new();
    while let Some(budget) = cursor.try_next().await? {
        items.push(budget);
    }

    let target = currency.unwrap_or(state.currency.base()).trim().to_uppercase();
    if !state.currency.is_base(&target) {
        for budget in &mut items {
            budget.amount = state.currency.from_base(budget.amount, &target).await?;
            budget.current_amount = state.currency.from_base(budget.current_amount, &target).await?;
        }
    }

    Ok(Page::new(items, page, total, &target))
}

#[derive(Debug, Clone, Serialize)]
pub struct BudgetRecommendation {
    pub category: String,
    pub amount: f64,
    pub spent: f64,
    pub duration: BudgetDuration,
    pub created_at: DateTime,
    pub percentage: i64,
    pub recommendation: String,
}

/// Compares each budget with the user's lifetime expenses in its category.
pub async fn budget_recommendations(
    state: &AppState,
    user_id: &ObjectId,
) -> CoreResult<Vec<BudgetRecommendation>> {
    let mut cursor = state.budgets.find(doc! { "user_id": user_id }).await?;
    let mut budgets = Vec::new();
    while let Some(budget) = cursor.try_next().await? {
        budgets.push(budget);
    }

    let mut out = Vec::with_capacity(budgets.len());
    for budget in budgets {
        let spent = super::transactions::sum_amounts(
            state,
            doc! {
                "user_id": user_id,
                "flow_type": FlowType::Expense.as_str(),
                "category": &budget.category,
            },
        )
        .await?;
        let percentage = if budget.amount > 0.0 {
            spent / budget.amount * 100.0
        } else {
            0.0
        };
        out.push(BudgetRecommendation {
            recommendation: recommendation_text(&budget.category, percentage),
            category: budget.category,
            amount: budget.amount,
            spent,
            duration: budget.duration,
            created_at: budget.created_at,
            percentage: percentage.round() as i64,
        });
    }
    Ok(out)
}

pub fn recommendation_text(category: &str, percentage: f64) -> String {
    if percentage > 80.0 {
        format!(
            "You are spending too much on {category}. Consider reducing your spending by {}% to stay within your budget.",
            (percentage - 80.0).round() as i64
        )
    } else if percentage < 50.0 {
        format!(
            "You are spending too little on {category}. Consider reallocating some of your budget to other categories."
        )
    } else {
        format!("Your spending on {category} is well-balanced. Keep it up!")
    }
}

async fn convert_to_base(state: &AppState, amount: f64, currency: Option<&str>) -> CoreResult<f64> {
    match currency {
        Some(code) => state.currency.to_base(amount, code).await,
        None => Ok(amount),
    }
}
