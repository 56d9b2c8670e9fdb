use chrono::{DateTime as ChronoDateTime, Days, TimeZone, Utc};
use futures::stream::TryStreamExt;
use mongodb::bson::{DateTime, doc, oid::ObjectId};
use serde::Serialize;
use tracing::{error, info};

use crate::{
    error::{CoreError, CoreResult},
    models::{FlowType, Recurring, Transaction},
    notify::notify,
};

use super::{AppState, transactions::record_expense};

/// Midnight UTC of the day `at` falls on.
pub fn start_of_day(at: ChronoDateTime<Utc>) -> ChronoDateTime<Utc> {
    Utc.from_utc_datetime(&at.date_naive().and_time(chrono::NaiveTime::MIN))
}

/// `[start, end)` of the day `at` falls on.
pub fn day_bounds(at: ChronoDateTime<Utc>) -> (ChronoDateTime<Utc>, ChronoDateTime<Utc>) {
    let start = start_of_day(at);
    let end = start.checked_add_days(Days::new(1)).unwrap_or(start);
    (start, end)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecurringReport {
    pub templates: usize,
    pub created: usize,
    /// Occurrences that already existed for their date.
    pub skipped: usize,
    pub failed: usize,
}

/// Materializes every occurrence of every live template that is due by today.
pub async fn process_due(state: &AppState) -> CoreResult<RecurringReport> {
    process_due_at(state, Utc::now()).await
}

pub async fn process_due_at(
    state: &AppState,
    now: ChronoDateTime<Utc>,
) -> CoreResult<RecurringReport> {
    let templates = live_templates(state, now).await?;

    let mut report = RecurringReport {
        templates: templates.len(),
        ..RecurringReport::default()
    };
    for template in &templates {
        match materialize_due(state, template, now).await {
            Ok((created, skipped)) => {
                report.created += created;
                report.skipped += skipped;
            }
            Err(err) => {
                report.failed += 1;
                error!(template_id = ?template.id, error = %err, "recurring transaction failed");
            }
        }
    }

    info!(
        templates = report.templates,
        created = report.created,
        skipped = report.skipped,
        failed = report.failed,
        "recurring transactions processed"
    );
    Ok(report)
}

/// Templates whose end date has not passed.
async fn live_templates(state: &AppState, now: ChronoDateTime<Utc>) -> CoreResult<Vec<Transaction>> {
    let today = DateTime::from_chrono(start_of_day(now));
    let mut cursor = state
        .transactions
        .find(doc! {
            "recurring.is_recurring": true,
            "recurring.end_date": { "$gte": today },
        })
        .await?;
    let mut templates = Vec::new();
    while let Some(tx) = cursor.try_next().await? {
        templates.push(tx);
    }
    Ok(templates)
}

/// Inserts the occurrences of one template falling on or before today and
/// advances the template's bookkeeping. Occurrence `n` is always computed from
/// the template date. Returns `(created, skipped)`.
async fn materialize_due(
    state: &AppState,
    template: &Transaction,
    now: ChronoDateTime<Utc>,
) -> CoreResult<(usize, usize)> {
    let template_id = template
        .id
        .ok_or_else(|| CoreError::not_found("template id"))?;
    let Some((_, end_date)) = template.recurring.schedule() else {
        return Ok((0, 0));
    };
    let (_, tomorrow) = day_bounds(now);
    let end_date = end_date.to_chrono();

    let mut count = template.recurring.occurrences;
    let mut last = template.recurring.last_occurrence.map(|d| d.to_chrono());
    let mut created = 0;
    let mut skipped = 0;
    while let Some(next) = count.checked_add(1).and_then(|n| template.occurrence(n)) {
        if next >= tomorrow || next > end_date {
            break;
        }
        if insert_occurrence(state, template, template_id, next).await? {
            created += 1;
        } else {
            skipped += 1;
        }
        count += 1;
        last = Some(next);
    }

    if created + skipped == 0 {
        return Ok((0, 0));
    }

    state
        .transactions
        .update_one(
            doc! { "_id": template_id },
            doc! { "$set": {
                "recurring.last_processed": DateTime::from_chrono(now),
                "recurring.last_occurrence": last.map(DateTime::from_chrono),
                "recurring.occurrences": i64::from(count),
            } },
        )
        .await?;
    Ok((created, skipped))
}

/// False when the occurrence for `date` already exists.
async fn insert_occurrence(
    state: &AppState,
    template: &Transaction,
    template_id: ObjectId,
    date: ChronoDateTime<Utc>,
) -> CoreResult<bool> {
    let mut occurrence = Transaction {
        id: None,
        date: DateTime::from_chrono(date),
        recurring: Recurring::none(),
        template_id: Some(template_id),
        created_at: Some(DateTime::now()),
        updated_at: None,
        ..template.clone()
    };
    match state.transactions.insert_one(&occurrence).await {
        Ok(res) => occurrence.id = res.inserted_id.as_object_id(),
        Err(err) => {
            let err = CoreError::from(err);
            if err.is_duplicate_key() {
                return Ok(false);
            }
            return Err(err);
        }
    }

    info!(
        user_id = %occurrence.user_id,
        category = %occurrence.category,
        date = %date.date_naive(),
        "recurring transaction created"
    );
    if occurrence.flow_type == FlowType::Expense {
        record_expense(state, &occurrence).await;
    }
    Ok(true)
}

/// Reminds users of template occurrences falling tomorrow. Returns the number
/// of reminders sent.
pub async fn notify_upcoming(state: &AppState) -> CoreResult<usize> {
    notify_upcoming_at(state, Utc::now()).await
}

pub async fn notify_upcoming_at(state: &AppState, now: ChronoDateTime<Utc>) -> CoreResult<usize> {
    let (_, tomorrow) = day_bounds(now);
    let (_, day_after) = day_bounds(tomorrow);
    let is_tomorrow = |at: ChronoDateTime<Utc>| at >= tomorrow && at < day_after;

    let mut sent = 0;
    for template in upcoming_candidates(state, now, tomorrow, day_after).await? {
        let end_date = template.recurring.end_date.map(|d| d.to_chrono());
        let due = if is_tomorrow(template.date.to_chrono()) {
            Some(template.date.to_chrono())
        } else {
            template
                .next_occurrence()
                .filter(|next| is_tomorrow(*next) && end_date.is_none_or(|end| *next <= end))
        };
        let Some(due) = due else {
            continue;
        };

        let message = format!(
            "<h2>Upcoming Transaction Alert</h2>\
             <p>You have a scheduled transaction for <b>{}</b> on {}.</p>\
             <p>Amount: {:.2} {}</p>",
            template.category,
            due.format("%a %b %d %Y"),
            template.amount,
            state.currency.base(),
        );
        notify(
            state,
            &template.user_id,
            "Reminder: Upcoming Recurring Transaction",
            &message,
        )
        .await;
        sent += 1;
    }

    info!(sent, "upcoming recurring reminders sent");
    Ok(sent)
}

/// Templates dated tomorrow, whatever their end date, plus every live
/// template.
async fn upcoming_candidates(
    state: &AppState,
    now: ChronoDateTime<Utc>,
    tomorrow: ChronoDateTime<Utc>,
    day_after: ChronoDateTime<Utc>,
) -> CoreResult<Vec<Transaction>> {
    let today = DateTime::from_chrono(start_of_day(now));
    let mut cursor = state
        .transactions
        .find(doc! {
            "recurring.is_recurring": true,
            "$or": [
                { "date": {
                    "$gte": DateTime::from_chrono(tomorrow),
                    "$lt": DateTime::from_chrono(day_after),
                } },
                { "recurring.end_date": { "$gte": today } },
            ],
        })
        .await?;
    let mut templates = Vec::new();
    while let Some(tx) = cursor.try_next().await? {
        templates.push(tx);
    }
    Ok(templates)
}

/// Alerts on templates that were last processed before today while dated
/// before today. A template keeps matching on every run until the next
/// processing stamps it. Returns the number of alerts sent.
pub async fn notify_missed(state: &AppState) -> CoreResult<usize> {
    notify_missed_at(state, Utc::now()).await
}

pub async fn notify_missed_at(state: &AppState, now: ChronoDateTime<Utc>) -> CoreResult<usize> {
    let today = DateTime::from_chrono(start_of_day(now));
    let mut cursor = state
        .transactions
        .find(doc! {
            "recurring.is_recurring": true,
            "recurring.last_processed": { "$lt": today },
            "date": { "$lt": today },
        })
        .await?;

    let mut sent = 0;
    while let Some(template) = cursor.try_next().await? {
        let message = format!(
            "<h2>Missed Transaction Alert</h2>\
             <p>Your scheduled transaction for <b>{}</b> on {} was not processed.</p>\
             <p>Please check your account.</p>",
            template.category,
            template.date.to_chrono().format("%a %b %d %Y"),
        );
        notify(state, &template.user_id, "Missed Recurring Transaction", &message).await;
        sent += 1;
    }

    info!(sent, "missed recurring alerts sent");
    Ok(sent)
}
