use chrono::{DateTime as ChronoDateTime, Utc};
use futures::stream::TryStreamExt;
use mongodb::{
    bson::{Bson, DateTime, Document, doc, oid::ObjectId, to_bson},
    options::ReturnDocument,
};
use tracing::error;

use crate::{
    error::{CoreError, CoreResult},
    models::{FlowType, Recurring, Transaction},
    validation::NewTransaction,
};

use super::{AppState, Page, PageRequest, apply_expense, resolve_category};

/// Records a transaction. The amount is stored in the base currency; expenses
/// are added to the matching budget, if any.
pub async fn create_transaction(
    state: &AppState,
    user_id: &ObjectId,
    input: NewTransaction,
) -> CoreResult<Transaction> {
    resolve_category(state, &input.category, input.flow_type).await?;
    let amount = state.currency.to_base(input.amount, &input.currency).await?;

    let now = DateTime::now();
    let mut tx = Transaction {
        id: None,
        user_id: *user_id,
        flow_type: input.flow_type,
        amount,
        category: input.category,
        description: input.description,
        tags: input.tags,
        date: DateTime::from_chrono(input.date),
        recurring: match input.recurring {
            Some(plan) => Recurring::every(plan.frequency, DateTime::from_chrono(plan.end_date)),
            None => Recurring::none(),
        },
        template_id: None,
        created_at: Some(now),
        updated_at: None,
    };
    let res = state.transactions.insert_one(&tx).await?;
    tx.id = res.inserted_id.as_object_id();

    if tx.flow_type == FlowType::Expense {
        record_expense(state, &tx).await;
    }
    Ok(tx)
}

/// Budget bookkeeping after a persisted expense. Failures are logged; the
/// transaction itself stays recorded.
pub(crate) async fn record_expense(state: &AppState, tx: &Transaction) {
    if let Err(err) = apply_expense(state, &tx.user_id, &tx.category, tx.amount).await {
        error!(
            transaction_id = ?tx.id,
            category = %tx.category,
            error = %err,
            "budget update failed"
        );
    }
}

pub async fn get_transaction(
    state: &AppState,
    user_id: &ObjectId,
    id: &ObjectId,
) -> CoreResult<Transaction> {
    state
        .transactions
        .find_one(doc! { "_id": id, "user_id": user_id })
        .await?
        .ok_or_else(|| CoreError::not_found("transaction"))
}

pub async fn list_transactions(state: &AppState, user_id: &ObjectId) -> CoreResult<Vec<Transaction>> {
    let mut cursor = state
        .transactions
        .find(doc! { "user_id": user_id })
        .sort(doc! { "date": -1 })
        .await?;
    let mut items = Vec::new();
    while let Some(tx) = cursor.try_next().await? {
        items.push(tx);
    }
    Ok(items)
}

/// Rewrites a transaction and, for expenses, adds the new amount to the
/// matching budget.
///
/// The previous amount is not taken back out of the budget: a budget's
/// running total only grows between renewals, so editing an expense counts
/// it again.
pub async fn update_transaction(
    state: &AppState,
    user_id: &ObjectId,
    id: &ObjectId,
    input: NewTransaction,
) -> CoreResult<Transaction> {
    resolve_category(state, &input.category, input.flow_type).await?;
    let amount = state.currency.to_base(input.amount, &input.currency).await?;

    let existing = get_transaction(state, user_id, id).await?;

    let recurring = match input.recurring {
        Some(plan) => Recurring {
            last_processed: existing.recurring.last_processed,
            last_occurrence: existing.recurring.last_occurrence,
            occurrences: existing.recurring.occurrences,
            ..Recurring::every(plan.frequency, DateTime::from_chrono(plan.end_date))
        },
        None => Recurring::none(),
    };

    let updated = state
        .transactions
        .find_one_and_update(
            doc! { "_id": id, "user_id": user_id },
            doc! { "$set": {
                "flow_type": input.flow_type.as_str(),
                "amount": amount,
                "category": &input.category,
                "description": input.description.clone(),
                "tags": input.tags.clone(),
                "date": DateTime::from_chrono(input.date),
                "recurring": to_bson(&recurring)?,
                "updated_at": DateTime::now(),
            } },
        )
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| CoreError::not_found("transaction"))?;

    if updated.flow_type == FlowType::Expense {
        record_expense(state, &updated).await;
    }
    Ok(updated)
}

/// Removes a transaction. Budgets are not adjusted.
pub async fn delete_transaction(
    state: &AppState,
    user_id: &ObjectId,
    id: &ObjectId,
) -> CoreResult<Transaction> {
    state
        .transactions
        .find_one_and_delete(doc! { "_id": id, "user_id": user_id })
        .await?
        .ok_or_else(|| CoreError::not_found("transaction"))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransactionSort {
    #[default]
    DateDesc,
    DateAsc,
    FirstTagAsc,
    FirstTagDesc,
}

impl TransactionSort {
    fn to_document(self) -> Document {
        match self {
            TransactionSort::DateDesc => doc! { "date": -1, "_id": -1 },
            TransactionSort::DateAsc => doc! { "date": 1, "_id": 1 },
            TransactionSort::FirstTagAsc => doc! { "tags.0": 1, "date": -1 },
            TransactionSort::FirstTagDesc => doc! { "tags.0": -1, "date": -1 },
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransactionQuery {
    pub start: Option<ChronoDateTime<Utc>>,
    pub end: Option<ChronoDateTime<Utc>>,
    pub category: Option<String>,
    pub flow_type: Option<FlowType>,
    /// Matches transactions carrying any of these tags.
    pub tags: Vec<String>,
    pub sort: TransactionSort,
    /// Convert returned amounts into this currency.
    pub currency: Option<String>,
}

impl TransactionQuery {
    pub(crate) fn to_filter(&self, user_id: &ObjectId) -> Document {
        let mut filter = doc! { "user_id": user_id };
        if self.start.is_some() || self.end.is_some() {
            let mut range = Document::new();
            if let Some(start) = self.start {
                range.insert("$gte", DateTime::from_chrono(start));
            }
            if let Some(end) = self.end {
                range.insert("$lte", DateTime::from_chrono(end));
            }
            filter.insert("date", range);
        }
        if let Some(category) = self.category.as_deref() {
            filter.insert("category", category.trim());
        }
        if let Some(flow_type) = self.flow_type {
            filter.insert("flow_type", flow_type.as_str());
        }
        let tags: Vec<Bson> = self
            .tags
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .map(Bson::String)
            .collect();
        if !tags.is_empty() {
            filter.insert("tags", doc! { "$in": tags });
        }
        filter
    }
}

/// Filtered, sorted, paginated listing. Amounts are converted one
/// transaction at a time when a non-base currency is requested.
pub async fn query_transactions(
    state: &AppState,
    user_id: &ObjectId,
    query: &TransactionQuery,
    page: PageRequest,
) -> CoreResult<Page<Transaction>> {
    let filter = query.to_filter(user_id);
    let total = state.transactions.count_documents(filter.clone()).await?;
    let mut cursor = state
        .transactions
        .find(filter)
        .sort(query.sort.to_document())
        .skip(page.skip())
        .limit(page.limit as i64)
        .await?;
    let mut items = Vec::new();
    while let Some(tx) = cursor.try_next().await? {
        items.push(tx);
    }

    let target = query
        .currency
        .as_deref()
        .unwrap_or(state.currency.base())
        .trim()
        .to_uppercase();
    if !state.currency.is_base(&target) {
        for tx in &mut items {
            tx.amount = state.currency.from_base(tx.amount, &target).await?;
        }
    }

    Ok(Page::new(items, page, total, &target))
}

/// Sum of `amount` over the transactions matching `filter`.
pub(crate) async fn sum_amounts(state: &AppState, filter: Document) -> CoreResult<f64> {
    let mut cursor = state
        .transactions
        .aggregate(vec![
            doc! { "$match": filter },
            doc! { "$group": { "_id": Bson::Null, "total": { "$sum": "$amount" } } },
        ])
        .await?;
    let total = match cursor.try_next().await? {
        Some(row) => match row.get("total") {
            Some(Bson::Double(v)) => *v,
            Some(Bson::Int32(v)) => f64::from(*v),
            Some(Bson::Int64(v)) => *v as f64,
            _ => 0.0,
        },
        None => 0.0,
    };
    Ok(total)
}
