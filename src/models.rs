// models.rs
// Documents persisted in MongoDB. Monetary fields are always in the base currency.

use chrono::{DateTime as ChronoDateTime, Days, Months, Utc};
use mongodb::bson::{DateTime, oid::ObjectId};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Direction of money for transactions and categories.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FlowType {
    Income,
    Expense,
}

impl FlowType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowType::Income => "income",
            FlowType::Expense => "expense",
        }
    }

    pub fn parse(raw: &str) -> CoreResult<Self> {
        match raw.trim().to_lowercase().as_str() {
            "income" => Ok(FlowType::Income),
            "expense" => Ok(FlowType::Expense),
            other => Err(CoreError::validation(format!(
                "invalid type '{other}', must be 'income' or 'expense'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Yearly => "yearly",
        }
    }

    /// The `n`th occurrence after `anchor`, counted from the anchor itself so
    /// month clamping never accumulates: Jan 31 gives Feb 29, Mar 31, Apr 30.
    pub fn nth_after(&self, anchor: ChronoDateTime<Utc>, n: u32) -> Option<ChronoDateTime<Utc>> {
        match self {
            Frequency::Daily => anchor.checked_add_days(Days::new(u64::from(n))),
            Frequency::Weekly => anchor.checked_add_days(Days::new(7 * u64::from(n))),
            Frequency::Monthly => anchor.checked_add_months(Months::new(n)),
            Frequency::Yearly => anchor.checked_add_months(Months::new(n.checked_mul(12)?)),
        }
    }
}

/// Recurrence metadata. `frequency` and `end_date` are set iff `is_recurring`;
/// build through [`Recurring::none`] or [`Recurring::every`] to keep that true.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Recurring {
    pub is_recurring: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<Frequency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime>,
    /// When the recurrence sweep last materialized an occurrence.
    #[serde(default)]
    pub last_processed: Option<DateTime>,
    /// Date of the most recent materialized occurrence.
    #[serde(default)]
    pub last_occurrence: Option<DateTime>,
    /// Number of occurrences materialized so far.
    #[serde(default)]
    pub occurrences: u32,
}

impl Recurring {
    pub fn none() -> Self {
        Recurring::default()
    }

    pub fn every(frequency: Frequency, end_date: DateTime) -> Self {
        Recurring {
            is_recurring: true,
            frequency: Some(frequency),
            end_date: Some(end_date),
            last_processed: None,
            last_occurrence: None,
            occurrences: 0,
        }
    }

    pub fn schedule(&self) -> Option<(Frequency, DateTime)> {
        if !self.is_recurring {
            return None;
        }
        Some((self.frequency?, self.end_date?))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    pub flow_type: FlowType,
    pub amount: f64,
    pub category: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub date: DateTime,
    #[serde(default)]
    pub recurring: Recurring,
    /// Set on occurrences materialized from a recurring template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<ObjectId>,
    pub created_at: Option<DateTime>,
    pub updated_at: Option<DateTime>,
}

impl Transaction {
    /// Date the next occurrence of this template falls on, if it is a template.
    pub fn next_occurrence(&self) -> Option<ChronoDateTime<Utc>> {
        self.occurrence(self.recurring.occurrences.checked_add(1)?)
    }

    /// Date of the `n`th occurrence, always measured from the template date.
    pub fn occurrence(&self, n: u32) -> Option<ChronoDateTime<Utc>> {
        let (frequency, _) = self.recurring.schedule()?;
        frequency.nth_after(self.date.to_chrono(), n)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BudgetDuration {
    Monthly,
    Yearly,
}

impl BudgetDuration {
    pub fn as_str(&self) -> &'static str {
        match self {
            BudgetDuration::Monthly => "monthly",
            BudgetDuration::Yearly => "yearly",
        }
    }

    pub fn parse(raw: &str) -> CoreResult<Self> {
        match raw.trim().to_lowercase().as_str() {
            "monthly" => Ok(BudgetDuration::Monthly),
            "yearly" => Ok(BudgetDuration::Yearly),
            other => Err(CoreError::validation(format!(
                "invalid duration '{other}', must be 'monthly' or 'yearly'"
            ))),
        }
    }
}

pub const DEFAULT_NOTIFY_THRESHOLD: f64 = 0.8;

fn default_notify_threshold() -> f64 {
    DEFAULT_NOTIFY_THRESHOLD
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Budget {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    pub category: String,
    /// Ceiling for one period.
    pub amount: f64,
    /// Spending accumulated in the current period.
    #[serde(default)]
    pub current_amount: f64,
    pub duration: BudgetDuration,
    #[serde(default = "default_notify_threshold")]
    pub notify_threshold: f64,
    /// Start of the current period; bumped on every renewal.
    pub created_at: DateTime,
    pub updated_at: Option<DateTime>,
}

impl Budget {
    /// Spending as a percentage of the ceiling.
    pub fn usage_percent(&self) -> f64 {
        if self.amount <= 0.0 {
            return 0.0;
        }
        self.current_amount / self.amount * 100.0
    }

    pub fn threshold_reached(&self) -> bool {
        self.usage_percent() >= self.notify_threshold * 100.0
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum GoalStatus {
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
}

impl GoalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalStatus::InProgress => "In Progress",
            GoalStatus::Completed => "Completed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    pub name: String,
    pub target_amount: f64,
    #[serde(default)]
    pub current_amount: f64,
    #[serde(default)]
    pub deadline: Option<DateTime>,
    pub status: GoalStatus,
    pub created_at: Option<DateTime>,
    pub updated_at: Option<DateTime>,
}

impl Goal {
    /// Adds `amount`, clamping at the target. Returns true when this call
    /// completed the goal.
    pub fn credit(&mut self, amount: f64) -> bool {
        let was_completed = self.status == GoalStatus::Completed;
        self.current_amount += amount;
        self.settle();
        !was_completed && self.status == GoalStatus::Completed
    }

    /// Re-establishes `current_amount <= target_amount` and the status rule.
    pub fn settle(&mut self) {
        if self.current_amount >= self.target_amount {
            self.current_amount = self.target_amount;
            self.status = GoalStatus::Completed;
        } else {
            self.status = GoalStatus::InProgress;
        }
    }

    pub fn is_past_deadline(&self, now: ChronoDateTime<Utc>) -> bool {
        self.deadline.is_some_and(|d| now > d.to_chrono())
    }

    pub fn progress_percent(&self) -> f64 {
        if self.target_amount <= 0.0 {
            return 0.0;
        }
        (self.current_amount / self.target_amount * 100.0).min(100.0)
    }
}

/// Well-known `_id` of the one settings document.
pub const SETTINGS_KEY: &str = "global";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    pub flow_type: FlowType,
    #[serde(default)]
    pub description: String,
    pub active: bool,
    pub created_at: Option<DateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub categories: Vec<Category>,
    pub updated_at: Option<DateTime>,
}

impl Settings {
    pub fn empty() -> Self {
        Settings {
            id: SETTINGS_KEY.to_string(),
            categories: Vec::new(),
            updated_at: None,
        }
    }

    /// Resolves a category name (case-sensitive) for a given flow.
    pub fn resolve(&self, name: &str, expected: FlowType) -> CoreResult<&Category> {
        let category = self
            .categories
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| CoreError::InvalidCategory(format!("'{name}' does not exist")))?;
        if !category.active {
            return Err(CoreError::InvalidCategory(format!("'{name}' is inactive")));
        }
        if category.flow_type != expected {
            return Err(CoreError::TypeMismatch(format!(
                "category '{name}' is for '{}' transactions only",
                category.flow_type.as_str()
            )));
        }
        Ok(category)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }
}

/// Read-only view of the users collection owned by the auth collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}
