// validation.rs
// Raw request payloads and the typed values they validate into.

use chrono::{DateTime as ChronoDateTime, Utc};
use serde::Deserialize;

use crate::{
    error::{CoreError, CoreResult},
    models::{BudgetDuration, DEFAULT_NOTIFY_THRESHOLD, FlowType, Frequency},
};

#[derive(Debug, Clone, Deserialize)]
pub struct RecurringInput {
    pub is_recurring: bool,
    #[serde(default)]
    pub frequency: Option<String>,
    #[serde(default)]
    pub end_date: Option<ChronoDateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionInput {
    #[serde(rename = "type")]
    pub flow_type: String,
    pub currency: String,
    pub amount: f64,
    pub category: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub date: ChronoDateTime<Utc>,
    #[serde(default)]
    pub recurring: Option<RecurringInput>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    pub end_date: ChronoDateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub flow_type: FlowType,
    pub currency: String,
    pub amount: f64,
    pub category: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub date: ChronoDateTime<Utc>,
    pub recurring: Option<RecurrenceRule>,
}

impl TransactionInput {
    pub fn validate(self, now: ChronoDateTime<Utc>) -> CoreResult<NewTransaction> {
        let flow_type = FlowType::parse(&self.flow_type)?;
        let currency = currency_code(&self.currency)?;
        let amount = positive_amount("amount", self.amount)?;
        let category = bounded("category", &self.category, 3, 50)?;
        let description = match self.description {
            Some(d) if d.chars().count() > 1000 => {
                return Err(CoreError::validation(
                    "description must be at most 1000 characters",
                ));
            }
            Some(d) if d.trim().is_empty() => None,
            other => other,
        };
        let tags = normalize_tags(self.tags)?;

        let recurring = match self.recurring {
            Some(r) if r.is_recurring => {
                let frequency = r
                    .frequency
                    .as_deref()
                    .ok_or_else(|| CoreError::validation("recurring.frequency is required"))
                    .and_then(parse_frequency)?;
                let end_date = r
                    .end_date
                    .ok_or_else(|| CoreError::validation("recurring.end_date is required"))?;
                if end_date <= now {
                    return Err(CoreError::validation(
                        "recurring.end_date must be in the future",
                    ));
                }
                Some(RecurrenceRule {
                    frequency,
                    end_date,
                })
            }
            _ => None,
        };

        Ok(NewTransaction {
            flow_type,
            currency,
            amount,
            category,
            description,
            tags,
            date: self.date,
            recurring,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BudgetInput {
    pub category: String,
    pub amount: f64,
    #[serde(default)]
    pub currency: Option<String>,
    pub duration: String,
    #[serde(default)]
    pub notify_threshold: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewBudget {
    pub category: String,
    pub amount: f64,
    pub currency: Option<String>,
    pub duration: BudgetDuration,
    pub notify_threshold: f64,
}

impl BudgetInput {
    pub fn validate(self) -> CoreResult<NewBudget> {
        let notify_threshold = self.notify_threshold.unwrap_or(DEFAULT_NOTIFY_THRESHOLD);
        if !(notify_threshold > 0.0 && notify_threshold <= 1.0) {
            return Err(CoreError::validation(
                "notify_threshold must be within (0, 1]",
            ));
        }
        Ok(NewBudget {
            category: bounded("category", &self.category, 3, 50)?,
            amount: positive_amount("amount", self.amount)?,
            currency: self.currency.as_deref().map(currency_code).transpose()?,
            duration: BudgetDuration::parse(&self.duration)?,
            notify_threshold,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoalInput {
    pub name: String,
    pub target_amount: f64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub current_amount: Option<f64>,
    #[serde(default)]
    pub deadline: Option<ChronoDateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewGoal {
    pub name: String,
    pub target_amount: f64,
    pub currency: Option<String>,
    pub current_amount: Option<f64>,
    pub deadline: Option<ChronoDateTime<Utc>>,
}

impl GoalInput {
    pub fn validate(self, now: ChronoDateTime<Utc>) -> CoreResult<NewGoal> {
        if let Some(deadline) = self.deadline {
            if deadline <= now {
                return Err(CoreError::validation("deadline must be in the future"));
            }
        }
        if let Some(current) = self.current_amount {
            if !current.is_finite() || current < 0.0 {
                return Err(CoreError::validation("current_amount must be at least 0"));
            }
        }
        Ok(NewGoal {
            name: bounded("name", &self.name, 3, 100)?,
            target_amount: positive_amount("target_amount", self.target_amount)?,
            currency: self.currency.as_deref().map(currency_code).transpose()?,
            current_amount: self.current_amount,
            deadline: self.deadline,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryInput {
    pub name: String,
    #[serde(rename = "type")]
    pub flow_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewCategory {
    pub name: String,
    pub flow_type: FlowType,
    pub description: String,
    pub active: bool,
}

impl CategoryInput {
    pub fn validate(self) -> CoreResult<NewCategory> {
        let description = self.description.unwrap_or_default();
        if description.chars().count() > 200 {
            return Err(CoreError::validation(
                "description must be at most 200 characters",
            ));
        }
        Ok(NewCategory {
            name: bounded("name", &self.name, 3, 50)?,
            flow_type: FlowType::parse(&self.flow_type)?,
            description,
            active: self.active.unwrap_or(true),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FundInput {
    pub amount: f64,
    #[serde(default)]
    pub currency: Option<String>,
}

impl FundInput {
    pub fn validate(self) -> CoreResult<(f64, Option<String>)> {
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(CoreError::validation(
                "invalid amount, must be greater than 0",
            ));
        }
        let currency = self.currency.as_deref().map(currency_code).transpose()?;
        Ok((self.amount, currency))
    }
}

fn parse_frequency(raw: &str) -> CoreResult<Frequency> {
    match raw.trim().to_lowercase().as_str() {
        "daily" => Ok(Frequency::Daily),
        "weekly" => Ok(Frequency::Weekly),
        "monthly" => Ok(Frequency::Monthly),
        "yearly" => Ok(Frequency::Yearly),
        other => Err(CoreError::validation(format!(
            "invalid frequency '{other}', must be daily, weekly, monthly or yearly"
        ))),
    }
}

fn currency_code(raw: &str) -> CoreResult<String> {
    let code = raw.trim().to_uppercase();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(CoreError::validation(format!(
            "currency must be a 3-letter code, got '{raw}'"
        )));
    }
    Ok(code)
}

fn positive_amount(field: &str, value: f64) -> CoreResult<f64> {
    if !value.is_finite() || value <= 0.0 {
        return Err(CoreError::validation(format!("{field} must be positive")));
    }
    Ok(value)
}

fn bounded(field: &str, raw: &str, min: usize, max: usize) -> CoreResult<String> {
    let value = raw.trim();
    let len = value.chars().count();
    if len < min || len > max {
        return Err(CoreError::validation(format!(
            "{field} must be between {min} and {max} characters"
        )));
    }
    Ok(value.to_string())
}

fn normalize_tags(raw: Vec<String>) -> CoreResult<Vec<String>> {
    let mut tags: Vec<String> = Vec::with_capacity(raw.len());
    for tag in raw {
        let tag = tag.trim().to_lowercase();
        if tag.is_empty() {
            continue;
        }
        if tag.chars().count() > 30 {
            return Err(CoreError::validation(format!(
                "tag '{tag}' must be at most 30 characters"
            )));
        }
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    Ok(tags)
}
