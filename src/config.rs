// config.rs
// Runtime configuration read from the environment (optionally via .env).

use anyhow::{Context, Result};
use chrono::NaiveTime;
use std::env;

pub const DEFAULT_RATES_URL: &str = "https://v6.exchangerate-api.com/v6";

#[derive(Debug, Clone)]
pub struct Config {
    pub mongodb_uri: String,
    pub mongodb_db: String,
    pub base_currency: String,
    pub rates_url: String,
    pub rates_api_key: Option<String>,
    pub mail_api_url: Option<String>,
    pub mail_from: String,
    pub settings_file: String,
    pub schedule: Schedule,
}

/// Daily UTC clock times of the background sweeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub budget_renewal: NaiveTime,
    pub recurring_process: NaiveTime,
    pub upcoming_notify: NaiveTime,
    pub missed_notify: NaiveTime,
}

impl Default for Schedule {
    fn default() -> Self {
        Schedule {
            budget_renewal: hm(0, 0),
            recurring_process: hm(0, 5),
            upcoming_notify: hm(9, 0),
            missed_notify: hm(10, 0),
        }
    }
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Schedule::default();
        Ok(Config {
            mongodb_uri: var_or("MONGODB_URI", "mongodb://localhost:27017"),
            mongodb_db: var_or("MONGODB_DB", "fundkeeper"),
            base_currency: var_or("BASE_CURRENCY", "USD").trim().to_uppercase(),
            rates_url: var_or("EXCHANGE_RATE_API_URL", DEFAULT_RATES_URL),
            rates_api_key: optional_var("EXCHANGE_RATE_API_KEY"),
            mail_api_url: optional_var("MAIL_API_URL"),
            mail_from: var_or("MAIL_FROM", "no-reply@fundkeeper.local"),
            settings_file: var_or("SETTINGS_FILE", "./data/categories.json"),
            schedule: Schedule {
                budget_renewal: time_var("BUDGET_RENEWAL_AT", defaults.budget_renewal)?,
                recurring_process: time_var("RECURRING_PROCESS_AT", defaults.recurring_process)?,
                upcoming_notify: time_var("UPCOMING_NOTIFY_AT", defaults.upcoming_notify)?,
                missed_notify: time_var("MISSED_NOTIFY_AT", defaults.missed_notify)?,
            },
        })
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn time_var(key: &str, default: NaiveTime) -> Result<NaiveTime> {
    match optional_var(key) {
        Some(raw) => parse_clock(&raw).with_context(|| format!("{key} must be HH:MM, got '{raw}'")),
        None => Ok(default),
    }
}

pub fn parse_clock(raw: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M").map_err(Into::into)
}
