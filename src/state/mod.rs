// state: AppState over the MongoDB collections, start-up, and pagination types.

use anyhow::Result;
use mongodb::{Client, Collection, Database};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::{
    config::Config,
    currency::{CurrencyConverter, ExchangeRateApi, NoRates, RateProvider},
    error::CoreResult,
    models::{Budget, Goal, Settings, Transaction, User},
    notify::{LogNotifier, MailRelayNotifier, Notifier},
};

mod budgets;
mod categories;
mod goals;
mod recurring;
mod seed;
mod transactions;

pub use budgets::*;
pub use categories::*;
pub use goals::*;
pub use recurring::*;
pub use transactions::*;

pub const DEFAULT_PAGE_LIMIT: u64 = 10;
pub const MAX_PAGE_LIMIT: u64 = 100;

#[derive(Clone)]
pub struct AppState {
    pub transactions: Collection<Transaction>,
    pub budgets: Collection<Budget>,
    pub goals: Collection<Goal>,
    pub settings: Collection<Settings>,
    pub users: Collection<User>,
    pub currency: CurrencyConverter,
    pub notifier: Arc<dyn Notifier>,
}

impl AppState {
    pub fn new(db: &Database, currency: CurrencyConverter, notifier: Arc<dyn Notifier>) -> Self {
        AppState {
            transactions: db.collection::<Transaction>("transactions"),
            budgets: db.collection::<Budget>("budgets"),
            goals: db.collection::<Goal>("goals"),
            settings: db.collection::<Settings>("settings"),
            users: db.collection::<User>("users"),
            currency,
            notifier,
        }
    }
}

pub async fn init_state(config: &Config) -> Result<AppState> {
    let client = Client::with_uri_str(&config.mongodb_uri).await?;
    let db = client.database(&config.mongodb_db);

    prepare_database(&db).await?;

    // Only seed categories when no settings document exists yet.
    if seed::settings_missing(&db).await? {
        let seeded = seed::seed_default_categories(&db, &config.settings_file).await?;
        info!(count = seeded, file = %config.settings_file, "seeded default categories");
    }

    let rates: Arc<dyn RateProvider> = match &config.rates_api_key {
        Some(key) => Arc::new(ExchangeRateApi::new(&config.rates_url, key)),
        None => Arc::new(NoRates),
    };
    let notifier: Arc<dyn Notifier> = match &config.mail_api_url {
        Some(url) => Arc::new(MailRelayNotifier::new(
            url,
            &config.mail_from,
            db.collection::<User>("users"),
        )),
        None => Arc::new(LogNotifier),
    };

    Ok(AppState::new(
        &db,
        CurrencyConverter::new(&config.base_currency, rates),
        notifier,
    ))
}

/// Creates the collections and indexes the core relies on.
pub async fn prepare_database(db: &Database) -> CoreResult<()> {
    seed::ensure_collections(db).await?;
    seed::ensure_indexes(db).await?;
    Ok(())
}

/// Page number (1-based) and size for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub limit: u64,
}

impl Default for PageRequest {
    fn default() -> Self {
        PageRequest {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl PageRequest {
    pub fn new(page: u64, limit: u64) -> Self {
        PageRequest {
            page: page.max(1),
            limit: limit.clamp(1, MAX_PAGE_LIMIT),
        }
    }

    /// Documents to skip, capped at what the server accepts.
    pub fn skip(&self) -> u64 {
        self.page
            .saturating_sub(1)
            .saturating_mul(self.limit)
            .min(i64::MAX as u64)
    }

    pub fn total_pages(&self, total: u64) -> u64 {
        total.div_ceil(self.limit.max(1))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub total_pages: u64,
    /// Currency the amounts in `items` are expressed in.
    pub currency: String,
}

impl<T> Page<T> {
    pub(crate) fn new(items: Vec<T>, request: PageRequest, total: u64, currency: &str) -> Self {
        Page {
            items,
            page: request.page,
            limit: request.limit,
            total,
            total_pages: request.total_pages(total),
            currency: currency.to_string(),
        }
    }
}
