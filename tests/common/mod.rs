#![allow(dead_code)]

use std::{
    collections::HashMap,
    env,
    sync::{Arc, Mutex, MutexGuard, OnceLock},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use chrono::{DateTime as ChronoDateTime, Utc};
use futures::future::BoxFuture;
use mongodb::{Client, bson::oid::ObjectId, options::ClientOptions};

use fundkeeper::{
    currency::{CurrencyConverter, RateProvider},
    error::CoreResult,
    models::{FlowType, Frequency},
    notify::Notifier,
    state::{AppState, create_category, prepare_database},
    validation::{CategoryInput, NewTransaction, RecurrenceRule},
};

/// Global lock so integration tests that mutate the DB run one-at-a-time.
static TEST_DB_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

/// USD-based rate table: 1 USD = 0.9 EUR = 300 LKR.
pub struct FixedRates;

impl RateProvider for FixedRates {
    fn latest_rates<'a>(&'a self, _base: &'a str) -> BoxFuture<'a, CoreResult<HashMap<String, f64>>> {
        Box::pin(async {
            Ok(HashMap::from([
                ("USD".to_string(), 1.0),
                ("EUR".to_string(), 0.9),
                ("LKR".to_string(), 300.0),
            ]))
        })
    }
}

#[derive(Debug, Clone)]
pub struct Sent {
    pub user_id: ObjectId,
    pub subject: String,
    pub html: String,
}

/// Keeps every notification instead of delivering it.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn count(&self, subject: &str) -> usize {
        self.sent().iter().filter(|s| s.subject == subject).count()
    }

    pub fn clear(&self) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.clear();
        }
    }
}

impl Notifier for RecordingNotifier {
    fn send<'a>(
        &'a self,
        user_id: &'a ObjectId,
        subject: &'a str,
        html: &'a str,
    ) -> BoxFuture<'a, CoreResult<()>> {
        Box::pin(async move {
            if let Ok(mut sent) = self.sent.lock() {
                sent.push(Sent {
                    user_id: *user_id,
                    subject: subject.to_string(),
                    html: html.to_string(),
                });
            }
            Ok(())
        })
    }
}

pub struct TestContext {
    pub state: AppState,
    pub notifier: Arc<RecordingNotifier>,
    pub user: ObjectId,
    pub db_name: String,
    client: Client,
    _guard: MutexGuard<'static, ()>,
}

pub fn mongodb_uri() -> String {
    env::var("MONGODB_URI").unwrap_or_else(|_| "mongodb://localhost:27017".to_string())
}

pub fn unique_db_name() -> String {
    format!(
        "fundkeepertest_{}",
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    )
}

/// Connects with a short server-selection timeout; `None` when MongoDB is
/// unreachable.
pub async fn connect() -> Option<Client> {
    let mut options = match ClientOptions::parse(mongodb_uri()).await {
        Ok(o) => o,
        Err(err) => {
            eprintln!("Skipping test; invalid MONGODB_URI: {err:?}");
            return None;
        }
    };
    options.server_selection_timeout = Some(Duration::from_secs(2));
    match Client::with_options(options) {
        Ok(c) => Some(c),
        Err(err) => {
            eprintln!("Skipping test; cannot connect to MongoDB: {err:?}");
            None
        }
    }
}

pub fn lock_db() -> MutexGuard<'static, ()> {
    TEST_DB_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Fresh database with the default test categories:
/// Food, Rent, Transport (expense), Travel (inactive expense), Salary (income).
pub async fn setup_state() -> Option<TestContext> {
    let guard = lock_db();
    let client = connect().await?;
    let db_name = unique_db_name();
    let db = client.database(&db_name);
    if let Err(err) = db.drop().await {
        eprintln!("Skipping test; cannot drop test DB: {err:?}");
        return None;
    }
    if let Err(err) = prepare_database(&db).await {
        eprintln!("Skipping test; prepare_database failed: {err:?}");
        return None;
    }

    let notifier = Arc::new(RecordingNotifier::default());
    let state = AppState::new(
        &db,
        CurrencyConverter::new("USD", Arc::new(FixedRates)),
        notifier.clone(),
    );

    for (name, flow, active) in [
        ("Food", "expense", true),
        ("Rent", "expense", true),
        ("Transport", "expense", true),
        ("Travel", "expense", false),
        ("Salary", "income", true),
    ] {
        let input = CategoryInput {
            name: name.to_string(),
            flow_type: flow.to_string(),
            description: None,
            active: Some(active),
        };
        create_category(&state, input.validate().unwrap()).await.unwrap();
    }

    Some(TestContext {
        state,
        notifier,
        user: ObjectId::new(),
        db_name,
        client,
        _guard: guard,
    })
}

pub async fn teardown(ctx: TestContext) {
    let _ = ctx.client.database(&ctx.db_name).drop().await;
}

pub fn expense(category: &str, amount: f64, currency: &str) -> NewTransaction {
    transaction(FlowType::Expense, category, amount, currency, Utc::now())
}

pub fn income(category: &str, amount: f64, currency: &str) -> NewTransaction {
    transaction(FlowType::Income, category, amount, currency, Utc::now())
}

pub fn transaction(
    flow_type: FlowType,
    category: &str,
    amount: f64,
    currency: &str,
    date: ChronoDateTime<Utc>,
) -> NewTransaction {
    NewTransaction {
        flow_type,
        currency: currency.to_string(),
        amount,
        category: category.to_string(),
        description: None,
        tags: Vec::new(),
        date,
        recurring: None,
    }
}

/// Recurring expense template.
pub fn template(
    category: &str,
    amount: f64,
    date: ChronoDateTime<Utc>,
    frequency: Frequency,
    end_date: ChronoDateTime<Utc>,
) -> NewTransaction {
    NewTransaction {
        recurring: Some(RecurrenceRule {
            frequency,
            end_date,
        }),
        ..transaction(FlowType::Expense, category, amount, "USD", date)
    }
}

pub fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}
