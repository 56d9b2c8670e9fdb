use anyhow::Result;
use mongodb::{
    Database, IndexModel,
    bson::{DateTime, doc, oid::ObjectId},
    options::IndexOptions,
};
use serde::de::DeserializeOwned;
use std::fs;
use tracing::warn;

use crate::{
    error::CoreResult,
    models::{Budget, Category, SETTINGS_KEY, Settings, Transaction},
    validation::CategoryInput,
};

const COLLECTIONS: [&str; 5] = ["transactions", "budgets", "goals", "settings", "users"];

pub(super) async fn ensure_collections(db: &Database) -> CoreResult<()> {
    let existing = db.list_collection_names().await?;
    for name in COLLECTIONS {
        if !existing.iter().any(|n| n == name) {
            db.create_collection(name).await?;
        }
    }
    Ok(())
}

pub(super) async fn ensure_indexes(db: &Database) -> CoreResult<()> {
    db.collection::<Budget>("budgets")
        .create_index(
            IndexModel::builder()
                .keys(doc! { "user_id": 1, "category": 1 })
                .options(IndexOptions::builder().unique(true).build())
                .build(),
        )
        .await?;

    let transactions = db.collection::<Transaction>("transactions");
    transactions
        .create_index(
            IndexModel::builder()
                .keys(doc! { "user_id": 1, "date": -1 })
                .build(),
        )
        .await?;
    // One occurrence per template and date.
    transactions
        .create_index(
            IndexModel::builder()
                .keys(doc! { "template_id": 1, "date": 1 })
                .options(
                    IndexOptions::builder()
                        .unique(true)
                        .partial_filter_expression(doc! { "template_id": { "$exists": true } })
                        .build(),
                )
                .build(),
        )
        .await?;
    Ok(())
}

pub(super) async fn settings_missing(db: &Database) -> Result<bool> {
    let found = db
        .collection::<Settings>("settings")
        .find_one(doc! { "_id": SETTINGS_KEY })
        .await?;
    Ok(found.is_none())
}

pub(super) fn load_json_array<T: DeserializeOwned>(path: &str) -> Result<Vec<T>> {
    if let Ok(contents) = fs::read_to_string(path) {
        let parsed = serde_json::from_str::<Vec<T>>(&contents)?;
        Ok(parsed)
    } else {
        Ok(Vec::new())
    }
}

/// Writes the categories listed in `path` into a fresh settings document.
/// Invalid or duplicate entries are skipped.
pub(super) async fn seed_default_categories(db: &Database, path: &str) -> Result<usize> {
    let inputs = load_json_array::<CategoryInput>(path)?;
    if inputs.is_empty() {
        return Ok(0);
    }

    let now = DateTime::now();
    let mut settings = Settings::empty();
    for input in inputs {
        let raw_name = input.name.clone();
        let category = match input.validate() {
            Ok(c) => c,
            Err(err) => {
                warn!(name = %raw_name, error = %err, "skipping invalid seed category");
                continue;
            }
        };
        if settings.find_by_name(&category.name).is_some() {
            warn!(name = %category.name, "skipping duplicate seed category");
            continue;
        }
        settings.categories.push(Category {
            id: ObjectId::new(),
            name: category.name,
            flow_type: category.flow_type,
            description: category.description,
            active: category.active,
            created_at: Some(now),
        });
    }
    settings.updated_at = Some(now);

    let count = settings.categories.len();
    db.collection::<Settings>("settings")
        .replace_one(doc! { "_id": SETTINGS_KEY }, settings)
        .upsert(true)
        .await?;
    Ok(count)
}
