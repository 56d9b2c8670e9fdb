use mongodb::{
    bson::{DateTime, doc, oid::ObjectId, to_bson},
    options::ReturnDocument,
};

use crate::{
    error::{CoreError, CoreResult},
    models::{Category, FlowType, SETTINGS_KEY, Settings},
    validation::NewCategory,
};

use super::AppState;

pub async fn load_settings(state: &AppState) -> CoreResult<Option<Settings>> {
    state
        .settings
        .find_one(doc! { "_id": SETTINGS_KEY })
        .await
        .map_err(Into::into)
}

/// Resolves `name` to an active category of the `expected` flow.
pub async fn resolve_category(
    state: &AppState,
    name: &str,
    expected: FlowType,
) -> CoreResult<Category> {
    let settings = load_settings(state)
        .await?
        .ok_or_else(|| CoreError::InvalidCategory("no categories configured".to_string()))?;
    settings.resolve(name, expected).cloned()
}

pub async fn list_categories(state: &AppState) -> CoreResult<Vec<Category>> {
    Ok(load_settings(state)
        .await?
        .map(|s| s.categories)
        .unwrap_or_default())
}

pub async fn list_active_categories(state: &AppState) -> CoreResult<Vec<Category>> {
    let mut categories = list_categories(state).await?;
    categories.retain(|c| c.active);
    Ok(categories)
}

/// Appends a category in one conditional update: the push only applies
/// while no category of the same name exists. A missing settings document is
/// created by the upsert; an existing one that fails the name check makes the
/// upsert collide on `_id`, reported as a conflict.
pub async fn create_category(state: &AppState, input: NewCategory) -> CoreResult<Category> {
    let category = Category {
        id: ObjectId::new(),
        name: input.name,
        flow_type: input.flow_type,
        description: input.description,
        active: input.active,
        created_at: Some(DateTime::now()),
    };
    let pushed = state
        .settings
        .update_one(
            doc! { "_id": SETTINGS_KEY, "categories.name": { "$ne": &category.name } },
            doc! {
                "$push": { "categories": to_bson(&category)? },
                "$set": { "updated_at": DateTime::now() },
            },
        )
        .upsert(true)
        .await;
    match pushed {
        Ok(_) => Ok(category),
        Err(err) => {
            let err = CoreError::from(err);
            if err.is_duplicate_key() {
                Err(conflict(&category.name))
            } else {
                Err(err)
            }
        }
    }
}

fn conflict(name: &str) -> CoreError {
    CoreError::Conflict(format!("category '{name}'"))
}

/// Rewrites a category in place. The rename check and the write are one
/// conditional update.
pub async fn update_category(
    state: &AppState,
    id: &ObjectId,
    input: NewCategory,
) -> CoreResult<Category> {
    let updated = state
        .settings
        .find_one_and_update(
            doc! {
                "_id": SETTINGS_KEY,
                "categories._id": id,
                "categories": { "$not": { "$elemMatch": {
                    "name": &input.name,
                    "_id": { "$ne": id },
                } } },
            },
            doc! { "$set": {
                "categories.$[c].name": &input.name,
                "categories.$[c].flow_type": input.flow_type.as_str(),
                "categories.$[c].description": &input.description,
                "categories.$[c].active": input.active,
                "updated_at": DateTime::now(),
            } },
        )
        .array_filters(vec![doc! { "c._id": id }])
        .return_document(ReturnDocument::After)
        .await?;

    let Some(settings) = updated else {
        // Nothing matched: tell a missing category from a name clash.
        let exists = list_categories(state).await?.iter().any(|c| &c.id == id);
        return Err(if exists {
            conflict(&input.name)
        } else {
            CoreError::not_found("category")
        });
    };
    settings
        .categories
        .into_iter()
        .find(|c| &c.id == id)
        .ok_or_else(|| CoreError::not_found("category"))
}

/// Manual toggle; inactive categories stay listed but stop resolving.
pub async fn set_category_active(state: &AppState, id: &ObjectId, active: bool) -> CoreResult<()> {
    let res = state
        .settings
        .update_one(
            doc! { "_id": SETTINGS_KEY, "categories._id": id },
            doc! { "$set": {
                "categories.$.active": active,
                "updated_at": DateTime::now(),
            } },
        )
        .await?;
    if res.matched_count == 0 {
        return Err(CoreError::not_found("category"));
    }
    Ok(())
}

/// Hard removal. Transactions and budgets naming the category are untouched.
pub async fn delete_category(state: &AppState, id: &ObjectId) -> CoreResult<()> {
    let res = state
        .settings
        .update_one(
            doc! { "_id": SETTINGS_KEY, "categories._id": id },
            doc! {
                "$pull": { "categories": { "_id": id } },
                "$set": { "updated_at": DateTime::now() },
            },
        )
        .await?;
    if res.matched_count == 0 {
        return Err(CoreError::not_found("category"));
    }
    Ok(())
}
