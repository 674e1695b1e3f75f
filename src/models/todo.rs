use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::models::ModelError;
use crate::store::{Collection, Store};

pub const COLLECTION: &str = "todos";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Todo {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub text: String,
    pub completed: bool,
    /// Epoch milliseconds; non-null exactly when `completed` is true.
    #[serde(rename = "completedAt")]
    pub completed_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<Uuid>,
}

/// Writable fields for PATCH; everything else in the request body is ignored.
#[derive(Debug, Default, Deserialize)]
pub struct TodoPatch {
    pub text: Option<String>,
    pub completed: Option<bool>,
}

impl Todo {
    fn collection(store: &Store) -> Collection<Todo> {
        store.collection(COLLECTION)
    }

    pub async fn create(store: &Store, text: &str) -> Result<Todo, ModelError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ModelError::Validation {
                field: "text",
                message: "text is required".to_string(),
            });
        }

        let todo = Todo {
            id: Uuid::new_v4(),
            text: text.to_string(),
            completed: false,
            completed_at: None,
            owner: None,
        };
        Ok(Self::collection(store).save(&todo).await?)
    }

    pub async fn list_all(store: &Store) -> Result<Vec<Todo>, ModelError> {
        Ok(Self::collection(store).find(json!({})).await?)
    }

    pub async fn get_by_id(store: &Store, id: &str) -> Result<Todo, ModelError> {
        let id = parse_id(id)?;
        Self::collection(store)
            .find_by_id(id)
            .await?
            .ok_or_else(|| not_found(id))
    }

    pub async fn delete_by_id(store: &Store, id: &str) -> Result<Todo, ModelError> {
        let id = parse_id(id)?;
        Self::collection(store)
            .find_one_and_delete(json!({ "_id": id }))
            .await?
            .ok_or_else(|| not_found(id))
    }

    pub async fn update_by_id(store: &Store, id: &str, patch: TodoPatch) -> Result<Todo, ModelError> {
        let id = parse_id(id)?;

        let mut update = Map::new();
        if let Some(text) = patch.text {
            update.insert("text".to_string(), json!(text));
        }
        if let Some(completed) = patch.completed {
            update.insert("completed".to_string(), json!(completed));
            if completed {
                update.insert(
                    "completedAt".to_string(),
                    json!(Utc::now().timestamp_millis()),
                );
            } else {
                // json_patch drops the key on null, clearing the timestamp
                update.insert("completedAt".to_string(), Value::Null);
            }
        }

        Self::collection(store)
            .find_one_and_update(json!({ "_id": id }), Value::Object(update))
            .await?
            .ok_or_else(|| not_found(id))
    }
}

// A malformed id reads the same as a missing document: 404, never 400.
fn parse_id(raw: &str) -> Result<Uuid, ModelError> {
    Uuid::parse_str(raw).map_err(|_| ModelError::NotFound(format!("todo {raw} not found")))
}

fn not_found(id: Uuid) -> ModelError {
    ModelError::NotFound(format!("todo {id} not found"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_id_is_not_found() {
        assert!(matches!(parse_id("123"), Err(ModelError::NotFound(_))));
        assert!(parse_id(&Uuid::new_v4().to_string()).is_ok());
    }
}
