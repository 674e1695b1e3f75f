use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::models::todo::{Todo, TodoPatch};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateTodo {
    #[serde(default)]
    pub text: Option<String>,
}

/// POST /todos - create a todo from non-empty text
pub async fn todo_create(
    State(state): State<AppState>,
    body: Result<Json<CreateTodo>, JsonRejection>,
) -> Result<Json<Todo>, ApiError> {
    let Json(body) = body?;
    let todo = Todo::create(&state.store, body.text.as_deref().unwrap_or_default()).await?;
    Ok(Json(todo))
}

/// GET /todos - list every todo
pub async fn todo_list(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let todos = Todo::list_all(&state.store).await?;
    Ok(Json(json!({ "todos": todos })))
}

/// GET /todos/:id - malformed and unknown ids are both 404
pub async fn todo_get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let todo = Todo::get_by_id(&state.store, &id).await?;
    Ok(Json(json!({ "todo": todo })))
}

/// DELETE /todos/:id - remove and return the deleted todo
pub async fn todo_delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let todo = Todo::delete_by_id(&state.store, &id).await?;
    Ok(Json(json!({ "todo": todo })))
}

/// PATCH /todos/:id - update text/completed; completedAt follows completed
pub async fn todo_update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    patch: Result<Json<TodoPatch>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(patch) = patch?;
    let todo = Todo::update_by_id(&state.store, &id, patch).await?;
    Ok(Json(json!({ "todo": todo })))
}
