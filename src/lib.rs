use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{delete, get, post};
use axum::Router;
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod store;

use crate::store::Store;

/// Shared per-request state: just the store handle, cloned into each task.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
}

impl AppState {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

pub fn app(state: AppState) -> Router {
    use handlers::{todos, users};

    // Routes behind the x-auth middleware
    let protected = Router::new()
        .route("/users/me", get(users::user_me))
        .route("/users/me/token", delete(users::user_logout))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        // Todos (public in source)
        .route("/todos", post(todos::todo_create).get(todos::todo_list))
        .route(
            "/todos/:id",
            get(todos::todo_get)
                .delete(todos::todo_delete)
                .patch(todos::todo_update),
        )
        // User lifecycle
        .route("/users", post(users::user_register))
        .route("/users/login", post(users::user_login))
        .merge(protected)
        // Global middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root() -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    Json(json!({
        "success": true,
        "data": {
            "name": "Todo API",
            "version": version,
            "description": "Todo list REST backend with token-based user sessions",
            "endpoints": {
                "todos": "/todos[/:id] (public)",
                "users": "/users, /users/login (public - token acquisition)",
                "session": "/users/me, /users/me/token (protected, x-auth header)",
            }
        }
    }))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match state.store.ping().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "store": "ok"
                }
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "success": false,
                "error": "store unavailable",
                "data": {
                    "status": "degraded",
                    "timestamp": now,
                    "store_error": e.to_string()
                }
            })),
        ),
    }
}
