#![allow(dead_code)]

use anyhow::{Context, Result};
use uuid::Uuid;

use todo_api::models::todo::{self, Todo};
use todo_api::models::user::{self, TokenRecord, User};
use todo_api::store::Store;
use todo_api::{app, auth, config, AppState};

pub struct TestServer {
    pub base_url: String,
    pub store: Store,
}

/// Spawn the app in-process on a free port over a fresh in-memory store.
/// Each caller gets an isolated database; the store handle allows direct
/// persistence assertions alongside HTTP ones.
pub async fn spawn_server() -> Result<TestServer> {
    let store = Store::connect("sqlite::memory:").await?;
    store.init(&[todo::COLLECTION, user::COLLECTION]).await?;

    let app = app(AppState::new(store.clone()));
    let port = portpicker::pick_unused_port().context("failed to pick free port")?;
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server");
    });

    Ok(TestServer {
        base_url: format!("http://127.0.0.1:{}", port),
        store,
    })
}

pub struct SeededTodos {
    pub first: Todo,
    pub second: Todo,
}

/// Two todos, one pending and one completed.
pub async fn seed_todos(store: &Store) -> Result<SeededTodos> {
    let col = store.collection::<Todo>(todo::COLLECTION);

    let first = col
        .save(&Todo {
            id: Uuid::new_v4(),
            text: "First test todo".to_string(),
            completed: false,
            completed_at: None,
            owner: None,
        })
        .await?;
    let second = col
        .save(&Todo {
            id: Uuid::new_v4(),
            text: "Second test todo".to_string(),
            completed: true,
            completed_at: Some(333),
            owner: None,
        })
        .await?;

    Ok(SeededTodos { first, second })
}

pub struct SeededUsers {
    /// Holds one pre-minted auth token.
    pub with_token: User,
    pub with_token_password: String,
    pub token: String,
    /// Holds no tokens yet.
    pub bare: User,
    pub bare_password: String,
}

pub async fn seed_users(store: &Store) -> Result<SeededUsers> {
    let col = store.collection::<User>(user::COLLECTION);
    let cost = config::config().security.bcrypt_cost;

    let id = Uuid::new_v4();
    let token = auth::mint(id)?;
    let with_token = col
        .save(&User {
            id,
            email: "one@example.com".to_string(),
            password: bcrypt::hash("userOnePass", cost)?,
            tokens: vec![TokenRecord {
                access: auth::ACCESS_AUTH.to_string(),
                token: token.clone(),
            }],
        })
        .await?;

    let bare = col
        .save(&User {
            id: Uuid::new_v4(),
            email: "two@example.com".to_string(),
            password: bcrypt::hash("userTwoPass", cost)?,
            tokens: Vec::new(),
        })
        .await?;

    Ok(SeededUsers {
        with_token,
        with_token_password: "userOnePass".to_string(),
        token,
        bare,
        bare_password: "userTwoPass".to_string(),
    })
}
