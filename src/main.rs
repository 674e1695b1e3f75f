use todo_api::models::{todo, user};
use todo_api::store::Store;
use todo_api::{app, config, AppState};

#[tokio::main]
async fn main() {
    // Load .env if present so cargo run picks up DATABASE_URL, TOKEN_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    let config = config::config();
    tracing::info!("Starting Todo API in {:?} mode", config.environment);

    let store = Store::connect(&config.store.database_url)
        .await
        .unwrap_or_else(|e| panic!("failed to connect store {}: {}", config.store.database_url, e));
    store
        .init(&[todo::COLLECTION, user::COLLECTION])
        .await
        .expect("store init");

    let app = app(AppState::new(store.clone()));

    let bind_addr = format!("0.0.0.0:{}", config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {}", bind_addr, e));

    tracing::info!("Todo API listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server");

    store.close().await;
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
