mod board;
mod frame;
mod history;
mod routes;
mod services;
mod state;
mod throttle;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()
        .expect("invalid PORT");

    // AI client is always constructed: without an API key it answers with
    // the deterministic offline fallback instead of calling out.
    let ai = services::ai::AiClient::from_env();
    if ai.is_remote() {
        tracing::info!(model = ai.model(), "AI client initialized (remote)");
    } else {
        tracing::warn!("OPENROUTER_API_KEY not set — AI runs in offline mode");
    }

    let retention = state::RoomRetention::from_env();
    let state = state::AppState::new(ai, retention);

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, ?retention, "inkboard listening");
    axum::serve(listener, app).await.expect("server failed");
}
