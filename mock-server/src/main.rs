use mock_server::MockState;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let account_id = std::env::var("CANVAS_ACCOUNT_ID")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(1);

    let mut state = MockState::new();
    state.add_account(account_id);
    if let Ok(token) = std::env::var("CANVAS_OAUTH_BEARER") {
        state = state.with_token(&token);
    }

    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, account_id, "mock canvas listening");
    mock_server::run_with(listener, state).await
}
