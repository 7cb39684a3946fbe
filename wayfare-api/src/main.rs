use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wayfare_api::{app, AppState};
use wayfare_core::BookingGateway;
use wayfare_order::{FlowCatalog, MockBookingGateway, SessionManager, SubmissionHandler};
use wayfare_store::{Config, HttpBookingGateway};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "wayfare_api=debug,wayfare_order=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    tracing::info!("Starting Wayfare API on port {}", config.server.port);

    let gateway: Arc<dyn BookingGateway> = match &config.gateway.base_url {
        Some(base_url) => {
            tracing::info!("Submitting bookings to {}", base_url);
            Arc::new(HttpBookingGateway::new(base_url, config.gateway.timeout())?)
        }
        None => {
            tracing::warn!("No gateway.base_url configured, bookings go to the in-process mock");
            Arc::new(MockBookingGateway::new())
        }
    };
    let handler = Arc::new(SubmissionHandler::new(gateway).with_timeout(config.gateway.timeout()));

    let catalog = Arc::new(FlowCatalog::builtin()?);
    tracing::info!("Loaded flows: {}", catalog.ids().join(", "));

    let sessions = Arc::new(SessionManager::new(catalog, handler));
    tracing::info!(
        "Closing sessions idle for {}s, sweeping every {}s",
        config.sessions.idle_timeout_secs,
        config.sessions.sweep_interval().as_secs()
    );
    let _sweeper = sessions
        .clone()
        .spawn_sweeper(config.sessions.idle_timeout(), config.sessions.sweep_interval());
    let app = app(AppState::new(sessions, config.sessions.event_buffer));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
