use internship_backend::{
    config::{get_config, init_config, StorageBackend},
    database::{
        memory::MemoryStore,
        pool::{create_pool, run_migrations},
        postgres::PgStore,
        repository::Repositories,
    },
    routes,
    services::{
        notification_service::EmailNotificationService, payment_service::RazorpayGateway,
    },
    utils::time::SystemClock,
    AppState, Collaborators,
};
use reqwest::Client;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("internship_backend=info,tower_http=info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    init_config()?;
    let config = get_config();

    let repos = match config.storage_backend {
        StorageBackend::Postgres => {
            let pool = create_pool(config).await?;
            run_migrations(&pool).await?;
            info!("Using Postgres storage");
            Repositories::postgres(PgStore::new(pool))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            Repositories::in_memory(MemoryStore::new())
        }
    };

    let http_client = Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;
    let notifier = EmailNotificationService::new(
        http_client.clone(),
        &config.email_service_url,
        config.email_service_token.clone(),
    )?;
    let gateway = RazorpayGateway::new(
        http_client,
        config.razorpay_key_id.clone(),
        config.razorpay_key_secret.clone(),
    );

    let app_state = AppState::new(
        config,
        repos,
        Collaborators {
            notifier: Arc::new(notifier),
            gateway: Arc::new(gateway),
            clock: Arc::new(SystemClock),
        },
    );

    {
        let attempt_svc = app_state.attempt_service.clone();
        let interval = Duration::from_secs(config.sweep_interval_secs.max(1));
        tokio::spawn(async move {
            loop {
                if let Err(e) = attempt_svc.sweep_overdue().await {
                    tracing::error!(error = %e, "Overdue attempt sweep failed");
                }
                tokio::time::sleep(interval).await;
            }
        });
    }

    let app = routes::router(app_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
