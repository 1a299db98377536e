use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use marketplace::{
    AppState,
    auth::{DomainGate, GoTrueClient},
    cache::RedisSessionStore,
    config::Config,
    middleware::{RateLimiter, rate_limit},
    router::create_router,
    storage::StorageClient,
};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        tracing::error!("Server stopped: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), BoxError> {
    let config = Config::from_env()?;

    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    #[cfg(not(debug_assertions))]
    tracing::info!("Running in production mode with CORS disabled");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET application_name = 'campus_marketplace';")
                    .await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await?;

    if config.run_migrations {
        sqlx::migrate!().run(&pool).await?;
        tracing::info!("Database migrations applied");
    }

    let redis = Arc::new(redis::Client::open(config.redis_url.clone())?);
    let http = reqwest::Client::builder()
        .timeout(config.http_timeout())
        .build()?;

    let state = AppState {
        pool,
        sessions: Arc::new(RedisSessionStore::new(redis.clone())),
        provider: Arc::new(GoTrueClient::new(http.clone(), &config)),
        storage: StorageClient::new(http, &config),
        gate: DomainGate::new(config.institute_domain.clone()),
        config: config.clone(),
    };
    tracing::info!(
        "Accepting sign-ins from {} and its subdomains",
        state.gate.domain()
    );

    let rate_limiter = Arc::new(RateLimiter::new(redis, config.clone()));
    let router = create_router(state).layer(axum::middleware::from_fn_with_state(
        rate_limiter,
        rate_limit,
    ));

    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(tower_http::cors::CorsLayer::permissive())
    };

    let addr = SocketAddr::new(
        config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid SERVER_HOST, falling back to dual-stack default");
            IpAddr::V6(Ipv6Addr::UNSPECIFIED)
        }),
        config.server_port,
    );
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
