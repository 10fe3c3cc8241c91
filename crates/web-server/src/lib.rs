use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use configuration::Config;
use database::DbRepository;
use engine::ExitEngine;
use portfolio::{HoldingsService, LegacyMigrator};
use pricing::{LivePriceResolver, PriceResolver};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{AllowHeaders, AllowOrigin, Any, CorsLayer, ExposeHeaders},
    trace::TraceLayer,
};

pub mod error;
pub mod handlers;

/// The shared application state that all handlers can access.
pub struct AppState {
    pub repo: DbRepository,
    pub migrator: Arc<LegacyMigrator>,
    pub holdings: HoldingsService,
    pub engine: ExitEngine,
    pub resolver: Arc<dyn PriceResolver>,
}

/// The main function to configure and run the web server.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let db_pool = database::connect().await?;
    database::run_migrations(&db_pool).await?;
    let repo = DbRepository::new(db_pool);

    let migrator = Arc::new(LegacyMigrator::new(repo.clone()));
    let holdings = HoldingsService::new(repo.clone(), migrator.clone());
    let resolver: Arc<dyn PriceResolver> =
        Arc::new(LivePriceResolver::new(config.price_feed.clone()));
    let engine = ExitEngine::new(repo.clone(), holdings.clone(), resolver.clone());

    let app_state = Arc::new(AppState {
        repo,
        migrator,
        holdings,
        engine,
        resolver,
    });

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods(Any)
        .allow_headers(AllowHeaders::any())
        .expose_headers(ExposeHeaders::any());

    let app = Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .route(
            "/api/exit-strategies",
            get(handlers::list_exit_strategies).post(handlers::create_exit_strategies),
        )
        .route(
            "/api/exit-strategies/simulate",
            post(handlers::simulate_exit_strategy),
        )
        .route(
            "/api/exit-strategies/:id",
            get(handlers::get_exit_strategy).delete(handlers::delete_exit_strategy),
        )
        .route(
            "/api/exit-strategies/:id/details",
            get(handlers::get_exit_strategy_details),
        )
        .route(
            "/api/exit-strategies/:id/executions",
            post(handlers::record_execution),
        )
        .route("/api/portfolio/holdings", get(handlers::list_holdings))
        .route("/api/portfolio/assets", post(handlers::add_asset))
        .route(
            "/api/portfolio/transactions",
            get(handlers::list_transactions).post(handlers::create_transaction),
        )
        .route(
            "/api/portfolio/transactions/:id",
            axum::routing::put(handlers::update_transaction).delete(handlers::delete_transaction),
        )
        .route("/api/portfolio/:symbol", get(handlers::get_asset_report))
        .with_state(app_state)
        .layer(cors)
        // Log every incoming request.
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(1024 * 1024 * 2));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Web server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
