use std::sync::Arc;
use std::time::Duration;

use actix_web::{web, App, HttpServer};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{
    filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt, Layer,
};

use booking_service::api::{booking_config, health_config, validation};
use booking_service::booking::{BookingService, BookingSettings};
use booking_service::config::{Config, StoreBackend};
use booking_service::domain::{Role, User, UserId};
use booking_service::notify::{Channel, LogNotificationGateway, NotificationGateway};
use booking_service::shutdown::ShutdownCoordinator;
use booking_service::store::{
    connection, migrations, JobStore, MemoryJobStore, MemoryUserDirectory, PgJobStore,
    PgUserDirectory, UserDirectory,
};
use booking_service::worker::OfferSweeper;

#[derive(Parser, Debug)]
#[command(name = "booking-service")]
#[command(version)]
#[command(about = "Interpreter booking backend with first-acceptance assignment")]
struct Cli {
    /// Override the bind address from configuration
    #[arg(long)]
    bind: Option<String>,

    /// Override the storage backend (postgres or memory)
    #[arg(long)]
    store: Option<StoreBackend>,

    /// Override the log directory
    #[arg(long)]
    log_dir: Option<String>,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();

    // Load configuration from environment, CLI flags win
    let mut config = Config::from_env().expect("Failed to load configuration");
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }
    if let Some(store) = cli.store {
        config.store_backend = store;
    }
    if let Some(log_dir) = cli.log_dir {
        config.log_dir = log_dir;
    }

    let Config {
        bind_addr,
        store_backend,
        database_url,
        max_db_connections,
        max_payload_size,
        offer_expiry_minutes,
        sweep_interval_secs,
        notify_timeout_ms,
        log_dir,
        memory_admin_token,
    } = config;

    // Create logs directory if it doesn't exist
    std::fs::create_dir_all(&log_dir).expect("Failed to create logs directory");

    // Initialize file-based logging with daily rotation and level separation
    // Log files will be created as: logs/info.2024-12-22.log, logs/error.2024-12-22.log, etc.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());

    // Create daily rotating file appenders for each log level
    let info_file = tracing_appender::rolling::daily(&log_dir, "info.log");
    let warn_file = tracing_appender::rolling::daily(&log_dir, "warn.log");
    let error_file = tracing_appender::rolling::daily(&log_dir, "error.log");
    let debug_file = tracing_appender::rolling::daily(&log_dir, "debug.log");

    // Create layers for each log level
    let info_layer = tracing_subscriber::fmt::layer()
        .with_writer(info_file)
        .with_ansi(false)
        .with_filter(LevelFilter::INFO);

    let warn_layer = tracing_subscriber::fmt::layer()
        .with_writer(warn_file)
        .with_ansi(false)
        .with_filter(LevelFilter::WARN);

    let error_layer = tracing_subscriber::fmt::layer()
        .with_writer(error_file)
        .with_ansi(false)
        .with_filter(LevelFilter::ERROR);

    let debug_layer = tracing_subscriber::fmt::layer()
        .with_writer(debug_file)
        .with_ansi(false)
        .with_filter(LevelFilter::DEBUG);

    // Create console/stdout layer for terminal output
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true);

    // Initialize the subscriber with all layers (including console)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer) // Add console output
        .with(info_layer)
        .with(warn_layer)
        .with(error_layer)
        .with(debug_layer)
        .init();

    info!("Starting booking-service application");
    info!("Configuration loaded successfully:");
    info!("  - Bind address: {}", bind_addr);
    info!("  - Store backend: {:?}", store_backend);
    info!("  - Max payload size: {} bytes", max_payload_size);
    info!("  - Offer expiry: {} minutes", offer_expiry_minutes);
    info!("  - Sweep interval: {} seconds", sweep_interval_secs);

    // Wire the selected storage backend behind the store ports
    let (job_store, directory, pool): (
        Arc<dyn JobStore>,
        Arc<dyn UserDirectory>,
        Option<sqlx::Pool<sqlx::Postgres>>,
    ) = match store_backend {
        StoreBackend::Postgres => {
            let database_url = database_url
                .expect("DATABASE_URL must be set in .env file or environment for the postgres backend");

            let pool = connection::get_connection(&database_url, max_db_connections)
                .await
                .expect("Failed to connect to database");
            info!("Database connection pool established");

            // Run migrations on startup (auto-migrate when starting server)
            migrations::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");
            info!("Database migrations completed successfully");

            (
                Arc::new(PgJobStore::new(pool.clone())),
                Arc::new(PgUserDirectory::new(pool.clone())),
                Some(pool),
            )
        }
        StoreBackend::Memory => {
            let job_store = Arc::new(MemoryJobStore::new());
            let directory = Arc::new(MemoryUserDirectory::new());

            match &memory_admin_token {
                Some(token) => {
                    directory
                        .add_user(
                            token.clone(),
                            User {
                                id: UserId(1),
                                name: "Admin".to_string(),
                                email: None,
                                phone: None,
                                role: Role::Admin,
                                languages: Vec::new(),
                                certified: false,
                                available: false,
                            },
                        )
                        .await;
                    info!("Memory backend seeded with admin user (id 1)");
                }
                None => {
                    warn!("Memory backend has no users, set MEMORY_ADMIN_TOKEN to seed an admin")
                }
            }

            (job_store, directory, None)
        }
    };

    // Notification gateways; push and SMS are separate channels so resends
    // can target one of them
    let push: Arc<dyn NotificationGateway> = Arc::new(LogNotificationGateway::new(Channel::Push));
    let sms: Arc<dyn NotificationGateway> = Arc::new(LogNotificationGateway::new(Channel::Sms));

    let settings = BookingSettings {
        offer_window_minutes: offer_expiry_minutes,
        notify_timeout: Duration::from_millis(notify_timeout_ms),
    };

    let booking_service = web::Data::new(BookingService::new(
        Arc::clone(&job_store),
        Arc::clone(&directory),
        Arc::clone(&push),
        Arc::clone(&sms),
        settings,
    ));

    // Health checks probe the store through its trait object
    let store_data: web::Data<dyn JobStore> = web::Data::from(Arc::clone(&job_store));

    // Create shutdown channel for graceful shutdown
    // watch channel allows multiple receivers to get the same value
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    // Spawn the offer sweeper that retires expired offer rounds
    let sweeper = OfferSweeper::new(
        Arc::clone(&job_store),
        Arc::clone(&directory),
        Arc::clone(&push),
        Duration::from_secs(sweep_interval_secs),
        Duration::from_millis(notify_timeout_ms),
    );
    let mut worker_handles = Vec::new();
    let handle = tokio::spawn(async move {
        sweeper.run(shutdown_rx).await;
    });
    worker_handles.push(handle);
    info!("Spawned offer sweeper");

    let server = HttpServer::new(move || {
        // Configure payload size limits globally
        let payload_config = web::PayloadConfig::default().limit(max_payload_size);

        App::new()
            .app_data(booking_service.clone()) // Inject BookingService
            .app_data(store_data.clone()) // Store port for health checks
            .app_data(payload_config) // Global payload size limit
            .app_data(validation::json_config()) // Global validation config
            .configure(health_config) // Health check endpoints
            .configure(booking_config) // Booking routes
    });

    info!("Server starting on http://{}", bind_addr);

    // Bind and start the server
    let server = server.bind(bind_addr.as_str())?.run();

    // Get server handle for graceful shutdown
    let server_handle = server.handle();

    // Spawn server in background
    let server_task = tokio::spawn(server);

    // Create shutdown coordinator and wait for shutdown signal
    let coordinator = ShutdownCoordinator::new(
        server_handle,
        server_task,
        worker_handles,
        shutdown_tx,
        pool,
    );

    coordinator.wait_for_shutdown().await
}
