use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use matrimony::config::{Settings, StoreBackend};
use matrimony::error::{handle_json_payload_error, handle_query_payload_error};
use matrimony::routes::{self, AppState};
use matrimony::services::{
    seed_sample_profiles, DeviceNotifier, DisabledNotifier, HttpDeviceNotifier, MemoryStore, PostgresStore, Store,
    TokenIssuer,
};
use rand::Rng;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    if format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.json().init();
    }
}

fn startup_error(context: &str, err: impl std::fmt::Display) -> io::Error {
    error!("{}: {}", context, err);
    io::Error::new(io::ErrorKind::Other, format!("{}: {}", context, err))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    let settings = Settings::load().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        io::Error::new(io::ErrorKind::InvalidInput, e.to_string())
    })?;

    init_tracing(&settings.logging.level, &settings.logging.format);

    info!("Starting Matrimony service...");

    let store: Arc<dyn Store> = match settings.store.backend {
        StoreBackend::Postgres => {
            let postgres = PostgresStore::from_settings(
                &settings.database.url,
                settings.database.max_connections,
                settings.database.min_connections,
                settings.database.acquire_timeout_secs,
                settings.database.idle_timeout_secs,
            )
            .await
            .map_err(|e| startup_error("Failed to connect to PostgreSQL", e))?;
            info!("PostgreSQL store initialized");
            Arc::new(postgres)
        }
        StoreBackend::Memory => {
            warn!("Using in-memory store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    if settings.store.seed_sample_profiles {
        let seeded = seed_sample_profiles(store.as_ref())
            .await
            .map_err(|e| startup_error("Failed to seed sample profiles", e))?;
        info!("Seeded {} sample profiles", seeded);
    }

    let secret = match settings.auth.jwt_secret.clone() {
        Some(secret) if !secret.is_empty() => secret,
        _ => {
            warn!("auth.jwt_secret is not set, tokens will not survive a restart");
            let bytes: [u8; 32] = rand::thread_rng().gen();
            bytes.iter().map(|b| format!("{:02x}", b)).collect()
        }
    };
    let tokens = TokenIssuer::new(&secret, settings.auth.token_ttl_secs);

    let notifier: Arc<dyn DeviceNotifier> = match settings.notifications.endpoint.clone() {
        Some(endpoint) => {
            let client = HttpDeviceNotifier::new(
                endpoint,
                settings.notifications.api_key.clone(),
                Duration::from_secs(settings.notifications.timeout_secs),
            )
            .map_err(|e| startup_error("Failed to build notification client", e))?;
            info!("Device notifications enabled");
            Arc::new(client)
        }
        None => Arc::new(DisabledNotifier),
    };

    let app_state = AppState {
        store,
        tokens,
        notifier,
        discovery: settings.discovery.missing_profile,
        pagination: settings.pagination.limits(),
    };

    // Configure HTTP server
    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().error_handler(handle_json_payload_error))
            .app_data(web::QueryConfig::default().error_handler(handle_query_payload_error))
            .wrap(cors)
            .wrap(middleware::NormalizePath::trim())
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .client_request_timeout(Duration::from_secs(settings.server.client_request_timeout_secs))
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}
