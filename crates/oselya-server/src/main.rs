mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use oselya_api::clock::{Clock, SystemClock};
use oselya_api::throttle::{self, LoginThrottle, MemoryCounterStore};
use oselya_api::{AppState, AppStateInner};
use oselya_db::Database;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "oselya=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    let db = Database::open(&config.db_path)?;
    for username in &config.staff_usernames {
        if db.set_staff(username, true)? {
            info!("Granted staff rights to {}", username);
        } else {
            warn!("Staff username {} does not exist yet", username);
        }
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let counters = Arc::new(MemoryCounterStore::new(clock.clone()));
    tokio::spawn(throttle::run_sweep_loop(counters.clone(), config.sweep_secs));

    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret.clone(),
        session_days: config.session_days,
        throttle: LoginThrottle::new(counters, config.throttle),
        clock,
    });

    let app = oselya_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Oselya server listening on {}", addr);
    info!(
        "Login throttle: {} attempts per {}s per IP, lock after {} failures for {}s",
        config.throttle.max_attempts_per_ip,
        config.throttle.window_secs,
        config.throttle.max_failures,
        config.throttle.lock_secs
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = terminate => info!("Received SIGTERM, shutting down..."),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
        info!("Received Ctrl+C, shutting down...");
    }
}
