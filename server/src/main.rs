mod config;

use std::future::IntoFuture;
use std::sync::Arc;

use anyhow::{Context, Result};
use datastore::{InMemoryRepository, Repository};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use video_service::AppState;

use config::Config;

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = terminate.recv() => {},
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "server=info,video_service=info,control_service=info,datastore=info,tower_http=info"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Loading configuration")?;
    tracing::info!(?config, "configuration loaded");

    let mut rng = match config.rng_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let store = if config.seed_demo_data {
        InMemoryRepository::with_demo_data(&mut rng)
            .await
            .context("Populating demo data")?
    } else {
        InMemoryRepository::new()
    };
    let repo: Arc<dyn Repository> = Arc::new(store);

    let state = AppState::new(repo.clone(), config.reaction_policy, rng);
    let public = video_service::create_router(state.clone()).layer(TraceLayer::new_for_http());
    let control = control_service::create_router(repo, state.engagement.clone())
        .layer(TraceLayer::new_for_http());

    let public_addr = format!("{}:{}", config.host, config.port);
    let control_addr = format!("{}:{}", config.host, config.control_port);
    let public_listener = tokio::net::TcpListener::bind(&public_addr)
        .await
        .with_context(|| format!("Binding public API on {public_addr}"))?;
    let control_listener = tokio::net::TcpListener::bind(&control_addr)
        .await
        .with_context(|| format!("Binding control API on {control_addr}"))?;

    tracing::info!(
        public = %public_listener.local_addr()?,
        control = %control_listener.local_addr()?,
        "listening"
    );

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);
    let mut public_shutdown = shutdown_tx.subscribe();
    let mut control_shutdown = shutdown_tx.subscribe();

    let public_server = axum::serve(public_listener, public)
        .with_graceful_shutdown(async move {
            let _ = public_shutdown.recv().await;
        })
        .into_future();
    let control_server = axum::serve(control_listener, control)
        .with_graceful_shutdown(async move {
            let _ = control_shutdown.recv().await;
        })
        .into_future();

    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(());
    });

    let (public_result, control_result) = tokio::join!(public_server, control_server);
    public_result.context("Public API server failed")?;
    control_result.context("Control API server failed")?;

    Ok(())
}
