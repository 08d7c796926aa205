//! Serve command implementation

use crate::api::{create_router, AppState};
use crate::cache::{CacheClient, InMemoryCache};
use crate::cli::ServeArgs;
use crate::config::{LogFormat, TollgateConfig};
use crate::limiter::{ResetScheduler, SpendLimiter};
use crate::reconciler::{PlanReconciler, SpendingPlansSource};
use crate::store::PlanStores;
use anyhow::Context;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Load configuration with CLI overrides
pub fn load_config_with_overrides(args: &ServeArgs) -> anyhow::Result<TollgateConfig> {
    // Load from file if it exists, otherwise use defaults
    let mut config = if args.config.exists() {
        TollgateConfig::load(Some(&args.config))?
    } else {
        tracing::debug!("Config file not found, using defaults");
        TollgateConfig::default()
    };

    config = config.with_env_overrides();

    // CLI flags win over everything
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(ref host) = args.host {
        config.server.host = host.clone();
    }
    if let Some(ref log_level) = args.log_level {
        config.logging.level = log_level.clone();
    }
    if let Some(ref source) = args.spending_plans {
        config.spending_plans.source = Some(source.clone());
    }

    Ok(config)
}

/// Initialize tracing based on configuration
pub fn init_tracing(config: &crate::config::LoggingConfig) -> anyhow::Result<()> {
    let filter_str = crate::logging::build_filter_directives(config);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    match config.format {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()?;
        }
    }

    Ok(())
}

/// Limiter and stores over a fresh in-process cache.
pub fn build_limiter(config: &TollgateConfig) -> (Arc<SpendLimiter>, PlanStores) {
    let cache = CacheClient::new(
        Arc::new(InMemoryCache::new()),
        config.cache.operation_timeout(),
    );
    let stores = PlanStores::new(cache);
    let limiter = Arc::new(SpendLimiter::new(stores.clone(), config.limiter.clone()));
    (limiter, stores)
}

/// Apply the declared spending plans, if a source is configured.
pub async fn reconcile_declared_plans(
    config: &TollgateConfig,
    stores: &PlanStores,
) -> anyhow::Result<()> {
    let Some(ref setting) = config.spending_plans.source else {
        tracing::info!("No spending plans source configured");
        return Ok(());
    };
    let source = SpendingPlansSource::from_setting(setting);
    PlanReconciler::new(stores.clone())
        .populate_from_source(&source)
        .await
        .with_context(|| format!("failed to reconcile spending plans from {}", source.describe()))?;
    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal(cancel_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for CTRL+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, shutting down...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down...");
        }
        _ = cancel_token.cancelled() => {}
    }

    cancel_token.cancel();
}

/// Main serve command handler
pub async fn run_serve(args: ServeArgs) -> anyhow::Result<()> {
    // 1. Load and merge configuration
    let config = load_config_with_overrides(&args)?;
    config.validate()?;

    // 2. Initialize tracing
    init_tracing(&config.logging)?;

    tracing::info!("Starting Tollgate");
    tracing::debug!(?config, "Loaded configuration");

    // 3. Stores and limiter
    let (limiter, stores) = build_limiter(&config);

    // 4. Declared plans must be in place before the first request
    if args.no_reconcile {
        tracing::info!("Spending plan reconciliation disabled");
    } else {
        reconcile_declared_plans(&config, &stores).await?;
    }

    // 5. Reset scheduler
    let cancel_token = CancellationToken::new();
    let scheduler_handle = ResetScheduler::new(Arc::clone(&limiter)).start(cancel_token.clone());

    // 6. Bind and serve
    let config = Arc::new(config);
    let state = Arc::new(AppState::new(limiter, stores, Arc::clone(&config)));
    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!(addr = %addr, "Tollgate API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel_token.clone()))
        .await?;

    // 7. Cleanup
    cancel_token.cancel();
    tracing::info!("Waiting for reset scheduler to stop");
    scheduler_handle.await?;

    tracing::info!("Tollgate stopped");
    Ok(())
}
