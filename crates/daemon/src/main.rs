//! Resilience Daemon - Main Entry Point
//! Fallback orchestrator + error recovery system over a simulated cache tier

mod settings;
mod simulation;

use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use resilience_core::application::{shutdown_channel, ErrorRecoverySystem, FallbackOrchestrator};
use resilience_core::domain::ServiceType;
use resilience_core::port::id_provider::UuidProvider;
use resilience_core::port::time_provider::SystemTimeProvider;
use resilience_core::port::{IdProvider, InMemoryHealthProvider, ServiceHealthProvider, TimeProvider};
use simulation::{LoggingSyncExecutor, Simulation};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize logging
    let log_format =
        std::env::var("RESILIENCE_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("resilience=info"))?;

    match log_format.as_str() {
        "json" => {
            // Production: JSON structured logging
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            // Development: Pretty formatting with colors
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }

    info!("Resilience daemon v{} starting...", VERSION);

    // 2. Load configuration
    let config_path = settings::config_path();
    let recovery_config = settings::load_recovery_config(&config_path)?;
    info!(
        config_path = %config_path,
        max_queue_size = recovery_config.max_queue_size,
        worker_batch_size = recovery_config.worker_batch_size,
        sync_batch_size = recovery_config.sync_batch_size,
        "Configuration loaded"
    );

    // 3. Setup dependencies (DI wiring)
    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let id_provider: Arc<dyn IdProvider> = Arc::new(UuidProvider);
    let health = Arc::new(InMemoryHealthProvider::new());
    let health_port: Arc<dyn ServiceHealthProvider> = health.clone();

    let orchestrator = Arc::new(FallbackOrchestrator::new(
        health_port.clone(),
        time_provider.clone(),
    ));
    simulation::register_policies(&orchestrator)
        .await
        .map_err(|e| anyhow::anyhow!("Fallback policy registration failed: {}", e))?;

    let recovery = Arc::new(
        ErrorRecoverySystem::new(recovery_config, health_port, time_provider, id_provider)
            .map_err(|e| anyhow::anyhow!("Recovery system creation failed: {}", e))?,
    );
    recovery
        .register_sync_executor(ServiceType::Redis, Arc::new(LoggingSyncExecutor))
        .await;
    recovery
        .register_service_recovery_callback(
            ServiceType::Redis,
            Arc::new(|service| info!(service = %service, "Recovery callback fired")),
        )
        .await;

    // 4. Start background loops
    info!("Starting error recovery system...");
    recovery.start().await;

    // 5. Start simulated workload
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let simulation = Simulation::new(
        orchestrator.clone(),
        recovery.clone(),
        health,
        settings::simulation_interval(),
    );
    let simulation_handle = tokio::spawn(async move {
        simulation.run(shutdown_rx).await;
    });

    info!("System ready. Press Ctrl+C to shutdown");

    // 6. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received. Exiting gracefully...");

    // 7. Graceful shutdown
    shutdown_tx.shutdown();
    simulation::await_stop(simulation_handle, std::time::Duration::from_secs(5)).await;

    let drained = recovery.shutdown().await;
    let evicted = orchestrator.shutdown().await;
    let status = serde_json::to_string(&recovery.get_recovery_status().await)?;
    info!(
        drained_critical = drained,
        emergency_cache_evicted = evicted,
        status = %status,
        "Shutdown complete."
    );

    Ok(())
}
