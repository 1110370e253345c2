use filedrop::config::Config;
use filedrop::endpoint::EndpointDescriptor;
use filedrop::engine::Engine;
use filedrop::handlers::HandlerRegistry;
use filedrop::status::{self, EngineStatus, StatusState};
use tokio::net::TcpListener;
use tracing::{error, info};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Build one engine per configured endpoint without starting any of them
pub fn assemble(config: &Config) -> Result<Vec<Engine>, AnyError> {
    let registry = HandlerRegistry::with_defaults();
    let settings = config.engine_settings();

    let mut engines = Vec::with_capacity(config.endpoints.len());
    for (name, endpoint_config) in &config.endpoints {
        let endpoint = EndpointDescriptor::from_config(name, endpoint_config)?;
        let handler = registry.handler(&endpoint_config.handler)?;
        let post_processor = registry.post_processor(&endpoint_config.post_processor)?;

        let engine = Engine::builder()
            .endpoint(endpoint)
            .handler(handler)
            .post_processor(post_processor)
            .settings(settings)
            .build()?;
        engines.push(engine);
    }

    Ok(engines)
}

pub async fn run(config: Config) -> Result<(), AnyError> {
    let mut engines = assemble(&config)?;
    for engine in &mut engines {
        engine.start().await?;
    }
    info!(endpoints = engines.len(), "FileDrop running");

    if config.status.enabled {
        let address = config.status.bind_addr;
        let state = StatusState::new(engines.iter().map(EngineStatus::of).collect());

        let listener = TcpListener::bind(address).await?;
        info!(%address, "Status server listening");

        axum::serve(listener, status::router(state).into_make_service())
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    } else {
        shutdown_signal().await;
    }

    for engine in &mut engines {
        engine.stop().await;
    }
    info!("FileDrop stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
