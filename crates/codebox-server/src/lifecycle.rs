//! Service startup and shutdown

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use codebox::sandbox::{ensure_sandbox_user, require_root};
use codebox::{
    ConcurrencyGate, Config, DependencyManager, Executors, Language, SandboxRoot, SandboxService,
};
use tokio::net::TcpListener;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info, warn};

use crate::app::{AppState, router};

/// Load and inspect the sandbox root for every language
pub fn load_roots(config: &Config) -> Result<(Arc<SandboxRoot>, Arc<SandboxRoot>)> {
    let load = |language: Language| -> Result<Arc<SandboxRoot>> {
        let root = SandboxRoot::from_config(config, language)
            .with_context(|| format!("failed to load the {language} isolation library"))?;
        match root.library().inspect() {
            Ok(lib) => info!(
                %language,
                feature = %lib.feature,
                version = %lib.version,
                "isolation library loaded"
            ),
            Err(e) => warn!(%language, error = %e, "could not inspect isolation library"),
        }
        Ok(Arc::new(root))
    };
    Ok((load(Language::Python3)?, load(Language::Nodejs)?))
}

/// Run the HTTP service until SIGINT or SIGTERM
pub async fn serve(mut config: Config) -> Result<()> {
    require_root().context("refusing to start")?;
    config.sandbox_gid = ensure_sandbox_user(&config.sandbox_user, config.sandbox_uid)
        .await
        .context("failed to prepare the sandbox user")?;
    let update_interval = config.deps_update_interval()?;
    let config = Arc::new(config);

    let (python_root, nodejs_root) = load_roots(&config)?;
    let executors = Executors::sandboxed(config.clone(), python_root.clone(), nodejs_root.clone());
    let deps = Arc::new(DependencyManager::new(config.clone(), python_root, nodejs_root));
    let gate = ConcurrencyGate::new(config.max_workers, config.max_requests);
    let service = SandboxService::new(config.clone(), executors, deps.clone(), gate);

    tokio::spawn({
        let deps = deps.clone();
        async move {
            if let Err(e) = deps.setup().await {
                error!(critical = true, error = %e, "dependency setup failed");
            }
        }
    });
    if let Some(interval) = update_interval {
        tokio::spawn(deps.run_periodic(interval));
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.app.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(
        port = config.app.port,
        debug = config.app.debug,
        max_workers = config.max_workers,
        max_requests = config.max_requests,
        enable_network = config.enable_network,
        sandbox_uid = config.sandbox_uid,
        sandbox_gid = config.sandbox_gid,
        "sandbox service listening"
    );

    axum::serve(listener, router(AppState::new(service, &config.app.key)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("sandbox service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = terminate => info!("received SIGTERM, shutting down"),
        () = interrupt => info!("received SIGINT, shutting down"),
    }
}
