use std::sync::Arc;
use tracing::info;

use jobscout::config::load_config;
use jobscout::control::{default_run_binary, router, ControlState, ProcessSupervisor, SupervisorConfig};
use jobscout::core::run_state::FileStatusStore;
use jobscout::core::stop_signal::FileStopSignal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=warn"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("jobscout {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    info!("Starting jobscout control plane");
    let config = load_config();
    let dashboard_dir = config.paths.resolve_dashboard_dir();
    std::fs::create_dir_all(&dashboard_dir)?;
    std::fs::create_dir_all(config.paths.resolve_run_dir())?;

    let run_binary = default_run_binary();
    info!("Run binary: {}", run_binary.display());
    let supervisor = ProcessSupervisor::new(SupervisorConfig::new(
        run_binary,
        config.paths.run_log_path(),
    ));

    let state = Arc::new(ControlState {
        supervisor: Arc::new(supervisor),
        status: Arc::new(FileStatusStore::new(config.paths.status_path())),
        stop: Arc::new(FileStopSignal::new(config.paths.stop_signal_path())),
    });

    let app = router(state.clone(), &dashboard_dir);

    // Start server
    let port = config.server.resolve_port(&args);
    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(l) => l,
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            anyhow::bail!(
                "Address already in use: {}. Stop the existing process or run with --port {} (or set PORT/JOBSCOUT_PORT).",
                bind_addr,
                port.saturating_add(1)
            )
        }
        Err(e) => return Err(e.into()),
    };
    info!(
        "Dashboard on http://{} (serving {})",
        bind_addr,
        dashboard_dir.display()
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    Ok(())
}

async fn shutdown_signal(state: Arc<ControlState>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).ok();

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = async {
                if let Some(ref mut s) = sigterm {
                    s.recv().await;
                } else {
                    futures::future::pending::<()>().await;
                }
            } => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    // A run outliving the server would have nobody to stop it.
    if state.supervisor.is_alive().await {
        info!("Shutting down: stopping the active run");
        state.stop.request();
        let outcome = state.supervisor.stop().await;
        state.stop.clear();
        info!("Active run stopped ({:?})", outcome);
    }
}
