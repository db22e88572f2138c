use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tmms_core::NodeRegistry;
use tmms_server::config::AppConfig;
use tmms_server::customize::TarCustomizer;
use tmms_server::metrics;
use tmms_server::routes;
use tmms_server::state::AppState;
use tmms_server::telemetry::init_tracing;
use tokio::signal;
use tracing::{info, warn};

/// Topology tried when the configured one cannot be loaded.
const FALLBACK_TMCONFIG: &str = "configs/tmconfig.json";

#[derive(Debug, Parser)]
#[command(
    name = "tmms-server",
    author,
    version,
    about = "Manifesting server run settings"
)]
struct Cli {
    /// Configuration file (TOML). Missing files are ignored.
    #[arg(long, env = "TMMS_CONFIG", default_value = "/etc/tmms/tmms.toml")]
    config: PathBuf,

    /// Make it talk.
    #[arg(long)]
    verbose: bool,

    /// No action run; simulation of events.
    #[arg(long)]
    dry_run: bool,

    /// Address to listen on, overriding the config file.
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on, overriding the config file.
    #[arg(long)]
    port: Option<u16>,
}

impl Cli {
    fn apply(self, mut cfg: AppConfig) -> AppConfig {
        cfg.verbose |= self.verbose;
        cfg.dry_run |= self.dry_run;
        if let Some(host) = self.host {
            cfg.host = host;
        }
        if let Some(port) = self.port {
            cfg.port = port;
        }
        cfg
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone();
    let cfg = cli.apply(
        AppConfig::load(Some(&config_path))
            .with_context(|| format!("failed to load {}", config_path.display()))?,
    );
    init_tracing(&cfg.tracing_filter());

    let registry = load_registry(&cfg.tmconfig)?;
    let listen_addr = cfg.listen_addr()?;
    let customizer = Arc::new(
        TarCustomizer::new(
            cfg.customize_command.clone(),
            cfg.l4tm_mirror.clone(),
            cfg.l4tm_release.clone(),
        )
        .with_areas(cfg.l4tm_areas.clone()),
    );

    info!(
        addr = %listen_addr,
        config = %config_path.display(),
        nodes = registry.len(),
        manifesting_root = %cfg.manifesting_root.display(),
        tftp_images = %cfg.tftp_images_dir().display(),
        api_version = cfg.api_version,
        dry_run = cfg.dry_run,
        "starting tmms-server"
    );

    let state = AppState::from_config(cfg, registry, customizer);
    let app = routes::router(state);
    metrics::BOOT_COUNTER.inc();

    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .context("failed to bind listener")?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server shutdown with error")?;

    info!("shutdown complete");
    Ok(())
}

fn load_registry(tmconfig: &Path) -> Result<NodeRegistry> {
    match NodeRegistry::from_path(tmconfig) {
        Ok(registry) => Ok(registry),
        Err(err) => {
            warn!(
                path = %tmconfig.display(),
                error = %err,
                fallback = FALLBACK_TMCONFIG,
                "failed to load topology; trying fallback"
            );
            NodeRegistry::from_path(Path::new(FALLBACK_TMCONFIG))
                .with_context(|| format!("failed to load topology from {FALLBACK_TMCONFIG}"))
        }
    }
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
}
