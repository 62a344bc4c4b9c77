//! `toggle-proxy` binary: config layering, logging setup and the warp server

use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, Command};
use std::net::SocketAddr;
use std::path::PathBuf;
use toggle_core::Industry;
use toggle_proxy::config::ENV_CONFIG;
use toggle_proxy::ProxyConfig;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("toggle-proxy")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Same-origin chat proxy for the Toggle assistant")
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .env(ENV_CONFIG)
                .value_parser(value_parser!(PathBuf))
                .help("TOML config file"),
        )
        .arg(
            Arg::new("listen")
                .long("listen")
                .value_parser(value_parser!(SocketAddr))
                .help("Address to bind (overrides TOGGLE_PROXY_LISTEN)"),
        )
        .arg(
            Arg::new("backend")
                .long("backend")
                .help("Backend base URL (overrides PYTHON_API_URL)"),
        )
        .arg(
            Arg::new("industry")
                .long("industry")
                .help("Industry skin (overrides NEXT_PUBLIC_INDUSTRY)"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("log-json"));

    let mut config = ProxyConfig::load(matches.get_one::<PathBuf>("config").map(PathBuf::as_path))
        .context("loading proxy config")?;
    if let Some(listen) = matches.get_one::<SocketAddr>("listen") {
        config.listen = *listen;
    }
    if let Some(backend) = matches.get_one::<String>("backend") {
        config.backend_url.clone_from(backend);
    }
    if let Some(industry) = matches.get_one::<String>("industry") {
        config.industry = Industry::from_flag(industry);
    }
    config.validate().context("validating proxy config")?;

    let routes = toggle_proxy::build_routes(&config).context("building upstream client")?;
    let (addr, server) = warp::serve(routes)
        .try_bind_with_graceful_shutdown(config.listen, async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "failed to listen for shutdown signal");
            }
        })
        .with_context(|| format!("binding {}", config.listen))?;

    tracing::info!(
        %addr,
        backend = %config.backend_url,
        industry = %config.industry,
        "toggle-proxy listening"
    );
    server.await;
    tracing::info!("toggle-proxy stopped");
    Ok(())
}
