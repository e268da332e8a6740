//! Site server - personal pages plus the Adem relations calculator.

mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use adem::core::types::format_build_time;
use adem::io::config::load_config;
use adem::io::runner::ComputeRunner;
use clap::Parser;
use tracing::info;

use crate::state::AppState;

#[derive(Parser)]
#[command(name = "site")]
#[command(about = "Web server for the site and the Adem relations calculator")]
struct Args {
    /// Port to listen on
    #[arg(long, env = "PORT")]
    port: u16,

    /// Address to bind the server to
    #[arg(long, env = "BIND", default_value = "0.0.0.0")]
    bind: String,

    /// Directory containing templates/ and static/
    #[arg(long, env = "WEBROOT", default_value = ".")]
    web_root: PathBuf,

    /// TOML file with compute settings (defaults apply when omitted)
    #[arg(long, env = "ADEM_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    adem::logging::init("site=info,adem=info,tower_http=info");

    let args = Args::parse();

    let config = load_config(args.config.as_deref())?;
    info!(
        program = %config.compute.program,
        workdir = %config.compute.workdir.display(),
        timeout_secs = config.compute.timeout_secs,
        max_concurrent_runs = config.compute.max_concurrent_runs,
        "loaded compute config"
    );

    let runner: Arc<dyn ComputeRunner> = Arc::new(config.compute.runner());
    let build_time = format_build_time(chrono::Utc::now());
    let state = AppState::new(args.web_root.clone(), config, runner, build_time)?;
    info!(
        web_root = %args.web_root.display(),
        pages = state.templates.page_names().count(),
        "templates loaded"
    );

    let app = routes::router(state);

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_explicit_port() {
        let args = Args::try_parse_from(["site", "--port", "8080", "--web-root", "/srv/www"])
            .expect("parse");
        assert_eq!(args.port, 8080);
        assert_eq!(args.web_root, PathBuf::from("/srv/www"));
    }

    #[test]
    fn reject_non_integer_port() {
        assert!(Args::try_parse_from(["site", "--port", "http"]).is_err());
        assert!(Args::try_parse_from(["site", "--port", " 6000"]).is_err());
    }
}
