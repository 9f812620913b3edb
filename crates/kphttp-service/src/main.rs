use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kphttp_core::observer::TracingObserver;
use kphttp_core::{Protocol, RestServer};
use kphttp_service::config::ServiceConfig;
use kphttp_service::generator::{estimate_bits, CharsetGenerator};
use kphttp_service::paths::data_dir;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about = "KeePassHttp-compatible credential service", long_about = None)]
struct Cli {
    /// Directory holding config.json, keys.json and entries.json
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Explicit configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the protocol over HTTP until interrupted
    Run {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        /// Log every request and response body at debug level
        #[arg(long)]
        log_traffic: bool,
    },
    /// Print a password from the configured generator and its quality
    Generate,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("kphttp_service=info,kphttp_core=info")),
        )
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let data = match cli.data_dir {
        Some(dir) => dir,
        None => data_dir()?,
    };
    let mut config = ServiceConfig::resolve(cli.config, &data)?;

    match cli.command {
        Commands::Run {
            host,
            port,
            log_traffic,
        } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            config.log_traffic |= log_traffic;
            config.validate()?;
            run_command(config, data).await
        }
        Commands::Generate => generate_command(&config),
    }
}

async fn run_command(config: ServiceConfig, data: PathBuf) -> Result<()> {
    let protocol = Arc::new(kphttp_service::build_protocol(&config, &data)?);
    info!(
        name = protocol.name(),
        version = protocol.version(),
        data_dir = %data.display(),
        "protocol ready"
    );

    let mut server = RestServer::new(protocol);
    if config.log_traffic {
        server = server.with_observer(Arc::new(TracingObserver));
    }
    let server = Arc::new(server);

    let mut listening = {
        let server = server.clone();
        let host = config.host.clone();
        let port = config.port;
        tokio::spawn(async move { server.listen(Some(port), Some(host.as_str())).await })
    };

    tokio::select! {
        result = &mut listening => {
            let addr = result
                .context("listener task failed")?
                .context("listen")?;
            println!("serving on http://{addr}/ (Ctrl-C to stop)");
            signal::ctrl_c().await?;
            info!("shutdown requested");
        }
        _ = signal::ctrl_c() => {
            warn!("interrupted before the listener came up");
        }
    }

    server.close().await;
    if !listening.is_finished() {
        let _ = listening.await;
    }
    info!("stopped");
    Ok(())
}

fn generate_command(config: &ServiceConfig) -> Result<()> {
    let generator = CharsetGenerator::new(&config.generator)?;
    let password = generator.generate_now();
    println!("{password}");
    println!("quality: {} bits", estimate_bits(&password));
    Ok(())
}
