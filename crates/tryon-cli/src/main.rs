// ============================================================================
// tryon — Virtual try-on from the command line
// ============================================================================
// Usage:
//   tryon serve [--bind ADDR]                     Run the try-on proxy
//   tryon try-on --person ME.jpg --outfit FIT.jpg Generate a try-on image
//   tryon garments [--category tops] [--json]     List the wardrobe
//   tryon wardrobe --source ME.jpg [--garment ID] Simulated AR wardrobe
// ============================================================================

mod tryon_page;
mod wardrobe_page;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tryon_core::{
    FacingMode, GarmentCatalog, HttpGateway, ProxyConfig, ProxyServer, TryOnProxy,
    RESULT_FILE_NAME,
};

/// Virtual clothing try-on: AI proxy, try-on client and AR wardrobe
#[derive(Parser)]
#[command(name = "tryon", version, about = "Virtual clothing try-on")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the remote generation proxy
    Serve {
        /// Address to listen on (default: TRYON_BIND_ADDR or 127.0.0.1:8787)
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Upstream chat-completions endpoint
        #[arg(long)]
        gateway_url: Option<String>,

        /// Upstream model name
        #[arg(long)]
        model: Option<String>,
    },

    /// Upload a photo and an outfit and generate the try-on image
    TryOn {
        /// Photo of the person
        #[arg(long)]
        person: PathBuf,

        /// Photo of the outfit
        #[arg(long)]
        outfit: PathBuf,

        /// Where to save the result
        #[arg(long, default_value = RESULT_FILE_NAME)]
        output: PathBuf,

        /// Proxy endpoint (default: TRYON_PROXY_URL or http://127.0.0.1:8787/)
        #[arg(long)]
        proxy_url: Option<String>,

        /// Give up after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// List the garment catalog
    Garments {
        /// Only garments in this category
        #[arg(long)]
        category: Option<String>,

        /// Print as JSON
        #[arg(long)]
        json: bool,

        /// Use a catalog JSON file instead of the built-in wardrobe
        #[arg(long)]
        catalog: Option<PathBuf>,
    },

    /// Open the virtual wardrobe with a still photo as the camera feed
    Wardrobe {
        /// Photo served as the live camera feed
        #[arg(long)]
        source: PathBuf,

        /// Garment to select on start
        #[arg(long)]
        garment: Option<String>,

        /// Which camera to open first
        #[arg(long, value_enum, default_value = "user")]
        facing: Facing,

        /// Use a catalog JSON file instead of the built-in wardrobe
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Save one composited frame here and exit instead of prompting
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Facing {
    User,
    Environment,
}

impl From<Facing> for FacingMode {
    fn from(facing: Facing) -> Self {
        match facing {
            Facing::User => FacingMode::User,
            Facing::Environment => FacingMode::Environment,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("Warning: Could not load .env file: {}", e);
    }

    init_logging()?;

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve {
            bind,
            gateway_url,
            model,
        } => cmd_serve(bind, gateway_url, model).await,
        Commands::TryOn {
            person,
            outfit,
            output,
            proxy_url,
            timeout,
        } => {
            tryon_page::run(tryon_page::Args {
                person,
                outfit,
                output,
                proxy_url,
                timeout,
            })
            .await
        }
        Commands::Garments {
            category,
            json,
            catalog,
        } => cmd_garments(catalog.as_deref(), category.as_deref(), json),
        Commands::Wardrobe {
            source,
            garment,
            facing,
            catalog,
            snapshot,
        } => {
            wardrobe_page::run(wardrobe_page::Args {
                catalog: load_catalog(catalog.as_deref())?,
                source,
                garment,
                facing: facing.into(),
                snapshot,
            })
            .await
        }
    }
}

fn init_logging() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("tryon=info".parse()?)
        .add_directive("tryon_core=info".parse()?);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn load_catalog(path: Option<&Path>) -> Result<GarmentCatalog> {
    match path {
        Some(path) => GarmentCatalog::from_json_file(path),
        None => Ok(GarmentCatalog::builtin()),
    }
}

async fn cmd_serve(
    bind: Option<SocketAddr>,
    gateway_url: Option<String>,
    model: Option<String>,
) -> Result<()> {
    let mut config = ProxyConfig::from_env()?;
    if let Some(bind) = bind {
        config.bind_addr = bind;
    }
    if let Some(url) = gateway_url {
        config.gateway_url = url;
    }
    if let Some(model) = model {
        config.model = model;
    }

    if config.api_key.is_none() {
        warn!("AI_GATEWAY_API_KEY is not set; try-on requests will fail with 500");
    }
    info!("Using model {} at {}", config.model, config.gateway_url);

    let gateway = Arc::new(HttpGateway::new(&config)?);
    let server = ProxyServer::bind(config.bind_addr)?;
    let proxy = Arc::new(TryOnProxy::new(config, gateway));

    let shutdown = server.shutdown_handle();
    let runtime = tokio::runtime::Handle::current();
    let serving = tokio::task::spawn_blocking(move || server.run(proxy, runtime));

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow!("Failed to listen for Ctrl-C: {}", e))?;
    info!("Shutting down");
    shutdown.shutdown();
    serving.await?;

    Ok(())
}

fn cmd_garments(catalog: Option<&Path>, category: Option<&str>, json: bool) -> Result<()> {
    let catalog = load_catalog(catalog)?;
    let garments: Vec<_> = match category {
        Some(category) => catalog.by_category(category).collect(),
        None => catalog.list().iter().collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&garments)?);
        return Ok(());
    }

    if garments.is_empty() {
        println!("No garments found.");
        return Ok(());
    }

    println!("{:<16} {:<16} {:<10} {}", "ID", "NAME", "CATEGORY", "TINT");
    for garment in garments {
        println!(
            "{:<16} {:<16} {:<10} {}",
            garment.id, garment.name, garment.category, garment.overlay_color
        );
    }
    Ok(())
}
