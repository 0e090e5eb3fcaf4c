//! CLI entry point for the city signals service.
//!
//! Runs the HTTP API, or answers a single query from the command line
//! against the same data and collaborators.

use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use city_signals::config::Settings;
use city_signals::context::AppContext;
use city_signals::features::Query;
use city_signals::output::{append_allocations, print_json, print_pretty};
use city_signals::server;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    filter::LevelFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "city_signals")]
#[command(about = "Traffic, weather, fleet and route signals for city planning", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct QueryArgs {
    /// Latitude in decimal degrees
    #[arg(long, allow_negative_numbers = true)]
    lat: f64,

    /// Longitude in decimal degrees
    #[arg(long, allow_negative_numbers = true)]
    lon: f64,

    /// Hour of day (0-23)
    #[arg(long)]
    hour: u32,

    /// Month (1-12)
    #[arg(long)]
    month: u32,

    /// Day of month
    #[arg(long)]
    day: u32,
}

impl From<QueryArgs> for Query {
    fn from(args: QueryArgs) -> Self {
        Query {
            latitude: args.lat,
            longitude: args.lon,
            hour: args.hour,
            month: args.month,
            day: args.day,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        /// Address to bind (defaults to BIND_ADDR)
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Predict the congestion index at a location and time
    Congestion(QueryArgs),
    /// Predict weather at a location and time
    Weather(QueryArgs),
    /// Recommend the bus allocation for a month
    Fleet {
        #[arg(short, long)]
        month: u32,

        /// Optional CSV file to append the allocation to
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Show per-stop AQI and congestion for a pickup route
    Route {
        #[arg(value_name = "ROUTE_ID")]
        route_id: String,
    },
    /// Summarize whether a pickup route should run as scheduled
    Pickup {
        #[arg(value_name = "ROUTE_ID")]
        route_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/city_signals.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("city_signals.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("RUST_LOG")
                .from_env_lossy(),
        );

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::DEBUG.into())
                .with_env_var("RUST_LOG_JSON")
                .from_env_lossy(),
        );

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env().context("reading configuration")?;
    let ctx = AppContext::load(&settings).context("loading reference data")?;

    match cli.command {
        Commands::Serve { bind } => {
            let addr = bind.unwrap_or_else(|| settings.bind_addr.clone());
            server::serve(Arc::new(ctx), &addr)
                .await
                .with_context(|| format!("serving on {addr}"))?;
        }
        Commands::Congestion(args) => {
            let query = Query::from(args);
            let index = ctx.congestion(&query).await?;
            info!(congestion_index = index, "Congestion predicted");
            print_json(&serde_json::json!({ "congestion_index": [index] }))?;
        }
        Commands::Weather(args) => {
            let forecast = ctx.weather(&Query::from(args)).await?;
            print_json(&forecast)?;
        }
        Commands::Fleet { month, output } => {
            let allocations = ctx.fleet.recommend(month)?;
            print_pretty(&allocations);
            if let Some(path) = output {
                append_allocations(&path, month, &allocations)
                    .with_context(|| format!("writing {path}"))?;
                info!(path = %path, month, "Allocation appended");
            }
            print_json(&ctx.fleet_recommendation(month, &allocations).await)?;
        }
        Commands::Route { route_id } => {
            print_json(&ctx.route_readings(&route_id).await?)?;
        }
        Commands::Pickup { route_id } => {
            let summary = ctx.pickup_recommendation(&route_id).await?;
            println!("{summary}");
        }
    }

    Ok(())
}
