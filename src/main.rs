use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Json, Router};
use axum_prometheus::PrometheusMetricLayer;
use clap::{Args, Parser, Subcommand};
use dealer_incentives::config::AppConfig;
use dealer_incentives::error::AppError;
use dealer_incentives::telemetry;
use dealer_incentives::workflows::incentives::{
    incentive_router, AccrualEngine, CsvVolumeFeed, IncentiveGateway, InMemoryIncentiveRepository,
    RateRules, RateRuleset, Tier,
};
use metrics_exporter_prometheus::PrometheusHandle;
use rust_decimal::Decimal;
use serde_json::json;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
struct AppState {
    readiness: Arc<AtomicBool>,
    metrics: PrometheusHandle,
}

#[derive(Parser, Debug)]
#[command(
    name = "Dealer Incentive Engine",
    about = "Run the dealer incentive accrual and payout service from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Inspect rebate calculations without touching any stored data
    Rebate {
        #[command(subcommand)]
        command: RebateCommand,
    },
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    port: Option<u16>,
    /// CSV extract of qualifying volumes (program,dealer,period_start,volume)
    #[arg(long)]
    volumes_csv: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum RebateCommand {
    /// Preview the accrual a volume would earn under a rate ruleset
    Preview(RebatePreviewArgs),
}

#[derive(Args, Debug)]
struct RebatePreviewArgs {
    /// Qualifying purchase volume for the period
    #[arg(long, value_parser = parse_decimal)]
    volume: Decimal,
    /// Flat rate as a decimal fraction (ignored when tiers are given)
    #[arg(long, value_parser = parse_decimal)]
    flat_rate: Option<Decimal>,
    /// Tier spec `name:min_volume:rate`, repeatable, ascending thresholds
    #[arg(long = "tier", value_parser = parse_tier)]
    tiers: Vec<TierSpec>,
    /// Cap applied to each dealer's final amount
    #[arg(long, value_parser = parse_decimal)]
    max_payout_per_dealer: Option<Decimal>,
}

#[derive(Debug, Clone)]
struct TierSpec {
    name: String,
    min_volume: Decimal,
    rate: Decimal,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run_cli().await {
        eprintln!("application error: {err}");
        std::process::exit(1);
    }
}

async fn run_cli() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => run_server(args).await,
        Command::Rebate {
            command: RebateCommand::Preview(args),
        } => run_rebate_preview(args),
    }
}

fn parse_decimal(raw: &str) -> Result<Decimal, String> {
    raw.trim()
        .parse::<Decimal>()
        .map_err(|err| format!("failed to parse '{raw}' as a decimal amount ({err})"))
}

fn parse_tier(raw: &str) -> Result<TierSpec, String> {
    let mut parts = raw.splitn(3, ':');
    let (name, min_volume, rate) = match (parts.next(), parts.next(), parts.next()) {
        (Some(name), Some(min), Some(rate)) if !name.trim().is_empty() => (name, min, rate),
        _ => return Err(format!("tier '{raw}' must look like name:min_volume:rate")),
    };

    Ok(TierSpec {
        name: name.trim().to_string(),
        min_volume: parse_decimal(min_volume)?,
        rate: parse_decimal(rate)?,
    })
}

async fn run_server(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let volume_path = args.volumes_csv.take().or(config.feeds.volume_feed.clone());
    let volumes = match volume_path {
        Some(path) => CsvVolumeFeed::from_path(path)?,
        None => CsvVolumeFeed::default(),
    };
    if volumes.is_empty() {
        info!("no volume extract loaded; accrual runs will report missing volumes per dealer");
    }

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let state = AppState {
        readiness: readiness_flag.clone(),
        metrics: prometheus_handle,
    };

    let repository = Arc::new(InMemoryIncentiveRepository::default());
    let gateway = Arc::new(IncentiveGateway::new(repository, Arc::new(volumes)));

    let app: Router = incentive_router(gateway)
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .layer(Extension(state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "dealer incentive engine ready");

    axum::serve(listener, app).await?;
    Ok(())
}

fn run_rebate_preview(args: RebatePreviewArgs) -> Result<(), AppError> {
    let rules = if args.tiers.is_empty() {
        match args.flat_rate {
            Some(rate) => RateRules::Flat(rate),
            None => {
                eprintln!("either --flat-rate or at least one --tier is required");
                std::process::exit(2);
            }
        }
    } else {
        RateRules::Tiered(
            args.tiers
                .into_iter()
                .map(|tier| Tier {
                    name: tier.name,
                    min_volume: tier.min_volume,
                    max_volume: None,
                    rate: tier.rate,
                })
                .collect(),
        )
    };

    let engine = AccrualEngine::new(RateRuleset {
        rules,
        max_payout: None,
        max_payout_per_dealer: args.max_payout_per_dealer,
    });
    let breakdown = engine.evaluate(args.volume);

    println!("Rebate preview");
    println!("==============");
    println!("qualifying volume : {}", args.volume);
    println!("rate              : {}", breakdown.rate);
    println!(
        "tier achieved     : {}",
        breakdown.tier_achieved.as_deref().unwrap_or("-")
    );
    println!("tier progress     : {}%", breakdown.tier_progress);
    println!("accrued amount    : {}", breakdown.accrued_amount);
    println!("final amount      : {}", breakdown.final_amount);

    Ok(())
}

async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
