mod types;
mod indicators;
mod provider;
mod engine;
mod config;
mod web;
mod ml;
mod error;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use config::{AppSettings, LogFormat};
use engine::{run, DashboardRequest, Session};
use ml::{LstmConfig, LstmPredictor};
use provider::{fetch_history, fetch_latest, DataProvider, YahooFinanceClient};
use types::{to_f64, PriceRecord, Symbol};
use web::{start_dashboard_server, AppState};

#[derive(Parser)]
#[command(name = "stock-price-predictor")]
#[command(version = "0.1.0")]
#[command(about = "Stock price dashboard with LSTM backtests, forecasts and online learning", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Model file, overrides `model.path` from the configuration
    #[arg(short, long, global = true)]
    model: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the JSON dashboard API
    Serve {
        /// Port (default from configuration)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Show raw price data and the latest moving averages
    Show {
        #[arg(short, long)]
        symbol: Option<String>,
    },
    /// Compare predicted and actual closes over the test split
    Backtest {
        #[arg(short, long)]
        symbol: Option<String>,
    },
    /// Project prices beyond the last known day
    Forecast {
        #[arg(short, long)]
        symbol: Option<String>,
        /// Number of future days
        #[arg(short, long, value_parser = positive_days)]
        days: Option<usize>,
    },
    /// Apply one online-learning step on the latest price
    Learn {
        #[arg(short, long)]
        symbol: Option<String>,
    },
    /// Run the whole dashboard once and print it as JSON
    Run {
        #[arg(short, long)]
        symbol: Option<String>,
        #[arg(short, long, value_parser = positive_days)]
        days: Option<usize>,
        /// Also apply one online-learning step
        #[arg(short, long)]
        learn: bool,
    },
    /// Write a seeded, untrained model file
    InitModel {
        #[arg(short, long)]
        output: PathBuf,
        /// Input window length (default from configuration)
        #[arg(short, long)]
        window: Option<usize>,
        #[arg(long, default_value = "32")]
        hidden: usize,
        #[arg(long, default_value = "42")]
        seed: u64,
        /// SGD step size used by online updates
        #[arg(long, default_value = "0.001")]
        learning_rate: f64,
        /// Gradient-norm clip for online updates, 0 disables clipping
        #[arg(long, default_value = "1.0")]
        clip: f64,
    },
    /// Print the effective configuration as TOML
    Config,
}

fn positive_days(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(days) if days >= 1 => Ok(days),
        _ => Err(format!("'{}' is not a positive number of days", value)),
    }
}

fn init_logging(verbose: bool, format: LogFormat) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.finish())?,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut settings = AppSettings::load(&cli.config)?;
    if let Some(model) = cli.model {
        settings.model.path = model;
    }
    init_logging(cli.verbose, settings.general.log_format)?;

    info!("Stock Price Predictor v0.1.0");

    match cli.command {
        Commands::Serve { port } => {
            let port = port.unwrap_or(settings.server.port);
            serve(settings, port).await?;
        }
        Commands::Show { symbol } => {
            show_prices(&settings, symbol).await?;
        }
        Commands::Backtest { symbol } => {
            run_backtest(&settings, symbol).await?;
        }
        Commands::Forecast { symbol, days } => {
            run_forecast(&settings, symbol, days).await?;
        }
        Commands::Learn { symbol } => {
            run_online_update(&settings, symbol).await?;
        }
        Commands::Run { symbol, days, learn } => {
            run_dashboard(&settings, symbol, days, learn).await?;
        }
        Commands::InitModel { output, window, hidden, seed, learning_rate, clip } => {
            let window = window.unwrap_or(settings.model.window);
            let config = LstmConfig::new(window, hidden)
                .with_learning_rate(learning_rate)
                .with_gradient_clip((clip > 0.0).then_some(clip));
            let model = LstmPredictor::new(config, seed);
            model.save(&output)?;
            info!("Wrote untrained model (window={}, hidden={}) to {}", window, hidden, output.display());
        }
        Commands::Config => {
            println!("{}", settings.to_toml()?);
        }
    }

    Ok(())
}

fn yahoo_client(settings: &AppSettings) -> Result<YahooFinanceClient> {
    YahooFinanceClient::new(
        settings.data.base_url.as_str(),
        settings.data.user_agent.as_deref(),
        settings.data.timeout_secs,
    )
}

fn resolve_symbol(settings: &AppSettings, symbol: Option<String>) -> Result<Symbol> {
    Ok(symbol.as_deref().unwrap_or(settings.general.default_symbol.as_str()).parse()?)
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

async fn serve(settings: AppSettings, port: u16) -> Result<()> {
    let provider: Arc<dyn DataProvider> = Arc::new(yahoo_client(&settings)?);
    let session = Session::open(&settings);
    let state = AppState::new(session, provider, settings);
    start_dashboard_server(state, port).await
}

fn print_rows(rows: &[PriceRecord]) {
    println!(
        "{:<12} {:>12} {:>12} {:>12} {:>12} {:>12} {:>14}",
        "Date", "Open", "High", "Low", "Close", "Adj Close", "Volume"
    );
    for r in rows {
        println!(
            "{:<12} {:>12.2} {:>12.2} {:>12.2} {:>12.2} {:>12.2} {:>14}",
            r.date, r.open, r.high, r.low, r.close, r.adj_close, r.volume
        );
    }
}

async fn show_prices(settings: &AppSettings, symbol: Option<String>) -> Result<()> {
    let client = yahoo_client(settings)?;
    let symbol = resolve_symbol(settings, symbol)?;
    let series = fetch_history(&client, &symbol, today(), settings.general.history_years).await?;

    println!("\n=== {} Stock Data ({} days) ===", symbol, series.len());
    print_rows(series.head(5));
    println!("...");
    print_rows(series.tail(5));

    println!("\n=== Moving Averages ===");
    for ma in indicators::moving_averages(&series, &settings.forecast.moving_average_windows) {
        match ma.latest() {
            Some(value) => println!("MA{:<5} ${:.2}", ma.days, value),
            None => println!("MA{:<5} not enough history", ma.days),
        }
    }

    Ok(())
}

async fn run_backtest(settings: &AppSettings, symbol: Option<String>) -> Result<()> {
    let client = yahoo_client(settings)?;
    let symbol = resolve_symbol(settings, symbol)?;
    let series = fetch_history(&client, &symbol, today(), settings.general.history_years).await?;

    let mut session = Session::open(settings);
    let view = session.load(series)?;
    let report = session.backtest(&view)?;

    println!("\n=== {} Backtest (window {}) ===", symbol, report.window);
    println!("{:<12} {:>12} {:>12}", "Date", "Actual", "Predicted");
    for point in report.points.iter().rev().take(20).rev() {
        println!("{:<12} {:>12.2} {:>12.2}", point.date, point.actual, point.predicted);
    }
    if let (Some(rmse), Some(mae)) = (report.rmse, report.mae) {
        println!("\nPoints: {}  RMSE: {:.4}  MAE: {:.4}", report.len(), rmse, mae);
    } else {
        println!("\nTest split too short for a full window");
    }

    Ok(())
}

async fn run_forecast(settings: &AppSettings, symbol: Option<String>, days: Option<usize>) -> Result<()> {
    let client = yahoo_client(settings)?;
    let symbol = resolve_symbol(settings, symbol)?;
    let days = days.unwrap_or(settings.forecast.default_days);
    let series = fetch_history(&client, &symbol, today(), settings.general.history_years).await?;

    let mut session = Session::open(settings);
    let view = session.load(series)?;
    let forecast = session.forecast(&view, days)?;

    println!("\n=== {} Forecast after {} ===", symbol, forecast.start_after);
    for point in &forecast.points {
        println!("Day {:>3}: ${:.2}", point.day, point.price);
    }

    Ok(())
}

async fn run_online_update(settings: &AppSettings, symbol: Option<String>) -> Result<()> {
    let client = yahoo_client(settings)?;
    let symbol = resolve_symbol(settings, symbol)?;
    let today = today();
    let series = fetch_history(&client, &symbol, today, settings.general.history_years).await?;

    let observation = match fetch_latest(&client, &symbol, today).await {
        Ok(record) => record,
        Err(e) => {
            error!("No new data for {}: {}", symbol, e);
            return Ok(());
        }
    };

    let mut session = Session::open(settings);
    let view = session.load(series)?;
    let update = session.online_update(&view, &observation)?;

    println!("\n=== {} Online Update ===", symbol);
    println!("Observed ({}): ${:.2}", update.observation_date, to_f64(observation.adj_close));
    println!("Predicted before update: ${:.2}", update.predicted_next);
    println!("Model updated with the new data point (not saved)");

    Ok(())
}

async fn run_dashboard(settings: &AppSettings, symbol: Option<String>, days: Option<usize>, learn: bool) -> Result<()> {
    let client = yahoo_client(settings)?;
    let request = DashboardRequest {
        symbol: resolve_symbol(settings, symbol)?,
        days: days.unwrap_or(settings.forecast.default_days),
        learn,
    };

    let mut session = Session::open(settings);
    let report = run(&client, &mut session, &request, today(), settings.general.history_years).await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
