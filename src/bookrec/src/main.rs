//! bookrec: collaborative-filtering book recommender.
//!
//! Trains a biased matrix-factorization model over a cleaned rating table,
//! evaluates configurations with k-fold cross-validation, and serves top-K
//! recommendations from the saved artifact.

use anyhow::Context;
use bookrec_api::ApiServer;
use bookrec_core::config::AppConfig;
use bookrec_core::types::{Hyperparameters, RatingRecord};
use bookrec_factorization::{catalog_from_records, read_rating_table, TableColumns};
use bookrec_recommend::RecommendEngine;
use bookrec_tuning::{
    cross_validate, train_pipeline, CrossValidationResult, CvOptions, TrainingRequest,
};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "bookrec")]
#[command(about = "Collaborative-filtering book recommender")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML). Defaults to ./bookrec.toml when present.
    #[arg(long, global = true, env = "BOOKREC_CONFIG")]
    config: Option<PathBuf>,

    /// Cleaned rating table (overrides config)
    #[arg(long, global = true, env = "BOOKREC__DATA__RATINGS_PATH")]
    ratings: Option<PathBuf>,

    /// Model artifact path (overrides config)
    #[arg(long, global = true, env = "BOOKREC__MODEL__ARTIFACT_PATH")]
    artifact: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Grid-search hyperparameters, retrain the best one and save the artifact
    Train(TrainArgs),
    /// Cross-validate a single configuration and print per-fold metrics
    Evaluate(EvaluateArgs),
    /// Print top-K recommendations for a user and a favorite book
    Recommend(RecommendArgs),
    /// Serve recommendations over HTTP
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
struct TrainArgs {
    /// Number of folds (overrides config)
    #[arg(long)]
    folds: Option<usize>,

    /// Random seed (overrides config)
    #[arg(long)]
    seed: Option<u64>,

    /// Worker threads, 0 for all cores (overrides config)
    #[arg(long)]
    parallelism: Option<usize>,
}

#[derive(Args, Debug)]
struct EvaluateArgs {
    #[arg(long, default_value_t = Hyperparameters::default().n_factors)]
    factors: usize,

    #[arg(long, default_value_t = Hyperparameters::default().learning_rate)]
    lr: f64,

    #[arg(long, default_value_t = Hyperparameters::default().regularization)]
    reg: f64,

    #[arg(long, default_value_t = Hyperparameters::default().n_epochs)]
    epochs: usize,

    /// Number of folds (overrides config)
    #[arg(long)]
    folds: Option<usize>,

    /// Emit the report as JSON instead of a table
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Args, Debug)]
struct RecommendArgs {
    #[arg(long)]
    user: String,

    #[arg(long)]
    book: String,

    /// Number of recommendations (overrides config)
    #[arg(long)]
    top_k: Option<usize>,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// HTTP port (overrides config)
    #[arg(long, env = "BOOKREC__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Expose Prometheus metrics on the configured metrics port
    #[arg(long, default_value_t = false)]
    metrics: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bookrec=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let result = match cli.command {
        Command::Train(args) => run_train(config, args),
        Command::Evaluate(args) => run_evaluate(config, args),
        Command::Recommend(args) => run_recommend(config, args),
        Command::Serve(args) => run_serve(config, args).await,
    };

    if let Err(e) = &result {
        error!(error = %e, "Command failed");
    }
    result
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) if cli.config.is_some() => {
            return Err(e).context("failed to load configuration file");
        }
        Err(e) => {
            warn!(error = %e, "Failed to load config, using defaults");
            AppConfig::default()
        }
    };

    if let Some(path) = &cli.ratings {
        config.data.ratings_path = path.display().to_string();
    }
    if let Some(path) = &cli.artifact {
        config.model.artifact_path = path.display().to_string();
    }
    Ok(config)
}

fn read_ratings(config: &AppConfig) -> anyhow::Result<Vec<RatingRecord>> {
    let columns = TableColumns::from(&config.data);
    read_rating_table(&config.data.ratings_path, &columns, config.training.rating_scale)
        .with_context(|| format!("failed to read rating table {}", config.data.ratings_path))
}

fn run_train(mut config: AppConfig, args: TrainArgs) -> anyhow::Result<()> {
    if let Some(folds) = args.folds {
        config.training.fold_count = folds;
    }
    if let Some(seed) = args.seed {
        config.training.seed = seed;
    }
    if let Some(parallelism) = args.parallelism {
        config.training.parallelism = parallelism;
    }
    config.validate()?;

    let request = TrainingRequest::from(&config.training);
    info!(
        configurations = request.grid.len(),
        folds = request.fold_count,
        seed = request.seed,
        "Training started"
    );

    let records = read_ratings(&config)?;
    let outcome = train_pipeline(&records, &request)?;
    outcome.save_model(&config.model.artifact_path)?;

    info!(
        best = %outcome.best_config,
        mean_rmse = outcome.metrics.mean_rmse(),
        mean_mae = outcome.metrics.mean_mae(),
        evaluated = outcome.search.outcomes.len() - outcome.search.n_failed(),
        failed = outcome.search.n_failed(),
        artifact = %config.model.artifact_path,
        "Training complete"
    );
    Ok(())
}

fn run_evaluate(mut config: AppConfig, args: EvaluateArgs) -> anyhow::Result<()> {
    if let Some(folds) = args.folds {
        config.training.fold_count = folds;
    }
    let params = Hyperparameters {
        n_factors: args.factors,
        learning_rate: args.lr,
        regularization: args.reg,
        n_epochs: args.epochs,
    };
    config.training = config.training.with_single(params);
    config.validate()?;

    let records = read_ratings(&config)?;
    let result = cross_validate(&records, &params, &CvOptions::from(&config.training))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&EvaluationReport::from(&result))?);
    } else {
        print_fold_table(&result);
    }
    Ok(())
}

fn run_recommend(mut config: AppConfig, args: RecommendArgs) -> anyhow::Result<()> {
    if let Some(k) = args.top_k {
        config.recommend.top_k = k;
    }
    config.validate()?;

    let catalog = catalog_from_records(&read_ratings(&config)?);
    let engine = RecommendEngine::load(
        &config.model.artifact_path,
        catalog,
        config.recommend.clone(),
    )?;
    let response = engine.recommend(args.user.trim(), &args.book.trim().to_lowercase())?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

async fn run_serve(mut config: AppConfig, args: ServeArgs) -> anyhow::Result<()> {
    if let Some(port) = args.http_port {
        config.api.http_port = port;
    }
    if args.metrics {
        config.metrics.enabled = true;
    }
    config.validate()?;

    let catalog = catalog_from_records(&read_ratings(&config)?);
    let engine = Arc::new(RecommendEngine::load(
        &config.model.artifact_path,
        catalog,
        config.recommend.clone(),
    )?);

    info!(
        http_port = config.api.http_port,
        artifact = %config.model.artifact_path,
        "Configuration loaded"
    );

    let api_server = ApiServer::new(config.clone(), engine);

    if config.metrics.enabled {
        if let Err(e) = api_server.start_metrics().await {
            error!(error = %e, "Failed to start metrics exporter");
        }
    }

    info!("bookrec is ready to serve traffic");
    api_server.start_http().await
}

#[derive(serde::Serialize)]
struct EvaluationReport<'a> {
    #[serde(flatten)]
    result: &'a CrossValidationResult,
    mean_rmse: f64,
    std_rmse: f64,
    min_rmse: f64,
    max_rmse: f64,
    mean_mae: f64,
}

impl<'a> From<&'a CrossValidationResult> for EvaluationReport<'a> {
    fn from(result: &'a CrossValidationResult) -> Self {
        Self {
            result,
            mean_rmse: result.mean_rmse(),
            std_rmse: result.std_rmse(),
            min_rmse: result.min_rmse(),
            max_rmse: result.max_rmse(),
            mean_mae: result.mean_mae(),
        }
    }
}

fn print_fold_table(result: &CrossValidationResult) {
    println!("Cross-validation of {}", result.params);
    println!("{:>6} {:>10} {:>10} {:>10} {:>10}", "fold", "rmse", "mae", "train", "test");
    for fold in &result.folds {
        println!(
            "{:>6} {:>10.4} {:>10.4} {:>10} {:>10}",
            fold.fold, fold.rmse, fold.mae, fold.train_size, fold.test_size
        );
    }
    println!(
        "{:>6} {:>10.4} {:>10.4}",
        "mean",
        result.mean_rmse(),
        result.mean_mae()
    );
    println!(
        "rmse std {:.4}, min {:.4}, max {:.4}",
        result.std_rmse(),
        result.min_rmse(),
        result.max_rmse()
    );
}
