use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;

use referral_insight::config::{self, PredictionConfig};
use referral_insight::models::ReferralRecord;
use referral_insight::pipeline::{BatchPredictor, InMemoryPredictionCache};
use referral_insight::training::{self, TrainingConfig, TrainingRecord};

#[derive(Parser)]
#[command(name = "referral-insight")]
#[command(about = "Train and run the referral disease / time-to-cater models", version)]
struct Cli {
    /// Directory holding the model artifacts
    #[arg(long, global = true, env = config::MODELS_DIR_ENV)]
    models_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train the disease classifier from historical referrals
    TrainDisease {
        /// JSON array of referrals with `diagnosis_code`
        #[arg(long)]
        data: PathBuf,
        /// Training settings (JSON); defaults when omitted
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Train the time-to-cater regressor from completed referrals
    TrainTime {
        #[arg(long)]
        data: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Predict disease and time to cater for a batch of referrals
    Predict {
        /// JSON array of referrals
        #[arg(long)]
        data: PathBuf,
        /// Prediction settings (JSON); defaults when omitted
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn read_config<T: DeserializeOwned + Default>(path: Option<&Path>) -> anyhow::Result<T> {
    match path {
        Some(path) => read_json(path),
        None => Ok(T::default()),
    }
}

fn main() -> anyhow::Result<()> {
    referral_insight::init_tracing();
    let cli = Cli::parse();
    let models_dir = cli.models_dir.unwrap_or_else(config::models_dir);

    match cli.command {
        Commands::TrainDisease { data, config } => {
            let records: Vec<TrainingRecord> = read_json(&data)?;
            let config: TrainingConfig = read_config(config.as_deref())?;
            let report = training::train_disease_model(&records, &config, &models_dir)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::TrainTime { data, config } => {
            let records: Vec<TrainingRecord> = read_json(&data)?;
            let config: TrainingConfig = read_config(config.as_deref())?;
            let report = training::train_time_model(&records, &config, &models_dir)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Predict { data, config } => {
            let records: Vec<ReferralRecord> = read_json(&data)?;
            let config: PredictionConfig = read_config(config.as_deref())?;
            let predictor = BatchPredictor::from_models_dir(
                &models_dir,
                Arc::new(InMemoryPredictionCache::new()),
                config,
            );
            let predictions = predictor.predict_all_batch(&records);
            println!("{}", serde_json::to_string_pretty(&predictions)?);
        }
    }
    Ok(())
}
