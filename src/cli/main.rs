use anyhow::Context;
use clap::{Parser, Subcommand};
use reqwest::Client;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use titanic_predictor::{
    config::Config,
    ml::{fetch_dataset, ArtifactStore, Dataset, TrainingPipeline, DEFAULT_DATASET_URL},
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "titanic-cli")]
#[command(about = "Titanic Survival Predictor CLI", long_about = None)]
struct Cli {
    #[arg(short, long, env = "TITANIC_ENDPOINT", default_value = "http://localhost:8000")]
    endpoint: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model locally and publish its artifact set
    Train {
        /// Labeled CSV in the Kaggle train.csv layout
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Artifact root to publish into
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long)]
        n_estimators: Option<usize>,

        #[arg(long)]
        max_depth: Option<u16>,

        #[arg(long)]
        seed: Option<u64>,

        /// Print the report as JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Download the labeled dataset
    FetchData {
        #[arg(short, long, default_value = DEFAULT_DATASET_URL)]
        url: String,

        #[arg(short, long, default_value = "data/train.csv")]
        output: PathBuf,
    },

    /// Predict survival for a passenger
    Predict {
        /// Ticket class (1, 2 or 3)
        #[arg(short, long)]
        pclass: u8,

        #[arg(short, long)]
        name: String,

        #[arg(short, long)]
        sex: String,

        #[arg(short, long)]
        age: Option<f64>,

        #[arg(long, default_value = "0")]
        sibsp: u32,

        #[arg(long, default_value = "0")]
        parch: u32,

        #[arg(short, long)]
        fare: Option<f64>,

        /// Port of embarkation (C, Q or S)
        #[arg(short = 'E', long)]
        embarked: Option<String>,
    },

    /// Describe a passenger in plain English
    Ask {
        #[arg(value_name = "MESSAGE")]
        message: String,
    },

    /// Check server health
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Train {
            data,
            output,
            n_estimators,
            max_depth,
            seed,
            json,
        } => {
            init_tracing();
            let config = Config::load().unwrap_or_else(|e| {
                eprintln!("Failed to load configuration: {}", e);
                eprintln!("Using default configuration");
                Config::default()
            });

            let mut training = config.training.clone();
            if let Some(n) = n_estimators {
                training.n_estimators = n;
            }
            if let Some(depth) = max_depth {
                training.max_depth = depth;
            }
            if let Some(seed) = seed {
                training.seed = seed;
            }
            let data = data.unwrap_or_else(|| training.data_path.clone());
            let output = output.unwrap_or_else(|| config.model.artifact_dir.clone());

            let dataset = Dataset::from_csv_path(&data)
                .with_context(|| format!("Failed to read dataset {}", data.display()))?;
            let artifacts = TrainingPipeline::new(training)
                .fit(&dataset)
                .context("Training failed")?;
            let run_dir = ArtifactStore::new(&output)
                .publish(&artifacts)
                .with_context(|| format!("Failed to publish artifacts to {}", output.display()))?;

            let report = &artifacts.report;
            if json {
                println!("{}", serde_json::to_string_pretty(report)?);
            } else {
                println!("{}", report.summary);
                println!();
                println!(
                    "Train rows: {}  Test rows: {}  Skipped: {}",
                    report.n_train, report.n_test, report.n_skipped
                );
                println!("Fare boundaries: {:?}", report.fare_boundaries);
                println!();
                println!("Evaluation:");
                println!("{}", report.evaluation_metrics);
                println!();
                println!("Run {} published to {}", report.run_id, run_dir.display());
            }
        }

        Commands::FetchData { url, output } => {
            init_tracing();
            let dataset = fetch_dataset(&url, &output, Duration::from_secs(60))
                .await
                .with_context(|| format!("Failed to download {}", url))?;
            println!("{}", dataset.summary());
            println!();
            println!("Saved to {}", output.display());
        }

        Commands::Predict {
            pclass,
            name,
            sex,
            age,
            sibsp,
            parch,
            fare,
            embarked,
        } => {
            let response = Client::new()
                .post(format!("{}/predict", cli.endpoint))
                .json(&json!({
                    "pclass": pclass,
                    "name": name,
                    "sex": sex,
                    "age": age,
                    "sibsp": sibsp,
                    "parch": parch,
                    "fare": fare,
                    "embarked": embarked,
                }))
                .send()
                .await?;

            let body: serde_json::Value = response.json().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }

        Commands::Ask { message } => {
            let response = Client::new()
                .post(format!("{}/predict-nl", cli.endpoint))
                .json(&json!({ "message": message }))
                .send()
                .await?;

            let body: serde_json::Value = response.json().await?;
            match body.get("discussion").and_then(|d| d.as_str()) {
                Some(discussion) => println!("{}", discussion),
                None => println!("{}", serde_json::to_string_pretty(&body)?),
            }
        }

        Commands::Health => {
            let response = Client::new()
                .get(format!("{}/health", cli.endpoint))
                .send()
                .await?;

            let body: serde_json::Value = response.json().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "titanic_predictor=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}
