use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use tabml::config::ExperimentConfig;
use tabml::dataframe::{Column, DataFrame};
use tabml::experiment::{prepare_frame_for_models, Experiment};
use tabml::io::write_csv;
use tabml::ml::{compare_saved_models, ModelPersistence, SavedModel};

#[derive(Parser)]
#[command(author, version, about = "Tabular classification experiments on CSV data", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train and evaluate the experiment described by a config file
    Run {
        /// Experiment config (.toml, .yaml or .yml)
        #[arg(long)]
        config: PathBuf,
        /// Also write the report to this JSON file
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Apply a saved model to a CSV file
    Predict {
        /// Saved model written by `run`
        #[arg(long)]
        model: PathBuf,
        /// Config used to prepare the data
        #[arg(long)]
        config: PathBuf,
        /// Input CSV; the target column is not required
        #[arg(long)]
        data: PathBuf,
        /// Output CSV with id, prediction and probability columns
        #[arg(long)]
        output: PathBuf,
    },
    /// Score a deployed model against a candidate on the same data
    Compare {
        #[arg(long)]
        champion: PathBuf,
        #[arg(long)]
        challenger: PathBuf,
        /// Config providing data preparation and the scorer
        #[arg(long)]
        config: PathBuf,
        /// Held-out CSV; defaults to the config's data file
        #[arg(long)]
        data: Option<PathBuf>,
    },
}

fn load_config(path: &Path) -> Result<ExperimentConfig> {
    ExperimentConfig::from_file(path)
        .with_context(|| format!("failed to load config {}", path.display()))
}

fn load_model(path: &Path) -> Result<SavedModel> {
    SavedModel::load_model(path)
        .with_context(|| format!("failed to load model {}", path.display()))
}

fn run(config: &Path, report: Option<&Path>) -> Result<()> {
    let experiment = Experiment::from_config(load_config(config)?)?;
    let result = experiment.run()?;
    if let Some(path) = report {
        result.save_json(path)?;
    }
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn predict(model: &Path, config: &Path, data: &Path, output: &Path) -> Result<()> {
    let config = load_config(config)?;
    let model = load_model(model)?;
    let df = prepare_frame_for_models(&config, data, &[&model])?;
    let predictions = model.predict_frame(&df)?;

    let id_column = model.key.clone().unwrap_or_else(|| "row".to_string());
    let mut out = DataFrame::new();
    out.add_column(id_column, Column::String(predictions.ids))?;
    out.add_column("prediction", Column::Float64(predictions.labels))?;
    out.add_column("probability", Column::Float64(predictions.positive_proba))?;
    write_csv(&out, output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    log::info!("wrote {} predictions to {}", out.row_count(), output.display());
    Ok(())
}

fn compare(champion: &Path, challenger: &Path, config: &Path, data: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;
    let champion = load_model(champion)?;
    let challenger = load_model(challenger)?;
    let data = data.unwrap_or(config.data.path.as_path());
    let df = prepare_frame_for_models(&config, data, &[&champion, &challenger])?;
    let outcome = compare_saved_models(&champion, &challenger, &df, &config.scorer())?;
    println!("{}", outcome);
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    match &cli.command {
        Commands::Run { config, report } => run(config, report.as_deref()),
        Commands::Predict {
            model,
            config,
            data,
            output,
        } => predict(model, config, data, output),
        Commands::Compare {
            champion,
            challenger,
            config,
            data,
        } => compare(champion, challenger, config, data.as_deref()),
    }
}
