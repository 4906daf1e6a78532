//! Champion/challenger comparison on held-out data

use std::fmt;

use log::info;
use serde::{Deserialize, Serialize};

use crate::dataframe::DataFrame;
use crate::error::{Error, Result};
use crate::ml::features::Dataset;
use crate::ml::metrics::Scorer;
use crate::ml::persistence::SavedModel;
use crate::ml::pipeline::Pipeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    Champion,
    Challenger,
}

/// Result of scoring a deployed model against a candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeOutcome {
    pub metric: String,
    pub champion_score: f64,
    pub challenger_score: f64,
    pub winner: Winner,
    /// How much better the winner scored, always non-negative
    pub margin: f64,
    pub n_samples: usize,
}

impl fmt::Display for ChallengeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<12} {:.4}", "champion", self.champion_score)?;
        writeln!(f, "{:<12} {:.4}", "challenger", self.challenger_score)?;
        write!(
            f,
            "winner: {:?} by {:.4} {} on {} samples",
            self.winner, self.margin, self.metric, self.n_samples
        )
    }
}

fn decide(champion_score: f64, challenger_score: f64, scorer: &Scorer, n_samples: usize) -> ChallengeOutcome {
    // the challenger has to be strictly better to replace the champion
    let winner = if scorer.is_better(challenger_score, champion_score) {
        Winner::Challenger
    } else {
        Winner::Champion
    };
    let outcome = ChallengeOutcome {
        metric: scorer.name().to_string(),
        champion_score,
        challenger_score,
        winner,
        margin: (challenger_score - champion_score).abs(),
        n_samples,
    };
    info!(
        "champion {:.4} vs challenger {:.4} ({}): {:?} wins",
        champion_score, challenger_score, outcome.metric, winner
    );
    outcome
}

/// Scores two fitted pipelines on the same dataset
pub fn compare_models(
    champion: &Pipeline,
    challenger: &Pipeline,
    dataset: &Dataset,
    scorer: &Scorer,
) -> Result<ChallengeOutcome> {
    let champion_score = scorer.score(&dataset.y, &champion.predict(&dataset.x)?)?;
    let challenger_score = scorer.score(&dataset.y, &challenger.predict(&dataset.x)?)?;
    Ok(decide(champion_score, challenger_score, scorer, dataset.n_samples()))
}

/// Scores two saved models on one table. Each model reads its own feature
/// columns; both must agree on the labels.
pub fn compare_saved_models(
    champion: &SavedModel,
    challenger: &SavedModel,
    df: &DataFrame,
    scorer: &Scorer,
) -> Result<ChallengeOutcome> {
    let champion_data = champion.dataset(df)?;
    let challenger_data = challenger.dataset(df)?;
    if champion_data.y != challenger_data.y {
        return Err(Error::InvalidInput(
            "champion and challenger read different labels from the data".to_string(),
        ));
    }

    let champion_score = scorer.score(
        &champion_data.y,
        &champion.pipeline.predict(&champion_data.x)?,
    )?;
    let challenger_score = scorer.score(
        &challenger_data.y,
        &challenger.pipeline.predict(&challenger_data.x)?,
    )?;
    Ok(decide(
        champion_score,
        challenger_score,
        scorer,
        champion_data.n_samples(),
    ))
}
