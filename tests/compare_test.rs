//! Champion/challenger comparison of saved models

mod common;

use common::{credit_csv, write_text, TempTestDir};
use tabml::config::ExperimentConfig;
use tabml::experiment::{prepare_frame, Experiment};
use tabml::ml::{compare_saved_models, ModelPersistence, SavedModel, Scorer, Winner};

fn config(dir: &TempTestDir, name: &str, model: &str) -> ExperimentConfig {
    let text = format!(
        r#"
[data]
path = "credit.csv"

[target]
column = "class"
positive_values = ["bad"]

[features]
key = "id"

[[pipeline]]
name = "impute"
kind = "simple_imputer"

{}

[output]
model_path = "{}.json"
"#,
        model, name
    );
    let path = dir.join(&format!("{}.toml", name));
    write_text(&path, &text);
    ExperimentConfig::from_file(&path).unwrap()
}

#[test]
fn test_weak_champion_loses() {
    let dir = TempTestDir::new("compare");
    credit_csv(&dir, 48);

    // a stump restricted to age cannot see income or debt
    let mut weak = config(
        &dir,
        "champion",
        "[model]\nkind = \"decision_tree\"\nparams = { max_depth = 1 }",
    );
    weak.features.columns = vec!["age".to_string()];
    let strong = config(&dir, "challenger", "[model]\nkind = \"decision_tree\"");

    Experiment::from_config(weak.clone()).unwrap().run().unwrap();
    Experiment::from_config(strong).unwrap().run().unwrap();

    let champion = SavedModel::load_model(dir.join("champion.json")).unwrap();
    let challenger = SavedModel::load_model(dir.join("challenger.json")).unwrap();
    assert_eq!(champion.feature_names, vec!["age"]);

    let df = prepare_frame(&weak).unwrap();
    let outcome = compare_saved_models(&champion, &challenger, &df, &Scorer::Accuracy).unwrap();
    assert_eq!(outcome.winner, Winner::Challenger);
    assert_eq!(outcome.challenger_score, 1.0);
    assert_eq!(outcome.n_samples, 48);

    let cost = Scorer::cost(1.0, 10.0).unwrap();
    let reversed = compare_saved_models(&challenger, &champion, &df, &cost).unwrap();
    assert_eq!(reversed.winner, Winner::Champion);
    assert_eq!(reversed.champion_score, 0.0);
}

#[test]
fn test_identical_models_keep_champion() {
    let dir = TempTestDir::new("compare_tie");
    credit_csv(&dir, 32);
    let cfg = config(&dir, "model", "[model]\nkind = \"gaussian_nb\"");
    Experiment::from_config(cfg.clone()).unwrap().run().unwrap();

    let model = SavedModel::load_model(dir.join("model.json")).unwrap();
    let df = prepare_frame(&cfg).unwrap();
    let outcome = compare_saved_models(&model, &model.clone(), &df, &Scorer::from_name("f1").unwrap()).unwrap();
    assert_eq!(outcome.winner, Winner::Champion);
    assert_eq!(outcome.margin, 0.0);
}
