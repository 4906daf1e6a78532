//! Machine learning module
//!
//! Feature extraction, preprocessing, classifiers, metrics, model selection
//! and persistence, all working on row-major `Vec<Vec<f64>>` matrices built
//! from a [`crate::DataFrame`].

pub mod evaluation;
pub mod feature_selection;
pub mod features;
pub mod metrics;
pub mod model_selection;
pub mod models;
pub mod persistence;
pub mod pipeline;
pub mod preprocessing;

pub use evaluation::{compare_models, compare_saved_models, ChallengeOutcome, Winner};
pub use features::{Dataset, EntityFeatureExtractor, FeatureSpec, RatioSpec, TargetSpec};
pub use metrics::{ModelMetrics, Scorer};
pub use model_selection::{
    cross_val_score, train_test_split, CvStrategy, GridSearchCV, KFold, ParamGrid,
    StratifiedKFold,
};
pub use models::{Classifier, Estimator, ParamValue};
pub use persistence::{ModelPersistence, SavedModel};
pub use pipeline::{Pipeline, Step, Transformer};
