//! Machine Learning Benchmarks
//!
//! Fitting and prediction cost of the classifiers, a preprocessing
//! pipeline and a small grid search on synthetic data.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use tabml::ml::metrics::Scorer;
use tabml::ml::model_selection::{CvStrategy, GridSearchCV, ParamGrid, StratifiedKFold};
use tabml::ml::models::ensemble::RandomForestConfigBuilder;
use tabml::ml::models::{
    Classifier, DecisionTreeClassifier, DecisionTreeConfig, Estimator, KNeighborsClassifier,
    RandomForestClassifier,
};
use tabml::ml::pipeline::{Pipeline, Step};
use tabml::ml::preprocessing::{SimpleImputer, StandardScaler};
use tabml::ml::Dataset;

/// Synthetic binary problem: the label is `f0 + f1 > 1`
fn create_classification_dataset(n_samples: usize, n_features: usize) -> Dataset {
    // Simple LCG random generator for reproducibility
    let mut rng_state: u64 = 42;
    let mut rand_f64 = || -> f64 {
        rng_state = rng_state.wrapping_mul(6364136223846793005).wrapping_add(1);
        (rng_state >> 33) as f64 / (u32::MAX as f64)
    };

    let x: Vec<Vec<f64>> = (0..n_samples)
        .map(|_| (0..n_features).map(|_| rand_f64()).collect())
        .collect();
    let y: Vec<f64> = x
        .iter()
        .map(|row| if row[0] + row[1] > 1.0 { 1.0 } else { 0.0 })
        .collect();
    Dataset {
        x,
        y,
        feature_names: (0..n_features).map(|f| format!("feature_{}", f)).collect(),
        ids: (0..n_samples).map(|i| i.to_string()).collect(),
    }
}

fn bench_decision_tree(c: &mut Criterion) {
    let mut group = c.benchmark_group("Decision Tree");

    for n_samples in [100, 500, 1000].iter() {
        let data = create_classification_dataset(*n_samples, 10);
        let config = DecisionTreeConfig {
            max_depth: Some(5),
            ..DecisionTreeConfig::default()
        };

        group.bench_with_input(BenchmarkId::new("fit", n_samples), &data, |b, data| {
            b.iter(|| {
                let mut tree = DecisionTreeClassifier::new(config.clone());
                tree.fit(std::hint::black_box(&data.x), &data.y).unwrap();
            });
        });

        // Pre-fit a tree for prediction benchmark
        let mut tree = DecisionTreeClassifier::new(config.clone());
        tree.fit(&data.x, &data.y).unwrap();

        group.bench_with_input(
            BenchmarkId::new("predict", n_samples),
            &(&data, &tree),
            |b, (data, tree)| {
                b.iter(|| {
                    tree.predict(std::hint::black_box(&data.x)).unwrap();
                });
            },
        );
    }

    group.finish();
}

fn bench_random_forest(c: &mut Criterion) {
    let mut group = c.benchmark_group("Random Forest");
    group.sample_size(10); // Reduce sample size for slower benchmarks

    let data = create_classification_dataset(500, 10);
    for n_jobs in [1, 0].iter() {
        group.bench_with_input(BenchmarkId::new("fit_n_jobs", n_jobs), &data, |b, data| {
            b.iter(|| {
                let config = RandomForestConfigBuilder::new()
                    .n_estimators(20)
                    .max_depth(5)
                    .random_seed(7)
                    .n_jobs(*n_jobs)
                    .build();
                let mut rf = RandomForestClassifier::new(config);
                rf.fit(std::hint::black_box(&data.x), &data.y).unwrap();
            });
        });
    }

    group.finish();
}

fn bench_knn_predict(c: &mut Criterion) {
    let mut group = c.benchmark_group("KNN");

    for n_samples in [200, 1000].iter() {
        let data = create_classification_dataset(*n_samples, 10);
        let mut knn = KNeighborsClassifier::default();
        knn.fit(&data.x, &data.y).unwrap();

        group.bench_with_input(BenchmarkId::new("predict", n_samples), &data, |b, data| {
            b.iter(|| {
                knn.predict(std::hint::black_box(&data.x)).unwrap();
            });
        });
    }

    group.finish();
}

fn bench_grid_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("Grid Search");
    group.sample_size(10);

    let data = create_classification_dataset(300, 8);
    let pipeline = Pipeline::new(
        "tree",
        Estimator::DecisionTree(DecisionTreeClassifier::default()),
    )
    .with_step("impute", Step::SimpleImputer(SimpleImputer::default()))
    .unwrap()
    .with_step("scale", Step::StandardScaler(StandardScaler::default()))
    .unwrap();
    let grid = ParamGrid::new()
        .add("tree__max_depth", vec![2i64, 4, 6])
        .add("tree__min_samples_leaf", vec![1i64, 5]);
    let cv = CvStrategy::StratifiedKFold(StratifiedKFold::new(5).shuffled(Some(1)));

    for n_jobs in [1, 0].iter() {
        group.bench_with_input(BenchmarkId::new("fit_n_jobs", n_jobs), &data, |b, data| {
            b.iter(|| {
                let mut search =
                    GridSearchCV::new(pipeline.clone(), grid.clone(), cv, Scorer::Accuracy)
                        .n_jobs(*n_jobs);
                search.fit(std::hint::black_box(data)).unwrap();
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_decision_tree,
    bench_random_forest,
    bench_knn_predict,
    bench_grid_search
);
criterion_main!(benches);
