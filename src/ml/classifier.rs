use crate::config::TrainingConfig;
use crate::error::{AppError, Result};
use crate::ml::models::{ModelMetadata, ModelMetrics, CLASS_NAMES};
use ndarray::Array2;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::tree::decision_tree_classifier::{
    DecisionTreeClassifier, DecisionTreeClassifierParameters, SplitCriterion,
};
use std::collections::HashMap;
use std::fmt;

/// Number of outcome classes (died, survived)
pub const N_CLASSES: usize = 2;

/// Attempts at drawing a bootstrap sample that contains both classes
const MAX_BOOTSTRAP_ATTEMPTS: usize = 32;

type Tree = DecisionTreeClassifier<f64, i32, DenseMatrix<f64>, Vec<i32>>;

/// Trait for classifiers
pub trait Classifier: Send + Sync {
    /// Train the classifier
    fn fit(&mut self, features: &Array2<f64>, labels: &[usize]) -> Result<ModelMetrics>;

    /// Predict class labels
    fn predict(&self, features: &Array2<f64>) -> Result<Vec<usize>>;

    /// Predict class probabilities (n_samples × n_classes)
    fn predict_proba(&self, features: &Array2<f64>) -> Result<Array2<f64>>;

    /// Width of the rows the model was trained on
    fn n_features(&self) -> usize;

    /// Get model metadata
    fn metadata(&self) -> &ModelMetadata;

    /// Check if model is trained
    fn is_trained(&self) -> bool;
}

/// Random forest hyperparameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestParameters {
    pub n_estimators: usize,
    pub max_depth: u16,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Fraction of columns each tree sees
    pub max_features: f64,
    pub seed: u64,
}

impl Default for ForestParameters {
    fn default() -> Self {
        Self::from(&TrainingConfig::default())
    }
}

impl From<&TrainingConfig> for ForestParameters {
    fn from(config: &TrainingConfig) -> Self {
        Self {
            n_estimators: config.n_estimators,
            max_depth: config.max_depth,
            min_samples_split: config.min_samples_split,
            min_samples_leaf: config.min_samples_leaf,
            max_features: config.max_features,
            seed: config.seed,
        }
    }
}

impl ForestParameters {
    fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(AppError::Validation(
                "n_estimators must be at least 1".to_string(),
            ));
        }
        if !(self.max_features > 0.0 && self.max_features <= 1.0) {
            return Err(AppError::Validation(format!(
                "max_features must be in (0, 1], got {}",
                self.max_features
            )));
        }
        Ok(())
    }

    fn tree_parameters(&self) -> DecisionTreeClassifierParameters {
        DecisionTreeClassifierParameters::default()
            .with_criterion(SplitCriterion::Gini)
            .with_max_depth(self.max_depth)
            .with_min_samples_split(self.min_samples_split)
            .with_min_samples_leaf(self.min_samples_leaf)
    }

    /// Columns per tree, at least one
    fn subspace_size(&self, n_features: usize) -> usize {
        ((n_features as f64 * self.max_features).ceil() as usize).clamp(1, n_features)
    }

    fn as_map(&self) -> HashMap<String, String> {
        [
            ("n_estimators", self.n_estimators.to_string()),
            ("max_depth", self.max_depth.to_string()),
            ("min_samples_split", self.min_samples_split.to_string()),
            ("min_samples_leaf", self.min_samples_leaf.to_string()),
            ("max_features", self.max_features.to_string()),
            ("seed", self.seed.to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}

/// One CART tree trained on a bootstrap sample and a subset of columns
#[derive(Serialize, Deserialize)]
struct BaggedTree {
    feature_indices: Vec<usize>,
    tree: Tree,
}

/// Bagged ensemble of smartcore decision trees.
///
/// Each tree gets its own seeded generator, so training is reproducible no
/// matter how rayon schedules the trees. The survival probability is the
/// fraction of trees voting "survived".
#[derive(Serialize, Deserialize)]
pub struct RandomForestClassifier {
    /// Model metadata
    metadata: ModelMetadata,

    /// Hyperparameters
    params: ForestParameters,

    /// Width of the training rows
    n_features: usize,

    /// Trained trees
    trees: Vec<BaggedTree>,
}

impl RandomForestClassifier {
    pub fn new(params: ForestParameters) -> Self {
        Self {
            metadata: ModelMetadata {
                name: "Random Forest".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                trained_at: chrono::Utc::now(),
                n_training_samples: 0,
                n_features: 0,
                training_metrics: ModelMetrics::new(),
                validation_metrics: None,
                hyperparameters: params.as_map(),
            },
            params,
            n_features: 0,
            trees: Vec::new(),
        }
    }

    pub fn params(&self) -> &ForestParameters {
        &self.params
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Record held-out metrics computed by the caller
    pub fn set_validation_metrics(&mut self, metrics: ModelMetrics) {
        self.metadata.validation_metrics = Some(metrics);
    }

    fn check_width(&self, features: &Array2<f64>) -> Result<()> {
        if !self.is_trained() {
            return Err(AppError::ModelUnavailable("Model not trained".to_string()));
        }
        if features.ncols() != self.n_features {
            return Err(AppError::ColumnMismatch(format!(
                "Model expects {} features, got {}",
                self.n_features,
                features.ncols()
            )));
        }
        Ok(())
    }
}

/// Copy the selected rows and columns into a row-major smartcore matrix
fn to_dense_matrix(features: &Array2<f64>, rows: &[usize], cols: &[usize]) -> DenseMatrix<f64> {
    let mut data = Vec::with_capacity(rows.len() * cols.len());
    for &r in rows {
        for &c in cols {
            data.push(features[[r, c]]);
        }
    }
    DenseMatrix::new(rows.len(), cols.len(), data, false)
}

/// Sample rows with replacement, retrying until both classes are present
fn bootstrap_rows(rng: &mut Pcg32, labels: &[usize]) -> Vec<usize> {
    let n = labels.len();
    for _ in 0..MAX_BOOTSTRAP_ATTEMPTS {
        let rows: Vec<usize> = (0..n).map(|_| rng.random_range(0..n)).collect();
        let first = labels[rows[0]];
        if rows.iter().any(|&r| labels[r] != first) {
            return rows;
        }
    }
    (0..n).collect()
}

fn fit_tree(
    features: &Array2<f64>,
    labels: &[usize],
    params: &ForestParameters,
    tree_seed: u64,
) -> Result<BaggedTree> {
    let mut rng = Pcg32::seed_from_u64(tree_seed);
    let n_features = features.ncols();

    let rows = bootstrap_rows(&mut rng, labels);

    let mut feature_indices: Vec<usize> = (0..n_features).collect();
    feature_indices.shuffle(&mut rng);
    feature_indices.truncate(params.subspace_size(n_features));
    feature_indices.sort_unstable();

    let x = to_dense_matrix(features, &rows, &feature_indices);
    let y: Vec<i32> = rows.iter().map(|&r| labels[r] as i32).collect();

    let tree = DecisionTreeClassifier::fit(&x, &y, params.tree_parameters())
        .map_err(|e| AppError::Training(format!("Failed to train decision tree: {}", e)))?;

    Ok(BaggedTree {
        feature_indices,
        tree,
    })
}

impl Classifier for RandomForestClassifier {
    fn fit(&mut self, features: &Array2<f64>, labels: &[usize]) -> Result<ModelMetrics> {
        self.params.validate()?;

        let (n_samples, n_features) = features.dim();
        if n_samples == 0 || n_features == 0 {
            return Err(AppError::Training(
                "Cannot train on an empty feature matrix".to_string(),
            ));
        }
        if labels.len() != n_samples {
            return Err(AppError::Training(format!(
                "Got {} labels for {} rows",
                labels.len(),
                n_samples
            )));
        }
        if labels.iter().any(|&label| label >= N_CLASSES) {
            return Err(AppError::Training("Labels must be 0 or 1".to_string()));
        }
        if !(0..N_CLASSES).all(|class| labels.contains(&class)) {
            return Err(AppError::Training(
                "Training data must contain both survivors and non-survivors".to_string(),
            ));
        }

        let params = self.params;
        let trees = (0..params.n_estimators)
            .into_par_iter()
            .map(|i| fit_tree(features, labels, &params, params.seed.wrapping_add(i as u64)))
            .collect::<Result<Vec<_>>>()?;

        self.trees = trees;
        self.n_features = n_features;

        let predictions = self.predict(features)?;
        let metrics = ModelMetrics::evaluate(labels, &predictions, &CLASS_NAMES);

        self.metadata.n_training_samples = n_samples;
        self.metadata.n_features = n_features;
        self.metadata.trained_at = chrono::Utc::now();
        self.metadata.training_metrics = metrics.clone();

        Ok(metrics)
    }

    fn predict(&self, features: &Array2<f64>) -> Result<Vec<usize>> {
        let proba = self.predict_proba(features)?;
        Ok(proba
            .rows()
            .into_iter()
            .map(|row| usize::from(row[1] > row[0]))
            .collect())
    }

    fn predict_proba(&self, features: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_width(features)?;

        let n_samples = features.nrows();
        let all_rows: Vec<usize> = (0..n_samples).collect();
        let mut survived_votes = vec![0usize; n_samples];

        for bagged in &self.trees {
            let x = to_dense_matrix(features, &all_rows, &bagged.feature_indices);
            let votes = bagged
                .tree
                .predict(&x)
                .map_err(|e| AppError::Internal(format!("Prediction failed: {}", e)))?;

            for (count, vote) in survived_votes.iter_mut().zip(votes) {
                if vote == 1 {
                    *count += 1;
                }
            }
        }

        let n_trees = self.trees.len() as f64;
        let mut proba = Array2::zeros((n_samples, N_CLASSES));
        for (i, &count) in survived_votes.iter().enumerate() {
            let survived = count as f64 / n_trees;
            proba[[i, 0]] = 1.0 - survived;
            proba[[i, 1]] = survived;
        }

        Ok(proba)
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    fn is_trained(&self) -> bool {
        !self.trees.is_empty()
    }
}

impl fmt::Debug for RandomForestClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RandomForestClassifier")
            .field("params", &self.params)
            .field("n_features", &self.n_features)
            .field("n_trees", &self.trees.len())
            .finish()
    }
}
