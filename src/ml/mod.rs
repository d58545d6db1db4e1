//! Survival classifier: feature engineering, training, artifacts and serving
//!
//! - Feature derivation and categorical encoding shared by training and inference
//! - Random forest over smartcore decision trees
//! - Atomic publication of co-versioned artifact sets
//! - Prediction service over a lazily loaded model handle

pub mod artifacts;
pub mod classifier;
pub mod dataset;
pub mod encoders;
pub mod features;
pub mod models;
pub mod service;
pub mod training;

pub use artifacts::{ArtifactStore, LoadedModel};
pub use classifier::{Classifier, ForestParameters, RandomForestClassifier};
pub use dataset::{fetch_dataset, Dataset, DatasetSplit, DatasetSummary, DEFAULT_DATASET_URL};
pub use encoders::{CategoricalEncoders, CategoricalField, CategoryMapping};
pub use features::{
    feature_columns, AgeGroup, DerivedFeatures, FareBoundaries, FareGroup, FeatureEncoder,
    Imputation, Title, FALLBACK_AGE, FALLBACK_FARE, FEATURE_COLUMNS,
};
pub use models::{ClassMetrics, ModelMetadata, ModelMetrics};
pub use service::{ModelHandle, ModelState, ModelStatus, PredictionService};
pub use training::{TrainedArtifacts, TrainingPipeline, TrainingReport};
