use crate::config::TrainingConfig;
use crate::error::{AppError, Result};
use crate::ml::classifier::{Classifier, ForestParameters, RandomForestClassifier};
use crate::ml::dataset::{Dataset, DatasetSummary};
use crate::ml::encoders::CategoricalEncoders;
use crate::ml::features::{
    feature_columns, DerivedFeatures, FareBoundaries, FeatureEncoder, Imputation,
};
use crate::ml::models::{ModelMetrics, CLASS_NAMES};
use crate::models::{LabeledPassenger, PassengerRecord};
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Everything one training run produces
#[derive(Debug)]
pub struct TrainedArtifacts {
    pub run_id: Uuid,
    pub classifier: RandomForestClassifier,
    pub encoder: FeatureEncoder,
    pub report: TrainingReport,
}

/// Evaluation report of a training run
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub run_id: Uuid,
    pub summary: DatasetSummary,
    pub n_train: usize,
    pub n_test: usize,
    /// Evaluation rows dropped because a category never appeared in training
    pub n_skipped: usize,
    pub fare_boundaries: [f64; 3],
    pub training_metrics: ModelMetrics,
    pub evaluation_metrics: ModelMetrics,
    pub duration_ms: u64,
}

/// Offline pipeline: split, fit encoders, train the forest, evaluate
pub struct TrainingPipeline {
    config: TrainingConfig,
}

impl TrainingPipeline {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn fit(&self, dataset: &Dataset) -> Result<TrainedArtifacts> {
        let started = Instant::now();
        let run_id = Uuid::new_v4();

        let summary = dataset.summary();
        info!(
            run_id = %run_id,
            rows = summary.rows,
            survival_rate = summary.survival_rate,
            missing_age = summary.missing_age,
            missing_fare = summary.missing_fare,
            missing_embarked = summary.missing_embarked,
            "🚀 Starting training run"
        );
        for (sex, rate) in &summary.survival_by_sex {
            debug!(sex = %sex, survival_rate = rate, "Survival by sex");
        }
        for (class, rate) in &summary.survival_by_class {
            debug!(pclass = class, survival_rate = rate, "Survival by class");
        }

        let split = dataset.stratified_split(self.config.test_fraction, self.config.seed)?;
        info!(
            train = split.train.len(),
            test = split.test.len(),
            "Split dataset"
        );

        let encoder = fit_encoder(&split.train)?;
        let fare_boundaries = encoder.encoders().fare_boundaries.cuts();
        info!(fare_boundaries = ?fare_boundaries, "Fitted categorical encoders");

        let train_records = records(&split.train);
        let x_train = encoder.encode_batch(&train_records)?;
        let y_train = labels(&split.train);

        let mut classifier = RandomForestClassifier::new(ForestParameters::from(&self.config));
        let training_metrics = classifier.fit(&x_train, &y_train)?;
        info!(
            trees = classifier.n_trees(),
            accuracy = training_metrics.accuracy,
            "Trained random forest"
        );

        let (evaluation_metrics, n_skipped) = evaluate(&classifier, &encoder, &split.test)?;
        classifier.set_validation_metrics(evaluation_metrics.clone());

        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            run_id = %run_id,
            accuracy = evaluation_metrics.accuracy,
            f1_score = evaluation_metrics.f1_score,
            skipped = n_skipped,
            duration_ms = duration_ms,
            "✅ Training run complete"
        );

        let report = TrainingReport {
            run_id,
            summary,
            n_train: split.train.len(),
            n_test: split.test.len(),
            n_skipped,
            fare_boundaries,
            training_metrics,
            evaluation_metrics,
            duration_ms,
        };

        Ok(TrainedArtifacts {
            run_id,
            classifier,
            encoder,
            report,
        })
    }
}

fn records(passengers: &[LabeledPassenger]) -> Vec<PassengerRecord> {
    passengers.iter().map(|p| p.record.clone()).collect()
}

fn labels(passengers: &[LabeledPassenger]) -> Vec<usize> {
    passengers.iter().map(LabeledPassenger::label).collect()
}

/// Fit fare boundaries and label encoders on the training partition only
fn fit_encoder(train: &[LabeledPassenger]) -> Result<FeatureEncoder> {
    let train_records = records(train);
    let imputation = Imputation::from_batch(&train_records);

    let fares: Vec<f64> = train_records
        .iter()
        .map(|r| r.fare.filter(|f| f.is_finite()).unwrap_or(imputation.fare))
        .collect();
    let fare_boundaries = FareBoundaries::fit(&fares)?;

    let derived: Vec<DerivedFeatures> = train_records
        .iter()
        .map(|record| DerivedFeatures::derive(record, &imputation, &fare_boundaries))
        .collect();

    let encoders = CategoricalEncoders::fit(&derived, fare_boundaries)?;
    FeatureEncoder::new(encoders, feature_columns())
}

/// Score the evaluation partition, skipping rows with unseen categories
fn evaluate(
    classifier: &dyn Classifier,
    encoder: &FeatureEncoder,
    test: &[LabeledPassenger],
) -> Result<(ModelMetrics, usize)> {
    let derived = encoder.derive_batch(&records(test));

    let mut rows = Vec::with_capacity(derived.len());
    let mut y_true = Vec::with_capacity(derived.len());
    let mut skipped = 0;

    for (row, passenger) in derived.iter().zip(test) {
        match encoder.encode_derived(std::slice::from_ref(row)) {
            Ok(encoded) => {
                rows.extend(encoded.iter().copied());
                y_true.push(passenger.label());
            }
            Err(AppError::UnknownCategory { field, value }) => {
                warn!(field = %field, value = %value, "Skipping evaluation row with unseen category");
                skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    if y_true.is_empty() {
        return Err(AppError::Training(
            "No evaluation rows left after skipping unseen categories".to_string(),
        ));
    }

    let x_test = ndarray::Array2::from_shape_vec((y_true.len(), encoder.n_features()), rows)
        .map_err(|e| AppError::Internal(format!("Failed to build evaluation matrix: {}", e)))?;
    let y_pred = classifier.predict(&x_test)?;

    Ok((ModelMetrics::evaluate(&y_true, &y_pred, &CLASS_NAMES), skipped))
}
