use crate::error::{AppError, Result};
use crate::metrics::{MODEL_LOADED, PREDICTIONS_TOTAL, PREDICTION_DURATION_SECONDS};
use crate::ml::artifacts::{ArtifactStore, LoadedModel};
use crate::models::{PassengerRecord, PredictionResult};
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};
use uuid::Uuid;
use validator::Validate;

/// Outcome of loading the artifact set
#[derive(Debug, Clone)]
pub enum ModelState {
    Ready(Arc<LoadedModel>),
    /// Startup load failed; every prediction fails fast
    Unavailable { reason: String },
}

/// Read-only handle over the artifact directory, loaded at most once
pub struct ModelHandle {
    store: Option<ArtifactStore>,
    state: OnceCell<ModelState>,
}

impl ModelHandle {
    /// Handle that loads the active run from `store` on first use
    pub fn new(store: ArtifactStore) -> Self {
        Self {
            store: Some(store),
            state: OnceCell::new(),
        }
    }

    /// Handle over an already loaded model
    pub fn from_model(model: LoadedModel) -> Self {
        MODEL_LOADED.set(1.0);
        Self {
            store: None,
            state: OnceCell::with_value(ModelState::Ready(Arc::new(model))),
        }
    }

    /// Current state, loading on first access
    pub fn state(&self) -> &ModelState {
        self.state.get_or_init(|| self.load())
    }

    fn load(&self) -> ModelState {
        let Some(store) = &self.store else {
            return ModelState::Unavailable {
                reason: "No artifact store configured".to_string(),
            };
        };

        match store.load() {
            Ok(model) => {
                MODEL_LOADED.set(1.0);
                ModelState::Ready(Arc::new(model))
            }
            Err(e) => {
                MODEL_LOADED.set(0.0);
                error!(
                    root = %store.root().display(),
                    error = %e,
                    "Failed to load model artifacts; predictions are unavailable"
                );
                ModelState::Unavailable {
                    reason: e.to_string(),
                }
            }
        }
    }

    pub fn model(&self) -> Result<Arc<LoadedModel>> {
        match self.state() {
            ModelState::Ready(model) => Ok(Arc::clone(model)),
            ModelState::Unavailable { reason } => {
                Err(AppError::ModelUnavailable(reason.clone()))
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state(), ModelState::Ready(_))
    }
}

/// Model status reported by the health endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ModelStatus {
    pub loaded: bool,
    pub run_id: Option<Uuid>,
    pub trained_at: Option<DateTime<Utc>>,
    pub n_features: Option<usize>,
    pub reason: Option<String>,
}

/// Stateless prediction front end shared across requests
pub struct PredictionService {
    handle: ModelHandle,
}

impl PredictionService {
    pub fn new(handle: ModelHandle) -> Self {
        Self { handle }
    }

    /// Force the artifact load; call once at startup
    pub fn warm_up(&self) -> &ModelState {
        let state = self.handle.state();
        if let ModelState::Ready(model) = state {
            info!(run_id = %model.run_id(), "✅ Prediction service ready");
        }
        state
    }

    /// Predict survival for one passenger
    pub fn predict(&self, record: &PassengerRecord) -> Result<PredictionResult> {
        let model = self.handle.model()?;
        let start = Instant::now();

        let result = score(&model, record)?;

        PREDICTION_DURATION_SECONDS
            .with_label_values(&["single"])
            .observe(start.elapsed().as_secs_f64());
        debug!(
            survived = result.survived,
            survival_probability = result.survival_probability,
            "Prediction served"
        );
        Ok(result)
    }

    /// Predict each passenger independently, preserving input order
    pub fn predict_batch(&self, records: &[PassengerRecord]) -> Result<Vec<PredictionResult>> {
        let model = self.handle.model()?;
        let start = Instant::now();

        let results = records
            .iter()
            .map(|record| score(&model, record))
            .collect::<Result<Vec<_>>>()?;

        PREDICTION_DURATION_SECONDS
            .with_label_values(&["batch"])
            .observe(start.elapsed().as_secs_f64());
        debug!(count = results.len(), "Batch prediction served");
        Ok(results)
    }

    pub fn status(&self) -> ModelStatus {
        match self.handle.state() {
            ModelState::Ready(model) => ModelStatus {
                loaded: true,
                run_id: Some(model.run_id()),
                trained_at: Some(model.classifier().metadata().trained_at),
                n_features: Some(model.encoder().n_features()),
                reason: None,
            },
            ModelState::Unavailable { reason } => ModelStatus {
                loaded: false,
                run_id: None,
                trained_at: None,
                n_features: None,
                reason: Some(reason.clone()),
            },
        }
    }
}

fn score(model: &LoadedModel, record: &PassengerRecord) -> Result<PredictionResult> {
    record.validate()?;
    let probabilities = model.survival_probabilities(std::slice::from_ref(record))?;
    let survival_probability = probabilities.first().copied().ok_or_else(|| {
        AppError::Internal("Classifier returned no probabilities".to_string())
    })?;

    let result = PredictionResult::from_survival_probability(survival_probability);
    let outcome = if result.survived == 1 { "survived" } else { "died" };
    PREDICTIONS_TOTAL.with_label_values(&[outcome]).inc();

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrainingConfig;
    use crate::ml::dataset::Dataset;
    use crate::ml::training::TrainingPipeline;
    use crate::models::LabeledPassenger;
    use tempfile::TempDir;

    fn trained_service() -> PredictionService {
        let passengers = (0..60)
            .map(|i| {
                let female = i % 2 == 0;
                let record = PassengerRecord::new(
                    (i % 3) as u8 + 1,
                    if female { "Mrs. Test" } else { "Mr. Test" },
                    if female { "female" } else { "male" },
                )
                .with_age(10.0 + i as f64)
                .with_fare(5.0 + i as f64)
                .with_embarked(["S", "C", "Q"][i % 3]);
                LabeledPassenger::new(record, female)
            })
            .collect();
        let config = TrainingConfig {
            n_estimators: 5,
            ..TrainingConfig::default()
        };
        let artifacts = TrainingPipeline::new(config)
            .fit(&Dataset::new(passengers).unwrap())
            .unwrap();

        PredictionService::new(ModelHandle::from_model(
            LoadedModel::try_from(artifacts).unwrap(),
        ))
    }

    #[test]
    fn test_out_of_range_class_is_rejected() {
        let service = trained_service();

        let record = PassengerRecord::new(9, "Mr. X", "male");
        assert!(matches!(
            service.predict(&record),
            Err(AppError::Validation(_))
        ));

        let valid = PassengerRecord::new(2, "Mr. X", "male");
        assert!(matches!(
            service.predict_batch(&[valid.clone(), record]),
            Err(AppError::Validation(_))
        ));
        assert!(service.predict(&valid).is_ok());
    }

    #[test]
    fn test_negative_fare_is_rejected() {
        let service = trained_service();
        let record = PassengerRecord::new(1, "Mrs. Y", "female").with_fare(-5.0);
        assert!(matches!(
            service.predict(&record),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_empty_store_degrades() {
        let dir = TempDir::new().unwrap();
        let service = PredictionService::new(ModelHandle::new(ArtifactStore::new(dir.path())));

        assert!(matches!(service.warm_up(), ModelState::Unavailable { .. }));

        let record = PassengerRecord::new(1, "Mr. John Doe", "male");
        assert!(matches!(
            service.predict(&record),
            Err(AppError::ModelUnavailable(_))
        ));
        assert!(matches!(
            service.predict_batch(&[record]),
            Err(AppError::ModelUnavailable(_))
        ));

        let status = service.status();
        assert!(!status.loaded);
        assert!(status.reason.is_some());
    }

    #[test]
    fn test_handle_loads_once() {
        let dir = TempDir::new().unwrap();
        let handle = ModelHandle::new(ArtifactStore::new(dir.path()));
        let first = handle.state() as *const ModelState;
        let second = handle.state() as *const ModelState;
        assert_eq!(first, second);
        assert!(!handle.is_loaded());
    }
}
