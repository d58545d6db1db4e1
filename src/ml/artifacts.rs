use crate::error::{AppError, Result};
use crate::ml::classifier::{Classifier, RandomForestClassifier};
use crate::ml::encoders::CategoricalEncoders;
use crate::ml::features::FeatureEncoder;
use crate::ml::training::TrainedArtifacts;
use crate::models::PassengerRecord;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

pub const CLASSIFIER_FILE: &str = "classifier.bin";
pub const ENCODERS_FILE: &str = "encoders.json";
pub const COLUMNS_FILE: &str = "feature_columns.json";
pub const CURRENT_FILE: &str = "CURRENT";
pub const RUNS_DIR: &str = "runs";

#[derive(Serialize, Deserialize)]
struct ClassifierFile {
    run_id: Uuid,
    classifier: RandomForestClassifier,
}

#[derive(Serialize, Deserialize)]
struct EncodersFile {
    run_id: Uuid,
    encoders: CategoricalEncoders,
}

#[derive(Serialize, Deserialize)]
struct ColumnsFile {
    run_id: Uuid,
    columns: Vec<String>,
}

/// A validated, immutable artifact set ready for inference
pub struct LoadedModel {
    run_id: Uuid,
    classifier: Box<dyn Classifier>,
    encoder: FeatureEncoder,
}

impl LoadedModel {
    /// Pair a classifier with its encoder, rejecting width mismatches
    pub fn new(run_id: Uuid, classifier: Box<dyn Classifier>, encoder: FeatureEncoder) -> Result<Self> {
        if !classifier.is_trained() {
            return Err(AppError::ModelUnavailable(
                "Classifier has not been trained".to_string(),
            ));
        }
        if encoder.n_features() != classifier.n_features() {
            return Err(AppError::ColumnMismatch(format!(
                "{} feature columns but the classifier expects {}",
                encoder.n_features(),
                classifier.n_features()
            )));
        }

        Ok(Self {
            run_id,
            classifier,
            encoder,
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn classifier(&self) -> &dyn Classifier {
        self.classifier.as_ref()
    }

    pub fn encoder(&self) -> &FeatureEncoder {
        &self.encoder
    }

    /// Survival probability for each record, in input order
    pub fn survival_probabilities(&self, records: &[PassengerRecord]) -> Result<Vec<f64>> {
        let features = self.encoder.encode_batch(records)?;
        let proba = self.classifier.predict_proba(&features)?;
        Ok(proba.column(1).to_vec())
    }
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel")
            .field("run_id", &self.run_id)
            .field("n_features", &self.encoder.n_features())
            .finish()
    }
}

impl TryFrom<TrainedArtifacts> for LoadedModel {
    type Error = AppError;

    fn try_from(artifacts: TrainedArtifacts) -> Result<Self> {
        LoadedModel::new(
            artifacts.run_id,
            Box::new(artifacts.classifier),
            artifacts.encoder,
        )
    }
}

/// Directory of published runs plus the `CURRENT` pointer.
///
/// ```text
/// <root>/CURRENT                       run id of the active set
/// <root>/runs/<run_id>/classifier.bin
/// <root>/runs/<run_id>/encoders.json
/// <root>/runs/<run_id>/feature_columns.json
/// ```
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_dir(&self, run_id: Uuid) -> PathBuf {
        self.root.join(RUNS_DIR).join(run_id.to_string())
    }

    /// Publish a run: stage, fsync, rename into `runs/`, then swap `CURRENT`
    pub fn publish(&self, artifacts: &TrainedArtifacts) -> Result<PathBuf> {
        let run_id = artifacts.run_id;
        std::fs::create_dir_all(self.root.join(RUNS_DIR))?;

        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&self.root)?;

        write_file(&staging.path().join(CLASSIFIER_FILE), |w| {
            bincode::serialize_into(
                w,
                &ClassifierFileRef {
                    run_id,
                    classifier: &artifacts.classifier,
                },
            )
            .map_err(AppError::from)
        })?;
        write_file(&staging.path().join(ENCODERS_FILE), |w| {
            serde_json::to_writer_pretty(
                w,
                &EncodersFileRef {
                    run_id,
                    encoders: artifacts.encoder.encoders(),
                },
            )
            .map_err(AppError::from)
        })?;
        write_file(&staging.path().join(COLUMNS_FILE), |w| {
            serde_json::to_writer_pretty(
                w,
                &ColumnsFileRef {
                    run_id,
                    columns: artifacts.encoder.columns(),
                },
            )
            .map_err(AppError::from)
        })?;

        let run_dir = self.run_dir(run_id);
        std::fs::rename(staging.path(), &run_dir)?;
        let _ = staging.keep();
        sync_dir(&self.root.join(RUNS_DIR));
        debug!(path = %run_dir.display(), "Run directory in place");

        let mut pointer = tempfile::NamedTempFile::new_in(&self.root)?;
        writeln!(pointer, "{}", run_id)?;
        pointer.as_file().sync_all()?;
        pointer
            .persist(self.root.join(CURRENT_FILE))
            .map_err(|e| AppError::Io(e.error))?;
        sync_dir(&self.root);

        info!(run_id = %run_id, path = %run_dir.display(), "📦 Published artifact set");
        Ok(run_dir)
    }

    /// Run id named by `CURRENT`
    pub fn current_run_id(&self) -> Result<Uuid> {
        let path = self.root.join(CURRENT_FILE);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            AppError::ModelUnavailable(format!(
                "No published model at {}: {}",
                self.root.display(),
                e
            ))
        })?;

        Uuid::parse_str(content.trim()).map_err(|e| {
            AppError::Serialization(format!("Invalid run id in {}: {}", path.display(), e))
        })
    }

    /// Load and cross-check the active artifact set
    pub fn load(&self) -> Result<LoadedModel> {
        let run_id = self.current_run_id()?;
        let run_dir = self.run_dir(run_id);

        let classifier_file: ClassifierFile = read_file(&run_dir.join(CLASSIFIER_FILE), |r| {
            bincode::deserialize_from(r).map_err(AppError::from)
        })?;
        let encoders_file: EncodersFile = read_json(&run_dir.join(ENCODERS_FILE))?;
        let columns_file: ColumnsFile = read_json(&run_dir.join(COLUMNS_FILE))?;

        for (name, file_run_id) in [
            (CLASSIFIER_FILE, classifier_file.run_id),
            (ENCODERS_FILE, encoders_file.run_id),
            (COLUMNS_FILE, columns_file.run_id),
        ] {
            if file_run_id != run_id {
                return Err(AppError::Serialization(format!(
                    "{} belongs to run {} but CURRENT names {}",
                    name, file_run_id, run_id
                )));
            }
        }

        encoders_file.encoders.validate()?;

        let classifier = classifier_file.classifier;
        if columns_file.columns.len() != classifier.n_features() {
            return Err(AppError::ColumnMismatch(format!(
                "{} lists {} columns but the classifier was trained on {}",
                COLUMNS_FILE,
                columns_file.columns.len(),
                classifier.n_features()
            )));
        }

        let encoder = FeatureEncoder::new(encoders_file.encoders, columns_file.columns)?;
        let model = LoadedModel::new(run_id, Box::new(classifier), encoder)?;

        info!(run_id = %run_id, features = model.encoder().n_features(), "Loaded artifact set");
        Ok(model)
    }
}

#[derive(Serialize)]
struct ClassifierFileRef<'a> {
    run_id: Uuid,
    classifier: &'a RandomForestClassifier,
}

#[derive(Serialize)]
struct EncodersFileRef<'a> {
    run_id: Uuid,
    encoders: &'a CategoricalEncoders,
}

#[derive(Serialize)]
struct ColumnsFileRef<'a> {
    run_id: Uuid,
    columns: &'a [String],
}

fn write_file<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<&File>) -> Result<()>,
{
    let file = File::create(path)?;
    {
        let mut writer = BufWriter::new(&file);
        write(&mut writer)?;
        writer.flush()?;
    }
    file.sync_all()?;
    Ok(())
}

fn read_file<T, F>(path: &Path, read: F) -> Result<T>
where
    F: FnOnce(BufReader<File>) -> Result<T>,
{
    let file = File::open(path).map_err(|e| {
        AppError::ModelUnavailable(format!("Cannot open {}: {}", path.display(), e))
    })?;
    read(BufReader::new(file))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    read_file(path, |r| serde_json::from_reader(r).map_err(AppError::from))
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Ok(handle) = File::open(dir) {
        let _ = handle.sync_all();
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrainingConfig;
    use crate::ml::dataset::Dataset;
    use crate::ml::training::TrainingPipeline;
    use crate::models::LabeledPassenger;
    use tempfile::TempDir;

    fn train_small() -> TrainedArtifacts {
        let passengers = (0..40)
            .map(|i| {
                let female = i % 2 == 0;
                let record = PassengerRecord::new(
                    (i % 3) as u8 + 1,
                    if female { "Mrs. Test" } else { "Mr. Test" },
                    if female { "female" } else { "male" },
                )
                .with_age(20.0 + i as f64)
                .with_fare(5.0 + i as f64)
                .with_embarked(["S", "C", "Q"][i % 3]);
                LabeledPassenger::new(record, female)
            })
            .collect();

        let config = TrainingConfig {
            n_estimators: 5,
            ..TrainingConfig::default()
        };
        TrainingPipeline::new(config)
            .fit(&Dataset::new(passengers).unwrap())
            .unwrap()
    }

    #[test]
    fn test_publish_then_load() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let artifacts = train_small();

        let run_dir = store.publish(&artifacts).unwrap();
        assert!(run_dir.join(CLASSIFIER_FILE).exists());
        assert!(run_dir.join(ENCODERS_FILE).exists());
        assert!(run_dir.join(COLUMNS_FILE).exists());
        assert_eq!(store.current_run_id().unwrap(), artifacts.run_id);

        let model = store.load().unwrap();
        assert_eq!(model.run_id(), artifacts.run_id);
        assert_eq!(model.encoder().n_features(), 12);
    }

    #[test]
    fn test_no_staging_directories_left_behind() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.publish(&train_small()).unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".staging-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_failed_rename_cleans_up_staging() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let artifacts = train_small();

        store.publish(&artifacts).unwrap();
        assert!(store.publish(&artifacts).is_err());

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".staging-"))
            .collect();
        assert!(leftovers.is_empty());
        assert_eq!(store.current_run_id().unwrap(), artifacts.run_id);
        assert!(store.load().is_ok());
    }

    #[test]
    fn test_republish_switches_current() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());

        let first = train_small();
        let second = train_small();
        store.publish(&first).unwrap();
        store.publish(&second).unwrap();

        assert_eq!(store.current_run_id().unwrap(), second.run_id);
        assert!(store.run_dir(first.run_id).exists());
    }

    #[test]
    fn test_missing_store_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path().join("nothing-here"));
        assert!(matches!(store.load(), Err(AppError::ModelUnavailable(_))));
    }

    #[test]
    fn test_mixed_runs_are_rejected() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let first = train_small();
        let second = train_small();
        store.publish(&first).unwrap();
        store.publish(&second).unwrap();

        std::fs::copy(
            store.run_dir(first.run_id).join(ENCODERS_FILE),
            store.run_dir(second.run_id).join(ENCODERS_FILE),
        )
        .unwrap();

        assert!(matches!(store.load(), Err(AppError::Serialization(_))));
    }
}
