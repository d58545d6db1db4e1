/// Integration tests for the training → artifacts → prediction path
///
/// These tests verify:
/// - Training from a CSV file and publishing an artifact set
/// - Deterministic predictions from a loaded artifact set
/// - Load-time rejection of inconsistent artifacts
/// - Unknown categories surfacing as errors, never as defaults

mod common;

use common::{john_doe, published_store, synthetic_passengers, train, write_csv};
use tempfile::TempDir;
use titanic_predictor::{
    config::TrainingConfig,
    ml::{
        artifacts::{COLUMNS_FILE, CURRENT_FILE},
        ArtifactStore, Classifier, Dataset, ModelHandle, ModelState, PredictionService,
        TrainingPipeline,
    },
    models::PassengerRecord,
    AppError,
};

fn service_for(store: ArtifactStore) -> PredictionService {
    let service = PredictionService::new(ModelHandle::new(store));
    service.warm_up();
    service
}

#[test]
fn test_train_from_csv_and_predict() {
    let dir = TempDir::new().unwrap();
    let csv_path = dir.path().join("train.csv");
    write_csv(&csv_path, &synthetic_passengers(240));

    let dataset = Dataset::from_csv_path(&csv_path).unwrap();
    assert_eq!(dataset.len(), 240);

    let config = TrainingConfig {
        n_estimators: 15,
        ..TrainingConfig::default()
    };
    let artifacts = TrainingPipeline::new(config).fit(&dataset).unwrap();
    assert!(artifacts.report.evaluation_metrics.accuracy > 0.8);

    let store = ArtifactStore::new(dir.path().join("models"));
    store.publish(&artifacts).unwrap();

    let service = service_for(store);
    let woman = PassengerRecord::new(1, "Mrs. Jane Smith", "female")
        .with_age(35.0)
        .with_fare(80.0)
        .with_embarked("C");
    let result = service.predict(&woman).unwrap();
    assert_eq!(result.survived, 1);
}

#[test]
fn test_prediction_is_deterministic() {
    let (_dir, store, _) = published_store();
    let service = service_for(store);

    let first = service.predict(&john_doe()).unwrap();
    let second = service.predict(&john_doe()).unwrap();
    assert_eq!(first, second);
    assert!(first.survived <= 1);
    assert!((0.0..=1.0).contains(&first.survival_probability));
}

#[test]
fn test_reload_gives_identical_predictions() {
    let (_dir, store, _) = published_store();
    let a = service_for(ArtifactStore::new(store.root()));
    let b = service_for(ArtifactStore::new(store.root()));

    assert_eq!(
        a.predict(&john_doe()).unwrap(),
        b.predict(&john_doe()).unwrap()
    );
}

#[test]
fn test_same_seed_trains_same_forest() {
    let first = train(200);
    let second = train(200);

    let p1 = first
        .classifier
        .predict_proba(&first.encoder.encode_batch(&[john_doe()]).unwrap())
        .unwrap();
    let p2 = second
        .classifier
        .predict_proba(&second.encoder.encode_batch(&[john_doe()]).unwrap())
        .unwrap();
    assert_eq!(p1, p2);
}

#[test]
fn test_probabilities_are_complementary() {
    let (_dir, store, _) = published_store();
    let service = service_for(store);

    let records = vec![
        john_doe(),
        PassengerRecord::new(1, "Miss. Ada", "female").with_age(8.0),
        PassengerRecord::new(2, "Dr. Who", "male").with_fare(13.0).with_embarked("Q"),
        PassengerRecord::new(3, "Master. Tim", "male"),
    ];

    for result in service.predict_batch(&records).unwrap() {
        assert!((result.survival_probability + result.death_probability - 1.0).abs() < 1e-9);
        assert_eq!(
            result.survived,
            u8::from(result.survival_probability > result.death_probability)
        );
    }
}

#[test]
fn test_batch_matches_single_predictions() {
    let (_dir, store, _) = published_store();
    let service = service_for(store);

    let records = vec![
        john_doe(),
        PassengerRecord::new(1, "Mrs. B", "female").with_age(50.0),
    ];
    let batch = service.predict_batch(&records).unwrap();

    assert_eq!(batch.len(), 2);
    for (record, result) in records.iter().zip(&batch) {
        assert_eq!(&service.predict(record).unwrap(), result);
    }
}

#[test]
fn test_unknown_port_is_rejected() {
    let (_dir, store, _) = published_store();
    let service = service_for(store);

    let record = john_doe().with_embarked("X");
    match service.predict(&record) {
        Err(AppError::UnknownCategory { field, value }) => {
            assert_eq!(field, "embarked");
            assert_eq!(value, "X");
        }
        other => panic!("expected UnknownCategory, got {:?}", other),
    }
}

#[test]
fn test_unknown_sex_is_rejected() {
    let (_dir, store, _) = published_store();
    let service = service_for(store);

    let record = PassengerRecord::new(3, "Unknown Passenger", "unknown");
    assert!(matches!(
        service.predict(&record),
        Err(AppError::UnknownCategory { .. })
    ));
}

#[test]
fn test_truncated_columns_fail_at_load() {
    let (_dir, store, artifacts) = published_store();

    let path = store.run_dir(artifacts.run_id).join(COLUMNS_FILE);
    let mut columns: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    columns["columns"].as_array_mut().unwrap().pop();
    std::fs::write(&path, serde_json::to_string(&columns).unwrap()).unwrap();

    assert!(matches!(store.load(), Err(AppError::ColumnMismatch(_))));

    let service = PredictionService::new(ModelHandle::new(store));
    assert!(matches!(service.warm_up(), ModelState::Unavailable { .. }));
    assert!(matches!(
        service.predict(&john_doe()),
        Err(AppError::ModelUnavailable(_))
    ));
}

#[test]
fn test_missing_artifacts_mean_unavailable() {
    let dir = TempDir::new().unwrap();
    let service = service_for(ArtifactStore::new(dir.path()));

    let status = service.status();
    assert!(!status.loaded);
    assert!(status.reason.is_some());
    assert!(matches!(
        service.predict(&john_doe()),
        Err(AppError::ModelUnavailable(_))
    ));
}

#[test]
fn test_corrupt_current_pointer_is_unavailable() {
    let (_dir, store, _) = published_store();
    std::fs::write(store.root().join(CURRENT_FILE), "not-a-uuid").unwrap();

    assert!(store.load().is_err());
}

#[test]
fn test_republish_serves_latest_run() {
    let (_dir, store, first) = published_store();
    let second = train(300);
    store.publish(&second).unwrap();

    assert_ne!(first.run_id, second.run_id);
    let service = service_for(ArtifactStore::new(store.root()));
    assert_eq!(service.status().run_id, Some(second.run_id));
}
