//! Shared fixtures for the integration tests
//!
//! A synthetic labeled dataset that covers every title, age group, port and
//! fare quartile, plus helpers to train and publish it into a temporary
//! artifact store.

#![allow(dead_code)]

use std::io::Write;
use std::path::Path;
use tempfile::TempDir;
use titanic_predictor::{
    config::TrainingConfig,
    ml::{ArtifactStore, Dataset, TrainedArtifacts, TrainingPipeline},
    models::{LabeledPassenger, PassengerRecord},
};

const TITLED_NAMES: [(&str, &str); 5] = [
    ("Mr. Karl", "male"),
    ("Mrs. Anna", "female"),
    ("Miss. Elsa", "female"),
    ("Master. Tom", "male"),
    ("Dr. Alex", "male"),
];

const AGES: [f64; 5] = [6.0, 15.0, 27.0, 44.0, 66.0];

const PORTS: [&str; 3] = ["S", "C", "Q"];

/// Deterministic passengers where women, children and first class survive
pub fn synthetic_passengers(n: usize) -> Vec<LabeledPassenger> {
    (0..n)
        .map(|i| {
            let (given, sex) = TITLED_NAMES[i % 5];
            let pclass = (i % 3) as u8 + 1;
            let age = AGES[(i / 5) % 5];
            let fare = 7.0 + ((i * 7) % 50) as f64 * 3.0;

            let mut record = PassengerRecord::new(pclass, format!("Family{}, {}", i, given), sex)
                .with_fare(fare)
                .with_family((i % 4) as u32 / 2, (i % 3) as u32 / 2)
                .with_embarked(PORTS[(i / 3) % 3]);
            if i % 11 != 0 {
                record = record.with_age(age);
            }

            let survived = sex == "female" || pclass == 1 || age < 12.0;
            LabeledPassenger::new(record, survived)
        })
        .collect()
}

pub fn synthetic_dataset(n: usize) -> Dataset {
    Dataset::new(synthetic_passengers(n)).expect("synthetic dataset is valid")
}

/// Small forest with a fixed seed
pub fn fast_training_config() -> TrainingConfig {
    TrainingConfig {
        n_estimators: 15,
        seed: 7,
        ..TrainingConfig::default()
    }
}

pub fn train(n: usize) -> TrainedArtifacts {
    TrainingPipeline::new(fast_training_config())
        .fit(&synthetic_dataset(n))
        .expect("training succeeds on synthetic data")
}

/// Train on synthetic data and publish into a fresh temporary store
pub fn published_store() -> (TempDir, ArtifactStore, TrainedArtifacts) {
    let dir = TempDir::new().expect("tempdir");
    let store = ArtifactStore::new(dir.path());
    let artifacts = train(300);
    store.publish(&artifacts).expect("publish succeeds");
    (dir, store, artifacts)
}

/// Write passengers in the Kaggle train.csv layout
pub fn write_csv(path: &Path, passengers: &[LabeledPassenger]) {
    let mut file = std::fs::File::create(path).expect("create csv");
    writeln!(
        file,
        "PassengerId,Survived,Pclass,Name,Sex,Age,SibSp,Parch,Ticket,Fare,Cabin,Embarked"
    )
    .unwrap();

    for (i, p) in passengers.iter().enumerate() {
        let r = &p.record;
        writeln!(
            file,
            "{},{},{},\"{}\",{},{},{},{},T{},{},,{}",
            i + 1,
            u8::from(p.survived),
            r.pclass,
            r.name,
            r.sex,
            r.age.map(|a| a.to_string()).unwrap_or_default(),
            r.sibsp,
            r.parch,
            i,
            r.fare.map(|f| f.to_string()).unwrap_or_default(),
            r.embarked.as_deref().unwrap_or(""),
        )
        .unwrap();
    }
}

/// The reference passenger used for determinism checks
pub fn john_doe() -> PassengerRecord {
    PassengerRecord::new(3, "Mr. John Doe", "male")
        .with_age(22.0)
        .with_fare(7.25)
        .with_family(1, 0)
        .with_embarked("S")
}
