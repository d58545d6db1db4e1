use crate::error::{AppError, Result};
use crate::models::{LabeledPassenger, PassengerRecord};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Smallest dataset the training pipeline accepts
pub const MIN_DATASET_ROWS: usize = 10;

/// Public copy of the Kaggle training set
pub const DEFAULT_DATASET_URL: &str =
    "https://raw.githubusercontent.com/datasciencedojo/datasets/master/titanic.csv";

/// One row of the Kaggle `train.csv` layout; unused columns are ignored
#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "Survived")]
    survived: Option<u8>,
    #[serde(rename = "Pclass")]
    pclass: u8,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Sex")]
    sex: String,
    #[serde(rename = "Age")]
    age: Option<f64>,
    #[serde(rename = "SibSp", default)]
    sibsp: u32,
    #[serde(rename = "Parch", default)]
    parch: u32,
    #[serde(rename = "Fare")]
    fare: Option<f64>,
    #[serde(rename = "Embarked")]
    embarked: Option<String>,
}

impl CsvRow {
    fn into_labeled(self, line: usize) -> Result<LabeledPassenger> {
        let survived = match self.survived {
            Some(0) => false,
            Some(1) => true,
            Some(other) => {
                return Err(AppError::Dataset(format!(
                    "Row {}: Survived must be 0 or 1, got {}",
                    line, other
                )))
            }
            None => {
                return Err(AppError::Dataset(format!(
                    "Row {}: missing Survived label",
                    line
                )))
            }
        };

        if !(1..=3).contains(&self.pclass) {
            return Err(AppError::Dataset(format!(
                "Row {}: Pclass must be 1, 2 or 3, got {}",
                line, self.pclass
            )));
        }

        let record = PassengerRecord {
            pclass: self.pclass,
            name: self.name,
            sex: self.sex,
            age: self.age,
            sibsp: self.sibsp,
            parch: self.parch,
            fare: self.fare,
            embarked: self.embarked,
        }
        .normalized();

        Ok(LabeledPassenger::new(record, survived))
    }
}

/// A labeled passenger dataset
#[derive(Debug, Clone)]
pub struct Dataset {
    passengers: Vec<LabeledPassenger>,
}

/// Training and evaluation partitions
#[derive(Debug, Clone)]
pub struct DatasetSplit {
    pub train: Vec<LabeledPassenger>,
    pub test: Vec<LabeledPassenger>,
}

impl Dataset {
    pub fn new(passengers: Vec<LabeledPassenger>) -> Result<Self> {
        if passengers.len() < MIN_DATASET_ROWS {
            return Err(AppError::Dataset(format!(
                "Dataset has {} rows; at least {} are required",
                passengers.len(),
                MIN_DATASET_ROWS
            )));
        }
        Ok(Self { passengers })
    }

    /// Load a CSV file in the Kaggle `train.csv` layout
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            AppError::Dataset(format!("Cannot open dataset {}: {}", path.display(), e))
        })?;
        let dataset = Self::from_reader(file)?;

        info!(path = %path.display(), rows = dataset.len(), "Loaded dataset");
        Ok(dataset)
    }

    /// Parse CSV from any reader; empty cells are missing values
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

        let passengers = csv_reader
            .deserialize::<CsvRow>()
            .enumerate()
            .map(|(i, row)| row.map_err(AppError::from)?.into_labeled(i + 2))
            .collect::<Result<Vec<_>>>()?;

        Self::new(passengers)
    }

    pub fn passengers(&self) -> &[LabeledPassenger] {
        &self.passengers
    }

    pub fn len(&self) -> usize {
        self.passengers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passengers.is_empty()
    }

    /// Split by survival label so both partitions keep the class ratio
    pub fn stratified_split(&self, test_fraction: f64, seed: u64) -> Result<DatasetSplit> {
        if !(test_fraction > 0.0 && test_fraction < 1.0) {
            return Err(AppError::Validation(format!(
                "test_fraction must be in (0, 1), got {}",
                test_fraction
            )));
        }

        let mut rng = Pcg32::seed_from_u64(seed);
        let mut train = Vec::new();
        let mut test = Vec::new();

        for survived in [false, true] {
            let mut stratum: Vec<&LabeledPassenger> = self
                .passengers
                .iter()
                .filter(|p| p.survived == survived)
                .collect();
            stratum.shuffle(&mut rng);

            let n_test = (stratum.len() as f64 * test_fraction).round() as usize;
            let (held_out, kept) = stratum.split_at(n_test.min(stratum.len()));
            test.extend(held_out.iter().map(|p| (*p).clone()));
            train.extend(kept.iter().map(|p| (*p).clone()));
        }

        train.shuffle(&mut rng);
        test.shuffle(&mut rng);

        if train.is_empty() || test.is_empty() {
            return Err(AppError::Dataset(
                "Split produced an empty partition".to_string(),
            ));
        }

        Ok(DatasetSplit { train, test })
    }

    /// Exploration summary
    pub fn summary(&self) -> DatasetSummary {
        let rows = self.passengers.len();
        let survivors = self.passengers.iter().filter(|p| p.survived).count();

        let mut by_sex: BTreeMap<String, (usize, usize)> = BTreeMap::new();
        let mut by_class: BTreeMap<u8, (usize, usize)> = BTreeMap::new();
        for passenger in &self.passengers {
            let outcome = usize::from(passenger.survived);
            let entry = by_sex.entry(passenger.record.sex.clone()).or_default();
            entry.0 += outcome;
            entry.1 += 1;
            let entry = by_class.entry(passenger.record.pclass).or_default();
            entry.0 += outcome;
            entry.1 += 1;
        }

        let rate = |(survived, total): (usize, usize)| survived as f64 / total.max(1) as f64;

        DatasetSummary {
            rows,
            survival_rate: rate((survivors, rows)),
            missing_age: self.passengers.iter().filter(|p| p.record.age.is_none()).count(),
            missing_fare: self.passengers.iter().filter(|p| p.record.fare.is_none()).count(),
            missing_embarked: self
                .passengers
                .iter()
                .filter(|p| p.record.embarked.is_none())
                .count(),
            survival_by_sex: by_sex.into_iter().map(|(k, v)| (k, rate(v))).collect(),
            survival_by_class: by_class.into_iter().map(|(k, v)| (k, rate(v))).collect(),
        }
    }
}

/// Row counts, missing values and survival rates of a dataset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetSummary {
    pub rows: usize,
    pub survival_rate: f64,
    pub missing_age: usize,
    pub missing_fare: usize,
    pub missing_embarked: usize,
    pub survival_by_sex: BTreeMap<String, f64>,
    pub survival_by_class: BTreeMap<u8, f64>,
}

impl fmt::Display for DatasetSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Rows: {}", self.rows)?;
        writeln!(f, "Survival rate: {:.3}", self.survival_rate)?;
        writeln!(
            f,
            "Missing values: age={} fare={} embarked={}",
            self.missing_age, self.missing_fare, self.missing_embarked
        )?;
        for (sex, rate) in &self.survival_by_sex {
            writeln!(f, "Survival rate ({}): {:.3}", sex, rate)?;
        }
        for (class, rate) in &self.survival_by_class {
            writeln!(f, "Survival rate (class {}): {:.3}", class, rate)?;
        }
        Ok(())
    }
}

/// Download a dataset CSV, check that it parses, and write it to `output`
pub async fn fetch_dataset(url: &str, output: &Path, timeout: Duration) -> Result<Dataset> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

    info!(url = %url, "Downloading dataset");

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| AppError::integration("dataset", format!("Request failed: {}", e)))?;

    if !response.status().is_success() {
        return Err(AppError::integration(
            "dataset",
            format!("Download returned {}", response.status()),
        ));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| AppError::integration("dataset", format!("Failed to read body: {}", e)))?;

    let dataset = Dataset::from_reader(&body[..])?;

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(output, &body)?;

    info!(path = %output.display(), rows = dataset.len(), "Dataset saved");
    Ok(dataset)
}
