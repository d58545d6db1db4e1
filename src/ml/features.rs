use crate::error::{AppError, Result};
use crate::ml::encoders::{CategoricalEncoders, CategoricalField};
use crate::models::PassengerRecord;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use strum::{Display, EnumIter, EnumString};

/// Age used when a batch carries no ages at all (e.g. a lone inference record)
pub const FALLBACK_AGE: f64 = 30.0;

/// Fare used when a batch carries no fares at all
pub const FALLBACK_FARE: f64 = 30.0;

/// Feature columns produced at runtime, in training order
pub const FEATURE_COLUMNS: [&str; 12] = [
    "Pclass",
    "Sex",
    "Age",
    "SibSp",
    "Parch",
    "Fare",
    "Embarked",
    "FamilySize",
    "IsAlone",
    "Title",
    "AgeGroup",
    "FareGroup",
];

/// Runtime column names as owned strings
pub fn feature_columns() -> Vec<String> {
    FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect()
}

/// Honorific collapsed into a small vocabulary
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
pub enum Title {
    Master,
    Miss,
    Mr,
    Mrs,
    Rare,
}

impl Title {
    /// Extract the title from a full name.
    ///
    /// A dotted honorific ("Braund, Mr. Owen") wins over a bare one
    /// ("Miss Jane Smith"); names without a recognizable honorific get `Mr`.
    pub fn from_name(name: &str) -> Self {
        let tokens: Vec<(&str, bool)> = name
            .split_whitespace()
            .map(|token| {
                let dotted = token.trim_end_matches([',', ')', ';']).ends_with('.');
                (token.trim_matches(|c: char| !c.is_ascii_alphabetic()), dotted)
            })
            .filter(|(word, _)| !word.is_empty())
            .collect();

        tokens
            .iter()
            .filter(|(_, dotted)| *dotted)
            .chain(tokens.iter().filter(|(_, dotted)| !*dotted))
            .find_map(|(word, _)| Self::from_honorific(word))
            .unwrap_or(Title::Mr)
    }

    fn from_honorific(word: &str) -> Option<Self> {
        let title = match word.to_ascii_lowercase().as_str() {
            "mr" => Title::Mr,
            "mrs" | "mme" => Title::Mrs,
            "miss" | "mlle" | "ms" => Title::Miss,
            "master" => Title::Master,
            "lady" | "countess" | "capt" | "col" | "don" | "dr" | "major" | "rev" | "sir"
            | "jonkheer" | "dona" => Title::Rare,
            _ => return None,
        };
        Some(title)
    }
}

/// Age bucket over `[0,12) [12,18) [18,35) [35,60) [60,100]`
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
pub enum AgeGroup {
    Child,
    Teen,
    Adult,
    Middle,
    Senior,
}

impl AgeGroup {
    /// Bucket an age; anything outside `[0, 100]` counts as `Adult`
    pub fn from_age(age: f64) -> Self {
        if !(0.0..=100.0).contains(&age) {
            return AgeGroup::Adult;
        }
        match age {
            a if a < 12.0 => AgeGroup::Child,
            a if a < 18.0 => AgeGroup::Teen,
            a if a < 35.0 => AgeGroup::Adult,
            a if a < 60.0 => AgeGroup::Middle,
            _ => AgeGroup::Senior,
        }
    }
}

/// Fare quartile bucket
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
pub enum FareGroup {
    Low,
    Medium,
    High,
    VeryHigh,
}

/// Quartile cut points of the training fares.
///
/// Buckets are half-open: `[0,q1) Low`, `[q1,q2) Medium`, `[q2,q3) High`,
/// `[q3,∞) VeryHigh`. The cut points are fitted once and shipped with the
/// encoders; they are never recomputed from an inference batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FareBoundaries {
    cuts: [f64; 3],
}

impl FareBoundaries {
    pub fn new(q1: f64, q2: f64, q3: f64) -> Result<Self> {
        let boundaries = Self { cuts: [q1, q2, q3] };
        boundaries.validate()?;
        Ok(boundaries)
    }

    /// Fit the 25/50/75% quantiles (linear interpolation)
    pub fn fit(fares: &[f64]) -> Result<Self> {
        let mut sorted: Vec<f64> = fares.iter().copied().filter(|f| f.is_finite()).collect();
        if sorted.is_empty() {
            return Err(AppError::Dataset(
                "Cannot fit fare boundaries without any fares".to_string(),
            ));
        }
        sorted.sort_by(f64::total_cmp);

        Self::new(
            quantile(&sorted, 0.25),
            quantile(&sorted, 0.50),
            quantile(&sorted, 0.75),
        )
    }

    pub fn cuts(&self) -> [f64; 3] {
        self.cuts
    }

    /// Bucket a fare; a non-finite fare falls back to `Medium`
    pub fn bucket(&self, fare: f64) -> FareGroup {
        if !fare.is_finite() {
            return FareGroup::Medium;
        }
        let [q1, q2, q3] = self.cuts;
        if fare < q1 {
            FareGroup::Low
        } else if fare < q2 {
            FareGroup::Medium
        } else if fare < q3 {
            FareGroup::High
        } else {
            FareGroup::VeryHigh
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let [q1, q2, q3] = self.cuts;
        if !(q1.is_finite() && q2.is_finite() && q3.is_finite()) || q1 > q2 || q2 > q3 {
            return Err(AppError::Serialization(format!(
                "Fare boundaries must be finite and non-decreasing, got {:?}",
                self.cuts
            )));
        }
        Ok(())
    }
}

/// Sorted-input quantile with linear interpolation between neighbours
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

fn median(values: impl Iterator<Item = f64>) -> Option<f64> {
    let mut values: Vec<f64> = values.filter(|v| v.is_finite()).collect();
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    Some(quantile(&values, 0.5))
}

/// Fill values for missing age and fare, taken from the current batch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Imputation {
    pub age: f64,
    pub fare: f64,
}

impl Imputation {
    /// Batch medians, or the fallback constants when the batch has none
    pub fn from_batch(records: &[PassengerRecord]) -> Self {
        Self {
            age: median(records.iter().filter_map(|r| r.age)).unwrap_or(FALLBACK_AGE),
            fare: median(records.iter().filter_map(|r| r.fare)).unwrap_or(FALLBACK_FARE),
        }
    }
}

/// A passenger after imputation and feature derivation
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedFeatures {
    pub pclass: u8,
    pub sex: String,
    pub age: f64,
    pub sibsp: u32,
    pub parch: u32,
    pub fare: f64,
    pub embarked: String,
    pub family_size: u32,
    pub is_alone: bool,
    pub title: Title,
    pub age_group: AgeGroup,
    pub fare_group: FareGroup,
}

impl DerivedFeatures {
    /// Impute first, then derive from the imputed values
    pub fn derive(
        record: &PassengerRecord,
        imputation: &Imputation,
        fare_boundaries: &FareBoundaries,
    ) -> Self {
        let record = record.clone().normalized();
        let age = record.age.filter(|a| a.is_finite()).unwrap_or(imputation.age);
        let fare = record.fare.filter(|f| f.is_finite()).unwrap_or(imputation.fare);
        let family_size = record.family_size();

        Self {
            pclass: record.pclass,
            embarked: record.embarked_or_default().to_string(),
            title: Title::from_name(&record.name),
            sex: record.sex,
            age,
            sibsp: record.sibsp,
            parch: record.parch,
            fare,
            family_size,
            is_alone: family_size == 1,
            age_group: AgeGroup::from_age(age),
            fare_group: fare_boundaries.bucket(fare),
        }
    }
}

/// Turns passenger records into classifier-ready rows.
///
/// Holds the encoders of one training run together with the column order
/// the classifier was trained on.
#[derive(Debug, Clone)]
pub struct FeatureEncoder {
    encoders: CategoricalEncoders,
    columns: Vec<String>,
}

impl FeatureEncoder {
    /// Pair encoders with a trained column order, rejecting foreign column sets
    pub fn new(encoders: CategoricalEncoders, columns: Vec<String>) -> Result<Self> {
        check_columns(&columns)?;
        Ok(Self { encoders, columns })
    }

    pub fn encoders(&self) -> &CategoricalEncoders {
        &self.encoders
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn n_features(&self) -> usize {
        self.columns.len()
    }

    /// Impute with batch statistics and derive every row
    pub fn derive_batch(&self, records: &[PassengerRecord]) -> Vec<DerivedFeatures> {
        let imputation = Imputation::from_batch(records);
        records
            .iter()
            .map(|record| {
                DerivedFeatures::derive(record, &imputation, &self.encoders.fare_boundaries)
            })
            .collect()
    }

    /// Encode a single passenger
    pub fn encode(&self, record: &PassengerRecord) -> Result<Array1<f64>> {
        let matrix = self.encode_batch(std::slice::from_ref(record))?;
        Ok(matrix.row(0).to_owned())
    }

    /// Encode a batch of passengers (n_records × n_columns)
    pub fn encode_batch(&self, records: &[PassengerRecord]) -> Result<Array2<f64>> {
        self.encode_derived(&self.derive_batch(records))
    }

    /// Encode already-derived rows in the trained column order
    pub fn encode_derived(&self, rows: &[DerivedFeatures]) -> Result<Array2<f64>> {
        let mut matrix = Array2::zeros((rows.len(), self.columns.len()));
        for (i, row) in rows.iter().enumerate() {
            for (j, column) in self.columns.iter().enumerate() {
                matrix[[i, j]] = self.column_value(row, column)?;
            }
        }
        Ok(matrix)
    }

    fn column_value(&self, row: &DerivedFeatures, column: &str) -> Result<f64> {
        let categorical = |field| self.encoders.encode(field, row).map(f64::from);

        let value = match column {
            "Pclass" => f64::from(row.pclass),
            "Sex" => categorical(CategoricalField::Sex)?,
            "Age" => row.age,
            "SibSp" => f64::from(row.sibsp),
            "Parch" => f64::from(row.parch),
            "Fare" => row.fare,
            "Embarked" => categorical(CategoricalField::Embarked)?,
            "FamilySize" => f64::from(row.family_size),
            "IsAlone" => f64::from(u8::from(row.is_alone)),
            "Title" => categorical(CategoricalField::Title)?,
            "AgeGroup" => categorical(CategoricalField::AgeGroup)?,
            "FareGroup" => categorical(CategoricalField::FareGroup)?,
            other => {
                return Err(AppError::ColumnMismatch(format!(
                    "No runtime feature named '{}'",
                    other
                )))
            }
        };
        Ok(value)
    }
}

/// Trained column set must equal the runtime column set (order may differ)
pub fn check_columns(columns: &[String]) -> Result<()> {
    let trained: BTreeSet<&str> = columns.iter().map(String::as_str).collect();
    let runtime: BTreeSet<&str> = FEATURE_COLUMNS.iter().copied().collect();

    if trained.len() != columns.len() {
        return Err(AppError::ColumnMismatch(
            "Trained column list contains duplicates".to_string(),
        ));
    }

    if trained != runtime {
        let missing: Vec<&str> = runtime.difference(&trained).copied().collect();
        let unexpected: Vec<&str> = trained.difference(&runtime).copied().collect();
        return Err(AppError::ColumnMismatch(format!(
            "trained columns differ from runtime columns (missing: {:?}, unexpected: {:?})",
            missing, unexpected
        )));
    }

    Ok(())
}
