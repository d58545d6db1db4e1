use crate::error::{AppError, Result};
use crate::ml::features::{DerivedFeatures, FareBoundaries};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use strum::{Display, EnumIter, IntoEnumIterator};

/// Categorical inputs that are label-encoded before reaching the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum CategoricalField {
    Sex,
    Embarked,
    Title,
    AgeGroup,
    FareGroup,
}

impl CategoricalField {
    /// The raw label this field takes for one passenger
    pub fn label_of(self, derived: &DerivedFeatures) -> String {
        match self {
            CategoricalField::Sex => derived.sex.clone(),
            CategoricalField::Embarked => derived.embarked.clone(),
            CategoricalField::Title => derived.title.to_string(),
            CategoricalField::AgeGroup => derived.age_group.to_string(),
            CategoricalField::FareGroup => derived.fare_group.to_string(),
        }
    }
}

/// Finite label → code mapping fitted once on the training partition.
///
/// Codes follow the lexicographic order of the observed labels, so fitting the
/// same label set always yields the same codes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryMapping {
    codes: BTreeMap<String, u32>,
}

impl CategoryMapping {
    /// Fit a mapping from the observed labels
    pub fn fit<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let unique: BTreeSet<String> = labels.into_iter().map(Into::into).collect();
        let codes = unique
            .into_iter()
            .enumerate()
            .map(|(code, label)| (label, code as u32))
            .collect();

        Self { codes }
    }

    /// Code for a label, if it was observed during fitting
    pub fn code(&self, label: &str) -> Option<u32> {
        self.codes.get(label).copied()
    }

    /// Code for a label, failing with `UnknownCategory` for unseen labels
    pub fn encode(&self, field: CategoricalField, label: &str) -> Result<u32> {
        self.code(label)
            .ok_or_else(|| AppError::unknown_category(field.to_string(), label))
    }

    /// Observed labels in code order
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.codes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Codes must be exactly 0..n in label order
    fn is_well_formed(&self) -> bool {
        self.codes
            .values()
            .enumerate()
            .all(|(expected, &code)| code as usize == expected)
    }
}

/// Every categorical mapping plus the frozen fare boundaries of one training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalEncoders {
    pub sex: CategoryMapping,
    pub embarked: CategoryMapping,
    pub title: CategoryMapping,
    pub age_group: CategoryMapping,
    pub fare_group: CategoryMapping,
    pub fare_boundaries: FareBoundaries,
}

impl CategoricalEncoders {
    /// Fit all mappings from already-derived training rows
    pub fn fit(derived: &[DerivedFeatures], fare_boundaries: FareBoundaries) -> Result<Self> {
        if derived.is_empty() {
            return Err(AppError::Dataset(
                "Cannot fit encoders on an empty training partition".to_string(),
            ));
        }

        let fit_field = |field: CategoricalField| {
            CategoryMapping::fit(derived.iter().map(|row| field.label_of(row)))
        };

        Ok(Self {
            sex: fit_field(CategoricalField::Sex),
            embarked: fit_field(CategoricalField::Embarked),
            title: fit_field(CategoricalField::Title),
            age_group: fit_field(CategoricalField::AgeGroup),
            fare_group: fit_field(CategoricalField::FareGroup),
            fare_boundaries,
        })
    }

    pub fn mapping(&self, field: CategoricalField) -> &CategoryMapping {
        match field {
            CategoricalField::Sex => &self.sex,
            CategoricalField::Embarked => &self.embarked,
            CategoricalField::Title => &self.title,
            CategoricalField::AgeGroup => &self.age_group,
            CategoricalField::FareGroup => &self.fare_group,
        }
    }

    /// Encode one field of a derived row
    pub fn encode(&self, field: CategoricalField, derived: &DerivedFeatures) -> Result<u32> {
        self.mapping(field).encode(field, &field.label_of(derived))
    }

    /// Reject encoders that could not have come out of `fit`
    pub fn validate(&self) -> Result<()> {
        for field in CategoricalField::iter() {
            let mapping = self.mapping(field);
            if mapping.is_empty() {
                return Err(AppError::Serialization(format!(
                    "Encoder for '{}' has no categories",
                    field
                )));
            }
            if !mapping.is_well_formed() {
                return Err(AppError::Serialization(format!(
                    "Encoder for '{}' has non-contiguous codes",
                    field
                )));
            }
        }
        self.fare_boundaries.validate()
    }
}
