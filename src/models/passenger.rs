use serde::{Deserialize, Serialize};
use validator::Validate;

/// Default port of embarkation when none is given
pub const DEFAULT_EMBARKED: &str = "S";

/// One historical traveler's attributes, as used for prediction.
///
/// `sex` and `embarked` stay free-form strings on purpose: the encoder is the
/// authority on which categories exist, so a value such as `"X"` reaches it
/// and fails as an unknown category instead of being silently coerced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct PassengerRecord {
    /// Ticket class (1, 2 or 3)
    #[validate(range(min = 1, max = 3))]
    pub pclass: u8,

    /// Full name; only used to derive the title
    #[validate(length(min = 1, max = 500))]
    pub name: String,

    /// `male` or `female` after normalization
    pub sex: String,

    /// Age in years
    #[serde(default)]
    #[validate(range(min = 0.0, max = 150.0))]
    pub age: Option<f64>,

    /// Number of siblings/spouses aboard
    #[serde(default)]
    pub sibsp: u32,

    /// Number of parents/children aboard
    #[serde(default)]
    pub parch: u32,

    /// Ticket fare
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub fare: Option<f64>,

    /// Port of embarkation (C, Q or S)
    #[serde(default)]
    pub embarked: Option<String>,
}

impl PassengerRecord {
    /// Create a record with the required fields; optional fields are empty
    pub fn new(pclass: u8, name: impl Into<String>, sex: impl Into<String>) -> Self {
        Self {
            pclass,
            name: name.into(),
            sex: sex.into(),
            age: None,
            sibsp: 0,
            parch: 0,
            fare: None,
            embarked: None,
        }
    }

    pub fn with_age(mut self, age: f64) -> Self {
        self.age = Some(age);
        self
    }

    pub fn with_fare(mut self, fare: f64) -> Self {
        self.fare = Some(fare);
        self
    }

    pub fn with_family(mut self, sibsp: u32, parch: u32) -> Self {
        self.sibsp = sibsp;
        self.parch = parch;
        self
    }

    pub fn with_embarked(mut self, embarked: impl Into<String>) -> Self {
        self.embarked = Some(embarked.into());
        self
    }

    /// Lowercase/trim sex, uppercase/trim embarkation, drop blank ports
    pub fn normalized(mut self) -> Self {
        self.sex = self.sex.trim().to_lowercase();
        self.name = self.name.trim().to_string();
        self.embarked = self
            .embarked
            .map(|port| port.trim().to_uppercase())
            .filter(|port| !port.is_empty());
        self
    }

    /// Siblings/spouses + parents/children + the passenger
    pub fn family_size(&self) -> u32 {
        self.sibsp + self.parch + 1
    }

    /// Embarkation port with the default applied
    pub fn embarked_or_default(&self) -> &str {
        self.embarked.as_deref().unwrap_or(DEFAULT_EMBARKED)
    }
}

/// A passenger with a known outcome, used for training
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledPassenger {
    pub record: PassengerRecord,
    pub survived: bool,
}

impl LabeledPassenger {
    pub fn new(record: PassengerRecord, survived: bool) -> Self {
        Self { record, survived }
    }

    /// Class index used by the classifier (0 = died, 1 = survived)
    pub fn label(&self) -> usize {
        usize::from(self.survived)
    }
}

/// Survival prediction for a single passenger
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Predicted outcome (0 = died, 1 = survived)
    pub survived: u8,

    /// Probability of survival
    pub survival_probability: f64,

    /// Probability of death; always `1 - survival_probability`
    pub death_probability: f64,
}

impl PredictionResult {
    /// Build a result from the survival probability alone
    pub fn from_survival_probability(survival_probability: f64) -> Self {
        let survival_probability = survival_probability.clamp(0.0, 1.0);
        let death_probability = 1.0 - survival_probability;

        Self {
            survived: u8::from(survival_probability > death_probability),
            survival_probability,
            death_probability,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization() {
        let record = PassengerRecord::new(2, "  Mrs. Ada Lovelace ", " Female ")
            .with_embarked(" c ")
            .normalized();

        assert_eq!(record.sex, "female");
        assert_eq!(record.name, "Mrs. Ada Lovelace");
        assert_eq!(record.embarked.as_deref(), Some("C"));
    }

    #[test]
    fn test_blank_embarked_falls_back_to_default() {
        let record = PassengerRecord::new(3, "Mr. A", "male")
            .with_embarked("   ")
            .normalized();

        assert_eq!(record.embarked, None);
        assert_eq!(record.embarked_or_default(), "S");
    }

    #[test]
    fn test_family_size() {
        let record = PassengerRecord::new(3, "Mr. A", "male").with_family(1, 2);
        assert_eq!(record.family_size(), 4);
    }

    #[test]
    fn test_validation_rejects_bad_class_and_negative_fare() {
        let record = PassengerRecord::new(4, "Mr. A", "male");
        assert!(record.validate().is_err());

        let record = PassengerRecord::new(1, "Mr. A", "male").with_fare(-1.0);
        assert!(record.validate().is_err());

        let record = PassengerRecord::new(1, "Mr. A", "male").with_fare(50.0);
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_prediction_result_complement() {
        let result = PredictionResult::from_survival_probability(0.73);
        assert_eq!(result.survived, 1);
        assert!((result.survival_probability + result.death_probability - 1.0).abs() < 1e-9);

        let tie = PredictionResult::from_survival_probability(0.5);
        assert_eq!(tie.survived, 0);
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let json = r#"{"pclass": 1, "name": "Mr. John Doe", "sex": "male"}"#;
        let record: PassengerRecord = serde_json::from_str(json).unwrap();

        assert_eq!(record.sibsp, 0);
        assert_eq!(record.parch, 0);
        assert!(record.age.is_none());
        assert!(record.embarked.is_none());
    }
}
