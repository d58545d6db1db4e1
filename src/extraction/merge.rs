use crate::extraction::rules::port_code;
use crate::models::{PassengerRecord, DEFAULT_EMBARKED};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use strum::Display;

pub const DEFAULT_NAME: &str = "Unknown Passenger";
pub const DEFAULT_SEX: &str = "unknown";
pub const DEFAULT_PCLASS: u8 = 3;

/// Where a resolved field came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FieldSource {
    Rule,
    Model,
    Default,
}

/// Partial passenger as proposed by one extraction stage.
///
/// Deserialization is field-by-field lenient: numbers may arrive as numeric
/// strings, and a value of the wrong shape drops only that field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PassengerDraft {
    #[serde(deserialize_with = "lenient_count")]
    pub pclass: Option<u8>,
    #[serde(deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub sex: Option<String>,
    #[serde(deserialize_with = "lenient_number")]
    pub age: Option<f64>,
    #[serde(deserialize_with = "lenient_count")]
    pub sibsp: Option<u32>,
    #[serde(deserialize_with = "lenient_count")]
    pub parch: Option<u32>,
    #[serde(deserialize_with = "lenient_number")]
    pub fare: Option<f64>,
    #[serde(deserialize_with = "lenient_string")]
    pub embarked: Option<String>,
}

fn number_of(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(number_of(&Value::deserialize(deserializer)?))
}

/// Non-negative whole number that fits `T`
fn lenient_count<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<u64>,
{
    Ok(number_of(&Value::deserialize(deserializer)?)
        .filter(|n| *n >= 0.0 && n.fract() == 0.0)
        .and_then(|n| T::try_from(n as u64).ok()))
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

impl PassengerDraft {
    /// True when no field is set
    pub fn is_empty(&self) -> bool {
        *self == PassengerDraft::default()
    }

    /// Drop values no passenger can have and normalize the rest
    pub fn sanitized(self) -> Self {
        Self {
            pclass: self.pclass.filter(|c| (1..=3).contains(c)),
            name: self
                .name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            sex: self
                .sex
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty()),
            age: self.age.filter(|a| a.is_finite() && *a >= 0.0),
            sibsp: self.sibsp,
            parch: self.parch,
            fare: self.fare.filter(|f| f.is_finite() && *f >= 0.0),
            embarked: self.embarked.as_deref().and_then(normalize_port),
        }
    }
}

/// Accept "S", "s", "Southampton" and the like
fn normalize_port(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(
        port_code(&trimmed.to_lowercase())
            .map(str::to_string)
            .unwrap_or_else(|| trimmed.to_uppercase()),
    )
}

/// Source of every field of a merged passenger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSources {
    pub pclass: FieldSource,
    pub name: FieldSource,
    pub sex: FieldSource,
    pub age: FieldSource,
    pub sibsp: FieldSource,
    pub parch: FieldSource,
    pub fare: FieldSource,
    pub embarked: FieldSource,
}

/// A merged passenger and the provenance of each field
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub passenger: PassengerRecord,
    pub sources: FieldSources,
}

fn pick<T: Clone>(rule: &Option<T>, model: &Option<T>) -> (Option<T>, FieldSource) {
    match (rule, model) {
        (Some(value), _) => (Some(value.clone()), FieldSource::Rule),
        (None, Some(value)) => (Some(value.clone()), FieldSource::Model),
        (None, None) => (None, FieldSource::Default),
    }
}

fn pick_or<T: Clone>(rule: &Option<T>, model: &Option<T>, default: T) -> (T, FieldSource) {
    let (value, source) = pick(rule, model);
    (value.unwrap_or(default), source)
}

/// Resolve each field: a rule match beats the model, the model beats the default
pub fn merge(model: &PassengerDraft, rules: &PassengerDraft) -> Resolved {
    let model = model.clone().sanitized();
    let rules = rules.clone().sanitized();

    let (pclass, pclass_src) = pick_or(&rules.pclass, &model.pclass, DEFAULT_PCLASS);
    let (name, name_src) = pick_or(&rules.name, &model.name, DEFAULT_NAME.to_string());
    let (sex, sex_src) = pick_or(&rules.sex, &model.sex, DEFAULT_SEX.to_string());
    let (age, age_src) = pick(&rules.age, &model.age);
    let (sibsp, sibsp_src) = pick_or(&rules.sibsp, &model.sibsp, 0);
    let (parch, parch_src) = pick_or(&rules.parch, &model.parch, 0);
    let (fare, fare_src) = pick(&rules.fare, &model.fare);
    let (embarked, embarked_src) =
        pick_or(&rules.embarked, &model.embarked, DEFAULT_EMBARKED.to_string());

    Resolved {
        passenger: PassengerRecord {
            pclass,
            name,
            sex,
            age,
            sibsp,
            parch,
            fare,
            embarked: Some(embarked),
        },
        sources: FieldSources {
            pclass: pclass_src,
            name: name_src,
            sex: sex_src,
            age: age_src,
            sibsp: sibsp_src,
            parch: parch_src,
            fare: fare_src,
            embarked: embarked_src,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_beats_model_beats_default() {
        let model = PassengerDraft {
            pclass: Some(2),
            name: Some("Jane Smith".to_string()),
            sex: Some("male".to_string()),
            age: Some(30.0),
            ..Default::default()
        };
        let rules = PassengerDraft {
            pclass: Some(1),
            sex: Some("female".to_string()),
            ..Default::default()
        };

        let resolved = merge(&model, &rules);

        assert_eq!(resolved.passenger.pclass, 1);
        assert_eq!(resolved.sources.pclass, FieldSource::Rule);
        assert_eq!(resolved.passenger.sex, "female");
        assert_eq!(resolved.passenger.name, "Jane Smith");
        assert_eq!(resolved.sources.name, FieldSource::Model);
        assert_eq!(resolved.passenger.age, Some(30.0));
        assert_eq!(resolved.sources.age, FieldSource::Model);
        assert_eq!(resolved.passenger.embarked.as_deref(), Some("S"));
        assert_eq!(resolved.sources.embarked, FieldSource::Default);
    }

    #[test]
    fn test_empty_seed_defaults() {
        let resolved = merge(&PassengerDraft::default(), &PassengerDraft::default());

        assert_eq!(resolved.passenger.name, DEFAULT_NAME);
        assert_eq!(resolved.passenger.sex, DEFAULT_SEX);
        assert_eq!(resolved.passenger.pclass, 3);
        assert_eq!(resolved.passenger.sibsp, 0);
        assert_eq!(resolved.passenger.parch, 0);
        assert!(resolved.passenger.age.is_none());
        assert!(resolved.passenger.fare.is_none());
        assert_eq!(resolved.sources.sex, FieldSource::Default);
    }

    #[test]
    fn test_model_values_are_sanitized() {
        let model = PassengerDraft {
            pclass: Some(7),
            name: Some("   ".to_string()),
            sex: Some(" Female ".to_string()),
            fare: Some(-3.0),
            embarked: Some("Cherbourg".to_string()),
            ..Default::default()
        };

        let resolved = merge(&model, &PassengerDraft::default());

        assert_eq!(resolved.passenger.pclass, 3);
        assert_eq!(resolved.sources.pclass, FieldSource::Default);
        assert_eq!(resolved.passenger.name, DEFAULT_NAME);
        assert_eq!(resolved.passenger.sex, "female");
        assert!(resolved.passenger.fare.is_none());
        assert_eq!(resolved.passenger.embarked.as_deref(), Some("C"));
    }

    #[test]
    fn test_draft_deserializes_with_nulls() {
        let json = r#"{"pclass": 1, "name": "Rose", "sex": "female", "age": null, "fare": null}"#;
        let draft: PassengerDraft = serde_json::from_str(json).unwrap();
        assert_eq!(draft.pclass, Some(1));
        assert!(draft.age.is_none());
        assert!(draft.embarked.is_none());
        assert!(!draft.is_empty());
    }

    #[test]
    fn test_draft_accepts_numeric_strings() {
        let json = r#"{"pclass": "1", "name": "Rose DeWitt", "sex": "female",
                       "age": "17", "sibsp": "0", "parch": 1, "fare": " 93.5 "}"#;
        let draft: PassengerDraft = serde_json::from_str(json).unwrap();

        assert_eq!(draft.pclass, Some(1));
        assert_eq!(draft.age, Some(17.0));
        assert_eq!(draft.sibsp, Some(0));
        assert_eq!(draft.parch, Some(1));
        assert_eq!(draft.fare, Some(93.5));
        assert_eq!(draft.name.as_deref(), Some("Rose DeWitt"));
    }

    #[test]
    fn test_bad_field_drops_only_itself() {
        let json = r#"{"pclass": "first", "name": "Rose", "sex": "female",
                       "age": {"years": 17}, "sibsp": -1, "parch": 1.5, "embarked": ["S"]}"#;
        let draft: PassengerDraft = serde_json::from_str(json).unwrap();

        assert_eq!(draft.pclass, None);
        assert_eq!(draft.age, None);
        assert_eq!(draft.sibsp, None);
        assert_eq!(draft.parch, None);
        assert_eq!(draft.embarked, None);
        assert_eq!(draft.name.as_deref(), Some("Rose"));
        assert_eq!(draft.sex.as_deref(), Some("female"));
    }

    #[test]
    fn test_field_source_names() {
        assert_eq!(FieldSource::Rule.to_string(), "rule");
        assert_eq!(
            serde_json::to_string(&FieldSource::Default).unwrap(),
            r#""default""#
        );
    }
}
