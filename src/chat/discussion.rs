use crate::models::{PassengerRecord, PredictionResult};

fn class_name(pclass: u8) -> &'static str {
    match pclass {
        1 => "First",
        2 => "Second",
        _ => "Third",
    }
}

fn port_name(code: &str) -> &'static str {
    match code {
        "C" => "Cherbourg",
        "Q" => "Queenstown",
        _ => "Southampton",
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn number_or_unknown(value: Option<f64>) -> String {
    value.map_or_else(|| "Unknown".to_string(), |v| v.to_string())
}

/// Markdown summary of an extracted passenger and its prediction
pub fn render_discussion(
    passenger: &PassengerRecord,
    prediction: &PredictionResult,
    reasoning: &str,
) -> String {
    let outcome = if prediction.survived == 1 {
        "survived"
    } else {
        "did not survive"
    };
    let embarked = passenger.embarked_or_default();

    format!(
        "Based on your description, I've analyzed the passenger information:

**Passenger Details:**
- Name: {name}
- Class: {pclass} ({class} class)
- Gender: {sex}
- Age: {age}
- Fare: £{fare}
- Embarked: {embarked} ({port})

**Prediction:**
This passenger {outcome} the Titanic disaster.

**Confidence:**
- Survival probability: {survival:.1}%
- Death probability: {death:.1}%

**Analysis:**
{reasoning}

The prediction is based on historical data patterns from the Titanic disaster, considering factors like passenger class, age, gender, and fare paid.",
        name = passenger.name,
        pclass = passenger.pclass,
        class = class_name(passenger.pclass),
        sex = title_case(&passenger.sex),
        age = number_or_unknown(passenger.age),
        fare = number_or_unknown(passenger.fare),
        embarked = embarked,
        port = port_name(embarked),
        outcome = outcome,
        survival = prediction.survival_probability * 100.0,
        death = prediction.death_probability * 100.0,
        reasoning = reasoning,
    )
}
