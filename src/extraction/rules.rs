use crate::extraction::merge::PassengerDraft;
use once_cell::sync::Lazy;
use regex::Regex;

static CLASS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(first|1st|second|2nd|third|3rd)[\s-]+class\b").expect("valid class regex")
});

static SEX_WORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(girl|woman|women|female|lady|mother|daughter|wife|sister|widow|miss|ms|mrs|she|her|boy|man|men|male|gentleman|father|son|husband|brother|captain|mr|mister|sir|he|his|him)\b",
    )
    .expect("valid sex regex")
});

static AGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)[\s-]*(?:years?|yrs?)[\s-]*old|\baged?\s+(\d+(?:\.\d+)?)")
        .expect("valid age regex")
});

static FARE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)\s*pounds?\b|£\s*(\d+(?:\.\d+)?)").expect("valid fare regex")
});

static PARENTS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bwith\s+(?:her\s+|his\s+|their\s+)?parents\b").expect("valid parents regex")
});

static SPOUSE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bwith\s+(?:her|his|their)\s+(?:wife|husband|spouse)\b")
        .expect("valid spouse regex")
});

const COUNT: &str = r"(\d+|a|an|one|two|three|four|five|six|seven|eight|nine|ten)";

static CHILDREN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"\b(?:with|and)\s+(?:her\s+|his\s+|their\s+)?{COUNT}\s+(?:child|children|kids?|sons?|daughters?)\b"
    ))
    .expect("valid children regex")
});

static SIBLINGS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"\b(?:with|and)\s+(?:her\s+|his\s+|their\s+)?{COUNT}\s+(?:siblings?|brothers?|sisters?)\b"
    ))
    .expect("valid siblings regex")
});

static ALONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\balone\b").expect("valid alone regex"));

/// One-letter port code for a lowercase port name or code
pub fn port_code(port: &str) -> Option<&'static str> {
    match port {
        "c" | "cherbourg" => Some("C"),
        "q" | "queenstown" | "cobh" => Some("Q"),
        "s" | "southampton" => Some("S"),
        _ => None,
    }
}

fn parse_count(raw: &str) -> Option<u32> {
    let count = match raw {
        "a" | "an" | "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        digits => return digits.parse().ok(),
    };
    Some(count)
}

fn first_number(caps: &regex::Captures<'_>) -> Option<f64> {
    caps.iter()
        .skip(1)
        .flatten()
        .next()
        .and_then(|m| m.as_str().parse().ok())
}

fn extract_class(text: &str) -> Option<u8> {
    let caps = CLASS_RE.captures(text)?;
    match &caps[1] {
        "first" | "1st" => Some(1),
        "second" | "2nd" => Some(2),
        _ => Some(3),
    }
}

/// The earliest sex word in the message decides
fn extract_sex(text: &str) -> Option<String> {
    let word = SEX_WORD_RE.find(text)?.as_str();
    let sex = match word {
        "girl" | "woman" | "women" | "female" | "lady" | "mother" | "daughter" | "wife"
        | "sister" | "widow" | "miss" | "ms" | "mrs" | "she" | "her" => "female",
        _ => "male",
    };
    Some(sex.to_string())
}

fn extract_port(text: &str) -> Option<String> {
    ["cherbourg", "queenstown", "southampton"]
        .into_iter()
        .find(|name| text.contains(name))
        .and_then(port_code)
        .map(str::to_string)
}

fn extract_family(text: &str, draft: &mut PassengerDraft) {
    if PARENTS_RE.is_match(text) {
        draft.parch = Some(2);
    }
    if SPOUSE_RE.is_match(text) {
        draft.sibsp = Some(1);
    }
    if let Some(n) = CHILDREN_RE.captures(text).and_then(|c| parse_count(&c[1])) {
        draft.parch = Some(draft.parch.unwrap_or(0).max(n));
    }
    if let Some(n) = SIBLINGS_RE.captures(text).and_then(|c| parse_count(&c[1])) {
        draft.sibsp = Some(draft.sibsp.unwrap_or(0) + n);
    }
    if draft.sibsp.is_none() && draft.parch.is_none() && ALONE_RE.is_match(text) {
        draft.sibsp = Some(0);
        draft.parch = Some(0);
    }
}

/// Deterministic lexical pass over a free-text message.
///
/// Only fields whose pattern matched are set; everything else stays `None`
/// so the merge step can fall through to the model or the defaults.
pub fn apply_rules(message: &str) -> PassengerDraft {
    let text = message.to_lowercase();

    let mut draft = PassengerDraft {
        pclass: extract_class(&text),
        sex: extract_sex(&text),
        age: AGE_RE.captures(&text).as_ref().and_then(first_number),
        fare: FARE_RE.captures(&text).as_ref().and_then(first_number),
        embarked: extract_port(&text),
        ..PassengerDraft::default()
    };
    extract_family(&text, &mut draft);

    draft
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_girl_in_first_class_from_southampton() {
        let draft = apply_rules("an 8 year old girl traveling in first class from Southampton");

        assert_eq!(draft.pclass, Some(1));
        assert_eq!(draft.sex.as_deref(), Some("female"));
        assert_eq!(draft.age, Some(8.0));
        assert_eq!(draft.embarked.as_deref(), Some("S"));
        assert!(draft.name.is_none());
    }

    #[test]
    fn test_class_variants() {
        assert_eq!(apply_rules("a 2nd class ticket").pclass, Some(2));
        assert_eq!(apply_rules("Third-class passenger").pclass, Some(3));
        assert_eq!(apply_rules("no class mentioned").pclass, None);
    }

    #[test]
    fn test_sex_words_respect_word_boundaries() {
        assert_eq!(apply_rules("a woman").sex.as_deref(), Some("female"));
        assert_eq!(apply_rules("a female passenger").sex.as_deref(), Some("female"));
        assert_eq!(apply_rules("a young man").sex.as_deref(), Some("male"));
        // "mrs" must not be found inside other words
        assert_eq!(apply_rules("the farmers market").sex, None);
    }

    #[test]
    fn test_earliest_sex_word_wins() {
        let draft = apply_rules("a man traveling with his daughter");
        assert_eq!(draft.sex.as_deref(), Some("male"));

        let draft = apply_rules("a mother traveling with her son");
        assert_eq!(draft.sex.as_deref(), Some("female"));
    }

    #[test]
    fn test_age_and_fare() {
        let draft = apply_rules("A 42-year-old who paid 71.28 pounds");
        assert_eq!(draft.age, Some(42.0));
        assert_eq!(draft.fare, Some(71.28));

        let draft = apply_rules("aged 30, ticket cost £7.25");
        assert_eq!(draft.age, Some(30.0));
        assert_eq!(draft.fare, Some(7.25));
    }

    #[test]
    fn test_ports() {
        assert_eq!(apply_rules("boarded at Cherbourg").embarked.as_deref(), Some("C"));
        assert_eq!(apply_rules("from Queenstown").embarked.as_deref(), Some("Q"));
        assert_eq!(apply_rules("somewhere").embarked, None);
    }

    #[test]
    fn test_kinship_phrases() {
        let draft = apply_rules("a boy with his parents");
        assert_eq!(draft.parch, Some(2));
        assert_eq!(draft.sibsp, None);

        let draft = apply_rules("a man with his wife and 3 children");
        assert_eq!(draft.sibsp, Some(1));
        assert_eq!(draft.parch, Some(3));

        let draft = apply_rules("a girl with two siblings");
        assert_eq!(draft.sibsp, Some(2));

        let draft = apply_rules("an old man traveling alone");
        assert_eq!(draft.sibsp, Some(0));
        assert_eq!(draft.parch, Some(0));
    }

    #[test]
    fn test_unrelated_message_matches_nothing() {
        assert!(apply_rules("tell me a joke").is_empty());
    }

    #[test]
    fn test_port_codes() {
        assert_eq!(port_code("southampton"), Some("S"));
        assert_eq!(port_code("c"), Some("C"));
        assert_eq!(port_code("x"), None);
    }
}
