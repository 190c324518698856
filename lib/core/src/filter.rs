// Predicate language understood by attribute stores
use regex::Regex;

use crate::panel::{FieldValue, PanelRecord};

pub trait Filter {
    fn matches(&self, record: &PanelRecord) -> bool;
}

#[derive(Debug, Clone)]
pub enum Condition {
    /// Exact text equality against any item of the field
    Equals { field: String, value: String },
    AnyOf { field: String, values: Vec<String> },
    /// First whitespace-separated token equals `value` ("서울 중구" matches "서울")
    LeadingToken { field: String, value: String },
    Between { field: String, min: f64, max: f64 },
    GreaterEqual { field: String, value: f64 },
    LessEqual { field: String, value: f64 },
    /// Case-insensitive substring match against any item of the field
    Contains { field: String, needle: String },
    /// Present, and no item matches the negative-answer pattern
    NotNullExcluding { field: String, pattern: Regex },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
    Never,
}

impl Condition {
    pub fn field(&self) -> Option<&str> {
        match self {
            Condition::Equals { field, .. }
            | Condition::AnyOf { field, .. }
            | Condition::LeadingToken { field, .. }
            | Condition::Between { field, .. }
            | Condition::GreaterEqual { field, .. }
            | Condition::LessEqual { field, .. }
            | Condition::Contains { field, .. }
            | Condition::NotNullExcluding { field, .. } => Some(field.as_str()),
            _ => None,
        }
    }

    fn items(record: &PanelRecord, field: &str) -> Vec<String> {
        record.get(field).map(FieldValue::text_items).unwrap_or_default()
    }

    fn number(record: &PanelRecord, field: &str) -> Option<f64> {
        record.get(field).and_then(FieldValue::as_number)
    }
}

impl Filter for Condition {
    fn matches(&self, record: &PanelRecord) -> bool {
        match self {
            Condition::Equals { field, value } => {
                Self::items(record, field).iter().any(|v| v.trim() == value.as_str())
            }
            Condition::AnyOf { field, values } => Self::items(record, field)
                .iter()
                .any(|v| values.iter().any(|candidate| v.trim() == candidate.as_str())),
            Condition::LeadingToken { field, value } => Self::items(record, field)
                .iter()
                .any(|v| v.split_whitespace().next() == Some(value.as_str())),
            Condition::Between { field, min, max } => Self::number(record, field)
                .map(|n| n >= *min && n <= *max)
                .unwrap_or(false),
            Condition::GreaterEqual { field, value } => Self::number(record, field)
                .map(|n| n >= *value)
                .unwrap_or(false),
            Condition::LessEqual { field, value } => Self::number(record, field)
                .map(|n| n <= *value)
                .unwrap_or(false),
            Condition::Contains { field, needle } => {
                let needle = needle.to_lowercase();
                Self::items(record, field)
                    .iter()
                    .any(|v| v.to_lowercase().contains(&needle))
            }
            Condition::NotNullExcluding { field, pattern } => match record.get(field) {
                Some(value) if value.is_present() => {
                    !value.text_items().iter().any(|v| pattern.is_match(v))
                }
                _ => false,
            },
            Condition::And(conditions) => conditions.iter().all(|c| c.matches(record)),
            Condition::Or(conditions) => conditions.iter().any(|c| c.matches(record)),
            Condition::Not(condition) => !condition.matches(record),
            Condition::Never => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> PanelRecord {
        PanelRecord::new("p1")
            .with("gender", "F")
            .with("region", "서울 중구")
            .with("birth_year", 1990.0)
            .with("family_size", "4명")
            .with("job_title_raw", "Software Developer")
            .with("drinking_experience", vec!["소주", "맥주"])
            .with("smoking_experience", "피우지 않음")
    }

    #[test]
    fn test_equality_and_any_of() {
        let r = record();
        assert!(Condition::Equals { field: "gender".into(), value: "F".into() }.matches(&r));
        assert!(!Condition::Equals { field: "gender".into(), value: "M".into() }.matches(&r));
        assert!(Condition::AnyOf {
            field: "drinking_experience".into(),
            values: vec!["와인".into(), "맥주".into()]
        }
        .matches(&r));
        assert!(!Condition::Equals { field: "missing".into(), value: "x".into() }.matches(&r));
    }

    #[test]
    fn test_leading_token() {
        let r = record();
        assert!(Condition::LeadingToken { field: "region".into(), value: "서울".into() }.matches(&r));
        assert!(!Condition::LeadingToken { field: "region".into(), value: "중구".into() }.matches(&r));
    }

    #[test]
    fn test_numeric() {
        let r = record();
        assert!(Condition::Between { field: "birth_year".into(), min: 1986.0, max: 1995.0 }.matches(&r));
        assert!(Condition::GreaterEqual { field: "family_size".into(), value: 4.0 }.matches(&r));
        assert!(!Condition::LessEqual { field: "family_size".into(), value: 3.0 }.matches(&r));
    }

    #[test]
    fn test_contains_case_insensitive() {
        let r = record();
        assert!(Condition::Contains { field: "job_title_raw".into(), needle: "developer".into() }.matches(&r));
    }

    #[test]
    fn test_not_null_excluding() {
        let r = record();
        let pattern = Regex::new("피우지|않음|없음").unwrap();
        assert!(!Condition::NotNullExcluding { field: "smoking_experience".into(), pattern: pattern.clone() }
            .matches(&r));
        assert!(Condition::NotNullExcluding { field: "drinking_experience".into(), pattern: pattern.clone() }
            .matches(&r));
        assert!(!Condition::NotNullExcluding { field: "children_count".into(), pattern }.matches(&r));
    }

    #[test]
    fn test_combinators() {
        let r = record();
        let yes = Condition::Equals { field: "gender".into(), value: "F".into() };
        assert!(Condition::And(vec![yes.clone(), Condition::Not(Box::new(Condition::Never))]).matches(&r));
        assert!(!Condition::And(vec![yes.clone(), Condition::Never]).matches(&r));
        assert!(Condition::Or(vec![Condition::Never, yes]).matches(&r));
        assert!(Condition::And(vec![]).matches(&r));
    }
}
