use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Set of panel identifiers used throughout candidate handling
pub type PanelIdSet = HashSet<PanelId, ahash::RandomState>;

/// Opaque identifier of a survey respondent
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PanelId(String);

impl PanelId {
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PanelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PanelId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for PanelId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A single attribute value on a panel record: scalar, string list or null
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum FieldValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    /// False for null, blank text, the "NaN" placeholder and empty lists
    pub fn is_present(&self) -> bool {
        match self {
            FieldValue::Null => false,
            FieldValue::Bool(_) => true,
            FieldValue::Number(n) => !n.is_nan(),
            FieldValue::Text(s) => {
                let s = s.trim();
                !s.is_empty() && !s.eq_ignore_ascii_case("nan")
            }
            FieldValue::List(items) => items.iter().any(|i| !i.trim().is_empty()),
        }
    }

    /// Numeric view of the value. Text yields the digits it contains
    /// ("4명" is 4, "1990년생" is 1990).
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) if !n.is_nan() => Some(*n),
            FieldValue::Text(s) => extract_digits(s),
            FieldValue::List(items) if items.len() == 1 => extract_digits(&items[0]),
            _ => None,
        }
    }

    /// Textual items of the value; scalars yield a single item
    pub fn text_items(&self) -> Vec<String> {
        match self {
            FieldValue::Null => Vec::new(),
            FieldValue::Bool(b) => vec![b.to_string()],
            FieldValue::Number(n) => vec![format_number(*n)],
            FieldValue::Text(s) => vec![s.clone()],
            FieldValue::List(items) => items.clone(),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

impl From<Vec<&str>> for FieldValue {
    fn from(items: Vec<&str>) -> Self {
        FieldValue::List(items.into_iter().map(str::to_string).collect())
    }
}

fn extract_digits(s: &str) -> Option<f64> {
    let digits: String = s.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        None
    } else {
        digits.parse::<f64>().ok()
    }
}

/// Integral numbers print without a trailing ".0"
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Structured attributes of one respondent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelRecord {
    pub id: PanelId,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl PanelRecord {
    pub fn new(id: impl Into<PanelId>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter
    #[must_use]
    pub fn with(mut self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }
}
