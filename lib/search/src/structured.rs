//! Structured filter evaluator
//!
//! Compiles classifier filters into the attribute-store predicate language
//! and evaluates them. Filters that cannot be understood are dropped with a
//! warning; the rest are AND-ed together.

use chrono::Datelike;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use panelx_core::panel::format_number;
use panelx_core::{
    AttributeStore, CandidateSet, Condition, Error, FieldCatalog, FilterOperator, Result, StructuredFilter,
};

use crate::vocabulary::{push_unique, FilterVocabulary, AGE_FIELD, REGION_FIELD, REGION_RAW_FIELD};

/// Oldest age treated as an age rather than a birth year
const MAX_AGE: f64 = 150.0;
/// Income values below this are read as units of 10,000 KRW (만원)
const MANWON_CUTOFF: f64 = 10_000.0;

pub struct StructuredFilterEvaluator {
    store: Arc<dyn AttributeStore>,
    catalog: Arc<FieldCatalog>,
    vocabulary: Arc<FilterVocabulary>,
    reference_year: i32,
}

impl StructuredFilterEvaluator {
    pub fn new(
        store: Arc<dyn AttributeStore>,
        catalog: Arc<FieldCatalog>,
        vocabulary: Arc<FilterVocabulary>,
        reference_year: Option<i32>,
    ) -> Self {
        Self {
            store,
            catalog,
            vocabulary,
            reference_year: reference_year.unwrap_or_else(|| chrono::Local::now().year()),
        }
    }

    pub fn reference_year(&self) -> i32 {
        self.reference_year
    }

    /// Ids matching every understood filter. Never fails: an empty filter
    /// list, all filters dropped or a store failure all yield an empty set.
    pub async fn evaluate(&self, filters: &[StructuredFilter]) -> CandidateSet {
        match self.try_evaluate(filters).await {
            Ok(set) => set,
            Err(e) => {
                warn!(error = %e, "Attribute store failed; structured source contributes nothing");
                CandidateSet::new()
            }
        }
    }

    /// Like [`evaluate`](Self::evaluate) but surfaces store failures
    pub async fn try_evaluate(&self, filters: &[StructuredFilter]) -> Result<CandidateSet> {
        let Some(predicate) = self.compile(filters) else {
            return Ok(CandidateSet::new());
        };
        let ids = self
            .store
            .query_by_predicates(&predicate)
            .await
            .map_err(|e| match e {
                Error::SourceUnavailable { .. } => e,
                other => Error::unavailable("attribute_store", other),
            })?;
        info!(filters = filters.len(), matched = ids.len(), "Structured filters evaluated");
        Ok(CandidateSet::from_ids(ids))
    }

    /// AND of every compilable filter, or `None` when nothing survives
    pub fn compile(&self, filters: &[StructuredFilter]) -> Option<Condition> {
        let conditions: Vec<Condition> = filters
            .iter()
            .filter_map(|filter| match self.compile_one(filter) {
                Ok(condition) => Some(condition),
                Err(e) => {
                    warn!(error = %e, "Dropping structured filter");
                    None
                }
            })
            .collect();

        match conditions.len() {
            0 => None,
            1 => conditions.into_iter().next(),
            _ => Some(Condition::And(conditions)),
        }
    }

    pub fn compile_one(&self, filter: &StructuredFilter) -> Result<Condition> {
        let raw_field = filter.field.trim();
        let field = self.vocabulary.canonical_field(raw_field).to_string();
        if !self.catalog.contains(&field) {
            return Err(Error::malformed(raw_field, "unknown field"));
        }
        debug!(field = %field, operator = ?filter.operator, "Compiling filter");

        match &filter.operator {
            FilterOperator::NotNull => Ok(Condition::NotNullExcluding {
                pattern: self.vocabulary.negative_pattern(&field).clone(),
                field,
            }),
            FilterOperator::NotNullExcluding(pattern) => {
                let pattern = Regex::new(pattern).map_err(|e| Error::malformed(&field, e.to_string()))?;
                Ok(Condition::NotNullExcluding { field, pattern })
            }
            _ if field == AGE_FIELD => self.compile_age(&field, filter),
            _ if field == REGION_FIELD => self.compile_region(&field, filter),
            _ if self.vocabulary.is_income(&field) => self.compile_income(&field, filter),
            _ if self.vocabulary.is_numeric(&field) => compile_numeric(&field, filter),
            _ => self.compile_text(&field, filter),
        }
    }

    /// Translated and category-expanded textual values
    fn text_values(&self, field: &str, filter: &StructuredFilter) -> Result<Vec<String>> {
        let raw = value_items(&filter.value);
        if raw.is_empty() {
            return Err(Error::malformed(field, "no value"));
        }
        let translated = self.vocabulary.translate(field, &raw);
        Ok(self.vocabulary.expand_categories(&translated))
    }

    fn compile_text(&self, field: &str, filter: &StructuredFilter) -> Result<Condition> {
        let values = self.text_values(field, filter)?;
        let substring = filter.operator == FilterOperator::Like || self.vocabulary.is_substring_field(field);

        match filter.operator {
            FilterOperator::Eq | FilterOperator::In | FilterOperator::Like if substring => {
                Ok(any_of(values.into_iter().map(|needle| Condition::Contains {
                    field: field.to_string(),
                    needle,
                })))
            }
            FilterOperator::Eq | FilterOperator::In => Ok(match values.len() {
                1 => Condition::Equals {
                    field: field.to_string(),
                    value: values.into_iter().next().unwrap_or_default(),
                },
                _ => Condition::AnyOf {
                    field: field.to_string(),
                    values,
                },
            }),
            _ => Err(Error::malformed(field, format!("operator {:?} needs a numeric field", filter.operator))),
        }
    }

    fn compile_region(&self, field: &str, filter: &StructuredFilter) -> Result<Condition> {
        match filter.operator {
            FilterOperator::Eq | FilterOperator::In | FilterOperator::Like => {
                let values = self.text_values(field, filter)?;
                Ok(any_of(values.into_iter().flat_map(|v| {
                    [
                        Condition::Equals {
                            field: field.to_string(),
                            value: v.clone(),
                        },
                        Condition::LeadingToken {
                            field: REGION_RAW_FIELD.to_string(),
                            value: v,
                        },
                    ]
                })))
            }
            _ => Err(Error::malformed(field, "regions only support eq, in and like")),
        }
    }

    fn compile_income(&self, field: &str, filter: &StructuredFilter) -> Result<Condition> {
        let labels = match filter.operator {
            FilterOperator::Gte => self.vocabulary.income_labels(income_won(field, &filter.value)?, i64::MAX),
            FilterOperator::Lte => self.vocabulary.income_labels(0, income_won(field, &filter.value)?),
            FilterOperator::Between => {
                let (lo, hi) = pair(field, &filter.value)?;
                let (lo, hi) = (to_won(lo), to_won(hi));
                self.vocabulary.income_labels(lo.min(hi), lo.max(hi))
            }
            _ => return self.compile_text(field, filter),
        };
        if labels.is_empty() {
            return Ok(Condition::Never);
        }
        Ok(Condition::AnyOf {
            field: field.to_string(),
            values: labels,
        })
    }

    fn compile_age(&self, field: &str, filter: &StructuredFilter) -> Result<Condition> {
        let year = f64::from(self.reference_year);
        match filter.operator {
            FilterOperator::Eq | FilterOperator::In | FilterOperator::Like => {
                let values = self.text_values(field, filter)?;
                let ranges = values
                    .iter()
                    .map(|v| {
                        birth_year_range(v, year)
                            .ok_or_else(|| Error::malformed(field, format!("cannot read age '{v}'")))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(any_of(ranges.into_iter().map(|(min, max)| Condition::Between {
                    field: field.to_string(),
                    min,
                    max,
                })))
            }
            FilterOperator::Between => {
                let (a, b) = pair(field, &filter.value)?;
                let (min, max) = match (is_age(a), is_age(b)) {
                    (true, true) => (year - a.max(b), year - a.min(b)),
                    (false, false) => (a.min(b), a.max(b)),
                    _ => return Err(Error::malformed(field, "mixes ages and birth years")),
                };
                Ok(Condition::Between {
                    field: field.to_string(),
                    min,
                    max,
                })
            }
            FilterOperator::Gte => {
                let v = number(field, &filter.value)?;
                Ok(if is_age(v) {
                    Condition::LessEqual { field: field.to_string(), value: year - v }
                } else {
                    Condition::GreaterEqual { field: field.to_string(), value: v }
                })
            }
            FilterOperator::Lte => {
                let v = number(field, &filter.value)?;
                Ok(if is_age(v) {
                    Condition::GreaterEqual { field: field.to_string(), value: year - v }
                } else {
                    Condition::LessEqual { field: field.to_string(), value: v }
                })
            }
            FilterOperator::NotNull | FilterOperator::NotNullExcluding(_) => {
                Err(Error::malformed(field, "handled before age compilation"))
            }
        }
    }
}

fn compile_numeric(field: &str, filter: &StructuredFilter) -> Result<Condition> {
    let field_name = field.to_string();
    match filter.operator {
        FilterOperator::Eq | FilterOperator::In => {
            let values: Vec<f64> = value_items(&filter.value).iter().filter_map(|v| parse_number(v)).collect();
            if values.is_empty() {
                return Err(Error::malformed(field, "expects numeric values"));
            }
            Ok(any_of(values.into_iter().map(|v| Condition::Between {
                field: field_name.clone(),
                min: v,
                max: v,
            })))
        }
        FilterOperator::Gte => Ok(Condition::GreaterEqual {
            field: field_name,
            value: number(field, &filter.value)?,
        }),
        FilterOperator::Lte => Ok(Condition::LessEqual {
            field: field_name,
            value: number(field, &filter.value)?,
        }),
        FilterOperator::Between => {
            let (a, b) = pair(field, &filter.value)?;
            Ok(Condition::Between {
                field: field_name,
                min: a.min(b),
                max: a.max(b),
            })
        }
        _ => Err(Error::malformed(field, format!("operator {:?} unsupported on counts", filter.operator))),
    }
}

/// Single condition or a disjunction; an empty input never matches
fn any_of<I: IntoIterator<Item = Condition>>(conditions: I) -> Condition {
    let mut conditions: Vec<Condition> = conditions.into_iter().collect();
    match conditions.len() {
        0 => Condition::Never,
        1 => conditions.remove(0),
        _ => Condition::Or(conditions),
    }
}

/// Flattens a JSON value into its textual scalars
pub fn value_items(value: &Value) -> Vec<String> {
    let mut items = Vec::new();
    collect_items(value, &mut items);
    items
}

fn collect_items(value: &Value, items: &mut Vec<String>) {
    match value {
        Value::Null => {}
        Value::Bool(b) => push_unique(items, b.to_string()),
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                push_unique(items, format_number(f));
            }
        }
        Value::String(s) if !s.trim().is_empty() => push_unique(items, s.trim().to_string()),
        Value::String(_) => {}
        Value::Array(values) => values.iter().for_each(|v| collect_items(v, items)),
        Value::Object(_) => {}
    }
}

fn parse_number(s: &str) -> Option<f64> {
    let cleaned: String = s.chars().filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-').collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn number(field: &str, value: &Value) -> Result<f64> {
    let items = value_items(value);
    match items.as_slice() {
        [single] => parse_number(single).ok_or_else(|| Error::malformed(field, format!("'{single}' is not a number"))),
        _ => Err(Error::malformed(field, "expects a single number")),
    }
}

fn pair(field: &str, value: &Value) -> Result<(f64, f64)> {
    let items: Vec<f64> = match value {
        Value::Array(values) => values
            .iter()
            .map(|v| number(field, v))
            .collect::<Result<Vec<_>>>()?,
        _ => Vec::new(),
    };
    match items.as_slice() {
        [a, b] => Ok((*a, *b)),
        _ => Err(Error::malformed(field, "between expects exactly two values")),
    }
}

#[inline]
fn is_age(v: f64) -> bool {
    (0.0..=MAX_AGE).contains(&v)
}

fn to_won(v: f64) -> i64 {
    if v < MANWON_CUTOFF {
        (v * 10_000.0) as i64
    } else {
        v as i64
    }
}

fn income_won(field: &str, value: &Value) -> Result<i64> {
    number(field, value).map(to_won)
}

/// Birth-year range for an age expression: "30대", "30s", "30대 초반",
/// "60대 이상", a plain age or a four-digit birth year.
pub fn birth_year_range(expr: &str, year: f64) -> Option<(f64, f64)> {
    let expr = expr.trim().to_lowercase();
    let digits: String = expr.chars().take_while(char::is_ascii_digit).collect();
    let n: f64 = digits.parse().ok()?;
    let rest = expr[digits.len()..].trim();

    if digits.len() == 4 && !is_age(n) {
        return Some((n, n));
    }
    if rest.is_empty() || rest == "세" || rest == "살" {
        return Some((year - n, year - n));
    }

    let decade = rest.starts_with('대') || rest.starts_with('s');
    if !decade {
        return None;
    }
    let (lo, hi) = if rest.contains("이상") || rest.contains("+") || rest.contains("over") {
        (n, MAX_AGE)
    } else if rest.contains("초반") || rest.contains("early") {
        (n, n + 3.0)
    } else if rest.contains("중반") || rest.contains("mid") {
        (n + 4.0, n + 6.0)
    } else if rest.contains("후반") || rest.contains("late") {
        (n + 7.0, n + 9.0)
    } else {
        (n, n + 9.0)
    };
    Some((year - hi, year - lo))
}

#[cfg(test)]
mod tests {
    use super::*;
    use panelx_core::{Filter, PanelId, PanelRecord};
    use panelx_storage::MemoryAttributeStore;
    use serde_json::json;

    const YEAR: i32 = 2025;

    fn filter(field: &str, operator: FilterOperator, value: Value) -> StructuredFilter {
        StructuredFilter::new(field, operator, value)
    }

    fn evaluator(records: Vec<PanelRecord>) -> StructuredFilterEvaluator {
        StructuredFilterEvaluator::new(
            Arc::new(MemoryAttributeStore::with_records(records)),
            Arc::new(FieldCatalog::builtin()),
            Arc::new(FilterVocabulary::builtin().unwrap()),
            Some(YEAR),
        )
    }

    fn panels() -> Vec<PanelRecord> {
        vec![
            PanelRecord::new("w1")
                .with("gender", "F")
                .with("birth_year", 1992.0)
                .with("region_major", "서울")
                .with("job_title_raw", "사무직 (마케팅)")
                .with("income_personal_monthly", "월 500~599만원")
                .with("family_size", "4명")
                .with("children_count", "0명")
                .with("drinking_experience", vec!["소주", "맥주"]),
            PanelRecord::new("w2")
                .with("gender", "여")
                .with("birth_year", "1988년")
                .with("region", "서울 중구")
                .with("income_personal_monthly", "월 200~299만원")
                .with("family_size", "2명")
                .with("children_count", "2명")
                .with("drinking_experience", "최근 1년 이내 술을 마시지 않음"),
            PanelRecord::new("w3")
                .with("gender", "M")
                .with("birth_year", 1975.0)
                .with("region_major", "부산")
                .with("job_title_raw", "자영업")
                .with("family_size", "3명"),
        ]
    }

    fn ids(set: &CandidateSet) -> Vec<String> {
        let mut ids: Vec<String> = set.panel_ids.iter().map(PanelId::to_string).collect();
        ids.sort();
        ids
    }

    #[tokio::test]
    async fn test_empty_filters_yield_empty_set() {
        let eval = evaluator(panels());
        assert!(eval.evaluate(&[]).await.is_empty());
    }

    #[tokio::test]
    async fn test_gender_translation_matches_both_spellings() {
        let eval = evaluator(panels());
        let set = eval.evaluate(&[filter("gender", FilterOperator::Eq, json!("여성"))]).await;
        assert_eq!(ids(&set), vec!["w1", "w2"]);
    }

    #[tokio::test]
    async fn test_age_between_and_region() {
        let eval = evaluator(panels());
        // ages 30..=39 in 2025 are birth years 1986..=1995
        let set = eval
            .evaluate(&[
                filter("age", FilterOperator::Between, json!([30, 39])),
                filter("region", FilterOperator::Eq, json!("서울")),
            ])
            .await;
        assert_eq!(ids(&set), vec!["w1", "w2"]);
    }

    #[tokio::test]
    async fn test_decade_labels_and_categories() {
        let eval = evaluator(panels());
        let set = eval.evaluate(&[filter("age", FilterOperator::In, json!(["젊은층"]))]).await;
        assert_eq!(ids(&set), vec!["w1", "w2"]);
        let set = eval.evaluate(&[filter("age", FilterOperator::Eq, json!("40대"))]).await;
        assert!(set.is_empty());
        let set = eval.evaluate(&[filter("age", FilterOperator::Eq, json!("50대"))]).await;
        assert_eq!(ids(&set), vec!["w3"]);
    }

    #[tokio::test]
    async fn test_income_buckets() {
        let eval = evaluator(panels());
        let set = eval.evaluate(&[filter("income", FilterOperator::Gte, json!(5_000_000))]).await;
        assert_eq!(ids(&set), vec!["w1"]);
        // 만원 units
        let set = eval.evaluate(&[filter("income", FilterOperator::Lte, json!(300))]).await;
        assert_eq!(ids(&set), vec!["w2"]);
        let set = eval.evaluate(&[filter("income", FilterOperator::Eq, json!("고소득"))]).await;
        assert_eq!(ids(&set), vec!["w1"]);
    }

    #[tokio::test]
    async fn test_fuzzy_and_numeric_fields() {
        let eval = evaluator(panels());
        let set = eval.evaluate(&[filter("job", FilterOperator::Eq, json!("직장인"))]).await;
        assert_eq!(ids(&set), vec!["w1"]);
        let set = eval.evaluate(&[filter("family_size", FilterOperator::Gte, json!(3))]).await;
        assert_eq!(ids(&set), vec!["w1", "w3"]);
        let set = eval.evaluate(&[filter("family_size", FilterOperator::In, json!(["2", "3명"]))]).await;
        assert_eq!(ids(&set), vec!["w2", "w3"]);
    }

    #[tokio::test]
    async fn test_not_null_excludes_negative_answers() {
        let eval = evaluator(panels());
        let set = eval.evaluate(&[filter("drinking_experience", FilterOperator::NotNull, Value::Null)]).await;
        assert_eq!(ids(&set), vec!["w1"]);
        let set = eval.evaluate(&[filter("children_count", FilterOperator::NotNull, Value::Null)]).await;
        assert_eq!(ids(&set), vec!["w2"]);
    }

    #[tokio::test]
    async fn test_malformed_filters_are_dropped() {
        let eval = evaluator(panels());
        let gender = filter("gender", FilterOperator::Eq, json!("M"));
        let set = eval
            .evaluate(&[
                gender.clone(),
                filter("shoe_size", FilterOperator::Eq, json!(270)),
                filter("age", FilterOperator::Between, json!([30])),
            ])
            .await;
        assert_eq!(ids(&set), vec!["w3"]);

        // nothing understood: empty, not everything
        let set = eval.evaluate(&[filter("shoe_size", FilterOperator::Eq, json!(270))]).await;
        assert!(set.is_empty());
        assert!(eval.compile(&[filter("gender", FilterOperator::Gte, json!(1))]).is_none());
    }

    #[tokio::test]
    async fn test_evaluate_is_pure_conjunction() {
        let eval = evaluator(panels());
        let filters = vec![
            filter("gender", FilterOperator::Eq, json!("F")),
            filter("family_size", FilterOperator::Lte, json!(3)),
        ];
        let predicate = eval.compile(&filters).unwrap();
        let expected: Vec<String> = panels()
            .into_iter()
            .filter(|r| predicate.matches(r))
            .map(|r| r.id.to_string())
            .collect();
        assert_eq!(ids(&eval.evaluate(&filters).await), expected);
        assert_eq!(expected, vec!["w2"]);
    }

    #[test]
    fn test_birth_year_range() {
        let y = 2025.0;
        assert_eq!(birth_year_range("30대", y), Some((1986.0, 1995.0)));
        assert_eq!(birth_year_range("30s", y), Some((1986.0, 1995.0)));
        assert_eq!(birth_year_range("30대 초반", y), Some((1992.0, 1995.0)));
        assert_eq!(birth_year_range("20대 후반", y), Some((1996.0, 1998.0)));
        assert_eq!(birth_year_range("60대 이상", y), Some((1875.0, 1965.0)));
        assert_eq!(birth_year_range("1990", y), Some((1990.0, 1990.0)));
        assert_eq!(birth_year_range("35", y), Some((1990.0, 1990.0)));
        assert_eq!(birth_year_range("젊은", y), None);
    }
}
