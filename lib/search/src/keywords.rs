//! Objective keyword filter builder
//!
//! Older classifier output carries flat objective keywords ("서울", "30대",
//! "여성", "직장인") instead of structured filters. [`KeywordFilterBuilder`]
//! turns them into [`StructuredFilter`]s understood by the evaluator and
//! reports the keywords it could not place.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use panelx_core::{Error, FilterOperator, Result, SearchMode, SearchQuery, SemanticCondition, StructuredFilter};

use crate::vocabulary::{push_unique, FilterVocabulary, REGION_FIELD};

const REGIONS: &str = "서울|경기|인천|부산|대구|대전|광주|울산|세종|강원|충북|충남|전북|전남|경북|경남|제주";

const JOBS: &[&str] = &["사무직", "전문직", "경영관리직", "생산노무직", "서비스직", "판매직", "기술직", "직장인"];
const EDUCATION: &[&str] = &["대학교 졸업", "대학원 재학 이상", "고등학교 졸업 이하", "중학교 졸업 이하"];
const JOB_DUTIES: &[&str] = &["it", "개발", "기획", "마케팅", "디자인", "영업", "연구"];
const PHONE_BRANDS: &[(&str, &str)] = &[
    ("아이폰", "Apple"), ("애플", "Apple"), ("apple", "Apple"), ("iphone", "Apple"),
    ("삼성", "Samsung"), ("갤럭시", "Samsung"), ("samsung", "Samsung"), ("galaxy", "Samsung"),
    ("lg", "LG"),
];
const CAR_MAKERS: &[(&str, &str)] = &[
    ("현대", "현대"), ("현대차", "현대"), ("hyundai", "현대"),
    ("기아", "기아"), ("kia", "기아"),
    ("bmw", "BMW"), ("테슬라", "테슬라"), ("tesla", "테슬라"),
];
const DRINKERS: &[&str] = &["술먹는", "음주", "술", "맥주", "소주", "와인", "drinker", "drinkers", "drinking"];
const ABSTAINERS: &[&str] = &["술안먹는", "금주", "non-drinker", "non-drinkers"];
const SMOKERS: &[&str] = &["흡연", "흡연자", "담배", "smoker", "smokers", "smoking"];
const NON_SMOKERS: &[&str] = &["비흡연", "비흡연자", "금연", "non-smoker", "non-smokers"];
const CAR_OWNERS: &[&str] = &["차있음", "자가용", "차량보유", "car owner", "car owners"];
const NO_CAR: &[&str] = &["차없음", "차량미보유", "no car"];

/// Output of [`KeywordFilterBuilder::build`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeywordFilters {
    pub filters: Vec<StructuredFilter>,
    /// Keywords none of whose expansions produced a filter, in input order
    pub unhandled: Vec<String>,
}

/// Classifier output that carries flat objective keywords
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegacyQuery {
    #[serde(default)]
    pub objective_keywords: Vec<String>,
    #[serde(default)]
    pub semantic_conditions: Vec<SemanticCondition>,
    #[serde(default)]
    pub target_field: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl LegacyQuery {
    /// Converts the keywords into structured filters; keywords no rule
    /// claims are logged and dropped.
    pub fn into_query(self, builder: &KeywordFilterBuilder, mode: SearchMode) -> SearchQuery {
        let converted = builder.build(&self.objective_keywords);
        if !converted.unhandled.is_empty() {
            warn!(unhandled = ?converted.unhandled, "Objective keywords without a filter rule");
        }
        SearchQuery {
            structured_filters: converted.filters,
            semantic_conditions: self.semantic_conditions,
            target_field: self.target_field,
            limit: self.limit,
            mode,
        }
    }
}

pub struct KeywordFilterBuilder {
    vocabulary: Arc<FilterVocabulary>,
    region: Regex,
    age_range: Regex,
    age_decade: Regex,
    family: Regex,
}

/// Per-call accumulator; grouped keywords merge into one filter each
#[derive(Default)]
struct Collected {
    filters: Vec<StructuredFilter>,
    regions: Vec<String>,
    ages: Vec<String>,
    jobs: Vec<String>,
    incomes: Vec<String>,
    educations: Vec<String>,
    duties: Vec<String>,
    phones: Vec<String>,
    cars: Vec<String>,
}

impl KeywordFilterBuilder {
    pub fn new(vocabulary: Arc<FilterVocabulary>) -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| Error::InvalidConfig(format!("keyword pattern: {e}")))
        };
        Ok(Self {
            vocabulary,
            region: compile(&format!(r"^({REGIONS})(시|도|특별시|광역시)?$"))?,
            age_range: compile(r"^(\d{1,2})\s*~\s*(\d{1,2})\s*(대|s)$")?,
            age_decade: compile(r"^\d{1,2}\s*(대|s)(\s*(초반|중반|후반|이상|early|mid|late|\+))?$")?,
            family: compile(r"(\d+)")?,
        })
    }

    pub fn build(&self, keywords: &[String]) -> KeywordFilters {
        let mut collected = Collected::default();
        let mut unhandled = Vec::new();

        for keyword in keywords {
            let trimmed = keyword.trim();
            if trimmed.is_empty() {
                continue;
            }
            let expansions = self.vocabulary.expand_categories(&[trimmed.to_string()]);
            let mut handled = false;
            for expansion in &expansions {
                handled |= self.place(expansion, &mut collected);
            }
            if !handled {
                push_unique(&mut unhandled, trimmed.to_string());
            }
        }

        let filters = collected.finish();
        debug!(keywords = keywords.len(), filters = filters.len(), unhandled = unhandled.len(), "Keywords converted");
        KeywordFilters { filters, unhandled }
    }

    /// Places one keyword; false when no rule claims it
    fn place(&self, keyword: &str, out: &mut Collected) -> bool {
        let lowered = keyword.trim().to_lowercase();

        if let Some(region) = self.region_of(keyword) {
            push_unique(&mut out.regions, region);
            return true;
        }
        if let Some(ages) = self.age_labels(&lowered) {
            ages.into_iter().for_each(|a| push_unique(&mut out.ages, a));
            return true;
        }
        if let Some(gender) = self.gender_of(&lowered) {
            out.filters.push(StructuredFilter::new("gender", FilterOperator::Eq, json!(gender)));
            return true;
        }
        if JOBS.contains(&lowered.as_str()) {
            push_unique(&mut out.jobs, keyword.trim().to_string());
            return true;
        }
        if keyword.contains('월') && keyword.contains("만원") {
            push_unique(&mut out.incomes, keyword.trim().to_string());
            return true;
        }
        if EDUCATION.contains(&lowered.as_str()) {
            push_unique(&mut out.educations, keyword.trim().to_string());
            return true;
        }
        if let Some(filter) = marital_filter(&lowered) {
            out.filters.push(filter);
            return true;
        }
        if let Some(filter) = habit_filter(&lowered) {
            out.filters.push(filter);
            return true;
        }
        if CAR_OWNERS.contains(&lowered.as_str()) {
            out.filters.push(StructuredFilter::new("car_ownership", FilterOperator::Eq, json!("있다")));
            return true;
        }
        if NO_CAR.contains(&lowered.as_str()) {
            out.filters.push(StructuredFilter::new("car_ownership", FilterOperator::Eq, json!("없다")));
            return true;
        }
        if let Some(filter) = self.family_filter(&lowered) {
            out.filters.push(filter);
            return true;
        }
        let duty = lowered.replace("직무", "").replace('가', "");
        if JOB_DUTIES.contains(&duty.trim()) {
            push_unique(&mut out.duties, duty.trim().to_string());
            return true;
        }
        if let Some((_, brand)) = PHONE_BRANDS.iter().find(|(k, _)| *k == lowered) {
            push_unique(&mut out.phones, brand.to_string());
            return true;
        }
        if let Some((_, maker)) = CAR_MAKERS.iter().find(|(k, _)| *k == lowered) {
            push_unique(&mut out.cars, maker.to_string());
            return true;
        }
        false
    }

    fn region_of(&self, keyword: &str) -> Option<String> {
        if let Some(caps) = self.region.captures(keyword.trim()) {
            return caps.get(1).map(|m| m.as_str().to_string());
        }
        // English names translate through the vocabulary
        let translated = self.vocabulary.translate(REGION_FIELD, &[keyword.to_string()]);
        translated
            .into_iter()
            .next()
            .filter(|r| self.region.is_match(r))
    }

    /// Age-group labels understood by the evaluator ("30대", "20대 후반")
    fn age_labels(&self, lowered: &str) -> Option<Vec<String>> {
        if let Some(caps) = self.age_range.captures(lowered) {
            let start: u32 = caps.get(1)?.as_str().parse().ok()?;
            let end: u32 = caps.get(2)?.as_str().parse().ok()?;
            let (start, end) = (start.min(end), start.max(end));
            return Some((start..=end).step_by(10).map(|d| format!("{d}대")).collect());
        }
        if self.age_decade.is_match(lowered) {
            return Some(vec![lowered.replace('s', "대")]);
        }
        None
    }

    fn gender_of(&self, lowered: &str) -> Option<&'static str> {
        let translated = self.vocabulary.translate("gender", &[lowered.to_string()]);
        match translated.first().map(String::as_str) {
            Some("M") => Some("M"),
            Some("F") => Some("F"),
            _ => None,
        }
    }

    fn family_filter(&self, lowered: &str) -> Option<StructuredFilter> {
        if !lowered.contains("가족") {
            return None;
        }
        let n: u32 = self.family.captures(lowered)?.get(1)?.as_str().parse().ok()?;
        let operator = if lowered.contains("이상") {
            FilterOperator::Gte
        } else if lowered.contains("이하") {
            FilterOperator::Lte
        } else {
            FilterOperator::Eq
        };
        Some(StructuredFilter::new("family_size", operator, json!(n)))
    }
}

fn marital_filter(lowered: &str) -> Option<StructuredFilter> {
    let (operator, value) = match lowered {
        "미혼" | "싱글" | "single" => (FilterOperator::Eq, "미혼"),
        "기혼" | "결혼" | "married" => (FilterOperator::Eq, "기혼"),
        "이혼" | "돌싱" | "사별" | "divorced" | "widowed" => (FilterOperator::Like, "기타"),
        _ => return None,
    };
    Some(StructuredFilter::new("marital_status", operator, json!(value)))
}

fn habit_filter(lowered: &str) -> Option<StructuredFilter> {
    let (field, operator, value) = if DRINKERS.contains(&lowered) {
        ("drinking_experience", FilterOperator::NotNull, Value::Null)
    } else if ABSTAINERS.contains(&lowered) {
        ("drinking_experience", FilterOperator::Like, json!("마시지 않"))
    } else if SMOKERS.contains(&lowered) {
        ("smoking_experience", FilterOperator::NotNull, Value::Null)
    } else if NON_SMOKERS.contains(&lowered) {
        ("smoking_experience", FilterOperator::Like, json!("피우지 않"))
    } else {
        return None;
    };
    Some(StructuredFilter::new(field, operator, value))
}

fn grouped(field: &str, values: Vec<String>) -> Option<StructuredFilter> {
    match values.len() {
        0 => None,
        1 => Some(StructuredFilter::new(field, FilterOperator::Eq, json!(values[0]))),
        _ => Some(StructuredFilter::new(field, FilterOperator::In, json!(values))),
    }
}

impl Collected {
    fn finish(self) -> Vec<StructuredFilter> {
        let mut filters = self.filters;
        filters.extend(
            [
                grouped("region", self.regions),
                grouped("age", self.ages),
                grouped("job", self.jobs),
                grouped("income", self.incomes),
                grouped("education", self.educations),
                grouped("duty", self.duties),
                grouped("phone", self.phones),
                grouped("car_manufacturer_raw", self.cars),
            ]
            .into_iter()
            .flatten(),
        );
        filters
    }
}
