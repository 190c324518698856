//! Filter vocabulary
//!
//! Tables that turn classifier output into attribute-store values: field
//! aliases, value translations, category expansion, income buckets, field
//! families and negative-answer patterns.

use regex::Regex;
use std::collections::{HashMap, HashSet};

use panelx_core::{Error, Result};

pub const AGE_FIELD: &str = "birth_year";
pub const REGION_FIELD: &str = "region_major";
/// Free-form region answer ("서울 중구") matched by its leading token
pub const REGION_RAW_FIELD: &str = "region";

const ALIASES: &[(&str, &str)] = &[
    ("age", AGE_FIELD),
    ("region", REGION_FIELD),
    ("city", "region_minor"),
    ("district", "region_minor"),
    ("income", "income_personal_monthly"),
    ("personal_income", "income_personal_monthly"),
    ("household_income", "income_household_monthly"),
    ("job", "job_title_raw"),
    ("occupation", "job_title_raw"),
    ("duty", "job_duty_raw"),
    ("education", "education_level"),
    ("phone", "phone_brand_raw"),
    ("car", "car_ownership"),
    ("smoking", "smoking_experience"),
    ("drinking", "drinking_experience"),
    ("marital", "marital_status"),
    ("children", "children_count"),
];

/// raw value -> stored value, per field
const TRANSLATIONS: &[(&str, &[(&str, &str)])] = &[
    (
        "gender",
        &[
            ("남", "M"), ("남성", "M"), ("남자", "M"), ("male", "M"), ("man", "M"), ("men", "M"), ("m", "M"),
            ("여", "F"), ("여성", "F"), ("여자", "F"), ("female", "F"), ("woman", "F"), ("women", "F"), ("f", "F"),
        ],
    ),
    (
        "marital_status",
        &[
            ("미혼", "미혼"), ("싱글", "미혼"), ("single", "미혼"), ("unmarried", "미혼"),
            ("기혼", "기혼"), ("결혼", "기혼"), ("married", "기혼"),
            ("기타", "기타(사별/이혼 등)"), ("이혼", "기타(사별/이혼 등)"), ("사별", "기타(사별/이혼 등)"),
        ],
    ),
    (
        "car_ownership",
        &[
            ("있음", "있다"), ("보유", "있다"), ("있다", "있다"), ("yes", "있다"), ("true", "있다"),
            ("없음", "없다"), ("미보유", "없다"), ("없다", "없다"), ("no", "없다"), ("false", "없다"),
        ],
    ),
    (
        REGION_FIELD,
        &[
            ("seoul", "서울"), ("gyeonggi", "경기"), ("incheon", "인천"), ("busan", "부산"),
            ("daegu", "대구"), ("daejeon", "대전"), ("gwangju", "광주"), ("ulsan", "울산"),
            ("sejong", "세종"), ("gangwon", "강원"), ("jeju", "제주"),
        ],
    ),
];

const CATEGORIES: &[(&str, &[&str])] = &[
    ("직장인", &["사무직", "전문직", "경영관리직", "생산노무직", "서비스직", "판매직", "기술직"]),
    ("office worker", &["사무직", "전문직", "경영관리직", "생산노무직", "서비스직", "판매직", "기술직"]),
    ("고소득", &["월 500~599만원", "월 600~699만원", "월 700만원 이상"]),
    ("고소득자", &["월 500~599만원", "월 600~699만원", "월 700만원 이상"]),
    ("high income", &["월 500~599만원", "월 600~699만원", "월 700만원 이상"]),
    ("중산층", &["월 300~399만원", "월 400~499만원"]),
    ("middle income", &["월 300~399만원", "월 400~499만원"]),
    ("저소득", &["월 100만원 미만", "월 100~199만원", "월 200~299만원"]),
    ("저소득자", &["월 100만원 미만", "월 100~199만원", "월 200~299만원"]),
    ("low income", &["월 100만원 미만", "월 100~199만원", "월 200~299만원"]),
    ("고학력", &["대학교 졸업", "대학원 재학 이상"]),
    ("저학력", &["고등학교 졸업 이하", "중학교 졸업 이하"]),
    ("젊은층", &["20대", "30대"]),
    ("청년", &["20대", "30대"]),
    ("mz세대", &["20대", "30대"]),
    ("young adults", &["20대", "30대"]),
    ("중장년층", &["40대", "50대"]),
    ("x세대", &["40대", "50대"]),
    ("장년층", &["50대", "60대"]),
    ("베이비부머", &["50대", "60대 이상"]),
    ("노년층", &["60대 이상"]),
    ("seniors", &["60대 이상"]),
    ("청소년", &["10대"]),
    ("아이폰 사용자", &["Apple"]),
];

/// Monthly income in KRW, inclusive on both ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomeBucket {
    pub min: i64,
    pub max: i64,
    pub label: String,
}

const INCOME_BUCKETS: &[(i64, i64, &str)] = &[
    (0, 999_999, "월 100만원 미만"),
    (1_000_000, 1_999_999, "월 100~199만원"),
    (2_000_000, 2_999_999, "월 200~299만원"),
    (3_000_000, 3_999_999, "월 300~399만원"),
    (4_000_000, 4_999_999, "월 400~499만원"),
    (5_000_000, 5_999_999, "월 500~599만원"),
    (6_000_000, 6_999_999, "월 600~699만원"),
    (7_000_000, i64::MAX, "월 700만원 이상"),
];

const INCOME_FIELDS: &[&str] = &["income_personal_monthly", "income_household_monthly"];

/// Free-form text matched by substring
const FUZZY_FIELDS: &[&str] = &[
    "job_title_raw",
    "job_duty_raw",
    "region_minor",
    "phone_brand_raw",
    "phone_model_raw",
    "car_manufacturer_raw",
    "car_model_raw",
    "owned_electronics",
    "smoking_brand",
];

/// Multi-select answers stored as lists
const LIST_FIELDS: &[&str] = &["drinking_experience", "smoking_experience", "e_cigarette_experience"];

/// Counts stored as text ("4명") compared by their digits
const NUMERIC_FIELDS: &[&str] = &["family_size", "children_count"];

const NEGATIVE_PATTERNS: &[(&str, &str)] = &[
    ("children_count", r"^\s*0\s*(명)?\s*$|없음"),
    ("drinking_experience", r"마시지|않음|없음|비음주|금주|안\s*마심|전혀"),
    ("smoking_experience", r"피우지|않음|없음|비흡연|금연|안\s*피움"),
    ("e_cigarette_experience", r"피우지|않음|없음|비흡연|금연|경험\s*없"),
    ("ott_count", r"0개|안\s*함|없음|이용\s*안|보지\s*않음"),
    ("fast_delivery_usage", r"안\s*함|이용\s*안|없음|직접\s*구매"),
];

const DEFAULT_NEGATIVE_PATTERN: &str = r"없음|해당\s*사항|비흡연|피우지|금연";

#[derive(Debug, Clone)]
pub struct FilterVocabulary {
    aliases: HashMap<String, String>,
    translations: HashMap<String, Vec<(String, String)>>,
    categories: HashMap<String, Vec<String>>,
    income_buckets: Vec<IncomeBucket>,
    income_fields: HashSet<String>,
    fuzzy_fields: HashSet<String>,
    list_fields: HashSet<String>,
    numeric_fields: HashSet<String>,
    negative_patterns: HashMap<String, Regex>,
    default_negative: Regex,
}

fn owned_set(items: &[&str]) -> HashSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::InvalidConfig(format!("pattern '{pattern}': {e}")))
}

impl FilterVocabulary {
    pub fn builtin() -> Result<Self> {
        let negative_patterns = NEGATIVE_PATTERNS
            .iter()
            .map(|(field, pattern)| Ok((field.to_string(), compile(pattern)?)))
            .collect::<Result<HashMap<_, _>>>()?;

        Ok(Self {
            aliases: ALIASES
                .iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect(),
            translations: TRANSLATIONS
                .iter()
                .map(|(field, pairs)| {
                    (
                        field.to_string(),
                        pairs.iter().map(|(raw, norm)| (raw.to_string(), norm.to_string())).collect(),
                    )
                })
                .collect(),
            categories: CATEGORIES
                .iter()
                .map(|(key, values)| (key.to_string(), values.iter().map(|v| v.to_string()).collect()))
                .collect(),
            income_buckets: INCOME_BUCKETS
                .iter()
                .map(|(min, max, label)| IncomeBucket {
                    min: *min,
                    max: *max,
                    label: label.to_string(),
                })
                .collect(),
            income_fields: owned_set(INCOME_FIELDS),
            fuzzy_fields: owned_set(FUZZY_FIELDS),
            list_fields: owned_set(LIST_FIELDS),
            numeric_fields: owned_set(NUMERIC_FIELDS),
            negative_patterns,
            default_negative: compile(DEFAULT_NEGATIVE_PATTERN)?,
        })
    }

    /// Canonical name of a possibly aliased field
    pub fn canonical_field<'a>(&'a self, raw: &'a str) -> &'a str {
        self.aliases.get(raw).map(String::as_str).unwrap_or(raw)
    }

    pub fn is_income(&self, field: &str) -> bool {
        self.income_fields.contains(field)
    }

    /// Fields matched by case-insensitive substring
    pub fn is_substring_field(&self, field: &str) -> bool {
        self.fuzzy_fields.contains(field) || self.list_fields.contains(field)
    }

    pub fn is_numeric(&self, field: &str) -> bool {
        self.numeric_fields.contains(field)
    }

    pub fn negative_pattern(&self, field: &str) -> &Regex {
        self.negative_patterns.get(field).unwrap_or(&self.default_negative)
    }

    /// Translates raw values to stored values, then adds every raw synonym
    /// of each stored value so records written either way still match.
    pub fn translate(&self, field: &str, values: &[String]) -> Vec<String> {
        let Some(pairs) = self.translations.get(field) else {
            return values.to_vec();
        };

        let mut normalized: Vec<String> = Vec::new();
        for value in values {
            let lowered = value.trim().to_lowercase();
            let norm = pairs
                .iter()
                .find(|(raw, norm)| *raw == lowered || norm.to_lowercase() == lowered)
                .map(|(_, norm)| norm.clone())
                .unwrap_or_else(|| value.trim().to_string());
            push_unique(&mut normalized, norm);
        }

        let mut expanded = normalized.clone();
        for (raw, norm) in pairs {
            if normalized.contains(norm) {
                push_unique(&mut expanded, raw.clone());
            }
        }
        expanded
    }

    /// Replaces category words ("직장인", "고소득") by their member values
    pub fn expand_categories(&self, values: &[String]) -> Vec<String> {
        let mut expanded = Vec::with_capacity(values.len());
        for value in values {
            match self.categories.get(&value.trim().to_lowercase()) {
                Some(members) => {
                    for m in members {
                        push_unique(&mut expanded, m.clone());
                    }
                }
                None => push_unique(&mut expanded, value.clone()),
            }
        }
        expanded
    }

    /// Labels of every bucket intersecting `[min, max]`
    pub fn income_labels(&self, min: i64, max: i64) -> Vec<String> {
        self.income_buckets
            .iter()
            .filter(|b| max >= b.min && min <= b.max)
            .map(|b| b.label.clone())
            .collect()
    }
}

pub(crate) fn push_unique(values: &mut Vec<String>, value: String) {
    if !values.contains(&value) {
        values.push(value);
    }
}
