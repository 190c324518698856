// Ordered phrase -> field rules consulted before any embedding
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use panelx_core::{Error, Result};

/// How a rule pattern is compared with a lower-cased phrase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Contains,
    Pattern,
}

/// Whether a rule targets a structured attribute or a survey topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleMethod {
    StructuredRule,
    TopicRule,
}

#[derive(Debug, Clone)]
pub enum RuleMatcher {
    Exact(String),
    Contains(String),
    Pattern(Regex),
}

impl RuleMatcher {
    /// `phrase` must already be lower-cased and trimmed
    pub fn is_match(&self, phrase: &str) -> bool {
        match self {
            RuleMatcher::Exact(text) => phrase == text,
            RuleMatcher::Contains(text) => phrase.contains(text.as_str()),
            RuleMatcher::Pattern(re) => re.is_match(phrase),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub matcher: RuleMatcher,
    pub field: String,
    pub method: RuleMethod,
}

/// Serializable form of a rule, used for configuration files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub pattern: String,
    pub kind: MatchKind,
    pub field: String,
    pub method: RuleMethod,
}

impl RuleSpec {
    pub fn compile(&self) -> Result<Rule> {
        let pattern = self.pattern.trim().to_lowercase();
        if pattern.is_empty() {
            return Err(Error::InvalidConfig(format!("empty rule pattern for field '{}'", self.field)));
        }
        let matcher = match self.kind {
            MatchKind::Exact => RuleMatcher::Exact(pattern),
            MatchKind::Contains => RuleMatcher::Contains(pattern),
            MatchKind::Pattern => {
                let re = RegexBuilder::new(&self.pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| Error::InvalidConfig(format!("rule '{}': {}", self.pattern, e)))?;
                RuleMatcher::Pattern(re)
            }
        };
        Ok(Rule {
            matcher,
            field: self.field.clone(),
            method: self.method,
        })
    }
}

use MatchKind::{Contains, Exact, Pattern};

const ATTRIBUTE_RULES: &[(&str, MatchKind, &str)] = &[
    // demographics
    (r"^(여|여자|여성|female|woman|women)$", Pattern, "gender"),
    (r"^(남|남자|남성|male|man|men)$", Pattern, "gender"),
    (r"미혼|싱글|single|unmarried", Pattern, "marital_status"),
    (r"기혼|결혼|married", Pattern, "marital_status"),
    (r"\d+인\s*가구|가족\s*\d+명|\d+\s*person household|family of \d+", Pattern, "family_size"),
    (r"자녀|아이\s*있는|children|kids", Pattern, "children_count"),
    (r"\d{2}대|\d{2}s\b|연령대|age group|years old", Pattern, "birth_year"),
    (r"대졸|대학원|고졸|학력|education|graduate", Pattern, "education_level"),
    // regions
    (
        r"^(서울|경기|인천|부산|대구|대전|광주|울산|세종|강원|충북|충남|전북|전남|경북|경남|제주)(\s*에\s*사는|\s*거주자?)?$",
        Pattern,
        "region_major",
    ),
    (r"^(seoul|gyeonggi|incheon|busan|daegu|daejeon|gwangju|ulsan|sejong|jeju)$", Pattern, "region_major"),
    ("거주 지역", Contains, "region_major"),
    ("region", Exact, "region_major"),
    // occupation
    (r"직장인|사무직|전문직|경영관리직|생산노무직|서비스직|판매직|기술직|office worker", Pattern, "job_duty_raw"),
    (r"대학생|대학원생|학생|student", Pattern, "job_title_raw"),
    (r"마케팅|마케터|marketing", Pattern, "job_duty_raw"),
    (r"개발자|developer|engineer", Pattern, "job_duty_raw"),
    ("직업", Contains, "job_title_raw"),
    ("occupation", Contains, "job_title_raw"),
    // income
    (r"가구\s*소득|가족\s*소득|household income", Pattern, "income_household_monthly"),
    (r"월\s*소득|개인\s*소득|본인\s*소득|고소득|저소득|중산층|income", Pattern, "income_personal_monthly"),
    // devices
    (r"(아이폰|iphone)\s*(15|14|13|12|11|x|se)|갤럭시\s*(s|z|a|노트)\s*\d*", Pattern, "phone_model_raw"),
    (r"아이폰|애플|iphone|apple|갤럭시|삼성|galaxy|samsung", Pattern, "phone_brand_raw"),
    (r"휴대폰|스마트폰|smartphone", Pattern, "phone_brand_raw"),
    (r"가전|전자제품|electronics|appliance", Pattern, "owned_electronics"),
    // cars
    (r"차\s*없음|무소유|no car", Pattern, "car_ownership"),
    (r"차량\s*보유|자가용|car owner", Pattern, "car_ownership"),
    (r"현대|기아|제네시스|르노|쉐보레|벤츠|bmw|아우디|테슬라|tesla|볼보|렉서스|폭스바겐", Pattern, "car_manufacturer_raw"),
    (r"그랜저|쏘나타|소나타|아반떼|캐스퍼|투싼|싼타페|팰리세이드|아이오닉|k5|k8|카니발|쏘렌토|스포티지|suv|세단", Pattern, "car_model_raw"),
    // habits
    (r"전자담배|궐련형|아이코스|iqos|e-cigarette|vape", Pattern, "e_cigarette_experience"),
    (r"말보로|에쎄|레종|던힐|메비우스|팔리아멘트|담배\s*브랜드", Pattern, "smoking_brand"),
    (r"흡연|비흡연|금연|smok", Pattern, "smoking_experience"),
    (r"음주|금주|술|소주|맥주|와인|막걸리|위스키|drink|alcohol", Pattern, "drinking_experience"),
];

const TOPIC_RULES: &[(&str, MatchKind, &str)] = &[
    (r"체력\s*관리|운동|exercise|workout|fitness", Pattern, "physical_activity"),
    (r"ott|스트리밍|넷플릭스|netflix|streaming", Pattern, "ott_count"),
    (r"전통\s*시장|traditional market", Pattern, "traditional_market_freq"),
    (r"설\s*선물|명절\s*선물", Pattern, "lunar_new_year_gift_pref"),
    (r"반려동물|반려견|반려묘|pet", Pattern, "pet_experience"),
    (r"이사\s*스트레스|moving stress", Pattern, "moving_stress_factor"),
    (r"기분\s*좋아지는\s*소비|나를\s*위한\s*소비|self[- ]?spending", Pattern, "happiest_self_spending"),
    (r"사용하는\s*앱|주요\s*앱|most used app", Pattern, "most_used_app"),
    (r"스트레스\s*해소|stress relief", Pattern, "stress_relief_method"),
    (r"스트레스\s*상황|stress situation", Pattern, "stress_situation"),
    (r"피부\s*만족도|skin satisfaction", Pattern, "skin_satisfaction"),
    (r"스킨케어\s*(소비|지출)|skincare spending", Pattern, "skincare_spending"),
    (r"스킨케어\s*구매|skincare purchase", Pattern, "skincare_purchase_factor"),
    (r"ai\s*챗봇\s*(활용|용도)|chatbot purpose", Pattern, "ai_chatbot_purpose"),
    (r"ai\s*챗봇|챗봇|chatbot|chatgpt", Pattern, "ai_chatbot_used"),
    (r"해외\s*여행|overseas travel", Pattern, "overseas_travel_pref"),
    (r"여행\s*스타일|travel style|travel planning", Pattern, "travel_planning_style"),
    (r"빠른\s*배송|새벽\s*배송|당일\s*배송|fast delivery", Pattern, "fast_delivery_usage"),
    (r"여름철\s*걱정|summer worry", Pattern, "summer_worry"),
    (r"기상\s*알람|alarm", Pattern, "alarm_setting_style"),
    (r"혼밥|eating alone", Pattern, "eating_alone_frequency"),
    (r"행복한\s*노년|old age", Pattern, "happy_old_age_condition"),
    (r"다이어트|diet", Pattern, "most_effective_diet"),
    (r"야식|late[- ]night snack", Pattern, "late_night_snack_method"),
    (r"최근\s*지출|recent spending", Pattern, "recent_major_spending"),
    (r"ai\s*서비스|ai service", Pattern, "ai_service_usage_area"),
    (r"미니멀리스트|맥시멀리스트|minimalis|maximalis", Pattern, "minimalist_maximalist"),
    (r"비닐봉투|plastic bag", Pattern, "plastic_bag_reduction_effort"),
    (r"포인트\s*적립|캐시백|cashback|membership points", Pattern, "point_benefit_attention"),
    (r"개인정보\s*보호|privacy", Pattern, "personal_info_protection_habit"),
    (r"갤러리\s*사진|photo gallery", Pattern, "most_saved_photo_type"),
];

/// Ordered rule list; the first matching rule wins
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: Vec<Rule>,
}

impl RuleTable {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn from_specs(specs: &[RuleSpec]) -> Result<Self> {
        let rules = specs.iter().map(RuleSpec::compile).collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Attribute rules first, then survey-topic rules
    pub fn builtin() -> Result<Self> {
        Self::from_specs(&Self::builtin_specs())
    }

    pub fn builtin_specs() -> Vec<RuleSpec> {
        let attributes = ATTRIBUTE_RULES.iter().map(|r| (r, RuleMethod::StructuredRule));
        let topics = TOPIC_RULES.iter().map(|r| (r, RuleMethod::TopicRule));
        attributes
            .chain(topics)
            .map(|((pattern, kind, field), method)| RuleSpec {
                pattern: pattern.to_string(),
                kind: *kind,
                field: field.to_string(),
                method,
            })
            .collect()
    }

    /// Appends rules after the existing ones
    pub fn extend(&mut self, rules: impl IntoIterator<Item = Rule>) {
        self.rules.extend(rules);
    }

    pub fn first_match(&self, phrase: &str) -> Option<&Rule> {
        let phrase = phrase.trim().to_lowercase();
        if phrase.is_empty() {
            return None;
        }
        self.rules.iter().find(|rule| rule.matcher.is_match(&phrase))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
