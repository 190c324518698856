//! Field catalog
//!
//! The registry of canonical fields a phrase can be routed to. Structured
//! attributes are answered by the attribute store; semantic topics are the
//! survey-poll questions whose answers live in the poll vector index.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    StructuredAttribute,
    SemanticTopic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalField {
    pub name: String,
    pub description: String,
    pub kind: FieldKind,
}

impl CanonicalField {
    pub fn new(name: impl Into<String>, description: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind,
        }
    }

    #[inline]
    pub fn is_topic(&self) -> bool {
        self.kind == FieldKind::SemanticTopic
    }
}

const ATTRIBUTES: &[(&str, &str)] = &[
    ("gender", "성별"),
    ("birth_year", "연령대"),
    ("region_major", "거주 지역"),
    ("region_minor", "거주 지역 (시군구)"),
    ("marital_status", "결혼 여부"),
    ("family_size", "가족 수"),
    ("children_count", "자녀 수"),
    ("education_level", "최종학력"),
    ("job_title_raw", "직업"),
    ("job_duty_raw", "직무"),
    ("income_personal_monthly", "개인 소득"),
    ("income_household_monthly", "가구 소득"),
    ("car_ownership", "차량 보유 여부"),
    ("car_manufacturer_raw", "차량 제조사"),
    ("car_model_raw", "차량 모델명"),
    ("phone_brand_raw", "휴대폰 브랜드"),
    ("phone_model_raw", "휴대폰 모델"),
    ("owned_electronics", "보유 가전제품"),
    ("smoking_experience", "흡연 여부"),
    ("smoking_brand", "담배 종류"),
    ("e_cigarette_experience", "전자 담배 이용 경험"),
    ("drinking_experience", "음주 경험"),
];

const TOPICS: &[(&str, &str)] = &[
    ("physical_activity", "여러분은 평소 체력 관리를 위해 어떤 활동을 하고 계신가요? 모두 선택해주세요."),
    ("ott_count", "여러분이 현재 이용 중인 OTT 서비스는 몇 개인가요?"),
    ("traditional_market_freq", "여러분은 전통시장을 얼마나 자주 방문하시나요?"),
    ("lunar_new_year_gift_pref", "여러분이 가장 선호하는 설 선물 유형은 무엇인가요?"),
    ("pet_experience", "여러분은 반려동물을 키우는 중이시거나 혹은 키워보신 적이 있으신가요?"),
    ("moving_stress_factor", "여러분은 이사할 때 가장 스트레스 받는 부분은 어떤걸까요?"),
    ("happiest_self_spending", "여러분은 본인을 위해 소비하는 것 중 가장 기분 좋아지는 소비는 무엇인가요?"),
    ("most_used_app", "여러분은 요즘 가장 많이 사용하는 앱은 무엇인가요?"),
    ("stress_situation", "다음 중 가장 스트레스를 많이 느끼는 상황은 무엇인가요?"),
    ("stress_relief_method", "스트레스를 해소하는 방법으로 주로 사용하는 것은 무엇인가요?"),
    ("skin_satisfaction", "현재 본인의 피부 상태에 얼마나 만족하시나요?"),
    ("skincare_spending", "한 달 기준으로 스킨케어 제품에 평균적으로 얼마나 소비하시나요?"),
    ("skincare_purchase_factor", "스킨케어 제품을 구매할 때 가장 중요하게 고려하는 요소는 무엇인가요?"),
    ("ai_chatbot_used", "여러분이 사용해 본 AI 챗봇 서비스는 무엇인가요? 모두 선택해주세요."),
    ("ai_chatbot_purpose", "AI 챗봇 서비스를 주로 어떤 용도로 활용하셨거나, 앞으로 활용하고 싶으신가요?"),
    ("overseas_travel_pref", "여러분은 올해 해외여행을 간다면 어디로 가고 싶나요? 모두 선택해주세요"),
    ("fast_delivery_usage", "빠른 배송(당일·새벽·직진 배송) 서비스를 주로 어떤 제품을 구매할 때 이용하시나요?"),
    ("summer_worry", "여러분은 다가오는 여름철 가장 걱정되는 점이 무엇인가요?"),
    ("unused_item_disposal", "여러분은 버리기 아까운 물건이 있을 때, 주로 어떻게 하시나요?"),
    ("alarm_setting_style", "여러분은 아침에 기상하기 위해 어떤 방식으로 알람을 설정해두시나요?"),
    ("eating_alone_frequency", "여러분은 외부 식당에서 혼자 식사하는 빈도는 어느 정도인가요?"),
    ("happy_old_age_condition", "여러분이 가장 중요하다고 생각하는 행복한 노년의 조건은 무엇인가요?"),
    ("most_effective_diet", "여러분이 지금까지 해본 다이어트 중 가장 효과 있었던 방법은 무엇인가요?"),
    ("late_night_snack_method", "여러분은 야식을 먹을 때 보통 어떤 방법으로 드시나요?"),
    ("recent_major_spending", "여러분은 최근 가장 지출을 많이 한 곳은 어디입니까?"),
    ("ai_service_usage_area", "여러분은 요즘 어떤 분야에서 AI 서비스를 활용하고 계신가요?"),
    ("minimalist_maximalist", "여러분은 본인을 미니멀리스트와 맥시멀리스트 중 어디에 더 가깝다고 생각하시나요?"),
    ("travel_planning_style", "여러분은 여행갈 때 어떤 스타일에 더 가까우신가요?"),
    ("plastic_bag_reduction_effort", "평소 일회용 비닐봉투 사용을 줄이기 위해 어떤 노력을 하고 계신가요?"),
    ("point_benefit_attention", "여러분은 할인, 캐시백, 멤버십 등 포인트 적립 혜택을 얼마나 신경 쓰시나요?"),
    ("personal_info_protection_habit", "여러분은 평소 개인정보보호를 위해 어떤 습관이 있으신가요?"),
    ("most_saved_photo_type", "여러분의 휴대폰 갤러리에 가장 많이 저장되어져 있는 사진은 무엇인가요?"),
];

/// Groups of attributes that are usually read together
const GROUPS: &[(&str, &[&str])] = &[
    ("DEMO_BASIC", &["gender", "birth_year", "region_major", "region_minor"]),
    ("FAMILY_STATUS", &["marital_status", "family_size", "children_count"]),
    ("JOB_EDUCATION", &["job_title_raw", "job_duty_raw", "education_level"]),
    ("INCOME_LEVEL", &["income_personal_monthly", "income_household_monthly"]),
    ("TECH_OWNER", &["owned_electronics", "phone_brand_raw", "phone_model_raw"]),
    ("CAR_OWNER", &["car_ownership", "car_manufacturer_raw", "car_model_raw"]),
    ("DRINK_HABIT", &["drinking_experience"]),
    ("SMOKE_HABIT", &["smoking_experience", "smoking_brand", "e_cigarette_experience"]),
];

/// Immutable registry of canonical fields, built once at startup
#[derive(Debug, Clone)]
pub struct FieldCatalog {
    fields: Vec<CanonicalField>,
    by_name: HashMap<String, usize>,
    groups: Vec<(String, Vec<String>)>,
}

impl FieldCatalog {
    /// Builds a catalog from explicit fields. Later duplicates replace earlier ones.
    pub fn new(fields: Vec<CanonicalField>) -> Self {
        let mut deduped: Vec<CanonicalField> = Vec::with_capacity(fields.len());
        let mut by_name = HashMap::new();
        for field in fields {
            match by_name.get(&field.name) {
                Some(&idx) => deduped[idx] = field,
                None => {
                    by_name.insert(field.name.clone(), deduped.len());
                    deduped.push(field);
                }
            }
        }
        Self {
            fields: deduped,
            by_name,
            groups: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_groups(mut self, groups: Vec<(String, Vec<String>)>) -> Self {
        self.groups = groups;
        self
    }

    /// The demographic attributes and survey-poll topics of the panel dataset
    pub fn builtin() -> Self {
        let attributes = ATTRIBUTES
            .iter()
            .map(|(name, desc)| CanonicalField::new(*name, *desc, FieldKind::StructuredAttribute));
        let topics = TOPICS
            .iter()
            .map(|(name, desc)| CanonicalField::new(*name, *desc, FieldKind::SemanticTopic));
        let groups = GROUPS
            .iter()
            .map(|(group, members)| {
                (
                    group.to_string(),
                    members.iter().map(|m| m.to_string()).collect(),
                )
            })
            .collect();
        Self::new(attributes.chain(topics).collect()).with_groups(groups)
    }

    pub fn all_fields(&self) -> &[CanonicalField] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&CanonicalField> {
        self.by_name.get(name).map(|&idx| &self.fields[idx])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn attributes(&self) -> impl Iterator<Item = &CanonicalField> {
        self.fields.iter().filter(|f| f.kind == FieldKind::StructuredAttribute)
    }

    pub fn topics(&self) -> impl Iterator<Item = &CanonicalField> {
        self.fields.iter().filter(|f| f.kind == FieldKind::SemanticTopic)
    }

    /// Other members of every group `name` belongs to, in group order
    pub fn related_fields(&self, name: &str) -> Vec<&CanonicalField> {
        let mut related: Vec<&CanonicalField> = Vec::new();
        for (_, members) in self.groups.iter().filter(|(_, m)| m.iter().any(|f| f == name)) {
            for member in members.iter().filter(|m| m.as_str() != name) {
                if let Some(field) = self.get(member) {
                    if !related.iter().any(|r| r.name == field.name) {
                        related.push(field);
                    }
                }
            }
        }
        related
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
