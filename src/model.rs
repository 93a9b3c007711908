use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityType {
    Quiz,
    Memory,
    Exercise,
    Reading,
    Game,
}

impl ActivityType {
    pub const ALL: [ActivityType; 5] = [
        Self::Quiz,
        Self::Memory,
        Self::Exercise,
        Self::Reading,
        Self::Game,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quiz => "quiz",
            Self::Memory => "memory",
            Self::Exercise => "exercise",
            Self::Reading => "reading",
            Self::Game => "game",
        }
    }
}

impl FromStr for ActivityType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| AppError::InvalidInput(format!("unknown activity type: {value}")))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetSkill {
    Reading,
    Math,
    Social,
    Motor,
    Language,
    Cognitive,
    Emotional,
}

impl TargetSkill {
    pub const ALL: [TargetSkill; 7] = [
        Self::Reading,
        Self::Math,
        Self::Social,
        Self::Motor,
        Self::Language,
        Self::Cognitive,
        Self::Emotional,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reading => "reading",
            Self::Math => "math",
            Self::Social => "social",
            Self::Motor => "motor",
            Self::Language => "language",
            Self::Cognitive => "cognitive",
            Self::Emotional => "emotional",
        }
    }
}

impl FromStr for TargetSkill {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|skill| skill.as_str() == value)
            .ok_or_else(|| AppError::InvalidInput(format!("unknown target skill: {value}")))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Active,
    Achieved,
    Archived,
    Paused,
}

impl PlanStatus {
    pub const ALL: [PlanStatus; 4] = [Self::Active, Self::Achieved, Self::Archived, Self::Paused];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Achieved => "achieved",
            Self::Archived => "archived",
            Self::Paused => "paused",
        }
    }
}

impl FromStr for PlanStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| AppError::InvalidInput(format!("unknown plan status: {value}")))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChildInput {
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlanInput {
    pub child_id: i64,
    pub goal: String,
    pub target_skill: TargetSkill,
    pub timeframe_start: NaiveDate,
    pub timeframe_end: NaiveDate,
    pub preferred_activity_types: Vec<ActivityType>,
    pub related_skills: Vec<String>,
    pub approval_status: Option<ApprovalStatus>,
    pub educator_notes: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PlanChanges {
    pub goal: Option<String>,
    pub target_skill: Option<TargetSkill>,
    pub timeframe_start: Option<NaiveDate>,
    pub timeframe_end: Option<NaiveDate>,
    pub preferred_activity_types: Option<Vec<ActivityType>>,
    pub related_skills: Option<Vec<String>>,
    pub status: Option<PlanStatus>,
    pub approval_status: Option<ApprovalStatus>,
    pub educator_notes: Option<String>,
    pub expected_version: Option<i32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ObjectiveInput {
    pub description: String,
    pub target_value: f64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ObjectiveChanges {
    pub description: Option<String>,
    pub target_value: Option<f64>,
}

/// One completed activity attempt, as reported by an activity front-end.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProgressInput {
    pub plan_id: i64,
    pub activity_id: String,
    pub activity_type: ActivityType,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub completion_status: bool,
    #[serde(default)]
    pub objective_id: Option<i64>,
}

/// A completed activity before plan selection; the relevance filter decides
/// which plans receive an entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActivityCompletion {
    pub activity_id: String,
    pub activity_type: ActivityType,
    #[serde(default)]
    pub skill: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub completion_status: bool,
}

impl ActivityCompletion {
    pub fn for_plan(&self, plan_id: i64) -> ProgressInput {
        ProgressInput {
            plan_id,
            activity_id: self.activity_id.clone(),
            activity_type: self.activity_type,
            score: self.score,
            completion_status: self.completion_status,
            objective_id: None,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PlanQuery {
    pub status: Option<PlanStatus>,
    pub child_id: Option<i64>,
}

pub fn encode_activity_types(types: &[ActivityType]) -> String {
    let names: Vec<&str> = types.iter().map(|kind| kind.as_str()).collect();
    serde_json::to_string(&names).unwrap_or_else(|_| "[]".to_string())
}

pub fn decode_activity_types(raw: &str) -> Result<Vec<ActivityType>, AppError> {
    let names: Vec<String> = serde_json::from_str(raw)?;
    names.iter().map(|name| name.parse()).collect()
}

pub fn encode_skills(skills: &[String]) -> String {
    serde_json::to_string(skills).unwrap_or_else(|_| "[]".to_string())
}

pub fn decode_skills(raw: &str) -> Result<Vec<String>, AppError> {
    Ok(serde_json::from_str(raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_types_survive_storage_encoding() {
        let encoded = encode_activity_types(&[ActivityType::Quiz, ActivityType::Game]);
        assert_eq!(encoded, r#"["quiz","game"]"#);
        let decoded = decode_activity_types(&encoded).expect("decode");
        assert_eq!(decoded, vec![ActivityType::Quiz, ActivityType::Game]);
    }

    #[test]
    fn unknown_enum_text_is_invalid_input() {
        let err = "painting".parse::<ActivityType>().unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert!(decode_activity_types(r#"["quiz","painting"]"#).is_err());
        assert!("music".parse::<TargetSkill>().is_err());
        assert_eq!("paused".parse::<PlanStatus>().ok(), Some(PlanStatus::Paused));
    }

    #[test]
    fn progress_input_defaults_optional_fields() {
        let input: ProgressInput = serde_json::from_str(
            r#"{"plan_id": 3, "activity_id": "quiz-1", "activity_type": "memory"}"#,
        )
        .expect("parse");
        assert_eq!(input.activity_type, ActivityType::Memory);
        assert!(input.score.is_none());
        assert!(!input.completion_status);
        assert!(input.objective_id.is_none());
    }
}
