use crate::entities::plan;
use crate::error::AppError;
use crate::model::{decode_activity_types, decode_skills, ActivityType, PlanStatus};

#[derive(Clone, Copy, Debug)]
pub struct RelevanceQuery<'a> {
    pub activity_type: ActivityType,
    pub skill: Option<&'a str>,
    /// Selected child of the session, if any.
    pub child_id: Option<i64>,
}

/// Decides whether a completed activity should count toward `plan`.
///
/// A plan with no preferred activity types matches no activity.
pub fn is_relevant(plan: &plan::Model, query: &RelevanceQuery<'_>) -> Result<bool, AppError> {
    if plan.status != PlanStatus::Active.as_str() {
        return Ok(false);
    }
    if let Some(child_id) = query.child_id {
        if plan.child_id != child_id {
            return Ok(false);
        }
    }
    let preferred = decode_activity_types(&plan.preferred_activity_types)?;
    if !preferred.contains(&query.activity_type) {
        return Ok(false);
    }
    let Some(skill) = query.skill.map(normalize_skill).filter(|skill| !skill.is_empty()) else {
        return Ok(true);
    };
    if normalize_skill(&plan.target_skill) == skill {
        return Ok(true);
    }
    let related = decode_skills(&plan.related_skills)?;
    Ok(related.iter().any(|item| normalize_skill(item) == skill))
}

pub fn filter_relevant(
    plans: Vec<plan::Model>,
    query: &RelevanceQuery<'_>,
) -> Result<Vec<plan::Model>, AppError> {
    let mut relevant = Vec::new();
    for plan in plans {
        if is_relevant(&plan, query)? {
            relevant.push(plan);
        }
    }
    Ok(relevant)
}

fn normalize_skill(value: &str) -> String {
    value.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{encode_activity_types, encode_skills, TargetSkill};
    use chrono::{NaiveDate, Utc};

    fn plan(
        id: i64,
        child_id: i64,
        skill: TargetSkill,
        preferred: &[ActivityType],
        related: &[&str],
        status: PlanStatus,
    ) -> plan::Model {
        let now = Utc::now();
        let related: Vec<String> = related.iter().map(|item| item.to_string()).collect();
        plan::Model {
            id,
            child_id,
            goal: format!("Goal {id}"),
            target_skill: skill.as_str().to_string(),
            timeframe_start: NaiveDate::from_ymd_opt(2026, 1, 1).expect("date"),
            timeframe_end: NaiveDate::from_ymd_opt(2026, 6, 30).expect("date"),
            preferred_activity_types: encode_activity_types(preferred),
            related_skills: encode_skills(&related),
            status: status.as_str().to_string(),
            approval_status: None,
            educator_notes: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    fn ids(plans: &[plan::Model]) -> Vec<i64> {
        plans.iter().map(|plan| plan.id).collect()
    }

    #[test]
    fn quiz_reading_matches_target_or_related_skill() {
        let plans = vec![
            plan(1, 1, TargetSkill::Reading, &[ActivityType::Quiz], &[], PlanStatus::Active),
            plan(2, 1, TargetSkill::Language, &[ActivityType::Quiz], &["Reading"], PlanStatus::Active),
            plan(3, 1, TargetSkill::Math, &[ActivityType::Quiz], &[], PlanStatus::Active),
            plan(4, 1, TargetSkill::Reading, &[ActivityType::Memory], &[], PlanStatus::Active),
            plan(5, 1, TargetSkill::Reading, &[ActivityType::Quiz], &[], PlanStatus::Paused),
        ];
        let query = RelevanceQuery {
            activity_type: ActivityType::Quiz,
            skill: Some("reading"),
            child_id: None,
        };
        let relevant = filter_relevant(plans, &query).expect("filter");
        assert_eq!(ids(&relevant), vec![1, 2]);
    }

    #[test]
    fn skill_comparison_ignores_case_and_whitespace() {
        let plans = vec![plan(
            1,
            1,
            TargetSkill::Social,
            &[ActivityType::Game],
            &[],
            PlanStatus::Active,
        )];
        let query = RelevanceQuery {
            activity_type: ActivityType::Game,
            skill: Some("  SOCIAL "),
            child_id: None,
        };
        assert_eq!(ids(&filter_relevant(plans, &query).expect("filter")), vec![1]);
    }

    #[test]
    fn empty_preferences_match_nothing() {
        let target = plan(1, 1, TargetSkill::Reading, &[], &[], PlanStatus::Active);
        for kind in ActivityType::ALL {
            let query = RelevanceQuery {
                activity_type: kind,
                skill: None,
                child_id: None,
            };
            assert!(!is_relevant(&target, &query).expect("relevance"));
        }
    }

    #[test]
    fn scoped_to_selected_child() {
        let plans = vec![
            plan(1, 1, TargetSkill::Motor, &[ActivityType::Exercise], &[], PlanStatus::Active),
            plan(2, 2, TargetSkill::Motor, &[ActivityType::Exercise], &[], PlanStatus::Active),
        ];
        let scoped = RelevanceQuery {
            activity_type: ActivityType::Exercise,
            skill: None,
            child_id: Some(2),
        };
        assert_eq!(ids(&filter_relevant(plans.clone(), &scoped).expect("filter")), vec![2]);

        let unscoped = RelevanceQuery {
            child_id: None,
            ..scoped
        };
        assert_eq!(ids(&filter_relevant(plans, &unscoped).expect("filter")), vec![1, 2]);
    }

    #[test]
    fn blank_skill_means_no_skill_filter() {
        let target = plan(1, 1, TargetSkill::Math, &[ActivityType::Quiz], &[], PlanStatus::Active);
        let query = RelevanceQuery {
            activity_type: ActivityType::Quiz,
            skill: Some("   "),
            child_id: None,
        };
        assert!(is_relevant(&target, &query).expect("relevance"));
    }
}
