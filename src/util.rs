use chrono::{DateTime, Utc};

use crate::app::PlanDetail;
use crate::entities::{objective, plan, progress_entry};
use crate::error::AppError;
use crate::model::{decode_activity_types, decode_skills};

fn has_text(value: &Option<String>) -> bool {
    value
        .as_deref()
        .map(|text| !text.trim().is_empty())
        .unwrap_or(false)
}

pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M").to_string()
}

/// Two decimals at most, trailing zeros dropped (`6`, `4.4`, `10.25`).
pub fn format_value(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    if rounded.fract() == 0.0 {
        return format!("{rounded:.0}");
    }
    let text = format!("{rounded:.2}");
    text.trim_end_matches('0').to_string()
}

fn preferred_text(plan: &plan::Model) -> Result<String, AppError> {
    let types = decode_activity_types(&plan.preferred_activity_types)?;
    if types.is_empty() {
        return Ok("(none)".to_string());
    }
    Ok(types
        .iter()
        .map(|kind| kind.as_str())
        .collect::<Vec<_>>()
        .join(", "))
}

fn related_text(plan: &plan::Model) -> Result<String, AppError> {
    let skills = decode_skills(&plan.related_skills)?;
    if skills.is_empty() {
        return Ok("(none)".to_string());
    }
    Ok(skills.join(", "))
}

pub fn format_objective_line(objective: &objective::Model) -> String {
    format!(
        "- [{}] {} ({}/{}, objective id {})",
        if objective.is_completed { "x" } else { " " },
        objective.description,
        format_value(objective.current_value),
        format_value(objective.target_value),
        objective.id
    )
}

pub fn format_entry_line(entry: &progress_entry::Model) -> String {
    let score = entry
        .score
        .map(format_value)
        .unwrap_or_else(|| "-".to_string());
    let mut line = format!(
        "{:<5} {:<9} {:<6} {:<4} {:<7} {}",
        entry.id,
        entry.activity_type,
        score,
        if entry.completion_status { "yes" } else { "no" },
        format!("+{}", format_value(entry.contribution)),
        entry.activity_id
    );
    if let Some(objective_id) = entry.objective_id {
        line.push_str(&format!(" (objective id {objective_id})"));
    }
    line
}

pub fn format_plan_detail(detail: &PlanDetail) -> Result<String, AppError> {
    let plan = &detail.plan;
    let mut output = String::new();
    output.push_str(&format!("Plan ID: {}\n", plan.id));
    output.push_str(&format!("Child: {} (child id {})\n", detail.child.name, plan.child_id));
    output.push_str(&format!("Goal: {}\n", plan.goal));
    output.push_str(&format!("Target Skill: {}\n", plan.target_skill));
    output.push_str(&format!(
        "Timeframe: {} to {}\n",
        plan.timeframe_start, plan.timeframe_end
    ));
    output.push_str(&format!("Status: {}\n", plan.status));
    if let Some(approval) = plan.approval_status.as_deref() {
        output.push_str(&format!("Approval: {approval}\n"));
    }
    output.push_str(&format!("Preferred Activities: {}\n", preferred_text(plan)?));
    output.push_str(&format!("Related Skills: {}\n", related_text(plan)?));
    if has_text(&plan.educator_notes) {
        output.push_str(&format!(
            "Educator Notes: {}\n",
            plan.educator_notes.as_deref().unwrap_or("")
        ));
    }
    output.push_str(&format!(
        "Progress: {}% ({} entries)\n",
        format_value(detail.overall_progress),
        detail.entry_count
    ));
    output.push_str(&format!("Version: {}\n", plan.version));
    output.push_str(&format!("Created: {}\n", format_datetime(plan.created_at)));
    output.push_str(&format!("Updated: {}\n", format_datetime(plan.updated_at)));
    output.push('\n');
    if detail.objectives.is_empty() {
        output.push_str("Objectives: (none)");
        return Ok(output);
    }
    let done = detail
        .objectives
        .iter()
        .filter(|item| item.is_completed)
        .count();
    output.push_str(&format!(
        "Objectives ({done}/{}):\n",
        detail.objectives.len()
    ));
    for objective in &detail.objectives {
        output.push_str(&format_objective_line(objective));
        output.push('\n');
    }
    Ok(output.trim_end().to_string())
}

/// Progress report for sharing with parents and educators.
pub fn format_plan_markdown(
    detail: &PlanDetail,
    entries: &[progress_entry::Model],
) -> Result<String, AppError> {
    let plan = &detail.plan;
    let mut lines = Vec::new();
    lines.push(format!("# Learning Plan: {}", collapse_heading(&plan.goal)));
    lines.push(String::new());
    lines.push(format!("- **Child:** {}", detail.child.name));
    lines.push(format!("- **Plan ID:** `{}`", plan.id));
    lines.push(format!("- **Status:** `{}`", plan.status));
    lines.push(format!("- **Target skill:** {}", plan.target_skill));
    lines.push(format!(
        "- **Timeframe:** {} to {}",
        plan.timeframe_start, plan.timeframe_end
    ));
    lines.push(format!("- **Preferred activities:** {}", preferred_text(plan)?));
    lines.push(format!("- **Related skills:** {}", related_text(plan)?));
    if let Some(approval) = plan.approval_status.as_deref() {
        lines.push(format!("- **Approval:** {approval}"));
    }
    lines.push(format!(
        "- **Overall progress:** {}%",
        format_value(detail.overall_progress)
    ));
    lines.push(format!("- **Updated:** {}", format_datetime(plan.updated_at)));
    lines.push(String::new());

    if has_text(&plan.educator_notes) {
        lines.push("## Educator Notes".to_string());
        lines.push(String::new());
        let notes = plan.educator_notes.as_deref().unwrap_or("").replace("\r\n", "\n");
        for line in notes.lines() {
            if line.is_empty() {
                lines.push(">".to_string());
            } else {
                lines.push(format!("> {line}"));
            }
        }
        lines.push(String::new());
    }

    lines.push("## Objectives".to_string());
    lines.push(String::new());
    if detail.objectives.is_empty() {
        lines.push("*No objectives*".to_string());
    } else {
        for objective in &detail.objectives {
            lines.push(format!(
                "- [{}] {} *({}/{})*",
                if objective.is_completed { "x" } else { " " },
                objective.description,
                format_value(objective.current_value),
                format_value(objective.target_value)
            ));
        }
    }
    lines.push(String::new());

    lines.push("## Activity Log".to_string());
    lines.push(String::new());
    if entries.is_empty() {
        lines.push("*No activity recorded*".to_string());
        return Ok(lines.join("\n"));
    }
    lines.push("| When | Activity | Type | Score | Completed | Contribution |".to_string());
    lines.push("| --- | --- | --- | --- | --- | --- |".to_string());
    for entry in entries {
        lines.push(format!(
            "| {} | {} | {} | {} | {} | {} |",
            format_datetime(entry.created_at),
            entry.activity_id,
            entry.activity_type,
            entry
                .score
                .map(format_value)
                .unwrap_or_else(|| "-".to_string()),
            if entry.completion_status { "yes" } else { "no" },
            format_value(entry.contribution)
        ));
    }
    Ok(lines.join("\n"))
}

fn collapse_heading(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n");
    let parts: Vec<&str> = normalized
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect();
    if parts.is_empty() {
        "(untitled)".to_string()
    } else {
        parts.join(" / ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_drop_trailing_zeros() {
        assert_eq!(format_value(6.0), "6");
        assert_eq!(format_value(4.4), "4.4");
        assert_eq!(format_value(10.25), "10.25");
        assert_eq!(format_value(1.0 / 3.0), "0.33");
        assert_eq!(format_value(100.0), "100");
    }

    #[test]
    fn headings_collapse_to_one_line() {
        assert_eq!(collapse_heading("Read\r\n\n  short words "), "Read / short words");
        assert_eq!(collapse_heading("   "), "(untitled)");
    }
}
