mod app;
mod batch;
mod cli;
mod config;
mod db;
mod entities;
mod error;
mod model;
mod progress;
mod relevance;
mod util;

use std::fs;
use std::path::Path;
use std::time::Duration;

use clap::Parser;
use tokio::io::BufReader;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::app::{App, ObjectiveOutcome, RecordOutcome, StatusChanges};
use crate::cli::{
    ActivityCommand, ActivityComplete, ActivityRelevant, ActivityTypeArg, ApprovalArg,
    ChildAdd, ChildCommand, ChildSelect, Cli, Command, ObjectiveAdd, ObjectiveCommand,
    ObjectiveList, ObjectiveRemove, ObjectiveUpdate, PlanAdd, PlanCommand, PlanExport, PlanList,
    PlanProgress, PlanRemove, PlanShow, PlanStatusArg, PlanUpdate, ProgressBatch,
    ProgressCommand, ProgressList, ProgressRecord, SkillArg,
};
use crate::config::{Config, DEFAULT_LOG_LEVEL, LOG_ENV};
use crate::entities::plan;
use crate::error::AppError;
use crate::model::{
    ActivityCompletion, ActivityType, ApprovalStatus, ChildInput, ObjectiveChanges,
    ObjectiveInput, PlanChanges, PlanInput, PlanQuery, PlanStatus, ProgressInput, TargetSkill,
};
use crate::util::{
    format_entry_line, format_objective_line, format_plan_detail, format_plan_markdown,
    format_value,
};

const SESSION_ID_FLAG: &str = "--session-id";

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    let Cli {
        session_id,
        data_dir,
        config,
        command,
    } = Cli::parse();

    let config = Config::load(config.as_deref())?;
    init_tracing(&config);

    let session_id = resolve_session_id(session_id)?;
    let data_dir = config.resolve_data_dir(data_dir.as_deref())?;
    let db_path = db::resolve_db_path(&data_dir);
    db::ensure_parent_dir(&db_path)?;
    let mut lock = db::open_lock(&db_path)?;
    let mut guard = Some(lock.write()?);

    let db = db::connect(&db_path).await?;
    db::ensure_schema(&db).await?;
    debug!(path = %db_path.display(), "database ready");
    let app = App::new(db, session_id);

    // A batch stream locks per flush so other invocations can interleave.
    if matches!(command, Command::Progress(ProgressCommand::Batch(_))) {
        drop(guard.take());
    }

    match command {
        Command::Child(command) => handle_child(&app, command).await,
        Command::Plan(command) => handle_plan(&app, command).await,
        Command::Objective(command) => handle_objective(&app, command).await,
        Command::Progress(command) => handle_progress(&app, command, &config, &db_path).await,
        Command::Activity(command) => handle_activity(&app, command).await,
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(config.log_level()))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

async fn handle_child(app: &App, command: ChildCommand) -> Result<(), AppError> {
    match command {
        ChildCommand::Add(args) => handle_child_add(app, args).await,
        ChildCommand::List(_) => handle_child_list(app).await,
        ChildCommand::Select(args) => handle_child_select(app, args).await,
        ChildCommand::Selected(_) => handle_child_selected(app).await,
        ChildCommand::Deselect(_) => {
            app.clear_selected_child().await?;
            println!("Selected child cleared.");
            Ok(())
        }
    }
}

async fn handle_plan(app: &App, command: PlanCommand) -> Result<(), AppError> {
    match command {
        PlanCommand::Add(args) => handle_plan_add(app, args).await,
        PlanCommand::List(args) => handle_plan_list(app, args).await,
        PlanCommand::Show(args) => handle_plan_show(app, args).await,
        PlanCommand::Update(args) => handle_plan_update(app, args).await,
        PlanCommand::Remove(args) => handle_plan_remove(app, args).await,
        PlanCommand::Progress(args) => handle_plan_progress(app, args).await,
        PlanCommand::Export(args) => handle_plan_export(app, args).await,
    }
}

async fn handle_objective(app: &App, command: ObjectiveCommand) -> Result<(), AppError> {
    match command {
        ObjectiveCommand::Add(args) => handle_objective_add(app, args).await,
        ObjectiveCommand::List(args) => handle_objective_list(app, args).await,
        ObjectiveCommand::Update(args) => handle_objective_update(app, args).await,
        ObjectiveCommand::Remove(args) => handle_objective_remove(app, args).await,
    }
}

async fn handle_progress(
    app: &App,
    command: ProgressCommand,
    config: &Config,
    db_path: &Path,
) -> Result<(), AppError> {
    match command {
        ProgressCommand::Record(args) => handle_progress_record(app, args).await,
        ProgressCommand::List(args) => handle_progress_list(app, args).await,
        ProgressCommand::Batch(args) => handle_progress_batch(app, args, config, db_path).await,
    }
}

async fn handle_activity(app: &App, command: ActivityCommand) -> Result<(), AppError> {
    match command {
        ActivityCommand::Relevant(args) => handle_activity_relevant(app, args).await,
        ActivityCommand::Complete(args) => handle_activity_complete(app, args).await,
    }
}

async fn handle_child_add(app: &App, args: ChildAdd) -> Result<(), AppError> {
    let child = app.add_child(ChildInput { name: args.name }).await?;
    println!("Created child ID: {}: {}", child.id, child.name);
    Ok(())
}

async fn handle_child_list(app: &App) -> Result<(), AppError> {
    let children = app.list_children().await?;
    if children.is_empty() {
        println!("No children found.");
        return Ok(());
    }
    let selected = app.get_selected_child().await?.map(|state| state.child_id);
    println!("{:<4} {:<4} {}", "ID", "SEL", "NAME");
    for child in children {
        let marker = if selected == Some(child.id) { "*" } else { "" };
        println!("{:<4} {:<4} {}", child.id, marker, child.name);
    }
    Ok(())
}

async fn handle_child_select(app: &App, args: ChildSelect) -> Result<(), AppError> {
    let child = app.get_child(args.id).await?;
    app.select_child(child.id).await?;
    println!("Selected child set to {}: {}", child.id, child.name);
    Ok(())
}

async fn handle_child_selected(app: &App) -> Result<(), AppError> {
    let Some(state) = app.get_selected_child().await? else {
        println!("No selected child.");
        return Ok(());
    };
    match app.get_child(state.child_id).await {
        Ok(child) => println!("Selected child: {}: {}", child.id, child.name),
        Err(AppError::NotFound(_)) => {
            app.clear_selected_child().await?;
            println!("Selected child ID: {} not found.", state.child_id);
        }
        Err(err) => return Err(err),
    }
    Ok(())
}

async fn handle_plan_add(app: &App, args: PlanAdd) -> Result<(), AppError> {
    let child_id = match args.child {
        Some(id) => id,
        None => app
            .get_selected_child()
            .await?
            .map(|state| state.child_id)
            .ok_or_else(|| {
                AppError::InvalidInput(
                    "--child is required when no child is selected".to_string(),
                )
            })?,
    };
    let objectives = parse_objective_specs(&args.objectives)?;
    let (plan, objectives) = app
        .add_plan(
            PlanInput {
                child_id,
                goal: args.goal,
                target_skill: skill_from_arg(args.skill),
                timeframe_start: args.start,
                timeframe_end: args.end,
                preferred_activity_types: args.prefer.into_iter().map(activity_type_from_arg).collect(),
                related_skills: args.related,
                approval_status: args.approval.map(approval_from_arg),
                educator_notes: args.notes,
            },
            objectives,
        )
        .await?;

    if objectives.is_empty() {
        println!("Created plan ID: {}: {}", plan.id, plan.goal);
    } else {
        println!(
            "Created plan ID: {}: {} (objectives: {})",
            plan.id,
            plan.goal,
            objectives.len()
        );
    }
    Ok(())
}

async fn handle_plan_list(app: &App, args: PlanList) -> Result<(), AppError> {
    let child_id = if args.all_children {
        None
    } else if args.child.is_some() {
        args.child
    } else {
        app.get_selected_child().await?.map(|state| state.child_id)
    };
    let plans = app
        .list_plans(&PlanQuery {
            status: args.status.map(plan_status_from_arg),
            child_id,
        })
        .await?;
    if plans.is_empty() {
        println!("No plans found.");
        return Ok(());
    }
    print_plan_list(app, &plans).await
}

async fn handle_plan_show(app: &App, args: PlanShow) -> Result<(), AppError> {
    let detail = app.get_plan_detail(args.id).await?;
    println!("{}", format_plan_detail(&detail)?);
    Ok(())
}

async fn handle_plan_update(app: &App, args: PlanUpdate) -> Result<(), AppError> {
    let preferred_activity_types = if args.clear_prefer {
        Some(Vec::new())
    } else if args.prefer.is_empty() {
        None
    } else {
        Some(args.prefer.into_iter().map(activity_type_from_arg).collect())
    };
    let related_skills = if args.clear_related {
        Some(Vec::new())
    } else if args.related.is_empty() {
        None
    } else {
        Some(args.related)
    };
    let plan = app
        .update_plan(
            args.id,
            PlanChanges {
                goal: args.goal,
                target_skill: args.skill.map(skill_from_arg),
                timeframe_start: args.start,
                timeframe_end: args.end,
                preferred_activity_types,
                related_skills,
                status: args.status.map(plan_status_from_arg),
                approval_status: args.approval.map(approval_from_arg),
                educator_notes: args.notes,
                expected_version: args.expect_version,
            },
        )
        .await?;
    println!(
        "Updated plan ID: {}: {} (version {})",
        plan.id, plan.goal, plan.version
    );
    Ok(())
}

async fn handle_plan_remove(app: &App, args: PlanRemove) -> Result<(), AppError> {
    app.delete_plan(args.id).await?;
    println!("Plan ID: {} removed.", args.id);
    Ok(())
}

async fn handle_plan_progress(app: &App, args: PlanProgress) -> Result<(), AppError> {
    let overall = app.overall_progress(args.id).await?;
    println!("Plan ID: {} progress: {}%", args.id, format_value(overall));
    Ok(())
}

async fn handle_plan_export(app: &App, args: PlanExport) -> Result<(), AppError> {
    let detail = app.get_plan_detail(args.id).await?;
    let entries = app.entries_for_plan(args.id, None).await?;
    let markdown = format_plan_markdown(&detail, &entries)?;
    db::ensure_parent_dir(&args.path)?;
    fs::write(&args.path, markdown)?;
    println!(
        "Exported plan ID: {} to {}",
        detail.plan.id,
        args.path.display()
    );
    Ok(())
}

async fn handle_objective_add(app: &App, args: ObjectiveAdd) -> Result<(), AppError> {
    let inputs = parse_objective_specs(&args.objectives)?;
    if inputs.is_empty() {
        return Err(AppError::InvalidInput("no objectives provided".to_string()));
    }
    let (created, changes) = app.add_objectives(args.plan_id, inputs).await?;
    if created.len() == 1 {
        println!(
            "Created objective ID: {} for plan ID: {}",
            created[0].id, created[0].plan_id
        );
    } else {
        println!(
            "Created {} objectives for plan ID: {}",
            created.len(),
            args.plan_id
        );
    }
    print_status_changes(&changes);
    Ok(())
}

async fn handle_objective_list(app: &App, args: ObjectiveList) -> Result<(), AppError> {
    let objectives = app.list_objectives(args.plan_id).await?;
    if objectives.is_empty() {
        println!("No objectives found for plan ID: {}.", args.plan_id);
        return Ok(());
    }
    for objective in &objectives {
        println!("{}", format_objective_line(objective));
    }
    Ok(())
}

async fn handle_objective_update(app: &App, args: ObjectiveUpdate) -> Result<(), AppError> {
    let (objective, changes) = app
        .update_objective(
            args.id,
            ObjectiveChanges {
                description: args.description,
                target_value: args.target,
            },
        )
        .await?;
    println!(
        "Updated objective ID: {} ({}/{}).",
        objective.id,
        format_value(objective.current_value),
        format_value(objective.target_value)
    );
    print_status_changes(&changes);
    Ok(())
}

async fn handle_objective_remove(app: &App, args: ObjectiveRemove) -> Result<(), AppError> {
    if args.ids.is_empty() {
        return Err(AppError::InvalidInput("no objective ids provided".to_string()));
    }
    let (deleted, changes) = app.delete_objectives(&args.ids).await?;
    if args.ids.len() == 1 {
        println!("Objective ID: {} removed.", args.ids[0]);
    } else {
        println!("Removed {} objectives.", deleted);
    }
    print_status_changes(&changes);
    Ok(())
}

async fn handle_progress_record(app: &App, args: ProgressRecord) -> Result<(), AppError> {
    let outcome = app
        .record_progress(ProgressInput {
            plan_id: args.plan_id,
            activity_id: args.activity_id,
            activity_type: activity_type_from_arg(args.activity_type),
            score: args.score,
            completion_status: args.completed,
            objective_id: args.objective,
        })
        .await?;
    print_record_outcome(&outcome);
    Ok(())
}

async fn handle_progress_list(app: &App, args: ProgressList) -> Result<(), AppError> {
    let entries = app.entries_for_plan(args.plan_id, args.limit).await?;
    if entries.is_empty() {
        println!("No progress entries for plan ID: {}.", args.plan_id);
        return Ok(());
    }
    println!(
        "{:<5} {:<9} {:<6} {:<4} {:<7} {}",
        "ID", "TYPE", "SCORE", "DONE", "CONTRIB", "ACTIVITY"
    );
    for entry in &entries {
        println!("{}", format_entry_line(entry));
    }
    Ok(())
}

async fn handle_progress_batch(
    app: &App,
    args: ProgressBatch,
    config: &Config,
    db_path: &Path,
) -> Result<(), AppError> {
    let window = args
        .debounce_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.debounce());
    let reader = BufReader::new(tokio::io::stdin());
    let mut lock = db::open_lock(db_path)?;
    let summary = batch::run_batch(app, reader, window, &mut lock).await?;

    for skipped in &summary.skipped {
        println!("Skipped line {}: {}", skipped.line, skipped.reason);
    }
    for flush in &summary.flushes {
        for outcome in &flush.recorded {
            print_record_outcome(outcome);
        }
        for rejected in &flush.rejected {
            println!(
                "Rejected progress input for plan ID: {}: {}",
                rejected.input.plan_id, rejected.error
            );
        }
    }
    println!(
        "Batch complete: {} recorded, {} rejected, {} skipped in {} write(s).",
        summary.recorded(),
        summary.rejected(),
        summary.skipped.len(),
        summary.flushes.len()
    );
    Ok(())
}

async fn handle_activity_relevant(app: &App, args: ActivityRelevant) -> Result<(), AppError> {
    let plans = app
        .relevant_plans(
            activity_type_from_arg(args.activity_type),
            args.skill.as_deref(),
        )
        .await?;
    if plans.is_empty() {
        println!("No relevant plans.");
        return Ok(());
    }
    print_plan_list(app, &plans).await
}

async fn handle_activity_complete(app: &App, args: ActivityComplete) -> Result<(), AppError> {
    let outcome = app
        .complete_activity(ActivityCompletion {
            activity_id: args.activity_id,
            activity_type: activity_type_from_arg(args.activity_type),
            skill: args.skill,
            score: args.score,
            completion_status: args.completed,
        })
        .await?;
    if outcome.recorded.is_empty() && outcome.failures.is_empty() {
        println!("No relevant plans for this activity.");
        return Ok(());
    }
    for recorded in &outcome.recorded {
        print_record_outcome(recorded);
    }
    for failure in &outcome.failures {
        println!(
            "Failed to record progress for plan ID: {}: {}",
            failure.plan_id, failure.error
        );
    }
    Ok(())
}

fn parse_objective_specs(values: &[String]) -> Result<Vec<ObjectiveInput>, AppError> {
    values.iter().map(|value| parse_objective_spec(value)).collect()
}

fn parse_objective_spec(value: &str) -> Result<ObjectiveInput, AppError> {
    let Some((target, description)) = value.split_once(':') else {
        return Err(AppError::InvalidInput(format!(
            "objective '{value}' must look like TARGET:DESCRIPTION"
        )));
    };
    let target_value = target.trim().parse::<f64>().map_err(|_| {
        AppError::InvalidInput(format!("objective target '{}' is not a number", target.trim()))
    })?;
    Ok(ObjectiveInput {
        description: description.trim().to_string(),
        target_value,
    })
}

fn resolve_session_id(session_id: Option<String>) -> Result<String, AppError> {
    let value = session_id
        .ok_or_else(|| AppError::InvalidInput(format!("{SESSION_ID_FLAG} is required")))?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidInput(format!(
            "{SESSION_ID_FLAG} is empty"
        )));
    }
    Ok(trimmed.to_string())
}

fn activity_type_from_arg(arg: ActivityTypeArg) -> ActivityType {
    match arg {
        ActivityTypeArg::Quiz => ActivityType::Quiz,
        ActivityTypeArg::Memory => ActivityType::Memory,
        ActivityTypeArg::Exercise => ActivityType::Exercise,
        ActivityTypeArg::Reading => ActivityType::Reading,
        ActivityTypeArg::Game => ActivityType::Game,
    }
}

fn skill_from_arg(arg: SkillArg) -> TargetSkill {
    match arg {
        SkillArg::Reading => TargetSkill::Reading,
        SkillArg::Math => TargetSkill::Math,
        SkillArg::Social => TargetSkill::Social,
        SkillArg::Motor => TargetSkill::Motor,
        SkillArg::Language => TargetSkill::Language,
        SkillArg::Cognitive => TargetSkill::Cognitive,
        SkillArg::Emotional => TargetSkill::Emotional,
    }
}

fn plan_status_from_arg(arg: PlanStatusArg) -> PlanStatus {
    match arg {
        PlanStatusArg::Active => PlanStatus::Active,
        PlanStatusArg::Achieved => PlanStatus::Achieved,
        PlanStatusArg::Archived => PlanStatus::Archived,
        PlanStatusArg::Paused => PlanStatus::Paused,
    }
}

fn approval_from_arg(arg: ApprovalArg) -> ApprovalStatus {
    match arg {
        ApprovalArg::Pending => ApprovalStatus::Pending,
        ApprovalArg::Approved => ApprovalStatus::Approved,
        ApprovalArg::Rejected => ApprovalStatus::Rejected,
    }
}

fn print_record_outcome(outcome: &RecordOutcome) {
    let entry = &outcome.entry;
    println!(
        "Recorded progress entry ID: {} for plan ID: {} (+{}, overall {}%)",
        entry.id,
        entry.plan_id,
        format_value(entry.contribution),
        format_value(outcome.overall_progress)
    );
    match &outcome.objective {
        Some(ObjectiveOutcome::Updated {
            objective,
            progress,
        }) => {
            println!(
                "Objective ID: {} progress: {}/{}",
                objective.id,
                format_value(objective.current_value),
                format_value(objective.target_value)
            );
            if progress.newly_completed() {
                println!("Objective ID: {} completed.", objective.id);
            }
        }
        Some(ObjectiveOutcome::Missing(objective_id)) => {
            println!(
                "Warning: objective ID: {} not found in plan ID: {}; progress recorded without objective update.",
                objective_id, entry.plan_id
            );
        }
        None => {}
    }
    if let Some(milestone) = outcome.milestone {
        println!(
            "Milestone reached: {}% of plan ID: {}.",
            milestone, entry.plan_id
        );
    }
    print_status_changes(&outcome.changes);
}

fn print_status_changes(changes: &StatusChanges) {
    if changes.is_empty() {
        return;
    }

    println!("Auto status updates:");
    for change in &changes.plans {
        println!(
            "- Plan ID: {} status auto-updated from {} to {} ({}).",
            change.plan_id, change.from, change.to, change.reason
        );
    }
}

async fn print_plan_list(app: &App, plans: &[plan::Model]) -> Result<(), AppError> {
    println!(
        "{:<4} {:<6} {:<9} {:<10} {:<9} {}",
        "ID", "CHILD", "STATUS", "SKILL", "PROGRESS", "GOAL"
    );
    for plan in plans {
        let overall = app.overall_progress(plan.id).await?;
        println!(
            "{:<4} {:<6} {:<9} {:<10} {:<9} {}",
            plan.id,
            plan.child_id,
            plan.status,
            plan.target_skill,
            format!("{}%", format_value(overall)),
            plan.goal
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn objective_spec_splits_on_first_colon() {
        let parsed = parse_objective_spec("20: Sign letters: A to T").expect("parse");
        assert_eq!(parsed.target_value, 20.0);
        assert_eq!(parsed.description, "Sign letters: A to T");
    }

    #[test]
    fn objective_spec_requires_numeric_target() {
        assert!(matches!(
            parse_objective_spec("many:letters"),
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            parse_objective_spec("no separator"),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn session_id_is_trimmed_and_required() {
        assert_eq!(
            resolve_session_id(Some("  tab-1 ".to_string())).expect("session"),
            "tab-1"
        );
        assert!(resolve_session_id(None).is_err());
        assert!(resolve_session_id(Some("   ".to_string())).is_err());
    }
}
