use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "ilptrack",
    version,
    about = "Track individualized learning plans and activity progress with SQLite"
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "ID",
        env = "ILPTRACK_SESSION",
        help = "Session identifier (one per caller)"
    )]
    pub session_id: Option<String>,
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Directory holding ilptrack.db"
    )]
    pub data_dir: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH", help = "Config file (TOML)")]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(subcommand)]
    Child(ChildCommand),
    #[command(subcommand)]
    Plan(PlanCommand),
    #[command(subcommand)]
    Objective(ObjectiveCommand),
    #[command(subcommand)]
    Progress(ProgressCommand),
    #[command(subcommand)]
    Activity(ActivityCommand),
}

#[derive(Subcommand, Debug)]
pub enum ChildCommand {
    Add(ChildAdd),
    List(ChildList),
    Select(ChildSelect),
    #[command(name = "show-selected")]
    Selected(ChildSelected),
    Deselect(ChildDeselect),
}

#[derive(Subcommand, Debug)]
pub enum PlanCommand {
    Add(PlanAdd),
    List(PlanList),
    Show(PlanShow),
    Update(PlanUpdate),
    Remove(PlanRemove),
    Progress(PlanProgress),
    Export(PlanExport),
}

#[derive(Subcommand, Debug)]
pub enum ObjectiveCommand {
    Add(ObjectiveAdd),
    List(ObjectiveList),
    Update(ObjectiveUpdate),
    Remove(ObjectiveRemove),
}

#[derive(Subcommand, Debug)]
pub enum ProgressCommand {
    Record(ProgressRecord),
    List(ProgressList),
    Batch(ProgressBatch),
}

#[derive(Subcommand, Debug)]
pub enum ActivityCommand {
    Relevant(ActivityRelevant),
    Complete(ActivityComplete),
}

#[derive(Args, Debug)]
pub struct ChildAdd {
    pub name: String,
}

#[derive(Args, Debug)]
pub struct ChildList {}

#[derive(Args, Debug)]
pub struct ChildSelect {
    pub id: i64,
}

#[derive(Args, Debug)]
pub struct ChildSelected {}

#[derive(Args, Debug)]
pub struct ChildDeselect {}

#[derive(Args, Debug)]
pub struct PlanAdd {
    #[arg(long, help = "Child id; defaults to the selected child")]
    pub child: Option<i64>,
    #[arg(long)]
    pub goal: String,
    #[arg(long, value_enum)]
    pub skill: SkillArg,
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub start: NaiveDate,
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub end: NaiveDate,
    #[arg(long = "prefer", value_enum, value_name = "TYPE")]
    pub prefer: Vec<ActivityTypeArg>,
    #[arg(long = "related", value_name = "SKILL")]
    pub related: Vec<String>,
    #[arg(long, value_enum)]
    pub approval: Option<ApprovalArg>,
    #[arg(long)]
    pub notes: Option<String>,
    #[arg(
        long = "objective",
        value_name = "TARGET:DESCRIPTION",
        help = "Objective with its numeric target, repeatable"
    )]
    pub objectives: Vec<String>,
}

#[derive(Args, Debug)]
pub struct PlanList {
    #[arg(long, value_enum)]
    pub status: Option<PlanStatusArg>,
    #[arg(long, help = "Child id; defaults to the selected child")]
    pub child: Option<i64>,
    #[arg(long, conflicts_with = "child", help = "Ignore the selected child")]
    pub all_children: bool,
}

#[derive(Args, Debug)]
pub struct PlanShow {
    pub id: i64,
}

#[derive(Args, Debug)]
pub struct PlanUpdate {
    pub id: i64,
    #[arg(long)]
    pub goal: Option<String>,
    #[arg(long, value_enum)]
    pub skill: Option<SkillArg>,
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub start: Option<NaiveDate>,
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub end: Option<NaiveDate>,
    #[arg(long = "prefer", value_enum, value_name = "TYPE")]
    pub prefer: Vec<ActivityTypeArg>,
    #[arg(long, conflicts_with = "prefer", help = "Remove all preferred activity types")]
    pub clear_prefer: bool,
    #[arg(long = "related", value_name = "SKILL")]
    pub related: Vec<String>,
    #[arg(long, conflicts_with = "related", help = "Remove all related skills")]
    pub clear_related: bool,
    #[arg(long, value_enum)]
    pub status: Option<PlanStatusArg>,
    #[arg(long, value_enum)]
    pub approval: Option<ApprovalArg>,
    #[arg(long)]
    pub notes: Option<String>,
    #[arg(long, value_name = "VERSION", help = "Fail unless the plan is at this version")]
    pub expect_version: Option<i32>,
}

#[derive(Args, Debug)]
pub struct PlanRemove {
    pub id: i64,
}

#[derive(Args, Debug)]
pub struct PlanProgress {
    pub id: i64,
}

#[derive(Args, Debug)]
pub struct PlanExport {
    pub id: i64,
    pub path: PathBuf,
}

#[derive(Args, Debug)]
pub struct ObjectiveAdd {
    pub plan_id: i64,
    #[arg(value_name = "TARGET:DESCRIPTION", num_args = 1..)]
    pub objectives: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ObjectiveList {
    pub plan_id: i64,
}

#[derive(Args, Debug)]
pub struct ObjectiveUpdate {
    pub id: i64,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub target: Option<f64>,
}

#[derive(Args, Debug)]
pub struct ObjectiveRemove {
    #[arg(value_name = "ID", num_args = 1..)]
    pub ids: Vec<i64>,
}

#[derive(Args, Debug)]
pub struct ProgressRecord {
    pub plan_id: i64,
    #[arg(long)]
    pub activity_id: String,
    #[arg(long = "type", value_enum)]
    pub activity_type: ActivityTypeArg,
    #[arg(long)]
    pub score: Option<f64>,
    #[arg(long)]
    pub completed: bool,
    #[arg(long)]
    pub objective: Option<i64>,
}

#[derive(Args, Debug)]
pub struct ProgressList {
    pub plan_id: i64,
    #[arg(long)]
    pub limit: Option<u64>,
}

#[derive(Args, Debug)]
pub struct ProgressBatch {
    #[arg(
        long,
        value_name = "MS",
        help = "Quiet window before pending records are written"
    )]
    pub debounce_ms: Option<u64>,
}

#[derive(Args, Debug)]
pub struct ActivityRelevant {
    #[arg(long = "type", value_enum)]
    pub activity_type: ActivityTypeArg,
    #[arg(long)]
    pub skill: Option<String>,
}

#[derive(Args, Debug)]
pub struct ActivityComplete {
    #[arg(long)]
    pub activity_id: String,
    #[arg(long = "type", value_enum)]
    pub activity_type: ActivityTypeArg,
    #[arg(long)]
    pub skill: Option<String>,
    #[arg(long)]
    pub score: Option<f64>,
    #[arg(long)]
    pub completed: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum ActivityTypeArg {
    Quiz,
    Memory,
    Exercise,
    Reading,
    Game,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum SkillArg {
    Reading,
    Math,
    Social,
    Motor,
    Language,
    Cognitive,
    Emotional,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum PlanStatusArg {
    Active,
    Achieved,
    Archived,
    Paused,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum ApprovalArg {
    Pending,
    Approved,
    Rejected,
}
