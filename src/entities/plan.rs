use sea_orm::entity::prelude::*;

use super::{child, objective, progress_entry};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "learning_plans")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub child_id: i64,
    pub goal: String,
    pub target_skill: String,
    pub timeframe_start: Date,
    pub timeframe_end: Date,
    /// JSON array of activity type names.
    pub preferred_activity_types: String,
    /// JSON array of free-text skills.
    pub related_skills: String,
    pub status: String,
    pub approval_status: Option<String>,
    pub educator_notes: Option<String>,
    pub version: i32,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {
    Child,
    Objective,
    ProgressEntry,
}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match self {
            Self::Child => Entity::belongs_to(child::Entity)
                .from(Column::ChildId)
                .to(child::Column::Id)
                .into(),
            Self::Objective => Entity::has_many(objective::Entity).into(),
            Self::ProgressEntry => Entity::has_many(progress_entry::Entity).into(),
        }
    }
}

impl Related<child::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Child.def()
    }
}

impl Related<objective::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Objective.def()
    }
}

impl Related<progress_entry::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProgressEntry.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
