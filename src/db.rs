use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use sea_orm::sea_query::Index;
use sea_orm::{ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, Schema, Statement};
use url::Url;

use crate::entities::{child, objective, plan, progress_entry, selected_child};
use crate::error::AppError;

pub fn resolve_db_path(data_dir: &Path) -> PathBuf {
    data_dir.join("ilptrack.db")
}

pub fn ensure_parent_dir(path: &Path) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Advisory lock next to the database. Commands hold it for writing so
/// concurrent invocations serialize; a batch stream holds it per flush.
pub fn open_lock(path: &Path) -> Result<fd_lock::RwLock<File>, AppError> {
    let lock_path = path.with_extension("lock");
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(lock_path)?;
    Ok(fd_lock::RwLock::new(file))
}

pub async fn connect(path: &Path) -> Result<DatabaseConnection, AppError> {
    let mut url = Url::from_file_path(path)
        .map_err(|_| AppError::InvalidInput(format!("invalid sqlite path: {}", path.display())))?;
    url.set_query(Some("mode=rwc"));
    let sqlite_url = url.as_str().replacen("file://", "sqlite://", 1);
    Ok(Database::connect(&sqlite_url).await?)
}

pub async fn ensure_schema(db: &DatabaseConnection) -> Result<(), AppError> {
    db.execute(Statement::from_string(
        DatabaseBackend::Sqlite,
        "PRAGMA foreign_keys = ON;",
    ))
    .await?;

    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut child_stmt = schema.create_table_from_entity(child::Entity);
    child_stmt.if_not_exists();
    db.execute(builder.build(&child_stmt)).await?;

    let mut plan_stmt = schema.create_table_from_entity(plan::Entity);
    plan_stmt.if_not_exists();
    db.execute(builder.build(&plan_stmt)).await?;

    let mut objective_stmt = schema.create_table_from_entity(objective::Entity);
    objective_stmt.if_not_exists();
    db.execute(builder.build(&objective_stmt)).await?;

    let mut entry_stmt = schema.create_table_from_entity(progress_entry::Entity);
    entry_stmt.if_not_exists();
    db.execute(builder.build(&entry_stmt)).await?;

    let mut selected_stmt = schema.create_table_from_entity(selected_child::Entity);
    selected_stmt.if_not_exists();
    db.execute(builder.build(&selected_stmt)).await?;

    let mut plan_index = Index::create()
        .name("idx_learning_plans_child")
        .table(plan::Entity)
        .col(plan::Column::ChildId)
        .to_owned();
    plan_index.if_not_exists();
    db.execute(builder.build(&plan_index)).await?;

    let mut objective_index = Index::create()
        .name("idx_objectives_plan_order")
        .table(objective::Entity)
        .col(objective::Column::PlanId)
        .col(objective::Column::SortOrder)
        .to_owned();
    objective_index.if_not_exists();
    db.execute(builder.build(&objective_index)).await?;

    let mut entry_index = Index::create()
        .name("idx_progress_entries_plan")
        .table(progress_entry::Entity)
        .col(progress_entry::Column::PlanId)
        .to_owned();
    entry_index.if_not_exists();
    db.execute(builder.build(&entry_index)).await?;

    let mut selected_index = Index::create()
        .name("idx_selected_child_session")
        .table(selected_child::Entity)
        .col(selected_child::Column::SessionId)
        .unique()
        .to_owned();
    selected_index.if_not_exists();
    db.execute(builder.build(&selected_index)).await?;

    Ok(())
}
