use std::collections::HashSet;

use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use tracing::{debug, error, info, warn};

use crate::entities::{child, objective, plan, progress_entry, selected_child};
use crate::error::AppError;
use crate::model::{
    decode_activity_types, encode_activity_types, encode_skills, ActivityCompletion,
    ActivityType, ChildInput, ObjectiveChanges, ObjectiveInput, PlanChanges, PlanInput,
    PlanQuery, PlanStatus, ProgressInput,
};
use crate::progress::{self, ObjectiveProgress};
use crate::relevance::{self, RelevanceQuery};

pub struct App {
    db: DatabaseConnection,
    session_id: String,
}

pub struct PlanDetail {
    pub plan: plan::Model,
    pub child: child::Model,
    pub objectives: Vec<objective::Model>,
    pub entry_count: u64,
    pub overall_progress: f64,
}

#[derive(Clone, Debug)]
pub struct PlanStatusChange {
    pub plan_id: i64,
    pub from: String,
    pub to: String,
    pub reason: String,
}

#[derive(Default, Debug)]
pub struct StatusChanges {
    pub plans: Vec<PlanStatusChange>,
}

impl StatusChanges {
    pub fn merge(&mut self, other: StatusChanges) {
        self.plans.extend(other.plans);
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

#[derive(Clone, Debug)]
pub enum ObjectiveOutcome {
    Updated {
        objective: objective::Model,
        progress: ObjectiveProgress,
    },
    /// The entry named an objective that does not belong to its plan.
    Missing(i64),
}

#[derive(Debug)]
pub struct RecordOutcome {
    pub entry: progress_entry::Model,
    pub objective: Option<ObjectiveOutcome>,
    pub previous_progress: f64,
    pub overall_progress: f64,
    pub milestone: Option<u8>,
    pub changes: StatusChanges,
}

#[derive(Debug)]
pub struct RejectedInput {
    pub input: ProgressInput,
    pub error: AppError,
}

#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub recorded: Vec<RecordOutcome>,
    pub rejected: Vec<RejectedInput>,
}

#[derive(Debug)]
pub struct ActivityFailure {
    pub plan_id: i64,
    pub error: AppError,
}

#[derive(Debug, Default)]
pub struct ActivityOutcome {
    pub recorded: Vec<RecordOutcome>,
    pub failures: Vec<ActivityFailure>,
}

impl App {
    pub fn new(db: DatabaseConnection, session_id: String) -> Self {
        Self { db, session_id }
    }

    pub async fn add_child(&self, input: ChildInput) -> Result<child::Model, AppError> {
        ensure_non_empty("child name", &input.name)?;
        let now = Utc::now();
        let active = child::ActiveModel {
            name: Set(input.name.trim().to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        let insert = child::Entity::insert(active).exec(&self.db).await?;
        let created = child::Entity::find_by_id(insert.last_insert_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("child not found after insert".to_string()))?;
        info!(child_id = created.id, "child profile created");
        Ok(created)
    }

    pub async fn list_children(&self) -> Result<Vec<child::Model>, AppError> {
        Ok(child::Entity::find()
            .order_by_asc(child::Column::Id)
            .all(&self.db)
            .await?)
    }

    pub async fn get_child(&self, id: i64) -> Result<child::Model, AppError> {
        child::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("child id {id}")))
    }

    pub async fn get_selected_child(&self) -> Result<Option<selected_child::Model>, AppError> {
        Ok(selected_child::Entity::find()
            .filter(selected_child::Column::SessionId.eq(self.session_id.as_str()))
            .one(&self.db)
            .await?)
    }

    pub async fn select_child(&self, child_id: i64) -> Result<selected_child::Model, AppError> {
        self.get_child(child_id).await?;
        let txn = self.db.begin().await?;
        let result: Result<selected_child::Model, AppError> = async {
            selected_child::Entity::delete_many()
                .filter(selected_child::Column::SessionId.eq(self.session_id.as_str()))
                .exec(&txn)
                .await?;
            let active = selected_child::ActiveModel {
                session_id: Set(self.session_id.clone()),
                child_id: Set(child_id),
                updated_at: Set(Utc::now()),
                ..Default::default()
            };
            selected_child::Entity::insert(active).exec(&txn).await?;
            selected_child::Entity::find()
                .filter(selected_child::Column::SessionId.eq(self.session_id.as_str()))
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    AppError::NotFound("selected child not found after insert".to_string())
                })
        }
        .await;

        finalize_transaction(txn, result).await
    }

    pub async fn clear_selected_child(&self) -> Result<(), AppError> {
        selected_child::Entity::delete_many()
            .filter(selected_child::Column::SessionId.eq(self.session_id.as_str()))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    pub async fn add_plan(
        &self,
        input: PlanInput,
        objectives: Vec<ObjectiveInput>,
    ) -> Result<(plan::Model, Vec<objective::Model>), AppError> {
        ensure_non_empty("plan goal", &input.goal)?;
        ensure_timeframe(input.timeframe_start, input.timeframe_end)?;
        for item in &objectives {
            validate_objective_input(item)?;
        }

        let txn = self.db.begin().await?;
        let result: Result<(plan::Model, Vec<objective::Model>), AppError> = async {
            child::Entity::find_by_id(input.child_id)
                .one(&txn)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("child id {}", input.child_id)))?;

            let now = Utc::now();
            let active = plan::ActiveModel {
                child_id: Set(input.child_id),
                goal: Set(input.goal),
                target_skill: Set(input.target_skill.as_str().to_string()),
                timeframe_start: Set(input.timeframe_start),
                timeframe_end: Set(input.timeframe_end),
                preferred_activity_types: Set(encode_activity_types(&unique_activity_types(
                    input.preferred_activity_types,
                ))),
                related_skills: Set(encode_skills(&normalize_skills(input.related_skills))),
                status: Set(PlanStatus::Active.as_str().to_string()),
                approval_status: Set(input
                    .approval_status
                    .map(|status| status.as_str().to_string())),
                educator_notes: Set(input.educator_notes),
                version: Set(1),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            };
            let insert = plan::Entity::insert(active).exec(&txn).await?;
            let plan_model = plan::Entity::find_by_id(insert.last_insert_id)
                .one(&txn)
                .await?
                .ok_or_else(|| AppError::NotFound("plan not found after insert".to_string()))?;

            let created = self
                .insert_objectives_with_conn(&txn, plan_model.id, objectives)
                .await?;
            Ok((plan_model, created))
        }
        .await;

        let result = finalize_transaction(txn, result).await;
        if let Ok((plan, objectives)) = &result {
            info!(
                plan_id = plan.id,
                child_id = plan.child_id,
                objectives = objectives.len(),
                "learning plan created"
            );
        }
        result
    }

    pub async fn list_plans(&self, query: &PlanQuery) -> Result<Vec<plan::Model>, AppError> {
        let mut select = plan::Entity::find();
        if let Some(status) = query.status {
            select = select.filter(plan::Column::Status.eq(status.as_str()));
        }
        if let Some(child_id) = query.child_id {
            select = select.filter(plan::Column::ChildId.eq(child_id));
        }
        Ok(select.order_by_asc(plan::Column::Id).all(&self.db).await?)
    }

    pub async fn get_plan(&self, id: i64) -> Result<plan::Model, AppError> {
        find_plan_with_conn(&self.db, id).await
    }

    pub async fn get_plan_detail(&self, id: i64) -> Result<PlanDetail, AppError> {
        let plan = self.get_plan(id).await?;
        let child = self.get_child(plan.child_id).await?;
        let objectives = objectives_for_plan_with_conn(&self.db, id).await?;
        let entry_count = progress_entry::Entity::find()
            .filter(progress_entry::Column::PlanId.eq(id))
            .count(&self.db)
            .await?;
        let overall_progress = overall_progress_with_conn(&self.db, id).await?;
        Ok(PlanDetail {
            plan,
            child,
            objectives,
            entry_count,
            overall_progress,
        })
    }

    pub async fn update_plan(&self, id: i64, changes: PlanChanges) -> Result<plan::Model, AppError> {
        let txn = self.db.begin().await?;
        let result = self.update_plan_with_conn(&txn, id, changes).await;
        finalize_transaction(txn, result).await
    }

    async fn update_plan_with_conn<C: ConnectionTrait>(
        &self,
        db: &C,
        id: i64,
        changes: PlanChanges,
    ) -> Result<plan::Model, AppError> {
        if let Some(goal) = changes.goal.as_deref() {
            ensure_non_empty("plan goal", goal)?;
        }
        let current = find_plan_with_conn(db, id).await?;
        if let Some(expected) = changes.expected_version {
            if expected != current.version {
                return Err(AppError::Conflict(format!(
                    "plan id {id} is at version {}, expected {expected}",
                    current.version
                )));
            }
        }
        ensure_timeframe(
            changes.timeframe_start.unwrap_or(current.timeframe_start),
            changes.timeframe_end.unwrap_or(current.timeframe_end),
        )?;

        let mut active = plan::ActiveModel {
            id: Set(id),
            ..Default::default()
        };
        if let Some(goal) = changes.goal {
            active.goal = Set(goal);
        }
        if let Some(skill) = changes.target_skill {
            active.target_skill = Set(skill.as_str().to_string());
        }
        if let Some(start) = changes.timeframe_start {
            active.timeframe_start = Set(start);
        }
        if let Some(end) = changes.timeframe_end {
            active.timeframe_end = Set(end);
        }
        if let Some(types) = changes.preferred_activity_types {
            active.preferred_activity_types =
                Set(encode_activity_types(&unique_activity_types(types)));
        }
        if let Some(skills) = changes.related_skills {
            active.related_skills = Set(encode_skills(&normalize_skills(skills)));
        }
        if let Some(status) = changes.status {
            active.status = Set(status.as_str().to_string());
        }
        if let Some(approval) = changes.approval_status {
            active.approval_status = Set(Some(approval.as_str().to_string()));
        }
        if let Some(notes) = changes.educator_notes {
            active.educator_notes = Set(Some(notes));
        }
        active.version = Set(current.version + 1);
        active.updated_at = Set(Utc::now());

        match active.update(db).await {
            Ok(model) => {
                info!(plan_id = id, version = model.version, "learning plan updated");
                Ok(model)
            }
            Err(sea_orm::DbErr::RecordNotFound(_)) | Err(sea_orm::DbErr::RecordNotUpdated) => {
                Err(AppError::PlanNotFound(id))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Removes a plan together with its objectives and ledger entries. This is
    /// the only operation that deletes ledger rows.
    pub async fn delete_plan(&self, id: i64) -> Result<(), AppError> {
        let txn = self.db.begin().await?;
        progress_entry::Entity::delete_many()
            .filter(progress_entry::Column::PlanId.eq(id))
            .exec(&txn)
            .await?;
        objective::Entity::delete_many()
            .filter(objective::Column::PlanId.eq(id))
            .exec(&txn)
            .await?;
        let result = plan::Entity::delete_by_id(id).exec(&txn).await?;
        if result.rows_affected == 0 {
            txn.rollback().await?;
            return Err(AppError::PlanNotFound(id));
        }
        txn.commit().await?;
        info!(plan_id = id, "learning plan removed");
        Ok(())
    }

    pub async fn add_objectives(
        &self,
        plan_id: i64,
        inputs: Vec<ObjectiveInput>,
    ) -> Result<(Vec<objective::Model>, StatusChanges), AppError> {
        for item in &inputs {
            validate_objective_input(item)?;
        }
        let txn = self.db.begin().await?;
        let result: Result<(Vec<objective::Model>, StatusChanges), AppError> = async {
            find_plan_with_conn(&txn, plan_id).await?;
            if inputs.is_empty() {
                return Ok((Vec::new(), StatusChanges::default()));
            }
            let created = self
                .insert_objectives_with_conn(&txn, plan_id, inputs)
                .await?;
            self.touch_plan_with_conn(&txn, plan_id).await?;
            let changes = self.refresh_plan_status_with_conn(&txn, plan_id).await?;
            Ok((created, changes))
        }
        .await;

        finalize_transaction(txn, result).await
    }

    pub async fn list_objectives(&self, plan_id: i64) -> Result<Vec<objective::Model>, AppError> {
        self.get_plan(plan_id).await?;
        objectives_for_plan_with_conn(&self.db, plan_id).await
    }

    pub async fn get_objective(&self, id: i64) -> Result<objective::Model, AppError> {
        objective::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("objective id {id}")))
    }

    pub async fn update_objective(
        &self,
        id: i64,
        changes: ObjectiveChanges,
    ) -> Result<(objective::Model, StatusChanges), AppError> {
        if let Some(description) = changes.description.as_deref() {
            ensure_non_empty("objective description", description)?;
        }
        if let Some(target) = changes.target_value {
            ensure_positive_target(target)?;
        }

        let txn = self.db.begin().await?;
        let result: Result<(objective::Model, StatusChanges), AppError> = async {
            let current = objective::Entity::find_by_id(id)
                .one(&txn)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("objective id {id}")))?;
            let plan_id = current.plan_id;
            let rebased = changes
                .target_value
                .map(|target| progress::rebase_objective(current.current_value, target));

            let mut active: objective::ActiveModel = current.into();
            if let Some(description) = changes.description {
                active.description = Set(description);
            }
            if let Some(step) = rebased {
                active.target_value = Set(step.target_value);
                active.current_value = Set(step.current_value);
                active.is_completed = Set(step.is_completed);
            }
            active.updated_at = Set(Utc::now());
            let model = active.update(&txn).await?;

            self.touch_plan_with_conn(&txn, plan_id).await?;
            let changes = self.refresh_plan_status_with_conn(&txn, plan_id).await?;
            Ok((model, changes))
        }
        .await;

        finalize_transaction(txn, result).await
    }

    pub async fn delete_objectives(&self, ids: &[i64]) -> Result<(u64, StatusChanges), AppError> {
        let txn = self.db.begin().await?;
        let result: Result<(u64, StatusChanges), AppError> = async {
            if ids.is_empty() {
                return Ok((0, StatusChanges::default()));
            }
            let unique_ids = unique_ids(ids);
            let objectives = objective::Entity::find()
                .filter(objective::Column::Id.is_in(unique_ids.clone()))
                .all(&txn)
                .await?;
            let existing: HashSet<i64> = objectives.iter().map(|item| item.id).collect();
            let missing: Vec<i64> = unique_ids
                .iter()
                .cloned()
                .filter(|id| !existing.contains(id))
                .collect();
            if !missing.is_empty() {
                return Err(AppError::NotFound(format!(
                    "objective id(s) not found: {}",
                    join_ids(&missing)
                )));
            }
            let mut seen = HashSet::new();
            let mut plan_ids = Vec::new();
            for item in &objectives {
                if seen.insert(item.plan_id) {
                    plan_ids.push(item.plan_id);
                }
            }

            let result = objective::Entity::delete_many()
                .filter(objective::Column::Id.is_in(unique_ids))
                .exec(&txn)
                .await?;

            let mut changes = StatusChanges::default();
            for plan_id in &plan_ids {
                self.touch_plan_with_conn(&txn, *plan_id).await?;
                let updated = self.refresh_plan_status_with_conn(&txn, *plan_id).await?;
                changes.merge(updated);
            }
            Ok((result.rows_affected, changes))
        }
        .await;

        finalize_transaction(txn, result).await
    }

    /// Moves one objective forward by `contribution` percent of its target.
    pub async fn apply_objective_contribution(
        &self,
        plan_id: i64,
        objective_id: i64,
        contribution: f64,
    ) -> Result<(objective::Model, ObjectiveProgress, StatusChanges), AppError> {
        let txn = self.db.begin().await?;
        let result = self
            .apply_objective_contribution_with_conn(&txn, plan_id, objective_id, contribution)
            .await;
        finalize_transaction(txn, result).await
    }

    async fn apply_objective_contribution_with_conn<C: ConnectionTrait>(
        &self,
        db: &C,
        plan_id: i64,
        objective_id: i64,
        contribution: f64,
    ) -> Result<(objective::Model, ObjectiveProgress, StatusChanges), AppError> {
        find_plan_with_conn(db, plan_id).await?;
        let current = objective::Entity::find_by_id(objective_id)
            .filter(objective::Column::PlanId.eq(plan_id))
            .one(db)
            .await?
            .ok_or(AppError::ObjectiveNotFound {
                plan_id,
                objective_id,
            })?;

        let step =
            progress::advance_objective(current.current_value, current.target_value, contribution);
        let mut active: objective::ActiveModel = current.into();
        active.current_value = Set(step.current_value);
        active.is_completed = Set(step.is_completed);
        active.updated_at = Set(Utc::now());
        let model = active.update(db).await?;

        self.touch_plan_with_conn(db, plan_id).await?;
        let changes = self.refresh_plan_status_with_conn(db, plan_id).await?;
        Ok((model, step, changes))
    }

    pub async fn record_progress(&self, input: ProgressInput) -> Result<RecordOutcome, AppError> {
        let txn = self.db.begin().await?;
        let result = self.record_progress_with_conn(&txn, input).await;
        finalize_transaction(txn, result).await
    }

    /// Records every input in one transaction. Inputs naming an unknown plan or
    /// failing validation are rejected individually; storage errors roll back
    /// the whole batch.
    pub async fn record_progress_batch(
        &self,
        inputs: Vec<ProgressInput>,
    ) -> Result<BatchOutcome, AppError> {
        let txn = self.db.begin().await?;
        let result: Result<BatchOutcome, AppError> = async {
            let mut outcome = BatchOutcome::default();
            for input in inputs {
                match self.record_progress_with_conn(&txn, input.clone()).await {
                    Ok(recorded) => outcome.recorded.push(recorded),
                    Err(err @ (AppError::PlanNotFound(_) | AppError::InvalidInput(_))) => {
                        warn!(plan_id = input.plan_id, error = %err, "progress input rejected");
                        outcome.rejected.push(RejectedInput { input, error: err });
                    }
                    Err(err) => return Err(err),
                }
            }
            Ok(outcome)
        }
        .await;

        finalize_transaction(txn, result).await
    }

    async fn record_progress_with_conn<C: ConnectionTrait>(
        &self,
        db: &C,
        input: ProgressInput,
    ) -> Result<RecordOutcome, AppError> {
        ensure_non_empty("activity id", &input.activity_id)?;
        let plan = find_plan_with_conn(db, input.plan_id).await?;
        let preferred = decode_activity_types(&plan.preferred_activity_types)?;
        let previous_progress = overall_progress_with_conn(db, plan.id).await?;

        let contribution = progress::contribution(
            input.activity_type,
            input.score,
            input.completion_status,
            &preferred,
        );
        debug!(
            plan_id = plan.id,
            activity_type = input.activity_type.as_str(),
            contribution,
            "computed contribution"
        );

        let active = progress_entry::ActiveModel {
            plan_id: Set(plan.id),
            activity_id: Set(input.activity_id.trim().to_string()),
            objective_id: Set(input.objective_id),
            activity_type: Set(input.activity_type.as_str().to_string()),
            score: Set(input.score.map(|score| progress::clamp_score(Some(score)))),
            completion_status: Set(input.completion_status),
            contribution: Set(contribution),
            created_at: Set(Utc::now()),
            ..Default::default()
        };
        let insert = progress_entry::Entity::insert(active).exec(db).await?;
        let entry = progress_entry::Entity::find_by_id(insert.last_insert_id)
            .one(db)
            .await?
            .ok_or_else(|| AppError::NotFound("progress entry not found after insert".to_string()))?;

        let mut changes = StatusChanges::default();
        let objective = match input.objective_id {
            Some(objective_id) => match self
                .apply_objective_contribution_with_conn(db, plan.id, objective_id, contribution)
                .await
            {
                Ok((objective, progress, updates)) => {
                    changes.merge(updates);
                    Some(ObjectiveOutcome::Updated {
                        objective,
                        progress,
                    })
                }
                Err(AppError::ObjectiveNotFound { objective_id, .. }) => {
                    warn!(
                        plan_id = plan.id,
                        objective_id, "progress recorded without objective update; objective not found"
                    );
                    Some(ObjectiveOutcome::Missing(objective_id))
                }
                Err(err) => return Err(err),
            },
            None => None,
        };

        let overall_progress = overall_progress_with_conn(db, plan.id).await?;
        let milestone = progress::milestone_reached(previous_progress, overall_progress);
        info!(
            plan_id = plan.id,
            entry_id = entry.id,
            contribution,
            overall_progress,
            "progress recorded"
        );
        Ok(RecordOutcome {
            entry,
            objective,
            previous_progress,
            overall_progress,
            milestone,
            changes,
        })
    }

    pub async fn entries_for_plan(
        &self,
        plan_id: i64,
        limit: Option<u64>,
    ) -> Result<Vec<progress_entry::Model>, AppError> {
        self.get_plan(plan_id).await?;
        let mut select = progress_entry::Entity::find()
            .filter(progress_entry::Column::PlanId.eq(plan_id))
            .order_by_asc(progress_entry::Column::CreatedAt)
            .order_by_asc(progress_entry::Column::Id);
        if let Some(limit) = limit {
            select = select.limit(limit);
        }
        Ok(select.all(&self.db).await?)
    }

    pub async fn overall_progress(&self, plan_id: i64) -> Result<f64, AppError> {
        self.get_plan(plan_id).await?;
        overall_progress_with_conn(&self.db, plan_id).await
    }

    /// Active plans of the selected child (all children when none is
    /// selected) that should receive a contribution for this activity.
    pub async fn relevant_plans(
        &self,
        activity_type: ActivityType,
        skill: Option<&str>,
    ) -> Result<Vec<plan::Model>, AppError> {
        let selected = self.get_selected_child().await?;
        let plans = plan::Entity::find()
            .filter(plan::Column::Status.eq(PlanStatus::Active.as_str()))
            .order_by_asc(plan::Column::Id)
            .all(&self.db)
            .await?;
        relevance::filter_relevant(
            plans,
            &RelevanceQuery {
                activity_type,
                skill,
                child_id: selected.map(|state| state.child_id),
            },
        )
    }

    /// Records a completed activity against every relevant plan. A failure for
    /// one plan is logged and reported without stopping the others.
    pub async fn complete_activity(
        &self,
        activity: ActivityCompletion,
    ) -> Result<ActivityOutcome, AppError> {
        ensure_non_empty("activity id", &activity.activity_id)?;
        let plans = self
            .relevant_plans(activity.activity_type, activity.skill.as_deref())
            .await?;
        let mut outcome = ActivityOutcome::default();
        for plan in plans {
            match self.record_progress(activity.for_plan(plan.id)).await {
                Ok(recorded) => outcome.recorded.push(recorded),
                Err(err) => {
                    error!(plan_id = plan.id, error = %err, "failed to record activity progress");
                    outcome.failures.push(ActivityFailure {
                        plan_id: plan.id,
                        error: err,
                    });
                }
            }
        }
        Ok(outcome)
    }

    async fn insert_objectives_with_conn<C: ConnectionTrait>(
        &self,
        db: &C,
        plan_id: i64,
        inputs: Vec<ObjectiveInput>,
    ) -> Result<Vec<objective::Model>, AppError> {
        let existing = objectives_for_plan_with_conn(db, plan_id).await?;
        let next_order = existing
            .iter()
            .map(|item| item.sort_order)
            .max()
            .unwrap_or(0)
            + 1;
        let now = Utc::now();
        let mut created = Vec::with_capacity(inputs.len());
        for (idx, input) in inputs.into_iter().enumerate() {
            let active = objective::ActiveModel {
                plan_id: Set(plan_id),
                description: Set(input.description.trim().to_string()),
                target_value: Set(input.target_value),
                current_value: Set(0.0),
                is_completed: Set(false),
                sort_order: Set(next_order + idx as i32),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            };
            let insert = objective::Entity::insert(active).exec(db).await?;
            let model = objective::Entity::find_by_id(insert.last_insert_id)
                .one(db)
                .await?
                .ok_or_else(|| AppError::NotFound("objective not found after insert".to_string()))?;
            created.push(model);
        }
        Ok(created)
    }

    /// Moves an active plan to achieved once every objective is completed, and an
    /// achieved plan back to active when one of its objectives reopens.
    async fn refresh_plan_status_with_conn<C: ConnectionTrait>(
        &self,
        db: &C,
        plan_id: i64,
    ) -> Result<StatusChanges, AppError> {
        let objectives = objectives_for_plan_with_conn(db, plan_id).await?;
        if objectives.is_empty() {
            return Ok(StatusChanges::default());
        }
        let total = objectives.len();
        let done = objectives.iter().filter(|item| item.is_completed).count();

        let plan = find_plan_with_conn(db, plan_id).await?;
        let (status, reason) = if done == total && plan.status == PlanStatus::Active.as_str() {
            (
                PlanStatus::Achieved,
                format!("all objectives completed ({done}/{total})"),
            )
        } else if done < total && plan.status == PlanStatus::Achieved.as_str() {
            (
                PlanStatus::Active,
                format!("objectives completed {done}/{total}"),
            )
        } else {
            return Ok(StatusChanges::default());
        };

        let mut active = plan::ActiveModel {
            id: Set(plan_id),
            ..Default::default()
        };
        active.status = Set(status.as_str().to_string());
        active.version = Set(plan.version + 1);
        active.updated_at = Set(Utc::now());
        active.update(db).await?;
        info!(plan_id, status = status.as_str(), "learning plan status refreshed");

        let mut changes = StatusChanges::default();
        changes.plans.push(PlanStatusChange {
            plan_id,
            from: plan.status,
            to: status.as_str().to_string(),
            reason,
        });
        Ok(changes)
    }

    /// Bumps the plan's version stamp after a change to its objectives.
    async fn touch_plan_with_conn<C: ConnectionTrait>(
        &self,
        db: &C,
        plan_id: i64,
    ) -> Result<(), AppError> {
        let plan = find_plan_with_conn(db, plan_id).await?;
        let mut active = plan::ActiveModel {
            id: Set(plan_id),
            ..Default::default()
        };
        active.version = Set(plan.version + 1);
        active.updated_at = Set(Utc::now());
        match active.update(db).await {
            Ok(_) => Ok(()),
            Err(sea_orm::DbErr::RecordNotFound(_)) | Err(sea_orm::DbErr::RecordNotUpdated) => {
                Err(AppError::PlanNotFound(plan_id))
            }
            Err(err) => Err(err.into()),
        }
    }
}

async fn find_plan_with_conn<C: ConnectionTrait>(db: &C, id: i64) -> Result<plan::Model, AppError> {
    plan::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or(AppError::PlanNotFound(id))
}

async fn objectives_for_plan_with_conn<C: ConnectionTrait>(
    db: &C,
    plan_id: i64,
) -> Result<Vec<objective::Model>, AppError> {
    Ok(objective::Entity::find()
        .filter(objective::Column::PlanId.eq(plan_id))
        .order_by_asc(objective::Column::SortOrder)
        .order_by_asc(objective::Column::Id)
        .all(db)
        .await?)
}

async fn overall_progress_with_conn<C: ConnectionTrait>(
    db: &C,
    plan_id: i64,
) -> Result<f64, AppError> {
    let entries = progress_entry::Entity::find()
        .filter(progress_entry::Column::PlanId.eq(plan_id))
        .all(db)
        .await?;
    Ok(progress::aggregate(
        entries.iter().map(|entry| entry.contribution),
    ))
}

async fn finalize_transaction<T>(
    txn: DatabaseTransaction,
    result: Result<T, AppError>,
) -> Result<T, AppError> {
    match result {
        Ok(value) => {
            txn.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = txn.rollback().await {
                return Err(rollback_err.into());
            }
            Err(err)
        }
    }
}

fn unique_ids(ids: &[i64]) -> Vec<i64> {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for id in ids {
        if seen.insert(*id) {
            unique.push(*id);
        }
    }
    unique
}

fn unique_activity_types(types: Vec<ActivityType>) -> Vec<ActivityType> {
    let mut seen = HashSet::new();
    types.into_iter().filter(|kind| seen.insert(*kind)).collect()
}

fn normalize_skills(skills: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    skills
        .into_iter()
        .map(|skill| skill.trim().to_string())
        .filter(|skill| !skill.is_empty() && seen.insert(skill.to_lowercase()))
        .collect()
}

fn join_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn ensure_non_empty(label: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::InvalidInput(format!("{label} cannot be empty")));
    }
    Ok(())
}

fn ensure_timeframe(start: NaiveDate, end: NaiveDate) -> Result<(), AppError> {
    if start > end {
        return Err(AppError::InvalidInput(format!(
            "timeframe start {start} is after end {end}"
        )));
    }
    Ok(())
}

fn ensure_positive_target(target: f64) -> Result<(), AppError> {
    if !target.is_finite() || target <= 0.0 {
        return Err(AppError::InvalidInput(format!(
            "objective target must be a positive number, got {target}"
        )));
    }
    Ok(())
}

fn validate_objective_input(input: &ObjectiveInput) -> Result<(), AppError> {
    ensure_non_empty("objective description", &input.description)?;
    ensure_positive_target(input.target_value)
}
