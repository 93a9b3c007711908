use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Db(#[from] sea_orm::DbErr),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Plan not found: plan id {0}")]
    PlanNotFound(i64),
    #[error("Objective not found: objective id {objective_id} in plan id {plan_id}")]
    ObjectiveNotFound { plan_id: i64, objective_id: i64 },
    #[error("{}", multiline("Not found", .0))]
    NotFound(String),
    #[error("{}", multiline("Invalid input", .0))]
    InvalidInput(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Config error: {0}")]
    Config(String),
}

fn multiline(label: &str, message: &str) -> String {
    if message.contains('\n') {
        format!("{label}:\n{message}")
    } else {
        format!("{label}: {message}")
    }
}
