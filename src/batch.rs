//! Debounced ledger writes for streams of activity results.
//!
//! Progress inputs arrive as JSON lines. Records that arrive within one quiet
//! window of each other are written in a single transaction, under the
//! database write lock for that flush only.

use std::fs::File;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::app::{App, BatchOutcome};
use crate::error::AppError;
use crate::model::ProgressInput;

#[derive(Debug)]
pub struct SkippedLine {
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct BatchSummary {
    pub flushes: Vec<BatchOutcome>,
    pub skipped: Vec<SkippedLine>,
}

impl BatchSummary {
    pub fn recorded(&self) -> usize {
        self.flushes.iter().map(|batch| batch.recorded.len()).sum()
    }

    pub fn rejected(&self) -> usize {
        self.flushes.iter().map(|batch| batch.rejected.len()).sum()
    }
}

/// Reads progress inputs until EOF, flushing pending records whenever no new
/// line arrives within `window`. Malformed lines are skipped and reported.
pub async fn run_batch<R>(
    app: &App,
    reader: R,
    window: Duration,
    lock: &mut fd_lock::RwLock<File>,
) -> Result<BatchSummary, AppError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut pending: Vec<ProgressInput> = Vec::new();
    let mut summary = BatchSummary::default();
    let mut line_no = 0;

    loop {
        let next = if pending.is_empty() {
            Ok(lines.next_line().await)
        } else {
            timeout(window, lines.next_line()).await
        };

        match next {
            Err(_elapsed) => flush(app, lock, &mut pending, &mut summary).await?,
            Ok(Ok(Some(line))) => {
                line_no += 1;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<ProgressInput>(&line) {
                    Ok(input) => pending.push(input),
                    Err(err) => {
                        warn!(line = line_no, error = %err, "skipping malformed progress input");
                        summary.skipped.push(SkippedLine {
                            line: line_no,
                            reason: err.to_string(),
                        });
                    }
                }
            }
            Ok(Ok(None)) => {
                flush(app, lock, &mut pending, &mut summary).await?;
                break;
            }
            Ok(Err(err)) => {
                flush(app, lock, &mut pending, &mut summary).await?;
                return Err(err.into());
            }
        }
    }

    Ok(summary)
}

async fn flush(
    app: &App,
    lock: &mut fd_lock::RwLock<File>,
    pending: &mut Vec<ProgressInput>,
    summary: &mut BatchSummary,
) -> Result<(), AppError> {
    if pending.is_empty() {
        return Ok(());
    }
    let inputs = std::mem::take(pending);
    debug!(records = inputs.len(), "flushing progress batch");
    let _guard = lock.write()?;
    let outcome = app.record_progress_batch(inputs).await?;
    summary.flushes.push(outcome);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::model::{ActivityType, ChildInput, PlanInput, TargetSkill};
    use chrono::NaiveDate;
    use tempfile::TempDir;
    use tokio::io::AsyncWriteExt;

    async fn setup() -> (TempDir, App, i64) {
        let dir = TempDir::new().expect("temp dir");
        let db_path = db::resolve_db_path(dir.path());
        db::ensure_parent_dir(&db_path).expect("ensure parent");
        let db = db::connect(&db_path).await.expect("connect db");
        db::ensure_schema(&db).await.expect("ensure schema");
        let app = App::new(db, "test-session".to_string());
        let child = app
            .add_child(ChildInput {
                name: "Ada".to_string(),
            })
            .await
            .expect("child");
        let (plan, _) = app
            .add_plan(
                PlanInput {
                    child_id: child.id,
                    goal: "Read short words".to_string(),
                    target_skill: TargetSkill::Reading,
                    timeframe_start: NaiveDate::from_ymd_opt(2026, 1, 1).expect("date"),
                    timeframe_end: NaiveDate::from_ymd_opt(2026, 3, 1).expect("date"),
                    preferred_activity_types: vec![ActivityType::Reading],
                    related_skills: Vec::new(),
                    approval_status: None,
                    educator_notes: None,
                },
                Vec::new(),
            )
            .await
            .expect("plan");
        (dir, app, plan.id)
    }

    fn open_test_lock(dir: &TempDir) -> fd_lock::RwLock<File> {
        db::open_lock(&db::resolve_db_path(dir.path())).expect("lock")
    }

    fn line(plan_id: i64, score: u32) -> String {
        format!(
            "{{\"plan_id\":{plan_id},\"activity_id\":\"story-{score}\",\"activity_type\":\"reading\",\"score\":{score},\"completion_status\":true}}\n"
        )
    }

    #[tokio::test]
    async fn eof_flushes_everything_in_one_batch() {
        let (dir, app, plan_id) = setup().await;
        let mut lock = open_test_lock(&dir);
        let input = format!("{}\n{}not json\n{}", line(plan_id, 80), line(plan_id, 40), line(plan_id, 100));

        let summary = run_batch(&app, input.as_bytes(), Duration::from_secs(5), &mut lock)
            .await
            .expect("batch");
        assert_eq!(summary.flushes.len(), 1);
        assert_eq!(summary.recorded(), 3);
        assert_eq!(summary.skipped.len(), 1);
        assert_eq!(summary.skipped[0].line, 4);
        assert_eq!(
            app.entries_for_plan(plan_id, None)
                .await
                .expect("entries")
                .len(),
            3
        );
    }

    #[tokio::test]
    async fn quiet_window_splits_batches() {
        let (dir, app, plan_id) = setup().await;
        let mut lock = open_test_lock(&dir);
        let (mut writer, reader) = tokio::io::duplex(4096);
        let first = format!("{}{}", line(plan_id, 80), line(plan_id, 60));
        let second = line(plan_id, 20);
        let producer = tokio::spawn(async move {
            writer.write_all(first.as_bytes()).await.expect("write");
            tokio::time::sleep(Duration::from_millis(500)).await;
            writer.write_all(second.as_bytes()).await.expect("write");
        });

        let summary = run_batch(
            &app,
            tokio::io::BufReader::new(reader),
            Duration::from_millis(50),
            &mut lock,
        )
        .await
        .expect("batch");
        producer.await.expect("producer");

        let sizes: Vec<usize> = summary
            .flushes
            .iter()
            .map(|batch| batch.recorded.len())
            .collect();
        assert_eq!(sizes, vec![2, 1]);
    }

    #[tokio::test]
    async fn unknown_plan_is_rejected_without_dropping_the_batch() {
        let (dir, app, plan_id) = setup().await;
        let mut lock = open_test_lock(&dir);
        let input = format!("{}{}", line(plan_id, 80), line(9999, 80));
        let summary = run_batch(&app, input.as_bytes(), Duration::from_millis(50), &mut lock)
            .await
            .expect("batch");
        assert_eq!(summary.recorded(), 1);
        assert_eq!(summary.rejected(), 1);
    }

    #[tokio::test]
    async fn write_lock_is_free_while_waiting_for_input() {
        let (dir, app, plan_id) = setup().await;
        let mut lock = open_test_lock(&dir);
        let db_path = db::resolve_db_path(dir.path());
        let (mut writer, reader) = tokio::io::duplex(4096);
        let first = line(plan_id, 80);
        let second = line(plan_id, 20);
        let other_caller = async move {
            writer.write_all(first.as_bytes()).await.expect("write");
            tokio::time::sleep(Duration::from_millis(300)).await;
            let mut other_lock = db::open_lock(&db_path).expect("lock");
            let acquired = other_lock.try_write().is_ok();
            writer.write_all(second.as_bytes()).await.expect("write");
            acquired
        };

        let (summary, acquired) = tokio::join!(
            run_batch(
                &app,
                tokio::io::BufReader::new(reader),
                Duration::from_millis(50),
                &mut lock,
            ),
            other_caller
        );
        assert!(acquired, "idle batch stream must not hold the write lock");
        let summary = summary.expect("batch");
        assert_eq!(summary.flushes.len(), 2);
        assert_eq!(summary.recorded(), 2);
    }
}
