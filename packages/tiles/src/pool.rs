//! Bounded worker pool for generation tasks.
//!
//! A fixed number of blocking workers pull tasks from one shared queue.
//! Each worker owns its own clone of the store connection. Results come
//! back over a single channel; the orchestrator counts them, reports
//! progress, and waits for every worker before returning. The first
//! failure stops further dispatch and fails the batch.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use duckdb::Connection;
use geodata_cli_utils::ProgressCallback;

use crate::{BatchSummary, TaskOutcome, TilesError};

type TaskQueue<T> = Arc<Mutex<VecDeque<T>>>;

fn next_task<T>(queue: &TaskQueue<T>) -> Option<T> {
    queue
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .pop_front()
}

/// Runs `work` over every task with `workers` parallel workers.
///
/// # Errors
///
/// Returns the first error any task produced (remaining queued tasks are
/// abandoned), or [`TilesError::Store`] if a connection can't be cloned.
pub async fn run_tasks<T, F>(
    conn: &Connection,
    tasks: Vec<T>,
    workers: usize,
    progress: Arc<dyn ProgressCallback>,
    work: F,
) -> Result<BatchSummary, TilesError>
where
    T: Send + 'static,
    F: Fn(&Connection, T) -> Result<TaskOutcome, TilesError> + Send + Sync + 'static,
{
    let total = tasks.len();
    progress.set_total(total as u64);

    let workers = workers.clamp(1, total.max(1));
    let queue: TaskQueue<T> = Arc::new(Mutex::new(tasks.into()));
    let stop = Arc::new(AtomicBool::new(false));
    let work = Arc::new(work);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    log::info!("Running {total} tasks on {workers} workers");

    let mut handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        let conn = conn.try_clone()?;
        let queue = Arc::clone(&queue);
        let stop = Arc::clone(&stop);
        let work = Arc::clone(&work);
        let tx = tx.clone();

        handles.push(tokio::task::spawn_blocking(move || {
            while !stop.load(Ordering::Relaxed) {
                let Some(task) = next_task(&queue) else {
                    break;
                };
                let result = work(&conn, task);
                if result.is_err() {
                    stop.store(true, Ordering::Relaxed);
                }
                if tx.send(result).is_err() {
                    break;
                }
            }
        }));
    }
    drop(tx);

    let mut summary = BatchSummary::default();
    let mut first_error = None;

    while let Some(result) = rx.recv().await {
        progress.inc(1);
        match result {
            Ok(outcome) => {
                match &outcome {
                    TaskOutcome::Written(path) => log::debug!("Wrote {}", path.display()),
                    TaskOutcome::Exists(path) => log::debug!("{} (exists)", path.display()),
                    TaskOutcome::SkippedTotals(cat) => {
                        log::debug!("{cat} (skipping totals category)");
                    }
                }
                summary.record(&outcome);
            }
            Err(e) => {
                log::error!("Task failed: {e}");
                first_error.get_or_insert(e);
            }
        }
    }

    for handle in handles {
        handle.await?;
    }

    if let Some(e) = first_error {
        progress.finish("failed".to_string());
        return Err(e);
    }

    progress.finish(format!(
        "{} written, {} existing",
        summary.written, summary.existing
    ));

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::{path::PathBuf, sync::atomic::AtomicUsize};

    use geodata_cli_utils::null_progress;

    use super::*;

    #[tokio::test]
    async fn every_task_runs_once() {
        let conn = geodata_database::open_in_memory().unwrap();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);

        let summary = run_tasks(&conn, (0..20).collect(), 4, null_progress(), move |_, n: usize| {
            counter.fetch_add(n, Ordering::SeqCst);
            Ok(if n % 2 == 0 {
                TaskOutcome::Written(PathBuf::from(n.to_string()))
            } else {
                TaskOutcome::Exists(PathBuf::from(n.to_string()))
            })
        })
        .await
        .unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), (0..20).sum::<usize>());
        assert_eq!(summary.written, 10);
        assert_eq!(summary.existing, 10);
    }

    #[tokio::test]
    async fn workers_query_their_own_connection() {
        let conn = geodata_database::open_in_memory().unwrap();
        conn.execute("INSERT INTO geo_type (name) VALUES ('LAD')", [])
            .unwrap();

        let summary = run_tasks(&conn, vec![(); 6], 3, null_progress(), |conn, ()| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM geo_type", [], |row| row.get(0))?;
            assert_eq!(n, 1);
            Ok(TaskOutcome::Written(PathBuf::new()))
        })
        .await
        .unwrap();

        assert_eq!(summary.written, 6);
    }

    #[tokio::test]
    async fn first_failure_fails_the_batch() {
        let conn = geodata_database::open_in_memory().unwrap();
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);

        let err = run_tasks(&conn, (0..100).collect(), 1, null_progress(), move |_, n: usize| {
            counter.fetch_add(1, Ordering::SeqCst);
            if n == 3 {
                return Err(TilesError::EmptyList {
                    path: PathBuf::from("cats.txt"),
                });
            }
            Ok(TaskOutcome::Written(PathBuf::new()))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, TilesError::EmptyList { .. }));
        assert_eq!(ran.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let conn = geodata_database::open_in_memory().unwrap();
        let summary = run_tasks(&conn, Vec::<()>::new(), 4, null_progress(), |_, ()| {
            Ok(TaskOutcome::Written(PathBuf::new()))
        })
        .await
        .unwrap();
        assert_eq!(summary, BatchSummary::default());
    }
}
